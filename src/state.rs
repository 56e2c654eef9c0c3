use std::sync::Arc;

use crate::config::Config;
use crate::services::code::CodecError;
use crate::services::{Inventory, TicketCodec, TicketIssuer, TicketNotifier, TicketValidator};
use crate::store::Store;

/// Shared handler state. Cloned per request, so everything inside is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub inventory: Inventory,
    pub issuer: TicketIssuer,
    pub validator: TicketValidator,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        notifier: Arc<dyn TicketNotifier>,
    ) -> Result<Self, CodecError> {
        let codec = Arc::new(TicketCodec::new(config.ticket_code_secret.as_bytes())?);

        Ok(Self {
            inventory: Inventory::new(store.clone()),
            issuer: TicketIssuer::new(store.clone(), codec.clone(), notifier),
            validator: TicketValidator::new(store.clone(), codec),
            store,
            config: Arc::new(config),
        })
    }
}
