use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::TicketError;
use crate::models::{Availability, Reservation, TicketLimit, TicketLimitInput};
use crate::store::{EventStore, InventoryStore, LimitOutcome, ReserveOutcome, Store};

/// Largest quantity a single purchase may reserve.
pub const MAX_TICKETS_PER_ORDER: i32 = 10;

/// Per-event, per-ticket-type capacity bookkeeping.
#[derive(Clone)]
pub struct Inventory {
    store: Arc<dyn Store>,
}

impl Inventory {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Takes `quantity` units of capacity or rejects the request.
    ///
    /// The check and the increment happen in one store operation, so
    /// concurrent callers can never sell more than `max_tickets` in total.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        event_id: Uuid,
        ticket_type: &str,
        quantity: i32,
    ) -> Result<Reservation, TicketError> {
        if !(1..=MAX_TICKETS_PER_ORDER).contains(&quantity) {
            return Err(TicketError::Validation(format!(
                "Quantity must be between 1 and {MAX_TICKETS_PER_ORDER}"
            )));
        }

        match self.store.reserve(event_id, ticket_type, quantity).await? {
            ReserveOutcome::Reserved(reservation) => {
                info!(quantity, "Tickets reserved");
                Ok(reservation)
            }
            ReserveOutcome::NoLimit => Err(TicketError::NotFound(format!(
                "No active '{ticket_type}' tickets for event '{event_id}'"
            ))),
            ReserveOutcome::SoldOut { remaining } => {
                info!(quantity, remaining, "Reservation rejected, sold out");
                Err(TicketError::SoldOut { remaining })
            }
        }
    }

    /// Gives back capacity taken by `reserve`.
    #[instrument(skip(self))]
    pub async fn release(
        &self,
        event_id: Uuid,
        ticket_type: &str,
        quantity: i32,
    ) -> Result<(), TicketError> {
        if quantity <= 0 {
            return Ok(());
        }
        if !self.store.release(event_id, ticket_type, quantity).await? {
            warn!("Released capacity for a ticket limit that no longer exists");
        }
        Ok(())
    }

    #[instrument(skip(self, input), fields(ticket_type = %input.ticket_type))]
    pub async fn set_limit(
        &self,
        event_id: Uuid,
        input: &TicketLimitInput,
    ) -> Result<TicketLimit, TicketError> {
        input.validate().map_err(TicketError::Validation)?;

        match self.store.upsert_limit(event_id, input).await? {
            LimitOutcome::Saved(limit) => {
                info!(
                    max_tickets = limit.max_tickets,
                    sold_tickets = limit.sold_tickets,
                    is_active = limit.is_active,
                    "Ticket limit saved"
                );
                Ok(limit)
            }
            LimitOutcome::EventNotFound => Err(TicketError::NotFound(format!(
                "Event '{event_id}' was not found"
            ))),
            LimitOutcome::BelowSold { sold } => Err(TicketError::Validation(format!(
                "max_tickets ({}) cannot be lower than tickets already sold ({sold})",
                input.max_tickets
            ))),
        }
    }

    pub async fn limits(&self, event_id: Uuid) -> Result<Vec<TicketLimit>, TicketError> {
        Ok(self.store.list_limits(event_id).await?)
    }

    /// Active ticket types for an event and how many of each remain.
    pub async fn availability(&self, event_id: Uuid) -> Result<Vec<Availability>, TicketError> {
        if self.store.get_event(event_id).await?.is_none() {
            return Err(TicketError::NotFound(format!(
                "Event '{event_id}' was not found"
            )));
        }
        Ok(self
            .store
            .list_limits(event_id)
            .await?
            .iter()
            .filter(|limit| limit.is_active)
            .map(Availability::from)
            .collect())
    }
}
