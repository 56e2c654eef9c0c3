//! Ticket inventory, issuance and door validation.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

pub mod code;
pub mod inventory;
pub mod issuance;
pub mod notifier;
pub mod validator;

pub use code::TicketCodec;
pub use inventory::{Inventory, MAX_TICKETS_PER_ORDER};
pub use issuance::{Purchase, PurchaseRequest, TicketIssuer};
pub use notifier::{LogNotifier, TicketNotifier};
pub use validator::{Admission, TicketValidator};

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("{0}")]
    NotFound(String),

    #[error("Sold out: {remaining} ticket(s) remaining")]
    SoldOut { remaining: i32 },

    #[error("Ticket has already been used")]
    AlreadyUsed {
        scanned_at: Option<DateTime<Utc>>,
        scanned_by: Option<Uuid>,
    },

    #[error("Ticket is void")]
    Void,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
