use async_trait::async_trait;

use crate::models::{Event, Ticket};

#[derive(Debug, thiserror::Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers a purchase confirmation carrying the ticket's scannable code.
#[async_trait]
pub trait TicketNotifier: Send + Sync {
    async fn ticket_issued(&self, event: &Event, ticket: &Ticket) -> Result<(), NotifyError>;
}

/// Writes confirmations to the log instead of sending mail.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl TicketNotifier for LogNotifier {
    async fn ticket_issued(&self, event: &Event, ticket: &Ticket) -> Result<(), NotifyError> {
        tracing::info!(
            event = %event.slug,
            ticket_id = %ticket.id,
            ticket_type = %ticket.ticket_type,
            recipient = %ticket.attendee_email,
            "Ticket confirmation dispatched"
        );
        Ok(())
    }
}
