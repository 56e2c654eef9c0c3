use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{TicketCodec, TicketError};
use crate::models::Ticket;
use crate::store::{ScanOutcome, Store, StoreError, TicketStore};

/// A ticket accepted at the door.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admission {
    pub ticket: Ticket,
    pub scanned_by: Uuid,
    pub scanned_at: DateTime<Utc>,
}

/// Consumes scanned codes at point of entry.
#[derive(Clone)]
pub struct TicketValidator {
    store: Arc<dyn Store>,
    codec: Arc<TicketCodec>,
}

impl TicketValidator {
    pub fn new(store: Arc<dyn Store>, codec: Arc<TicketCodec>) -> Self {
        Self { store, codec }
    }

    /// Admits the holder of `code` exactly once.
    ///
    /// Codes that are malformed or carry a bad signature are reported as
    /// `NotFound` without touching the store.
    #[instrument(skip(self, code))]
    pub async fn validate(&self, code: &str, scanner_id: Uuid) -> Result<Admission, TicketError> {
        let code = code.trim();
        let Some(ticket_id) = self.codec.verify(code) else {
            warn!("Rejected a code that failed signature verification");
            return Err(not_found());
        };

        match self.store.mark_used(code, scanner_id, Utc::now()).await? {
            ScanOutcome::Accepted(ticket) => {
                if ticket.id != ticket_id {
                    return Err(StoreError::Inconsistent(format!(
                        "code for ticket {ticket_id} resolved to ticket {}",
                        ticket.id
                    ))
                    .into());
                }
                info!(%ticket_id, event_id = %ticket.event_id, "Ticket accepted");
                let scanned_at = ticket.scanned_at.unwrap_or_else(Utc::now);
                Ok(Admission {
                    ticket,
                    scanned_by: scanner_id,
                    scanned_at,
                })
            }
            ScanOutcome::NotFound => {
                warn!(%ticket_id, "Signed code has no matching ticket");
                Err(not_found())
            }
            ScanOutcome::AlreadyUsed(ticket) => {
                info!(%ticket_id, "Ticket rejected, already used");
                Err(TicketError::AlreadyUsed {
                    scanned_at: ticket.scanned_at,
                    scanned_by: ticket.scanned_by,
                })
            }
            ScanOutcome::Void(_) => {
                info!(%ticket_id, "Ticket rejected, void");
                Err(TicketError::Void)
            }
        }
    }
}

fn not_found() -> TicketError {
    TicketError::NotFound("No ticket matches this code".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendeeInfo, NewEvent, TicketLimitInput, TicketStatus};
    use crate::services::{Inventory, LogNotifier, PurchaseRequest, TicketIssuer};
    use crate::store::{EventStore, MemoryStore};
    use rust_decimal::Decimal;

    struct Fixture {
        issuer: TicketIssuer,
        validator: TicketValidator,
        event_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let event = store
            .create_event(&NewEvent {
                name: "Tiwizi".to_string(),
                slug: "tiwizi".to_string(),
                date: Utc::now(),
                end_date: None,
            })
            .await
            .unwrap();
        Inventory::new(store.clone())
            .set_limit(
                event.id,
                &TicketLimitInput {
                    ticket_type: "general".to_string(),
                    max_tickets: 10,
                    price: Decimal::new(2000, 2),
                    currency: "EUR".to_string(),
                    is_active: true,
                },
            )
            .await
            .unwrap();

        let codec = Arc::new(TicketCodec::new(b"validator-test-secret").unwrap());
        Fixture {
            issuer: TicketIssuer::new(store.clone(), codec.clone(), Arc::new(LogNotifier)),
            validator: TicketValidator::new(store, codec),
            event_id: event.id,
        }
    }

    async fn buy_one(fx: &Fixture) -> Ticket {
        let request = PurchaseRequest {
            ticket_type: "general".to_string(),
            quantity: 1,
            attendee: AttendeeInfo {
                name: "Nora".to_string(),
                email: "nora@example.com".to_string(),
            },
        };
        fx.issuer
            .purchase(fx.event_id, Uuid::new_v4(), &request)
            .await
            .unwrap()
            .tickets
            .remove(0)
    }

    #[tokio::test]
    async fn test_accepts_exactly_once() {
        let fx = fixture().await;
        let ticket = buy_one(&fx).await;
        let scanner = Uuid::new_v4();

        let admission = fx.validator.validate(&ticket.code, scanner).await.unwrap();
        assert_eq!(admission.ticket.id, ticket.id);
        assert_eq!(admission.ticket.status, TicketStatus::Used);
        assert_eq!(admission.ticket.scanned_by, Some(scanner));

        for _ in 0..2 {
            let err = fx.validator.validate(&ticket.code, scanner).await.unwrap_err();
            match err {
                TicketError::AlreadyUsed {
                    scanned_at,
                    scanned_by,
                } => {
                    assert_eq!(scanned_by, Some(scanner));
                    assert_eq!(scanned_at, Some(admission.scanned_at));
                }
                other => panic!("expected AlreadyUsed, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_code_is_not_found() {
        let fx = fixture().await;
        let err = fx
            .validator
            .validate("IZT1.bm90LWEtdGlja2V0", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_well_signed_code_without_ticket_is_not_found() {
        let fx = fixture().await;
        let orphan = TicketCodec::new(b"validator-test-secret")
            .unwrap()
            .issue(Uuid::new_v4());

        let err = fx.validator.validate(&orphan, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, TicketError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_tampered_code_is_never_accepted() {
        let fx = fixture().await;
        let ticket = buy_one(&fx).await;

        let mut tampered = ticket.code.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        let err = fx.validator.validate(&tampered, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, TicketError::NotFound(_)));

        // The genuine code is still good.
        assert!(fx.validator.validate(&ticket.code, Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn test_void_ticket_is_rejected() {
        let fx = fixture().await;
        let ticket = buy_one(&fx).await;
        fx.issuer.void(ticket.id).await.unwrap();

        let err = fx
            .validator
            .validate(&ticket.code, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::Void));
    }

    #[tokio::test]
    async fn test_surrounding_whitespace_is_ignored() {
        let fx = fixture().await;
        let ticket = buy_one(&fx).await;

        let padded = format!("  {}\n", ticket.code);
        assert!(fx.validator.validate(&padded, Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_scanners_admit_once() {
        let fx = fixture().await;
        let ticket = buy_one(&fx).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let validator = fx.validator.clone();
            let code = ticket.code.clone();
            handles.push(tokio::spawn(async move {
                validator.validate(&code, Uuid::new_v4()).await
            }));
        }

        let mut accepted = 0;
        let mut already_used = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(TicketError::AlreadyUsed { .. }) => already_used += 1,
                Err(other) => panic!("unexpected rejection: {other:?}"),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(already_used, 7);
    }
}
