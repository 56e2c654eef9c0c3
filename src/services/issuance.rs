use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{Inventory, TicketCodec, TicketError, TicketNotifier};
use crate::models::{AttendeeInfo, Event, NewTicket, Reservation, Ticket};
use crate::store::{EventStore, Store, TicketStore, VoidOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub ticket_type: String,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    pub attendee: AttendeeInfo,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub event_id: Uuid,
    pub ticket_type: String,
    pub tickets: Vec<Ticket>,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub currency: String,
}

/// Creates tickets against reserved capacity and cancels them again.
#[derive(Clone)]
pub struct TicketIssuer {
    store: Arc<dyn Store>,
    inventory: Inventory,
    codec: Arc<TicketCodec>,
    notifier: Arc<dyn TicketNotifier>,
}

impl TicketIssuer {
    pub fn new(
        store: Arc<dyn Store>,
        codec: Arc<TicketCodec>,
        notifier: Arc<dyn TicketNotifier>,
    ) -> Self {
        Self {
            inventory: Inventory::new(store.clone()),
            store,
            codec,
            notifier,
        }
    }

    /// Persists one valid ticket for capacity already taken by `reservation`.
    ///
    /// Does not notify; callers decide when a confirmation goes out.
    #[instrument(skip(self, reservation, attendee), fields(event_id = %reservation.event_id, ticket_type = %reservation.ticket_type))]
    pub async fn issue(
        &self,
        reservation: &Reservation,
        owner_user_id: Uuid,
        attendee: &AttendeeInfo,
    ) -> Result<Ticket, TicketError> {
        let id = Uuid::new_v4();
        let ticket = NewTicket {
            id,
            event_id: reservation.event_id,
            ticket_type: reservation.ticket_type.clone(),
            owner_user_id,
            attendee: attendee.clone(),
            code: self.codec.issue(id),
            price: reservation.unit_price,
            currency: reservation.currency.clone(),
        };

        let ticket = self.store.insert_ticket(&ticket).await?;
        info!(ticket_id = %ticket.id, "Ticket issued");
        Ok(ticket)
    }

    /// Reserves `quantity` tickets, issues each of them, then sends the
    /// confirmations. Either every ticket is issued or the capacity is
    /// returned and nothing stays valid.
    #[instrument(skip(self, request), fields(ticket_type = %request.ticket_type, quantity = request.quantity))]
    pub async fn purchase(
        &self,
        event_id: Uuid,
        owner_user_id: Uuid,
        request: &PurchaseRequest,
    ) -> Result<Purchase, TicketError> {
        request.attendee.validate().map_err(TicketError::Validation)?;

        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| TicketError::NotFound(format!("Event '{event_id}' was not found")))?;

        let reservation = self
            .inventory
            .reserve(event_id, &request.ticket_type, request.quantity)
            .await?;

        let mut tickets = Vec::with_capacity(reservation.quantity as usize);
        for _ in 0..reservation.quantity {
            match self.issue(&reservation, owner_user_id, &request.attendee).await {
                Ok(ticket) => tickets.push(ticket),
                Err(err) => {
                    error!(error = %err, issued = tickets.len(), "Issuance failed, rolling back purchase");
                    self.roll_back(&reservation, &tickets).await;
                    return Err(err);
                }
            }
        }

        self.notify(&event, &tickets).await;

        let total = reservation.unit_price * Decimal::from(reservation.quantity);
        Ok(Purchase {
            event_id,
            ticket_type: reservation.ticket_type,
            tickets,
            unit_price: reservation.unit_price,
            total,
            currency: reservation.currency,
        })
    }

    /// Cancels a valid ticket and returns its unit of capacity.
    #[instrument(skip(self))]
    pub async fn void(&self, ticket_id: Uuid) -> Result<Ticket, TicketError> {
        match self.store.void_ticket(ticket_id).await? {
            VoidOutcome::Voided(ticket) => {
                info!("Ticket voided");
                Ok(ticket)
            }
            VoidOutcome::NotFound => Err(TicketError::NotFound(format!(
                "Ticket '{ticket_id}' was not found"
            ))),
            VoidOutcome::AlreadyUsed => Err(TicketError::AlreadyUsed {
                scanned_at: None,
                scanned_by: None,
            }),
            VoidOutcome::AlreadyVoid => Err(TicketError::Void),
        }
    }

    async fn roll_back(&self, reservation: &Reservation, issued: &[Ticket]) {
        // Voiding gives back one unit per issued ticket.
        for ticket in issued {
            if let Err(err) = self.void(ticket.id).await {
                error!(ticket_id = %ticket.id, error = %err, "Failed to void ticket during rollback");
            }
        }

        let unissued = reservation.quantity - issued.len() as i32;
        if let Err(err) = self
            .inventory
            .release(reservation.event_id, &reservation.ticket_type, unissued)
            .await
        {
            error!(error = %err, unissued, "Failed to release reserved capacity");
        }
    }

    async fn notify(&self, event: &Event, tickets: &[Ticket]) {
        for ticket in tickets {
            if let Err(err) = self.notifier.ticket_issued(event, ticket).await {
                warn!(ticket_id = %ticket.id, error = %err, "Ticket confirmation was not delivered");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        NewEvent, NewUser, RefreshSession, TicketLimit, TicketLimitInput, TicketStatus, User,
    };
    use crate::services::notifier::NotifyError;
    use crate::store::{
        InventoryStore, LimitOutcome, MemoryStore, ReserveOutcome, ScanOutcome, StoreError,
        StoreResult, UserStore,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Uuid>>,
        fail: bool,
    }

    #[async_trait]
    impl TicketNotifier for RecordingNotifier {
        async fn ticket_issued(&self, _event: &Event, ticket: &Ticket) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError("smtp unavailable".to_string()));
            }
            self.sent.lock().await.push(ticket.id);
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<dyn Store>,
        issuer: TicketIssuer,
        notifier: Arc<RecordingNotifier>,
        event_id: Uuid,
    }

    async fn fixture(max_tickets: i32, notifier: RecordingNotifier) -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let event = store
            .create_event(&NewEvent {
                name: "Imzad".to_string(),
                slug: "imzad".to_string(),
                date: Utc::now(),
                end_date: None,
            })
            .await
            .unwrap();
        Inventory::new(store.clone())
            .set_limit(
                event.id,
                &TicketLimitInput {
                    ticket_type: "vip".to_string(),
                    max_tickets,
                    price: Decimal::new(3000, 2),
                    currency: "EUR".to_string(),
                    is_active: true,
                },
            )
            .await
            .unwrap();

        let notifier = Arc::new(notifier);
        let codec = Arc::new(TicketCodec::new(b"issuance-test-secret").unwrap());
        let issuer = TicketIssuer::new(store.clone(), codec, notifier.clone());
        Fixture {
            store,
            issuer,
            notifier,
            event_id: event.id,
        }
    }

    fn request(quantity: i32) -> PurchaseRequest {
        PurchaseRequest {
            ticket_type: "vip".to_string(),
            quantity,
            attendee: AttendeeInfo {
                name: "Idir".to_string(),
                email: "idir@example.com".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_purchase_issues_distinct_valid_tickets() {
        let fx = fixture(10, RecordingNotifier::default()).await;
        let owner = Uuid::new_v4();

        let purchase = fx.issuer.purchase(fx.event_id, owner, &request(3)).await.unwrap();

        assert_eq!(purchase.tickets.len(), 3);
        assert_eq!(purchase.total, Decimal::new(9000, 2));
        assert!(purchase
            .tickets
            .iter()
            .all(|t| t.status == TicketStatus::Valid && t.owner_user_id == owner));

        let mut codes: Vec<&str> = purchase.tickets.iter().map(|t| t.code.as_str()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 3);

        assert_eq!(fx.notifier.sent.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn test_purchase_sold_out_issues_nothing() {
        let fx = fixture(2, RecordingNotifier::default()).await;

        let err = fx
            .issuer
            .purchase(fx.event_id, Uuid::new_v4(), &request(3))
            .await
            .unwrap_err();

        assert!(matches!(err, TicketError::SoldOut { remaining: 2 }));
        assert!(fx
            .store
            .list_tickets_for_event(fx.event_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_notifier_failure_keeps_purchase() {
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let fx = fixture(5, notifier).await;

        let purchase = fx
            .issuer
            .purchase(fx.event_id, Uuid::new_v4(), &request(1))
            .await
            .unwrap();
        assert_eq!(purchase.tickets.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_attendee_is_rejected_before_reserving() {
        let fx = fixture(1, RecordingNotifier::default()).await;
        let mut bad = request(1);
        bad.attendee.email = "not-an-email".to_string();

        let err = fx
            .issuer
            .purchase(fx.event_id, Uuid::new_v4(), &bad)
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::Validation(_)));

        // Capacity untouched.
        assert!(fx
            .issuer
            .purchase(fx.event_id, Uuid::new_v4(), &request(1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_void_returns_capacity() {
        let fx = fixture(1, RecordingNotifier::default()).await;
        let purchase = fx
            .issuer
            .purchase(fx.event_id, Uuid::new_v4(), &request(1))
            .await
            .unwrap();

        let voided = fx.issuer.void(purchase.tickets[0].id).await.unwrap();
        assert_eq!(voided.status, TicketStatus::Void);

        assert!(matches!(
            fx.issuer.void(voided.id).await,
            Err(TicketError::Void)
        ));
        assert!(fx
            .issuer
            .purchase(fx.event_id, Uuid::new_v4(), &request(1))
            .await
            .is_ok());
    }

    /// Delegates to a `MemoryStore` but fails every ticket insert after the first `allow`.
    struct FlakyInserts {
        inner: MemoryStore,
        allow: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EventStore for FlakyInserts {
        async fn create_event(&self, input: &NewEvent) -> StoreResult<Event> {
            self.inner.create_event(input).await
        }
        async fn get_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
            self.inner.get_event(id).await
        }
        async fn list_events(&self) -> StoreResult<Vec<Event>> {
            self.inner.list_events().await
        }
        async fn delete_event(&self, id: Uuid) -> StoreResult<bool> {
            self.inner.delete_event(id).await
        }
    }

    #[async_trait]
    impl InventoryStore for FlakyInserts {
        async fn upsert_limit(
            &self,
            event_id: Uuid,
            input: &TicketLimitInput,
        ) -> StoreResult<LimitOutcome> {
            self.inner.upsert_limit(event_id, input).await
        }
        async fn list_limits(&self, event_id: Uuid) -> StoreResult<Vec<TicketLimit>> {
            self.inner.list_limits(event_id).await
        }
        async fn reserve(
            &self,
            event_id: Uuid,
            ticket_type: &str,
            quantity: i32,
        ) -> StoreResult<ReserveOutcome> {
            self.inner.reserve(event_id, ticket_type, quantity).await
        }
        async fn release(
            &self,
            event_id: Uuid,
            ticket_type: &str,
            quantity: i32,
        ) -> StoreResult<bool> {
            self.inner.release(event_id, ticket_type, quantity).await
        }
    }

    #[async_trait]
    impl TicketStore for FlakyInserts {
        async fn insert_ticket(&self, ticket: &NewTicket) -> StoreResult<Ticket> {
            use std::sync::atomic::Ordering;
            let allowed = self
                .allow
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !allowed {
                return Err(StoreError::Inconsistent("insert refused".to_string()));
            }
            self.inner.insert_ticket(ticket).await
        }
        async fn get_ticket(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
            self.inner.get_ticket(id).await
        }
        async fn find_ticket_by_code(&self, code: &str) -> StoreResult<Option<Ticket>> {
            self.inner.find_ticket_by_code(code).await
        }
        async fn list_tickets_for_event(&self, event_id: Uuid) -> StoreResult<Vec<Ticket>> {
            self.inner.list_tickets_for_event(event_id).await
        }
        async fn list_tickets_for_owner(&self, user_id: Uuid) -> StoreResult<Vec<Ticket>> {
            self.inner.list_tickets_for_owner(user_id).await
        }
        async fn mark_used(
            &self,
            code: &str,
            scanner_id: Uuid,
            at: chrono::DateTime<Utc>,
        ) -> StoreResult<ScanOutcome> {
            self.inner.mark_used(code, scanner_id, at).await
        }
        async fn void_ticket(&self, id: Uuid) -> StoreResult<VoidOutcome> {
            self.inner.void_ticket(id).await
        }
    }

    #[async_trait]
    impl UserStore for FlakyInserts {
        async fn create_user(&self, input: &NewUser) -> StoreResult<User> {
            self.inner.create_user(input).await
        }
        async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
            self.inner.find_user_by_email(email).await
        }
        async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
            self.inner.find_user_by_id(id).await
        }
        async fn create_session(
            &self,
            user_id: Uuid,
            refresh_token_hash: &str,
            expires_at: chrono::DateTime<Utc>,
        ) -> StoreResult<RefreshSession> {
            self.inner
                .create_session(user_id, refresh_token_hash, expires_at)
                .await
        }
        async fn find_active_session(
            &self,
            refresh_token_hash: &str,
        ) -> StoreResult<Option<RefreshSession>> {
            self.inner.find_active_session(refresh_token_hash).await
        }
        async fn revoke_session(&self, id: Uuid) -> StoreResult<bool> {
            self.inner.revoke_session(id).await
        }
        async fn revoke_all_sessions(&self, user_id: Uuid) -> StoreResult<u64> {
            self.inner.revoke_all_sessions(user_id).await
        }
    }

    #[tokio::test]
    async fn test_failed_issuance_rolls_back_whole_purchase() {
        let store: Arc<dyn Store> = Arc::new(FlakyInserts {
            inner: MemoryStore::new(),
            allow: std::sync::atomic::AtomicUsize::new(2),
        });
        let event = store
            .create_event(&NewEvent {
                name: "Asefru".to_string(),
                slug: "asefru".to_string(),
                date: Utc::now(),
                end_date: None,
            })
            .await
            .unwrap();
        let inventory = Inventory::new(store.clone());
        inventory
            .set_limit(
                event.id,
                &TicketLimitInput {
                    ticket_type: "vip".to_string(),
                    max_tickets: 5,
                    price: Decimal::new(3000, 2),
                    currency: "EUR".to_string(),
                    is_active: true,
                },
            )
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let codec = Arc::new(TicketCodec::new(b"issuance-test-secret").unwrap());
        let issuer = TicketIssuer::new(store.clone(), codec, notifier.clone());

        let err = issuer
            .purchase(event.id, Uuid::new_v4(), &request(4))
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::Store(_)));

        // The two tickets that made it in were voided, all capacity returned.
        let tickets = store.list_tickets_for_event(event.id).await.unwrap();
        assert_eq!(tickets.len(), 2);
        assert!(tickets.iter().all(|t| t.status == TicketStatus::Void));
        assert_eq!(inventory.limits(event.id).await.unwrap()[0].sold_tickets, 0);
        assert!(notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_void_unknown_ticket() {
        let fx = fixture(1, RecordingNotifier::default()).await;
        let err = fx.issuer.void(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, TicketError::NotFound(_)));
    }
}
