//! In-process store for development and tests.
//!
//! All tables live behind one lock, so each trait method is a single critical
//! section and observes the same atomicity as the PostgreSQL statements.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    EventStore, InventoryStore, LimitOutcome, ReserveOutcome, ScanOutcome, StoreError,
    StoreResult, TicketStore, UserStore, VoidOutcome,
};
use crate::models::{
    Event, NewEvent, NewTicket, NewUser, RefreshSession, Reservation, Ticket, TicketLimit,
    TicketLimitInput, TicketStatus, User,
};

type LimitKey = (Uuid, String);

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    limits: HashMap<LimitKey, TicketLimit>,
    tickets: HashMap<Uuid, Ticket>,
    codes: HashMap<String, Uuid>,
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, RefreshSession>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn limit_key(event_id: Uuid, ticket_type: &str) -> LimitKey {
    (event_id, ticket_type.to_string())
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create_event(&self, input: &NewEvent) -> StoreResult<Event> {
        let mut tables = self.tables.write().await;
        if tables.events.values().any(|e| e.slug == input.slug) {
            return Err(StoreError::Duplicate("uq_events_slug".to_string()));
        }
        let event = Event {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            slug: input.slug.clone(),
            date: input.date,
            end_date: input.end_date,
            created_at: Utc::now(),
        };
        tables.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self.tables.read().await.events.values().cloned().collect();
        events.sort_by_key(|e| e.date);
        Ok(events)
    }

    async fn delete_event(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.events.remove(&id).is_none() {
            return Ok(false);
        }
        tables.limits.retain(|(event_id, _), _| *event_id != id);
        let removed: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.event_id == id)
            .cloned()
            .collect();
        for ticket in removed {
            tables.tickets.remove(&ticket.id);
            tables.codes.remove(&ticket.code);
        }
        Ok(true)
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn upsert_limit(
        &self,
        event_id: Uuid,
        input: &TicketLimitInput,
    ) -> StoreResult<LimitOutcome> {
        let mut tables = self.tables.write().await;
        if !tables.events.contains_key(&event_id) {
            return Ok(LimitOutcome::EventNotFound);
        }

        let key = limit_key(event_id, &input.ticket_type);
        let sold = tables.limits.get(&key).map_or(0, |l| l.sold_tickets);
        if sold > input.max_tickets {
            return Ok(LimitOutcome::BelowSold { sold });
        }

        let limit = TicketLimit {
            event_id,
            ticket_type: input.ticket_type.clone(),
            max_tickets: input.max_tickets,
            sold_tickets: sold,
            price: input.price,
            currency: input.currency.clone(),
            is_active: input.is_active,
            updated_at: Utc::now(),
        };
        tables.limits.insert(key, limit.clone());
        Ok(LimitOutcome::Saved(limit))
    }

    async fn list_limits(&self, event_id: Uuid) -> StoreResult<Vec<TicketLimit>> {
        let mut limits: Vec<TicketLimit> = self
            .tables
            .read()
            .await
            .limits
            .values()
            .filter(|l| l.event_id == event_id)
            .cloned()
            .collect();
        limits.sort_by(|a, b| {
            a.price
                .cmp(&b.price)
                .then_with(|| a.ticket_type.cmp(&b.ticket_type))
        });
        Ok(limits)
    }

    async fn reserve(
        &self,
        event_id: Uuid,
        ticket_type: &str,
        quantity: i32,
    ) -> StoreResult<ReserveOutcome> {
        let mut tables = self.tables.write().await;
        let Some(limit) = tables
            .limits
            .get_mut(&limit_key(event_id, ticket_type))
            .filter(|l| l.is_active)
        else {
            return Ok(ReserveOutcome::NoLimit);
        };

        if limit.sold_tickets + quantity > limit.max_tickets {
            return Ok(ReserveOutcome::SoldOut {
                remaining: limit.remaining(),
            });
        }

        limit.sold_tickets += quantity;
        limit.updated_at = Utc::now();
        Ok(ReserveOutcome::Reserved(Reservation {
            event_id,
            ticket_type: ticket_type.to_string(),
            quantity,
            unit_price: limit.price,
            currency: limit.currency.clone(),
        }))
    }

    async fn release(&self, event_id: Uuid, ticket_type: &str, quantity: i32) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.limits.get_mut(&limit_key(event_id, ticket_type)) {
            Some(limit) => {
                limit.sold_tickets = (limit.sold_tickets - quantity).max(0);
                limit.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn insert_ticket(&self, ticket: &NewTicket) -> StoreResult<Ticket> {
        let mut tables = self.tables.write().await;
        if tables.codes.contains_key(&ticket.code) {
            return Err(StoreError::Duplicate("uq_tickets_code".to_string()));
        }
        if tables.tickets.contains_key(&ticket.id) {
            return Err(StoreError::Duplicate("tickets_pkey".to_string()));
        }

        let now = Utc::now();
        let row = Ticket {
            id: ticket.id,
            event_id: ticket.event_id,
            ticket_type: ticket.ticket_type.clone(),
            owner_user_id: ticket.owner_user_id,
            attendee_name: ticket.attendee.name.clone(),
            attendee_email: ticket.attendee.email.clone(),
            status: TicketStatus::Valid,
            code: ticket.code.clone(),
            price: ticket.price,
            currency: ticket.currency.clone(),
            scanned_by: None,
            scanned_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.codes.insert(row.code.clone(), row.id);
        tables.tickets.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_ticket(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(self.tables.read().await.tickets.get(&id).cloned())
    }

    async fn find_ticket_by_code(&self, code: &str) -> StoreResult<Option<Ticket>> {
        let tables = self.tables.read().await;
        Ok(tables
            .codes
            .get(code)
            .and_then(|id| tables.tickets.get(id))
            .cloned())
    }

    async fn list_tickets_for_event(&self, event_id: Uuid) -> StoreResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tables
            .read()
            .await
            .tickets
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.created_at);
        Ok(tickets)
    }

    async fn list_tickets_for_owner(&self, user_id: Uuid) -> StoreResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tables
            .read()
            .await
            .tickets
            .values()
            .filter(|t| t.owner_user_id == user_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    async fn mark_used(
        &self,
        code: &str,
        scanner_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<ScanOutcome> {
        let mut tables = self.tables.write().await;
        let Some(id) = tables.codes.get(code).copied() else {
            return Ok(ScanOutcome::NotFound);
        };
        let Some(ticket) = tables.tickets.get_mut(&id) else {
            return Err(StoreError::Inconsistent(format!(
                "code index points at missing ticket {id}"
            )));
        };

        match ticket.status {
            TicketStatus::Used => Ok(ScanOutcome::AlreadyUsed(ticket.clone())),
            TicketStatus::Void => Ok(ScanOutcome::Void(ticket.clone())),
            TicketStatus::Valid => {
                ticket.status = TicketStatus::Used;
                ticket.scanned_by = Some(scanner_id);
                ticket.scanned_at = Some(at);
                ticket.updated_at = at;
                Ok(ScanOutcome::Accepted(ticket.clone()))
            }
        }
    }

    async fn void_ticket(&self, id: Uuid) -> StoreResult<VoidOutcome> {
        let mut tables = self.tables.write().await;
        let Some(ticket) = tables.tickets.get_mut(&id) else {
            return Ok(VoidOutcome::NotFound);
        };

        match ticket.status {
            TicketStatus::Used => return Ok(VoidOutcome::AlreadyUsed),
            TicketStatus::Void => return Ok(VoidOutcome::AlreadyVoid),
            TicketStatus::Valid => {}
        }

        ticket.status = TicketStatus::Void;
        ticket.updated_at = Utc::now();
        let voided = ticket.clone();

        if let Some(limit) = tables
            .limits
            .get_mut(&limit_key(voided.event_id, &voided.ticket_type))
        {
            limit.sold_tickets = (limit.sold_tickets - 1).max(0);
            limit.updated_at = voided.updated_at;
        }
        Ok(VoidOutcome::Voided(voided))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, input: &NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == input.email) {
            return Err(StoreError::Duplicate("uq_users_email".to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            email: input.email.clone(),
            password_hash: input.password_hash.clone(),
            role: input.role,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        refresh_token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<RefreshSession> {
        let mut tables = self.tables.write().await;
        if tables
            .sessions
            .values()
            .any(|s| s.refresh_token_hash == refresh_token_hash)
        {
            return Err(StoreError::Duplicate("uq_refresh_sessions_hash".to_string()));
        }
        let session = RefreshSession {
            id: Uuid::new_v4(),
            user_id,
            refresh_token_hash: refresh_token_hash.to_string(),
            expires_at,
            is_revoked: false,
            created_at: Utc::now(),
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_active_session(
        &self,
        refresh_token_hash: &str,
    ) -> StoreResult<Option<RefreshSession>> {
        let now = Utc::now();
        Ok(self
            .tables
            .read()
            .await
            .sessions
            .values()
            .find(|s| {
                s.refresh_token_hash == refresh_token_hash && !s.is_revoked && s.expires_at > now
            })
            .cloned())
    }

    async fn revoke_session(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(&id) {
            Some(session) if !session.is_revoked => {
                session.is_revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_sessions(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut revoked = 0;
        for session in tables
            .sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && !s.is_revoked)
        {
            session.is_revoked = true;
            revoked += 1;
        }
        Ok(revoked)
    }
}
