//! Persistence seams for events, ticket inventory, tickets and users.
//!
//! Every operation that guards an invariant (`reserve`, `mark_used`,
//! `void_ticket`, `upsert_limit`) is a single indivisible step against the
//! backing store. Callers never read-then-write to make an admission decision.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Event, NewEvent, NewTicket, NewUser, RefreshSession, Reservation, Ticket, TicketLimit,
    TicketLimitInput, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate value violates unique constraint: {0}")]
    Duplicate(String),

    #[error("Inconsistent store state: {0}")]
    Inconsistent(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    Reserved(Reservation),
    /// No active limit for the (event, ticket type) pair.
    NoLimit,
    SoldOut { remaining: i32 },
}

#[derive(Debug, Clone)]
pub enum LimitOutcome {
    Saved(TicketLimit),
    EventNotFound,
    /// The new maximum would fall below what is already sold.
    BelowSold { sold: i32 },
}

#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Accepted(Ticket),
    NotFound,
    AlreadyUsed(Ticket),
    Void(Ticket),
}

#[derive(Debug, Clone)]
pub enum VoidOutcome {
    Voided(Ticket),
    NotFound,
    AlreadyUsed,
    AlreadyVoid,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create_event(&self, input: &NewEvent) -> StoreResult<Event>;
    async fn get_event(&self, id: Uuid) -> StoreResult<Option<Event>>;
    async fn list_events(&self) -> StoreResult<Vec<Event>>;
    /// Removes the event together with its limits and tickets.
    async fn delete_event(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn upsert_limit(&self, event_id: Uuid, input: &TicketLimitInput)
        -> StoreResult<LimitOutcome>;
    async fn list_limits(&self, event_id: Uuid) -> StoreResult<Vec<TicketLimit>>;
    /// Conditionally increments `sold_tickets` by `quantity`.
    async fn reserve(
        &self,
        event_id: Uuid,
        ticket_type: &str,
        quantity: i32,
    ) -> StoreResult<ReserveOutcome>;
    /// Returns capacity, never taking `sold_tickets` below zero.
    async fn release(&self, event_id: Uuid, ticket_type: &str, quantity: i32)
        -> StoreResult<bool>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert_ticket(&self, ticket: &NewTicket) -> StoreResult<Ticket>;
    async fn get_ticket(&self, id: Uuid) -> StoreResult<Option<Ticket>>;
    async fn find_ticket_by_code(&self, code: &str) -> StoreResult<Option<Ticket>>;
    async fn list_tickets_for_event(&self, event_id: Uuid) -> StoreResult<Vec<Ticket>>;
    async fn list_tickets_for_owner(&self, user_id: Uuid) -> StoreResult<Vec<Ticket>>;
    /// Transitions valid -> used if and only if the ticket is still valid.
    async fn mark_used(
        &self,
        code: &str,
        scanner_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<ScanOutcome>;
    /// Transitions valid -> void and gives one unit back to the ticket limit.
    async fn void_ticket(&self, id: Uuid) -> StoreResult<VoidOutcome>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, input: &NewUser) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn create_session(
        &self,
        user_id: Uuid,
        refresh_token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<RefreshSession>;
    /// Only returns sessions that are neither revoked nor expired.
    async fn find_active_session(&self, refresh_token_hash: &str)
        -> StoreResult<Option<RefreshSession>>;
    /// Returns `true` only for the caller that actually revoked the session.
    async fn revoke_session(&self, id: Uuid) -> StoreResult<bool>;
    async fn revoke_all_sessions(&self, user_id: Uuid) -> StoreResult<u64>;
}

/// Everything the server needs from persistence.
pub trait Store: EventStore + InventoryStore + TicketStore + UserStore {}

impl<T> Store for T where T: EventStore + InventoryStore + TicketStore + UserStore {}
