use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    EventStore, InventoryStore, LimitOutcome, ReserveOutcome, ScanOutcome, StoreError,
    StoreResult, TicketStore, UserStore, VoidOutcome,
};
use crate::models::{
    Event, NewEvent, NewTicket, NewUser, RefreshSession, Reservation, Ticket, TicketLimit,
    TicketLimitInput, TicketStatus, User,
};

const EVENT_COLUMNS: &str = "id, name, slug, date, end_date, created_at";

const LIMIT_COLUMNS: &str =
    "event_id, ticket_type, max_tickets, sold_tickets, price, currency, is_active, updated_at";

const TICKET_COLUMNS: &str = "id, event_id, ticket_type, owner_user_id, attendee_name, \
                              attendee_email, status, code, price, currency, scanned_by, \
                              scanned_at, created_at, updated_at";

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at";

const SESSION_COLUMNS: &str =
    "id, user_id, refresh_token_hash, expires_at, is_revoked, created_at";

/// PostgreSQL unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            return StoreError::Duplicate(constraint);
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl EventStore for PgStore {
    async fn create_event(&self, input: &NewEvent) -> StoreResult<Event> {
        let query = format!(
            "INSERT INTO events (id, name, slug, date, end_date)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {EVENT_COLUMNS}"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(Uuid::new_v4())
            .bind(&input.name)
            .bind(&input.slug)
            .bind(input.date)
            .bind(input.end_date)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)
    }

    async fn get_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        Ok(sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY date ASC");
        Ok(sqlx::query_as::<_, Event>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete_event(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn upsert_limit(
        &self,
        event_id: Uuid,
        input: &TicketLimitInput,
    ) -> StoreResult<LimitOutcome> {
        // The conflict branch only fires when the new maximum still covers
        // what has been sold, so the check and the write are one statement.
        let query = format!(
            "INSERT INTO ticket_limits (event_id, ticket_type, max_tickets, price, currency, is_active)
             SELECT $1, $2, $3, $4, $5, $6
             WHERE EXISTS (SELECT 1 FROM events WHERE id = $1)
             ON CONFLICT (event_id, ticket_type) DO UPDATE
                SET max_tickets = EXCLUDED.max_tickets,
                    price = EXCLUDED.price,
                    currency = EXCLUDED.currency,
                    is_active = EXCLUDED.is_active,
                    updated_at = NOW()
                WHERE ticket_limits.sold_tickets <= EXCLUDED.max_tickets
             RETURNING {LIMIT_COLUMNS}"
        );
        let saved = sqlx::query_as::<_, TicketLimit>(&query)
            .bind(event_id)
            .bind(&input.ticket_type)
            .bind(input.max_tickets)
            .bind(input.price)
            .bind(&input.currency)
            .bind(input.is_active)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(limit) = saved {
            return Ok(LimitOutcome::Saved(limit));
        }

        let sold: Option<i32> = sqlx::query_scalar(
            "SELECT sold_tickets FROM ticket_limits WHERE event_id = $1 AND ticket_type = $2",
        )
        .bind(event_id)
        .bind(&input.ticket_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match sold {
            Some(sold) => LimitOutcome::BelowSold { sold },
            None => LimitOutcome::EventNotFound,
        })
    }

    async fn list_limits(&self, event_id: Uuid) -> StoreResult<Vec<TicketLimit>> {
        let query = format!(
            "SELECT {LIMIT_COLUMNS} FROM ticket_limits WHERE event_id = $1 ORDER BY price ASC, ticket_type ASC"
        );
        Ok(sqlx::query_as::<_, TicketLimit>(&query)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn reserve(
        &self,
        event_id: Uuid,
        ticket_type: &str,
        quantity: i32,
    ) -> StoreResult<ReserveOutcome> {
        // Row-level locking makes concurrent updaters re-evaluate the WHERE
        // clause against the committed count, so capacity cannot be oversold.
        let reserved: Option<(Decimal, String)> = sqlx::query_as(
            "UPDATE ticket_limits
                SET sold_tickets = sold_tickets + $3, updated_at = NOW()
              WHERE event_id = $1
                AND ticket_type = $2
                AND is_active
                AND sold_tickets + $3 <= max_tickets
              RETURNING price, currency",
        )
        .bind(event_id)
        .bind(ticket_type)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((unit_price, currency)) = reserved {
            return Ok(ReserveOutcome::Reserved(Reservation {
                event_id,
                ticket_type: ticket_type.to_string(),
                quantity,
                unit_price,
                currency,
            }));
        }

        let remaining: Option<i32> = sqlx::query_scalar(
            "SELECT GREATEST(max_tickets - sold_tickets, 0)
               FROM ticket_limits
              WHERE event_id = $1 AND ticket_type = $2 AND is_active",
        )
        .bind(event_id)
        .bind(ticket_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match remaining {
            Some(remaining) => ReserveOutcome::SoldOut { remaining },
            None => ReserveOutcome::NoLimit,
        })
    }

    async fn release(&self, event_id: Uuid, ticket_type: &str, quantity: i32) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE ticket_limits
                SET sold_tickets = GREATEST(sold_tickets - $3, 0), updated_at = NOW()
              WHERE event_id = $1 AND ticket_type = $2",
        )
        .bind(event_id)
        .bind(ticket_type)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TicketStore for PgStore {
    async fn insert_ticket(&self, ticket: &NewTicket) -> StoreResult<Ticket> {
        let query = format!(
            "INSERT INTO tickets (id, event_id, ticket_type, owner_user_id, attendee_name,
                                  attendee_email, status, code, price, currency)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, Ticket>(&query)
            .bind(ticket.id)
            .bind(ticket.event_id)
            .bind(&ticket.ticket_type)
            .bind(ticket.owner_user_id)
            .bind(&ticket.attendee.name)
            .bind(&ticket.attendee.email)
            .bind(TicketStatus::Valid.as_str())
            .bind(&ticket.code)
            .bind(ticket.price)
            .bind(&ticket.currency)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)
    }

    async fn get_ticket(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
        Ok(sqlx::query_as::<_, Ticket>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_ticket_by_code(&self, code: &str) -> StoreResult<Option<Ticket>> {
        let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE code = $1");
        Ok(sqlx::query_as::<_, Ticket>(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_tickets_for_event(&self, event_id: Uuid) -> StoreResult<Vec<Ticket>> {
        let query = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE event_id = $1 ORDER BY created_at ASC"
        );
        Ok(sqlx::query_as::<_, Ticket>(&query)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_tickets_for_owner(&self, user_id: Uuid) -> StoreResult<Vec<Ticket>> {
        let query = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE owner_user_id = $1 ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Ticket>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn mark_used(
        &self,
        code: &str,
        scanner_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<ScanOutcome> {
        let query = format!(
            "UPDATE tickets
                SET status = 'used', scanned_by = $2, scanned_at = $3, updated_at = $3
              WHERE code = $1 AND status = 'valid'
              RETURNING {TICKET_COLUMNS}"
        );
        let accepted = sqlx::query_as::<_, Ticket>(&query)
            .bind(code)
            .bind(scanner_id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(ticket) = accepted {
            return Ok(ScanOutcome::Accepted(ticket));
        }

        match self.find_ticket_by_code(code).await? {
            None => Ok(ScanOutcome::NotFound),
            Some(ticket) => match ticket.status {
                TicketStatus::Used => Ok(ScanOutcome::AlreadyUsed(ticket)),
                TicketStatus::Void => Ok(ScanOutcome::Void(ticket)),
                TicketStatus::Valid => Err(StoreError::Inconsistent(format!(
                    "ticket {} still valid after a failed scan update",
                    ticket.id
                ))),
            },
        }
    }

    async fn void_ticket(&self, id: Uuid) -> StoreResult<VoidOutcome> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "UPDATE tickets SET status = 'void', updated_at = NOW()
              WHERE id = $1 AND status = 'valid'
              RETURNING {TICKET_COLUMNS}"
        );
        let voided = sqlx::query_as::<_, Ticket>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(ticket) = voided else {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM tickets WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Ok(match status.as_deref() {
                None => VoidOutcome::NotFound,
                Some("used") => VoidOutcome::AlreadyUsed,
                Some(_) => VoidOutcome::AlreadyVoid,
            });
        };

        sqlx::query(
            "UPDATE ticket_limits
                SET sold_tickets = GREATEST(sold_tickets - 1, 0), updated_at = NOW()
              WHERE event_id = $1 AND ticket_type = $2",
        )
        .bind(ticket.event_id)
        .bind(&ticket.ticket_type)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(VoidOutcome::Voided(ticket))
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, input: &NewUser) -> StoreResult<User> {
        let query = format!(
            "INSERT INTO users (id, name, email, password_hash, role)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(&input.name)
            .bind(&input.email)
            .bind(&input.password_hash)
            .bind(input.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(classify)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        refresh_token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<RefreshSession> {
        let query = format!(
            "INSERT INTO refresh_sessions (id, user_id, refresh_token_hash, expires_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {SESSION_COLUMNS}"
        );
        sqlx::query_as::<_, RefreshSession>(&query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(refresh_token_hash)
            .bind(expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)
    }

    async fn find_active_session(
        &self,
        refresh_token_hash: &str,
    ) -> StoreResult<Option<RefreshSession>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM refresh_sessions
              WHERE refresh_token_hash = $1
                AND is_revoked = false
                AND expires_at > NOW()"
        );
        Ok(sqlx::query_as::<_, RefreshSession>(&query)
            .bind(refresh_token_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn revoke_session(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET is_revoked = true WHERE id = $1 AND is_revoked = false",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_sessions(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET is_revoked = true
              WHERE user_id = $1 AND is_revoked = false",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
