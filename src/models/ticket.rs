use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::user::is_valid_email;

/// Prices are stored as `NUMERIC(10, 2)`.
const PRICE_SCALE: u32 = 2;
const PRICE_LIMIT: i64 = 100_000_000;

/// Capacity record bounding how many tickets of one type may be sold for an event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketLimit {
    pub event_id: Uuid,
    pub ticket_type: String,
    pub max_tickets: i32,
    pub sold_tickets: i32,
    pub price: Decimal,
    pub currency: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl TicketLimit {
    pub fn remaining(&self) -> i32 {
        (self.max_tickets - self.sold_tickets).max(0)
    }
}

/// Admin input for creating or replacing a ticket limit.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketLimitInput {
    pub ticket_type: String,
    pub max_tickets: i32,
    pub price: Decimal,
    pub currency: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl TicketLimitInput {
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_ticket_type(&self.ticket_type) {
            return Err(format!(
                "Invalid ticket type '{}': use lowercase letters, digits and underscores",
                self.ticket_type
            ));
        }
        if self.max_tickets < 0 {
            return Err("max_tickets must not be negative".to_string());
        }
        if self.price.is_sign_negative() {
            return Err("price must not be negative".to_string());
        }
        if self.price.scale() > PRICE_SCALE {
            return Err(format!(
                "price must have at most {PRICE_SCALE} decimal places"
            ));
        }
        if self.price >= Decimal::from(PRICE_LIMIT) {
            return Err(format!("price must be below {PRICE_LIMIT}"));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(format!(
                "Invalid currency '{}': expected a 3 letter code",
                self.currency
            ));
        }
        Ok(())
    }
}

fn is_valid_ticket_type(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 64
        && tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Public view of an active limit: what can still be bought and for how much.
#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub ticket_type: String,
    pub price: Decimal,
    pub currency: String,
    pub remaining: i32,
    pub sold_out: bool,
}

impl From<&TicketLimit> for Availability {
    fn from(limit: &TicketLimit) -> Self {
        let remaining = limit.remaining();
        Self {
            ticket_type: limit.ticket_type.clone(),
            price: limit.price,
            currency: limit.currency.clone(),
            remaining,
            sold_out: remaining == 0,
        }
    }
}

/// Capacity taken by a successful `reserve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub event_id: Uuid,
    pub ticket_type: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Valid,
    Used,
    Void,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Valid => "valid",
            TicketStatus::Used => "used",
            TicketStatus::Void => "void",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown ticket status '{0}'")]
pub struct UnknownStatus(String);

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(TicketStatus::Valid),
            "used" => Ok(TicketStatus::Used),
            "void" => Ok(TicketStatus::Void),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for TicketStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeInfo {
    pub name: String,
    pub email: String,
}

impl AttendeeInfo {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Attendee name must not be empty".to_string());
        }
        if !is_valid_email(&self.email) {
            return Err(format!("Invalid attendee email '{}'", self.email));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub ticket_type: String,
    pub owner_user_id: Uuid,
    pub attendee_name: String,
    pub attendee_email: String,
    #[sqlx(try_from = "String")]
    pub status: TicketStatus,
    pub code: String,
    pub price: Decimal,
    pub currency: String,
    pub scanned_by: Option<Uuid>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn attendee(&self) -> AttendeeInfo {
        AttendeeInfo {
            name: self.attendee_name.clone(),
            email: self.attendee_email.clone(),
        }
    }
}

/// Row data for a ticket about to be persisted.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub ticket_type: String,
    pub owner_user_id: Uuid,
    pub attendee: AttendeeInfo,
    pub code: String,
    pub price: Decimal,
    pub currency: String,
}
