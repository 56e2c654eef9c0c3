use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub name: String,
    pub slug: String,
    pub date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl NewEvent {
    /// Checks the fields a store cannot enforce on its own.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Event name must not be empty".to_string());
        }
        if !is_valid_slug(&self.slug) {
            return Err(format!(
                "Invalid slug '{}': use lowercase letters, digits and dashes",
                self.slug
            ));
        }
        if let Some(end) = self.end_date {
            if end < self.date {
                return Err("Event end date must not be before its start date".to_string());
            }
        }
        Ok(())
    }
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
