use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::services::TicketError;
use crate::store::StoreError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Sold out: {remaining} remaining")]
    SoldOut { remaining: i32 },

    #[error("Ticket already used")]
    AlreadyUsed {
        scanned_at: Option<DateTime<Utc>>,
        scanned_by: Option<Uuid>,
    },

    #[error("Ticket is void")]
    TicketVoid,

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal server error")]
    InternalServerError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_)
            | AppError::SoldOut { .. }
            | AppError::AlreadyUsed { .. }
            | AppError::TicketVoid => StatusCode::CONFLICT,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::SoldOut { .. } => "SOLD_OUT",
            AppError::AlreadyUsed { .. } => "ALREADY_USED",
            AppError::TicketVoid => "TICKET_VOID",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::InternalServerError(msg) => {
                error!(message = %msg, "Internal server error");
            }
            other => {
                warn!(code = other.code(), error = %other, "Request rejected");
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::SoldOut { remaining: 0 } => "Tickets of this type are sold out".to_string(),
            AppError::SoldOut { remaining } => {
                format!("Only {remaining} ticket(s) of this type remain")
            }
            AppError::AlreadyUsed { .. } => "Ticket has already been used".to_string(),
            AppError::TicketVoid => "Ticket has been cancelled".to_string(),
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::SoldOut { remaining } => Some(json!({ "remaining": remaining })),
            AppError::AlreadyUsed {
                scanned_at,
                scanned_by,
            } => Some(json!({ "scanned_at": scanned_at, "scanned_by": scanned_by })),
            _ => None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::DatabaseError(e),
            StoreError::Duplicate(constraint) => {
                AppError::Conflict(format!("Duplicate value violates {constraint}"))
            }
            StoreError::Inconsistent(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<TicketError> for AppError {
    fn from(err: TicketError) -> Self {
        match err {
            TicketError::NotFound(msg) => AppError::NotFound(msg),
            TicketError::SoldOut { remaining } => AppError::SoldOut { remaining },
            TicketError::AlreadyUsed {
                scanned_at,
                scanned_by,
            } => AppError::AlreadyUsed {
                scanned_at,
                scanned_by,
            },
            TicketError::Void => AppError::TicketVoid,
            TicketError::Validation(msg) => AppError::ValidationError(msg),
            TicketError::Store(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        error_response(code, self.public_message(), self.details(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_errors_map_to_statuses() {
        let cases = [
            (TicketError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (TicketError::SoldOut { remaining: 0 }, StatusCode::CONFLICT, "SOLD_OUT"),
            (
                TicketError::AlreadyUsed {
                    scanned_at: None,
                    scanned_by: None,
                },
                StatusCode::CONFLICT,
                "ALREADY_USED",
            ),
            (TicketError::Void, StatusCode::CONFLICT, "TICKET_VOID"),
            (
                TicketError::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
        ];

        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status_code(), status);
            assert_eq!(app.code(), code);
        }
    }

    #[test]
    fn test_store_errors_hide_details() {
        let app: AppError = StoreError::Inconsistent("index drift".into()).into();
        assert_eq!(app.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!app.public_message().contains("index drift"));

        let dup: AppError = StoreError::Duplicate("uq_events_slug".into()).into();
        assert_eq!(dup.status_code(), StatusCode::CONFLICT);
    }
}
