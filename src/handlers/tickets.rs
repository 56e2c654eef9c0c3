use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AuthUser, RequireAdmin, RequireStaff};
use crate::models::TicketLimitInput;
use crate::services::PurchaseRequest;
use crate::state::AppState;
use crate::store::{EventStore, TicketStore};
use crate::utils::error::{AppError, AppResult};
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub code: String,
}

/// POST /api/admin/events/:id/ticket-limits
///
/// Creates or replaces the limit for one ticket type.
pub async fn set_ticket_limit(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    event_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<TicketLimitInput>, JsonRejection>,
) -> AppResult<Response> {
    let Path(event_id) = event_id?;
    let Json(input) = payload?;
    let limit = state.inventory.set_limit(event_id, &input).await?;
    Ok(success(limit, "Ticket limit saved"))
}

/// GET /api/admin/events/:id/tickets
pub async fn list_event_tickets(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    event_id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Response> {
    let Path(event_id) = event_id?;
    if state.store.get_event(event_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Event '{event_id}' was not found"
        )));
    }
    let tickets = state.store.list_tickets_for_event(event_id).await?;
    Ok(success(tickets, "Tickets retrieved"))
}

/// POST /api/tickets/purchase/:event_id
pub async fn purchase(
    State(state): State<AppState>,
    auth_user: AuthUser,
    event_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Path(event_id) = event_id?;
    let Json(request) = payload?;
    let purchase = state
        .issuer
        .purchase(event_id, auth_user.user_id, &request)
        .await?;
    Ok(created(purchase, "Tickets purchased"))
}

/// GET /api/tickets/mine
pub async fn my_tickets(State(state): State<AppState>, auth_user: AuthUser) -> AppResult<Response> {
    let tickets = state.store.list_tickets_for_owner(auth_user.user_id).await?;
    Ok(success(tickets, "Tickets retrieved"))
}

/// POST /api/admin/tickets/:id/void
pub async fn void_ticket(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ticket_id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Response> {
    let Path(ticket_id) = ticket_id?;
    let ticket = state.issuer.void(ticket_id).await?;
    Ok(success(ticket, "Ticket voided"))
}

/// POST /api/admin/tickets/validate
///
/// Door check. A ticket is admitted at most once; the scanning account is
/// recorded against it.
pub async fn validate_ticket(
    State(state): State<AppState>,
    RequireStaff(scanner): RequireStaff,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(input) = payload?;
    let admission = state
        .validator
        .validate(&input.code, scanner.user_id)
        .await?;
    Ok(success(admission, "Ticket accepted"))
}
