use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use crate::auth::RequireAdmin;
use crate::models::NewEvent;
use crate::state::AppState;
use crate::store::{EventStore, StoreError};
use crate::utils::error::{AppError, AppResult};
use crate::utils::response::{created, empty_success, success};

fn event_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Event '{id}' was not found"))
}

/// GET /api/events
pub async fn list_events(State(state): State<AppState>) -> AppResult<Response> {
    let events = state.store.list_events().await?;
    Ok(success(events, "Events retrieved"))
}

/// GET /api/events/:id
pub async fn get_event(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Response> {
    let Path(id) = id?;
    let event = state
        .store
        .get_event(id)
        .await?
        .ok_or_else(|| event_not_found(id))?;
    Ok(success(event, "Event retrieved"))
}

/// GET /api/events/:id/tickets
///
/// Public view of what can still be bought.
pub async fn get_availability(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Response> {
    let Path(id) = id?;
    let availability = state.inventory.availability(id).await?;
    Ok(success(availability, "Availability retrieved"))
}

/// POST /api/admin/events
pub async fn create_event(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    payload: Result<Json<NewEvent>, JsonRejection>,
) -> AppResult<Response> {
    let Json(input) = payload?;
    input.validate().map_err(AppError::ValidationError)?;

    let event = match state.store.create_event(&input).await {
        Ok(event) => event,
        Err(StoreError::Duplicate(_)) => {
            return Err(AppError::Conflict(format!(
                "An event with slug '{}' already exists",
                input.slug
            )))
        }
        Err(e) => return Err(e.into()),
    };

    info!(admin_id = %admin.user_id, event_id = %event.id, slug = %event.slug, "Event created");
    Ok(created(event, "Event created"))
}

/// DELETE /api/admin/events/:id
///
/// Removes the event together with its ticket limits and tickets.
pub async fn delete_event(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Response> {
    let Path(id) = id?;
    if !state.store.delete_event(id).await? {
        return Err(event_not_found(id));
    }
    info!(admin_id = %admin.user_id, event_id = %id, "Event deleted");
    Ok(empty_success("Event deleted"))
}
