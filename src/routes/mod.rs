use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{auth, events, health_check, tickets};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let security = create_security_headers_layer(state.config.production);
    let cors = create_cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes())
        .nest("/api/events", event_routes())
        .nest("/api/tickets", ticket_routes())
        .nest("/api/admin", admin_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(security)
        .layer(cors)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
}

fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(events::list_events))
        .route("/:id", get(events::get_event))
        .route("/:id/tickets", get(events::get_availability))
}

fn ticket_routes() -> Router<AppState> {
    Router::new()
        .route("/purchase/:event_id", post(tickets::purchase))
        .route("/mine", get(tickets::my_tickets))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(auth::create_staff_account))
        .route("/events", post(events::create_event))
        .route("/events/:id", delete(events::delete_event))
        .route("/events/:id/ticket-limits", post(tickets::set_ticket_limit))
        .route("/events/:id/tickets", get(tickets::list_event_tickets))
        .route("/tickets/validate", post(tickets::validate_ticket))
        .route("/tickets/:id/void", post(tickets::void_ticket))
}
