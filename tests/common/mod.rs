#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use izuran_server::auth::{create_account, JwtConfig, NewAccount};
use izuran_server::config::{Config, StorageBackend};
use izuran_server::models::Role;
use izuran_server::routes::create_routes;
use izuran_server::services::LogNotifier;
use izuran_server::state::AppState;
use izuran_server::store::{MemoryStore, Store};

pub const PASSWORD: &str = "tifinagh-2024";

pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        database_max_connections: 1,
        storage: StorageBackend::Memory,
        host: "127.0.0.1".to_string(),
        port: 0,
        jwt: JwtConfig {
            secret: "test-jwt-secret-that-is-long-enough".to_string(),
            access_token_expiry_mins: 15,
            refresh_token_expiry_days: 7,
        },
        ticket_code_secret: "test-ticket-code-secret".to_string(),
        cors_origins: vec!["http://localhost:5173".to_string()],
        bootstrap_admin: None,
        production: false,
    }
}

/// The full router over a fresh in-memory store.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn Store>,
}

impl TestApp {
    pub fn new() -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let state = AppState::new(test_config(), store.clone(), Arc::new(LogNotifier))
            .expect("test state should build");
        Self {
            router: create_routes(state),
            store,
        }
    }

    /// Creates an account directly in the store.
    pub async fn user(&self, email: &str, role: Role) {
        let account = NewAccount {
            name: "Test User".to_string(),
            email: email.to_string(),
            password: PASSWORD.to_string(),
        };
        create_account(self.store.as_ref(), &account, role)
            .await
            .expect("account creation should succeed");
    }

    /// Creates an account and logs it in, returning the access token.
    pub async fn token_for(&self, email: &str, role: Role) -> String {
        self.user(email, role).await;
        let response = self
            .post("/api/auth/login", None, json!({ "email": email, "password": PASSWORD }))
            .await;
        assert_eq!(response.status(), 200);
        body_json(response).await["data"]["access_token"]
            .as_str()
            .expect("login should return an access token")
            .to_string()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Response<Body> {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Creates an event with one ticket type through the admin API and
    /// returns the event id.
    pub async fn event_with_limit(&self, admin: &str, slug: &str, max_tickets: i32) -> String {
        let response = self
            .post(
                "/api/admin/events",
                Some(admin),
                json!({
                    "name": "Izuran Night",
                    "slug": slug,
                    "date": "2030-06-21T20:00:00Z"
                }),
            )
            .await;
        assert_eq!(response.status(), 201);
        let event_id = body_json(response).await["data"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = self
            .post(
                &format!("/api/admin/events/{event_id}/ticket-limits"),
                Some(admin),
                json!({
                    "ticket_type": "general",
                    "max_tickets": max_tickets,
                    "price": "25.00",
                    "currency": "EUR"
                }),
            )
            .await;
        assert_eq!(response.status(), 200);
        event_id
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

pub fn purchase_body(quantity: i32) -> Value {
    json!({
        "ticket_type": "general",
        "quantity": quantity,
        "attendee": { "name": "Tala", "email": "tala@example.org" }
    })
}
