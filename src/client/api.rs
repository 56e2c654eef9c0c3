use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::refresh::{RefreshCoordinator, RefreshError, TokenRefresher};
use crate::models::Ticket;
use crate::services::{Admission, Purchase, PurchaseRequest};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Not authenticated")]
    Unauthorized,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Response carried no data")]
    EmptyResponse,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Token pair handed out by login and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        let envelope: Envelope<T> = response.json().await?;
        return envelope.data.ok_or(ClientError::EmptyResponse);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }
    let body: ErrorEnvelope = response.json().await?;
    Err(ClientError::Api {
        status: status.as_u16(),
        code: body.error.code,
        message: body.error.message,
    })
}

/// Exchanges the stored refresh token at `POST /api/auth/refresh`.
pub struct HttpTokenRefresher {
    http: Client,
    refresh_url: String,
    refresh_token: Mutex<Option<String>>,
}

impl HttpTokenRefresher {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            refresh_url: format!("{}/api/auth/refresh", base_url.trim_end_matches('/')),
            refresh_token: Mutex::new(None),
        }
    }

    pub async fn set_refresh_token(&self, token: Option<String>) {
        *self.refresh_token.lock().await = token;
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self) -> Result<String, RefreshError> {
        let mut stored = self.refresh_token.lock().await;
        let Some(refresh_token) = stored.clone() else {
            return Err(RefreshError::Rejected("no refresh token".to_string()));
        };

        let response = self
            .http
            .post(&self.refresh_url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        match decode::<Session>(response).await {
            Ok(session) => {
                *stored = Some(session.refresh_token);
                Ok(session.access_token)
            }
            Err(ClientError::Http(e)) => Err(RefreshError::Transport(e.to_string())),
            Err(other) => {
                // Rotated or revoked; the old token will never work again.
                *stored = None;
                Err(RefreshError::Rejected(other.to_string()))
            }
        }
    }
}

/// JSON client for the ticketing API that refreshes expired sessions
/// transparently.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: RefreshCoordinator,
    refresher: Arc<HttpTokenRefresher>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = Client::new();
        let refresher = Arc::new(HttpTokenRefresher::new(http.clone(), &base_url));
        Self {
            tokens: RefreshCoordinator::new(refresher.clone()),
            http,
            base_url,
            refresher,
        }
    }

    pub fn tokens(&self) -> &RefreshCoordinator {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let session: Session = decode(response).await?;
        self.adopt(session).await;
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self
            .send_authorized(|http| http.post(self.url("/api/auth/logout")))
            .await;
        self.tokens.clear();
        self.refresher.set_refresh_token(None).await;
        result.map(|_| ())
    }

    async fn adopt(&self, session: Session) {
        self.tokens.set_token(session.access_token);
        self.refresher
            .set_refresh_token(Some(session.refresh_token))
            .await;
    }

    /// Sends an authenticated request, refreshing and retrying once on 401.
    ///
    /// `build` is called again for the retry, so it must be repeatable.
    pub async fn send_authorized<F>(&self, build: F) -> Result<Response, ClientError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = match self.tokens.current_token() {
            Some(token) => token,
            None => self
                .tokens
                .ensure_fresh_token()
                .await
                .ok_or(ClientError::Unauthorized)?,
        };

        let response = build(&self.http).bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("Access token rejected, refreshing");
        let token = self
            .tokens
            .ensure_fresh_token()
            .await
            .ok_or(ClientError::Unauthorized)?;
        let response = build(&self.http).bearer_auth(&token).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        Ok(response)
    }

    pub async fn my_tickets(&self) -> Result<Vec<Ticket>, ClientError> {
        let response = self
            .send_authorized(|http| http.get(self.url("/api/tickets/mine")))
            .await?;
        decode(response).await
    }

    pub async fn purchase(
        &self,
        event_id: Uuid,
        request: &PurchaseRequest,
    ) -> Result<Purchase, ClientError> {
        let url = self.url(&format!("/api/tickets/purchase/{event_id}"));
        let response = self
            .send_authorized(|http| http.post(&url).json(request))
            .await?;
        decode(response).await
    }

    pub async fn validate_ticket(&self, code: &str) -> Result<Admission, ClientError> {
        let body = ValidateBody { code };
        let response = self
            .send_authorized(|http| http.post(self.url("/api/admin/tickets/validate")).json(&body))
            .await?;
        decode(response).await
    }
}

#[derive(Serialize)]
struct ValidateBody<'a> {
    code: &'a str,
}
