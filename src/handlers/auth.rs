//! Handlers for `/api/auth` and staff account provisioning.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::accounts::normalize_email;
use crate::auth::jwt::{generate_access_token, generate_refresh_token, hash_refresh_token};
use crate::auth::password::verify_password;
use crate::auth::{create_account, AuthUser, NewAccount, RequireAdmin};
use crate::models::{Role, User};
use crate::state::AppState;
use crate::store::UserStore;
use crate::utils::error::{AppError, AppResult};
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct StaffAccountRequest {
    #[serde(flatten)]
    pub account: NewAccount,
    pub role: Role,
}

/// Returned by register, login and refresh.
#[derive(Debug, Serialize)]
pub struct AuthPayload {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: User,
}

/// POST /api/auth/register
///
/// Self-service signup. Always creates a customer.
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<NewAccount>, JsonRejection>,
) -> AppResult<Response> {
    let Json(account) = payload?;
    let user = create_account(state.store.as_ref(), &account, Role::Customer).await?;
    let payload = start_session(&state, user).await?;
    Ok(created(payload, "Account created"))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(input) = payload?;
    let invalid = || AppError::AuthError("Invalid email or password".to_string());

    let user = state
        .store
        .find_user_by_email(&normalize_email(&input.email))
        .await?
        .ok_or_else(invalid)?;

    let password_valid = verify_password(&input.password, &user.password_hash)
        .map_err(|e| AppError::InternalServerError(format!("Password verification error: {e}")))?;
    if !password_valid {
        warn!(user_id = %user.id, "Failed login attempt");
        return Err(invalid());
    }

    info!(user_id = %user.id, "User logged in");
    let payload = start_session(&state, user).await?;
    Ok(success(payload, "Login successful"))
}

/// POST /api/auth/refresh
///
/// Exchanges a refresh token for a new token pair. The presented token is
/// revoked, so each refresh token works exactly once.
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(input) = payload?;
    let rejected = || AppError::AuthError("Invalid or expired refresh token".to_string());

    let session = state
        .store
        .find_active_session(&hash_refresh_token(&input.refresh_token))
        .await?
        .ok_or_else(rejected)?;

    // Two concurrent refreshes with the same token: only one wins the revoke.
    if !state.store.revoke_session(session.id).await? {
        return Err(rejected());
    }

    let user = state
        .store
        .find_user_by_id(session.user_id)
        .await?
        .ok_or_else(|| AppError::AuthError("User no longer exists".to_string()))?;

    let payload = start_session(&state, user).await?;
    Ok(success(payload, "Token refreshed"))
}

/// POST /api/auth/logout
///
/// Revokes every refresh session of the caller.
pub async fn logout(State(state): State<AppState>, auth_user: AuthUser) -> AppResult<Response> {
    let revoked = state.store.revoke_all_sessions(auth_user.user_id).await?;
    info!(user_id = %auth_user.user_id, revoked, "User logged out");
    Ok(empty_success("Logged out"))
}

/// POST /api/admin/users
///
/// Provisions an account with any role, typically a door scanner.
pub async fn create_staff_account(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    payload: Result<Json<StaffAccountRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(input) = payload?;
    let user = create_account(state.store.as_ref(), &input.account, input.role).await?;
    info!(admin_id = %admin.user_id, user_id = %user.id, role = %user.role, "Staff account provisioned");
    Ok(created(user, "Account created"))
}

async fn start_session(state: &AppState, user: User) -> AppResult<AuthPayload> {
    let jwt = &state.config.jwt;
    let access_token = generate_access_token(user.id, user.role, jwt)
        .map_err(|e| AppError::InternalServerError(format!("Token generation error: {e}")))?;

    let (refresh_token, refresh_hash) = generate_refresh_token();
    let expires_at = Utc::now() + chrono::Duration::days(jwt.refresh_token_expiry_days);
    state
        .store
        .create_session(user.id, &refresh_hash, expires_at)
        .await?;

    Ok(AuthPayload {
        access_token,
        refresh_token,
        expires_in: jwt.access_token_expiry_mins * 60,
        user,
    })
}
