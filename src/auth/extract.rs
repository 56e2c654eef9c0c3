//! Bearer-token extractors for axum handlers.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use uuid::Uuid;

use super::jwt::validate_token;
use crate::models::Role;
use crate::state::AppState;
use crate::utils::error::AppError;

/// The caller identified by a valid `Authorization: Bearer <jwt>` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::AuthError("Missing Authorization header".to_string()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::AuthError("Invalid Authorization format. Expected: Bearer <token>".to_string())
        })?;

        let claims = validate_token(token, &state.config.jwt)
            .map_err(|_| AppError::AuthError("Invalid or expired token".to_string()))?;

        Ok(AuthUser {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}

/// Admin only.
pub struct RequireAdmin(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(AppError::Forbidden("Admin role required".to_string()));
        }
        Ok(RequireAdmin(user))
    }
}

/// Door staff: admins and scanners.
pub struct RequireStaff(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !matches!(user.role, Role::Admin | Role::Scanner) {
            return Err(AppError::Forbidden("Scanner or Admin role required".to_string()));
        }
        Ok(RequireStaff(user))
    }
}
