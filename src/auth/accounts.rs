//! Account creation shared by self-registration, staff provisioning and the
//! startup admin seed.

use serde::Deserialize;
use tracing::info;

use super::password::{hash_password, MIN_PASSWORD_LENGTH};
use crate::models::{is_valid_email, NewUser, Role, User};
use crate::store::{Store, StoreError, UserStore};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl NewAccount {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Name is required".to_string());
        }
        if !is_valid_email(&self.email) {
            return Err("A valid email address is required".to_string());
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            ));
        }
        Ok(())
    }
}

/// Emails are compared case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn create_account(
    store: &dyn Store,
    account: &NewAccount,
    role: Role,
) -> Result<User, AppError> {
    account.validate().map_err(AppError::ValidationError)?;

    let password_hash = hash_password(&account.password)
        .map_err(|e| AppError::InternalServerError(format!("Password hashing error: {e}")))?;

    let input = NewUser {
        name: account.name.trim().to_string(),
        email: normalize_email(&account.email),
        password_hash,
        role,
    };

    match store.create_user(&input).await {
        Ok(user) => {
            info!(user_id = %user.id, role = %user.role, "Account created");
            Ok(user)
        }
        Err(StoreError::Duplicate(_)) => Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Creates the configured admin unless an account with that email exists.
/// Returns whether a new account was created.
pub async fn ensure_admin(store: &dyn Store, email: &str, password: &str) -> Result<bool, AppError> {
    if store
        .find_user_by_email(&normalize_email(email))
        .await?
        .is_some()
    {
        return Ok(false);
    }

    let account = NewAccount {
        name: "Administrator".to_string(),
        email: email.to_string(),
        password: password.to_string(),
    };
    create_account(store, &account, Role::Admin).await?;
    Ok(true)
}
