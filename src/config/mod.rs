use std::env;
use std::str::FromStr;

use crate::auth::JwtConfig;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/izuran";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 15;
const DEFAULT_REFRESH_EXPIRY_DAYS: i64 = 7;
const MAX_ACCESS_EXPIRY_MINS: i64 = 24 * 60;
const MAX_REFRESH_EXPIRY_DAYS: i64 = 365;
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub storage: StorageBackend,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub ticket_code_secret: String,
    pub cors_origins: Vec<String>,
    /// Seeded at startup when both `ADMIN_EMAIL` and `ADMIN_PASSWORD` are set.
    pub bootstrap_admin: Option<AdminSeed>,
    /// Enables production-only behaviour such as HSTS.
    pub production: bool,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    ///
    /// `JWT_SECRET` and `TICKET_CODE_SECRET` are required; everything else
    /// has a development default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let parsed = |name: &'static str, default: &str| -> Result<String, ConfigError> {
            Ok(lookup(name).unwrap_or_else(|| default.to_string()))
        };

        let storage_raw = parsed("STORAGE_BACKEND", "postgres")?;
        let storage = storage_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "STORAGE_BACKEND",
            value: storage_raw.clone(),
        })?;

        let cors_origins = parsed("CORS_ALLOWED_ORIGINS", DEFAULT_ALLOWED_ORIGINS)?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url: parsed("DATABASE_URL", DEFAULT_DATABASE_URL)?,
            database_max_connections: number(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            storage,
            host: parsed("HOST", DEFAULT_HOST)?,
            port: number(&lookup, "PORT", DEFAULT_PORT)?,
            jwt: JwtConfig {
                secret: required("JWT_SECRET")?,
                access_token_expiry_mins: bounded(
                    &lookup,
                    "JWT_ACCESS_EXPIRY_MINS",
                    DEFAULT_ACCESS_EXPIRY_MINS,
                    MAX_ACCESS_EXPIRY_MINS,
                )?,
                refresh_token_expiry_days: bounded(
                    &lookup,
                    "JWT_REFRESH_EXPIRY_DAYS",
                    DEFAULT_REFRESH_EXPIRY_DAYS,
                    MAX_REFRESH_EXPIRY_DAYS,
                )?,
            },
            ticket_code_secret: required("TICKET_CODE_SECRET")?,
            cors_origins,
            bootstrap_admin: match (lookup("ADMIN_EMAIL"), lookup("ADMIN_PASSWORD")) {
                (Some(email), Some(password)) => Some(AdminSeed { email, password }),
                _ => None,
            },
            production: lookup("RUST_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
        })
    }
}

fn number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Like [`number`], but only accepts `1..=max`.
fn bounded(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: i64,
    max: i64,
) -> Result<i64, ConfigError> {
    let value = number(lookup, name, default)?;
    if (1..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        })
    }
}
