//! Client-side session handling for the ticketing API.

pub mod api;
pub mod refresh;

pub use api::{ApiClient, ClientError, HttpTokenRefresher, Session};
pub use refresh::{RefreshCoordinator, RefreshError, TokenRefresher};
