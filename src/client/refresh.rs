//! Single-flight access token refresh.
//!
//! While a refresh is in flight every caller of
//! [`RefreshCoordinator::ensure_fresh_token`] is parked on a oneshot channel
//! and receives the outcome of that one refresh. A failed refresh resolves
//! everybody to `None`, which callers treat as "no session".

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh rejected: {0}")]
    Rejected(String),

    #[error("refresh request failed: {0}")]
    Transport(String),
}

/// Performs the actual token exchange.
#[async_trait]
pub trait TokenRefresher: Send + Sync + 'static {
    async fn refresh(&self) -> Result<String, RefreshError>;
}

type Waiter = oneshot::Sender<Option<String>>;

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

struct Inner {
    refresher: Arc<dyn TokenRefresher>,
    state: Mutex<RefreshState>,
    token: Mutex<Option<String>>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, RefreshState> {
        // No critical section can panic half-way, so a poisoned lock still
        // holds a consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn token(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the outcome, returns to `Idle` and wakes every waiter.
    fn complete(&self, outcome: Option<String>) {
        *self.token() = outcome.clone();

        let waiters = match std::mem::replace(&mut *self.state(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };
        debug!(waiters = waiters.len(), success = outcome.is_some(), "Token refresh settled");
        for waiter in waiters {
            // A waiter that gave up has dropped its receiver.
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Settles the in-flight refresh even if the refresh task panics.
struct Settle {
    inner: Arc<Inner>,
    outcome: Option<Option<String>>,
}

impl Drop for Settle {
    fn drop(&mut self) {
        self.inner.complete(self.outcome.take().flatten());
    }
}

/// Coalesces concurrent refresh attempts into one call to the refresher.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                refresher,
                state: Mutex::new(RefreshState::Idle),
                token: Mutex::new(None),
            }),
        }
    }

    /// The most recent access token, if any.
    pub fn current_token(&self) -> Option<String> {
        self.inner.token().clone()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.inner.token() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.inner.token() = None;
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.state(), RefreshState::Refreshing { .. })
    }

    /// Refreshes the access token, joining a refresh already in flight.
    ///
    /// Must be called from within a Tokio runtime. The refresh itself runs on
    /// its own task, so dropping this future does not stall other waiters.
    pub async fn ensure_fresh_token(&self) -> Option<String> {
        let (tx, rx) = oneshot::channel();

        let start = {
            let mut state = self.inner.state();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    waiters.push(tx);
                    false
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    true
                }
            }
        };

        if start {
            debug!("Starting token refresh");
            let inner = self.inner.clone();
            tokio::spawn(async move {
                let mut settle = Settle {
                    inner: inner.clone(),
                    outcome: None,
                };
                let outcome = match inner.refresher.refresh().await {
                    Ok(token) => Some(token),
                    Err(err) => {
                        warn!(error = %err, "Token refresh failed, session is gone");
                        None
                    }
                };
                settle.outcome = Some(outcome);
            });
        }

        rx.await.ok().flatten()
    }
}
