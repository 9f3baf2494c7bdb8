use std::sync::Arc;

use crate::auth::{MemoryTokenStore, TokenService};
use crate::clock::{SharedClock, SystemClock};
use crate::config::{AppConfig, SecurityConfig};
use crate::credential::CredentialStore;
use crate::notify::Notifier;
use crate::rate_limit::RateLimiter;

/// Shared per-process services handed to every handler through axum state.
#[derive(Clone)]
pub struct AppState {
    pub security: SecurityConfig,
    pub token_service: Arc<TokenService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub credentials: Arc<dyn CredentialStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Wire the default single-instance stack: system clock and an
    /// in-process token store.
    pub fn new(
        config: &AppConfig,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let clock: SharedClock = Arc::new(SystemClock);
        Self {
            security: config.security.clone(),
            token_service: Arc::new(TokenService::new(
                config.security.clone(),
                clock.clone(),
                Arc::new(MemoryTokenStore::new()),
            )),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone(), clock)),
            credentials,
            notifier,
        }
    }
}
