use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::clock::SharedClock;
use crate::config::{RateLimitConfig, WindowConfig};

/// Actions with independent limits. Sensitive endpoints each get their own
/// `(max_attempts, window)` from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Login,
    Register,
    Refresh,
    ForgotPassword,
    ReportGenerate,
    ReportDownload,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Register => "register",
            Action::Refresh => "refresh",
            Action::ForgotPassword => "forgot_password",
            Action::ReportGenerate => "report_generate",
            Action::ReportDownload => "report_download",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Throttled { retry_after_secs: u64 },
}

impl Verdict {
    pub fn is_allowed(self) -> bool {
        matches!(self, Verdict::Allowed)
    }
}

#[derive(Debug)]
struct Counter {
    count: u32,
    window_start: DateTime<Utc>,
}

/// Fixed-window counters keyed by (action, identity). The whole map sits
/// behind one mutex so read-check-increment is a single critical section;
/// two concurrent requests can never under-count.
///
/// Backed by process memory here; the same interface maps onto an atomic
/// INCR/EXPIRE pair in a shared KV store for multi-instance deployments.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: SharedClock,
    counters: Mutex<HashMap<(Action, String), Counter>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        Self { config, clock, counters: Mutex::new(HashMap::new()) }
    }

    fn window(&self, action: Action) -> WindowConfig {
        match action {
            Action::Login => self.config.login,
            Action::Register => self.config.register,
            Action::Refresh => self.config.refresh,
            Action::ForgotPassword => self.config.forgot_password,
            Action::ReportGenerate => self.config.report_generate,
            Action::ReportDownload => self.config.report_download,
        }
    }

    /// Count one attempt against `identity_key` and report whether it is
    /// within the action's limit. Counters only move forward inside a
    /// window; a throttled check never decrements, so probing the limiter
    /// reveals nothing about its internal timing.
    pub fn check(&self, action: Action, identity_key: &str) -> Verdict {
        if !self.config.enabled {
            return Verdict::Allowed;
        }

        let window = self.window(action);
        let now = self.clock.now();
        let window_duration = Duration::seconds(window.window_secs as i64);

        let mut counters = self.counters.lock().unwrap();
        let counter = counters
            .entry((action, identity_key.to_string()))
            .or_insert_with(|| Counter { count: 0, window_start: now });

        // Window elapsed: reset atomically under the same lock.
        if now - counter.window_start >= window_duration {
            counter.count = 0;
            counter.window_start = now;
        }

        if counter.count >= window.max_attempts {
            let elapsed = now - counter.window_start;
            let remaining = (window_duration - elapsed).num_seconds().max(1) as u64;
            tracing::warn!(
                target: "audit",
                action = action.as_str(),
                identity = identity_key,
                retry_after = remaining,
                "request throttled"
            );
            return Verdict::Throttled { retry_after_secs: remaining };
        }

        counter.count += 1;
        Verdict::Allowed
    }

    /// Login attempts are keyed by both the source IP and the submitted
    /// username, to resist credential stuffing (many usernames, one IP) and
    /// distributed guessing (one username, many IPs). Throttled if either
    /// limit is exceeded.
    pub fn check_login(&self, ip: &str, username: &str) -> Verdict {
        let by_ip = self.check(Action::Login, &format!("ip:{ip}"));
        let by_user = self.check(Action::Login, &format!("user:{username}"));
        match (by_ip, by_user) {
            (Verdict::Allowed, Verdict::Allowed) => Verdict::Allowed,
            (Verdict::Throttled { retry_after_secs: a }, Verdict::Throttled { retry_after_secs: b }) => {
                Verdict::Throttled { retry_after_secs: a.max(b) }
            }
            (Verdict::Throttled { retry_after_secs }, _)
            | (_, Verdict::Throttled { retry_after_secs }) => Verdict::Throttled { retry_after_secs },
        }
    }

    /// Clear the login counters after a successful authentication, so a
    /// legitimate user who mistyped a few times is not left near the limit.
    pub fn reset_login(&self, ip: &str, username: &str) {
        let mut counters = self.counters.lock().unwrap();
        counters.remove(&(Action::Login, format!("ip:{ip}")));
        counters.remove(&(Action::Login, format!("user:{username}")));
    }
}
