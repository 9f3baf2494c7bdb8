use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub access_token_ttl_mins: i64,
    pub refresh_token_ttl_days: i64,
    pub reset_token_ttl_mins: i64,
    pub verify_token_ttl_hours: i64,
    pub bcrypt_cost: u32,
}

/// One fixed window per action: at most `max_attempts` within `window_secs`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowConfig {
    pub max_attempts: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub login: WindowConfig,
    pub register: WindowConfig,
    pub refresh: WindowConfig,
    pub forgot_password: WindowConfig,
    pub report_generate: WindowConfig,
    pub report_download: WindowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_ACCESS_TOKEN_TTL_MINS") {
            self.security.access_token_ttl_mins =
                v.parse().unwrap_or(self.security.access_token_ttl_mins);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_TOKEN_TTL_DAYS") {
            self.security.refresh_token_ttl_days =
                v.parse().unwrap_or(self.security.refresh_token_ttl_days);
        }
        if let Ok(v) = env::var("SECURITY_RESET_TOKEN_TTL_MINS") {
            self.security.reset_token_ttl_mins =
                v.parse().unwrap_or(self.security.reset_token_ttl_mins);
        }
        if let Ok(v) = env::var("SECURITY_VERIFY_TOKEN_TTL_HOURS") {
            self.security.verify_token_ttl_hours =
                v.parse().unwrap_or(self.security.verify_token_ttl_hours);
        }
        if let Ok(v) = env::var("SECURITY_BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }

        // Rate limit overrides
        if let Ok(v) = env::var("RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = v.parse().unwrap_or(self.rate_limit.enabled);
        }
        self.rate_limit.login = window_override("LOGIN", self.rate_limit.login);
        self.rate_limit.register = window_override("REGISTER", self.rate_limit.register);
        self.rate_limit.refresh = window_override("REFRESH", self.rate_limit.refresh);
        self.rate_limit.forgot_password =
            window_override("FORGOT_PASSWORD", self.rate_limit.forgot_password);
        self.rate_limit.report_generate =
            window_override("REPORT_GENERATE", self.rate_limit.report_generate);
        self.rate_limit.report_download =
            window_override("REPORT_DOWNLOAD", self.rate_limit.report_download);

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_CORS") {
            self.api.enable_cors = v.parse().unwrap_or(self.api.enable_cors);
        }
        if let Ok(v) = env::var("API_CORS_ORIGINS") {
            self.api.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            security: SecurityConfig {
                jwt_secret: "dev-only-insecure-secret".to_string(),
                access_token_ttl_mins: 30,
                refresh_token_ttl_days: 7,
                reset_token_ttl_mins: 30,
                verify_token_ttl_hours: 24,
                bcrypt_cost: 4, // fast hashing for local iteration
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                login: WindowConfig { max_attempts: 5, window_secs: 900 },
                register: WindowConfig { max_attempts: 3, window_secs: 3600 },
                refresh: WindowConfig { max_attempts: 30, window_secs: 60 },
                forgot_password: WindowConfig { max_attempts: 3, window_secs: 3600 },
                report_generate: WindowConfig { max_attempts: 10, window_secs: 60 },
                report_download: WindowConfig { max_attempts: 30, window_secs: 60 },
            },
            api: ApiConfig {
                enable_cors: true,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from JWT_SECRET
                access_token_ttl_mins: 30,
                refresh_token_ttl_days: 7,
                reset_token_ttl_mins: 30,
                verify_token_ttl_hours: 24,
                bcrypt_cost: 10,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                login: WindowConfig { max_attempts: 5, window_secs: 900 },
                register: WindowConfig { max_attempts: 3, window_secs: 3600 },
                refresh: WindowConfig { max_attempts: 20, window_secs: 60 },
                forgot_password: WindowConfig { max_attempts: 3, window_secs: 3600 },
                report_generate: WindowConfig { max_attempts: 10, window_secs: 60 },
                report_download: WindowConfig { max_attempts: 20, window_secs: 60 },
            },
            api: ApiConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from JWT_SECRET
                access_token_ttl_mins: 15,
                refresh_token_ttl_days: 7,
                reset_token_ttl_mins: 15,
                verify_token_ttl_hours: 24,
                bcrypt_cost: 12,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                login: WindowConfig { max_attempts: 5, window_secs: 900 },
                register: WindowConfig { max_attempts: 3, window_secs: 3600 },
                refresh: WindowConfig { max_attempts: 10, window_secs: 60 },
                forgot_password: WindowConfig { max_attempts: 3, window_secs: 3600 },
                report_generate: WindowConfig { max_attempts: 5, window_secs: 60 },
                report_download: WindowConfig { max_attempts: 10, window_secs: 60 },
            },
            api: ApiConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
        }
    }
}

fn window_override(name: &str, mut window: WindowConfig) -> WindowConfig {
    if let Ok(v) = env::var(format!("RATE_LIMIT_{name}_MAX_ATTEMPTS")) {
        window.max_attempts = v.parse().unwrap_or(window.max_attempts);
    }
    if let Ok(v) = env::var(format!("RATE_LIMIT_{name}_WINDOW_SECS")) {
        window.window_secs = v.parse().unwrap_or(window.window_secs);
    }
    window
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_defaults_allow_five_login_attempts_per_window() {
        let config = AppConfig::development();
        assert_eq!(config.rate_limit.login.max_attempts, 5);
        assert_eq!(config.rate_limit.login.window_secs, 900);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn production_defaults_use_short_access_ttl_and_no_baked_secret() {
        let config = AppConfig::production();
        assert_eq!(config.security.access_token_ttl_mins, 15);
        assert!(config.security.jwt_secret.is_empty());
        assert!(config.security.bcrypt_cost >= 12);
    }
}
