use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

use crate::types::PinScope;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub attendance: AttendanceConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub run_migrations: bool,
    pub enable_slow_query_warning: bool,
    pub slow_query_threshold_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_report_rows: i64,
    pub max_history_rows: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub session_secret: String,
    pub staff_session_minutes: i64,
    pub manager_session_minutes: i64,
    pub bcrypt_cost: u32,
    pub secure_cookies: bool,
    pub cors_origins: Vec<String>,
    pub unlock_max_failures: u32,
    pub unlock_window_secs: u64,
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceConfig {
    pub stale_after_minutes: i64,
    pub reconcile_interval_secs: u64,
    pub enable_background_reconcile: bool,
}

/// Secret used when nothing is configured outside production. Never valid in production.
const DEV_SESSION_SECRET: &str = "school-ops-development-secret";

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
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_RUN_MIGRATIONS") {
            self.database.run_migrations = v.parse().unwrap_or(self.database.run_migrations);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_SLOW_QUERY_WARNING") {
            self.database.enable_slow_query_warning = v.parse().unwrap_or(self.database.enable_slow_query_warning);
        }
        if let Ok(v) = env::var("DATABASE_SLOW_QUERY_THRESHOLD_MS") {
            self.database.slow_query_threshold_ms = v.parse().unwrap_or(self.database.slow_query_threshold_ms);
        }

        // API overrides
        if let Some(port) = env::var("OPS_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REPORT_ROWS") {
            self.api.max_report_rows = v.parse().unwrap_or(self.api.max_report_rows);
        }
        if let Ok(v) = env::var("API_MAX_HISTORY_ROWS") {
            self.api.max_history_rows = v.parse().unwrap_or(self.api.max_history_rows);
        }

        // Security overrides
        if let Ok(v) = env::var("SESSION_SECRET") {
            self.security.session_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_STAFF_SESSION_MINUTES") {
            self.security.staff_session_minutes = v.parse().unwrap_or(self.security.staff_session_minutes);
        }
        if let Ok(v) = env::var("SECURITY_MANAGER_SESSION_MINUTES") {
            self.security.manager_session_minutes = v.parse().unwrap_or(self.security.manager_session_minutes);
        }
        if let Ok(v) = env::var("SECURITY_BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }
        if let Ok(v) = env::var("SECURITY_SECURE_COOKIES") {
            self.security.secure_cookies = v.parse().unwrap_or(self.security.secure_cookies);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("SECURITY_UNLOCK_MAX_FAILURES") {
            self.security.unlock_max_failures = v.parse().unwrap_or(self.security.unlock_max_failures);
        }
        if let Ok(v) = env::var("SECURITY_UNLOCK_WINDOW_SECS") {
            self.security.unlock_window_secs = v.parse().unwrap_or(self.security.unlock_window_secs);
        }
        if let Ok(v) = env::var("SECURITY_TRUST_PROXY_HEADERS") {
            self.security.trust_proxy_headers = v.parse().unwrap_or(self.security.trust_proxy_headers);
        }

        // Attendance overrides
        if let Ok(v) = env::var("ATTENDANCE_STALE_AFTER_MINUTES") {
            self.attendance.stale_after_minutes = v.parse().unwrap_or(self.attendance.stale_after_minutes);
        }
        if let Ok(v) = env::var("ATTENDANCE_RECONCILE_INTERVAL_SECS") {
            self.attendance.reconcile_interval_secs = v.parse().unwrap_or(self.attendance.reconcile_interval_secs);
        }
        if let Ok(v) = env::var("ATTENDANCE_ENABLE_BACKGROUND_RECONCILE") {
            self.attendance.enable_background_reconcile =
                v.parse().unwrap_or(self.attendance.enable_background_reconcile);
        }

        self
    }

    /// Refuse configurations that would run an insecure gate in production.
    pub fn validate(&self) -> Result<(), String> {
        if self.security.session_secret.is_empty() {
            return Err("SESSION_SECRET is not configured".to_string());
        }
        if self.environment == Environment::Production && self.security.session_secret == DEV_SESSION_SECRET {
            return Err("SESSION_SECRET must be set explicitly in production".to_string());
        }
        if !(4..=31).contains(&self.security.bcrypt_cost) {
            return Err(format!("bcrypt cost {} out of range 4..=31", self.security.bcrypt_cost));
        }
        if self.attendance.stale_after_minutes <= 0 {
            return Err("ATTENDANCE_STALE_AFTER_MINUTES must be positive".to_string());
        }
        Ok(())
    }

    /// Lifetime of a freshly unlocked session for the given scope.
    pub fn session_ttl(&self, scope: PinScope) -> chrono::Duration {
        match scope {
            PinScope::Staff => chrono::Duration::minutes(self.security.staff_session_minutes),
            PinScope::Manager => chrono::Duration::minutes(self.security.manager_session_minutes),
        }
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.attendance.stale_after_minutes)
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 5,
                run_migrations: true,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 100,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                max_report_rows: 5000,
                max_history_rows: 500,
            },
            security: SecurityConfig {
                session_secret: DEV_SESSION_SECRET.to_string(),
                staff_session_minutes: 12 * 60,
                manager_session_minutes: 60,
                bcrypt_cost: 4,
                secure_cookies: false,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                unlock_max_failures: 20,
                unlock_window_secs: 60,
                trust_proxy_headers: false,
            },
            attendance: AttendanceConfig {
                stale_after_minutes: 12 * 60,
                reconcile_interval_secs: 300,
                enable_background_reconcile: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 10,
                run_migrations: true,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 500,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                max_report_rows: 2000,
                max_history_rows: 200,
            },
            security: SecurityConfig {
                session_secret: String::new(),
                staff_session_minutes: 12 * 60,
                manager_session_minutes: 30,
                bcrypt_cost: 10,
                secure_cookies: true,
                cors_origins: vec!["https://staging.school-ops.example".to_string()],
                unlock_max_failures: 10,
                unlock_window_secs: 300,
                trust_proxy_headers: false,
            },
            attendance: AttendanceConfig {
                stale_after_minutes: 12 * 60,
                reconcile_interval_secs: 300,
                enable_background_reconcile: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 5,
                run_migrations: false,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 1000,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: false,
                max_report_rows: 2000,
                max_history_rows: 200,
            },
            security: SecurityConfig {
                session_secret: String::new(),
                staff_session_minutes: 12 * 60,
                manager_session_minutes: 30,
                bcrypt_cost: 12,
                secure_cookies: true,
                cors_origins: vec!["https://ops.school.example".to_string()],
                unlock_max_failures: 5,
                unlock_window_secs: 300,
                trust_proxy_headers: false,
            },
            attendance: AttendanceConfig {
                stale_after_minutes: 12 * 60,
                reconcile_interval_secs: 600,
                enable_background_reconcile: true,
            },
        }
    }
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
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.database.run_migrations);
        assert_eq!(config.security.bcrypt_cost, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_requires_explicit_secret() {
        let mut config = AppConfig::production();
        assert!(config.validate().is_err());

        config.security.session_secret = DEV_SESSION_SECRET.to_string();
        assert!(config.validate().is_err());

        config.security.session_secret = "a-real-production-secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_manager_sessions_are_shorter() {
        let config = AppConfig::production();
        assert!(config.session_ttl(PinScope::Manager) < config.session_ttl(PinScope::Staff));
        assert_eq!(config.session_ttl(PinScope::Manager), chrono::Duration::minutes(30));
    }

    #[test]
    fn test_rejects_non_positive_stale_timeout() {
        let mut config = AppConfig::development();
        config.attendance.stale_after_minutes = 0;
        assert!(config.validate().is_err());
    }
}
