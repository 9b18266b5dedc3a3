use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub search: SearchConfig,
    pub notifications: NotificationConfig,
    pub forum: ForumConfig,
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
    pub acquire_timeout_secs: u64,
    pub run_migrations: bool,
    pub slow_query_threshold_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub max_request_size_bytes: usize,
    pub default_page_size: i32,
    pub max_page_size: i32,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub cors_origins: Vec<String>,
    pub bcrypt_cost: u32,
    pub default_role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub min_term_length: usize,
    pub max_terms: usize,
    pub max_results: i64,
    pub snippet_radius: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub broadcast_capacity: usize,
    pub keep_alive_secs: u64,
    pub observer_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumConfig {
    pub edit_window_minutes: i64,
    pub min_title_length: usize,
    pub max_title_length: usize,
    pub max_body_length: usize,
    pub max_message_length: usize,
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
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            self.database.acquire_timeout_secs = v.parse().unwrap_or(self.database.acquire_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_RUN_MIGRATIONS") {
            self.database.run_migrations = v.parse().unwrap_or(self.database.run_migrations);
        }
        if let Ok(v) = env::var("DATABASE_SLOW_QUERY_THRESHOLD_MS") {
            self.database.slow_query_threshold_ms = v.parse().unwrap_or(self.database.slow_query_threshold_ms);
        }

        // API overrides (PORT kept for platform compatibility)
        if let Some(port) = env::var("FORUM_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }
        if let Ok(v) = env::var("API_DEFAULT_PAGE_SIZE") {
            self.api.default_page_size = v.parse().unwrap_or(self.api.default_page_size);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_SIZE") {
            self.api.max_page_size = v.parse().unwrap_or(self.api.max_page_size);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = env::var("SECURITY_BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }
        if let Ok(v) = env::var("SECURITY_DEFAULT_ROLE") {
            self.security.default_role = v;
        }

        // Search overrides
        if let Ok(v) = env::var("SEARCH_MIN_TERM_LENGTH") {
            self.search.min_term_length = v.parse().unwrap_or(self.search.min_term_length);
        }
        if let Ok(v) = env::var("SEARCH_MAX_TERMS") {
            self.search.max_terms = v.parse().unwrap_or(self.search.max_terms);
        }
        if let Ok(v) = env::var("SEARCH_MAX_RESULTS") {
            self.search.max_results = v.parse().unwrap_or(self.search.max_results);
        }

        // Notification overrides
        if let Ok(v) = env::var("NOTIFICATIONS_BROADCAST_CAPACITY") {
            self.notifications.broadcast_capacity = v.parse().unwrap_or(self.notifications.broadcast_capacity);
        }
        if let Ok(v) = env::var("NOTIFICATIONS_KEEP_ALIVE_SECS") {
            self.notifications.keep_alive_secs = v.parse().unwrap_or(self.notifications.keep_alive_secs);
        }
        if let Ok(v) = env::var("NOTIFICATIONS_OBSERVER_TIMEOUT_MS") {
            self.notifications.observer_timeout_ms = v.parse().unwrap_or(self.notifications.observer_timeout_ms);
        }

        // Forum overrides
        if let Ok(v) = env::var("FORUM_EDIT_WINDOW_MINUTES") {
            self.forum.edit_window_minutes = v.parse().unwrap_or(self.forum.edit_window_minutes);
        }
        if let Ok(v) = env::var("FORUM_MAX_BODY_LENGTH") {
            self.forum.max_body_length = v.parse().unwrap_or(self.forum.max_body_length);
        }
        if let Ok(v) = env::var("FORUM_MAX_MESSAGE_LENGTH") {
            self.forum.max_message_length = v.parse().unwrap_or(self.forum.max_message_length);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                acquire_timeout_secs: 30,
                run_migrations: true,
                slow_query_threshold_ms: 100,
            },
            api: ApiConfig {
                port: 3000,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
                default_page_size: 25,
                max_page_size: 200,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: "development-secret-change-me".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                bcrypt_cost: 4,
                default_role: "member".to_string(),
            },
            search: SearchConfig::default(),
            notifications: NotificationConfig {
                broadcast_capacity: 256,
                keep_alive_secs: 15,
                observer_timeout_ms: 5_000,
            },
            forum: ForumConfig::default(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                acquire_timeout_secs: 10,
                run_migrations: true,
                slow_query_threshold_ms: 500,
            },
            api: ApiConfig {
                port: 3000,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
                default_page_size: 25,
                max_page_size: 100,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                cors_origins: vec!["https://staging.example.com".to_string()],
                bcrypt_cost: 10,
                default_role: "member".to_string(),
            },
            search: SearchConfig::default(),
            notifications: NotificationConfig {
                broadcast_capacity: 1024,
                keep_alive_secs: 15,
                observer_timeout_ms: 2_000,
            },
            forum: ForumConfig::default(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                acquire_timeout_secs: 5,
                run_migrations: false,
                slow_query_threshold_ms: 1000,
            },
            api: ApiConfig {
                port: 3000,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
                default_page_size: 25,
                max_page_size: 100,
                enable_request_logging: false,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
                cors_origins: vec!["https://forum.example.com".to_string()],
                bcrypt_cost: 12,
                default_role: "member".to_string(),
            },
            search: SearchConfig {
                max_results: 50,
                ..SearchConfig::default()
            },
            notifications: NotificationConfig {
                broadcast_capacity: 4096,
                keep_alive_secs: 30,
                observer_timeout_ms: 2_000,
            },
            forum: ForumConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_term_length: 2,
            max_terms: 8,
            max_results: 100,
            snippet_radius: 60,
        }
    }
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            edit_window_minutes: 30,
            min_title_length: 3,
            max_title_length: 200,
            max_body_length: 40_000,
            max_message_length: 5_000,
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
        assert_eq!(config.environment, Environment::Development);
        assert!(!config.security.jwt_secret.is_empty());
        assert_eq!(config.security.default_role, "member");
        assert!(config.database.run_migrations);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(config.security.jwt_secret.is_empty());
        assert!(!config.database.run_migrations);
        assert_eq!(config.search.max_results, 50);
        assert!(config.security.bcrypt_cost >= 10);
    }

    #[test]
    fn jwt_secret_is_not_serialized() {
        let config = AppConfig::development();
        let value = serde_json::to_value(&config.security).unwrap();
        assert!(value.get("jwt_secret").is_none());
    }
}
