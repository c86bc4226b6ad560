use crate::error::AppError;
use dotenvy::dotenv;
use std::env;

/// Live-connection tuning
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Per-connection outbound queue capacity
    pub subscriber_buffer: usize,
    /// Consecutive full-queue drops before a connection is declared dead
    pub max_consecutive_drops: u32,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
            max_consecutive_drops: 32,
            heartbeat_interval_secs: 5,
            client_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the service on the in-memory store
    pub database_url: Option<String>,
    pub port: u16,
    pub jwt_secret: String,
    pub ws: WsConfig,
    pub resolver_max_retries: u32,
    pub history_page_limit: i64,
    pub cors_allowed_origin: Option<String>,
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Config("JWT_SECRET missing".into()))?;

        let ws_defaults = WsConfig::default();
        let ws = WsConfig {
            subscriber_buffer: parse_or("WS_SUBSCRIBER_BUFFER", ws_defaults.subscriber_buffer),
            max_consecutive_drops: parse_or(
                "WS_MAX_CONSECUTIVE_DROPS",
                ws_defaults.max_consecutive_drops,
            ),
            ..ws_defaults
        };
        if ws.subscriber_buffer == 0 {
            return Err(AppError::Config(
                "WS_SUBSCRIBER_BUFFER must be greater than zero".into(),
            ));
        }

        Ok(Self {
            database_url,
            port: parse_or("PORT", 3000),
            jwt_secret,
            ws,
            resolver_max_retries: parse_or("RESOLVER_MAX_RETRIES", 1),
            history_page_limit: parse_or("HISTORY_PAGE_LIMIT", 50),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN").ok(),
        })
    }

    /// Defaults suitable for tests and local runs
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            port: 0,
            jwt_secret: jwt_secret.to_string(),
            ws: WsConfig::default(),
            resolver_max_retries: 1,
            history_page_limit: 50,
            cors_allowed_origin: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear() {
        for key in [
            "DATABASE_URL",
            "JWT_SECRET",
            "PORT",
            "WS_SUBSCRIBER_BUFFER",
            "WS_MAX_CONSECUTIVE_DROPS",
            "RESOLVER_MAX_RETRIES",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_jwt_secret_is_required() {
        clear();
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        env::set_var("JWT_SECRET", "s3cret");

        let config = Config::from_env().unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.port, 3000);
        assert_eq!(config.ws.subscriber_buffer, 256);
        assert_eq!(config.ws.max_consecutive_drops, 32);
        assert_eq!(config.resolver_max_retries, 1);
        assert_eq!(config.history_page_limit, 50);

        clear();
    }

    #[test]
    #[serial]
    fn test_zero_buffer_rejected() {
        clear();
        env::set_var("JWT_SECRET", "s3cret");
        env::set_var("WS_SUBSCRIBER_BUFFER", "0");

        assert!(Config::from_env().is_err());

        clear();
    }
}
