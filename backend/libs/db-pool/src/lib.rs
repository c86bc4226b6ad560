//! Database connection pool management
//!
//! Builds a deadpool-postgres pool from environment configuration, verifies it
//! on startup and keeps pool gauges current for the `/metrics` endpoint.

mod metrics;

pub use metrics::acquire_with_metrics;
use metrics::update_pool_metrics;

pub use deadpool_postgres::PoolError;
use deadpool_postgres::tokio_postgres::{Config as PgConfig, NoTls};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tracing::{debug, error, info};

pub type PgPool = Pool;

/// Errors raised while building or preparing a pool
#[derive(Debug, thiserror::Error)]
pub enum DbPoolError {
    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    #[error("pool build failed: {0}")]
    Build(String),

    #[error("connection failed: {0}")]
    Pool(#[from] PoolError),

    #[error("query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("connection verification timed out after {0}s")]
    VerifyTimeout(u64),
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Service name for metrics labeling
    pub service_name: String,
    pub database_url: String,
    pub max_connections: u32,
    /// Connection creation timeout (new connection to PostgreSQL)
    pub connect_timeout_secs: u64,
    /// Connection acquisition timeout (get connection from pool)
    pub acquire_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 16,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl DbConfig {
    /// Read pool settings from the environment.
    ///
    /// Returns `None` when `DATABASE_URL` is unset, which callers treat as
    /// "run without a database".
    pub fn from_env(service_name: &str) -> Option<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())?;
        let defaults = Self::default();

        Some(Self {
            service_name: service_name.to_string(),
            database_url,
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", defaults.acquire_timeout_secs),
        })
    }

    pub fn log_config(&self) {
        info!(
            service = %self.service_name,
            max_connections = self.max_connections,
            connect_timeout_secs = self.connect_timeout_secs,
            acquire_timeout_secs = self.acquire_timeout_secs,
            "Database pool configuration"
        );
    }
}

/// Build a deadpool-postgres pool and verify it with `SELECT 1`
pub async fn create_pool(config: DbConfig) -> Result<PgPool, DbPoolError> {
    debug!(
        service = %config.service_name,
        max = config.max_connections,
        "Creating database pool"
    );

    let pg_config: PgConfig = config
        .database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| DbPoolError::InvalidUrl(e.to_string()))?;

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(config.max_connections as usize)
        .wait_timeout(Some(Duration::from_secs(config.acquire_timeout_secs)))
        .create_timeout(Some(Duration::from_secs(config.connect_timeout_secs)))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| DbPoolError::Build(e.to_string()))?;

    let verify = async {
        let client = pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok::<(), DbPoolError>(())
    };

    match tokio::time::timeout(Duration::from_secs(config.connect_timeout_secs), verify).await {
        Ok(Ok(())) => {
            info!(
                service = %config.service_name,
                "Database pool created and verified successfully"
            );

            update_pool_metrics(&pool, &config.service_name);

            let pool_clone = pool.clone();
            let service = config.service_name.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                loop {
                    interval.tick().await;
                    update_pool_metrics(&pool_clone, &service);
                }
            });

            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(
                service = %config.service_name,
                error = %e,
                "Database connection verification failed"
            );
            Err(e)
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "Database connection verification timeout"
            );
            Err(DbPoolError::VerifyTimeout(config.connect_timeout_secs))
        }
    }
}

/// Apply an idempotent SQL migration script (every statement uses
/// `IF NOT EXISTS`) in a single batch.
pub async fn migrate(pool: &PgPool, name: &str, sql: &str) -> Result<(), DbPoolError> {
    let client = pool.get().await?;
    client.batch_execute(sql).await?;
    info!(migration = %name, "Migration applied");
    Ok(())
}

/// True when the error comes from the pool itself (exhausted, closed, timed
/// out) rather than from a query the server rejected.
pub fn is_pool_unavailable(err: &PoolError) -> bool {
    matches!(
        err,
        PoolError::Timeout(_) | PoolError::Closed | PoolError::NoRuntimeSpecified
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use deadpool::managed::TimeoutType;

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.acquire_timeout_secs, 10);
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_without_url_is_none() {
        std::env::remove_var("DATABASE_URL");
        assert!(DbConfig::from_env("hub").is_none());

        std::env::set_var("DATABASE_URL", "   ");
        assert!(DbConfig::from_env("hub").is_none());
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_overrides() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/hub_test");
        std::env::set_var("DB_MAX_CONNECTIONS", "4");
        std::env::remove_var("DB_CONNECT_TIMEOUT_SECS");

        let config = DbConfig::from_env("hub").unwrap();
        assert_eq!(config.service_name, "hub");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.connect_timeout_secs, 5);

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("DB_MAX_CONNECTIONS");
    }

    #[test]
    fn test_pool_unavailable_classification() {
        assert!(is_pool_unavailable(&PoolError::Timeout(TimeoutType::Wait)));
        assert!(is_pool_unavailable(&PoolError::Closed));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let config = DbConfig {
            database_url: "not a url at all ::".to_string(),
            ..DbConfig::default()
        };
        let result = create_pool(config).await;
        assert!(matches!(result, Err(DbPoolError::InvalidUrl(_))));
    }
}
