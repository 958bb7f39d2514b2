//! PostgreSQL pool setup for the vault and ledger tables.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use graphmill_core::{Error, Result};

/// Default maximum number of connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default connection acquire timeout in seconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

const SCHEMA_SQL: &str = include_str!("../migrations/0001_graphmill.sql");

/// Pool settings.
///
/// | Variable | Default |
/// |----------|---------|
/// | `GRAPHMILL_DB_MAX_CONNECTIONS` | 10 |
/// | `GRAPHMILL_DB_ACQUIRE_TIMEOUT_SECS` | 30 |
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_connections = std::env::var("GRAPHMILL_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.max_connections)
            .max(1);
        let acquire_timeout = std::env::var("GRAPHMILL_DB_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.acquire_timeout);
        Self {
            max_connections,
            acquire_timeout,
        }
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n.max(1);
        self
    }
}

/// Connect and make sure the vault and ledger tables exist.
pub async fn connect(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;
    ensure_schema(&pool).await?;
    info!(
        subsystem = "store",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        duration_ms = start.elapsed().as_millis() as u64,
        "Store database ready"
    );
    Ok(pool)
}

/// Create the vault and ledger tables if they are missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_max_connections_clamped() {
        assert_eq!(PoolConfig::default().with_max_connections(0).max_connections, 1);
    }

    #[test]
    fn test_schema_sql_creates_both_tables() {
        assert!(SCHEMA_SQL.contains("sensitive_vault"));
        assert!(SCHEMA_SQL.contains("progress_ledger"));
    }
}
