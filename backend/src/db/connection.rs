use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::{str::FromStr, time::Duration};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Server-side deadline applied to every statement on every connection.
    pub statement_timeout: Duration,
}

impl From<&Config> for PoolConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_connections: config.db_max_connections.max(1),
            acquire_timeout: Duration::from_secs(config.db_acquire_timeout_seconds),
            statement_timeout: Duration::from_millis(config.db_statement_timeout_ms),
        }
    }
}

pub async fn create_pool_with_config(
    database_url: &str,
    config: PoolConfig,
) -> anyhow::Result<PgPool> {
    let options = PgConnectOptions::from_str(database_url)?.options([(
        "statement_timeout",
        config.statement_timeout.as_millis().to_string(),
    )]);
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await?;
    Ok(pool)
}
