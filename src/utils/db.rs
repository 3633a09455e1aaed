//! PostgreSQL 连接池管理

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use crate::config::PostgresInstanceConfig;
use crate::utils::retry::{RetryPolicy, retry_async};

/// 创建 PostgreSQL 连接池，连接失败按策略重试
pub async fn connect_postgres(
    config: &PostgresInstanceConfig,
    retry: &RetryPolicy,
) -> Result<PgPool> {
    let options = PgPoolOptions::new()
        .max_connections(config.max_connections.unwrap_or(20))
        .min_connections(config.min_connections.unwrap_or(1))
        .acquire_timeout(Duration::from_secs(
            config.acquire_timeout_seconds.unwrap_or(30),
        ))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800));

    let pool = retry_async(retry, "postgres_connect", || {
        options.clone().connect(&config.url)
    })
    .await
    .context("failed to connect to PostgreSQL")?;

    info!("Database connection pool created");

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("database connection test failed")?;

    Ok(pool)
}
