//! API key repository
//!
//! Provider credentials, one row per service. Writes are upserts keyed on
//! the unique `service` column.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::ApiKey;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// API key repository trait
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// Insert or replace the key stored for `service`
    async fn upsert(&self, service: &str, key: &str) -> Result<ApiKey>;

    /// Key for one service
    async fn get_by_service(&self, service: &str) -> Result<Option<ApiKey>>;

    /// All stored keys ordered by service
    async fn list(&self) -> Result<Vec<ApiKey>>;
}

/// SQLx-based API key repository implementation
pub struct SqlxApiKeyRepository {
    pool: DynDatabasePool,
}

impl SqlxApiKeyRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ApiKeyRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ApiKeyRepository for SqlxApiKeyRepository {
    async fn upsert(&self, service: &str, key: &str) -> Result<ApiKey> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => upsert_key_sqlite(self.pool.sqlite()?, service, key).await?,
            DatabaseDriver::Mysql => upsert_key_mysql(self.pool.mysql()?, service, key).await?,
        }
        self.get_by_service(service)
            .await?
            .ok_or_else(|| anyhow::anyhow!("API key for '{}' missing after upsert", service))
    }

    async fn get_by_service(&self, service: &str) -> Result<Option<ApiKey>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_key_sqlite(self.pool.sqlite()?, service).await,
            DatabaseDriver::Mysql => get_key_mysql(self.pool.mysql()?, service).await,
        }
    }

    async fn list(&self) -> Result<Vec<ApiKey>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_keys_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_keys_mysql(self.pool.mysql()?).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn upsert_key_sqlite(pool: &SqlitePool, service: &str, key: &str) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO api_keys (service, key_value, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(service) DO UPDATE SET
            key_value = excluded.key_value,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(service)
    .bind(key)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to upsert API key")?;
    Ok(())
}

async fn get_key_sqlite(pool: &SqlitePool, service: &str) -> Result<Option<ApiKey>> {
    let row = sqlx::query(
        "SELECT id, service, key_value, created_at, updated_at FROM api_keys WHERE service = ?",
    )
    .bind(service)
    .fetch_optional(pool)
    .await
    .context("Failed to get API key")?;

    Ok(row.map(|row| row_to_key_sqlite(&row)))
}

async fn list_keys_sqlite(pool: &SqlitePool) -> Result<Vec<ApiKey>> {
    let rows = sqlx::query(
        "SELECT id, service, key_value, created_at, updated_at FROM api_keys ORDER BY service",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list API keys")?;

    Ok(rows.iter().map(row_to_key_sqlite).collect())
}

fn row_to_key_sqlite(row: &sqlx::sqlite::SqliteRow) -> ApiKey {
    ApiKey {
        id: row.get("id"),
        service: row.get("service"),
        key: row.get("key_value"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn upsert_key_mysql(pool: &MySqlPool, service: &str, key: &str) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO api_keys (service, key_value, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            key_value = VALUES(key_value),
            updated_at = VALUES(updated_at)
        "#,
    )
    .bind(service)
    .bind(key)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to upsert API key")?;
    Ok(())
}

async fn get_key_mysql(pool: &MySqlPool, service: &str) -> Result<Option<ApiKey>> {
    let row = sqlx::query(
        "SELECT id, service, key_value, created_at, updated_at FROM api_keys WHERE service = ?",
    )
    .bind(service)
    .fetch_optional(pool)
    .await
    .context("Failed to get API key")?;

    Ok(row.map(|row| row_to_key_mysql(&row)))
}

async fn list_keys_mysql(pool: &MySqlPool) -> Result<Vec<ApiKey>> {
    let rows = sqlx::query(
        "SELECT id, service, key_value, created_at, updated_at FROM api_keys ORDER BY service",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list API keys")?;

    Ok(rows.iter().map(row_to_key_mysql).collect())
}

fn row_to_key_mysql(row: &sqlx::mysql::MySqlRow) -> ApiKey {
    ApiKey {
        id: row.get("id"),
        service: row.get("service"),
        key: row.get("key_value"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
