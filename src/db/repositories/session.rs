//! Session repository
//!
//! Login sessions keyed by their opaque token. Expiry is checked by the
//! service layer; this module only stores, fetches and prunes rows.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const SELECT_SESSION: &str = "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?";
const INSERT_SESSION: &str =
    "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by token
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Delete one session, returns whether a row existed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Delete sessions that expired before `now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(INSERT_SESSION)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to create session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(INSERT_SESSION)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to create session")?;
            }
        }
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_session_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_session_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let affected = self
            .delete_where("DELETE FROM sessions WHERE id = ?", Bind::Text(id))
            .await
            .context("Failed to delete session")?;
        Ok(affected > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.delete_where("DELETE FROM sessions WHERE expires_at < ?", Bind::Time(now))
            .await
            .context("Failed to delete expired sessions")
    }
}

/// Single parameter for the DELETE statements above
enum Bind<'a> {
    Text(&'a str),
    Time(DateTime<Utc>),
}

impl SqlxSessionRepository {
    async fn delete_where(&self, sql: &str, bind: Bind<'_>) -> Result<u64> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let query = sqlx::query(sql);
                let query = match bind {
                    Bind::Text(v) => query.bind(v),
                    Bind::Time(v) => query.bind(v),
                };
                query.execute(self.pool.sqlite()?).await?.rows_affected()
            }
            DatabaseDriver::Mysql => {
                let query = sqlx::query(sql);
                let query = match bind {
                    Bind::Text(v) => query.bind(v),
                    Bind::Time(v) => query.bind(v),
                };
                query.execute(self.pool.mysql()?).await?.rows_affected()
            }
        };
        Ok(affected)
    }
}

async fn get_session_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(SELECT_SESSION)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    Ok(row.map(|row| Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

async fn get_session_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(SELECT_SESSION)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    Ok(row.map(|row| Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}
