//! Article repository
//!
//! - `ArticleRepository` trait defining the interface for article data access
//! - `SqlxArticleRepository` implementing the trait for SQLite and MySQL
//!
//! Status transitions that race (claiming an article for generation) are
//! single conditional UPDATEs so the database decides the winner.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Article, ArticleStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const ARTICLE_COLUMNS: &str =
    "id, user_id, title, content, status, error, created_at, updated_at, completed_at";

const INSERT_ARTICLE: &str = r#"
    INSERT INTO articles (user_id, title, status, created_at, updated_at)
    VALUES (?, ?, 'pending', ?, ?)
"#;

const CLAIM_ARTICLE: &str = r#"
    UPDATE articles
    SET status = 'processing', updated_at = ?
    WHERE id = ? AND user_id = ? AND status <> 'processing'
"#;

const COMPLETE_ARTICLE: &str = r#"
    UPDATE articles
    SET status = 'completed', content = ?, error = NULL, completed_at = ?, updated_at = ?
    WHERE id = ?
"#;

const FAIL_ARTICLE: &str = r#"
    UPDATE articles
    SET status = 'failed', error = ?, updated_at = ?
    WHERE id = ?
"#;

const FAIL_INTERRUPTED: &str = r#"
    UPDATE articles
    SET status = 'failed', error = ?, updated_at = ?
    WHERE status = 'processing'
"#;

/// Article repository trait
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert one pending article per title, all or nothing
    async fn create_many(&self, user_id: i64, titles: &[String]) -> Result<Vec<Article>>;

    /// Get article by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    /// Articles owned by `user_id`, newest first
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Article>>;

    /// Move an owned, non-processing article to `processing`.
    ///
    /// Returns `false` when no row matched, meaning the article is missing,
    /// owned by someone else, or already being processed.
    async fn claim_for_generation(&self, id: i64, user_id: i64) -> Result<bool>;

    /// Store generated content and mark the article completed
    async fn mark_completed(&self, id: i64, content: &str) -> Result<()>;

    /// Record a generation failure
    async fn mark_failed(&self, id: i64, error: &str) -> Result<()>;

    /// Fail every article still marked `processing`, returns how many changed
    async fn fail_interrupted(&self, error: &str) -> Result<u64>;
}

/// SQLx-based article repository implementation
pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    /// Create a new SQLx article repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create_many(&self, user_id: i64, titles: &[String]) -> Result<Vec<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_articles_sqlite(self.pool.sqlite()?, user_id, titles).await
            }
            DatabaseDriver::Mysql => create_articles_mysql(self.pool.mysql()?, user_id, titles).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        let sql = format!("SELECT {} FROM articles WHERE id = ?", ARTICLE_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get article by ID")?;
                row.map(|row| row_to_article_sqlite(&row)).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get article by ID")?;
                row.map(|row| row_to_article_mysql(&row)).transpose()
            }
        }
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {} FROM articles WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            ARTICLE_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list articles")?;
                rows.iter().map(row_to_article_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list articles")?;
                rows.iter().map(row_to_article_mysql).collect()
            }
        }
    }

    async fn claim_for_generation(&self, id: i64, user_id: i64) -> Result<bool> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(CLAIM_ARTICLE)
                .bind(now)
                .bind(id)
                .bind(user_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to claim article")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(CLAIM_ARTICLE)
                .bind(now)
                .bind(id)
                .bind(user_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to claim article")?
                .rows_affected(),
        };
        Ok(affected == 1)
    }

    async fn mark_completed(&self, id: i64, content: &str) -> Result<()> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(COMPLETE_ARTICLE)
                    .bind(content)
                    .bind(now)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to store generated content")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(COMPLETE_ARTICLE)
                    .bind(content)
                    .bind(now)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to store generated content")?;
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(FAIL_ARTICLE)
                    .bind(error)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to record generation failure")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(FAIL_ARTICLE)
                    .bind(error)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to record generation failure")?;
            }
        }
        Ok(())
    }

    async fn fail_interrupted(&self, error: &str) -> Result<u64> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(FAIL_INTERRUPTED)
                .bind(error)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to reset interrupted articles")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(FAIL_INTERRUPTED)
                .bind(error)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to reset interrupted articles")?
                .rows_affected(),
        };
        Ok(affected)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_articles_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    titles: &[String],
) -> Result<Vec<Article>> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let mut created = Vec::with_capacity(titles.len());

    for title in titles {
        let result = sqlx::query(INSERT_ARTICLE)
            .bind(user_id)
            .bind(title)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to create article")?;

        created.push(inserted(result.last_insert_rowid(), user_id, title, now));
    }

    tx.commit().await.context("Failed to commit articles")?;
    Ok(created)
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    let status: String = row.get("status");
    Ok(Article {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        content: row.get("content"),
        status: ArticleStatus::from_str(&status)
            .with_context(|| format!("Invalid status in database: {}", status))?,
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_articles_mysql(
    pool: &MySqlPool,
    user_id: i64,
    titles: &[String],
) -> Result<Vec<Article>> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let mut created = Vec::with_capacity(titles.len());

    for title in titles {
        let result = sqlx::query(INSERT_ARTICLE)
            .bind(user_id)
            .bind(title)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to create article")?;

        created.push(inserted(result.last_insert_id() as i64, user_id, title, now));
    }

    tx.commit().await.context("Failed to commit articles")?;
    Ok(created)
}

fn row_to_article_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Article> {
    let status: String = row.get("status");
    Ok(Article {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        content: row.get("content"),
        status: ArticleStatus::from_str(&status)
            .with_context(|| format!("Invalid status in database: {}", status))?,
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
    })
}

fn inserted(id: i64, user_id: i64, title: &str, now: DateTime<Utc>) -> Article {
    Article {
        id,
        created_at: now,
        updated_at: now,
        ..Article::new(user_id, title.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> SqlxArticleRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        for name in ["alice", "bob"] {
            sqlx::query("INSERT INTO users (username, password_hash) VALUES (?, 'hash')")
                .bind(name)
                .execute(pool.as_sqlite().unwrap())
                .await
                .expect("Failed to create test user");
        }
        SqlxArticleRepository::new(pool)
    }

    fn titles(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_create_many_and_get() {
        let repo = setup().await;

        let created = repo
            .create_many(1, &titles(&["First", "Second"]))
            .await
            .expect("Failed to create articles");
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|a| a.status == ArticleStatus::Pending));

        let found = repo.get_by_id(created[1].id).await.unwrap().unwrap();
        assert_eq!(found.title, "Second");
        assert_eq!(found.user_id, 1);
        assert!(found.content.is_none());
    }

    #[tokio::test]
    async fn test_list_by_user_is_scoped_and_newest_first() {
        let repo = setup().await;
        repo.create_many(1, &titles(&["a1", "a2"])).await.unwrap();
        repo.create_many(2, &titles(&["b1"])).await.unwrap();
        repo.create_many(1, &titles(&["a3"])).await.unwrap();

        let listed = repo.list_by_user(1).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|a| a.title.as_str()).collect();

        assert_eq!(names, vec!["a3", "a2", "a1"]);
        assert!(listed.iter().all(|a| a.user_id == 1));
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let repo = setup().await;
        let article = repo.create_many(1, &titles(&["Claim me"])).await.unwrap().remove(0);

        assert!(repo.claim_for_generation(article.id, 1).await.unwrap());
        assert!(!repo.claim_for_generation(article.id, 1).await.unwrap());

        let found = repo.get_by_id(article.id).await.unwrap().unwrap();
        assert_eq!(found.status, ArticleStatus::Processing);
    }

    #[tokio::test]
    async fn test_claim_requires_owner() {
        let repo = setup().await;
        let article = repo.create_many(1, &titles(&["Mine"])).await.unwrap().remove(0);

        assert!(!repo.claim_for_generation(article.id, 2).await.unwrap());
        let found = repo.get_by_id(article.id).await.unwrap().unwrap();
        assert_eq!(found.status, ArticleStatus::Pending);
    }

    #[tokio::test]
    async fn test_complete_then_regenerate() {
        let repo = setup().await;
        let article = repo.create_many(1, &titles(&["Topic"])).await.unwrap().remove(0);

        repo.claim_for_generation(article.id, 1).await.unwrap();
        repo.mark_failed(article.id, "timeout").await.unwrap();
        let failed = repo.get_by_id(article.id).await.unwrap().unwrap();
        assert_eq!(failed.status, ArticleStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("timeout"));

        assert!(repo.claim_for_generation(article.id, 1).await.unwrap());
        repo.mark_completed(article.id, "Body text").await.unwrap();
        let done = repo.get_by_id(article.id).await.unwrap().unwrap();
        assert_eq!(done.status, ArticleStatus::Completed);
        assert_eq!(done.content.as_deref(), Some("Body text"));
        assert!(done.error.is_none());
        assert!(done.completed_at.is_some());

        // Completed articles can be claimed again
        assert!(repo.claim_for_generation(article.id, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_interrupted() {
        let repo = setup().await;
        let created = repo.create_many(1, &titles(&["x", "y"])).await.unwrap();
        repo.claim_for_generation(created[0].id, 1).await.unwrap();

        assert_eq!(repo.fail_interrupted("restart").await.unwrap(), 1);

        let stuck = repo.get_by_id(created[0].id).await.unwrap().unwrap();
        assert_eq!(stuck.status, ArticleStatus::Failed);
        assert_eq!(stuck.error.as_deref(), Some("restart"));
        let untouched = repo.get_by_id(created[1].id).await.unwrap().unwrap();
        assert_eq!(untouched.status, ArticleStatus::Pending);
    }
}
