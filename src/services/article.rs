//! Article service
//!
//! Owns the article lifecycle: bulk creation from pasted titles, per-user
//! listing, status reads and the generate flow (ownership check, claim,
//! provider call, persist outcome).

use crate::db::repositories::ArticleRepository;
use crate::models::{Article, StatusView, MAX_TITLE_LENGTH};
use crate::services::generator::ContentGenerator;
use anyhow::Context;
use std::sync::Arc;

/// Error recorded on articles left `processing` by a previous run
pub const INTERRUPTED_MESSAGE: &str = "Generation interrupted by server restart";

/// Error types for article service operations
#[derive(Debug, thiserror::Error)]
pub enum ArticleServiceError {
    #[error("Article {0} not found")]
    NotFound(i64),

    /// The article belongs to another user
    #[error("You do not have access to this article")]
    Forbidden,

    #[error("Article {0} is already being processed")]
    AlreadyProcessing(i64),

    #[error("{0}")]
    ValidationError(String),

    /// The provider chain failed; the message is persisted on the article
    #[error("{0}")]
    GenerationFailed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Result of a successful generation
#[derive(Debug, Clone)]
pub struct GeneratedArticle {
    pub article_id: i64,
    pub content: String,
}

/// Article service
pub struct ArticleService {
    repo: Arc<dyn ArticleRepository>,
    generator: Arc<dyn ContentGenerator>,
}

impl ArticleService {
    pub fn new(repo: Arc<dyn ArticleRepository>, generator: Arc<dyn ContentGenerator>) -> Self {
        Self { repo, generator }
    }

    /// Create one pending article per non-blank line of `raw`
    pub async fn add_titles(
        &self,
        user_id: i64,
        raw: &str,
    ) -> Result<Vec<Article>, ArticleServiceError> {
        let titles = parse_titles(raw);
        if titles.is_empty() {
            return Err(ArticleServiceError::ValidationError(
                "No titles provided".to_string(),
            ));
        }

        let created = self
            .repo
            .create_many(user_id, &titles)
            .await
            .context("Failed to create articles")?;

        tracing::info!(user_id, count = created.len(), "Added article titles");
        Ok(created)
    }

    /// Create one pending article per data row of an uploaded CSV file.
    /// The first row is a header; each title is the row's first column.
    pub async fn add_titles_from_csv(
        &self,
        user_id: i64,
        data: &[u8],
    ) -> Result<Vec<Article>, ArticleServiceError> {
        let titles = parse_csv_titles(data).map_err(|e| {
            ArticleServiceError::ValidationError(format!("Error processing file: {}", e))
        })?;
        if titles.is_empty() {
            return Err(ArticleServiceError::ValidationError(
                "No titles provided".to_string(),
            ));
        }

        let created = self
            .repo
            .create_many(user_id, &titles)
            .await
            .context("Failed to create articles")?;

        tracing::info!(user_id, count = created.len(), "Uploaded article titles");
        Ok(created)
    }

    /// Articles owned by `user_id`, newest first
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Article>, ArticleServiceError> {
        let articles = self
            .repo
            .list_by_user(user_id)
            .await
            .context("Failed to list articles")?;
        Ok(articles)
    }

    /// Current status of an article owned by `user_id`
    pub async fn status(&self, user_id: i64, id: i64) -> Result<StatusView, ArticleServiceError> {
        Ok(self.get_owned(user_id, id).await?.status_view())
    }

    /// Generate content for an owned article.
    ///
    /// The article is claimed with a conditional update before the provider
    /// is called, so a second request for the same article gets
    /// `AlreadyProcessing` until the first one finishes.
    pub async fn generate(
        &self,
        user_id: i64,
        id: i64,
    ) -> Result<GeneratedArticle, ArticleServiceError> {
        let article = self.get_owned(user_id, id).await?;

        if !article.status.can_start_generation()
            || !self
                .repo
                .claim_for_generation(id, user_id)
                .await
                .context("Failed to claim article")?
        {
            return Err(ArticleServiceError::AlreadyProcessing(id));
        }

        tracing::info!(article_id = id, generator = self.generator.name(), "Generation started");

        // Runs detached from the request so a dropped connection still
        // settles the claimed article
        let task = tokio::spawn(run_generation(
            self.repo.clone(),
            self.generator.clone(),
            id,
            article.title,
        ));

        match task.await {
            Ok(result) => result,
            Err(e) => {
                record_failure(self.repo.as_ref(), id, "Generation task aborted").await;
                Err(anyhow::anyhow!("Generation task for article {} failed: {}", id, e).into())
            }
        }
    }

    /// Mark articles stuck in `processing` from an earlier run as failed
    pub async fn fail_interrupted(&self) -> Result<u64, ArticleServiceError> {
        let count = self
            .repo
            .fail_interrupted(INTERRUPTED_MESSAGE)
            .await
            .context("Failed to reset interrupted articles")?;
        if count > 0 {
            tracing::warn!(count, "Marked interrupted generations as failed");
        }
        Ok(count)
    }

    async fn get_owned(&self, user_id: i64, id: i64) -> Result<Article, ArticleServiceError> {
        let article = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to load article")?
            .ok_or(ArticleServiceError::NotFound(id))?;

        if article.user_id != user_id {
            return Err(ArticleServiceError::Forbidden);
        }
        Ok(article)
    }
}

/// Call the generator for a claimed article and persist the outcome
async fn run_generation(
    repo: Arc<dyn ArticleRepository>,
    generator: Arc<dyn ContentGenerator>,
    id: i64,
    title: String,
) -> Result<GeneratedArticle, ArticleServiceError> {
    match generator.generate(&title).await {
        Ok(content) => {
            if let Err(e) = repo.mark_completed(id, &content).await {
                record_failure(repo.as_ref(), id, "Failed to save generated content").await;
                return Err(e.context("Failed to store generated content").into());
            }
            tracing::info!(article_id = id, chars = content.len(), "Generation completed");
            Ok(GeneratedArticle {
                article_id: id,
                content,
            })
        }
        Err(e) => {
            let message = e.to_string();
            tracing::warn!(article_id = id, "Generation failed: {}", message);
            record_failure(repo.as_ref(), id, &message).await;
            Err(ArticleServiceError::GenerationFailed(message))
        }
    }
}

async fn record_failure(repo: &dyn ArticleRepository, id: i64, message: &str) {
    if let Err(e) = repo.mark_failed(id, message).await {
        tracing::error!(article_id = id, "Failed to record generation failure: {:#}", e);
    }
}

/// Split pasted text into titles: one per line, trimmed, blanks dropped,
/// each capped at the column length.
pub fn parse_titles(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.chars().take(MAX_TITLE_LENGTH).collect::<String>().trim_end().to_string())
        .collect()
}

/// Titles from the first column of a CSV document, header row skipped.
/// Rows may have any number of columns; empty first cells are dropped.
pub fn parse_csv_titles(data: &[u8]) -> Result<Vec<String>, csv::Error> {
    let records = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data)
        .into_records();

    let mut titles = Vec::new();
    for record in records {
        let record = record?;
        let Some(first) = record.get(0).map(str::trim) else {
            continue;
        };
        if first.is_empty() {
            continue;
        }
        titles.push(first.chars().take(MAX_TITLE_LENGTH).collect::<String>().trim_end().to_string());
    }
    Ok(titles)
}
