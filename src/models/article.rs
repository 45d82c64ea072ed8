//! Article model
//!
//! An article is a title owned by one user whose body is produced on demand
//! by a content generator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of characters kept from a submitted title
pub const MAX_TITLE_LENGTH: usize = 256;

/// Article entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Unique identifier
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Topic the content is generated from
    pub title: String,
    /// Generated body, absent until the first successful generation
    pub content: Option<String>,
    /// Generation lifecycle state
    pub status: ArticleStatus,
    /// Message from the last failed generation
    pub error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// When content was last generated successfully
    pub completed_at: Option<DateTime<Utc>>,
}

impl Article {
    /// Build a pending article that has not been persisted yet
    pub fn new(user_id: i64, title: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            user_id,
            title,
            content: None,
            status: ArticleStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Snapshot of the fields the status endpoint reports
    pub fn status_view(&self) -> StatusView {
        StatusView {
            article_id: self.id,
            status: self.status,
            error: self.error.clone(),
        }
    }
}

/// Generation lifecycle state.
///
/// `Pending` → `Processing` → `Completed` | `Failed`. Finished articles may be
/// claimed again; a `Processing` one may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ArticleStatus {
    /// All states, in lifecycle order
    pub const ALL: [ArticleStatus; 4] = [
        ArticleStatus::Pending,
        ArticleStatus::Processing,
        ArticleStatus::Completed,
        ArticleStatus::Failed,
    ];

    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Pending => "pending",
            ArticleStatus::Processing => "processing",
            ArticleStatus::Completed => "completed",
            ArticleStatus::Failed => "failed",
        }
    }

    /// Whether a generation request may claim an article in this state
    pub fn can_start_generation(&self) -> bool {
        !matches!(self, ArticleStatus::Processing)
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ArticleStatus::Pending),
            "processing" => Ok(ArticleStatus::Processing),
            "completed" => Ok(ArticleStatus::Completed),
            "failed" => Ok(ArticleStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid article status: {}", s)),
        }
    }
}

/// Authoritative status of one article, as served by `GET /status/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusView {
    pub article_id: i64,
    pub status: ArticleStatus,
    pub error: Option<String>,
}
