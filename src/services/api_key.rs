//! API key service
//!
//! Admin-only management of provider credentials.

use crate::db::repositories::ApiKeyRepository;
use crate::models::{ApiKeySummary, User};
use anyhow::Context;
use std::sync::Arc;

/// Longest service name accepted
const MAX_SERVICE_LENGTH: usize = 50;

/// Error types for API key operations
#[derive(Debug, thiserror::Error)]
pub enum ApiKeyServiceError {
    /// Caller is not an administrator
    #[error("Admin access required")]
    Forbidden,

    #[error("{0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ApiKeyService {
    repo: Arc<dyn ApiKeyRepository>,
}

impl ApiKeyService {
    pub fn new(repo: Arc<dyn ApiKeyRepository>) -> Self {
        Self { repo }
    }

    /// Store `key` for `service`, replacing any previous key.
    ///
    /// The service name is trimmed and lowercased before storage.
    pub async fn update_key(
        &self,
        actor: &User,
        service: &str,
        key: &str,
    ) -> Result<ApiKeySummary, ApiKeyServiceError> {
        if !actor.is_admin() {
            return Err(ApiKeyServiceError::Forbidden);
        }

        let service = normalize_service(service)?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ApiKeyServiceError::ValidationError(
                "Missing required fields".to_string(),
            ));
        }

        let stored = self
            .repo
            .upsert(&service, key)
            .await
            .context("Failed to store API key")?;

        tracing::info!(service = %stored.service, user_id = actor.id, "API key updated");
        Ok(stored.summary())
    }

    /// Masked view of every stored key, for the settings page
    pub async fn list(&self, actor: &User) -> Result<Vec<ApiKeySummary>, ApiKeyServiceError> {
        if !actor.is_admin() {
            return Err(ApiKeyServiceError::Forbidden);
        }

        let keys = self.repo.list().await.context("Failed to list API keys")?;
        Ok(keys.iter().map(|k| k.summary()).collect())
    }
}

fn normalize_service(raw: &str) -> Result<String, ApiKeyServiceError> {
    let service = raw.trim().to_lowercase();
    if service.is_empty() {
        return Err(ApiKeyServiceError::ValidationError(
            "Missing required fields".to_string(),
        ));
    }
    let valid = service.len() <= MAX_SERVICE_LENGTH
        && service
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ApiKeyServiceError::ValidationError(format!(
            "Invalid service name '{}'",
            raw.trim()
        )));
    }
    Ok(service)
}
