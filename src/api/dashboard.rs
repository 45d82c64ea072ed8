//! Dashboard pages
//!
//! - GET / - Articles owned by the session user, newest first
//! - POST /add_title - Create pending articles from newline separated titles
//! - POST /upload_titles - Create pending articles from an uploaded CSV file
//! - GET /settings - API key management (admins only)

use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    response::Response,
    routing::{get, post},
    Form, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::cookies::Flash;
use crate::api::middleware::{redirect_with_flash, render_page, AppState, AuthenticatedUser, PageError};
use crate::models::ApiKeySummary;
use crate::services::{ApiKeyServiceError, ArticleServiceError};

/// Build the dashboard router (behind the page login gate)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/add_title", post(add_title))
        .route("/upload_titles", post(upload_titles))
        .route("/settings", get(settings))
}

#[derive(Debug, Deserialize)]
pub struct AddTitlesForm {
    #[serde(default)]
    pub titles: String,
}

/// One card on the settings page
#[derive(Debug, Serialize)]
struct ServiceRow {
    service: String,
    masked_key: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

/// GET /
async fn dashboard(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
) -> Result<Response, PageError> {
    let articles = state
        .article_service
        .list_for_user(user.id)
        .await
        .map_err(|e| PageError::internal("/login", "Failed to load articles", e))?;

    let mut context = TeraContext::new();
    context.insert("articles", &articles);
    Ok(render_page(&state, &headers, "dashboard.html", &context, Some(&user)))
}

/// POST /add_title
async fn add_title(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(form): Form<AddTitlesForm>,
) -> Result<Response, PageError> {
    let created = state
        .article_service
        .add_titles(user.id, &form.titles)
        .await
        .map_err(|e| match e {
            ArticleServiceError::ValidationError(msg) => PageError::new("/", Flash::error(msg)),
            e => PageError::internal("/", "Failed to add titles", e),
        })?;

    let message = format!("Added {} title(s) successfully", created.len());
    Ok(redirect_with_flash("/", &Flash::success(message)))
}

/// POST /upload_titles
async fn upload_titles(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Response, PageError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PageError::new("/", Flash::error(format!("Error processing file: {}", e))))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| PageError::new("/", Flash::error(format!("Error processing file: {}", e))))?;
        upload = Some((filename, data.to_vec()));
        break;
    }

    let Some((filename, data)) = upload else {
        return Err(PageError::new("/", Flash::error("No file uploaded")));
    };
    if filename.is_empty() {
        return Err(PageError::new("/", Flash::error("No file selected")));
    }

    let created = state
        .article_service
        .add_titles_from_csv(user.id, &data)
        .await
        .map_err(|e| match e {
            ArticleServiceError::ValidationError(msg) => PageError::new("/", Flash::error(msg)),
            e => PageError::internal("/", "Failed to upload titles", e),
        })?;

    tracing::debug!(user_id = user.id, filename = %filename, "Processed title upload");
    let message = format!("Uploaded {} title(s) successfully", created.len());
    Ok(redirect_with_flash("/", &Flash::success(message)))
}

/// GET /settings
async fn settings(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
) -> Result<Response, PageError> {
    let keys = state
        .api_key_service
        .list(&user)
        .await
        .map_err(|e| match e {
            ApiKeyServiceError::Forbidden => PageError::new("/", Flash::error("Access denied")),
            e => PageError::internal("/", "Failed to load API keys", e),
        })?;

    let providers: Vec<&str> = state
        .config
        .generation
        .providers
        .iter()
        .map(|p| p.service_name())
        .collect();

    let mut context = TeraContext::new();
    context.insert("services", &service_rows(&providers, keys));
    Ok(render_page(&state, &headers, "settings.html", &context, Some(&user)))
}

/// Configured providers first (with or without a stored key), then any
/// other stored services
fn service_rows(providers: &[&str], keys: Vec<ApiKeySummary>) -> Vec<ServiceRow> {
    let mut rows: Vec<ServiceRow> = Vec::new();
    for provider in providers {
        if rows.iter().any(|r| r.service == *provider) {
            continue;
        }
        rows.push(ServiceRow {
            service: provider.to_string(),
            masked_key: None,
            updated_at: None,
        });
    }

    for key in keys {
        match rows.iter_mut().find(|r| r.service == key.service) {
            Some(row) => {
                row.masked_key = Some(key.masked_key);
                row.updated_at = Some(key.updated_at);
            }
            None => rows.push(ServiceRow {
                service: key.service,
                masked_key: Some(key.masked_key),
                updated_at: Some(key.updated_at),
            }),
        }
    }
    rows
}
