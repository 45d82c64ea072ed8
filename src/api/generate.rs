//! Generation API endpoints
//!
//! - POST /generate/{id} - Generate content for an owned article
//! - GET /status/{id} - Current generation status of an owned article

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::StatusView;

/// Build the generation router (requires auth middleware)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate/{id}", post(generate))
        .route("/status/{id}", get(status))
}

/// Response for a successful generation
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub status: &'static str,
    pub article_id: i64,
    pub content: String,
}

/// POST /generate/{id}
///
/// Runs the provider chain within the request. A failed generation is
/// persisted on the article and reported as `502`.
async fn generate(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let generated = state.article_service.generate(user.id, id).await?;

    Ok(Json(GenerateResponse {
        status: "success",
        article_id: generated.article_id,
        content: generated.content,
    }))
}

/// GET /status/{id}
async fn status(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<StatusView>, ApiError> {
    let view = state.article_service.status(user.id, id).await?;
    Ok(Json(view))
}
