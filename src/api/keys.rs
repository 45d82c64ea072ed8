//! API key endpoint
//!
//! - POST /api/keys - Store a provider key (admins only)

use axum::{extract::State, routing::post, Form, Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the API key router (requires auth middleware)
pub fn router() -> Router<AppState> {
    Router::new().route("/api/keys", post(update_key))
}

/// Form body for a key update. Missing fields are reported as `400`.
#[derive(Debug, Deserialize)]
pub struct UpdateKeyForm {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// POST /api/keys
async fn update_key(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(form): Form<UpdateKeyForm>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .api_key_service
        .update_key(&user, &form.service, &form.key)
        .await?;

    Ok(Json(MessageResponse {
        message: "API key updated successfully",
    }))
}
