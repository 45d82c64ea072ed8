//! API middleware
//!
//! Contains:
//! - Shared application state
//! - Authentication gates for JSON routes (401) and pages (redirect to login)
//! - Error types for both kinds of routes

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tera::Context as TeraContext;

use crate::api::cookies::{self, CookieSigner, Flash, FLASH_COOKIE};
use crate::config::Config;
use crate::models::User;
use crate::services::{
    ApiKeyService, ApiKeyServiceError, ArticleService, ArticleServiceError, UserService,
};
use crate::views::Views;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub user_service: Arc<UserService>,
    pub article_service: Arc<ArticleService>,
    pub api_key_service: Arc<ApiKeyService>,
    pub views: Arc<Views>,
    pub signer: Arc<CookieSigner>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self::new("GENERATION_FAILED", message)
    }

    /// Log the cause and answer with a generic message
    pub fn internal_error(context: &str, cause: impl Display) -> Self {
        tracing::error!("{}: {}", context, cause);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "GENERATION_FAILED" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ArticleServiceError> for ApiError {
    fn from(e: ArticleServiceError) -> Self {
        match e {
            ArticleServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            ArticleServiceError::Forbidden => ApiError::forbidden(e.to_string()),
            ArticleServiceError::AlreadyProcessing(_) => ApiError::conflict(e.to_string()),
            ArticleServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ArticleServiceError::GenerationFailed(msg) => ApiError::generation_failed(msg),
            ArticleServiceError::InternalError(e) => {
                ApiError::internal_error("Article operation failed", format!("{:#}", e))
            }
        }
    }
}

impl From<ApiKeyServiceError> for ApiError {
    fn from(e: ApiKeyServiceError) -> Self {
        match e {
            ApiKeyServiceError::Forbidden => ApiError::forbidden(e.to_string()),
            ApiKeyServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ApiKeyServiceError::InternalError(e) => {
                ApiError::internal_error("API key operation failed", format!("{:#}", e))
            }
        }
    }
}

/// Failure in a page route: the user is sent elsewhere with a flash message
#[derive(Debug)]
pub struct PageError {
    redirect_to: &'static str,
    flash: Flash,
}

impl PageError {
    pub fn new(redirect_to: &'static str, flash: Flash) -> Self {
        Self { redirect_to, flash }
    }

    /// Log `cause` and redirect with a generic error message
    pub fn internal(redirect_to: &'static str, message: &str, cause: impl Display) -> Self {
        tracing::error!("{}: {}", message, cause);
        Self::new(redirect_to, Flash::error(message))
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        redirect_with_flash(self.redirect_to, &self.flash)
    }
}

/// `303 See Other` to `to`
pub fn redirect(to: &str) -> Response {
    let mut response = StatusCode::SEE_OTHER.into_response();
    if let Ok(location) = HeaderValue::from_str(to) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    response
}

/// `303 See Other` to `to`, carrying a flash message
pub fn redirect_with_flash(to: &str, flash: &Flash) -> Response {
    let mut response = redirect(to);
    response
        .headers_mut()
        .append(header::SET_COOKIE, flash.to_cookie());
    response
}

/// Render a page, consuming any pending flash message
pub fn render_page(
    state: &AppState,
    headers: &HeaderMap,
    template: &str,
    context: &TeraContext,
    current_user: Option<&User>,
) -> Response {
    let flash = Flash::from_headers(headers);
    let html = match state
        .views
        .render(template, context, current_user, flash.as_ref())
    {
        Ok(html) => html,
        Err(e) => {
            tracing::error!("{}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    let mut response = Html(html).into_response();
    if flash.is_some() {
        response
            .headers_mut()
            .append(header::SET_COOKIE, cookies::expired_cookie(FLASH_COOKIE));
    }
    response
}

/// Resolve the session cookie to a user.
///
/// Unsigned, tampered, unknown and expired sessions all resolve to `None`.
async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<Option<User>, String> {
    let Some(token) = cookies::session_token(headers, &state.signer) else {
        return Ok(None);
    };
    state
        .user_service
        .validate_session(&token)
        .await
        .map_err(|e| e.to_string())
}

/// Authentication middleware for JSON routes
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = current_user(&state, request.headers())
        .await
        .map_err(|e| ApiError::internal_error("Session validation failed", e))?
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Authentication middleware for pages: anonymous visitors go to `/login`
pub async fn require_login(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match current_user(&state, request.headers()).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(AuthenticatedUser(user));
            next.run(request).await
        }
        Ok(None) => redirect("/login"),
        Err(e) => {
            PageError::internal("/login", "An error occurred, please log in again", e).into_response()
        }
    }
}
