//! Authentication pages
//!
//! - GET/POST /login - Login form and credential check
//! - GET/POST /register - Registration form, logs the new user in
//! - GET /logout - End the current session

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::Response,
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::api::cookies::{self, Flash, SESSION_COOKIE};
use crate::api::middleware::{
    redirect, redirect_with_flash, render_page, AppState, AuthenticatedUser,
    PageError,
};
use crate::services::{LoginInput, RegisterInput, UserServiceError};

/// Form body shared by login and registration
#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Routes reachable without a session
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/register", get(register_page).post(register))
}

/// Routes behind the page login gate
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/logout", get(logout))
}

/// GET /login
async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    render_page(&state, &headers, "login.html", &TeraContext::new(), None)
}

/// POST /login
async fn login(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, PageError> {
    let session = state
        .user_service
        .login(LoginInput::new(form.username, form.password))
        .await
        .map_err(|e| match e {
            UserServiceError::AuthenticationError(msg) => PageError::new("/login", Flash::error(msg)),
            e => PageError::internal("/login", "An error occurred during login", e),
        })?;

    Ok(with_session(&state, redirect("/"), &session.id))
}

/// GET /register
async fn register_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut context = TeraContext::new();
    context.insert("min_password_length", &state.config.auth.min_password_length);
    render_page(&state, &headers, "register.html", &context, None)
}

/// POST /register
async fn register(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, PageError> {
    let user = state
        .user_service
        .register(RegisterInput::new(form.username, form.password))
        .await
        .map_err(|e| match e {
            UserServiceError::ValidationError(_) | UserServiceError::UserExists(_) => {
                PageError::new("/register", Flash::error(e.to_string()))
            }
            e => PageError::internal("/register", "An error occurred during registration", e),
        })?;

    let session = state
        .user_service
        .start_session(user.id)
        .await
        .map_err(|e| PageError::internal("/login", "An error occurred during login", e))?;

    let response = redirect_with_flash("/", &Flash::success("Registration successful!"));
    Ok(with_session(&state, response, &session.id))
}

/// GET /logout
async fn logout(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
) -> Response {
    if let Some(token) = cookies::session_token(&headers, &state.signer) {
        if let Err(e) = state.user_service.logout(&token).await {
            tracing::error!(user_id = user.id, "Failed to delete session: {}", e);
        }
    }
    tracing::info!(user_id = user.id, "User logged out");

    let mut response = redirect("/login");
    response
        .headers_mut()
        .append(header::SET_COOKIE, cookies::expired_cookie(SESSION_COOKIE));
    response
}

fn with_session(state: &AppState, mut response: Response, token: &str) -> Response {
    let cookie = cookies::session_cookie(
        &state.signer,
        token,
        state.config.auth.session_expiration_days,
    );
    response.headers_mut().append(header::SET_COOKIE, cookie);
    response
}
