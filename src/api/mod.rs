//! API layer - HTTP handlers and routing
//!
//! Three groups of routes share one `AppState`:
//! - Public pages (login, registration) and static assets
//! - Pages behind the login gate (dashboard, titles, settings, logout)
//! - JSON endpoints behind the session check (generation, status, API keys)

pub mod auth;
pub mod cookies;
pub mod dashboard;
pub mod generate;
pub mod keys;
pub mod middleware;
pub mod static_files;

#[cfg(test)]
mod tests;

use axum::{middleware as axum_middleware, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::repositories::{
    SqlxApiKeyRepository, SqlxArticleRepository, SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{ApiKeyService, ArticleService, ContentGenerator, UserService};
use crate::views::Views;

pub use cookies::CookieSigner;
pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Wire repositories and services into the shared state
pub fn build_state(
    config: Config,
    pool: DynDatabasePool,
    generator: Arc<dyn ContentGenerator>,
) -> anyhow::Result<AppState> {
    let user_service = UserService::with_config(
        SqlxUserRepository::boxed(pool.clone()),
        SqlxSessionRepository::boxed(pool.clone()),
        &config.auth,
    );
    let article_service = ArticleService::new(SqlxArticleRepository::boxed(pool.clone()), generator);
    let api_key_service = ApiKeyService::new(SqlxApiKeyRepository::boxed(pool));

    Ok(AppState {
        signer: Arc::new(CookieSigner::new(&config.server.session_secret)?),
        views: Arc::new(Views::new()?),
        config: Arc::new(config),
        user_service: Arc::new(user_service),
        article_service: Arc::new(article_service),
        api_key_service: Arc::new(api_key_service),
    })
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let pages = Router::new()
        .merge(dashboard::router())
        .merge(auth::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_login,
        ));

    let json = Router::new()
        .merge(generate::router())
        .merge(keys::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(auth::public_router())
        .merge(static_files::router())
        .merge(pages)
        .merge(json)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
