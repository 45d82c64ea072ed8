//! Quillboard - An authenticated dashboard for generating articles

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quillboard::{
    api,
    config::Config,
    db::{self, repositories::SqlxApiKeyRepository},
    services::FallbackGenerator,
};

/// How often expired sessions are purged
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quillboard=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Quillboard...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    if config.server.uses_default_secret() {
        tracing::warn!("Using the default session secret; set SESSION_SECRET in production");
    }
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Content generation reads provider keys from the store on every call
    let generator = FallbackGenerator::from_config(
        &config.generation,
        SqlxApiKeyRepository::boxed(pool.clone()),
    )?;
    let providers: Vec<&str> = config
        .generation
        .providers
        .iter()
        .map(|p| p.service_name())
        .collect();
    tracing::info!("Content generation providers: {}", providers.join(" -> "));

    let bootstrap_admin = config.auth.bootstrap_admin.clone();
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = api::build_state(config, pool.clone(), Arc::new(generator))?;

    if let Some(admin) = bootstrap_admin {
        state.user_service.ensure_bootstrap_admin(&admin).await?;
    }
    state.article_service.fail_interrupted().await?;

    // Purge expired sessions periodically
    {
        let user_service = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                match user_service.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!(count, "Removed expired sessions"),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
            }
        });
    }

    // Build router
    let app = api::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped, closing database pool");
    pool.close().await;

    Ok(())
}

/// Resolves on Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
