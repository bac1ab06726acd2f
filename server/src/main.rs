//! DocSync Server - schema discovery, row reads and change-set sync over HTTP.
//!
//! The server exposes the docsync-engine against a PostgreSQL-backed
//! document store. Engine work is synchronous and runs on the blocking
//! thread pool.

mod cache;
mod config;
mod db;
mod error;
mod handlers;
mod routes;

use crate::cache::NameCache;
use crate::config::Config;
use crate::db::PoolRegistry;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pools: Arc<PoolRegistry>,
    pub config: Arc<Config>,
    pub names: Arc<NameCache>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docsync_server=debug,docsync_engine=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting DocSync Server on {}:{}", config.host, config.port);

    // Create database pool
    let pool = db::create_pool(&config.database_url, config.max_connections).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    // Build application state
    let state = AppState {
        pools: Arc::new(PoolRegistry::new(
            config.allowed_stores(),
            config.database_url.clone(),
            pool,
            config.max_connections,
        )),
        config: Arc::new(config.clone()),
        names: Arc::new(NameCache::new()),
    };

    // Build router
    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
