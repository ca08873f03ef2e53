mod api;
mod auth;
mod billing;
mod config;
mod db;
mod observability;
mod queue;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::Database;
use crate::observability::Counters;
use crate::queue::GpuQueue;

/// Shared application state available to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub observability: Counters,
    pub gpu_queue: GpuQueue,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gpuops_controller=info,tower_http=info".into()),
        )
        .init();

    info!("Starting gpuops controller v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env()?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    info!(listen_addr = %config.listen_addr, "Configuration loaded");

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;
    info!("Database initialized");

    auth::bootstrap::ensure_bootstrap_admin(&config, &db).await?;

    let state = Arc::new(AppState {
        config,
        db,
        observability: Counters::new(),
        gpu_queue: GpuQueue::new(),
    });

    // Spawn hourly expired-session cleanup.
    {
        let db = state.db.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
            interval.tick().await; // first tick is immediate — skip it
            loop {
                interval.tick().await;
                match auth::sessions::cleanup_expired(&db).await {
                    Ok(n) if n > 0 => info!(deleted = n, "Cleaned up expired admin sessions"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Failed to clean up expired admin sessions"),
                }
            }
        });
    }

    let app = build_router(state.clone());
    let addr = state.config.listen_addr.parse::<std::net::SocketAddr>()?;

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let state_for_metrics = state.clone();

    Router::new()
        .route("/healthz", get(|| async { StatusCode::NO_CONTENT }))
        .route(
            "/metrics",
            get(move || {
                let state = state_for_metrics.clone();
                async move { state.observability.render(state.gpu_queue.len()) }
            }),
        )
        .merge(api::routes(state.clone()))
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024)) // 2 MB — individual reports are small
        .layer(axum::middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer())
        .with_state(state)
}

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::any())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-agent-token"),
            axum::http::HeaderName::from_static("x-csrf-token"),
        ])
}

async fn security_headers(req: axum::extract::Request, next: axum::middleware::Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response
}
