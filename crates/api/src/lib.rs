//! `api` crate: HTTP front end of the deployer.
//!
//! Routes:
//!   GET  /health
//!   GET  /api/v1/templates/{id}/requirements
//!   POST /api/v1/templates/{id}/deploy
//!   GET  /api/v1/deployments/{id}

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use handlers::{ApiError, AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/templates/:id/requirements", get(handlers::templates::requirements))
        .route("/api/v1/templates/:id/deploy", post(handlers::templates::deploy))
        .route("/api/v1/deployments/:id", get(handlers::deployments::get))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
