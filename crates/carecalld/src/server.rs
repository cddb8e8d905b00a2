//! HTTP server for carecalld.

use crate::orchestrator::TurnOrchestrator;
use crate::routes;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers.
pub struct AppState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<TurnOrchestrator>) -> Self {
        Self {
            orchestrator,
            start_time: Instant::now(),
        }
    }
}

/// Run the HTTP server until the process is stopped.
pub async fn run(state: AppState, listen_addr: &str) -> Result<()> {
    let state = Arc::new(state);

    let app = Router::new()
        .merge(routes::turn_routes())
        .merge(routes::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("  Listening on http://{}", listen_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
