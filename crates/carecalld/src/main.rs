//! Carecall daemon. Loads the clinic configuration, wires the dialogue
//! engine, and serves the telephony-facing HTTP API.

use anyhow::{Context, Result};
use carecall_common::EngineConfig;
use carecalld::server::{self, AppState};
use carecalld::TurnOrchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn config_path() -> PathBuf {
    if let Some(arg) = std::env::args().nth(1) {
        return PathBuf::from(arg);
    }
    if let Ok(env) = std::env::var("CARECALL_CONFIG") {
        return PathBuf::from(env);
    }
    PathBuf::from("carecall.toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("carecalld v{} starting", env!("CARGO_PKG_VERSION"));

    let path = config_path();
    let config = EngineConfig::load(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    info!(config = %path.display(), "configuration loaded");

    let orchestrator = Arc::new(TurnOrchestrator::from_config(&config)?);

    // Background sweep for expired call sessions.
    let sweeper = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        let interval = Duration::from_secs(sweeper.sweep_interval_secs());
        loop {
            tokio::time::sleep(interval).await;
            let evicted = sweeper.evict_expired_sessions().await;
            if evicted > 0 {
                info!(evicted, "session sweep complete");
            }
        }
    });

    let state = AppState::new(orchestrator);
    if let Err(e) = server::run(state, &config.server.listen_addr).await {
        warn!(error = %e, "server stopped");
        return Err(e);
    }
    Ok(())
}
