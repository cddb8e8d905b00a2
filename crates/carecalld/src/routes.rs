//! API routes for carecalld.
//!
//! The telephony relay is the only intended client: it posts each
//! transcribed utterance to /v1/turn and the hangup webhook to
//! /v1/call/ended, then renders the response text to speech.

use crate::server::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use carecall_common::{CallError, CallSession, DialogueState, Directive, VERSION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

type AppStateArc = Arc<AppState>;

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub call_id: String,
    /// Transcribed caller utterance. Empty on the opening turn.
    #[serde(default)]
    pub utterance: String,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub response_text: String,
    pub directive: Directive,
    pub state: DialogueState,
    pub session: CallSession,
}

#[derive(Debug, Deserialize)]
pub struct CallEndedRequest {
    pub call_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_calls: usize,
    pub uptime_secs: u64,
}

pub fn turn_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/turn", post(handle_turn))
        .route("/v1/call/ended", post(call_ended))
}

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health))
}

async fn handle_turn(
    State(state): State<AppStateArc>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    if req.call_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "call_id is required".to_string()));
    }

    let outcome = state
        .orchestrator
        .handle_turn(&req.call_id, &req.utterance)
        .await
        .map_err(|e| {
            error!(call_id = %req.call_id, error = %e, "turn failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(Json(TurnResponse {
        response_text: outcome.response_text,
        directive: outcome.directive,
        state: outcome.session.state,
        session: outcome.session,
    }))
}

async fn call_ended(
    State(state): State<AppStateArc>,
    Json(req): Json<CallEndedRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    match state.orchestrator.end_call(&req.call_id).await {
        Ok(()) => {
            info!(call_id = %req.call_id, "hangup processed");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(CallError::UnknownCall(_)) => Err((
            StatusCode::NOT_FOUND,
            format!("unknown call '{}'", req.call_id),
        )),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
        active_calls: state.orchestrator.active_calls().await,
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
