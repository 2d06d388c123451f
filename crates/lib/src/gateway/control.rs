//! HTTP control plane: health and session listing for operators and health checks.

use crate::gateway::stats::GatewayStats;
use crate::session::SessionTable;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct ControlState {
    pub sessions: Arc<SessionTable>,
    pub stats: Arc<GatewayStats>,
    pub node_addr: SocketAddr,
    pub remote_addr: SocketAddr,
}

pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/sessions", get(sessions_http))
        .with_state(state)
}

/// GET / returns a simple health JSON (for liveness checks).
async fn health_http(State(state): State<ControlState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "nodePort": state.node_addr.port(),
        "remotePort": state.remote_addr.port(),
        "sessions": state.sessions.len().await,
        "stats": state.stats.snapshot(),
    }))
}

/// GET /sessions lists tracked flows, oldest first.
async fn sessions_http(State(state): State<ControlState>) -> Json<serde_json::Value> {
    Json(json!({ "sessions": state.sessions.snapshot().await }))
}
