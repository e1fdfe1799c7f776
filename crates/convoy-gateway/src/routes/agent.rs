//! `GET /api/agent/init` — warm the agent singleton.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::GatewayState;

/// Initialization is partial-degradation, so warming always reports
/// `ok`; unreachable MCP servers are listed instead of failing.
pub async fn init(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let service = state.agent().await;
    Json(json!({
        "ok": true,
        "agent": service.runtime.name(),
        "tools": service.tools.len(),
        "failedServers": service.failed_backends,
    }))
}
