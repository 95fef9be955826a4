use axum::Json;
use axum::extract::State;

use crate::state::AppState;

/// Liveness probe with a couple of cheap gauges.
pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let matches = state.matches.read().await.match_count();
    let connections = state
        .ws_connection_count
        .load(std::sync::atomic::Ordering::Relaxed);
    Json(serde_json::json!({
        "status": "ok",
        "matches": matches,
        "ws_connections": connections,
    }))
}
