//! Route assembly: a small public surface (health check) plus the one
//! protected route that matters, the observer WebSocket.

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::ws;

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/observe/ws", get(ws::observer_ws))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
