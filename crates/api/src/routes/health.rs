//! Health check endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let capability = state.scheduler.capability();

    let mut body = json!({
        "status": "ok",
        "service": "chexmix-push-api",
        "version": env!("CARGO_PKG_VERSION"),
        "scheduling": if capability.is_enabled() { "enabled" } else { "disabled" },
    });

    if let Some(queue) = capability.queue() {
        match queue.len().await {
            Ok(pending) => body["pendingJobs"] = json!(pending),
            Err(e) => tracing::warn!(error = %e, "Health check could not read queue length"),
        }
    }

    Json(body)
}
