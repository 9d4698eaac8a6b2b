//! Push scheduling routes.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use chexmix_common::error::AppError;
use chexmix_common::types::Subscription;

use crate::middleware::auth::ApiKeyAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/vapidPublicKey", get(vapid_public_key))
        .route("/api/subscribe", post(subscribe))
        .route("/api/scheduleNext", post(schedule_next))
        .route("/api/cancel", post(cancel))
}

/// Body of `POST /api/scheduleNext`. Everything is optional at the decoding
/// stage so that missing fields are reported by validation as a 400.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleNextRequest {
    #[serde(default)]
    pub subscription: Option<Subscription>,
    #[serde(default)]
    pub at_ms: Option<f64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleNextResponse {
    pub ok: bool,
    pub scheduled_in_ms: u64,
    pub job_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// GET /api/vapidPublicKey: the application server key browsers subscribe with.
async fn vapid_public_key(State(state): State<AppState>) -> Json<serde_json::Value> {
    let key = state.config.vapid_public_key.clone().unwrap_or_default();
    Json(json!({ "publicKey": key }))
}

/// POST /api/subscribe: acknowledge a subscription. Nothing is stored server-side.
async fn subscribe(_auth: ApiKeyAuth) -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// POST /api/scheduleNext: schedule (or replace) the single pending push for a subscription.
async fn schedule_next(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    payload: Result<Json<ScheduleNextRequest>, JsonRejection>,
) -> Result<Json<ScheduleNextResponse>, AppError> {
    let Json(request) =
        payload.map_err(|e| AppError::Validation(format!("invalid payload: {}", e.body_text())))?;

    let scheduled = state
        .scheduler
        .schedule(
            request.subscription.unwrap_or_default(),
            request.at_ms.unwrap_or(f64::NAN),
            request.title,
            request.body,
        )
        .await?;

    Ok(Json(ScheduleNextResponse {
        ok: true,
        scheduled_in_ms: scheduled.delay_ms,
        job_id: scheduled.job_id.0,
    }))
}

/// POST /api/cancel: drop whatever is pending for a subscription. Always succeeds.
async fn cancel(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> Json<CancelResponse> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    let job_id = match request.subscription {
        Some(subscription) => state.scheduler.cancel(&subscription).await,
        None => None,
    };

    Json(CancelResponse {
        ok: true,
        job_id: job_id.map(|id| id.0),
    })
}
