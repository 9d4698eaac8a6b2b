//! Shared-key authentication for mutating routes.
//!
//! When `SCHEDULE_API_KEY` is configured, requests must carry the same value in
//! the `X-API-Key` header. Without a configured key every request passes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use chexmix_common::error::AppError;

use crate::state::AppState;

/// Marker extractor proving the request passed the API key check.
///
/// ```ignore
/// async fn handler(_auth: ApiKeyAuth) -> impl IntoResponse { .. }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ApiKeyAuth;

/// Check a presented key against the configured one.
pub fn check_api_key(expected: Option<&str>, presented: Option<&str>) -> Result<(), AppError> {
    match expected {
        None => Ok(()),
        Some(expected) if presented == Some(expected) => Ok(()),
        Some(_) => Err(AppError::Auth("unauthorized".to_string())),
    }
}

impl FromRequestParts<AppState> for ApiKeyAuth {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let presented = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let result = check_api_key(state.config.schedule_api_key.as_deref(), presented.as_deref());

        async move { result.map(|_| ApiKeyAuth) }
    }
}
