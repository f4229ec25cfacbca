//! Shared-secret authentication

use super::dto::TransferResponse;
use super::transfer_handler::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject requests whose `x-api-key` does not equal the configured key.
/// An empty configured key rejects everything.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = state.config.api.api_key.as_str();
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if !expected.is_empty() && provided == Some(expected) {
        return next.run(request).await;
    }

    warn!(
        "[transfer] {} {} rejected: {} API key",
        request.method(),
        request.uri().path(),
        if provided.is_some() { "invalid" } else { "missing" }
    );
    (
        StatusCode::UNAUTHORIZED,
        Json(TransferResponse::error(
            "Unauthorized: x-api-key ausente ou inválida",
        )),
    )
        .into_response()
}
