//! Transfer API handlers

use super::dto::{ExecuteTransferPayload, HealthResponse, TransferResponse};
use crate::application::{ChannelMonitor, TransferExecutor};
use crate::config::Config;
use crate::infrastructure::ami::AmiManager;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Application state shared by the handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub executor: Arc<TransferExecutor>,
    pub monitor: Arc<ChannelMonitor>,
    /// Present when running against a real manager connection
    pub manager: Option<Arc<AmiManager>>,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ami_connected = match &state.manager {
        Some(manager) => manager.is_connected().await,
        None => false,
    };

    Json(HealthResponse {
        ok: true,
        service: "transfer".to_string(),
        port: state.config.server.port,
        ami_connected,
    })
}

/// Redirect the call of `ramalOrigem` to `ramalDestino`
pub async fn execute_transfer(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteTransferPayload>, JsonRejection>,
) -> (StatusCode, Json<TransferResponse>) {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            warn!("[transfer] Malformed request body: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(TransferResponse::error(format!(
                    "Corpo da requisição inválido: {}",
                    rejection.body_text()
                ))),
            );
        }
    };

    let defaults = &state.config.transfer;
    let request = payload.into_request(&defaults.default_context, defaults.default_priority);
    info!("API: Transfer {} -> {}", request.source, request.destination);

    match state.executor.execute(request).await {
        Ok(result) => (
            StatusCode::OK,
            Json(TransferResponse::success(result.into())),
        ),
        Err(e) if e.is_client_error() => {
            warn!("[transfer] Invalid request: {}", e);
            (StatusCode::BAD_REQUEST, Json(TransferResponse::error(e.to_string())))
        }
        Err(e) => {
            error!("[transfer] Transfer failed ({}): {}", e.kind(), e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TransferResponse::error(e.to_string())),
            )
        }
    }
}
