//! Live channel listing

use super::dto::ChannelsResponse;
use super::transfer_handler::AppState;
use axum::{extract::State, Json};

/// Channels currently tracked from the event stream
pub async fn list_channels(State(state): State<AppState>) -> Json<ChannelsResponse> {
    let canais = state.monitor.snapshot().await;

    Json(ChannelsResponse {
        sucesso: true,
        total: canais.len(),
        canais,
    })
}
