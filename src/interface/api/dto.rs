//! Transfer API data transfer objects

use crate::application::MonitoredChannel;
use crate::domain::{TransferLeg, TransferRequest, TransferResult};
use serde::{Deserialize, Serialize};

/// Body of `POST /execute`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTransferPayload {
    #[serde(default)]
    pub ramal_origem: Option<String>,
    #[serde(default)]
    pub ramal_destino: Option<String>,
    #[serde(default)]
    pub contexto: Option<String>,
    #[serde(default)]
    pub prioridade: Option<u32>,
}

impl ExecuteTransferPayload {
    /// Build a request, filling context and priority from the given defaults
    pub fn into_request(self, default_context: &str, default_priority: u32) -> TransferRequest {
        let context = self
            .contexto
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| default_context.to_string());

        TransferRequest::new(
            self.ramal_origem.unwrap_or_default(),
            self.ramal_destino.unwrap_or_default(),
        )
        .with_context(context)
        .with_priority(self.prioridade.unwrap_or(default_priority))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDetails {
    pub canal: String,
    pub perna: TransferLegDto,
    pub ramal_origem: String,
    pub ramal_destino: String,
    pub contexto: String,
    pub prioridade: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferLegDto {
    Propria,
    Ponte,
}

impl From<TransferLeg> for TransferLegDto {
    fn from(leg: TransferLeg) -> Self {
        match leg {
            TransferLeg::Own => TransferLegDto::Propria,
            TransferLeg::BridgedPeer => TransferLegDto::Ponte,
        }
    }
}

impl From<TransferResult> for TransferDetails {
    fn from(result: TransferResult) -> Self {
        Self {
            canal: result.channel,
            perna: result.leg.into(),
            ramal_origem: result.source,
            ramal_destino: result.destination,
            contexto: result.context,
            prioridade: result.priority,
        }
    }
}

/// Envelope of every transfer API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResponse {
    pub sucesso: bool,
    pub mensagem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detalhes: Option<TransferDetails>,
}

impl TransferResponse {
    pub fn success(details: TransferDetails) -> Self {
        Self {
            sucesso: true,
            mensagem: "Transferência realizada com sucesso".to_string(),
            detalhes: Some(details),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            sucesso: false,
            mensagem: message.into(),
            detalhes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub port: u16,
    pub ami_connected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelsResponse {
    pub sucesso: bool,
    pub total: usize,
    pub canais: Vec<MonitoredChannel>,
}
