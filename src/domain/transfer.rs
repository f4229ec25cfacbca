//! Transfer request and result

use super::error::{Result, TransferError};
use serde::Serialize;

pub const DEFAULT_CONTEXT: &str = "default";
pub const DEFAULT_PRIORITY: u32 = 1;

/// Ask for the call of `source` to be sent to `destination`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source: String,
    pub destination: String,
    pub context: String,
    pub priority: u32,
}

impl TransferRequest {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            context: DEFAULT_CONTEXT.to_string(),
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Trim fields and check they can be used in a manager action
    pub fn validate(self) -> Result<Self> {
        let source = self.source.trim().to_string();
        let destination = self.destination.trim().to_string();
        let context = self.context.trim().to_string();

        if source.is_empty() || destination.is_empty() {
            return Err(TransferError::missing_parameters());
        }

        for (field, value) in [
            ("ramalOrigem", &source),
            ("ramalDestino", &destination),
            ("contexto", &context),
        ] {
            if value.chars().any(char::is_control) {
                return Err(TransferError::InvalidRequest(format!(
                    "Parâmetro inválido: {} contém caracteres de controle",
                    field
                )));
            }
        }

        if context.is_empty() {
            return Err(TransferError::InvalidRequest(
                "Parâmetro inválido: contexto vazio".to_string(),
            ));
        }
        if self.priority == 0 {
            return Err(TransferError::InvalidRequest(
                "Parâmetro inválido: prioridade deve ser maior que zero".to_string(),
            ));
        }

        Ok(Self {
            source,
            destination,
            context,
            priority: self.priority,
        })
    }
}

/// Which leg of the call was redirected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferLeg {
    /// The source extension's own channel
    Own,
    /// The party bridged to the source extension
    BridgedPeer,
}

/// Channel picked for a redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub channel: String,
    pub leg: TransferLeg,
    /// Channel of the source extension itself
    pub source_channel: String,
}

/// Outcome of a completed redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub channel: String,
    pub leg: TransferLeg,
    pub source: String,
    pub destination: String,
    pub context: String,
    pub priority: u32,
}
