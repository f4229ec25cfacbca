//! Transfer errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

/// Failures of a transfer request. `Display` renders the message shown to
/// the caller.
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Ramal {0} não encontrado em nenhuma chamada ativa")]
    ExtensionNotFound(String),

    #[error("Ramal {0} não está em uma chamada ativa")]
    ExtensionNotInCall(String),

    #[error("Falha na transferência: {0}")]
    TransferFailed(String),

    #[error("Erro de comunicação com o Asterisk: {0}")]
    Manager(String),
}

impl TransferError {
    pub fn missing_parameters() -> Self {
        TransferError::InvalidRequest(
            "Parâmetros obrigatórios: ramalOrigem e ramalDestino".to_string(),
        )
    }

    /// Short tag used in logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::InvalidRequest(_) => "invalid_request",
            TransferError::ExtensionNotFound(_) => "extension_not_found",
            TransferError::ExtensionNotInCall(_) => "extension_not_in_call",
            TransferError::TransferFailed(_) => "transfer_failed",
            TransferError::Manager(_) => "manager",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, TransferError::InvalidRequest(_))
    }
}
