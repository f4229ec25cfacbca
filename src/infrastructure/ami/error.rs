//! AMI client errors

use crate::domain::TransferError;
use std::time::Duration;
use thiserror::Error;

pub type AmiResult<T> = std::result::Result<T, AmiError>;

#[derive(Error, Debug, Clone)]
pub enum AmiError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("Unexpected banner: {0}")]
    InvalidBanner(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Action {action} timed out after {timeout:?}")]
    ActionTimeout { action: String, timeout: Duration },

    #[error("Action {action} failed: {message}")]
    ActionError { action: String, message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for AmiError {
    fn from(err: std::io::Error) -> Self {
        AmiError::Io(err.to_string())
    }
}

impl From<AmiError> for TransferError {
    fn from(err: AmiError) -> Self {
        TransferError::Manager(err.to_string())
    }
}
