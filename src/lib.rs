//! Ramal Transfer - call transfer service for Asterisk based PABX systems
//!
//! Resolves the active channel of an extension over the Asterisk Manager
//! Interface and redirects it to another extension, behind a small
//! authenticated HTTP API.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::error::TransferError;
pub use domain::error::Result;
