//! Interface layer - External interfaces
//!
//! This layer handles:
//! - REST API endpoints
//! - Request authentication
//! - Request/response formatting

pub mod api;
