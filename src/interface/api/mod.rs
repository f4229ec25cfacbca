//! API interface implementations

pub mod auth;
pub mod channels_handler;
pub mod dto;
pub mod metrics_handler;
pub mod router;
pub mod transfer_handler;

pub use auth::API_KEY_HEADER;
pub use metrics_handler::init_metrics;
pub use router::build_router;
pub use transfer_handler::AppState;
