//! Domain layer - Call transfer model
//!
//! This layer contains:
//! - Value objects: channel names and states
//! - Transfer requests and results
//! - The transfer error taxonomy

pub mod channel;
pub mod error;
pub mod transfer;

// Re-export commonly used types
pub use channel::{ChannelName, ChannelNameError, ChannelSnapshot, ChannelState};
pub use error::{Result, TransferError};
pub use transfer::{ResolvedChannel, TransferLeg, TransferRequest, TransferResult};
