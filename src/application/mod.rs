//! Application layer - Use cases and application services
//!
//! This layer orchestrates the manager client and the domain model:
//! - Resolving an extension to the channel to redirect
//! - Executing transfers
//! - Tracking live channels from the event stream

pub mod channel_monitor;
pub mod channel_resolver;
pub mod transfer_executor;

pub use channel_monitor::{ChannelMonitor, MonitoredChannel};
pub use channel_resolver::ChannelResolver;
pub use transfer_executor::TransferExecutor;
