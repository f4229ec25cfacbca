//! Asterisk Manager Interface client
//!
//! - [`message`]: frame codec, actions and responses
//! - [`event`]: typed events
//! - [`connection`]: one authenticated TCP session
//! - [`manager`]: the shared, self-healing connection and the
//!   [`ManagerClient`] seam used by the transfer flow

pub mod connection;
pub mod error;
pub mod event;
pub mod manager;
pub mod message;

pub use connection::AmiConnection;
pub use error::{AmiError, AmiResult};
pub use event::{EventKind, ManagerEvent};
pub use manager::{AmiManager, EventList, ManagerClient};
pub use message::{AmiAction, AmiMessage, AmiResponse, ResponseStatus};
