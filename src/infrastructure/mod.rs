//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - The Asterisk Manager Interface client (wire codec, connection,
//!   connection supervisor)

pub mod ami;
