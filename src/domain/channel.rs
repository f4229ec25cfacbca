//! Channel value objects
//!
//! Asterisk names channels `TECH/RESOURCE-UNIQUEID`, e.g.
//! `PJSIP/1001-00000001` or `Local/2002@from-internal-0000002a;1`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelNameError {
    #[error("Channel name {0:?} has no technology prefix")]
    MissingTechnology(String),

    #[error("Channel name {0:?} has no unique id suffix")]
    MissingUniqueId(String),

    #[error("Channel name {0:?} has no extension")]
    MissingExtension(String),
}

/// A parsed channel name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelName {
    raw: String,
    technology: String,
    extension: String,
    unique_id: String,
}

impl ChannelName {
    pub fn parse(raw: &str) -> Result<Self, ChannelNameError> {
        let (technology, rest) = raw
            .split_once('/')
            .filter(|(tech, _)| !tech.is_empty())
            .ok_or_else(|| ChannelNameError::MissingTechnology(raw.to_string()))?;

        let (resource, unique_id) = rest
            .rsplit_once('-')
            .filter(|(_, id)| !id.is_empty())
            .ok_or_else(|| ChannelNameError::MissingUniqueId(raw.to_string()))?;

        // Local channels carry the dialplan context after '@'
        let extension = resource.split('@').next().unwrap_or_default();
        if extension.is_empty() {
            return Err(ChannelNameError::MissingExtension(raw.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            technology: technology.to_string(),
            extension: extension.to_string(),
            unique_id: unique_id.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn technology(&self) -> &str {
        &self.technology
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// True if this channel belongs to `extension` over one of `technologies`
    pub fn belongs_to<S: AsRef<str>>(&self, extension: &str, technologies: &[S]) -> bool {
        self.extension == extension
            && technologies
                .iter()
                .any(|tech| tech.as_ref().eq_ignore_ascii_case(&self.technology))
    }
}

impl FromStr for ChannelName {
    type Err = ChannelNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Asterisk channel state (`ChannelState` header)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Down,
    Reserved,
    OffHook,
    Dialing,
    Ring,
    Ringing,
    Up,
    Busy,
    DialingOffhook,
    PreRing,
    Unknown(u8),
}

impl ChannelState {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ChannelState::Down,
            1 => ChannelState::Reserved,
            2 => ChannelState::OffHook,
            3 => ChannelState::Dialing,
            4 => ChannelState::Ring,
            5 => ChannelState::Ringing,
            6 => ChannelState::Up,
            7 => ChannelState::Busy,
            8 => ChannelState::DialingOffhook,
            9 => ChannelState::PreRing,
            other => ChannelState::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ChannelState::Down => 0,
            ChannelState::Reserved => 1,
            ChannelState::OffHook => 2,
            ChannelState::Dialing => 3,
            ChannelState::Ring => 4,
            ChannelState::Ringing => 5,
            ChannelState::Up => 6,
            ChannelState::Busy => 7,
            ChannelState::DialingOffhook => 8,
            ChannelState::PreRing => 9,
            ChannelState::Unknown(code) => *code,
        }
    }

    /// Only ringing or answered channels can be redirected
    pub fn is_transferable(&self) -> bool {
        matches!(self, ChannelState::Ringing | ChannelState::Up)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChannelState::Down => "Down",
            ChannelState::Reserved => "Rsrvd",
            ChannelState::OffHook => "OffHook",
            ChannelState::Dialing => "Dialing",
            ChannelState::Ring => "Ring",
            ChannelState::Ringing => "Ringing",
            ChannelState::Up => "Up",
            ChannelState::Busy => "Busy",
            ChannelState::DialingOffhook => "Dialing Offhook",
            ChannelState::PreRing => "Pre-ring",
            ChannelState::Unknown(_) => "Unknown",
        }
    }
}

/// Point-in-time view of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub name: ChannelName,
    pub state: ChannelState,
    pub bridge_id: Option<String>,
}

impl ChannelSnapshot {
    pub fn new(name: ChannelName, state: ChannelState, bridge_id: Option<String>) -> Self {
        Self {
            name,
            state,
            bridge_id,
        }
    }

    pub fn is_bridged(&self) -> bool {
        self.bridge_id.is_some()
    }
}
