//! Typed manager events

use super::message::AmiMessage;

/// Event names this service reacts to; everything else is kept as `Other`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    CoreShowChannel,
    CoreShowChannelsComplete,
    Newchannel,
    Newstate,
    Hangup,
    BridgeEnter,
    BridgeLeave,
    DtmfBegin,
    DtmfEnd,
    FullyBooted,
    Other(String),
}

impl EventKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "CoreShowChannel" => EventKind::CoreShowChannel,
            "CoreShowChannelsComplete" => EventKind::CoreShowChannelsComplete,
            "Newchannel" => EventKind::Newchannel,
            "Newstate" => EventKind::Newstate,
            "Hangup" => EventKind::Hangup,
            "BridgeEnter" => EventKind::BridgeEnter,
            "BridgeLeave" => EventKind::BridgeLeave,
            "DTMFBegin" => EventKind::DtmfBegin,
            "DTMFEnd" => EventKind::DtmfEnd,
            "FullyBooted" => EventKind::FullyBooted,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EventKind::CoreShowChannel => "CoreShowChannel",
            EventKind::CoreShowChannelsComplete => "CoreShowChannelsComplete",
            EventKind::Newchannel => "Newchannel",
            EventKind::Newstate => "Newstate",
            EventKind::Hangup => "Hangup",
            EventKind::BridgeEnter => "BridgeEnter",
            EventKind::BridgeLeave => "BridgeLeave",
            EventKind::DtmfBegin => "DTMFBegin",
            EventKind::DtmfEnd => "DTMFEnd",
            EventKind::FullyBooted => "FullyBooted",
            EventKind::Other(name) => name,
        }
    }
}

/// An event received from the manager interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerEvent {
    pub kind: EventKind,
    pub channel: Option<String>,
    pub channel_state: Option<u8>,
    pub bridge_id: Option<String>,
    pub digit: Option<char>,
    pub action_id: Option<String>,
    /// Every field in wire order, keys as received
    pub fields: Vec<(String, String)>,
}

impl ManagerEvent {
    /// Returns `None` when the frame carries no `Event` header
    pub fn from_message(message: &AmiMessage) -> Option<Self> {
        let kind = EventKind::parse(message.get("Event")?);

        let non_empty = |key: &str| {
            message
                .get(key)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            kind,
            channel: non_empty("Channel"),
            channel_state: message
                .get("ChannelState")
                .and_then(|s| s.trim().parse().ok()),
            bridge_id: non_empty("BridgeUniqueid").or_else(|| non_empty("BridgeId")),
            digit: message.get("Digit").and_then(|d| d.chars().next()),
            action_id: non_empty("ActionID"),
            fields: message.fields().to_vec(),
        })
    }

    /// First value for `key`, compared case-insensitively
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Terminator of an event list started by an action
    pub fn is_list_complete(&self) -> bool {
        let flagged = self
            .field("EventList")
            .map(|v| v.eq_ignore_ascii_case("complete"))
            .unwrap_or(false);
        flagged || self.kind.name().ends_with("Complete")
    }
}
