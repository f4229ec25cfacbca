//! AMI wire format
//!
//! Manager frames are `Key: Value` lines terminated by `\r\n`; an empty line
//! closes the frame. Keys are matched case-insensitively.

use super::error::{AmiError, AmiResult};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Upper bound on lines per frame, protects against a peer that never sends
/// the terminating empty line.
const MAX_FRAME_LINES: usize = 4096;

/// Prefix of the greeting Asterisk sends on every new manager connection
pub const BANNER_PREFIX: &str = "Asterisk Call Manager";

/// Kind of an incoming frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Response,
    Event,
    Unknown,
}

/// A single AMI frame with its fields in wire order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmiMessage {
    fields: Vec<(String, String)>,
}

impl AmiMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    /// First value for `key`, compared case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn kind(&self) -> MessageKind {
        if self.get("Response").is_some() {
            MessageKind::Response
        } else if self.get("Event").is_some() {
            MessageKind::Event
        } else {
            MessageKind::Unknown
        }
    }

    pub fn action_id(&self) -> Option<&str> {
        self.get("ActionID")
    }

    /// Parse one frame from text. Trailing empty lines are ignored.
    pub fn parse(text: &str) -> AmiResult<Self> {
        let mut message = Self::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                if message.is_empty() {
                    continue;
                }
                break;
            }
            message.push_line(line);
        }

        if message.is_empty() {
            return Err(AmiError::Protocol("empty frame".to_string()));
        }
        Ok(message)
    }

    fn push_line(&mut self, line: &str) {
        match line.split_once(':') {
            Some((key, value)) => self.push(key.trim(), value.trim()),
            // Free-form output lines (e.g. from `Response: Follows`)
            None => self.push("Output", line),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64 * (self.fields.len() + 1));
        for (key, value) in &self.fields {
            buf.put_slice(key.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        buf.freeze()
    }
}

/// Read the greeting line and return the advertised protocol version
pub async fn read_banner<R>(reader: &mut R) -> AmiResult<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(AmiError::ConnectionClosed);
    }

    let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
    match line.strip_prefix(BANNER_PREFIX) {
        Some(rest) => Ok(rest.trim_start_matches('/').trim().to_string()),
        None => Err(AmiError::InvalidBanner(line.to_string())),
    }
}

/// Read the next frame. Returns `Ok(None)` on a clean EOF between frames.
pub async fn read_frame<R>(reader: &mut R) -> AmiResult<Option<AmiMessage>>
where
    R: AsyncBufRead + Unpin,
{
    let mut message = AmiMessage::new();
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            if message.is_empty() {
                return Ok(None);
            }
            return Err(AmiError::Protocol("connection closed mid-frame".to_string()));
        }

        let trimmed = line.trim_end_matches(|c| c == '\r' || c == '\n');
        if trimmed.is_empty() {
            if message.is_empty() {
                continue;
            }
            return Ok(Some(message));
        }

        if message.fields.len() >= MAX_FRAME_LINES {
            return Err(AmiError::Protocol(format!(
                "frame exceeds {} lines",
                MAX_FRAME_LINES
            )));
        }
        message.push_line(trimmed);
    }
}

/// Outgoing manager action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmiAction {
    name: String,
    action_id: Option<String>,
    fields: Vec<(String, String)>,
}

impl AmiAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action_id: None,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_id(&self) -> Option<&str> {
        self.action_id.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Plaintext login
    pub fn login(username: &str, secret: &str) -> Self {
        Self::new("Login")
            .field("Username", username)
            .field("Secret", secret)
            .field("Events", "on")
    }

    /// Request an MD5 challenge for [`AmiAction::login_md5`]
    pub fn challenge() -> Self {
        Self::new("Challenge").field("AuthType", "MD5")
    }

    /// Challenge/response login, `key` is `md5hex(challenge + secret)`
    pub fn login_md5(username: &str, key: &str) -> Self {
        Self::new("Login")
            .field("AuthType", "MD5")
            .field("Username", username)
            .field("Key", key)
            .field("Events", "on")
    }

    pub fn ping() -> Self {
        Self::new("Ping")
    }

    pub fn logoff() -> Self {
        Self::new("Logoff")
    }

    /// Enumerate active channels; answered with one `CoreShowChannel` event
    /// per channel followed by `CoreShowChannelsComplete`
    pub fn core_show_channels() -> Self {
        Self::new("CoreShowChannels")
    }

    /// Move `channel` to `context,exten,priority` in the dialplan
    pub fn redirect(channel: &str, context: &str, exten: &str, priority: u32) -> Self {
        Self::new("Redirect")
            .field("Channel", channel)
            .field("Context", context)
            .field("Exten", exten)
            .field("Priority", priority.to_string())
    }

    /// Reject values that would break frame boundaries
    pub fn validate(&self) -> AmiResult<()> {
        let id = self.action_id.iter().map(|id| ("ActionID", id.as_str()));
        let fields = self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()));

        for (key, value) in std::iter::once(("Action", self.name.as_str()))
            .chain(id)
            .chain(fields)
        {
            if key.is_empty() || key.contains([':', '\r', '\n']) {
                return Err(AmiError::Protocol(format!("invalid field name {:?}", key)));
            }
            if value.contains(['\r', '\n']) {
                return Err(AmiError::Protocol(format!(
                    "line break in value of {}",
                    key
                )));
            }
        }
        Ok(())
    }

    pub fn to_message(&self) -> AmiMessage {
        let mut message = AmiMessage::new().with_field("Action", self.name.clone());
        if let Some(id) = &self.action_id {
            message.push("ActionID", id.clone());
        }
        for (key, value) in &self.fields {
            message.push(key.clone(), value.clone());
        }
        message
    }

    pub fn encode(&self) -> Bytes {
        self.to_message().encode()
    }
}

/// Value of the `Response` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    Error,
    Follows,
    Goodbye,
    Other(String),
}

impl ResponseStatus {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "success" => ResponseStatus::Success,
            "error" => ResponseStatus::Error,
            "follows" => ResponseStatus::Follows,
            "goodbye" => ResponseStatus::Goodbye,
            _ => ResponseStatus::Other(value.to_string()),
        }
    }
}

/// Response to an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmiResponse {
    status: ResponseStatus,
    message: AmiMessage,
}

impl AmiResponse {
    /// Returns `None` when the frame is not a response
    pub fn from_message(message: AmiMessage) -> Option<Self> {
        let status = ResponseStatus::parse(message.get("Response")?);
        Some(Self { status, message })
    }

    pub fn status(&self) -> &ResponseStatus {
        &self.status
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            ResponseStatus::Success | ResponseStatus::Follows | ResponseStatus::Goodbye
        )
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    /// Human readable `Message` header
    pub fn text(&self) -> Option<&str> {
        self.message.get("Message")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.message.get(key)
    }

    pub fn action_id(&self) -> Option<&str> {
        self.message.action_id()
    }

    /// True when the action answers with a list of events
    pub fn starts_event_list(&self) -> bool {
        self.get("EventList")
            .map(|v| v.eq_ignore_ascii_case("start"))
            .unwrap_or(false)
    }
}
