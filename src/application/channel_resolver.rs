//! Extension to channel resolution
//!
//! Dumps the active channels with `CoreShowChannels` and picks the leg to
//! redirect for a given extension: the bridged peer when the extension is in
//! a bridge, otherwise the extension's own channel if it is ringing or up.

use crate::config::TransferConfig;
use crate::domain::{
    ChannelName, ChannelSnapshot, ChannelState, ResolvedChannel, Result, TransferError,
    TransferLeg,
};
use crate::infrastructure::ami::{AmiAction, EventKind, ManagerClient, ManagerEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct ChannelResolver {
    manager: Arc<dyn ManagerClient>,
    window: Duration,
    technologies: Vec<String>,
}

impl ChannelResolver {
    pub fn new(manager: Arc<dyn ManagerClient>, config: &TransferConfig) -> Self {
        Self {
            manager,
            window: config.collection_window(),
            technologies: config.technologies.clone(),
        }
    }

    /// Current channels as reported by the manager
    pub async fn snapshot(&self) -> Result<Vec<ChannelSnapshot>> {
        let list = self
            .manager
            .send_event_list(AmiAction::core_show_channels(), self.window)
            .await?;

        if !list.complete {
            warn!(
                "Channel dump incomplete after {:?}, resolving against {} channels",
                self.window,
                list.events.len()
            );
        }

        Ok(list
            .events
            .iter()
            .filter(|event| event.kind == EventKind::CoreShowChannel)
            .filter_map(snapshot_from_event)
            .collect())
    }

    /// Pick the channel to redirect for `extension`
    pub async fn resolve(&self, extension: &str) -> Result<ResolvedChannel> {
        let channels = self.snapshot().await?;
        debug!("Resolving extension {} among {} channels", extension, channels.len());
        select_channel(&channels, extension, &self.technologies)
    }
}

fn snapshot_from_event(event: &ManagerEvent) -> Option<ChannelSnapshot> {
    let raw = event.channel.as_deref()?;
    let name = match ChannelName::parse(raw) {
        Ok(name) => name,
        Err(e) => {
            warn!("Skipping channel: {}", e);
            return None;
        }
    };

    let state = event
        .channel_state
        .map(ChannelState::from_code)
        .unwrap_or(ChannelState::Unknown(u8::MAX));

    Some(ChannelSnapshot::new(name, state, event.bridge_id.clone()))
}

/// Selection over one dump, in dump order
pub fn select_channel<S: AsRef<str>>(
    channels: &[ChannelSnapshot],
    extension: &str,
    technologies: &[S],
) -> Result<ResolvedChannel> {
    let candidates: Vec<&ChannelSnapshot> = channels
        .iter()
        .filter(|c| c.name.belongs_to(extension, technologies))
        .collect();

    let Some(matched) = candidates.first().copied() else {
        return Err(TransferError::ExtensionNotFound(extension.to_string()));
    };

    if candidates.len() > 1 {
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        warn!(
            "Extension {} has {} channels {:?}, using the first",
            extension,
            candidates.len(),
            names
        );
    }

    if let Some(bridge_id) = &matched.bridge_id {
        let peer = channels
            .iter()
            .find(|c| c.bridge_id.as_ref() == Some(bridge_id) && c.name != matched.name);

        if let Some(peer) = peer {
            info!(
                "Extension {} is bridged ({}), redirecting peer {}",
                extension, bridge_id, peer.name
            );
            return Ok(ResolvedChannel {
                channel: peer.name.to_string(),
                leg: TransferLeg::BridgedPeer,
                source_channel: matched.name.to_string(),
            });
        }
        debug!("Bridge {} of {} has no other channel", bridge_id, matched.name);
    }

    if matched.state.is_transferable() {
        info!(
            "Extension {} is {} on {}",
            extension,
            matched.state.name(),
            matched.name
        );
        return Ok(ResolvedChannel {
            channel: matched.name.to_string(),
            leg: TransferLeg::Own,
            source_channel: matched.name.to_string(),
        });
    }

    Err(TransferError::ExtensionNotInCall(extension.to_string()))
}
