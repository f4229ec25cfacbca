//! Live channel registry fed by manager events
//!
//! Every new manager session starts from a `CoreShowChannels` dump; live
//! events keep the registry current in between.

use crate::domain::{ChannelName, ChannelState};
use crate::infrastructure::ami::{AmiAction, AmiResult, EventKind, ManagerClient, ManagerEvent};
use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Channel as last seen on the event stream
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MonitoredChannel {
    pub channel: String,
    pub extension: Option<String>,
    pub state: u8,
    pub state_name: String,
    pub bridge_id: Option<String>,
    pub caller_id: Option<String>,
    pub last_digit: Option<char>,
    pub updated_at: DateTime<Utc>,
}

impl MonitoredChannel {
    fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            extension: ChannelName::parse(channel)
                .ok()
                .map(|name| name.extension().to_string()),
            state: ChannelState::Down.code(),
            state_name: ChannelState::Down.name().to_string(),
            bridge_id: None,
            caller_id: None,
            last_digit: None,
            updated_at: Utc::now(),
        }
    }

    fn set_state(&mut self, code: u8) {
        self.state = code;
        self.state_name = ChannelState::from_code(code).name().to_string();
    }
}

#[derive(Default)]
pub struct ChannelMonitor {
    channels: RwLock<HashMap<String, MonitoredChannel>>,
}

impl ChannelMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn apply(&self, event: &ManagerEvent) {
        let mut channels = self.channels.write().await;
        apply_event(&mut channels, event);
        update_tracked_channels(channels.len());
    }

    /// Replace the registry with a fresh channel dump
    pub async fn resync(&self, manager: &dyn ManagerClient, window: Duration) -> AmiResult<usize> {
        let list = manager
            .send_event_list(AmiAction::core_show_channels(), window)
            .await?;
        if !list.complete {
            warn!(
                "Channel dump incomplete after {:?}, seeding {} channels",
                window,
                list.events.len()
            );
        }

        let mut channels = self.channels.write().await;
        channels.clear();
        for event in list
            .events
            .iter()
            .filter(|event| event.kind == EventKind::CoreShowChannel)
        {
            apply_event(&mut channels, event);
        }
        update_tracked_channels(channels.len());
        Ok(channels.len())
    }

    /// Channels sorted by name
    pub async fn snapshot(&self) -> Vec<MonitoredChannel> {
        let mut channels: Vec<_> = self.channels.read().await.values().cloned().collect();
        channels.sort_by(|a, b| a.channel.cmp(&b.channel));
        channels
    }

    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn clear(&self) {
        let mut channels = self.channels.write().await;
        channels.clear();
        update_tracked_channels(0);
    }

    async fn reseed(&self, manager: &dyn ManagerClient, window: Duration) {
        match self.resync(manager, window).await {
            Ok(count) => info!("Channel registry seeded with {} channels", count),
            Err(e) => {
                // Whatever was tracked belongs to a session that is gone
                warn!("Channel dump failed, registry cleared: {}", e);
                self.clear().await;
            }
        }
    }

    /// Keep the registry in sync until the manager goes away: reseed from a
    /// dump on every new session in `sessions`, then follow `events`.
    pub fn spawn(
        self: Arc<Self>,
        manager: Arc<dyn ManagerClient>,
        window: Duration,
        mut sessions: watch::Receiver<u64>,
        mut events: broadcast::Receiver<ManagerEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Channel monitor started");
            if *sessions.borrow_and_update() > 0 {
                self.reseed(manager.as_ref(), window).await;
            }

            loop {
                tokio::select! {
                    changed = sessions.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        self.reseed(manager.as_ref(), window).await;
                    }
                    received = events.recv() => match received {
                        Ok(event) => self.apply(&event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Channel monitor lagged, {} events dropped", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            info!("Channel monitor stopped");
        })
    }
}

fn apply_event(channels: &mut HashMap<String, MonitoredChannel>, event: &ManagerEvent) {
    let Some(name) = event.channel.as_deref() else {
        return;
    };

    if event.kind == EventKind::Hangup {
        if channels.remove(name).is_some() {
            debug!("Channel {} hung up", name);
        }
        return;
    }

    let tracked = matches!(
        event.kind,
        EventKind::CoreShowChannel
            | EventKind::Newchannel
            | EventKind::Newstate
            | EventKind::BridgeEnter
            | EventKind::BridgeLeave
            | EventKind::DtmfEnd
    );
    if !tracked {
        return;
    }

    let channel = channels
        .entry(name.to_string())
        .or_insert_with(|| MonitoredChannel::new(name));

    if let Some(code) = event.channel_state {
        channel.set_state(code);
    }
    if let Some(caller) = event.field("CallerIDNum").filter(|c| !c.is_empty() && *c != "<unknown>") {
        channel.caller_id = Some(caller.to_string());
    }

    match event.kind {
        EventKind::CoreShowChannel | EventKind::BridgeEnter => {
            channel.bridge_id = event.bridge_id.clone();
        }
        EventKind::BridgeLeave => channel.bridge_id = None,
        EventKind::DtmfEnd => channel.last_digit = event.digit,
        _ => {}
    }
    channel.updated_at = Utc::now();
}

fn update_tracked_channels(count: usize) {
    gauge!("ami_tracked_channels").set(count as f64);
}
