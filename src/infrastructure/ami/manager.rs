//! AMI connection manager
//!
//! Owns the single shared manager connection. `connect` is idempotent and
//! `run` keeps the connection alive forever: reconnect after a fixed delay,
//! ping on an interval, log every transition.

use super::connection::AmiConnection;
use super::error::{AmiError, AmiResult};
use super::event::ManagerEvent;
use super::message::{AmiAction, AmiResponse};
use crate::config::{AmiAuth, AmiConfig};
use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::time::{interval, sleep, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events collected for one list-producing action
#[derive(Debug, Clone, Default)]
pub struct EventList {
    pub events: Vec<ManagerEvent>,
    /// False when the window elapsed before the terminating event
    pub complete: bool,
}

/// The manager operations the transfer flow depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManagerClient: Send + Sync {
    /// Send an action and wait for its response
    async fn send_action(&self, action: AmiAction) -> AmiResult<AmiResponse>;

    /// Send an action that answers with an event list and collect the events
    /// correlated to it, waiting at most `window` for the list to complete
    async fn send_event_list(&self, action: AmiAction, window: Duration) -> AmiResult<EventList>;
}

pub struct AmiManager {
    config: AmiConfig,
    connection: RwLock<Option<Arc<AmiConnection>>>,
    connect_lock: Mutex<()>,
    events: broadcast::Sender<ManagerEvent>,
    /// Bumped after every successful login
    sessions: watch::Sender<u64>,
}

impl AmiManager {
    pub fn new(config: AmiConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(16));
        let (sessions, _) = watch::channel(0);
        Self {
            config,
            connection: RwLock::new(None),
            connect_lock: Mutex::new(()),
            events,
            sessions,
        }
    }

    /// Every event from the current and all future connections
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    /// Number of manager sessions opened so far; changes on every (re)connect
    pub fn sessions(&self) -> watch::Receiver<u64> {
        self.sessions.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        self.current().await.is_some()
    }

    async fn current(&self) -> Option<Arc<AmiConnection>> {
        self.connection
            .read()
            .await
            .as_ref()
            .filter(|conn| !conn.is_closed())
            .cloned()
    }

    /// Return the live connection, establishing and authenticating one first
    /// if needed. Concurrent callers share a single attempt.
    pub async fn connect(&self) -> AmiResult<Arc<AmiConnection>> {
        if let Some(conn) = self.current().await {
            return Ok(conn);
        }

        let _guard = self.connect_lock.lock().await;
        if let Some(conn) = self.current().await {
            return Ok(conn);
        }

        let address = self.config.address();
        info!("Connecting to AMI at {} as {}", address, self.config.username);

        let conn = AmiConnection::open(
            &address,
            self.config.connect_timeout(),
            self.config.action_timeout(),
            self.events.clone(),
        )
        .await
        .map_err(|e| {
            error!("AMI connection to {} failed: {}", address, e);
            counter!("ami_connection_transitions_total", "transition" => "failed").increment(1);
            e
        })?;

        if let Err(e) = self.authenticate(&conn).await {
            error!("AMI login to {} failed: {}", address, e);
            counter!("ami_connection_transitions_total", "transition" => "failed").increment(1);
            conn.shutdown().await;
            return Err(e);
        }

        let conn = Arc::new(conn);
        *self.connection.write().await = Some(conn.clone());
        self.sessions.send_modify(|count| *count += 1);

        info!("AMI connected to {} (manager version {})", address, conn.version());
        counter!("ami_connection_transitions_total", "transition" => "connected").increment(1);
        Ok(conn)
    }

    async fn authenticate(&self, conn: &AmiConnection) -> AmiResult<()> {
        let login = match self.config.auth {
            AmiAuth::Plain => AmiAction::login(&self.config.username, &self.config.secret),
            AmiAuth::Md5 => {
                let response = conn.send_action(AmiAction::challenge()).await?;
                let challenge = response
                    .get("Challenge")
                    .ok_or_else(|| AmiError::Protocol("Challenge response without challenge".to_string()))?;
                AmiAction::login_md5(&self.config.username, &md5_key(challenge, &self.config.secret))
            }
        };

        match conn.send_action(login).await {
            Ok(_) => Ok(()),
            Err(AmiError::ActionError { message, .. }) => Err(AmiError::AuthenticationFailed(message)),
            Err(e) => Err(e),
        }
    }

    /// Log off and drop the current connection
    pub async fn disconnect(&self) {
        let Some(conn) = self.connection.write().await.take() else {
            return;
        };

        if let Err(e) = conn.send_action(AmiAction::logoff()).await {
            debug!("AMI logoff failed: {}", e);
        }
        conn.shutdown().await;
        info!("AMI disconnected from {}", conn.address());
    }

    /// Supervisor loop, never returns. Spawn it and abort the task on shutdown.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.connect().await {
                Ok(conn) => {
                    self.watch(&conn).await;
                    warn!("AMI connection to {} lost", conn.address());
                    counter!("ami_connection_transitions_total", "transition" => "lost").increment(1);
                }
                Err(e) => error!("AMI unavailable: {}", e),
            }

            sleep(self.config.reconnect_delay()).await;
        }
    }

    async fn watch(&self, conn: &AmiConnection) {
        let Some(period) = self.config.ping_interval() else {
            conn.closed().await;
            return;
        };

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = conn.closed() => return,
                _ = ticker.tick() => {
                    if let Err(e) = conn.send_action(AmiAction::ping()).await {
                        warn!("AMI keep-alive ping failed: {}", e);
                        conn.shutdown().await;
                        return;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ManagerClient for AmiManager {
    async fn send_action(&self, action: AmiAction) -> AmiResult<AmiResponse> {
        let conn = self.connect().await?;
        conn.send_action(action).await
    }

    async fn send_event_list(&self, action: AmiAction, window: Duration) -> AmiResult<EventList> {
        let conn = self.connect().await?;

        let action_id = action
            .action_id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let action = action.with_action_id(action_id.clone());
        let name = action.name().to_string();

        // Subscribe before sending so no list item can be missed
        let mut events = self.events.subscribe();
        // The window covers the dump only, not connection setup
        let deadline = Instant::now() + window;
        let response = conn.send_action(action).await?;
        if !response.starts_event_list() {
            debug!("{} response did not announce an event list", name);
        }

        let mut list = EventList::default();
        loop {
            match timeout_at(deadline, events.recv()).await {
                Ok(Ok(event)) => {
                    if event.action_id.as_deref() != Some(action_id.as_str()) {
                        continue;
                    }
                    if event.is_list_complete() {
                        list.complete = true;
                        break;
                    }
                    list.events.push(event);
                }
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!("{} collector lagged, {} events dropped", name, skipped);
                }
                Ok(Err(RecvError::Closed)) => return Err(AmiError::ConnectionClosed),
                Err(_) => {
                    warn!(
                        "{} list incomplete after {:?}, using {} buffered events",
                        name,
                        window,
                        list.events.len()
                    );
                    break;
                }
            }
        }

        debug!("{} returned {} events (complete: {})", name, list.events.len(), list.complete);
        Ok(list)
    }
}

/// Key for MD5 challenge login: hex digest of challenge followed by secret
pub fn md5_key(challenge: &str, secret: &str) -> String {
    format!("{:x}", md5::compute(format!("{}{}", challenge, secret)))
}
