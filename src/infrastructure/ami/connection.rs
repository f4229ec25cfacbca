//! A single manager connection
//!
//! The read half is owned by a background task that completes pending
//! actions (matched by `ActionID`) and broadcasts every event. Writes are
//! serialized through a mutex around the write half.

use super::error::{AmiError, AmiResult};
use super::event::ManagerEvent;
use super::message::{read_banner, read_frame, AmiAction, AmiMessage, AmiResponse, MessageKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

type PendingActions = Arc<Mutex<HashMap<String, oneshot::Sender<AmiResponse>>>>;

#[derive(Debug)]
pub struct AmiConnection {
    address: String,
    version: String,
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingActions,
    closed: watch::Receiver<bool>,
    reader: JoinHandle<()>,
    action_timeout: Duration,
}

impl AmiConnection {
    /// Open a TCP connection and consume the greeting banner.
    /// Authentication is left to the caller.
    pub async fn open(
        address: &str,
        connect_timeout: Duration,
        action_timeout: Duration,
        events: broadcast::Sender<ManagerEvent>,
    ) -> AmiResult<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| AmiError::ConnectTimeout(address.to_string()))??;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let version = timeout(connect_timeout, read_banner(&mut reader))
            .await
            .map_err(|_| AmiError::ConnectTimeout(address.to_string()))??;
        debug!("AMI banner from {}: version {}", address, version);

        let pending: PendingActions = Arc::new(Mutex::new(HashMap::new()));
        let (closed_tx, closed_rx) = watch::channel(false);

        let reader_task = tokio::spawn(Self::read_loop(
            reader,
            address.to_string(),
            pending.clone(),
            events,
            closed_tx,
        ));

        Ok(Self {
            address: address.to_string(),
            version,
            writer: Mutex::new(write_half),
            pending,
            closed: closed_rx,
            reader: reader_task,
            action_timeout,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Protocol version from the banner, e.g. `5.0.1`
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.reader.is_finished()
    }

    /// Resolves once the read side has stopped
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        // An error means the reader task is gone, which is closed as well
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Send an action and wait for the response carrying the same `ActionID`.
    /// A `Response: Error` is returned as [`AmiError::ActionError`].
    pub async fn send_action(&self, action: AmiAction) -> AmiResult<AmiResponse> {
        action.validate()?;
        if self.is_closed() {
            return Err(AmiError::ConnectionClosed);
        }

        let action_id = action
            .action_id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let action = action.with_action_id(action_id.clone());
        let name = action.name().to_string();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(action_id.clone(), tx);

        if let Err(e) = self.write(&action).await {
            self.pending.lock().await.remove(&action_id);
            return Err(e);
        }
        trace!("AMI action {} sent (ActionID {})", name, action_id);

        match timeout(self.action_timeout, rx).await {
            Ok(Ok(response)) if response.is_error() => Err(AmiError::ActionError {
                action: name,
                message: response.text().unwrap_or("unknown error").to_string(),
            }),
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(AmiError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&action_id);
                Err(AmiError::ActionTimeout {
                    action: name,
                    timeout: self.action_timeout,
                })
            }
        }
    }

    async fn write(&self, action: &AmiAction) -> AmiResult<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&action.encode()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Stop reading and close the socket. Pending actions fail with
    /// [`AmiError::ConnectionClosed`].
    pub async fn shutdown(&self) {
        self.reader.abort();
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!("AMI socket shutdown for {}: {}", self.address, e);
        }
        self.pending.lock().await.clear();
    }

    async fn read_loop(
        mut reader: BufReader<OwnedReadHalf>,
        address: String,
        pending: PendingActions,
        events: broadcast::Sender<ManagerEvent>,
        closed: watch::Sender<bool>,
    ) {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(message)) => Self::dispatch(message, &pending, &events).await,
                Ok(None) => {
                    info!("AMI peer {} closed the connection", address);
                    break;
                }
                Err(e) => {
                    warn!("AMI read from {} failed: {}", address, e);
                    break;
                }
            }
        }

        // Dropping the senders fails every waiter with ConnectionClosed
        pending.lock().await.clear();
        let _ = closed.send(true);
    }

    async fn dispatch(
        message: AmiMessage,
        pending: &PendingActions,
        events: &broadcast::Sender<ManagerEvent>,
    ) {
        match message.kind() {
            MessageKind::Response => {
                let action_id = message.action_id().map(str::to_string);
                let Some(response) = AmiResponse::from_message(message) else {
                    return;
                };

                let waiter = match action_id {
                    Some(id) => pending.lock().await.remove(&id),
                    None => None,
                };
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => debug!("Unsolicited AMI response: {:?}", response.status()),
                }
            }
            MessageKind::Event => {
                if let Some(event) = ManagerEvent::from_message(&message) {
                    trace!("AMI event {}", event.kind.name());
                    // No subscribers is not an error
                    let _ = events.send(event);
                }
            }
            MessageKind::Unknown => debug!("Ignoring AMI frame without Response or Event"),
        }
    }
}

impl Drop for AmiConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
