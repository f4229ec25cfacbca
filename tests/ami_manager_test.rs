//! AMI client tests against an in-process fake manager

use ramal_transfer::application::{ChannelMonitor, ChannelResolver, TransferExecutor};
use ramal_transfer::config::{AmiAuth, AmiConfig, TransferConfig};
use ramal_transfer::domain::{TransferError, TransferLeg, TransferRequest};
use ramal_transfer::infrastructure::ami::manager::md5_key;
use ramal_transfer::infrastructure::ami::message::read_frame;
use ramal_transfer::infrastructure::ami::{
    AmiAction, AmiError, AmiManager, AmiMessage, EventKind, ManagerClient,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const SECRET: &str = "s3cret";
const CHALLENGE: &str = "840711983";

#[derive(Clone)]
struct FakeAmi {
    channels: Vec<(&'static str, u8, &'static str)>,
    complete_lists: bool,
    close_first_connection: bool,
    close_first_after_dump: bool,
    banner_delay: Duration,
}

impl FakeAmi {
    fn new(channels: Vec<(&'static str, u8, &'static str)>) -> Self {
        Self {
            channels,
            complete_lists: true,
            close_first_connection: false,
            close_first_after_dump: false,
            banner_delay: Duration::ZERO,
        }
    }
}

struct FakeAmiHandle {
    port: u16,
    actions: Arc<Mutex<Vec<AmiMessage>>>,
    accepted: Arc<AtomicUsize>,
}

impl FakeAmiHandle {
    fn actions_named(&self, name: &str) -> Vec<AmiMessage> {
        self.actions
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.get("Action") == Some(name))
            .cloned()
            .collect()
    }

    fn config(&self) -> AmiConfig {
        AmiConfig {
            host: "127.0.0.1".to_string(),
            port: self.port,
            username: "transfer".to_string(),
            secret: SECRET.to_string(),
            connect_timeout_ms: 1_000,
            action_timeout_ms: 1_000,
            reconnect_delay_ms: 50,
            ping_interval_secs: 0,
            ..AmiConfig::default()
        }
    }
}

async fn start_fake(fake: FakeAmi) -> FakeAmiHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let actions = Arc::new(Mutex::new(Vec::new()));
    let accepted = Arc::new(AtomicUsize::new(0));

    {
        let actions = actions.clone();
        let accepted = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let number = accepted.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(serve(stream, fake.clone(), actions.clone(), number));
            }
        });
    }

    FakeAmiHandle {
        port,
        actions,
        accepted,
    }
}

async fn send(writer: &mut OwnedWriteHalf, message: AmiMessage) {
    let _ = writer.write_all(&message.encode()).await;
}

fn reply(action_id: &str, status: &str) -> AmiMessage {
    AmiMessage::new()
        .with_field("Response", status)
        .with_field("ActionID", action_id)
}

async fn serve(
    stream: TcpStream,
    fake: FakeAmi,
    actions: Arc<Mutex<Vec<AmiMessage>>>,
    connection_number: usize,
) {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    tokio::time::sleep(fake.banner_delay).await;
    let _ = writer.write_all(b"Asterisk Call Manager/5.0.1\r\n").await;

    while let Ok(Some(frame)) = read_frame(&mut reader).await {
        actions.lock().unwrap().push(frame.clone());
        let id = frame.action_id().unwrap_or_default().to_string();

        match frame.get("Action").unwrap_or_default() {
            "Challenge" => {
                send(&mut writer, reply(&id, "Success").with_field("Challenge", CHALLENGE)).await;
            }
            "Login" => {
                let accepted = if frame.get("AuthType") == Some("MD5") {
                    frame.get("Key") == Some(md5_key(CHALLENGE, SECRET).as_str())
                } else {
                    frame.get("Secret") == Some(SECRET)
                };
                if !accepted {
                    send(
                        &mut writer,
                        reply(&id, "Error").with_field("Message", "Authentication failed"),
                    )
                    .await;
                    return;
                }
                send(
                    &mut writer,
                    reply(&id, "Success").with_field("Message", "Authentication accepted"),
                )
                .await;
                send(
                    &mut writer,
                    AmiMessage::new()
                        .with_field("Event", "FullyBooted")
                        .with_field("Status", "Fully Booted"),
                )
                .await;
                if fake.close_first_connection && connection_number == 1 {
                    return;
                }
            }
            "Ping" => {
                send(&mut writer, reply(&id, "Success").with_field("Ping", "Pong")).await;
            }
            "CoreShowChannels" => {
                send(
                    &mut writer,
                    reply(&id, "Success")
                        .with_field("EventList", "start")
                        .with_field("Message", "Channels will follow"),
                )
                .await;
                // Item of somebody else's dump, must not be collected
                send(
                    &mut writer,
                    AmiMessage::new()
                        .with_field("Event", "CoreShowChannel")
                        .with_field("ActionID", "another-request")
                        .with_field("Channel", "PJSIP/1001-000000ff")
                        .with_field("ChannelState", "0")
                        .with_field("BridgeId", ""),
                )
                .await;
                for (name, state, bridge) in &fake.channels {
                    send(
                        &mut writer,
                        AmiMessage::new()
                            .with_field("Event", "CoreShowChannel")
                            .with_field("ActionID", id.as_str())
                            .with_field("Channel", *name)
                            .with_field("ChannelState", state.to_string())
                            .with_field("BridgeId", *bridge),
                    )
                    .await;
                }
                if fake.complete_lists {
                    send(
                        &mut writer,
                        AmiMessage::new()
                            .with_field("Event", "CoreShowChannelsComplete")
                            .with_field("ActionID", id.as_str())
                            .with_field("EventList", "Complete")
                            .with_field("ListItems", fake.channels.len().to_string()),
                    )
                    .await;
                }
                if fake.close_first_after_dump && connection_number == 1 {
                    return;
                }
            }
            "Redirect" => {
                let exists = fake
                    .channels
                    .iter()
                    .any(|(name, _, _)| frame.get("Channel") == Some(*name));
                let response = if exists {
                    reply(&id, "Success").with_field("Message", "Redirect successful")
                } else {
                    reply(&id, "Error").with_field("Message", "Channel specified does not exist")
                };
                send(&mut writer, response).await;
            }
            "Logoff" => {
                send(
                    &mut writer,
                    reply(&id, "Goodbye").with_field("Message", "Thanks for all the fish."),
                )
                .await;
                return;
            }
            // Never answered
            "WaitEvent" => {}
            _ => {
                send(
                    &mut writer,
                    reply(&id, "Error").with_field("Message", "Invalid/unknown command"),
                )
                .await;
            }
        }
    }
}

fn office_calls() -> Vec<(&'static str, u8, &'static str)> {
    vec![
        ("PJSIP/1001-00000001", 6, "b1"),
        ("PJSIP/2002-00000002", 6, "b1"),
        ("PJSIP/3003-00000003", 5, ""),
        ("PJSIP/4004-00000004", 0, ""),
    ]
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let fake = start_fake(FakeAmi::new(vec![])).await;
    let manager = AmiManager::new(fake.config());

    let first = manager.connect().await.unwrap();
    let second = manager.connect().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.version(), "5.0.1");
    assert_eq!(fake.accepted.load(Ordering::SeqCst), 1);
    assert_eq!(fake.actions_named("Login").len(), 1);
    assert!(manager.is_connected().await);
}

#[tokio::test]
async fn test_wrong_secret_fails_authentication() {
    let fake = start_fake(FakeAmi::new(vec![])).await;
    let config = AmiConfig {
        secret: "wrong".to_string(),
        ..fake.config()
    };
    let manager = AmiManager::new(config);

    let err = manager.connect().await.unwrap_err();
    assert!(matches!(err, AmiError::AuthenticationFailed(ref m) if m == "Authentication failed"));
    assert!(!manager.is_connected().await);
}

#[tokio::test]
async fn test_md5_login() {
    let fake = start_fake(FakeAmi::new(vec![])).await;
    let config = AmiConfig {
        auth: AmiAuth::Md5,
        ..fake.config()
    };
    let manager = AmiManager::new(config);

    manager.connect().await.unwrap();

    let logins = fake.actions_named("Login");
    assert_eq!(logins.len(), 1);
    assert_eq!(logins[0].get("AuthType"), Some("MD5"));
    assert!(logins[0].get("Secret").is_none());
    assert_eq!(fake.actions_named("Challenge").len(), 1);
}

#[tokio::test]
async fn test_event_list_is_correlated_by_action_id() {
    let fake = start_fake(FakeAmi::new(office_calls())).await;
    let manager = AmiManager::new(fake.config());

    let list = manager
        .send_event_list(AmiAction::core_show_channels(), Duration::from_secs(2))
        .await
        .unwrap();

    assert!(list.complete);
    assert_eq!(list.events.len(), 4);
    assert!(list
        .events
        .iter()
        .all(|e| e.kind == EventKind::CoreShowChannel && e.action_id.as_deref() != Some("another-request")));
}

#[tokio::test]
async fn test_incomplete_event_list_returns_after_window() {
    let fake = start_fake(FakeAmi {
        complete_lists: false,
        ..FakeAmi::new(office_calls())
    })
    .await;
    let manager = AmiManager::new(fake.config());

    let list = timeout(
        Duration::from_secs(2),
        manager.send_event_list(AmiAction::core_show_channels(), Duration::from_millis(200)),
    )
    .await
    .expect("window should bound the collection")
    .unwrap();

    assert!(!list.complete);
    assert_eq!(list.events.len(), 4);
}

#[tokio::test]
async fn test_unanswered_action_times_out() {
    let fake = start_fake(FakeAmi::new(vec![])).await;
    let config = AmiConfig {
        action_timeout_ms: 200,
        ..fake.config()
    };
    let manager = AmiManager::new(config);

    let err = manager
        .send_action(AmiAction::new("WaitEvent"))
        .await
        .unwrap_err();
    assert!(matches!(err, AmiError::ActionTimeout { ref action, .. } if action == "WaitEvent"));
}

#[tokio::test]
async fn test_error_response_is_action_error() {
    let fake = start_fake(FakeAmi::new(vec![])).await;
    let manager = AmiManager::new(fake.config());

    let err = manager
        .send_action(AmiAction::new("NoSuchAction"))
        .await
        .unwrap_err();
    assert!(matches!(err, AmiError::ActionError { ref message, .. } if message == "Invalid/unknown command"));
}

#[tokio::test]
async fn test_transfer_end_to_end() {
    let fake = start_fake(FakeAmi::new(office_calls())).await;
    let manager: Arc<dyn ManagerClient> = Arc::new(AmiManager::new(fake.config()));
    let resolver = ChannelResolver::new(manager.clone(), &TransferConfig::default());
    let executor = TransferExecutor::new(manager, resolver);

    let result = executor
        .execute(TransferRequest::new("1001", "5005").with_context("from-internal"))
        .await
        .unwrap();
    assert_eq!(result.channel, "PJSIP/2002-00000002");
    assert_eq!(result.leg, TransferLeg::BridgedPeer);

    let redirects = fake.actions_named("Redirect");
    assert_eq!(redirects.len(), 1);
    assert_eq!(redirects[0].get("Channel"), Some("PJSIP/2002-00000002"));
    assert_eq!(redirects[0].get("Context"), Some("from-internal"));
    assert_eq!(redirects[0].get("Exten"), Some("5005"));
    assert_eq!(redirects[0].get("Priority"), Some("1"));
}

#[tokio::test]
async fn test_transfer_failures_send_no_redirect() {
    let fake = start_fake(FakeAmi::new(office_calls())).await;
    let manager: Arc<dyn ManagerClient> = Arc::new(AmiManager::new(fake.config()));
    let resolver = ChannelResolver::new(manager.clone(), &TransferConfig::default());
    let executor = TransferExecutor::new(manager, resolver);

    let err = executor
        .execute(TransferRequest::new("9999", "5005"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::ExtensionNotFound(_)));

    let err = executor
        .execute(TransferRequest::new("4004", "5005"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::ExtensionNotInCall(_)));

    assert!(fake.actions_named("Redirect").is_empty());
}

#[tokio::test]
async fn test_overlapping_resolutions_do_not_mix() {
    let fake = start_fake(FakeAmi::new(office_calls())).await;
    let manager: Arc<dyn ManagerClient> = Arc::new(AmiManager::new(fake.config()));
    let resolver = ChannelResolver::new(manager, &TransferConfig::default());

    let (bridged, ringing) = tokio::join!(resolver.resolve("1001"), resolver.resolve("3003"));

    assert_eq!(bridged.unwrap().channel, "PJSIP/2002-00000002");
    let ringing = ringing.unwrap();
    assert_eq!(ringing.channel, "PJSIP/3003-00000003");
    assert_eq!(ringing.leg, TransferLeg::Own);
    assert_eq!(fake.actions_named("CoreShowChannels").len(), 2);
}

#[tokio::test]
async fn test_supervisor_reconnects_after_loss() {
    let fake = start_fake(FakeAmi {
        close_first_connection: true,
        ..FakeAmi::new(vec![])
    })
    .await;
    let manager = Arc::new(AmiManager::new(fake.config()));
    let supervisor = tokio::spawn(manager.clone().run());

    let reconnected = timeout(Duration::from_secs(3), async {
        while fake.accepted.load(Ordering::SeqCst) < 2 || !manager.is_connected().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    assert!(reconnected.is_ok(), "manager did not reconnect");
    assert_eq!(fake.actions_named("Login").len(), 2);

    supervisor.abort();
    manager.disconnect().await;
    assert!(!manager.is_connected().await);
}

#[tokio::test]
async fn test_slow_login_does_not_eat_collection_window() {
    let fake = start_fake(FakeAmi {
        banner_delay: Duration::from_millis(500),
        ..FakeAmi::new(vec![("PJSIP/1001-00000001", 6, "")])
    })
    .await;
    let manager: Arc<dyn ManagerClient> = Arc::new(AmiManager::new(fake.config()));
    let config = TransferConfig {
        collection_window_ms: 300,
        ..TransferConfig::default()
    };
    let resolver = ChannelResolver::new(manager, &config);

    let resolved = resolver.resolve("1001").await.unwrap();
    assert_eq!(resolved.channel, "PJSIP/1001-00000001");
    assert_eq!(resolved.leg, TransferLeg::Own);
}

#[tokio::test]
async fn test_monitor_reseeds_after_reconnect() {
    let fake = start_fake(FakeAmi {
        close_first_after_dump: true,
        ..FakeAmi::new(vec![("PJSIP/1001-00000001", 6, "b1")])
    })
    .await;
    let manager = Arc::new(AmiManager::new(fake.config()));
    let client: Arc<dyn ManagerClient> = manager.clone();
    let monitor = Arc::new(ChannelMonitor::new());
    let monitor_handle = monitor.clone().spawn(
        client,
        Duration::from_millis(500),
        manager.sessions(),
        manager.subscribe(),
    );
    let supervisor = tokio::spawn(manager.clone().run());

    let reseeded = timeout(Duration::from_secs(3), async {
        while fake.accepted.load(Ordering::SeqCst) < 2
            || fake.actions_named("CoreShowChannels").len() < 2
            || monitor.len().await != 1
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reseeded.is_ok(), "registry was not reseeded after reconnect");

    let channels = monitor.snapshot().await;
    assert_eq!(channels[0].channel, "PJSIP/1001-00000001");
    assert_eq!(channels[0].bridge_id.as_deref(), Some("b1"));

    supervisor.abort();
    monitor_handle.abort();
    manager.disconnect().await;
}
