//! End-to-end session tests over the loopback transport.

use std::time::Duration;

use futures::StreamExt;
use peer_remote_core::{PeerDescriptor, SessionConfig, SessionState, transport_event_channel};
use peer_remote_session::{SessionError, SessionEvent, SessionHandle, SessionManager};
use peer_remote_transport::{
    Capabilities, Inbound, LegacyCommand, LoopbackRemote, LoopbackTransport, NavAction,
    SentPayload, WireMessage,
    protocol::{Hello, Ping, Pong, Role},
};
use tempfile::TempDir;
use tokio::{task::JoinHandle, time::timeout};
use tokio_test::assert_ok;

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    handle: SessionHandle,
    remote: LoopbackRemote,
    task: JoinHandle<()>,
    dir: TempDir,
}

fn start_with(configure: impl FnOnce(&mut SessionConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SessionConfig::new("Pad");
    config.export_dir = dir.path().to_path_buf();
    config.precision_step_delay_ms = 1;
    configure(&mut config);

    let (tx, rx) = transport_event_channel();
    let (transport, remote) = LoopbackTransport::new(tx);
    let (handle, task) = SessionManager::spawn(config, transport, rx);
    Harness {
        handle,
        remote,
        task,
        dir,
    }
}

fn start() -> Harness {
    start_with(|_| {})
}

async fn next_sent(remote: &mut LoopbackRemote) -> SentPayload {
    timeout(WAIT, remote.recv_sent())
        .await
        .expect("timed out waiting for a send")
        .expect("loopback closed")
}

async fn wait_for(
    handle: &SessionHandle,
    predicate: impl FnMut(&peer_remote_session::SessionSnapshot) -> bool,
) -> peer_remote_session::SessionSnapshot {
    timeout(WAIT, handle.wait_for(predicate))
        .await
        .expect("timed out waiting for state")
        .unwrap()
}

/// Discover and connect to one host, consuming the handshake.
async fn connect(h: &mut Harness, name: &str) -> PeerDescriptor {
    let host = h.remote.add_host(name);
    h.handle.start_discovery().await.unwrap();
    wait_for(&h.handle, |s| s.discovered_peers.contains(&host)).await;
    h.handle.invite(host.clone()).await.unwrap();
    wait_for(&h.handle, |s| s.is_connected).await;
    next_sent(&mut h.remote).await;
    next_sent(&mut h.remote).await;
    host
}

fn csv_files(dir: &TempDir) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "csv"))
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn test_handshake_is_hello_then_ping() {
    let mut h = start();
    let host = h.remote.add_host("Headset");
    h.handle.start_discovery().await.unwrap();
    wait_for(&h.handle, |s| !s.discovered_peers.is_empty()).await;
    h.handle.invite(host.clone()).await.unwrap();

    let snapshot = wait_for(&h.handle, |s| s.is_connected).await;
    assert_eq!(snapshot.state, SessionState::Connected(host.clone()));
    assert_eq!(snapshot.connected_peers, vec![host.clone()]);

    let hello = next_sent(&mut h.remote).await;
    assert_eq!(hello.peers, vec![host.id.clone()]);
    assert_eq!(
        hello.wire().unwrap(),
        WireMessage::Hello(Hello {
            role: Role::Client,
            version: 1,
            capabilities: Capabilities::default(),
        })
    );
    let ping = next_sent(&mut h.remote).await;
    assert!(matches!(ping.wire().unwrap(), WireMessage::Ping(_)));

    let invites = h.remote.invites();
    assert_eq!(invites, vec![(host.id, Duration::from_secs(10))]);
}

#[tokio::test]
async fn test_ping_answered_with_exactly_one_pong() {
    let mut h = start();
    let host = connect(&mut h, "Headset").await;

    h.remote
        .deliver_wire(&host.id, &WireMessage::Ping(Ping { t: 42.25 }))
        .unwrap();
    let pong = next_sent(&mut h.remote).await;
    assert_eq!(pong.wire().unwrap(), WireMessage::Pong(Pong { t: 42.25 }));

    // The next payload is ours, not a second pong.
    assert_ok!(h.handle.send_web_hover_tap().await);
    let next = next_sent(&mut h.remote).await;
    assert_eq!(next.wire().unwrap(), WireMessage::web_hover_tap());
}

#[tokio::test]
async fn test_repeated_connected_report_skips_handshake() {
    let mut h = start();
    let host = connect(&mut h, "Headset").await;

    // Same peer reported connected again.
    h.remote.accept(&host);
    h.remote
        .deliver_wire(&host.id, &WireMessage::Ping(Ping { t: 7.0 }))
        .unwrap();

    let next = next_sent(&mut h.remote).await;
    assert_eq!(next.wire().unwrap(), WireMessage::Pong(Pong { t: 7.0 }));
    assert!(h.remote.try_recv_sent().is_none());
    assert_eq!(h.handle.snapshot().connected_peers, vec![host.clone()]);
    assert_eq!(h.handle.snapshot().state, SessionState::Connected(host));
}

#[tokio::test]
async fn test_stop_discovery_keeps_session() {
    let mut h = start();
    let host = connect(&mut h, "Headset").await;

    assert_ok!(h.handle.stop_discovery().await);
    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Connected(host.clone()));
    assert!(!snapshot.discovering);
    assert!(!h.remote.is_discovering());

    assert_ok!(h.handle.send_nav(NavAction::Back).await);
    let sent = next_sent(&mut h.remote).await;
    assert_eq!(sent.text(), "WEB_NAV:BACK");
    assert_eq!(sent.peers, vec![host.id]);
}

#[tokio::test]
async fn test_mismatched_hello_is_tolerated() {
    let mut h = start();
    let host = connect(&mut h, "Headset").await;
    let before = h.handle.snapshot();

    let hello = WireMessage::Hello(Hello {
        role: Role::Host,
        version: 2,
        capabilities: Capabilities {
            supports_tap_events: false,
            supports_native_scroll: false,
        },
    });
    h.remote.deliver_wire(&host.id, &hello).unwrap();
    let after = wait_for(&h.handle, |s| s.received_wire.is_some()).await;

    assert_eq!(after.received_wire, Some(hello));
    assert_eq!(after.state, SessionState::Connected(host));
    assert_eq!(after.current_mode, before.current_mode);
    assert_eq!(after.experiment, before.experiment);
    assert!(h.remote.try_recv_sent().is_none());
}

#[tokio::test]
async fn test_pong_sets_latency() {
    let mut h = start();
    let host = connect(&mut h, "Headset").await;
    let t = peer_remote_transport::protocol::unix_now() - 0.02;
    h.remote
        .deliver_wire(&host.id, &WireMessage::Pong(Pong { t }))
        .unwrap();
    let snapshot = wait_for(&h.handle, |s| s.last_latency.is_some()).await;
    assert!(snapshot.last_latency.unwrap() >= Duration::from_millis(20));
}

#[tokio::test]
async fn test_precision_scroll_sends_five_steps() {
    let mut h = start();
    connect(&mut h, "Headset").await;

    h.handle.send_precision_scroll(100.0, 0.0).await.unwrap();
    for _ in 0..5 {
        let step = next_sent(&mut h.remote).await;
        assert_eq!(step.wire().unwrap(), WireMessage::web_scroll(20.0, 0.0));
    }
    assert!(h.remote.try_recv_sent().is_none());
}

#[tokio::test]
async fn test_send_without_session_reports_unavailable() {
    let h = start();
    let err = h.handle.send_web_tap(0.5, 0.5).await.unwrap_err();
    assert!(matches!(err, SessionError::TransportUnavailable));
    let err = h.handle.send_nav(NavAction::Back).await.unwrap_err();
    assert!(matches!(err, SessionError::TransportUnavailable));
}

#[tokio::test]
async fn test_send_failure_is_reported_not_retried() {
    let mut h = start();
    connect(&mut h, "Headset").await;
    h.remote.set_fail_sends(true);

    let err = h.handle.send_web_scroll(1.0, 1.0).await.unwrap_err();
    assert!(matches!(err, SessionError::Transport(_)));

    h.remote.set_fail_sends(false);
    h.handle.send_web_hover_tap().await.unwrap();
    let next = next_sent(&mut h.remote).await;
    assert_eq!(next.wire().unwrap(), WireMessage::web_hover_tap());
}

#[tokio::test]
async fn test_legacy_helpers_render_commands() {
    let mut h = start();
    connect(&mut h, "Headset").await;

    h.handle.send_nav(NavAction::Reload).await.unwrap();
    h.handle.send_url("https://example.com/a:b").await.unwrap();
    h.handle.send_key_enter().await.unwrap();
    h.handle.send_scroll_select(7).await.unwrap();
    h.handle.send_message("hello there").await.unwrap();

    let texts: Vec<String> = h.remote.drain_sent().iter().map(SentPayload::text).collect();
    assert_eq!(
        texts,
        vec![
            "WEB_NAV:RELOAD",
            "WEB_URL:https://example.com/a:b",
            "WEB_KEY:ENTER",
            "SCROLL_SELECT:7",
            "hello there",
        ]
    );
}

#[tokio::test]
async fn test_drag_flushes_whole_units() {
    let mut h = start_with(|c| c.drag_gain = 1.0);
    connect(&mut h, "Headset").await;

    h.handle.drag(3.4, 0.0).await.unwrap();
    assert_eq!(
        next_sent(&mut h.remote).await.wire().unwrap(),
        WireMessage::web_scroll(3.0, 0.0)
    );

    // Only 0.4 pending: nothing to flush on release.
    h.handle.end_drag().await.unwrap();
    h.handle.drag(2.5, 0.0).await.unwrap();
    assert_eq!(
        next_sent(&mut h.remote).await.wire().unwrap(),
        WireMessage::web_scroll(2.0, 0.0)
    );
}

#[tokio::test]
async fn test_logging_gated_when_disabled() {
    let h = start();
    for i in 0..10 {
        h.handle
            .log_interaction("webScroll", format!("dx={i}"))
            .await
            .unwrap();
    }
    assert_eq!(h.handle.export_logs().await.unwrap(), None);
    assert_eq!(h.handle.snapshot().logged_interactions, 0);
    assert!(csv_files(&h.dir).is_empty());
}

#[tokio::test]
async fn test_export_is_repeatable_and_stop_clears() {
    let mut h = start();
    connect(&mut h, "Headset").await;

    h.handle.set_experiment_mode(true, "gazePinch").await.unwrap();
    // Enabling announces the mode to the host.
    assert_eq!(
        next_sent(&mut h.remote).await.wire().unwrap(),
        WireMessage::mode_set("gazePinch")
    );

    h.handle.send_web_scroll(20.0, 0.0).await.unwrap();
    h.handle.send_nav(NavAction::Back).await.unwrap();
    h.handle.send_text("hello, \"world\"").await.unwrap();

    let first = h.handle.export_logs().await.unwrap().unwrap();
    let second = h.handle.export_logs().await.unwrap().unwrap();
    assert_ne!(first, second);

    let a = std::fs::read_to_string(&first).unwrap();
    let b = std::fs::read_to_string(&second).unwrap();
    assert_eq!(a, b);
    let lines: Vec<&str> = a.lines().collect();
    assert_eq!(lines[0], "timestamp,type,details");
    assert!(lines[1].ends_with(",webScroll,\"dx=20,dy=0\""));
    assert!(lines[2].ends_with(",WEB_NAV,\"BACK\""));
    assert!(lines[3].ends_with(",WEB_TYPE,\"hello, \"\"world\"\"\""));

    let stopped = h.handle.set_experiment_mode(false, "gazePinch").await.unwrap();
    assert!(stopped.is_some());
    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.logged_interactions, 0);
    assert!(!snapshot.experiment.enabled);
    assert_eq!(csv_files(&h.dir).len(), 3);
}

#[tokio::test]
async fn test_received_legacy_and_text_exposed() {
    let mut h = start();
    let host = connect(&mut h, "Headset").await;
    let mut events = h.handle.events();

    h.remote.deliver(&host.id, "WEB_SCROLL:12,-7");
    let received = timeout(WAIT, async {
        while let Some(event) = events.next().await {
            if let SessionEvent::Received { inbound, .. } = event {
                return inbound;
            }
        }
        panic!("event stream ended");
    })
    .await
    .unwrap();
    assert_eq!(
        received,
        Inbound::Legacy {
            text: "WEB_SCROLL:12,-7".to_string(),
            command: LegacyCommand::WebScroll { dx: 12, dy: -7 },
        }
    );

    h.remote.deliver(&host.id, "WEB_SCROLL:abc");
    let snapshot = wait_for(&h.handle, |s| {
        s.received_message.as_deref() == Some("WEB_SCROLL:abc")
    })
    .await;
    assert!(snapshot.is_connected);

    h.remote.deliver(&host.id, "EXP_STATE:SCORE:3/10");
    let snapshot = wait_for(&h.handle, |s| s.experiment_state.score.is_some()).await;
    assert_eq!(snapshot.experiment_state.score.as_deref(), Some("3/10"));

    h.remote.deliver(&host.id, "SCROLL_SELECT:24");
    let snapshot = wait_for(&h.handle, |s| s.selected_number.is_some()).await;
    assert_eq!(snapshot.selected_number, Some(24));
}

#[tokio::test]
async fn test_stalled_invite_returns_to_discovering() {
    let h = start_with(|c| c.stall_timeout_ms = Some(50));
    h.remote.set_auto_accept(false);
    let host = h.remote.add_host("Headset");
    h.handle.start_discovery().await.unwrap();
    h.handle.invite(host.clone()).await.unwrap();
    assert_eq!(h.handle.snapshot().state, SessionState::Connecting(host.clone()));

    wait_for(&h.handle, |s| s.state == SessionState::Discovering).await;
    let failed = h.handle.event_store().history().into_iter().any(|e| {
        matches!(
            e,
            SessionEvent::InviteFailed { peer: Some(ref p), timed_out: true, .. } if *p == host.id
        )
    });
    assert!(failed);
}

#[tokio::test]
async fn test_rejected_invite_reverts() {
    let h = start();
    h.remote.set_auto_accept(false);
    let host = h.remote.add_host("Headset");
    h.handle.invite(host.clone()).await.unwrap();
    h.remote.reject_invite(&host, "declined");

    wait_for(&h.handle, |s| s.state == SessionState::Idle).await;
    assert!(!h.handle.cancel_invite().await.unwrap());
}

#[tokio::test]
async fn test_cancel_invite() {
    let h = start();
    h.remote.set_auto_accept(false);
    let host = h.remote.add_host("Headset");
    h.handle.invite(host).await.unwrap();
    assert!(h.handle.cancel_invite().await.unwrap());
    assert_eq!(h.handle.snapshot().state, SessionState::Idle);
}

#[tokio::test]
async fn test_most_recent_peer_takes_over() {
    let mut h = start();
    let first = connect(&mut h, "Left").await;
    let second = h.remote.add_host("Right");

    let err = h.handle.invite(second.clone()).await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyConnected(ref id) if *id == first.id));

    // The host side connects on its own.
    h.remote.accept(&second);
    wait_for(&h.handle, |s| s.state == SessionState::Connected(second.clone())).await;

    h.remote.disconnect(&second);
    wait_for(&h.handle, |s| s.connected_peers.len() == 1).await;
    assert_eq!(h.handle.snapshot().state, SessionState::Connected(first.clone()));

    h.remote.disconnect(&first);
    wait_for(&h.handle, |s| s.state == SessionState::Disconnected).await;
}

#[tokio::test]
async fn test_shutdown_exports_running_experiment() {
    let h = start();
    h.handle.set_experiment_mode(true, "directTouch").await.unwrap();
    h.handle.log_interaction("custom", "note").await.unwrap();

    h.handle.shutdown().await;
    h.task.await.unwrap();

    let files = csv_files(&h.dir);
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Pad_Interactions_"));
    assert!(matches!(
        h.handle.export_logs().await,
        Err(SessionError::Closed)
    ));
}
