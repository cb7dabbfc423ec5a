//! End-to-end run of a remote-control session over the in-memory transport.
//!
//! Run with: cargo run -p loopback-demo
//!
//! A simulated headset answers the handshake, pings back and switches mode,
//! while the handheld side scrolls, taps, navigates and records an
//! experiment. Set `RUST_LOG=debug` to follow every payload.

use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use peer_remote_core::{PeerDescriptor, SessionConfig, transport_event_channel};
use peer_remote_session::{SessionEvent, SessionHandle, SessionManager};
use peer_remote_transport::{
    LoopbackRemote, LoopbackTransport, NavAction, WireMessage,
    protocol::{Ping, Pong, unix_now},
};
use tokio::time::timeout;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = SessionConfig::from_env().context("Invalid PEER_REMOTE_* environment")?;
    tracing::info!(device = %config.device_name, export_dir = %config.export_dir.display(), "Starting");

    let (events_tx, events_rx) = transport_event_channel();
    let (transport, remote) = LoopbackTransport::new(events_tx);
    let (session, task) = SessionManager::spawn(config, transport, events_rx);

    let headset = remote.add_host("Headset");
    let printer = tokio::spawn(print_events(session.clone()));
    let host = tokio::spawn(simulate_host(remote, headset.clone()));

    session.start_discovery().await?;
    session
        .wait_for(|s| s.discovered_peers.contains(&headset))
        .await?;
    session.invite(headset).await?;
    session.wait_for(|s| s.is_connected).await?;
    session.stop_discovery().await?;

    session.set_experiment_mode(true, "gazePinch").await?;
    session.send_precision_scroll(0.0, 120.0).await?;
    for _ in 0..20 {
        session.drag(0.0, -2.7).await?;
        tokio::time::sleep(Duration::from_millis(4)).await;
    }
    session.end_drag().await?;
    session.send_web_tap(0.5, 0.4).await?;
    session.send_nav(NavAction::Back).await?;
    session.send_url("https://example.com").await?;

    let snapshot = session.wait_for(|s| s.last_latency.is_some()).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Some(path) = session.set_experiment_mode(false, "gazePinch").await? {
        println!("Interaction log written to {}", path.display());
    }

    session.shutdown().await;
    task.await?;
    host.abort();
    printer.abort();
    Ok(())
}

/// Plays the headset: greets, pings, answers pings and changes mode once.
async fn simulate_host(mut remote: LoopbackRemote, me: PeerDescriptor) -> anyhow::Result<()> {
    let mut greeted = false;
    while let Some(sent) = remote.recv_sent().await {
        match sent.wire() {
            Ok(WireMessage::Hello(hello)) if !greeted => {
                greeted = true;
                tracing::info!(?hello, "Host received hello");
                remote.deliver_wire(&me.id, &WireMessage::Ping(Ping { t: unix_now() }))?;
                remote.deliver_wire(&me.id, &WireMessage::mode_set("gazePinch"))?;
                remote.deliver(&me.id, "EXP_STATE:PHASE:warmup");
            }
            Ok(WireMessage::Ping(Ping { t })) => {
                remote.deliver_wire(&me.id, &WireMessage::Pong(Pong { t }))?;
            }
            Ok(message) => tracing::debug!(tag = message.tag(), "Host received"),
            Err(_) => tracing::debug!(text = %sent.text(), "Host received text"),
        }
    }
    Ok(())
}

async fn print_events(session: SessionHandle) {
    let mut events = session.events();
    while let Ok(Some(event)) = timeout(Duration::from_secs(30), events.next()).await {
        match event {
            SessionEvent::StateChanged(state) => println!("state: {}", state.name()),
            SessionEvent::LatencySample(latency) => println!("latency: {latency:?}"),
            SessionEvent::ModeChanged(mode) => println!("mode: {mode}"),
            SessionEvent::LogsExported(path) => println!("exported: {}", path.display()),
            other => tracing::debug!(?other, "Session event"),
        }
    }
}
