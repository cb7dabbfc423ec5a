//! Session state machine.
//!
//! [`SessionCore`] owns every piece of mutable session state. It is driven
//! by exactly one task (see [`crate::manager`]), so nothing in here locks.

use std::{path::PathBuf, sync::Arc, time::Duration};

use bytes::Bytes;
use peer_remote_core::{
    ConnectionState, ExperimentConfig, ExperimentState, PeerDescriptor, PeerId, PeerTransport,
    SendMode, SessionConfig, SessionState, TransportError, TransportEvent,
};
use peer_remote_transport::{
    Capabilities, DecoderChain, EncodeError, LegacyCommand, WireMessage, encode,
    protocol::{ModeSet, WebScroll, WebTap},
};
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::watch, time::Instant};

use crate::{
    events::{EventStore, SessionEvent},
    logger::InteractionLogger,
    shaping::DragThrottle,
    storage::{CsvExporter, ExportError},
};

/// Session error.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Nothing to send to: no peer is connected.
    #[error("Transport unavailable: no active session")]
    TransportUnavailable,
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Already connected to {0}")]
    AlreadyConnected(PeerId),
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
    /// The session task has stopped.
    #[error("Session closed")]
    Closed,
}

/// Read-only view of the session published after every change.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub discovering: bool,
    pub discovered_peers: Vec<PeerDescriptor>,
    /// Connected peers, oldest first.
    pub connected_peers: Vec<PeerDescriptor>,
    pub is_connected: bool,
    pub current_mode: String,
    pub experiment: ExperimentConfig,
    pub experiment_state: ExperimentState,
    /// Last non-structured payload, verbatim.
    pub received_message: Option<String>,
    /// Last structured message.
    pub received_wire: Option<WireMessage>,
    pub last_latency: Option<Duration>,
    pub selected_number: Option<i64>,
    pub logged_interactions: usize,
}

/// All session state and the operations on it.
pub struct SessionCore<T> {
    pub(crate) config: SessionConfig,
    pub(crate) transport: T,
    pub(crate) chain: DecoderChain,
    pub(crate) state: SessionState,
    pub(crate) discovering: bool,
    pub(crate) discovered: Vec<PeerDescriptor>,
    pub(crate) connected: Vec<PeerDescriptor>,
    pub(crate) current_mode: String,
    pub(crate) experiment_state: ExperimentState,
    pub(crate) received_message: Option<String>,
    pub(crate) received_wire: Option<WireMessage>,
    pub(crate) last_latency: Option<Duration>,
    pub(crate) selected_number: Option<i64>,
    pub(crate) logger: InteractionLogger,
    pub(crate) throttle: DragThrottle,
    pub(crate) stall_deadline: Option<Instant>,
    pub(crate) events: Arc<EventStore>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl<T: PeerTransport> SessionCore<T> {
    /// Create an idle session over `transport`.
    #[must_use]
    pub fn new(config: SessionConfig, transport: T) -> Self {
        let exporter = CsvExporter::new(config.export_dir.clone(), config.device_name.clone());
        let mut logger = InteractionLogger::new(exporter);
        logger.set_mode(config.initial_mode.clone());
        let throttle = DragThrottle::new(config.drag_gain, config.drag_flush_interval());
        let events = Arc::new(EventStore::new(config.event_history));
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());

        let mut core = Self {
            current_mode: config.initial_mode.clone(),
            config,
            transport,
            chain: DecoderChain::new(),
            state: SessionState::Idle,
            discovering: false,
            discovered: Vec::new(),
            connected: Vec::new(),
            experiment_state: ExperimentState::default(),
            received_message: None,
            received_wire: None,
            last_latency: None,
            selected_number: None,
            logger,
            throttle,
            stall_deadline: None,
            events,
            snapshot_tx,
        };
        core.publish();
        core
    }

    /// Replace the inbound decoder chain.
    #[must_use]
    pub fn with_decoder_chain(mut self, chain: DecoderChain) -> Self {
        self.chain = chain;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn events(&self) -> Arc<EventStore> {
        Arc::clone(&self.events)
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The peer sends are addressed to.
    #[must_use]
    pub const fn active_peer(&self) -> Option<&PeerDescriptor> {
        match &self.state {
            SessionState::Connected(peer) => Some(peer),
            _ => None,
        }
    }

    /// When an unanswered invite is given up on.
    #[must_use]
    pub const fn stall_deadline(&self) -> Option<Instant> {
        self.stall_deadline
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            discovering: self.discovering,
            discovered_peers: self.discovered.clone(),
            connected_peers: self.connected.clone(),
            is_connected: self.state.is_connected(),
            current_mode: self.current_mode.clone(),
            experiment: self.logger.experiment().clone(),
            experiment_state: self.experiment_state.clone(),
            received_message: self.received_message.clone(),
            received_wire: self.received_wire.clone(),
            last_latency: self.last_latency,
            selected_number: self.selected_number,
            logged_interactions: self.logger.entries().len(),
        }
    }

    /// Notify snapshot subscribers if anything changed.
    pub fn publish(&self) {
        let next = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    pub(crate) fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        tracing::info!(from = self.state.name(), to = next.name(), "Session state changed");
        if !matches!(next, SessionState::Connecting(_)) {
            self.stall_deadline = None;
        }
        self.state = next.clone();
        self.events.push(SessionEvent::StateChanged(next));
    }

    fn resting_state(&self) -> SessionState {
        if self.discovering {
            SessionState::Discovering
        } else {
            SessionState::Idle
        }
    }

    // Discovery

    /// Start browsing for hosts.
    ///
    /// # Errors
    /// Returns error if the transport cannot browse.
    pub async fn start_discovery(&mut self) -> Result<(), SessionError> {
        if let Err(e) = self.transport.start_discovery().await {
            self.on_discovery_failed(&e);
            return Err(e.into());
        }
        self.discovering = true;
        if matches!(self.state, SessionState::Idle | SessionState::Disconnected) {
            self.set_state(SessionState::Discovering);
        }
        Ok(())
    }

    /// Stop browsing. An existing session is unaffected.
    ///
    /// # Errors
    /// Returns error if the transport fails to stop.
    pub async fn stop_discovery(&mut self) -> Result<(), SessionError> {
        self.discovering = false;
        if self.state == SessionState::Discovering {
            self.set_state(SessionState::Idle);
        }
        self.transport.stop_discovery().await?;
        Ok(())
    }

    fn on_peer_found(&mut self, peer: PeerDescriptor) {
        if self.discovered.contains(&peer) {
            tracing::trace!(peer = %peer.id, "Peer already known");
            return;
        }
        tracing::debug!(peer = %peer.id, name = %peer.display_name, "Peer found");
        self.discovered.push(peer.clone());
        self.events.push(SessionEvent::PeerFound(peer));
    }

    fn on_peer_lost(&mut self, peer: &PeerId) {
        let before = self.discovered.len();
        self.discovered.retain(|p| &p.id != peer);
        if self.discovered.len() != before {
            tracing::debug!(peer = %peer, "Peer lost");
            self.events.push(SessionEvent::PeerLost(peer.clone()));
        }
    }

    fn on_discovery_failed(&mut self, error: &TransportError) {
        tracing::warn!("Discovery failed: {error}");
        self.discovering = false;
        if self.state == SessionState::Discovering {
            self.set_state(SessionState::Idle);
        }
        self.events.push(SessionEvent::DiscoveryFailed(error.to_string()));
    }

    // Connection lifecycle

    /// Invite a discovered host.
    ///
    /// # Errors
    /// Returns error if a session is already established or the transport
    /// refuses the invite.
    pub async fn invite(&mut self, peer: PeerDescriptor) -> Result<(), SessionError> {
        if let Some(active) = self.active_peer() {
            return Err(SessionError::AlreadyConnected(active.id.clone()));
        }

        let timeout = self.config.invite_timeout();
        if let Err(e) = self.transport.invite(&peer.id, timeout).await {
            tracing::warn!(peer = %peer.id, "Invite failed: {e}");
            self.events.push(SessionEvent::InviteFailed {
                peer: Some(peer.id.clone()),
                timed_out: false,
                reason: e.to_string(),
            });
            return Err(e.into());
        }

        tracing::info!(peer = %peer.id, timeout_ms = self.config.invite_timeout_ms, "Invite sent");
        self.enter_connecting(peer);
        Ok(())
    }

    fn pending_peer(&self) -> Option<PeerId> {
        match &self.state {
            SessionState::Connecting(peer) => Some(peer.id.clone()),
            _ => None,
        }
    }

    fn enter_connecting(&mut self, peer: PeerDescriptor) {
        self.set_state(SessionState::Connecting(peer));
        self.stall_deadline = self.config.stall_timeout().map(|t| Instant::now() + t);
    }

    /// Abandon a pending invite. Returns whether one was pending.
    pub fn cancel_invite(&mut self) -> bool {
        let Some(peer) = self.pending_peer() else {
            return false;
        };
        tracing::info!(peer = %peer, "Invite cancelled");
        let resting = self.resting_state();
        self.set_state(resting);
        true
    }

    /// The stall watchdog fired.
    pub fn on_stall_timeout(&mut self) {
        self.stall_deadline = None;
        let Some(peer) = self.pending_peer() else {
            return;
        };
        tracing::warn!(peer = %peer, "Invite stalled, giving up");
        let resting = self.resting_state();
        self.set_state(resting);
        self.events.push(SessionEvent::InviteFailed {
            peer: Some(peer),
            timed_out: true,
            reason: "no response before the stall timeout".to_string(),
        });
    }

    fn on_invite_failed(&mut self, peer: Option<PeerId>, error: &TransportError) {
        tracing::warn!(peer = ?peer, "Invite failed: {error}");
        let matches_pending = match &self.state {
            SessionState::Connecting(pending) => peer.as_ref().is_none_or(|p| p == &pending.id),
            _ => false,
        };
        if matches_pending {
            let resting = self.resting_state();
            self.set_state(resting);
        }
        self.events.push(SessionEvent::InviteFailed {
            peer,
            timed_out: false,
            reason: error.to_string(),
        });
    }

    async fn on_connection_state(&mut self, peer: PeerDescriptor, state: ConnectionState) {
        tracing::debug!(peer = %peer.id, ?state, "Connection state reported");
        match state {
            ConnectionState::Connecting => {
                if matches!(
                    self.state,
                    SessionState::Idle | SessionState::Discovering | SessionState::Disconnected
                ) {
                    self.enter_connecting(peer);
                }
            }
            ConnectionState::Connected => {
                if self.connected.contains(&peer) {
                    tracing::debug!(peer = %peer.id, "Repeated connected report ignored");
                    return;
                }
                self.connected.push(peer.clone());
                self.set_state(SessionState::Connected(peer.clone()));
                self.handshake(&peer.id).await;
            }
            ConnectionState::NotConnected => {
                self.connected.retain(|p| p != &peer);
                let was_pending = matches!(&self.state, SessionState::Connecting(p) if p == &peer);
                let was_active = matches!(&self.state, SessionState::Connected(p) if p == &peer);
                if was_pending {
                    let resting = self.resting_state();
                    self.set_state(resting);
                } else if was_active {
                    // Most recently connected survivor takes over.
                    let next = self
                        .connected
                        .last()
                        .cloned()
                        .map_or(SessionState::Disconnected, SessionState::Connected);
                    self.set_state(next);
                }
            }
        }
    }

    /// Entry action of every new connection. Not acknowledgment-gated.
    async fn handshake(&self, peer: &PeerId) {
        let capabilities = Capabilities {
            supports_tap_events: self.config.supports_tap_events,
            supports_native_scroll: self.config.supports_native_scroll,
        };
        let hello = WireMessage::hello(self.config.protocol_version, capabilities);
        for message in [hello, WireMessage::ping_now()] {
            if let Err(e) = self.send_to(peer, &message).await {
                tracing::warn!(peer = %peer, tag = message.tag(), "Handshake send failed: {e}");
            }
        }
    }

    /// Apply one transport event.
    pub async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerFound { peer, info } => {
                if !info.is_empty() {
                    tracing::trace!(peer = %peer.id, ?info, "Discovery info");
                }
                self.on_peer_found(peer);
            }
            TransportEvent::PeerLost { peer } => self.on_peer_lost(&peer),
            TransportEvent::ConnectionStateChanged { peer, state } => {
                self.on_connection_state(peer, state).await;
            }
            TransportEvent::DataReceived { peer, data } => self.on_data(peer, &data).await,
            TransportEvent::InviteFailed { peer, error } => self.on_invite_failed(peer, &error),
            TransportEvent::DiscoveryFailed { error } => self.on_discovery_failed(&error),
        }
    }

    // Sending

    pub(crate) async fn send_to(
        &self,
        peer: &PeerId,
        message: &WireMessage,
    ) -> Result<(), SessionError> {
        let payload = encode(message)?;
        self.transport
            .send(payload, std::slice::from_ref(peer), SendMode::Reliable)
            .await?;
        tracing::trace!(peer = %peer, tag = message.tag(), "Sent");
        Ok(())
    }

    async fn send_payload(&self, payload: Bytes) -> Result<(), SessionError> {
        let peer = self
            .active_peer()
            .ok_or(SessionError::TransportUnavailable)?;
        self.transport
            .send(payload, std::slice::from_ref(&peer.id), SendMode::Reliable)
            .await?;
        Ok(())
    }

    /// Send a structured message to the active peer. Not logged.
    ///
    /// # Errors
    /// Returns error if no peer is connected, the message cannot be encoded
    /// or the transport rejects it.
    pub async fn send_wire(&self, message: &WireMessage) -> Result<(), SessionError> {
        let peer = self
            .active_peer()
            .ok_or(SessionError::TransportUnavailable)?;
        self.send_to(&peer.id, message).await
    }

    /// Log then send a structured message.
    ///
    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_event(&mut self, message: WireMessage) -> Result<(), SessionError> {
        self.logger
            .log_interaction(message.tag(), interaction_details(&message));
        self.send_wire(&message).await?;
        if let WireMessage::ModeSet(ModeSet { mode }) = message {
            self.set_current_mode(mode);
        }
        Ok(())
    }

    /// Log then send a raw text payload.
    ///
    /// # Errors
    /// Returns error if no peer is connected or the transport rejects it.
    pub async fn send_message(&mut self, text: String) -> Result<(), SessionError> {
        match LegacyCommand::parse(&text) {
            Ok(command) => self
                .logger
                .log_interaction(command.name(), legacy_details(&text)),
            Err(_) => self.logger.log_interaction("message", text.as_str()),
        }
        self.send_payload(Bytes::from(text)).await
    }

    /// Log then send a legacy command.
    ///
    /// # Errors
    /// Returns error if no peer is connected or the transport rejects it.
    pub async fn send_legacy(&mut self, command: &LegacyCommand) -> Result<(), SessionError> {
        let text = command.to_string();
        self.logger
            .log_interaction(command.name(), legacy_details(&text));
        self.send_payload(Bytes::from(text)).await
    }

    /// Feed one drag delta through the throttle.
    ///
    /// # Errors
    /// Returns error if a flush is due and cannot be sent. The flushed
    /// amount is dropped.
    pub async fn drag(&mut self, dx: f64, dy: f64) -> Result<(), SessionError> {
        let Some((x, y)) = self.throttle.push(dx, dy, Instant::now()) else {
            return Ok(());
        };
        self.send_scroll_units(x, y).await
    }

    /// Touch released: send what is left and reset the throttle.
    ///
    /// # Errors
    /// Returns error if the final flush cannot be sent.
    pub async fn end_drag(&mut self) -> Result<(), SessionError> {
        let Some((x, y)) = self.throttle.finish() else {
            return Ok(());
        };
        self.send_scroll_units(x, y).await
    }

    #[allow(clippy::cast_precision_loss)]
    async fn send_scroll_units(&mut self, x: i64, y: i64) -> Result<(), SessionError> {
        self.send_event(WireMessage::web_scroll(x as f64, y as f64))
            .await
    }

    pub(crate) fn set_current_mode(&mut self, mode: String) {
        if self.current_mode != mode {
            tracing::info!(mode = %mode, "Interaction mode changed");
            self.current_mode.clone_from(&mode);
            self.events.push(SessionEvent::ModeChanged(mode));
        }
    }

    // Experiment logging

    /// Switch experiment recording, announcing the mode to the host.
    ///
    /// # Errors
    /// Returns error if disabling fails to export the buffer.
    pub async fn set_experiment_mode(
        &mut self,
        enabled: bool,
        mode: String,
    ) -> Result<Option<PathBuf>, SessionError> {
        self.apply_experiment_mode(enabled, mode, true).await
    }

    pub(crate) async fn apply_experiment_mode(
        &mut self,
        enabled: bool,
        mode: String,
        announce: bool,
    ) -> Result<Option<PathBuf>, SessionError> {
        let result = self.logger.set_experiment_mode(enabled, mode.clone()).await;
        self.events
            .push(SessionEvent::ExperimentChanged(self.logger.experiment().clone()));

        if enabled {
            if announce && self.active_peer().is_some() {
                if let Err(e) = self.send_wire(&WireMessage::mode_set(mode.clone())).await {
                    tracing::warn!("Mode announcement failed: {e}");
                }
            }
            self.set_current_mode(mode);
        }

        self.report_export(result)
    }

    /// Append an interaction entry. No-op outside an experiment.
    pub fn log_interaction(&mut self, kind: String, details: String) {
        self.logger.log_interaction(kind, details);
    }

    /// Export the buffer without clearing it.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub async fn export_logs(&mut self) -> Result<Option<PathBuf>, SessionError> {
        let result = self.logger.export_logs().await;
        self.report_export(result)
    }

    fn report_export(
        &self,
        result: Result<Option<PathBuf>, ExportError>,
    ) -> Result<Option<PathBuf>, SessionError> {
        match result {
            Ok(Some(path)) => {
                self.events.push(SessionEvent::LogsExported(path.clone()));
                Ok(Some(path))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.events.push(SessionEvent::ExportFailed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Final cleanup: export a running experiment and stop browsing.
    pub async fn shutdown(&mut self) {
        if self.logger.is_recording() {
            let mode = self.logger.experiment().mode.clone();
            if let Err(e) = self.apply_experiment_mode(false, mode, false).await {
                tracing::error!("Export on shutdown failed: {e}");
            }
        }
        if self.discovering {
            if let Err(e) = self.stop_discovery().await {
                tracing::debug!("Stop discovery on shutdown failed: {e}");
            }
        }
        tracing::info!("Session shut down");
    }
}

/// Details column for a structured interaction.
fn interaction_details(message: &WireMessage) -> String {
    match message {
        WireMessage::WebScroll(WebScroll { dx, dy }) => format!("dx={dx},dy={dy}"),
        WireMessage::WebTap(WebTap { nx, ny }) => format!("nx={nx},ny={ny}"),
        WireMessage::ModeSet(ModeSet { mode }) => format!("mode={mode}"),
        WireMessage::Ping(ping) => format!("t={}", ping.t),
        WireMessage::Pong(pong) => format!("t={}", pong.t),
        WireMessage::Hello(hello) => format!("version={}", hello.version),
        WireMessage::WebHoverTap(_) => String::new(),
    }
}

/// Details column for a legacy command: everything after the name.
fn legacy_details(text: &str) -> &str {
    text.split_once(':').map_or("", |(_, rest)| rest)
}

#[cfg(test)]
mod tests {
    use peer_remote_core::transport_event_channel;
    use peer_remote_transport::{LoopbackRemote, LoopbackTransport};

    use super::*;

    fn core() -> (SessionCore<LoopbackTransport>, LoopbackRemote) {
        let (tx, _rx) = transport_event_channel();
        let (transport, remote) = LoopbackTransport::new(tx);
        let mut config = SessionConfig::new("Pad");
        config.export_dir = std::env::temp_dir();
        (SessionCore::new(config, transport), remote)
    }

    fn host(name: &str) -> PeerDescriptor {
        PeerDescriptor::new(PeerId::new(name), name)
    }

    #[test]
    fn test_details() {
        assert_eq!(
            interaction_details(&WireMessage::web_scroll(20.0, 0.0)),
            "dx=20,dy=0"
        );
        assert_eq!(legacy_details("WEB_URL:https://a.b/c"), "https://a.b/c");
        assert_eq!(legacy_details("WEB_TAP"), "");
    }

    #[tokio::test]
    async fn test_discovery_lifecycle() {
        let (mut core, remote) = core();
        core.start_discovery().await.unwrap();
        assert_eq!(core.state(), &SessionState::Discovering);
        assert!(remote.is_discovering());

        core.stop_discovery().await.unwrap();
        assert_eq!(core.state(), &SessionState::Idle);
        assert!(!remote.is_discovering());
    }

    #[tokio::test]
    async fn test_duplicate_peers_ignored() {
        let (mut core, _remote) = core();
        let peer = host("a");
        core.on_peer_found(peer.clone());
        core.on_peer_found(PeerDescriptor::new(peer.id.clone(), "renamed"));
        assert_eq!(core.snapshot().discovered_peers.len(), 1);
        core.on_peer_lost(&peer.id);
        assert!(core.snapshot().discovered_peers.is_empty());
    }

    #[tokio::test]
    async fn test_send_without_session() {
        let (mut core, _remote) = core();
        let err = core
            .send_event(WireMessage::web_hover_tap())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::TransportUnavailable));
    }

    #[tokio::test]
    async fn test_multi_peer_tie_break() {
        let (mut core, _remote) = core();
        let (a, b, c) = (host("a"), host("b"), host("c"));
        for peer in [&a, &b, &c] {
            core.on_connection_state(peer.clone(), ConnectionState::Connected)
                .await;
        }
        assert_eq!(core.active_peer(), Some(&c));

        core.on_connection_state(c.clone(), ConnectionState::NotConnected)
            .await;
        assert_eq!(core.active_peer(), Some(&b));

        // Dropping a non-active peer keeps the active one.
        core.on_connection_state(a.clone(), ConnectionState::NotConnected)
            .await;
        assert_eq!(core.active_peer(), Some(&b));

        core.on_connection_state(b, ConnectionState::NotConnected)
            .await;
        assert_eq!(core.state(), &SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_handshake_once_per_connection() {
        let (mut core, mut remote) = core();
        let peer = remote.add_host("Headset");
        remote.accept(&peer);
        for _ in 0..2 {
            core.on_connection_state(peer.clone(), ConnectionState::Connected)
                .await;
        }
        let sent = remote.drain_sent();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[0].wire().unwrap(), WireMessage::Hello(_)));
        assert!(matches!(sent[1].wire().unwrap(), WireMessage::Ping(_)));
        assert_eq!(core.snapshot().connected_peers, vec![peer]);
    }

    #[tokio::test]
    async fn test_stall_returns_to_discovering() {
        let (mut core, remote) = core();
        remote.set_auto_accept(false);
        let peer = remote.add_host("Headset");
        core.start_discovery().await.unwrap();
        core.invite(peer.clone()).await.unwrap();
        assert_eq!(core.state(), &SessionState::Connecting(peer));
        assert!(core.stall_deadline().is_some());

        core.on_stall_timeout();
        assert_eq!(core.state(), &SessionState::Discovering);
        assert!(core.stall_deadline().is_none());
        assert!(core.events.history().iter().any(|e| matches!(
            e,
            SessionEvent::InviteFailed { timed_out: true, .. }
        )));
    }

    #[tokio::test]
    async fn test_invite_unknown_peer_fails() {
        let (mut core, _remote) = core();
        let err = core.invite(host("ghost")).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::UnknownPeer(_))
        ));
        assert_eq!(core.state(), &SessionState::Idle);
    }
}
