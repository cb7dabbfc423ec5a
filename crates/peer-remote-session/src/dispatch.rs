//! Routing of inbound payloads into session state.

use std::time::Duration;

use peer_remote_core::{PeerId, PeerTransport};
use peer_remote_transport::{
    Inbound, LegacyCommand, WireMessage,
    protocol::{Hello, ModeSet, Pong, unix_now},
};

use crate::{events::SessionEvent, state::SessionCore};

impl<T: PeerTransport> SessionCore<T> {
    /// Decode one payload, expose it and apply its side effects.
    pub(crate) async fn on_data(&mut self, peer: PeerId, data: &[u8]) {
        let inbound = self.chain.decode(data);
        match &inbound {
            Inbound::Wire(message) => self.received_wire = Some(message.clone()),
            Inbound::Legacy { text, .. } | Inbound::Text(text) => {
                self.received_message = Some(text.clone());
            }
        }
        self.events.push(SessionEvent::Received {
            peer: peer.clone(),
            inbound: inbound.clone(),
        });

        match inbound {
            Inbound::Wire(message) => self.dispatch_wire(&peer, message).await,
            Inbound::Legacy { command, .. } => self.dispatch_legacy(&peer, command).await,
            Inbound::Text(text) => {
                tracing::debug!(peer = %peer, len = text.len(), "Unrecognised text received");
            }
        }
    }

    async fn dispatch_wire(&mut self, peer: &PeerId, message: WireMessage) {
        match message {
            WireMessage::Hello(Hello {
                role,
                version,
                capabilities,
            }) => {
                if version == self.config.protocol_version {
                    tracing::info!(peer = %peer, ?role, version, ?capabilities, "Hello received");
                } else {
                    tracing::warn!(
                        peer = %peer,
                        ?role,
                        version,
                        expected = self.config.protocol_version,
                        "Hello with different protocol version"
                    );
                }
            }
            WireMessage::Ping(ping) => {
                // Echo the sender's clock, never ours.
                let pong = WireMessage::Pong(Pong { t: ping.t });
                if let Err(e) = self.send_to(peer, &pong).await {
                    tracing::warn!(peer = %peer, "Pong failed: {e}");
                }
            }
            WireMessage::Pong(Pong { t }) => {
                match Duration::try_from_secs_f64((unix_now() - t).max(0.0)) {
                    Ok(latency) => {
                        tracing::debug!(peer = %peer, latency_ms = latency.as_millis(), "Latency sample");
                        self.last_latency = Some(latency);
                        self.events.push(SessionEvent::LatencySample(latency));
                    }
                    Err(e) => tracing::warn!(peer = %peer, "Unusable pong timestamp: {e}"),
                }
            }
            WireMessage::ModeSet(ModeSet { mode }) => {
                self.logger.set_mode(mode.clone());
                self.set_current_mode(mode);
            }
            message @ (WireMessage::WebTap(_)
            | WireMessage::WebScroll(_)
            | WireMessage::WebHoverTap(_)) => {
                tracing::debug!(peer = %peer, tag = message.tag(), "Input event received");
            }
        }
    }

    async fn dispatch_legacy(&mut self, peer: &PeerId, command: LegacyCommand) {
        match command {
            LegacyCommand::ExpModeOn { mode } => {
                self.apply_host_experiment_mode(peer, true, mode).await;
            }
            LegacyCommand::ExpModeOff => {
                let mode = self.logger.experiment().mode.clone();
                self.apply_host_experiment_mode(peer, false, mode).await;
            }
            LegacyCommand::ExpState { field, value } => {
                tracing::debug!(peer = %peer, field = field.keyword(), %value, "Experiment state");
                self.experiment_state.set(field, value);
            }
            LegacyCommand::ScrollSelect(number) => {
                self.selected_number = Some(number);
            }
            other => {
                tracing::debug!(peer = %peer, command = other.name(), "Legacy command received");
            }
        }
    }

    /// Host-driven switches are applied without announcing them back.
    async fn apply_host_experiment_mode(&mut self, peer: &PeerId, enabled: bool, mode: String) {
        if let Err(e) = self.apply_experiment_mode(enabled, mode, false).await {
            tracing::warn!(peer = %peer, enabled, "Experiment switch from host failed: {e}");
        }
    }
}
