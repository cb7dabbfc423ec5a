//! State-owner task and the handle used to drive it.
//!
//! Every mutation of session state happens on the task spawned by
//! [`SessionManager::spawn`]. Transport callbacks arrive as
//! [`TransportEvent`](peer_remote_core::TransportEvent)s, UI calls arrive as commands with a reply channel so
//! send failures are still reported to the caller.

use std::{future::pending, ops::ControlFlow, path::PathBuf, sync::Arc, time::Duration};

use futures::stream::BoxStream;
use peer_remote_core::{PeerDescriptor, PeerTransport, SessionConfig, TransportEventReceiver};
use peer_remote_transport::{Key, LegacyCommand, NavAction, WireMessage};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, sleep, sleep_until},
};

use crate::{
    events::{EventStore, SessionEvent},
    shaping::precision_steps,
    state::{SessionCore, SessionError, SessionSnapshot},
};

const COMMAND_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    StartDiscovery(Reply<()>),
    StopDiscovery(Reply<()>),
    Invite(PeerDescriptor, Reply<()>),
    CancelInvite(oneshot::Sender<bool>),
    SendWire(WireMessage, Reply<()>),
    SendMessage(String, Reply<()>),
    SendLegacy(LegacyCommand, Reply<()>),
    Drag { dx: f64, dy: f64, reply: Reply<()> },
    EndDrag(Reply<()>),
    SetExperimentMode {
        enabled: bool,
        mode: String,
        reply: Reply<Option<PathBuf>>,
    },
    LogInteraction { kind: String, details: String },
    ExportLogs(Reply<Option<PathBuf>>),
    Shutdown(oneshot::Sender<()>),
}

/// Spawns the state-owner task.
pub struct SessionManager;

impl SessionManager {
    /// Start a session over `transport`, consuming the events it posts.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<T>(
        config: SessionConfig,
        transport: T,
        transport_events: TransportEventReceiver,
    ) -> (SessionHandle, JoinHandle<()>)
    where
        T: PeerTransport + 'static,
    {
        Self::spawn_core(SessionCore::new(config, transport), transport_events)
    }

    /// Start a session around an already configured core.
    pub fn spawn_core<T>(
        core: SessionCore<T>,
        transport_events: TransportEventReceiver,
    ) -> (SessionHandle, JoinHandle<()>)
    where
        T: PeerTransport + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = SessionHandle {
            commands: commands_tx,
            snapshot: core.subscribe(),
            events: core.events(),
            precision_steps: core.config().precision_steps,
            precision_step_delay: core.config().precision_step_delay(),
        };
        let task = tokio::spawn(run(core, commands_rx, transport_events));
        (handle, task)
    }
}

async fn stall_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn run<T: PeerTransport>(
    mut core: SessionCore<T>,
    mut commands: mpsc::Receiver<Command>,
    mut transport_events: TransportEventReceiver,
) {
    let mut transport_open = true;
    tracing::debug!(device = %core.config().device_name, "Session task started");

    loop {
        let deadline = core.stall_deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    if handle_command(&mut core, command).await.is_break() {
                        break;
                    }
                }
                None => {
                    tracing::debug!("All session handles dropped");
                    core.shutdown().await;
                    core.publish();
                    break;
                }
            },
            event = transport_events.recv(), if transport_open => match event {
                Some(event) => core.on_transport_event(event).await,
                None => {
                    tracing::warn!("Transport event channel closed");
                    transport_open = false;
                }
            },
            () = stall_timer(deadline) => core.on_stall_timeout(),
        }
        core.publish();
    }
}

async fn handle_command<T: PeerTransport>(
    core: &mut SessionCore<T>,
    command: Command,
) -> ControlFlow<()> {
    match command {
        Command::StartDiscovery(reply) => {
            let result = core.start_discovery().await;
            respond(core, reply, result);
        }
        Command::StopDiscovery(reply) => {
            let result = core.stop_discovery().await;
            respond(core, reply, result);
        }
        Command::Invite(peer, reply) => {
            let result = core.invite(peer).await;
            respond(core, reply, result);
        }
        Command::CancelInvite(reply) => {
            let result = core.cancel_invite();
            respond(core, reply, result);
        }
        Command::SendWire(message, reply) => {
            let result = core.send_event(message).await;
            respond(core, reply, result);
        }
        Command::SendMessage(text, reply) => {
            let result = core.send_message(text).await;
            respond(core, reply, result);
        }
        Command::SendLegacy(command, reply) => {
            let result = core.send_legacy(&command).await;
            respond(core, reply, result);
        }
        Command::Drag { dx, dy, reply } => {
            let result = core.drag(dx, dy).await;
            respond(core, reply, result);
        }
        Command::EndDrag(reply) => {
            let result = core.end_drag().await;
            respond(core, reply, result);
        }
        Command::SetExperimentMode {
            enabled,
            mode,
            reply,
        } => {
            let result = core.set_experiment_mode(enabled, mode).await;
            respond(core, reply, result);
        }
        Command::LogInteraction { kind, details } => core.log_interaction(kind, details),
        Command::ExportLogs(reply) => {
            let result = core.export_logs().await;
            respond(core, reply, result);
        }
        Command::Shutdown(done) => {
            core.shutdown().await;
            core.publish();
            let _ = done.send(());
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

/// Publish, then answer: a caller sees the snapshot of its own change.
fn respond<T: PeerTransport, R>(core: &SessionCore<T>, reply: oneshot::Sender<R>, result: R) {
    core.publish();
    let _ = reply.send(result);
}

/// Cloneable handle to a running session.
///
/// Every method is answered by the session task; once it has stopped they
/// return [`SessionError::Closed`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: Arc<EventStore>,
    precision_steps: u32,
    precision_step_delay: Duration,
}

impl SessionHandle {
    async fn request<R>(
        &self,
        command: impl FnOnce(Reply<R>) -> Command,
    ) -> Result<R, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    // Lifecycle

    /// Start browsing for hosts.
    ///
    /// # Errors
    /// Returns error if the transport cannot browse.
    pub async fn start_discovery(&self) -> Result<(), SessionError> {
        self.request(Command::StartDiscovery).await
    }

    /// Stop browsing. An established session is unaffected.
    ///
    /// # Errors
    /// Returns error if the transport fails to stop.
    pub async fn stop_discovery(&self) -> Result<(), SessionError> {
        self.request(Command::StopDiscovery).await
    }

    /// Invite a discovered host.
    ///
    /// # Errors
    /// Returns error if already connected or the transport refuses.
    pub async fn invite(&self, peer: PeerDescriptor) -> Result<(), SessionError> {
        self.request(|reply| Command::Invite(peer, reply)).await
    }

    /// Abandon a pending invite. Returns whether one was pending.
    ///
    /// # Errors
    /// Returns error if the session has stopped.
    pub async fn cancel_invite(&self) -> Result<bool, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::CancelInvite(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Stop the session task, exporting a running experiment first.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    // Structured sends

    /// Log and send a structured message to the active peer.
    ///
    /// # Errors
    /// Returns [`SessionError::TransportUnavailable`] when not connected, or
    /// the encode/transport failure.
    pub async fn send_wire(&self, message: WireMessage) -> Result<(), SessionError> {
        self.request(|reply| Command::SendWire(message, reply)).await
    }

    /// Tap at a normalized position.
    ///
    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_web_tap(&self, nx: f64, ny: f64) -> Result<(), SessionError> {
        self.send_wire(WireMessage::web_tap(nx, ny)).await
    }

    /// Scroll by a delta, unshaped.
    ///
    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_web_scroll(&self, dx: f64, dy: f64) -> Result<(), SessionError> {
        self.send_wire(WireMessage::web_scroll(dx, dy)).await
    }

    /// Tap wherever the host is looking.
    ///
    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_web_hover_tap(&self) -> Result<(), SessionError> {
        self.send_wire(WireMessage::web_hover_tap()).await
    }

    /// Ask the host to switch interaction mode.
    ///
    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_mode_change(&self, mode: impl Into<String>) -> Result<(), SessionError> {
        self.send_wire(WireMessage::mode_set(mode)).await
    }

    // Shaped sends

    /// Feed a drag delta through the throttle.
    ///
    /// # Errors
    /// Returns error if a due flush cannot be sent.
    pub async fn drag(&self, dx: f64, dy: f64) -> Result<(), SessionError> {
        self.request(|reply| Command::Drag { dx, dy, reply }).await
    }

    /// Touch released.
    ///
    /// # Errors
    /// Returns error if the final flush cannot be sent.
    pub async fn end_drag(&self) -> Result<(), SessionError> {
        self.request(Command::EndDrag).await
    }

    /// Scroll by `(dx, dy)` in equal steps spaced by the configured delay.
    ///
    /// Stops at the first failed step.
    ///
    /// # Errors
    /// Returns error if a step cannot be sent.
    pub async fn send_precision_scroll(&self, dx: f64, dy: f64) -> Result<(), SessionError> {
        for (i, (sx, sy)) in precision_steps(dx, dy, self.precision_steps)
            .into_iter()
            .enumerate()
        {
            if i > 0 {
                sleep(self.precision_step_delay).await;
            }
            self.send_web_scroll(sx, sy).await?;
        }
        Ok(())
    }

    // Text and legacy sends

    /// Send a raw text payload.
    ///
    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_message(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        self.request(|reply| Command::SendMessage(text, reply)).await
    }

    /// Send a legacy command.
    ///
    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_legacy(&self, command: LegacyCommand) -> Result<(), SessionError> {
        self.request(|reply| Command::SendLegacy(command, reply))
            .await
    }

    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_nav(&self, action: NavAction) -> Result<(), SessionError> {
        self.send_legacy(LegacyCommand::WebNav(action)).await
    }

    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_url(&self, url: impl Into<String>) -> Result<(), SessionError> {
        self.send_legacy(LegacyCommand::WebUrl(url.into())).await
    }

    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send_legacy(LegacyCommand::WebType(text.into())).await
    }

    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_key_enter(&self) -> Result<(), SessionError> {
        self.send_legacy(LegacyCommand::WebKey(Key::Enter)).await
    }

    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_gesture(&self, name: impl Into<String>) -> Result<(), SessionError> {
        self.send_legacy(LegacyCommand::Gesture { name: name.into() })
            .await
    }

    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_select(&self, x_ratio: f64, y_ratio: f64) -> Result<(), SessionError> {
        self.send_legacy(LegacyCommand::Select { x_ratio, y_ratio })
            .await
    }

    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_scroll_select(&self, number: i64) -> Result<(), SessionError> {
        self.send_legacy(LegacyCommand::ScrollSelect(number)).await
    }

    /// Tap a UI element by identifier.
    ///
    /// # Errors
    /// See [`send_wire`](Self::send_wire).
    pub async fn send_legacy_tap(&self, id: impl Into<String>) -> Result<(), SessionError> {
        self.send_legacy(LegacyCommand::Tap { id: id.into() }).await
    }

    // Experiment logging

    /// Start (clearing the buffer) or stop (export then clear) recording.
    ///
    /// # Errors
    /// Returns error if stopping fails to export; the buffer is kept.
    pub async fn set_experiment_mode(
        &self,
        enabled: bool,
        mode: impl Into<String>,
    ) -> Result<Option<PathBuf>, SessionError> {
        let mode = mode.into();
        self.request(|reply| Command::SetExperimentMode {
            enabled,
            mode,
            reply,
        })
        .await
    }

    /// Record an interaction. No-op outside an experiment.
    ///
    /// # Errors
    /// Returns error if the session has stopped.
    pub async fn log_interaction(
        &self,
        kind: impl Into<String>,
        details: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.commands
            .send(Command::LogInteraction {
                kind: kind.into(),
                details: details.into(),
            })
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Write the buffer to a fresh CSV file without clearing it.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub async fn export_logs(&self) -> Result<Option<PathBuf>, SessionError> {
        self.request(Command::ExportLogs).await
    }

    // Observation

    /// Current published state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Change notifications for the published state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until the published state satisfies `predicate`.
    ///
    /// # Errors
    /// Returns error if the session stops first.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot, SessionError> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(snapshot.clone())
    }

    /// Recent events followed by live ones.
    #[must_use]
    pub fn events(&self) -> BoxStream<'static, SessionEvent> {
        self.events.history_plus_stream()
    }

    #[must_use]
    pub fn event_store(&self) -> Arc<EventStore> {
        Arc::clone(&self.events)
    }
}

#[cfg(test)]
mod tests {
    use peer_remote_core::transport_event_channel;
    use peer_remote_transport::LoopbackTransport;

    use super::*;

    #[tokio::test]
    async fn test_closed_after_shutdown() {
        let (tx, rx) = transport_event_channel();
        let (transport, _remote) = LoopbackTransport::new(tx);
        let (handle, task) = SessionManager::spawn(SessionConfig::new("Pad"), transport, rx);

        handle.shutdown().await;
        task.await.unwrap();

        assert!(matches!(
            handle.start_discovery().await,
            Err(SessionError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_discovery_published() {
        let (tx, rx) = transport_event_channel();
        let (transport, remote) = LoopbackTransport::new(tx);
        let (handle, _task) = SessionManager::spawn(SessionConfig::new("Pad"), transport, rx);

        let headset = remote.add_host("Headset");
        handle.start_discovery().await.unwrap();
        let snapshot = handle
            .wait_for(|s| !s.discovered_peers.is_empty())
            .await
            .unwrap();
        assert_eq!(snapshot.discovered_peers, vec![headset]);
        assert!(snapshot.discovering);
    }
}
