//! Session event feed with bounded history.

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use futures::{StreamExt, stream::BoxStream};
use peer_remote_core::{ExperimentConfig, PeerDescriptor, PeerId, SessionState};
use peer_remote_transport::Inbound;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Default number of events replayed to late subscribers.
pub const DEFAULT_HISTORY: usize = 256;

const LIVE_CAPACITY: usize = 1024;

/// Something observable happened in the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Lifecycle transition.
    StateChanged(SessionState),
    /// A host showed up while browsing.
    PeerFound(PeerDescriptor),
    /// A host went away.
    PeerLost(PeerId),
    /// A payload arrived and was decoded.
    Received { peer: PeerId, inbound: Inbound },
    /// Round trip of one of our pings.
    LatencySample(Duration),
    /// The interaction mode changed.
    ModeChanged(String),
    /// An invite did not lead to a session.
    InviteFailed {
        peer: Option<PeerId>,
        timed_out: bool,
        reason: String,
    },
    /// Browsing could not start.
    DiscoveryFailed(String),
    /// Experiment recording switched on or off.
    ExperimentChanged(ExperimentConfig),
    /// Interaction logs were written.
    LogsExported(PathBuf),
    /// Interaction logs could not be written; the buffer was kept.
    ExportFailed(String),
}

struct Inner {
    history: VecDeque<SessionEvent>,
    capacity: usize,
}

/// Event store with broadcast and history support.
///
/// Late subscribers (a UI screen opened mid-session) receive recent history
/// then switch to live updates.
pub struct EventStore {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl EventStore {
    /// Create a store keeping at most `capacity` events of history.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                history: VecDeque::with_capacity(capacity.min(64)),
                capacity,
            }),
            sender,
        }
    }

    /// Push an event to both live listeners and history.
    pub fn push(&self, event: SessionEvent) {
        let _ = self.sender.send(event.clone()); // live listeners

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.capacity == 0 {
            return;
        }
        while inner.history.len() >= inner.capacity {
            inner.history.pop_front();
        }
        inner.history.push_back(event);
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Get a snapshot of the history.
    #[must_use]
    pub fn history(&self) -> Vec<SessionEvent> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .iter()
            .cloned()
            .collect()
    }

    /// Stream that yields history first, then live updates.
    ///
    /// Live events a slow subscriber missed are skipped.
    #[must_use]
    pub fn history_plus_stream(&self) -> BoxStream<'static, SessionEvent> {
        let (history, rx) = (self.history(), self.subscribe());

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move {
            match res {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::debug!("Event subscriber lagged: {e}");
                    None
                }
            }
        });

        Box::pin(hist.chain(live))
    }

    /// Stream of received payloads only.
    #[must_use]
    pub fn received_stream(&self) -> BoxStream<'static, (PeerId, Inbound)> {
        self.history_plus_stream()
            .filter_map(|event| async move {
                match event {
                    SessionEvent::Received { peer, inbound } => Some((peer, inbound)),
                    _ => None,
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_bounded() {
        let store = EventStore::new(2);
        store.push(SessionEvent::ModeChanged("a".into()));
        store.push(SessionEvent::ModeChanged("b".into()));
        store.push(SessionEvent::ModeChanged("c".into()));
        assert_eq!(
            store.history(),
            vec![
                SessionEvent::ModeChanged("b".into()),
                SessionEvent::ModeChanged("c".into())
            ]
        );
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let store = EventStore::new(0);
        store.push(SessionEvent::DiscoveryFailed("x".into()));
        assert!(store.history().is_empty());
    }

    #[tokio::test]
    async fn test_history_then_live() {
        let store = EventStore::new(8);
        store.push(SessionEvent::StateChanged(SessionState::Discovering));
        let mut stream = store.history_plus_stream();
        store.push(SessionEvent::StateChanged(SessionState::Idle));

        assert_eq!(
            stream.next().await,
            Some(SessionEvent::StateChanged(SessionState::Discovering))
        );
        assert_eq!(stream.next().await, Some(SessionEvent::StateChanged(SessionState::Idle)));
    }

    #[tokio::test]
    async fn test_received_stream_filters() {
        let store = EventStore::new(8);
        let peer = PeerId::new("host");
        store.push(SessionEvent::ModeChanged("x".into()));
        store.push(SessionEvent::Received {
            peer: peer.clone(),
            inbound: Inbound::Text("hi".into()),
        });
        let mut stream = store.received_stream();
        assert_eq!(stream.next().await, Some((peer, Inbound::Text("hi".into()))));
    }
}
