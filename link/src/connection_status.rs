//! Aggregated connection status.
//!
//! [`ConnectionStatusMonitor`] combines platform reachability with the
//! socket lifecycle and the caller's intent into one [`ConnectionState`]
//! and publishes it as a push sequence. Every new observer first receives
//! the current snapshot, then each subsequent change. An operation that
//! leaves every field unchanged publishes nothing.

use crate::models::{ConnectionState, IntendedState, NetworkState, SocketStatus};
use crate::reachability::{ReachabilityMonitor, ReachabilitySubscription};
use futures_util::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

struct StatusState {
    current: ConnectionState,
    observers: Vec<mpsc::UnboundedSender<ConnectionState>>,
    closed: bool,
}

struct StatusInner {
    state: Mutex<StatusState>,
    reachability: Mutex<Option<ReachabilitySubscription>>,
    // Keeps the shared platform listener alive for as long as we follow it.
    _source: ReachabilityMonitor,
}

impl StatusInner {
    fn update(&self, merge: impl FnOnce(&mut ConnectionState)) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = state.current;
        merge(&mut next);
        if next == state.current {
            return false;
        }
        state.current = next;
        log::debug!("[realtime-link] Connection status: {:?}", next);
        state.observers.retain(|tx| tx.send(next).is_ok());
        true
    }
}

/// Publishes [`ConnectionState`] snapshots.
#[derive(Clone)]
pub struct ConnectionStatusMonitor {
    inner: Arc<StatusInner>,
}

impl fmt::Debug for ConnectionStatusMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionStatusMonitor").field("current", &self.current()).finish()
    }
}

impl ConnectionStatusMonitor {
    /// Start with `{network: connected, socket: disconnected, intent: disconnected}`
    /// and follow `reachability` for the network field.
    pub fn new(reachability: &ReachabilityMonitor) -> Self {
        let inner = Arc::new(StatusInner {
            state: Mutex::new(StatusState {
                current: ConnectionState::default(),
                observers: Vec::new(),
                closed: false,
            }),
            reachability: Mutex::new(None),
            _source: reachability.clone(),
        });

        let weak = Arc::downgrade(&inner);
        let subscription = reachability.subscribe(move |status| {
            if let Some(inner) = weak.upgrade() {
                inner.update(|s| {
                    s.network_state = if status.online {
                        NetworkState::Connected
                    } else {
                        NetworkState::Disconnected
                    };
                });
            }
        });
        *inner.reachability.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription);

        Self { inner }
    }

    /// Observe status changes, starting with the current snapshot.
    pub fn subscribe(&self) -> ConnectionStatusStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        // Replay under the same lock so no update can slip in ahead of it.
        let _ = tx.send(state.current);
        if !state.closed {
            state.observers.push(tx);
        }
        ConnectionStatusStream { rx }
    }

    pub fn current(&self) -> ConnectionState {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner()).current
    }

    /// The caller wants a socket and one is being opened.
    pub fn opening_socket(&self) -> bool {
        self.inner.update(|s| {
            s.intended_connection_state = IntendedState::Connected;
            s.connection_state = SocketStatus::Connecting;
        })
    }

    /// The socket is open and acknowledged.
    pub fn connection_established(&self) -> bool {
        self.inner.update(|s| s.connection_state = SocketStatus::Connected)
    }

    /// The caller no longer wants a socket.
    pub fn disconnecting(&self) -> bool {
        self.inner.update(|s| s.intended_connection_state = IntendedState::Disconnected)
    }

    /// The socket is gone.
    pub fn disconnected(&self) -> bool {
        self.inner.update(|s| s.connection_state = SocketStatus::Disconnected)
    }

    /// Stop following reachability and end every observer stream.
    /// Safe to call more than once.
    pub fn unsubscribe(&self) {
        let subscription =
            self.inner.reachability.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(subscription);
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        state.closed = true;
        state.observers.clear();
    }

    pub fn observer_count(&self) -> usize {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        state.observers.retain(|tx| !tx.is_closed());
        state.observers.len()
    }
}

/// Push sequence of [`ConnectionState`] snapshots.
///
/// Ends when the monitor is unsubscribed or dropped.
#[derive(Debug)]
pub struct ConnectionStatusStream {
    rx: mpsc::UnboundedReceiver<ConnectionState>,
}

impl ConnectionStatusStream {
    /// Wait for the next snapshot.
    pub async fn next(&mut self) -> Option<ConnectionState> {
        self.rx.recv().await
    }

    /// Take a snapshot that is already queued, without waiting.
    pub fn try_next(&mut self) -> Option<ConnectionState> {
        self.rx.try_recv().ok()
    }
}

impl Stream for ConnectionStatusStream {
    type Item = ConnectionState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::{ManualReachability, ReachabilityAdapter};

    fn monitor() -> (ConnectionStatusMonitor, ManualReachability) {
        let network = ManualReachability::new();
        let adapter: Arc<dyn ReachabilityAdapter> = Arc::new(network.clone());
        let reachability = ReachabilityMonitor::new(Some(adapter)).unwrap();
        (ConnectionStatusMonitor::new(&reachability), network)
    }

    fn drain(stream: &mut ConnectionStatusStream) -> Vec<ConnectionState> {
        std::iter::from_fn(|| stream.try_next()).collect()
    }

    #[test]
    fn test_new_subscriber_gets_current_snapshot_first() {
        let (monitor, _network) = monitor();
        monitor.opening_socket();

        let mut stream = monitor.subscribe();
        let first = stream.try_next().unwrap();
        assert_eq!(first.connection_state, SocketStatus::Connecting);
        assert_eq!(first.intended_connection_state, IntendedState::Connected);
        assert!(stream.try_next().is_none(), "nothing but the snapshot yet");
    }

    #[test]
    fn test_no_emission_without_field_change() {
        let (monitor, _network) = monitor();
        let mut stream = monitor.subscribe();

        assert!(!monitor.disconnected(), "already disconnected");
        assert!(!monitor.disconnecting(), "intent already disconnected");
        assert!(monitor.opening_socket());
        assert!(!monitor.opening_socket());
        assert!(monitor.connection_established());
        assert!(!monitor.connection_established());

        let states = drain(&mut stream);
        assert_eq!(states.len(), 3, "initial + two real changes");
        assert_eq!(states[2].connection_state, SocketStatus::Connected);
        assert!(states[2].is_fully_connected());
    }

    #[test]
    fn test_network_changes_are_independent_of_intent() {
        let (monitor, network) = monitor();
        monitor.opening_socket();
        monitor.connection_established();
        let mut stream = monitor.subscribe();

        network.set_online(false);
        network.report(None);
        network.set_online(false);
        network.set_online(true);

        let states = drain(&mut stream);
        assert_eq!(states.len(), 3);
        assert_eq!(states[1].network_state, NetworkState::Disconnected);
        assert_eq!(
            states[1].intended_connection_state,
            IntendedState::Connected,
            "going offline does not change intent"
        );
        assert_eq!(states[2].network_state, NetworkState::Connected);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_ends_streams() {
        let (monitor, network) = monitor();
        let mut stream = monitor.subscribe();
        assert_eq!(stream.next().await, Some(ConnectionState::default()));

        monitor.unsubscribe();
        monitor.unsubscribe();
        assert_eq!(stream.next().await, None);
        assert_eq!(network.listener_count(), 0, "reachability listener released");

        network.set_online(false);
        assert_eq!(monitor.current().network_state, NetworkState::Connected);
    }
}
