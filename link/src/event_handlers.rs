//! Socket lifecycle hooks.
//!
//! Optional callbacks fired from the background lifecycle task:
//!
//! - [`on_connect`](EventHandlers::on_connect): socket open and `connection_ack` received
//! - [`on_disconnect`](EventHandlers::on_disconnect): socket closed or declared dead
//! - [`on_reconnect_scheduled`](EventHandlers::on_reconnect_scheduled): a reconnect attempt was planned
//! - [`on_error`](EventHandlers::on_error): connection or protocol errors
//! - [`on_receive`](EventHandlers::on_receive) / [`on_send`](EventHandlers::on_send): raw frame taps
//!
//! Callbacks run on the lifecycle task; keep them short and non-blocking.
//!
//! # Example
//!
//! ```rust
//! use realtime_link::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|| log::info!("socket up"))
//!     .on_disconnect(|reason| log::warn!("socket down: {}", reason))
//!     .on_reconnect_scheduled(|attempt, delay| {
//!         log::info!("reconnect #{} in {:?}", attempt, delay)
//!     });
//! assert!(handlers.has_any());
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Reason for a disconnect event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Human-readable description of why the socket closed.
    pub message: String,
    /// WebSocket close code, if the peer sent one.
    pub code: Option<u16>,
}

impl DisconnectReason {
    /// Disconnect reason without a close code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Disconnect reason carrying the peer's close code.
    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code: {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether the lifecycle manager will keep trying.
    pub recoverable: bool,
}

impl ConnectionError {
    /// Create a new connection error.
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
pub type OnReconnectCallback = Arc<dyn Fn(u32, Duration) + Send + Sync>;
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;
pub type OnFrameCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Socket lifecycle event handlers. All handlers are optional.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_reconnect_scheduled: Option<OnReconnectCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_receive: Option<OnFrameCallback>,
    pub(crate) on_send: Option<OnFrameCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_reconnect_scheduled", &self.on_reconnect_scheduled.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the socket is open and the server acknowledged the init.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Called when the socket closes, intentionally or not.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Called with `(attempt, delay)` whenever a reconnect attempt is scheduled.
    pub fn on_reconnect_scheduled(mut self, f: impl Fn(u32, Duration) + Send + Sync + 'static) -> Self {
        self.on_reconnect_scheduled = Some(Arc::new(f));
        self
    }

    /// Called on connection or protocol errors.
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Debug tap for every raw inbound text frame.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Debug tap for every raw outbound text frame.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_reconnect_scheduled.is_some()
            || self.on_error.is_some()
            || self.on_receive.is_some()
            || self.on_send.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_reconnect_scheduled(&self, attempt: u32, delay: Duration) {
        if let Some(cb) = &self.on_reconnect_scheduled {
            cb(attempt, delay);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            cb(raw);
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.on_send {
            cb(raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_empty_handlers() {
        let handlers = EventHandlers::new();
        assert!(!handlers.has_any());
        // Dispatch with nothing registered is a no-op.
        handlers.emit_connect();
        handlers.emit_disconnect(DisconnectReason::new("bye"));
    }

    #[test]
    fn test_dispatch_reaches_registered_callbacks() {
        let connects = Arc::new(AtomicU32::new(0));
        let attempts = Arc::new(AtomicU32::new(0));
        let c = connects.clone();
        let a = attempts.clone();
        let handlers = EventHandlers::new()
            .on_connect(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .on_reconnect_scheduled(move |attempt, _| {
                a.store(attempt, Ordering::SeqCst);
            });

        handlers.emit_connect();
        handlers.emit_connect();
        handlers.emit_reconnect_scheduled(3, Duration::from_millis(10));

        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::new("gone").to_string(), "gone");
        assert_eq!(
            DisconnectReason::with_code("going away", 1001).to_string(),
            "going away (code: 1001)"
        );
    }
}
