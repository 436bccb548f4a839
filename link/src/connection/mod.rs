//! Socket ownership and transport plumbing.
//!
//! This module contains:
//! - [`transport`]: the [`Transport`]/[`Connector`] seams every socket goes through
//! - [`websocket`]: the production `graphql-ws` WebSocket connector
//! - [`memory`]: an in-process connector driven by a [`MemoryServer`]
//! - `backoff`: reconnect delay and jitter
//! - `lifecycle`: the background task that owns the one shared socket

mod backoff;
mod lifecycle;
pub mod memory;
pub mod transport;
pub mod websocket;

pub use memory::{MemoryConnection, MemoryConnector, MemoryServer};
pub use transport::{Connector, Transport, TransportFrame};
pub use websocket::{WebSocketConnector, GRAPHQL_WS_PROTOCOL};

pub(crate) use lifecycle::{LifecycleHandle, LinkCmd, LinkConfig};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Current time in millis since Unix epoch.
#[inline]
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
