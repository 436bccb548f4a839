//! Transport seams.

use crate::error::Result;
use crate::event_handlers::DisconnectReason;
use crate::models::HandshakeInfo;

/// One inbound item from a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportFrame {
    Text(String),
    /// The peer closed the socket.
    Closed(Option<DisconnectReason>),
}

/// An open bidirectional text channel.
///
/// Only the lifecycle task touches a transport, so implementations need
/// not be `Sync`. `next_frame` must be cancel-safe: it is raced against
/// timers and commands.
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next inbound frame, or `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<TransportFrame>>;

    /// Close the socket. Best effort; errors are swallowed.
    async fn close(&mut self);
}

/// Opens transports from handshake results.
///
/// Each [`HandshakeInfo`] is used for exactly one `connect`.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, info: &HandshakeInfo) -> Result<Box<dyn Transport>>;
}
