use serde::{Deserialize, Serialize};

/// Lifecycle phase of the shared socket.
///
/// `Closed → Connecting → Open → Closing → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketPhase {
    #[default]
    Closed,
    Connecting,
    Open,
    Closing,
}

/// Read-only snapshot of the socket owned by the lifecycle manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketState {
    pub phase: SocketPhase,
    /// Millis since Unix epoch of the last inbound message, while open.
    pub last_liveness_at_ms: Option<u64>,
    /// Consecutive reconnect attempts since the last successful open.
    pub reconnect_attempt: u32,
    /// Incremented every time a new socket is opened.
    pub incarnation: u64,
}
