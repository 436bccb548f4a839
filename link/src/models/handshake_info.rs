use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::time::Instant;

/// Body of the handshake HTTP response: `{url, header}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// WebSocket URL to connect to.
    pub url: String,
    /// Protocol headers to present when opening the socket and in every
    /// `start` message.
    #[serde(default)]
    pub header: BTreeMap<String, String>,
}

/// Short-lived connect authorization.
///
/// Produced once per open attempt and consumed by exactly one transport
/// open. It is never reused for a later socket.
#[derive(Debug, Clone)]
pub struct HandshakeInfo {
    pub connect_url: String,
    pub protocol_headers: BTreeMap<String, String>,
    /// The socket must be open before this instant.
    pub valid_until: Instant,
}

impl HandshakeInfo {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.valid_until
    }
}
