use serde::{Deserialize, Serialize};

/// Platform network reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Connected,
    Disconnected,
}

/// Actual socket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketStatus {
    Connected,
    /// Only between an open attempt and its ack or failure.
    Connecting,
    Disconnected,
}

/// What the caller wants the socket to be, regardless of transient loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntendedState {
    Connected,
    Disconnected,
}

/// Snapshot published by the connection status monitor.
///
/// Equality is field-wise; the monitor publishes only when at least one
/// field differs from the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub network_state: NetworkState,
    pub connection_state: SocketStatus,
    pub intended_connection_state: IntendedState,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            network_state: NetworkState::Connected,
            connection_state: SocketStatus::Disconnected,
            intended_connection_state: IntendedState::Disconnected,
        }
    }
}

impl ConnectionState {
    /// Network up, socket acknowledged, and the caller wants it open.
    pub fn is_fully_connected(&self) -> bool {
        self.network_state == NetworkState::Connected
            && self.connection_state == SocketStatus::Connected
            && self.intended_connection_state == IntendedState::Connected
    }
}
