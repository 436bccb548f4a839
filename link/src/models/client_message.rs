use serde::{Deserialize, Serialize};

use super::subscription_request::StartPayload;

/// Client-to-server protocol messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message on a fresh socket. The server answers with
    /// `connection_ack` or `connection_error`.
    ConnectionInit,

    /// Register a subscription under a wire id.
    Start {
        /// Wire id, unique per socket incarnation.
        id: String,
        /// Encoded request plus authorization extensions.
        payload: StartPayload,
    },

    /// Cancel a subscription. Never acknowledged.
    Stop {
        /// Wire id of the subscription to stop.
        id: String,
    },
}

impl ClientMessage {
    /// Encode for a text frame.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
