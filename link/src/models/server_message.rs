use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server-to-client protocol messages.
///
/// Message types this client does not know decode to
/// [`ServerMessage::Unknown`] so the caller can log and drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Socket accepted. Advertises the liveness window, either at the top
    /// level or inside `payload`.
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<ConnectionAckPayload>,
        #[serde(
            default,
            rename = "connectionTimeoutMs",
            skip_serializing_if = "Option::is_none"
        )]
        connection_timeout_ms: Option<u64>,
    },

    /// Socket refused during the init exchange.
    ConnectionError {
        #[serde(default)]
        payload: serde_json::Value,
    },

    /// A `start` was accepted.
    StartAck { id: String },

    /// One result for a subscription.
    Data {
        id: String,
        #[serde(default)]
        payload: serde_json::Value,
    },

    /// Terminal error. Id-less errors concern the socket, not a subscription.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        payload: serde_json::Value,
    },

    /// The server finished a subscription.
    Complete { id: String },

    /// Keep-alive.
    Ka,

    #[serde(other)]
    Unknown,
}

/// Payload of `connection_ack`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAckPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timeout_ms: Option<u64>,
}

impl ServerMessage {
    /// Decode a text frame.
    pub fn parse(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Subscription id the message is addressed to, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::StartAck { id } | Self::Data { id, .. } | Self::Complete { id } => Some(id),
            Self::Error { id, .. } => id.as_deref(),
            _ => None,
        }
    }

    /// Liveness window advertised by `connection_ack`, if any.
    pub fn keepalive_window(&self) -> Option<Duration> {
        match self {
            Self::ConnectionAck {
                payload,
                connection_timeout_ms,
            } => connection_timeout_ms
                .or_else(|| payload.as_ref().and_then(|p| p.connection_timeout_ms))
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            _ => None,
        }
    }
}
