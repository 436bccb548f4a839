//! Error types for realtime-link.

use thiserror::Error;

/// Errors produced by the subscription transport.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Invalid or missing configuration (fails fast at construction).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Credentials could not be resolved or were refused.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The auxiliary handshake request failed.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// The handshake (fetch + transport open) did not finish inside its window.
    #[error("Handshake timeout ({0:?})")]
    HandshakeTimeout(std::time::Duration),

    /// The server refused the connection with a `connection_error` message.
    #[error("Connection rejected by server: {0}")]
    ConnectionRejected(String),

    /// No `connection_ack` arrived after `connection_init`.
    #[error("Connection ack timeout ({0:?})")]
    AckTimeout(std::time::Duration),

    /// No `start_ack` arrived for a subscription.
    #[error("Subscribe timeout ({0:?})")]
    SubscribeTimeout(std::time::Duration),

    /// The socket was lost and could not be recovered.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The server terminated one subscription with an `error` message.
    #[error("Subscription {id} failed: {payload}")]
    SubscriptionError {
        /// Wire id the error was addressed to.
        id: String,
        /// Raw error payload sent by the server.
        payload: serde_json::Value,
    },

    /// Transport-level WebSocket failure.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// A message could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The peer or a pipeline stage violated the protocol contract.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// HTTP client failure during the handshake request.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The client (or its background task) has shut down.
    #[error("Link closed: {0}")]
    Closed(String),
}

impl LinkError {
    /// Open failures that are surfaced to the caller instead of retried.
    pub fn is_fatal_open(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationError(_)
                | Self::AuthenticationError(_)
                | Self::HandshakeFailed(_)
                | Self::HandshakeTimeout(_)
                | Self::ConnectionRejected(_)
                | Self::HttpError(_)
        )
    }

    /// Equivalent error for fanning one failure out to many subscriptions.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::ConfigurationError(m) => Self::ConfigurationError(m.clone()),
            Self::AuthenticationError(m) => Self::AuthenticationError(m.clone()),
            Self::HandshakeFailed(m) => Self::HandshakeFailed(m.clone()),
            Self::HandshakeTimeout(d) => Self::HandshakeTimeout(*d),
            Self::ConnectionRejected(m) => Self::ConnectionRejected(m.clone()),
            Self::AckTimeout(d) => Self::AckTimeout(*d),
            Self::SubscribeTimeout(d) => Self::SubscribeTimeout(*d),
            Self::ConnectionLost(m) => Self::ConnectionLost(m.clone()),
            Self::SubscriptionError { id, payload } => Self::SubscriptionError {
                id: id.clone(),
                payload: payload.clone(),
            },
            Self::WebSocketError(m) => Self::WebSocketError(m.clone()),
            Self::SerializationError(m) => Self::SerializationError(m.clone()),
            Self::ProtocolError(m) => Self::ProtocolError(m.clone()),
            Self::HttpError(e) => Self::HandshakeFailed(e.to_string()),
            Self::Closed(m) => Self::Closed(m.clone()),
        }
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

/// Result type for realtime-link operations.
pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fatal_open_classification() {
        assert!(LinkError::HandshakeFailed("403".into()).is_fatal_open());
        assert!(LinkError::HandshakeTimeout(Duration::from_secs(15)).is_fatal_open());
        assert!(LinkError::ConnectionRejected("unauthorized".into()).is_fatal_open());
        assert!(!LinkError::AckTimeout(Duration::from_secs(10)).is_fatal_open());
        assert!(!LinkError::ConnectionLost("eof".into()).is_fatal_open());
        assert!(!LinkError::WebSocketError("reset".into()).is_fatal_open());
    }

    #[test]
    fn test_subscription_error_display_includes_payload() {
        let err = LinkError::SubscriptionError {
            id: "1-4".into(),
            payload: serde_json::json!({"errors": [{"message": "boom"}]}),
        };
        let text = err.to_string();
        assert!(text.contains("1-4"));
        assert!(text.contains("boom"));
    }
}
