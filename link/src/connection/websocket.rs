//! `graphql-ws` transport over tokio-tungstenite.
//!
//! The handshake headers travel base64-encoded in the `header` query
//! parameter of the connect URL, next to an empty JSON `payload`.

use super::transport::{Connector, Transport, TransportFrame};
use crate::error::{LinkError, Result};
use crate::event_handlers::DisconnectReason;
use crate::models::HandshakeInfo;
use base64::{engine::general_purpose, Engine as _};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// WebSocket sub-protocol requested on connect.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

/// Default cap on one inbound message (64 MiB).
const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 << 20;

/// Build the final connect URL from handshake info.
pub(crate) fn build_connect_url(info: &HandshakeInfo) -> Result<String> {
    let mut url = Url::parse(&info.connect_url).map_err(|e| {
        LinkError::WebSocketError(format!("invalid connect URL '{}': {}", info.connect_url, e))
    })?;
    let header_json = serde_json::to_string(&info.protocol_headers)?;
    url.query_pairs_mut()
        .append_pair("header", &general_purpose::STANDARD.encode(header_json))
        .append_pair("payload", &general_purpose::STANDARD.encode("{}"));
    Ok(url.to_string())
}

/// Connects real WebSockets.
///
/// Inbound messages above the size cap are rejected by tungstenite while
/// reading; the socket then counts as lost.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    max_message_bytes: usize,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .max_message_size(Some(self.max_message_bytes))
            .max_frame_size(Some(self.max_message_bytes))
    }
}

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, info: &HandshakeInfo) -> Result<Box<dyn Transport>> {
        let url = build_connect_url(info)?;
        let mut request = url.as_str().into_client_request().map_err(|e| {
            LinkError::WebSocketError(format!("Failed to build WebSocket request: {}", e))
        })?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(GRAPHQL_WS_PROTOCOL));

        log::debug!("[realtime-link] Connecting WebSocket to {}", info.connect_url);
        let config = Some(self.websocket_config());
        let (stream, _response) = tokio_tungstenite::connect_async_with_config(request, config, false)
            .await
            .map_err(|e| LinkError::WebSocketError(format!("Connection failed: {}", e)))?;
        Ok(Box::new(WebSocketTransport { stream }))
    }
}

struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| LinkError::WebSocketError(format!("Send failed: {}", e)))
    }

    async fn next_frame(&mut self) -> Option<Result<TransportFrame>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(TransportFrame::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(TransportFrame::Text(text))),
                    Err(_) => {
                        log::warn!("[realtime-link] Dropping non-UTF-8 binary frame");
                        continue;
                    },
                },
                Ok(Message::Close(frame)) => {
                    let reason = frame.map(|f| {
                        DisconnectReason::with_code(f.reason.as_str().to_owned(), f.code.into())
                    });
                    return Some(Ok(TransportFrame::Closed(reason)));
                },
                // tungstenite answers pings itself.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(LinkError::WebSocketError(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::time::Instant;

    #[test]
    fn test_message_cap_reaches_tungstenite_config() {
        let config = WebSocketConnector::new().websocket_config();
        assert_eq!(config.max_message_size, Some(DEFAULT_MAX_MESSAGE_BYTES));

        let config = WebSocketConnector::new().with_max_message_bytes(4096).websocket_config();
        assert_eq!(config.max_message_size, Some(4096));
        assert_eq!(config.max_frame_size, Some(4096));
    }

    #[test]
    fn test_connect_url_carries_encoded_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "api.example.com".to_string());
        let info = HandshakeInfo {
            connect_url: "wss://rt.example.com/graphql".into(),
            protocol_headers: headers,
            valid_until: Instant::now(),
        };

        let url = Url::parse(&build_connect_url(&info).unwrap()).unwrap();
        let pairs: BTreeMap<String, String> = url.query_pairs().into_owned().collect();

        let header = general_purpose::STANDARD.decode(&pairs["header"]).unwrap();
        let header: BTreeMap<String, String> = serde_json::from_slice(&header).unwrap();
        assert_eq!(header.get("host").map(String::as_str), Some("api.example.com"));
        assert_eq!(pairs["payload"], "e30=");
        assert_eq!(url.path(), "/graphql");
    }

    #[test]
    fn test_connect_url_rejects_garbage() {
        let info = HandshakeInfo {
            connect_url: "::not a url".into(),
            protocol_headers: BTreeMap::new(),
            valid_until: Instant::now(),
        };
        assert!(build_connect_url(&info).is_err());
    }
}
