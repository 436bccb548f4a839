//! In-process transport.
//!
//! [`MemoryConnector::new`] returns a connector and the [`MemoryServer`]
//! that accepts its sockets. Each accepted [`MemoryConnection`] is driven
//! by hand: read what the client sent, push frames back, or close.
//!
//! ```rust,no_run
//! # async fn demo() {
//! use realtime_link::MemoryConnector;
//!
//! let (connector, mut server) = MemoryConnector::new();
//! // hand `connector` to the client builder, then:
//! let mut conn = server.accept().await.unwrap();
//! assert_eq!(conn.recv_json().await.unwrap()["type"], "connection_init");
//! conn.send_json(&serde_json::json!({"type": "connection_ack"}));
//! # }
//! ```

use super::transport::{Connector, Transport, TransportFrame};
use crate::error::{LinkError, Result};
use crate::event_handlers::DisconnectReason;
use crate::models::HandshakeInfo;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

enum ServerFrame {
    Text(String),
    Close(Option<DisconnectReason>),
}

/// Connector whose sockets end in a [`MemoryServer`].
#[derive(Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryConnection>,
    connects: Arc<AtomicUsize>,
    refusing: Arc<AtomicBool>,
}

impl std::fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnector")
            .field("connects", &self.connect_count())
            .field("refusing", &self.refusing.load(Ordering::SeqCst))
            .finish()
    }
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let connector = Self {
            accept_tx,
            connects: Arc::new(AtomicUsize::new(0)),
            refusing: Arc::new(AtomicBool::new(false)),
        };
        (connector, MemoryServer { accept_rx })
    }

    /// Make every subsequent connect fail until switched back.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Connect attempts so far, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, info: &HandshakeInfo) -> Result<Box<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(LinkError::WebSocketError("connection refused".into()));
        }

        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let connection = MemoryConnection {
            connect_url: info.connect_url.clone(),
            headers: info.protocol_headers.clone(),
            incoming: client_rx,
            outgoing: server_tx,
        };
        self.accept_tx
            .send(connection)
            .map_err(|_| LinkError::WebSocketError("memory server is gone".into()))?;

        Ok(Box::new(MemoryTransport {
            to_server: Some(client_tx),
            from_server: server_rx,
        }))
    }
}

/// Accepts sockets opened through a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryConnection>,
}

impl MemoryServer {
    /// Wait for the next socket. `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryConnection> {
        self.accept_rx.recv().await
    }

    pub fn try_accept(&mut self) -> Option<MemoryConnection> {
        self.accept_rx.try_recv().ok()
    }
}

/// Server end of one in-process socket.
#[derive(Debug)]
pub struct MemoryConnection {
    connect_url: String,
    headers: BTreeMap<String, String>,
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<ServerFrame>,
}

impl std::fmt::Debug for ServerFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(t) => write!(f, "Text({})", t),
            Self::Close(r) => write!(f, "Close({:?})", r),
        }
    }
}

impl MemoryConnection {
    pub fn connect_url(&self) -> &str {
        &self.connect_url
    }

    /// Protocol headers the client presented.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Next text frame from the client. `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        let text = self.recv().await?;
        serde_json::from_str(&text).ok()
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.incoming.try_recv().ok()
    }

    /// Push a text frame. Returns `false` if the client is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.outgoing.send(ServerFrame::Text(text.into())).is_ok()
    }

    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        self.send(value.to_string())
    }

    /// Close the socket from the server side.
    pub fn close(&self, reason: Option<DisconnectReason>) {
        let _ = self.outgoing.send(ServerFrame::Close(reason));
    }

    /// Whether the client has closed its end.
    pub fn is_client_closed(&self) -> bool {
        self.outgoing.is_closed()
    }
}

struct MemoryTransport {
    to_server: Option<mpsc::UnboundedSender<String>>,
    from_server: mpsc::UnboundedReceiver<ServerFrame>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        let tx = self
            .to_server
            .as_ref()
            .ok_or_else(|| LinkError::WebSocketError("transport closed".into()))?;
        tx.send(text)
            .map_err(|_| LinkError::WebSocketError("peer went away".into()))
    }

    async fn next_frame(&mut self) -> Option<Result<TransportFrame>> {
        match self.from_server.recv().await? {
            ServerFrame::Text(text) => Some(Ok(TransportFrame::Text(text))),
            ServerFrame::Close(reason) => Some(Ok(TransportFrame::Closed(reason))),
        }
    }

    async fn close(&mut self) {
        self.to_server = None;
        self.from_server.close();
    }
}
