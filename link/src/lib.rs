//! # realtime-link
//!
//! Client-side transport for real-time push subscriptions.
//!
//! Any number of logical subscriptions share one WebSocket speaking the
//! `graphql-ws` start/stop protocol. The socket is opened lazily on the
//! first subscription after a short-lived authorization handshake, kept
//! alive by a server-advertised liveness window, re-established with
//! jittered exponential backoff when it drops (parked while the network is
//! offline), and closed when the last subscription goes away.
//!
//! ## Components
//!
//! - [`ReachabilityMonitor`]: fan-out of network online/offline signals
//! - [`ConnectionStatusMonitor`]: observable `{network, socket, intent}` state
//! - [`HandshakeCoordinator`]: handshake request bounded by a validity window
//! - socket lifecycle manager: a background task owning the shared socket
//! - [`Subscription`]: one logical push sequence multiplexed on that socket
//! - [`OperationContext`]: side-channel that carries handshake results to the socket
//!
//! ## Example
//!
//! ```rust,no_run
//! use realtime_link::{AuthProvider, RealtimeLinkClient, SubscriptionEvent};
//!
//! # async fn example() -> realtime_link::Result<()> {
//! let client = RealtimeLinkClient::builder()
//!     .endpoint("https://api.example.com/graphql")
//!     .auth(AuthProvider::api_key("da2-abcdef"))
//!     .build()?;
//!
//! let mut status = client.connection_status();
//! tokio::spawn(async move {
//!     while let Some(state) = status.next().await {
//!         log::info!("connection: {:?}", state);
//!     }
//! });
//!
//! let mut sub = client
//!     .subscribe(
//!         "subscription OnPost($room: ID!) { onPost(room: $room) { id text } }",
//!         Some(serde_json::json!({ "room": "lobby" })),
//!     )
//!     .await?;
//!
//! while let Some(event) = sub.next().await {
//!     match event? {
//!         SubscriptionEvent::Data(payload) => println!("{}", payload),
//!         SubscriptionEvent::Control(msg) => println!("control: {:?}", msg),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod connection;
pub mod connection_status;
pub mod context;
pub mod error;
pub mod event_handlers;
pub mod handshake;
pub mod models;
pub mod reachability;
pub mod subscription;
pub mod timeouts;

pub use auth::{ArcDynAuthProvider, AuthProvider, DynamicAuthProvider, ResolvedAuth};
pub use client::{RealtimeLinkClient, RealtimeLinkClientBuilder};
pub use connection::{
    Connector, MemoryConnection, MemoryConnector, MemoryServer, Transport, TransportFrame,
    WebSocketConnector, GRAPHQL_WS_PROTOCOL,
};
pub use connection_status::{ConnectionStatusMonitor, ConnectionStatusStream};
pub use context::{run_non_terminating, OperationContext};
pub use error::{LinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use handshake::{
    HandshakeCoordinator, HandshakeFetcher, HttpHandshakeFetcher, StaticHandshakeFetcher,
};
pub use models::{
    ClientMessage, ConnectionOptions, ConnectionState, ControlMessage, EndpointConfig,
    HandshakeInfo, HandshakeResponse, IntendedState, NetworkState, ServerMessage, SocketPhase,
    SocketState, SocketStatus, SubscriptionEvent, SubscriptionInfo, SubscriptionPhase,
    SubscriptionRequest,
};
pub use reachability::{
    detect_adapter, ListenerGuard, ManualReachability, NetworkStatus, ProbeReachability,
    ReachabilityAdapter, ReachabilityMonitor, ReachabilitySubscription,
};
pub use subscription::Subscription;
pub use timeouts::{LinkTimeouts, LinkTimeoutsBuilder};
