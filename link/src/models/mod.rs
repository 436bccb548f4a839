//! Data models for realtime-link.
//!
//! Wire envelopes exchanged over the socket, the handshake exchange, and
//! the state snapshots the client publishes.

pub mod client_message;
pub mod connection_options;
pub mod connection_state;
pub mod endpoint_config;
pub mod handshake_info;
pub mod server_message;
pub mod socket_state;
pub mod subscription_event;
pub mod subscription_info;
pub mod subscription_request;


pub use client_message::ClientMessage;
pub use connection_options::ConnectionOptions;
pub use connection_state::{ConnectionState, IntendedState, NetworkState, SocketStatus};
pub use endpoint_config::EndpointConfig;
pub use handshake_info::{HandshakeInfo, HandshakeResponse};
pub use server_message::{ConnectionAckPayload, ServerMessage};
pub use socket_state::{SocketPhase, SocketState};
pub use subscription_event::{ControlMessage, SubscriptionEvent};
pub use subscription_info::{SubscriptionInfo, SubscriptionPhase};
pub use subscription_request::{StartExtensions, StartPayload, SubscriptionRequest};
