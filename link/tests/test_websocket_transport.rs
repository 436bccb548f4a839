//! End-to-end over a real local WebSocket server.
//!
//! A tokio-tungstenite server on 127.0.0.1 plays the realtime endpoint:
//! it checks the `graphql-ws` sub-protocol and the encoded handshake
//! headers, then walks the client through init, start and data.

mod common;

use base64::{engine::general_purpose, Engine as _};
use futures_util::{SinkExt, StreamExt};
use realtime_link::{
    AuthProvider, ConnectionOptions, ManualReachability, RealtimeLinkClient, StaticHandshakeFetcher,
    SubscriptionEvent, WebSocketConnector, GRAPHQL_WS_PROTOCOL,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;

#[derive(Debug, Default)]
struct SeenUpgrade {
    protocol: Option<String>,
    header: BTreeMap<String, String>,
    payload: Option<String>,
}

fn inspect_upgrade(request: &Request) -> SeenUpgrade {
    let protocol = request
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let url = reqwest::Url::parse(&format!("ws://localhost{}", request.uri())).unwrap();
    let pairs: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
    let header = pairs
        .get("header")
        .map(|h| general_purpose::STANDARD.decode(h).unwrap())
        .map(|h| serde_json::from_slice(&h).unwrap())
        .unwrap_or_default();
    SeenUpgrade {
        protocol,
        header,
        payload: pairs.get("payload").cloned(),
    }
}

async fn recv_json(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
) -> Option<Value> {
    while let Some(msg) = ws.next().await {
        match msg.ok()? {
            Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

#[tokio::test]
async fn test_subscription_over_real_websocket() {
    common::init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut seen = None;
        let mut ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
                seen = Some(inspect_upgrade(request));
                response
                    .headers_mut()
                    .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(GRAPHQL_WS_PROTOCOL));
                Ok(response)
            },
        )
        .await
        .unwrap();
        let _ = seen_tx.send(seen.unwrap_or_default());

        let init = recv_json(&mut ws).await.unwrap();
        assert_eq!(init["type"], "connection_init");
        let ack = json!({ "type": "connection_ack", "payload": { "connectionTimeoutMs": 300000 } });
        ws.send(Message::Text(ack.to_string().into())).await.unwrap();

        let start = recv_json(&mut ws).await.unwrap();
        assert_eq!(start["type"], "start");
        let id = start["id"].as_str().unwrap().to_string();
        for frame in [
            json!({ "type": "start_ack", "id": id }),
            json!({ "type": "ka" }),
            json!({ "type": "data", "id": id, "payload": { "data": { "tick": 1 } } }),
            json!({ "type": "data", "id": id, "payload": { "data": { "tick": 2 } } }),
        ] {
            ws.send(Message::Text(frame.to_string().into())).await.unwrap();
        }

        let stop = recv_json(&mut ws).await.unwrap();
        assert_eq!(stop["type"], "stop");
        assert_eq!(stop["id"], id.as_str());
        // The client closes the idle socket after the stop.
        assert!(recv_json(&mut ws).await.is_none());
    });

    let client = RealtimeLinkClient::builder()
        .endpoint(format!("http://{}/graphql", addr))
        .auth(AuthProvider::api_key("da2-local"))
        .reachability(Arc::new(ManualReachability::with_initial(true)))
        .handshake_fetcher(Arc::new(
            StaticHandshakeFetcher::new(format!("ws://{}/graphql/realtime", addr))
                .with_header("host", addr.to_string()),
        ))
        .build()
        .unwrap();

    let mut sub = client.subscribe("subscription { tick }", None).await.unwrap();
    for expected in 1..=2 {
        match timeout(common::WAIT, sub.next()).await.unwrap() {
            Some(Ok(SubscriptionEvent::Data(payload))) => {
                assert_eq!(payload["data"]["tick"], expected)
            },
            other => panic!("expected data, got {:?}", other),
        }
    }

    let seen = seen_rx.await.unwrap();
    assert_eq!(seen.protocol.as_deref(), Some(GRAPHQL_WS_PROTOCOL));
    assert_eq!(seen.header.get("x-api-key").map(String::as_str), Some("da2-local"));
    assert_eq!(seen.header.get("host"), Some(&addr.to_string()));
    assert_eq!(seen.payload.as_deref(), Some("e30="));

    sub.close().await.unwrap();
    timeout(common::WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_refused_websocket_is_retried() {
    common::init_logging();
    // Bind and drop to get a port with nothing listening.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let client = RealtimeLinkClient::builder()
        .endpoint(format!("http://{}/graphql", addr))
        .reachability(Arc::new(ManualReachability::with_initial(true)))
        .handshake_fetcher(Arc::new(StaticHandshakeFetcher::new(format!("ws://{}/", addr))))
        .connection_options(
            realtime_link::ConnectionOptions::new()
                .with_reconnect_delay_ms(10)
                .with_max_reconnect_delay_ms(20)
                .with_max_reconnect_attempts(Some(2)),
        )
        .build()
        .unwrap();

    let mut sub = client.subscribe("subscription { tick }", None).await.unwrap();
    match timeout(common::WAIT, sub.next()).await.unwrap() {
        Some(Err(realtime_link::LinkError::ConnectionLost(_))) => {},
        other => panic!("expected connection lost after retries, got {:?}", other),
    }
}

type ServerSocket = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

/// Accept one `graphql-ws` socket and acknowledge its `connection_init`.
async fn accept_acked(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_hdr_async(
        stream,
        |_: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(GRAPHQL_WS_PROTOCOL));
            Ok(response)
        },
    )
    .await
    .unwrap();
    let init = recv_json(&mut ws).await.unwrap();
    assert_eq!(init["type"], "connection_init");
    let ack = json!({ "type": "connection_ack", "payload": { "connectionTimeoutMs": 300000 } });
    ws.send(Message::Text(ack.to_string().into())).await.unwrap();
    ws
}

async fn send_json(ws: &mut ServerSocket, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

#[tokio::test]
async fn test_oversized_message_drops_the_socket() {
    common::init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut ws = accept_acked(&listener).await;
        let start = recv_json(&mut ws).await.unwrap();
        let id = start["id"].as_str().unwrap().to_string();
        send_json(&mut ws, json!({ "type": "start_ack", "id": id })).await;
        let blob = "x".repeat(8 * 1024);
        send_json(&mut ws, json!({ "type": "data", "id": id, "payload": { "data": blob } })).await;

        // The client gives up on the first socket and opens a second one.
        let mut ws = accept_acked(&listener).await;
        let start = recv_json(&mut ws).await.unwrap();
        let id = start["id"].as_str().unwrap().to_string();
        assert_eq!(id, "2-1");
        send_json(&mut ws, json!({ "type": "start_ack", "id": id })).await;
        send_json(&mut ws, json!({ "type": "data", "id": id, "payload": { "data": "small" } })).await;
        ws
    });

    let client = RealtimeLinkClient::builder()
        .endpoint(format!("http://{}/graphql", addr))
        .reachability(Arc::new(ManualReachability::with_initial(true)))
        .handshake_fetcher(Arc::new(StaticHandshakeFetcher::new(format!("ws://{}/", addr))))
        .connector(Arc::new(WebSocketConnector::new().with_max_message_bytes(1024)))
        .connection_options(
            ConnectionOptions::new()
                .with_reconnect_delay_ms(10)
                .with_max_reconnect_delay_ms(20),
        )
        .build()
        .unwrap();

    let mut sub = client.subscribe("subscription { blob }", None).await.unwrap();
    match timeout(common::WAIT, sub.next()).await.unwrap() {
        Some(Ok(SubscriptionEvent::Data(payload))) => assert_eq!(payload["data"], "small"),
        other => panic!("expected only the small message, got {:?}", other),
    }
    let _ws = timeout(common::WAIT, server).await.unwrap().unwrap();
}
