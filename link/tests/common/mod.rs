//! Shared harness: a client wired to an in-process server.
//!
//! Every test gets its own [`MemoryServer`], a [`StaticHandshakeFetcher`]
//! and a [`ManualReachability`] it can flip on and off. Lifecycle callbacks
//! are recorded as short strings in [`Harness::events`].

#![allow(dead_code)]

use realtime_link::{
    AuthProvider, ConnectionOptions, EventHandlers, LinkTimeouts, ManualReachability,
    MemoryConnection, MemoryConnector, MemoryServer, RealtimeLinkClient, StaticHandshakeFetcher,
    Subscription, SubscriptionEvent,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

pub const ENDPOINT: &str = "https://realtime.test/graphql";
pub const CONNECT_URL: &str = "wss://realtime.test/graphql/realtime";

/// Upper bound for any single expected step.
pub const WAIT: Duration = Duration::from_secs(30);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Harness {
    pub client: RealtimeLinkClient,
    pub server: MemoryServer,
    pub connector: MemoryConnector,
    pub fetcher: StaticHandshakeFetcher,
    pub network: ManualReachability,
    pub events: Arc<Mutex<Vec<String>>>,
    /// Delay of every scheduled reconnect, in order.
    pub reconnect_delays: Arc<Mutex<Vec<Duration>>>,
}

pub fn harness() -> Harness {
    harness_with(LinkTimeouts::default(), ConnectionOptions::default())
}

pub fn harness_with(timeouts: LinkTimeouts, options: ConnectionOptions) -> Harness {
    init_logging();
    let (connector, server) = MemoryConnector::new();
    let fetcher = StaticHandshakeFetcher::new(CONNECT_URL).with_header("host", "realtime.test");
    let network = ManualReachability::with_initial(true);
    let events = Arc::new(Mutex::new(Vec::new()));
    let reconnect_delays = Arc::new(Mutex::new(Vec::new()));

    let client = RealtimeLinkClient::builder()
        .endpoint(ENDPOINT)
        .auth(AuthProvider::api_key("da2-test"))
        .timeouts(timeouts)
        .connection_options(options)
        .event_handlers(recording_handlers(&events, &reconnect_delays))
        .reachability(Arc::new(network.clone()))
        .connector(Arc::new(connector.clone()))
        .handshake_fetcher(Arc::new(fetcher.clone()))
        .build()
        .expect("client should build inside a runtime");

    Harness {
        client,
        server,
        connector,
        fetcher,
        network,
        events,
        reconnect_delays,
    }
}

fn recording_handlers(
    events: &Arc<Mutex<Vec<String>>>,
    delays: &Arc<Mutex<Vec<Duration>>>,
) -> EventHandlers {
    let on_connect = events.clone();
    let on_disconnect = events.clone();
    let on_reconnect = events.clone();
    let on_error = events.clone();
    let delays = delays.clone();
    EventHandlers::new()
        .on_connect(move || on_connect.lock().unwrap().push("connect".to_string()))
        .on_disconnect(move |reason| {
            on_disconnect.lock().unwrap().push(format!("disconnect: {}", reason))
        })
        .on_reconnect_scheduled(move |attempt, delay| {
            on_reconnect.lock().unwrap().push(format!("reconnect #{}", attempt));
            delays.lock().unwrap().push(delay);
        })
        .on_error(move |err| on_error.lock().unwrap().push(format!("error: {}", err)))
}

impl Harness {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_events(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    /// Wait for the next socket.
    pub async fn accept(&mut self) -> MemoryConnection {
        timeout(WAIT, self.server.accept())
            .await
            .expect("a socket should be opened")
            .expect("connector should be alive")
    }

    /// Accept the next socket and complete `connection_init`/`connection_ack`
    /// with a 5 minute keep-alive window.
    pub async fn accept_and_ack(&mut self) -> MemoryConnection {
        self.accept_and_ack_with(300_000).await
    }

    pub async fn accept_and_ack_with(&mut self, connection_timeout_ms: u64) -> MemoryConnection {
        let mut conn = self.accept().await;
        let init = next_frame(&mut conn).await;
        assert_eq!(init["type"], "connection_init", "first frame must be connection_init");
        conn.send_json(&json!({
            "type": "connection_ack",
            "payload": { "connectionTimeoutMs": connection_timeout_ms }
        }));
        conn
    }
}

/// Next frame the client sent, as JSON.
pub async fn next_frame(conn: &mut MemoryConnection) -> Value {
    timeout(WAIT, conn.recv_json())
        .await
        .expect("client should send a frame")
        .expect("client socket should be open")
}

/// Next frame, asserted to be a `start`. Returns `(id, decoded request)`.
pub async fn expect_start(conn: &mut MemoryConnection) -> (String, Value) {
    let frame = next_frame(conn).await;
    assert_eq!(frame["type"], "start", "expected start, got {}", frame);
    let id = frame["id"].as_str().expect("start carries an id").to_string();
    let data = frame["payload"]["data"].as_str().expect("start data is a JSON string");
    let request: Value = serde_json::from_str(data).expect("start data decodes");
    (id, request)
}

/// Next frame, asserted to be a `stop`. Returns its id.
pub async fn expect_stop(conn: &mut MemoryConnection) -> String {
    let frame = next_frame(conn).await;
    assert_eq!(frame["type"], "stop", "expected stop, got {}", frame);
    frame["id"].as_str().expect("stop carries an id").to_string()
}

pub fn start_ack(conn: &MemoryConnection, id: &str) {
    conn.send_json(&json!({ "type": "start_ack", "id": id }));
}

pub fn push_data(conn: &MemoryConnection, id: &str, payload: Value) {
    conn.send_json(&json!({ "type": "data", "id": id, "payload": payload }));
}

/// Next event, asserted to be data.
pub async fn next_data(sub: &mut Subscription) -> Value {
    match timeout(WAIT, sub.next()).await.expect("an event should arrive") {
        Some(Ok(SubscriptionEvent::Data(payload))) => payload,
        other => panic!("expected data, got {:?}", other),
    }
}
