//! Observable connection state through open, loss, recovery and teardown.

mod common;

use common::{expect_start, harness, start_ack, WAIT};
use realtime_link::{
    ConnectionState, ConnectionStatusStream, IntendedState, NetworkState, SocketStatus,
};
use tokio::time::timeout;

fn state(network: NetworkState, socket: SocketStatus, intent: IntendedState) -> ConnectionState {
    ConnectionState {
        network_state: network,
        connection_state: socket,
        intended_connection_state: intent,
    }
}

async fn next_state(stream: &mut ConnectionStatusStream) -> ConnectionState {
    timeout(WAIT, stream.next())
        .await
        .expect("a status update should arrive")
        .expect("status stream should stay open")
}

#[tokio::test]
async fn test_status_follows_open_and_idle_teardown() {
    use IntendedState as I;
    use NetworkState::Connected as Online;
    use SocketStatus as S;

    let mut h = harness();
    let mut stream = h.client.connection_status();
    assert_eq!(
        next_state(&mut stream).await,
        state(Online, S::Disconnected, I::Disconnected),
        "snapshot is replayed to new observers"
    );

    let sub = h.client.subscribe("subscription A { a }", None).await.unwrap();
    assert_eq!(next_state(&mut stream).await, state(Online, S::Connecting, I::Connected));

    let mut conn = h.accept_and_ack().await;
    assert_eq!(next_state(&mut stream).await, state(Online, S::Connected, I::Connected));
    let (id, _) = expect_start(&mut conn).await;
    start_ack(&conn, &id);

    drop(sub);
    assert_eq!(next_state(&mut stream).await, state(Online, S::Connected, I::Disconnected));
    assert_eq!(next_state(&mut stream).await, state(Online, S::Disconnected, I::Disconnected));
    assert!(stream.try_next().is_none(), "no duplicate emissions");
}

#[tokio::test(start_paused = true)]
async fn test_status_through_loss_and_recovery() {
    use IntendedState as I;
    use NetworkState::Connected as Online;
    use SocketStatus as S;

    let mut h = harness();
    let _sub = h.client.subscribe("subscription A { a }", None).await.unwrap();
    let mut conn = h.accept_and_ack().await;
    let (id, _) = expect_start(&mut conn).await;
    start_ack(&conn, &id);

    let mut stream = h.client.connection_status();
    assert_eq!(next_state(&mut stream).await, state(Online, S::Connected, I::Connected));

    conn.close(None);
    assert_eq!(
        next_state(&mut stream).await,
        state(Online, S::Disconnected, I::Connected),
        "intent survives an unexpected close"
    );
    assert_eq!(next_state(&mut stream).await, state(Online, S::Connecting, I::Connected));

    let _conn = h.accept_and_ack().await;
    assert_eq!(next_state(&mut stream).await, state(Online, S::Connected, I::Connected));
}

#[tokio::test]
async fn test_network_changes_leave_intent_alone() {
    let mut h = harness();
    let _sub = h.client.subscribe("subscription A { a }", None).await.unwrap();
    let mut conn = h.accept_and_ack().await;
    let (id, _) = expect_start(&mut conn).await;
    start_ack(&conn, &id);

    let mut stream = h.client.connection_status();
    let current = next_state(&mut stream).await;
    assert!(current.is_fully_connected());

    h.network.set_online(false);
    let offline = next_state(&mut stream).await;
    assert_eq!(offline.network_state, NetworkState::Disconnected);
    assert_eq!(offline.connection_state, SocketStatus::Connected, "socket is not touched");
    assert_eq!(offline.intended_connection_state, IntendedState::Connected);

    // Repeated and unknown platform values do not emit.
    h.network.set_online(false);
    h.network.report(None);
    h.network.set_online(true);
    let online = next_state(&mut stream).await;
    assert!(online.is_fully_connected());
    assert!(stream.try_next().is_none());
}

#[tokio::test]
async fn test_disconnect_ends_status_streams() {
    let mut h = harness();
    let _sub = h.client.subscribe("subscription A { a }", None).await.unwrap();
    let _conn = h.accept_and_ack().await;
    let mut stream = h.client.connection_status();
    next_state(&mut stream).await;

    h.client.disconnect().await.unwrap();
    let mut last = None;
    while let Some(s) = timeout(WAIT, stream.next()).await.unwrap() {
        last = Some(s);
    }
    let last = last.expect("disconnect emits a final state");
    assert_eq!(last.connection_state, SocketStatus::Disconnected);
    assert_eq!(last.intended_connection_state, IntendedState::Disconnected);
}
