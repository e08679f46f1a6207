use super::*;

use axum::{
    extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade},
    routing::get,
    Router,
};
use tokio::{net::TcpListener, time::timeout};

const WAIT: Duration = Duration::from_secs(5);

/// Binds a fake gateway on an ephemeral port. Accepted sockets are handed to
/// the test through the channel so each test drives its side directly.
async fn spawn_gateway() -> (String, mpsc::Receiver<WebSocket>, JoinHandle<()>) {
    let (accepted_tx, accepted_rx) = mpsc::channel::<WebSocket>(4);
    let app = Router::new().route(
        "/ws",
        get(move |upgrade: WebSocketUpgrade| {
            let accepted_tx = accepted_tx.clone();
            async move {
                upgrade.on_upgrade(move |socket| async move {
                    let _ = accepted_tx.send(socket).await;
                })
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://{addr}/ws"), accepted_rx, server)
}

fn fast_config(url: String) -> TransportConfig {
    TransportConfig {
        url,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(100),
        ..TransportConfig::default()
    }
}

async fn wait_for_status(rx: &mut watch::Receiver<ConnectionStatus>, want: ConnectionStatus) {
    timeout(WAIT, async {
        loop {
            if *rx.borrow_and_update() == want {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never reached {want:?}"));
}

#[test]
fn backoff_doubles_and_caps_at_thirty_seconds() {
    let config = TransportConfig::default();
    let expected = [1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000];
    for (attempts, millis) in expected.into_iter().enumerate() {
        assert_eq!(
            reconnect_delay(attempts as u32, &config),
            Duration::from_millis(millis),
            "attempt {attempts}"
        );
    }
    // huge attempt counts must not overflow past the cap
    assert_eq!(reconnect_delay(u32::MAX, &config), Duration::from_secs(30));
}

#[tokio::test]
async fn connect_is_idempotent_and_disconnect_is_too() {
    let (url, mut accepted, _server) = spawn_gateway().await;
    let manager = ConnectionManager::new(fast_config(url));
    let mut status = manager.subscribe_status();
    assert_eq!(*status.borrow(), ConnectionStatus::Disconnected);

    manager.connect().await;
    manager.connect().await;
    wait_for_status(&mut status, ConnectionStatus::Connected).await;

    let _socket = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    // the second connect() must not have opened a second socket
    assert!(accepted.try_recv().is_err());

    manager.disconnect().await;
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    manager.disconnect().await;
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn forwards_inbound_text_frames_in_order() {
    let (url, mut accepted, _server) = spawn_gateway().await;
    let manager = ConnectionManager::new(fast_config(url));
    let mut messages = manager.subscribe_messages();
    let mut status = manager.subscribe_status();

    manager.connect().await;
    wait_for_status(&mut status, ConnectionStatus::Connected).await;
    let mut socket = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();

    socket.send(WsFrame::Text("frame-1".into())).await.unwrap();
    socket.send(WsFrame::Text("frame-2".into())).await.unwrap();

    assert_eq!(timeout(WAIT, messages.recv()).await.unwrap().unwrap(), "frame-1");
    assert_eq!(timeout(WAIT, messages.recv()).await.unwrap().unwrap(), "frame-2");

    manager.disconnect().await;
}

#[tokio::test]
async fn send_delivers_when_open_and_drops_when_closed() {
    let (url, mut accepted, _server) = spawn_gateway().await;
    let manager = ConnectionManager::new(fast_config(url));

    // not connected yet: dropped silently, no panic
    manager.send("lost-frame").await;

    let mut status = manager.subscribe_status();
    manager.connect().await;
    wait_for_status(&mut status, ConnectionStatus::Connected).await;
    let mut socket = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();

    manager.send("ping-frame").await;
    let frame = timeout(WAIT, socket.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame, WsFrame::Text("ping-frame".into()));

    manager.disconnect().await;
    manager.send("also-lost").await;
}

#[tokio::test]
async fn reconnects_with_backoff_after_the_server_drops() {
    let (url, mut accepted, _server) = spawn_gateway().await;
    // long enough for the Reconnecting phase to be observable
    let config = TransportConfig {
        initial_backoff: Duration::from_millis(200),
        ..fast_config(url)
    };
    let manager = ConnectionManager::new(config);
    let mut status = manager.subscribe_status();

    manager.connect().await;
    wait_for_status(&mut status, ConnectionStatus::Connected).await;

    let socket = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    drop(socket);

    wait_for_status(&mut status, ConnectionStatus::Reconnecting).await;
    wait_for_status(&mut status, ConnectionStatus::Connected).await;
    let _second = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();

    manager.disconnect().await;
}

#[tokio::test]
async fn rapid_socket_drops_schedule_one_reconnect_at_a_time() {
    let (url, mut accepted, _server) = spawn_gateway().await;
    let config = TransportConfig {
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_millis(100),
        ..fast_config(url)
    };
    let manager = ConnectionManager::new(config);
    manager.connect().await;

    // kill every connection the moment it lands and count how many the
    // manager opens inside the window
    let window = Duration::from_millis(450);
    let started = tokio::time::Instant::now();
    let mut connections = 0u32;
    loop {
        let Some(remaining) = window.checked_sub(started.elapsed()) else {
            break;
        };
        match timeout(remaining, accepted.recv()).await {
            Ok(Some(socket)) => {
                drop(socket);
                connections += 1;
            }
            _ => break,
        }
    }

    // a single supervisor loop means a single pending backoff sleep, so
    // repeated closes inside the window cannot stack reconnect timers:
    // at most one new connection per 100ms backoff plus the initial one
    assert!(connections >= 2, "expected repeated reconnects, got {connections}");
    assert!(connections <= 6, "reconnect timers stacked: {connections} connections in 450ms");

    manager.disconnect().await;
}

#[tokio::test]
async fn frames_sent_while_the_socket_is_down_are_not_replayed() {
    let (url, mut accepted, _server) = spawn_gateway().await;
    let config = TransportConfig {
        initial_backoff: Duration::from_millis(200),
        ..fast_config(url)
    };
    let manager = ConnectionManager::new(config);
    let mut status = manager.subscribe_status();

    manager.connect().await;
    wait_for_status(&mut status, ConnectionStatus::Connected).await;
    let socket = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    drop(socket);
    wait_for_status(&mut status, ConnectionStatus::Reconnecting).await;

    // no queueing: this frame is dropped, not held for the next socket
    manager.send("stale-frame").await;

    wait_for_status(&mut status, ConnectionStatus::Connected).await;
    let mut second = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    manager.send("fresh-frame").await;
    let frame = timeout(WAIT, second.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame, WsFrame::Text("fresh-frame".into()));

    manager.disconnect().await;
}

#[tokio::test]
async fn becomes_unreachable_once_the_retry_budget_is_spent() {
    // grab an ephemeral port and release it so connects are refused
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = TransportConfig {
        url: format!("ws://{addr}/ws"),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        max_reconnect_attempts: 2,
        ..TransportConfig::default()
    };
    let manager = ConnectionManager::new(config);
    let mut status = manager.subscribe_status();

    manager.connect().await;
    wait_for_status(&mut status, ConnectionStatus::Unreachable).await;

    // only an explicit connect resumes retrying
    manager.connect().await;
    assert_ne!(manager.status(), ConnectionStatus::Unreachable);
    manager.disconnect().await;
}

#[tokio::test]
async fn late_status_subscriber_sees_the_current_value() {
    let (url, mut accepted, _server) = spawn_gateway().await;
    let manager = ConnectionManager::new(fast_config(url));
    let mut status = manager.subscribe_status();

    manager.connect().await;
    wait_for_status(&mut status, ConnectionStatus::Connected).await;
    let _socket = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();

    let late = manager.subscribe_status();
    assert_eq!(*late.borrow(), ConnectionStatus::Connected);

    manager.disconnect().await;
}
