//! Client lifecycle against a real server.

use std::sync::Arc;
use std::time::Duration;

use mirrorcast_client::{ClientConfig, ConnectionStatus, EventClient};
use mirrorcast_core::Event;
use mirrorcast_server::{EventProducer, EventServer, ServerConfig};
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout};

const TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    server: Arc<EventServer>,
    producer: EventProducer,
    port: u16,
}

async fn boot_server_on(port: u16) -> TestServer {
    let server = Arc::new(EventServer::new(ServerConfig {
        port,
        ..ServerConfig::default()
    }));
    let mut producer = EventProducer::new();
    server.bind_producer(&mut producer);
    let (addr, _handle) = server.listen().await.unwrap();
    TestServer {
        server,
        producer,
        port: addr.port(),
    }
}

/// Rebind `port` once the previous listener on it has been released.
async fn reboot_server_on(port: u16) -> TestServer {
    timeout(TIMEOUT, async {
        loop {
            let server = Arc::new(EventServer::new(ServerConfig {
                port,
                ..ServerConfig::default()
            }));
            if server.listen().await.is_ok() {
                return TestServer {
                    server,
                    producer: EventProducer::new(),
                    port,
                };
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("port never released")
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn fast_config(port: u16) -> ClientConfig {
    ClientConfig {
        reconnect_base_delay_ms: 50,
        reconnect_max_delay_ms: 200,
        connect_timeout_ms: 1_000,
        ..ClientConfig::new(format!("ws://127.0.0.1:{port}/ws"))
    }
}

async fn wait_status(client: &EventClient, status: ConnectionStatus) {
    timeout(TIMEOUT, client.wait_for(status))
        .await
        .unwrap_or_else(|_| panic!("never reached {status}"))
        .unwrap();
}

async fn wait_connections(server: &EventServer, n: usize) {
    timeout(TIMEOUT, async {
        while server.registry().len() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count never reached target");
}

/// Forward every dispatched event into a channel.
fn collect(client: &EventClient) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _ = client.on_message(move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

async fn next_of_type(rx: &mut mpsc::UnboundedReceiver<Event>, event_type: &str) -> Event {
    timeout(TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("dispatcher dropped");
            if event.event_type() == event_type {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {event_type} event"))
}

#[tokio::test]
async fn connects_and_dispatches_greeting() {
    let t = boot_server_on(0).await;
    let client = EventClient::spawn(fast_config(t.port)).unwrap();
    let mut events = collect(&client);

    wait_status(&client, ConnectionStatus::Connected).await;
    let greeting = next_of_type(&mut events, "connected").await;
    assert_eq!(
        greeting.get("message").unwrap(),
        "Connected to real-time event stream"
    );
    client.shutdown().await;
}

#[tokio::test]
async fn connect_while_connected_is_noop() {
    let t = boot_server_on(0).await;
    let client = EventClient::spawn(fast_config(t.port)).unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;
    wait_connections(&t.server, 1).await;

    let mut watch = client.status_watch();
    watch.mark_unchanged();
    client.connect().await.unwrap();
    client.connect().await.unwrap();

    assert!(!watch.has_changed().unwrap());
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(t.server.registry().len(), 1);
    client.shutdown().await;
}

#[tokio::test]
async fn subscription_filters_events() {
    let t = boot_server_on(0).await;
    let client = EventClient::spawn(fast_config(t.port)).unwrap();
    let mut events = collect(&client);
    wait_status(&client, ConnectionStatus::Connected).await;
    wait_connections(&t.server, 1).await;

    assert!(client.subscribe("acc1").await);
    assert_eq!(client.subscriptions().await, ["acc1"]);

    // Wait until the server has applied the subscription.
    let conn = t.server.registry().snapshot().pop().unwrap();
    timeout(TIMEOUT, async {
        while !conn.subscriptions().contains("acc1") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    t.producer.emit(&Event::new("trade_detected").with_source("acc2"));
    t.producer.emit(&Event::new("trade_detected").with_source("acc1"));

    let event = next_of_type(&mut events, "trade_detected").await;
    assert_eq!(event.source_account_id(), Some("acc1"));
    assert!(event.timestamp().is_some());

    assert!(client.unsubscribe("acc1").await);
    assert!(client.subscriptions().await.is_empty());
    client.shutdown().await;
}

#[tokio::test]
async fn subscribe_while_disconnected_returns_false() {
    let client = EventClient::spawn(ClientConfig {
        reconnect_base_delay_ms: 60_000,
        reconnect_max_delay_ms: 60_000,
        ..fast_config(free_port())
    })
    .unwrap();
    wait_status(&client, ConnectionStatus::Reconnecting).await;

    assert!(!client.subscribe("acc1").await);
    assert!(client.subscriptions().await.is_empty());
    client.shutdown().await;
}

#[tokio::test]
async fn connect_during_backoff_attempts_immediately() {
    let port = free_port();
    let client = EventClient::spawn(ClientConfig {
        reconnect_base_delay_ms: 60_000,
        reconnect_max_delay_ms: 60_000,
        ..fast_config(port)
    })
    .unwrap();
    wait_status(&client, ConnectionStatus::Reconnecting).await;

    let t = boot_server_on(port).await;
    client.connect().await.unwrap();
    assert_eq!(client.status(), ConnectionStatus::Connected);
    wait_connections(&t.server, 1).await;
    client.shutdown().await;
}

#[tokio::test]
async fn reconnects_after_server_restart_without_replaying() {
    let t = boot_server_on(0).await;
    let port = t.port;
    let client = EventClient::spawn(fast_config(port)).unwrap();
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let mut watch = client.status_watch();
    let seen = statuses.clone();
    let _watcher = tokio::spawn(async move {
        while watch.changed().await.is_ok() {
            seen.lock().push(*watch.borrow_and_update());
        }
    });

    wait_status(&client, ConnectionStatus::Connected).await;
    assert!(client.subscribe("acc1").await);

    t.server.shutdown().await;
    wait_status(&client, ConnectionStatus::Reconnecting).await;
    assert!(client.subscriptions().await.is_empty());

    let restarted = reboot_server_on(port).await;
    wait_status(&client, ConnectionStatus::Connected).await;
    wait_connections(&restarted.server, 1).await;

    let conn = restarted.server.registry().snapshot().pop().unwrap();
    assert!(conn.subscriptions().is_empty(), "subscriptions must not be replayed");
    assert!(statuses.lock().contains(&ConnectionStatus::Reconnecting));
    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_transport() {
    let t = boot_server_on(0).await;
    let client = EventClient::spawn(fast_config(t.port)).unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;
    wait_connections(&t.server, 1).await;

    client.shutdown().await;
    assert_eq!(client.status(), ConnectionStatus::Closed);
    wait_connections(&t.server, 0).await;

    // No reconnect after shutdown.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(t.server.registry().len(), 0);
    assert!(client.is_finished());
}

#[tokio::test]
async fn client_answers_server_heartbeat() {
    let server = Arc::new(EventServer::new(ServerConfig {
        heartbeat_interval_ms: 100,
        ..ServerConfig::default()
    }));
    let (addr, _handle) = server.listen().await.unwrap();
    let client = EventClient::spawn(fast_config(addr.port())).unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;
    wait_connections(&server, 1).await;

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(server.registry().len(), 1);
    assert_eq!(client.status(), ConnectionStatus::Connected);
    client.shutdown().await;
}

/// Accept one TCP connection and never answer the WebSocket handshake.
///
/// Signals once the connection is accepted and again when the peer hangs up.
async fn silent_listener() -> (u16, oneshot::Receiver<()>, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (accepted_tx, accepted) = oneshot::channel();
    let (hung_up_tx, hung_up) = oneshot::channel();
    let _ = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = accepted_tx.send(());
        let mut buf = [0u8; 1024];
        while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
        let _ = hung_up_tx.send(());
        // Keep the listener open so no retry is refused outright.
        std::future::pending::<()>().await;
    });
    (port, accepted, hung_up)
}

#[tokio::test]
async fn shutdown_abandons_stalled_handshake() {
    let (port, accepted, hung_up) = silent_listener().await;
    let client = EventClient::spawn(ClientConfig {
        connect_timeout_ms: 30_000,
        ..fast_config(port)
    })
    .unwrap();

    timeout(TIMEOUT, accepted).await.unwrap().unwrap();
    assert_eq!(client.status(), ConnectionStatus::Connecting);

    let started = Instant::now();
    timeout(Duration::from_secs(1), client.shutdown())
        .await
        .expect("shutdown waited on the connect timeout");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(client.status(), ConnectionStatus::Closed);

    // The half-open socket is dropped rather than completed later.
    timeout(TIMEOUT, hung_up).await.unwrap().unwrap();
    assert_eq!(client.status(), ConnectionStatus::Closed);
}

#[tokio::test]
async fn connect_joins_in_flight_attempt() {
    let (port, accepted, _hung_up) = silent_listener().await;
    let client = Arc::new(
        EventClient::spawn(ClientConfig {
            connect_timeout_ms: 300,
            reconnect_base_delay_ms: 60_000,
            reconnect_max_delay_ms: 60_000,
            ..fast_config(port)
        })
        .unwrap(),
    );
    timeout(TIMEOUT, accepted).await.unwrap().unwrap();

    // Resolves when the stalled attempt times out; no second attempt starts.
    timeout(TIMEOUT, client.connect()).await.unwrap().unwrap();
    assert_eq!(client.status(), ConnectionStatus::Reconnecting);
    assert_eq!(client.reconnect_attempts().await, 1);
    client.shutdown().await;
}

#[tokio::test]
async fn reconnect_counter_resets_after_connecting() {
    let port = free_port();
    let client = EventClient::spawn(ClientConfig {
        reconnect_base_delay_ms: 100,
        reconnect_max_delay_ms: 1_600,
        ..fast_config(port)
    })
    .unwrap();

    timeout(TIMEOUT, async {
        while client.reconnect_attempts().await < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("backoff never escalated");

    let t = boot_server_on(port).await;
    wait_status(&client, ConnectionStatus::Connected).await;
    assert_eq!(client.reconnect_attempts().await, 0);

    // The next outage starts again from the base delay.
    t.server.shutdown().await;
    wait_status(&client, ConnectionStatus::Reconnecting).await;
    assert_eq!(client.reconnect_attempts().await, 1);
    client.shutdown().await;
}
