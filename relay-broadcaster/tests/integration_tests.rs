use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relay_bridge::{Message as RelayMessage, MessageBridge};
use relay_broadcaster::{Broadcaster, BroadcasterConfig, BroadcasterError, SubscriberEvent};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn local_config() -> BroadcasterConfig {
    BroadcasterConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        send_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    ws
}

/// Wait until an event matching `predicate` shows up
async fn wait_for<F>(events: &mut broadcast::Receiver<SubscriberEvent>, predicate: F)
where
    F: Fn(&SubscriberEvent) -> bool,
{
    timeout(TIMEOUT, async {
        loop {
            let event = events.recv().await.unwrap();
            if predicate(&event) {
                break;
            }
        }
    })
    .await
    .expect("expected subscriber event never arrived");
}

async fn next_text(ws: &mut WsClient) -> String {
    let frame = timeout(TIMEOUT, ws.next())
        .await
        .expect("no message within timeout")
        .expect("connection ended")
        .unwrap();
    frame.into_text().unwrap().as_str().to_string()
}

#[tokio::test]
async fn test_broadcaster_lifecycle() {
    let broadcaster = Broadcaster::new(local_config());

    let addr = broadcaster.start().await.unwrap();
    assert!(addr.port() > 0);
    assert_eq!(broadcaster.local_addr().await, Some(addr));
    assert!(broadcaster.is_running().await);

    assert!(matches!(
        broadcaster.start().await,
        Err(BroadcasterError::AlreadyRunning)
    ));

    broadcaster.stop().await.unwrap();
    assert!(!broadcaster.is_running().await);
    assert!(matches!(
        broadcaster.start().await,
        Err(BroadcasterError::ShutDown)
    ));
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let first = Broadcaster::new(local_config());
    let addr = first.start().await.unwrap();

    let second = Broadcaster::new(BroadcasterConfig {
        bind_addr: addr.to_string(),
        ..local_config()
    });
    let result = second.start().await;
    assert!(matches!(result, Err(BroadcasterError::Bind { .. })));

    first.stop().await.unwrap();
}

#[tokio::test]
async fn test_end_to_end_relay() {
    let bridge = MessageBridge::new(2).unwrap();
    let publisher = bridge.publisher();
    let broadcaster = Arc::new(Broadcaster::new(local_config()));
    let mut events = broadcaster.events();

    let addr = broadcaster.start().await.unwrap();
    let subscription = bridge.subscribe(CancellationToken::new()).unwrap();
    let relay = tokio::spawn({
        let broadcaster = Arc::clone(&broadcaster);
        async move { broadcaster.run(subscription).await }
    });

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    wait_for(&mut events, |e| {
        matches!(e, SubscriberEvent::Connected { total: 2, .. })
    })
    .await;

    publisher.publish("hello").await.unwrap();
    assert_eq!(next_text(&mut a).await, "hello");
    assert_eq!(next_text(&mut b).await, "hello");

    a.close(None).await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SubscriberEvent::Disconnected { total: 1, .. })
    })
    .await;

    publisher.publish("world").await.unwrap();
    assert_eq!(next_text(&mut b).await, "world");
    assert_eq!(broadcaster.subscriber_count().await, 1);

    broadcaster.stop().await.unwrap();
    timeout(TIMEOUT, relay).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_no_replay_for_late_joiners() {
    let bridge = MessageBridge::new(8).unwrap();
    let publisher = bridge.publisher();
    let broadcaster = Arc::new(Broadcaster::new(local_config()));
    let mut events = broadcaster.events();

    let addr = broadcaster.start().await.unwrap();
    let subscription = bridge.subscribe(CancellationToken::new()).unwrap();
    tokio::spawn({
        let broadcaster = Arc::clone(&broadcaster);
        async move { broadcaster.run(subscription).await }
    });

    publisher.publish("before anyone").await.unwrap();

    // Wait until the loop has consumed and skipped it
    timeout(TIMEOUT, async {
        while broadcaster.stats().messages_skipped < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let mut late = connect(addr).await;
    wait_for(&mut events, |e| {
        matches!(e, SubscriberEvent::Connected { total: 1, .. })
    })
    .await;

    publisher.publish("after join").await.unwrap();
    assert_eq!(next_text(&mut late).await, "after join");

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_inbound_data_is_ignored() {
    let broadcaster = Broadcaster::new(local_config());
    let mut events = broadcaster.events();
    let addr = broadcaster.start().await.unwrap();

    let mut client = connect(addr).await;
    wait_for(&mut events, |e| matches!(e, SubscriberEvent::Connected { .. })).await;

    client.send(Message::text("chatter")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(broadcaster.subscriber_count().await, 1);

    let report = broadcaster.broadcast(&RelayMessage::from("still here")).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(next_text(&mut client).await, "still here");

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_churn_during_broadcast() {
    const MESSAGES: usize = 200;

    let bridge = MessageBridge::new(16).unwrap();
    let publisher = bridge.publisher();
    let broadcaster = Arc::new(Broadcaster::new(local_config()));
    let mut events = broadcaster.events();

    let addr = broadcaster.start().await.unwrap();
    let subscription = bridge.subscribe(CancellationToken::new()).unwrap();
    let relay = tokio::spawn({
        let broadcaster = Arc::clone(&broadcaster);
        async move { broadcaster.run(subscription).await }
    });

    let mut stable = connect(addr).await;
    wait_for(&mut events, |e| matches!(e, SubscriberEvent::Connected { .. })).await;

    // Subscribers joining and leaving while messages are in flight
    let churn = tokio::spawn(async move {
        for _ in 0..20 {
            let mut client = connect(addr).await;
            tokio::time::sleep(Duration::from_millis(2)).await;
            let _ = client.close(None).await;
        }
    });

    let producer = tokio::spawn(async move {
        for i in 0..MESSAGES {
            publisher.publish(format!("m{}", i)).await.unwrap();
        }
    });

    for i in 0..MESSAGES {
        assert_eq!(next_text(&mut stable).await, format!("m{}", i));
    }

    churn.await.unwrap();
    producer.await.unwrap();
    assert!(!relay.is_finished());

    timeout(TIMEOUT, async {
        while broadcaster.subscriber_count().await != 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("churned subscribers were not removed");

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_releases_subscribers() {
    let broadcaster = Broadcaster::new(local_config());
    let mut events = broadcaster.events();
    let addr = broadcaster.start().await.unwrap();

    let mut client = connect(addr).await;
    wait_for(&mut events, |e| matches!(e, SubscriberEvent::Connected { .. })).await;

    broadcaster.stop().await.unwrap();
    assert_eq!(broadcaster.subscriber_count().await, 0);

    // Close frame, end of stream or reset are all acceptable endings
    let ending = timeout(TIMEOUT, client.next()).await.unwrap();
    assert!(matches!(ending, Some(Ok(Message::Close(_))) | Some(Err(_)) | None));
}

#[tokio::test]
async fn test_shutdown_token_stops_run_loop() {
    let bridge = MessageBridge::new(4).unwrap();
    let process = CancellationToken::new();
    let broadcaster = Arc::new(Broadcaster::with_shutdown(local_config(), &process));

    let subscription = bridge.subscribe(process.clone()).unwrap();
    let relay = tokio::spawn({
        let broadcaster = Arc::clone(&broadcaster);
        async move { broadcaster.run(subscription).await }
    });

    process.cancel();
    timeout(TIMEOUT, relay).await.unwrap().unwrap();
    assert!(broadcaster.shutdown_token().is_cancelled());
}
