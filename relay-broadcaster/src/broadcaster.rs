use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::{Stream, StreamExt};
use relay_bridge::{Message, Subscription};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use crate::client::{Subscriber, SubscriberId, SubscriberSet, WsMessage};
use crate::error::{BroadcasterError, Result};
use crate::events::SubscriberEvent;
use crate::stats::{BroadcastReport, BroadcastStats, StatsCounters};

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8765";

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Broadcaster configuration
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// `host:port` to listen on
    pub bind_addr: String,
    /// Upper bound on a single subscriber send
    pub send_timeout: Duration,
    /// Upper bound on the WebSocket handshake of a new connection
    pub handshake_timeout: Duration,
    /// Upper bound on the close handshake at shutdown
    pub close_timeout: Duration,
    /// Lifecycle events buffered for slow observers
    pub event_capacity: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            send_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(1),
            event_capacity: 256,
        }
    }
}

/// State shared with the accept loop and every lifecycle listener
#[derive(Clone)]
struct ConnectionContext {
    subscribers: SubscriberSet,
    events: broadcast::Sender<SubscriberEvent>,
    next_id: Arc<AtomicU64>,
    shutdown: CancellationToken,
    handshake_timeout: Duration,
}

impl ConnectionContext {
    fn emit(&self, event: SubscriberEvent) {
        // No observers is fine
        let _ = self.events.send(event);
    }
}

/// Fans every bridge message out to the connected WebSocket subscribers
pub struct Broadcaster {
    config: BroadcasterConfig,
    context: ConnectionContext,
    stats: Arc<StatsCounters>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: RwLock<Option<SocketAddr>>,
}

impl Broadcaster {
    /// Create new broadcaster
    pub fn new(config: BroadcasterConfig) -> Self {
        Self::with_shutdown(config, &CancellationToken::new())
    }

    /// Create a broadcaster that also stops when `parent` is cancelled
    pub fn with_shutdown(config: BroadcasterConfig, parent: &CancellationToken) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let context = ConnectionContext {
            subscribers: SubscriberSet::new(),
            events,
            next_id: Arc::new(AtomicU64::new(1)),
            shutdown: parent.child_token(),
            handshake_timeout: config.handshake_timeout,
        };

        Self {
            config,
            context,
            stats: Arc::new(StatsCounters::default()),
            accept_task: Mutex::new(None),
            local_addr: RwLock::new(None),
        }
    }

    /// Bind the listener and start accepting subscribers.
    ///
    /// A bind failure is fatal for the relay and is returned as [`BroadcasterError::Bind`].
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.context.shutdown.is_cancelled() {
            return Err(BroadcasterError::ShutDown);
        }

        let mut accept_task = self.accept_task.lock().await;
        if accept_task.is_some() {
            return Err(BroadcasterError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|source| BroadcasterError::Bind {
                addr: self.config.bind_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.write().await = Some(local_addr);

        tracing::info!("Relay broadcaster listening on ws://{}", local_addr);

        let context = self.context.clone();
        *accept_task = Some(tokio::spawn(accept_loop(listener, context)));

        Ok(local_addr)
    }

    /// Stop accepting, close every subscriber and empty the set
    pub async fn stop(&self) -> Result<()> {
        let Some(task) = self.accept_task.lock().await.take() else {
            return Err(BroadcasterError::NotStarted);
        };

        self.context.shutdown.cancel();
        if let Err(e) = task.await {
            tracing::warn!("Accept task ended abnormally: {}", e);
        }

        let remaining = self.context.subscribers.drain().await;
        let released = remaining.len();
        join_all(
            remaining
                .iter()
                .map(|subscriber| subscriber.close(self.config.close_timeout)),
        )
        .await;

        tracing::info!("Relay broadcaster stopped ({} subscribers released)", released);
        Ok(())
    }

    /// Drain the bridge, broadcasting each message, until the subscription
    /// ends or the broadcaster shuts down
    pub async fn run(&self, mut subscription: Subscription) {
        tracing::info!("Broadcast loop started");

        loop {
            let message = tokio::select! {
                _ = self.context.shutdown.cancelled() => break,
                next = subscription.next() => match next {
                    Some(message) => message,
                    None => break,
                },
            };

            self.broadcast(&message).await;
        }

        tracing::info!("Broadcast loop stopped");
    }

    /// Send one message to every current subscriber concurrently.
    ///
    /// Returns once every send has settled. Failed subscribers are removed;
    /// their failures never reach the caller.
    pub async fn broadcast(&self, message: &Message) -> BroadcastReport {
        let recipients = self.context.subscribers.snapshot().await;

        if recipients.is_empty() {
            tracing::debug!("No subscribers, skipping message ({} bytes)", message.len());
            let report = BroadcastReport::default();
            self.stats.record(&report);
            return report;
        }

        let frame = WsMessage::text(message.as_str());
        let timeout = self.config.send_timeout;

        let outcomes = join_all(recipients.iter().map(|subscriber| {
            let frame = frame.clone();
            async move { (subscriber.id(), subscriber.send(frame, timeout).await) }
        }))
        .await;

        let mut report = BroadcastReport {
            recipients: recipients.len(),
            ..Default::default()
        };

        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(failure) => {
                    report.failed += 1;
                    tracing::warn!("Failed to send to subscriber {}: {}", id, failure);

                    if let Some((_, total)) = self.context.subscribers.remove(id).await {
                        tracing::info!("Removed failed subscriber {}. Remaining: {}", id, total);
                        self.context.emit(SubscriberEvent::Failed {
                            subscriber: id,
                            reason: failure.to_string(),
                            total,
                            timestamp: Utc::now(),
                        });
                    }
                }
            }
        }

        tracing::debug!(
            "Broadcast {} bytes: {}/{} delivered",
            message.len(),
            report.delivered,
            report.recipients
        );
        self.stats.record(&report);
        report
    }

    /// Get current subscriber count
    pub async fn subscriber_count(&self) -> usize {
        self.context.subscribers.len().await
    }

    /// The live subscriber set
    pub fn subscribers(&self) -> &SubscriberSet {
        &self.context.subscribers
    }

    /// Receive subscriber lifecycle events from now on
    pub fn events(&self) -> broadcast::Receiver<SubscriberEvent> {
        self.context.events.subscribe()
    }

    pub fn stats(&self) -> BroadcastStats {
        self.stats.snapshot()
    }

    /// Address actually bound, once started
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    /// Token cancelled when this broadcaster shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.context.shutdown.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.accept_task.lock().await.is_some() && !self.context.shutdown.is_cancelled()
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        // Release the accept loop and every listener
        self.context.shutdown.cancel();
    }
}

async fn accept_loop(listener: TcpListener, context: ConnectionContext) {
    loop {
        let accepted = tokio::select! {
            _ = context.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                tracing::debug!("Accepted TCP connection from {}", peer);
                tokio::spawn(handle_connection(stream, peer, context.clone()));
            }
            Err(e) => {
                tracing::error!("Failed to accept subscriber: {}", e);
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
    tracing::info!("Subscriber acceptance task stopped");
}

/// Handshake, join the set, then wait for the connection to close
async fn handle_connection(stream: TcpStream, peer: SocketAddr, context: ConnectionContext) {
    let handshake = tokio::select! {
        _ = context.shutdown.cancelled() => return,
        result = tokio::time::timeout(
            context.handshake_timeout,
            tokio_tungstenite::accept_async(stream),
        ) => result,
    };

    let ws = match handshake {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            tracing::warn!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
        Err(_) => {
            tracing::warn!("WebSocket handshake with {} timed out", peer);
            return;
        }
    };

    let (sink, inbound) = ws.split();
    let id = SubscriberId::new(context.next_id.fetch_add(1, Ordering::Relaxed));
    let cancel = context.shutdown.child_token();
    let subscriber = Subscriber::new(id, Some(peer), Box::pin(sink), cancel.clone());

    let total = context.subscribers.insert(subscriber).await;
    tracing::info!("New subscriber {} connected from {}. Total: {}", id, peer, total);
    context.emit(SubscriberEvent::Connected {
        subscriber: id,
        peer: Some(peer.to_string()),
        total,
        timestamp: Utc::now(),
    });

    watch_inbound(id, inbound, cancel, &context).await;
}

/// Consume inbound frames only to detect closure; their content is discarded
async fn watch_inbound<S>(
    id: SubscriberId,
    mut inbound: S,
    cancel: CancellationToken,
    context: &ConnectionContext,
) where
    S: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            // Removed after a failed send, or shutting down
            _ = cancel.cancelled() => break,
            frame = inbound.next() => frame,
        };

        match frame {
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!("Subscriber {} transport error: {}", id, e);
                break;
            }
        }
    }

    if let Some((_, total)) = context.subscribers.remove(id).await {
        tracing::info!("Subscriber {} disconnected. Total: {}", id, total);
        context.emit(SubscriberEvent::Disconnected {
            subscriber: id,
            total,
            timestamp: Utc::now(),
        });
    }
}
