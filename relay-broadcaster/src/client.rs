use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use crate::error::SendFailure;

pub type WsMessage = tungstenite::Message;

/// Outbound half of a subscriber connection
pub type BoxSink = Pin<Box<dyn Sink<WsMessage, Error = tungstenite::Error> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Subscriber connection handle
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    peer: Option<SocketAddr>,
    connected_at: DateTime<Utc>,
    sink: Arc<Mutex<BoxSink>>,
    cancel: CancellationToken,
}

impl Subscriber {
    /// `cancel` fires when the subscriber leaves the set, stopping its lifecycle listener
    pub fn new(
        id: SubscriberId,
        peer: Option<SocketAddr>,
        sink: BoxSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer,
            connected_at: Utc::now(),
            sink: Arc::new(Mutex::new(sink)),
            cancel,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Send one frame, giving up after `timeout`
    pub async fn send(&self, frame: WsMessage, timeout: Duration) -> Result<(), SendFailure> {
        let send = async {
            let mut sink = self.sink.lock().await;
            sink.send(frame).await
        };

        match tokio::time::timeout(timeout, send).await {
            Ok(result) => result.map_err(SendFailure::from),
            Err(_) => Err(SendFailure::Timeout(timeout)),
        }
    }

    /// Best-effort close handshake
    pub async fn close(&self, timeout: Duration) {
        let close = async {
            let mut sink = self.sink.lock().await;
            sink.send(WsMessage::Close(None)).await?;
            sink.close().await
        };

        match tokio::time::timeout(timeout, close).await {
            Ok(Ok(())) => tracing::debug!("Subscriber {} closed", self.id),
            Ok(Err(e)) => tracing::debug!("Subscriber {} close failed: {}", self.id, e),
            Err(_) => tracing::debug!("Subscriber {} close timed out", self.id),
        }
    }
}

/// Live subscriber set, safe under concurrent insert/remove during a fan-out
#[derive(Clone, Default)]
pub struct SubscriberSet {
    subscribers: Arc<RwLock<HashMap<SubscriberId, Subscriber>>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber, returning the new total
    pub async fn insert(&self, subscriber: Subscriber) -> usize {
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(subscriber.id, subscriber);
        subscribers.len()
    }

    /// Remove a subscriber and cancel its listener.
    ///
    /// Only the first caller for a given id gets `Some`, with the remaining total.
    pub async fn remove(&self, id: SubscriberId) -> Option<(Subscriber, usize)> {
        let mut subscribers = self.subscribers.write().await;
        let removed = subscribers.remove(&id)?;
        removed.cancel.cancel();
        Some((removed, subscribers.len()))
    }

    /// Copy of the current members; later inserts and removes do not affect it
    pub async fn snapshot(&self) -> Vec<Subscriber> {
        self.subscribers.read().await.values().cloned().collect()
    }

    /// Remove every member, cancelling all listeners
    pub async fn drain(&self) -> Vec<Subscriber> {
        let mut subscribers = self.subscribers.write().await;
        subscribers
            .drain()
            .map(|(_, subscriber)| {
                subscriber.cancel.cancel();
                subscriber
            })
            .collect()
    }

    pub async fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }
}
