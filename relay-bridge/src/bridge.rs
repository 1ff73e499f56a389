use std::future::Future;
use std::sync::{Mutex, PoisonError};

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::message::Message;

/// Default number of messages the bridge holds before publishers suspend
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Capability the upstream event source is handed to push new events.
pub trait Deliver: Send + Sync {
    /// Hand one message to the relay, suspending while it applies backpressure.
    fn deliver(&self, message: Message) -> impl Future<Output = Result<()>> + Send;
}

/// Bounded FIFO handoff between the producer and the broadcaster.
///
/// The enqueue side ([`Publisher`]) may live on any thread or runtime. The
/// dequeue side ([`Subscription`]) can be taken exactly once.
pub struct MessageBridge {
    tx: mpsc::Sender<Message>,
    rx: Mutex<Option<mpsc::Receiver<Message>>>,
    capacity: usize,
}

impl MessageBridge {
    /// Create a bridge holding at most `capacity` pending messages
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BridgeError::InvalidCapacity(capacity));
        }
        Ok(Self::with_capacity_unchecked(capacity))
    }

    // `capacity` must be non-zero
    fn with_capacity_unchecked(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            capacity,
        }
    }

    /// Get an enqueue handle
    pub fn publisher(&self) -> Publisher {
        Publisher {
            tx: self.tx.clone(),
        }
    }

    /// Take the single dequeue handle.
    ///
    /// Cancelling `cancel` ends the sequence and releases any publisher
    /// suspended on a full queue with [`BridgeError::Closed`].
    pub fn subscribe(&self, cancel: CancellationToken) -> Result<Subscription> {
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(BridgeError::AlreadySubscribed)?;

        tracing::debug!("Bridge subscription taken (capacity {})", self.capacity);
        Ok(Subscription { rx, cancel })
    }

    /// Number of messages waiting to be dequeued
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MessageBridge {
    fn default() -> Self {
        Self::with_capacity_unchecked(DEFAULT_CAPACITY)
    }
}

/// Enqueue side of the bridge
#[derive(Clone)]
pub struct Publisher {
    tx: mpsc::Sender<Message>,
}

impl Publisher {
    /// Enqueue a message, suspending while the queue is full
    pub async fn publish(&self, message: impl Into<Message>) -> Result<()> {
        self.tx
            .send(message.into())
            .await
            .map_err(|_| BridgeError::Closed)
    }

    /// Enqueue from a plain OS thread, blocking it while the queue is full.
    ///
    /// Panics if called from within an async runtime; use [`Publisher::publish`] there.
    pub fn publish_blocking(&self, message: impl Into<Message>) -> Result<()> {
        self.tx
            .blocking_send(message.into())
            .map_err(|_| BridgeError::Closed)
    }

    /// Enqueue without waiting
    pub fn try_publish(&self, message: impl Into<Message>) -> Result<()> {
        self.tx.try_send(message.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BridgeError::Full(self.tx.max_capacity()),
            mpsc::error::TrySendError::Closed(_) => BridgeError::Closed,
        })
    }

    /// Whether the consuming side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Deliver for Publisher {
    fn deliver(&self, message: Message) -> impl Future<Output = Result<()>> + Send {
        self.publish(message)
    }
}

/// Dequeue side of the bridge: a lazy, non-restartable sequence of messages
pub struct Subscription {
    rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Next message in enqueue order.
    ///
    /// Suspends while the queue is empty. Returns `None` once cancelled, or
    /// once every publisher is gone and the queue is drained.
    pub async fn next(&mut self) -> Option<Message> {
        if self.cancel.is_cancelled() {
            self.release();
            return None;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.release();
                None
            }
            message = self.rx.recv() => message,
        }
    }

    /// Stop accepting new messages; pending ones can still be drained
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The same sequence as a [`Stream`]
    pub fn into_stream(self) -> impl Stream<Item = Message> + Send {
        stream::unfold(self, |mut subscription| async move {
            let message = subscription.next().await?;
            Some((message, subscription))
        })
    }

    fn release(&mut self) {
        self.rx.close();
        let mut dropped = 0usize;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!("Bridge cancelled with {} undelivered messages", dropped);
        }
    }
}
