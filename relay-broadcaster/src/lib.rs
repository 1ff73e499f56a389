//! WebSocket fan-out server for the event relay
//!
//! This crate accepts WebSocket subscribers and pushes every message drained
//! from a [`relay_bridge::Subscription`] to all of them concurrently. A slow
//! or failing subscriber is dropped without delaying or affecting the others.
//!
//! # Features
//!
//! - TCP + WebSocket listener (default `0.0.0.0:8765`)
//! - Raw text frames, one message per frame, no application schema
//! - Concurrent per-message fan-out with a bounded per-subscriber send
//! - Subscriber lifecycle events (`connected`, `disconnected`, `failed`)
//! - Graceful shutdown via `tokio_util` cancellation tokens
//!
//! # Example Usage
//!
//! ```no_run
//! use relay_bridge::MessageBridge;
//! use relay_broadcaster::{Broadcaster, BroadcasterConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = MessageBridge::default();
//!     let publisher = bridge.publisher();
//!
//!     let broadcaster = Broadcaster::new(BroadcasterConfig::default());
//!     broadcaster.start().await?;
//!
//!     publisher.publish("hello").await?;
//!
//!     let subscription = bridge.subscribe(CancellationToken::new())?;
//!     broadcaster.run(subscription).await;
//!
//!     broadcaster.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod client;
pub mod error;
pub mod events;
pub mod stats;

// Re-exports
pub use broadcaster::{Broadcaster, BroadcasterConfig, DEFAULT_BIND_ADDR};
pub use client::{BoxSink, Subscriber, SubscriberId, SubscriberSet, WsMessage};
pub use error::{BroadcasterError, Result, SendFailure};
pub use events::SubscriberEvent;
pub use stats::{BroadcastReport, BroadcastStats};
