//! Bounded handoff queue between the event producer and the relay broadcaster
//!
//! The producer and the broadcaster run on independent schedulers: the
//! producer usually owns its own thread and runtime, while the broadcaster
//! lives on the main multi-thread runtime. [`MessageBridge`] is the only
//! shared resource between them.
//!
//! # Guarantees
//!
//! - FIFO: messages are dequeued in the order they were enqueued
//! - No loss below capacity: a full queue suspends the publisher instead of dropping
//! - Single consumer: [`MessageBridge::subscribe`] succeeds exactly once
//! - Cancellable: the subscription ends when its cancellation token fires
//!
//! # Example Usage
//!
//! ```no_run
//! use relay_bridge::MessageBridge;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = MessageBridge::new(10_000)?;
//!     let publisher = bridge.publisher();
//!     let mut subscription = bridge.subscribe(CancellationToken::new())?;
//!
//!     // Producer thread with its own runtime
//!     std::thread::spawn(move || {
//!         publisher.publish_blocking("hello").ok();
//!     });
//!
//!     while let Some(message) = subscription.next().await {
//!         println!("{}", message);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod error;
pub mod message;

// Re-exports
pub use bridge::{Deliver, MessageBridge, Publisher, Subscription, DEFAULT_CAPACITY};
pub use error::{BridgeError, Result};
pub use message::Message;
