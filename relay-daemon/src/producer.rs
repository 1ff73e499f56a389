//! Producer thread: runs an event source on its own runtime
//!
//! The event source never shares a scheduler with the broadcaster. It gets a
//! dedicated OS thread with a current-thread tokio runtime, and its only link
//! to the rest of the relay is the bridge [`Publisher`].

use anyhow::{Context, Result};
use relay_bridge::Publisher;
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::source::EventSource;

/// Start `source` on a new thread, publishing into the bridge until it is
/// exhausted or `cancel` fires
pub fn spawn_producer<S>(
    source: S,
    publisher: Publisher,
    cancel: CancellationToken,
) -> Result<JoinHandle<Result<usize>>>
where
    S: EventSource,
{
    let name = format!("producer-{}", source.name());

    std::thread::Builder::new()
        .name(name)
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to build producer runtime")?;

            info!("Event source {} started", source.name());
            let result = runtime.block_on(source.run(publisher, cancel));

            // A blocking stdin read must not keep the thread alive
            runtime.shutdown_background();

            match &result {
                Ok(delivered) => info!("Producer finished ({} events published)", delivered),
                Err(e) => error!("Producer failed: {:#}", e),
            }
            result
        })
        .context("Failed to spawn producer thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LineSource;
    use relay_bridge::MessageBridge;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_producer_runs_on_its_own_thread() {
        let bridge = MessageBridge::new(1).unwrap();
        let mut subscription = bridge.subscribe(CancellationToken::new()).unwrap();

        let input: &[u8] = b"a\nb\nc\n";
        let source = LineSource::new("fixture", BufReader::new(input));
        let handle = spawn_producer(source, bridge.publisher(), CancellationToken::new()).unwrap();

        // Capacity 1: the producer only gets ahead by one message
        for expected in ["a", "b", "c"] {
            assert_eq!(subscription.next().await.unwrap().as_str(), expected);
        }

        let delivered = tokio::task::spawn_blocking(move || handle.join().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered, 3);
    }
}
