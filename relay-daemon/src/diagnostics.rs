//! Subscriber lifecycle logging

use relay_broadcaster::SubscriberEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Log every subscriber lifecycle event as a JSON line at debug level
pub fn spawn_event_logger(
    mut events: broadcast::Receiver<SubscriberEvent>,
    cancel: CancellationToken,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut seen = 0usize;
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(event) => {
                    seen += 1;
                    match event.to_json_line() {
                        Ok(line) => debug!("subscriber event: {}", line.trim_end()),
                        Err(e) => warn!("Failed to serialize subscriber event: {}", e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event logger lagged, {} subscriber events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        seen
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_broadcaster::SubscriberId;

    #[tokio::test]
    async fn test_logger_counts_until_cancelled() {
        let (tx, rx) = broadcast::channel(8);
        let cancel = CancellationToken::new();
        let logger = spawn_event_logger(rx, cancel.clone());

        tx.send(SubscriberEvent::Disconnected {
            subscriber: SubscriberId::new(1),
            total: 0,
            timestamp: Default::default(),
        })
        .unwrap();
        drop(tx);

        assert_eq!(logger.await.unwrap(), 1);
    }
}
