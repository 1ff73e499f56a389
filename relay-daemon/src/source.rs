//! Upstream event sources feeding the bridge

use anyhow::{Context, Result};
use relay_bridge::{BridgeError, Deliver, Message};
use std::borrow::Cow;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Something that produces events and hands each one to a [`Deliver`].
pub trait EventSource: Send + 'static {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Push events until exhausted or cancelled; returns how many were delivered
    fn run<D>(self, sink: D, cancel: CancellationToken) -> impl Future<Output = Result<usize>>
    where
        D: Deliver + 'static;
}

/// One message per non-empty line of text
pub struct LineSource<R> {
    name: String,
    reader: R,
}

impl LineSource<BufReader<Stdin>> {
    /// Read events from standard input
    pub fn stdin() -> Self {
        Self::new("stdin", BufReader::new(tokio::io::stdin()))
    }
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
        }
    }
}

impl<R> EventSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run<D>(self, sink: D, cancel: CancellationToken) -> Result<usize>
    where
        D: Deliver + 'static,
    {
        let Self { name, mut reader } = self;
        let mut buf = Vec::new();
        let mut delivered = 0usize;

        loop {
            buf.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = reader.read_until(b'\n', &mut buf) => read
                    .with_context(|| format!("Failed to read from {}", name))?,
            };

            if read == 0 {
                info!("Event source {} exhausted after {} events", name, delivered);
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            if let Cow::Owned(_) = line {
                warn!("Event source {} sent invalid UTF-8, replacing bad bytes", name);
            }

            let payload = line.trim_end_matches('\n').trim_end_matches('\r');
            if payload.trim().is_empty() {
                continue;
            }

            match sink.deliver(Message::from(payload)).await {
                Ok(()) => {
                    delivered += 1;
                    debug!("Event {} published ({} bytes)", delivered, payload.len());
                }
                Err(BridgeError::Closed) => {
                    info!("Relay closed, stopping event source {}", name);
                    break;
                }
                Err(e) => return Err(e).context("Failed to publish event"),
            }
        }

        Ok(delivered)
    }
}
