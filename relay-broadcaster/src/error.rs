use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum BroadcasterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Broadcaster not started")]
    NotStarted,

    #[error("Broadcaster already running")]
    AlreadyRunning,

    #[error("Broadcaster has been shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, BroadcasterError>;

/// Why a single subscriber could not be reached.
///
/// Contained to that subscriber; never surfaced to the producer.
#[derive(Error, Debug)]
pub enum SendFailure {
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}
