use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::client::SubscriberId;

/// Subscriber lifecycle transitions, published for diagnostics observers
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum SubscriberEvent {
    /// Handshake completed, subscriber is now receiving messages
    #[serde(rename = "connected")]
    Connected {
        subscriber: SubscriberId,
        peer: Option<String>,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// Inbound side closed cleanly or hit a transport error
    #[serde(rename = "disconnected")]
    Disconnected {
        subscriber: SubscriberId,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// A send failed or timed out; the subscriber was dropped
    #[serde(rename = "failed")]
    Failed {
        subscriber: SubscriberId,
        reason: String,
        total: usize,
        timestamp: DateTime<Utc>,
    },
}

impl SubscriberEvent {
    pub fn subscriber(&self) -> SubscriberId {
        match self {
            Self::Connected { subscriber, .. }
            | Self::Disconnected { subscriber, .. }
            | Self::Failed { subscriber, .. } => *subscriber,
        }
    }

    /// Subscriber count right after the transition
    pub fn total(&self) -> usize {
        match self {
            Self::Connected { total, .. }
            | Self::Disconnected { total, .. }
            | Self::Failed { total, .. } => *total,
        }
    }

    /// Convert event to JSON string with newline
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}
