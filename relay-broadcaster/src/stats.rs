use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Outcome of fanning one message out to the subscriber set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Subscribers in the snapshot taken when the fan-out began
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn is_skipped(&self) -> bool {
        self.recipients == 0
    }
}

/// Point-in-time copy of the broadcaster counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastStats {
    pub messages_received: u64,
    pub messages_broadcast: u64,
    pub messages_skipped: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
}

#[derive(Default)]
pub(crate) struct StatsCounters {
    received: AtomicU64,
    broadcast: AtomicU64,
    skipped: AtomicU64,
    deliveries: AtomicU64,
    failures: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record(&self, report: &BroadcastReport) {
        self.received.fetch_add(1, Ordering::Relaxed);
        if report.is_skipped() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.broadcast.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.failures.fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BroadcastStats {
        BroadcastStats {
            messages_received: self.received.load(Ordering::Relaxed),
            messages_broadcast: self.broadcast.load(Ordering::Relaxed),
            messages_skipped: self.skipped.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_skips_and_deliveries() {
        let counters = StatsCounters::default();
        counters.record(&BroadcastReport::default());
        counters.record(&BroadcastReport {
            recipients: 3,
            delivered: 2,
            failed: 1,
        });

        let stats = counters.snapshot();
        assert_eq!(stats.messages_received, 2);
        assert_eq!(stats.messages_skipped, 1);
        assert_eq!(stats.messages_broadcast, 1);
        assert_eq!(stats.deliveries, 2);
        assert_eq!(stats.delivery_failures, 1);
    }
}
