use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Delivery counters for a bus instance.
///
/// Counters are monotonically increasing for the lifetime of the process;
/// consumers that need rates should diff snapshots themselves.
#[derive(Debug, Default)]
pub struct BusStats {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`BusStats`].
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub published: u64,
    pub delivered: u64,
    pub failed: u64,
}

impl BusStats {
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counts() {
        let stats = BusStats::default();
        stats.record_published();
        stats.record_delivered();
        stats.record_delivered();
        stats.record_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.published, 1);
        assert_eq!(snap.delivered, 2);
        assert_eq!(snap.failed, 1);
    }
}
