//! Counters for one shard
//!
//! - Counters only, monotonic
//! - Reset only when the shard is reopened
//! - Relaxed atomics; values are exact but not a synchronization point

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for a shard.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    sets: AtomicU64,
    deletes: AtomicU64,
    mutation_failures: AtomicU64,
    commits: AtomicU64,
    commit_failures: AtomicU64,
    gets: AtomicU64,
    state_writes: AtomicU64,
    tombstones_purged: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_sets(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deletes(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    /// Per-key failure (not-found or failed)
    pub fn increment_mutation_failures(&self) {
        self.mutation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Non-empty batch delivered
    pub fn increment_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commit_failures(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_gets(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_state_writes(&self) {
        self.state_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tombstones_purged(&self, count: u64) {
        self.tombstones_purged.fetch_add(count, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            mutation_failures: self.mutation_failures.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            state_writes: self.state_writes.load(Ordering::Relaxed),
            tombstones_purged: self.tombstones_purged.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`StoreMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sets: u64,
    pub deletes: u64,
    pub mutation_failures: u64,
    pub commits: u64,
    pub commit_failures: u64,
    pub gets: u64,
    pub state_writes: u64,
    pub tombstones_purged: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zero() {
        assert_eq!(StoreMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters_increment() {
        let metrics = StoreMetrics::new();
        metrics.increment_sets();
        metrics.increment_sets();
        metrics.increment_deletes();
        metrics.increment_commit_failures();
        metrics.add_tombstones_purged(7);

        let snap = metrics.snapshot();
        assert_eq!(snap.sets, 2);
        assert_eq!(snap.deletes, 1);
        assert_eq!(snap.commit_failures, 1);
        assert_eq!(snap.tombstones_purged, 7);
        assert_eq!(snap.commits, 0);
    }
}
