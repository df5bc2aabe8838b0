//! Running counters for the projection provider.

use std::sync::atomic::{AtomicU64, Ordering};

/// Provider-level statistics tracker.
///
/// All counters are monotonically increasing and updated with relaxed
/// atomics; readers get a point-in-time [`StatsSnapshot`].
#[derive(Debug, Default)]
pub struct ProviderStats {
    placeholder_queries: AtomicU64,
    enumerations: AtomicU64,
    file_reads: AtomicU64,
    bytes_served: AtomicU64,
    deferred_requests: AtomicU64,
    deferred_completions: AtomicU64,
    denied_writes: AtomicU64,
}

/// Point-in-time copy of the provider counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub placeholder_queries: u64,
    pub enumerations: u64,
    pub file_reads: u64,
    pub bytes_served: u64,
    pub deferred_requests: u64,
    pub deferred_completions: u64,
    pub denied_writes: u64,
}

impl ProviderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_placeholder_query(&self) {
        self.placeholder_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enumeration(&self) {
        self.enumerations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_read(&self) {
        self.file_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_served(&self, bytes: u64) {
        self.bytes_served.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_deferred_request(&self) {
        self.deferred_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deferred_completion(&self) {
        self.deferred_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denied_write(&self) {
        self.denied_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            placeholder_queries: self.placeholder_queries.load(Ordering::Relaxed),
            enumerations: self.enumerations.load(Ordering::Relaxed),
            file_reads: self.file_reads.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
            deferred_requests: self.deferred_requests.load(Ordering::Relaxed),
            deferred_completions: self.deferred_completions.load(Ordering::Relaxed),
            denied_writes: self.denied_writes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = ProviderStats::new();
        stats.record_file_read();
        stats.record_file_read();
        stats.add_bytes_served(3);
        stats.record_denied_write();

        let snap = stats.snapshot();
        assert_eq!(snap.file_reads, 2);
        assert_eq!(snap.bytes_served, 3);
        assert_eq!(snap.denied_writes, 1);
        assert_eq!(snap.enumerations, 0);
    }
}
