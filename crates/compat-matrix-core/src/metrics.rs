//! Global atomic counters for batch observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event at the end of a batch.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    snapshots_decoded: AtomicU64,
    observations_decoded: AtomicU64,
    sources_skipped: AtomicU64,
    evidence_records: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            snapshots_decoded: AtomicU64::new(0),
            observations_decoded: AtomicU64::new(0),
            sources_skipped: AtomicU64::new(0),
            evidence_records: AtomicU64::new(0),
        }
    }

    /// Record one decoded snapshot and the samples it yielded.
    pub fn inc_snapshot_decoded(&self, observations: u64) {
        self.snapshots_decoded.fetch_add(1, Ordering::Relaxed);
        self.observations_decoded
            .fetch_add(observations, Ordering::Relaxed);
        tracing::trace!(metric = "snapshots_decoded", "counter incremented");
    }

    /// Increment the skipped-sources counter by one.
    pub fn inc_skipped(&self) {
        self.sources_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sources_skipped", "counter incremented");
    }

    /// Increment the evidence-records counter by one.
    pub fn inc_evidence(&self) {
        self.evidence_records.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evidence_records", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            snapshots_decoded = self.snapshots_decoded(),
            observations_decoded = self.observations_decoded(),
            sources_skipped = self.sources_skipped(),
            evidence_records = self.evidence_records(),
        );
    }

    pub fn snapshots_decoded(&self) -> u64 {
        self.snapshots_decoded.load(Ordering::Relaxed)
    }

    pub fn observations_decoded(&self) -> u64 {
        self.observations_decoded.load(Ordering::Relaxed)
    }

    pub fn sources_skipped(&self) -> u64 {
        self.sources_skipped.load(Ordering::Relaxed)
    }

    pub fn evidence_records(&self) -> u64 {
        self.evidence_records.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.snapshots_decoded.store(0, Ordering::Relaxed);
        self.observations_decoded.store(0, Ordering::Relaxed);
        self.sources_skipped.store(0, Ordering::Relaxed);
        self.evidence_records.store(0, Ordering::Relaxed);
    }
}
