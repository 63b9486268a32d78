//! Structured observability hooks for the batch lifecycle.
//!
//! Events are emitted at `info!` level (skips at `warn!`), filtered via the
//! `COMPAT_MATRIX_LOG` env var.

use tracing::info;

use crate::domain::{CombinationKey, Verdict};

/// Span covering one batch. Attach it to the batch future with
/// [`tracing::Instrument`] so it survives `.await` points.
///
/// # Example
///
/// ```ignore
/// run(config, dir).instrument(batch_span("/results/20240301")).await
/// // all tracing calls now carry root = "/results/20240301"
/// ```
pub fn batch_span(root: &str) -> tracing::Span {
    tracing::info_span!("compat_matrix.batch", root = %root)
}

/// Emit event: batch discovered its inputs.
pub fn emit_batch_started(root: &str, snapshots: usize, status_blocks: usize) {
    info!(
        event = "batch.started",
        root = %root,
        snapshots = snapshots,
        status_blocks = status_blocks,
    );
}

/// Emit event: one snapshot decoded.
pub fn emit_snapshot_decoded(source: &str, key: &CombinationKey, flows: usize, observations: usize) {
    info!(
        event = "snapshot.decoded",
        source = %source,
        client = %key.client_version,
        server = %key.server_version,
        flows = flows,
        observations = observations,
    );
}

/// Emit event: an input item was skipped (warning level).
pub fn emit_source_skipped(source: &str, reason: &dyn std::fmt::Display) {
    tracing::warn!(event = "source.skipped", source = %source, reason = %reason);
}

/// Emit event: one combination's verdict was settled.
pub fn emit_combination_verdict(key: &CombinationKey, verdict: Verdict) {
    tracing::debug!(
        event = "combination.verdict",
        client = %key.client_version,
        server = %key.server_version,
        verdict = %verdict,
    );
}

/// Emit event: matrix aggregated.
pub fn emit_matrix_aggregated(tested: usize, expected: usize, percentage: Option<f64>) {
    info!(
        event = "matrix.aggregated",
        tested = tested,
        expected = expected,
        compatibility_percentage = percentage.unwrap_or(f64::NAN),
    );
}

/// Emit event: a report file was written.
pub fn emit_report_written(kind: &str, path: &std::path::Path) {
    info!(event = "report.written", kind = %kind, path = %path.display());
}
