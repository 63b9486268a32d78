//! Report model.
//!
//! [`CompatibilityReport`] is the lossless, machine-readable form of a batch:
//! the reconciled matrix, a flat row per flow tuple, the operation catalog
//! and the list of skipped inputs. `matrix_digest` is a SHA-256 over the
//! timestamp-free content, so re-running a batch over identical inputs yields
//! an identical digest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::aggregator::{CombinationResult, MatrixSummary};
use crate::catalog::{self, ApiKey, CatalogEntry};
use crate::domain::{Result, TransportMode, Verdict};
use crate::pipeline::{BatchOutcome, SkippedSource};

/// Report schema version.
pub const SCHEMA_VERSION: &str = "1.0";

/// One flat row per flow tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDetailRow {
    pub client_version: String,
    pub server_version: String,
    pub operation: String,
    pub api_key: ApiKey,
    pub operation_version: String,
    pub group: String,
    pub transport: TransportMode,
    pub client_to_proxy: f64,
    pub proxy_to_server: f64,
    pub server_to_proxy: f64,
    pub proxy_to_client: f64,
    /// Raw flow verdict from the balance rule.
    pub verdict: Verdict,
    pub magnitude: f64,
    /// Verdict of the owning combination.
    pub combination_verdict: Verdict,
    /// Client-side error counters of the owning combination.
    pub client_errors: f64,
    /// Upstream error counters of the owning combination.
    pub upstream_errors: f64,
}

/// Flatten every flow of every combination into detail rows.
pub fn detail_rows(combinations: &[CombinationResult]) -> Vec<FlowDetailRow> {
    combinations
        .iter()
        .flat_map(|c| {
            c.groups.iter().flat_map(move |g| {
                g.flows.iter().map(move |f| FlowDetailRow {
                    client_version: c.key.client_version.clone(),
                    server_version: c.key.server_version.clone(),
                    operation: f.flow.operation.clone(),
                    api_key: catalog::name_to_id(&f.flow.operation),
                    operation_version: f.flow.operation_version.clone(),
                    group: g.group.clone(),
                    transport: g.transport,
                    client_to_proxy: f.totals.client_to_proxy,
                    proxy_to_server: f.totals.proxy_to_server,
                    server_to_proxy: f.totals.server_to_proxy,
                    proxy_to_client: f.totals.proxy_to_client,
                    verdict: f.verdict,
                    magnitude: f.magnitude,
                    combination_verdict: c.verdict,
                    client_errors: c.client_errors,
                    upstream_errors: c.upstream_errors,
                })
            })
        })
        .collect()
}

/// Full report for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    /// Hex SHA-256 over `summary`, `combinations` and `details`.
    pub matrix_digest: String,
    pub summary: MatrixSummary,
    pub combinations: Vec<CombinationResult>,
    pub details: Vec<FlowDetailRow>,
    pub api_key_reference: Vec<CatalogEntry>,
    pub skipped: Vec<SkippedSource>,
}

#[derive(Serialize)]
struct DigestInput<'a> {
    summary: &'a MatrixSummary,
    combinations: &'a [CombinationResult],
    details: &'a [FlowDetailRow],
}

fn compute_digest(
    summary: &MatrixSummary,
    combinations: &[CombinationResult],
    details: &[FlowDetailRow],
) -> Result<String> {
    let canonical = serde_json::to_vec(&DigestInput {
        summary,
        combinations,
        details,
    })?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

impl CompatibilityReport {
    /// Assemble the report from a finished batch.
    pub fn from_outcome(outcome: &BatchOutcome) -> Result<Self> {
        Self::build(
            outcome.matrix.summary.clone(),
            outcome.matrix.combinations.clone(),
            outcome.skipped.clone(),
        )
    }

    pub fn build(
        summary: MatrixSummary,
        combinations: Vec<CombinationResult>,
        skipped: Vec<SkippedSource>,
    ) -> Result<Self> {
        let details = detail_rows(&combinations);
        let matrix_digest = compute_digest(&summary, &combinations, &details)?;
        Ok(Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            matrix_digest,
            summary,
            combinations,
            details,
            api_key_reference: catalog::reference_table(),
            skipped,
        })
    }

    /// Operations actually observed, as `(name, api key)`, known keys first
    /// by id, then unknown names alphabetically.
    pub fn observed_operations(&self) -> Vec<(String, ApiKey)> {
        let mut ops: Vec<(String, ApiKey)> = self
            .details
            .iter()
            .map(|row| (row.operation.clone(), row.api_key.clone()))
            .collect();
        ops.sort_by(|a, b| {
            let rank = |k: &ApiKey| k.id().map(u32::from).unwrap_or(u32::MAX);
            rank(&a.1).cmp(&rank(&b.1)).then_with(|| a.0.cmp(&b.0))
        });
        ops.dedup();
        ops
    }

    /// Re-derive the digest from the current content.
    pub fn verify_digest(&self) -> Result<bool> {
        let expected = compute_digest(&self.summary, &self.combinations, &self.details)?;
        Ok(expected == self.matrix_digest)
    }
}
