//! Matrix aggregator.
//!
//! Groups per-flow verdicts by [`CombinationKey`] and isolation group, rolls
//! them up, applies the acceptable-failure allowlist and setup-failure
//! precedence, and computes the matrix summary. Pure: the same snapshots and
//! evidence always produce the same matrix.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::balance::{evaluate_flow, FlowVerdict};
use crate::catalog;
use crate::config::MatrixConfig;
use crate::decoder::DecodedSnapshot;
use crate::domain::{CombinationKey, ErrorTotals, FlowTuple, LegTotals, TransportMode, Verdict};
use crate::evidence::{agreement, EvidenceAgreement, EvidenceSet, ExecutionSummary, SetupStatus};

/// Roll-up of one isolation group within a combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupResult {
    /// Isolation group name as exported.
    pub group: String,

    /// Transport the group name classifies to, for lining up with evidence.
    pub transport: TransportMode,

    pub verdict: Verdict,

    /// `name(id)` of operations with balanced traffic.
    pub compatible_operations: Vec<String>,

    /// `name(id)` of imbalanced operations outside the allowlist.
    pub incompatible_operations: Vec<String>,

    /// `name(id)` of imbalanced operations tolerated by the allowlist.
    pub acceptable_failures: Vec<String>,

    /// Largest imbalance among the group's flows.
    pub max_magnitude: f64,

    /// Per-flow verdicts, ordered by flow tuple.
    pub flows: Vec<FlowVerdict>,
}

/// Final reconciled result for one client/server pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationResult {
    pub key: CombinationKey,

    /// Reconciled verdict (setup failure applied).
    pub verdict: Verdict,

    /// Verdict derived from telemetry alone. Retained even when a setup
    /// failure overrides it.
    pub telemetry_verdict: Verdict,

    pub groups: Vec<GroupResult>,

    /// Setup status, when a status block was present.
    pub setup: Option<SetupStatus>,

    /// Execution summaries per transport. Advisory only.
    pub executions: BTreeMap<TransportMode, ExecutionSummary>,

    /// How the execution evidence lines up with `telemetry_verdict`.
    pub agreement: EvidenceAgreement,

    /// Snapshot sources merged into this entry.
    pub sources: Vec<String>,

    /// Total client-to-proxy requests across all flows.
    pub total_requests: f64,

    /// Largest imbalance across all flows.
    pub max_magnitude: f64,

    /// Client-side error counters. Display only.
    pub client_errors: f64,

    /// Upstream error counters. Display only.
    pub upstream_errors: f64,
}

impl CombinationResult {
    /// Whether this entry counts towards the compatibility percentage.
    pub fn is_scored(&self) -> bool {
        self.verdict.is_scored()
    }

    pub fn flow_count(&self) -> usize {
        self.groups.iter().map(|g| g.flows.len()).sum()
    }
}

/// Matrix-level counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixSummary {
    /// Client versions forming the expected grid.
    pub client_versions: Vec<String>,

    /// Server versions forming the expected grid.
    pub server_versions: Vec<String>,

    /// `client_versions.len() * server_versions.len()`.
    pub expected_combinations: usize,

    /// Combinations with any snapshot or evidence.
    pub tested_combinations: usize,

    /// Grid combinations with neither snapshot nor evidence.
    pub missing_combinations: usize,

    pub missing: Vec<CombinationKey>,

    pub compatible: usize,
    pub compatible_with_acceptable_failure: usize,
    pub incompatible: usize,
    pub indeterminate: usize,
    pub setup_failed: usize,

    /// Passing share of scored combinations, in percent. `None` when no
    /// combination carried traffic.
    pub compatibility_percentage: Option<f64>,
}

/// The full reconciled matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityMatrix {
    /// One entry per combination, ordered by key.
    pub combinations: Vec<CombinationResult>,
    pub summary: MatrixSummary,
}

impl CompatibilityMatrix {
    pub fn get(&self, key: &CombinationKey) -> Option<&CombinationResult> {
        self.combinations.iter().find(|c| &c.key == key)
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }
}

/// Telemetry merged per combination, before evaluation.
#[derive(Default)]
struct MergedTelemetry {
    flows: BTreeMap<FlowTuple, LegTotals>,
    errors: ErrorTotals,
    sources: Vec<String>,
}

fn merge_snapshots(snapshots: &[DecodedSnapshot]) -> BTreeMap<CombinationKey, MergedTelemetry> {
    snapshots.iter().fold(BTreeMap::new(), |mut acc, snapshot| {
        let merged: &mut MergedTelemetry = acc.entry(snapshot.key.clone()).or_default();
        if !merged.sources.is_empty() {
            tracing::warn!(
                key = %snapshot.key,
                source = %snapshot.source,
                "multiple snapshots for one combination; summing leg totals"
            );
        }
        merged.sources.push(snapshot.source.clone());
        merged.errors = merged.errors.merged(snapshot.errors);
        for (flow, totals) in &snapshot.flows {
            let slot = merged.flows.entry(flow.clone()).or_default();
            *slot = slot.merged(*totals);
        }
        acc
    })
}

/// Verdict a flow contributes to its group: an imbalance on an allowlisted
/// operation counts as an acceptable failure.
fn effective_verdict(flow: &FlowVerdict, config: &MatrixConfig) -> Verdict {
    match flow.verdict {
        Verdict::Incompatible if config.is_acceptable_failure(&flow.flow.operation) => {
            Verdict::CompatibleWithAcceptableFailure
        }
        other => other,
    }
}

fn sorted_labels(ops: BTreeSet<&str>) -> Vec<String> {
    ops.into_iter().map(catalog::label).collect()
}

fn roll_up_group(group: String, flows: Vec<FlowVerdict>, config: &MatrixConfig) -> GroupResult {
    let verdict = Verdict::roll_up(flows.iter().map(|f| effective_verdict(f, config)));

    let mut compatible = BTreeSet::new();
    let mut incompatible = BTreeSet::new();
    let mut acceptable = BTreeSet::new();
    for flow in &flows {
        let op = flow.flow.operation.as_str();
        match effective_verdict(flow, config) {
            Verdict::Compatible => {
                compatible.insert(op);
            }
            Verdict::Incompatible => {
                incompatible.insert(op);
            }
            Verdict::CompatibleWithAcceptableFailure => {
                acceptable.insert(op);
            }
            Verdict::Indeterminate | Verdict::SetupFailed => {}
        }
    }

    let max_magnitude = flows.iter().map(|f| f.magnitude).fold(0.0, f64::max);

    GroupResult {
        transport: TransportMode::classify(&group),
        group,
        verdict,
        compatible_operations: sorted_labels(compatible),
        incompatible_operations: sorted_labels(incompatible),
        acceptable_failures: sorted_labels(acceptable),
        max_magnitude,
        flows,
    }
}

fn evaluate_combination(
    key: CombinationKey,
    telemetry: MergedTelemetry,
    evidence: &EvidenceSet,
    config: &MatrixConfig,
) -> CombinationResult {
    let by_group: BTreeMap<String, Vec<FlowVerdict>> =
        telemetry
            .flows
            .iter()
            .fold(BTreeMap::new(), |mut acc, (flow, totals)| {
                acc.entry(flow.group.clone())
                    .or_insert_with(Vec::new)
                    .push(evaluate_flow(flow, totals));
                acc
            });

    let groups: Vec<GroupResult> = by_group
        .into_iter()
        .map(|(group, flows)| roll_up_group(group, flows, config))
        .collect();

    let telemetry_verdict = Verdict::roll_up(groups.iter().map(|g| g.verdict));
    let verdict = if evidence.has_setup_failure(&key) {
        Verdict::SetupFailed
    } else {
        telemetry_verdict
    };

    let executions = evidence.executions(&key);
    let total_requests = telemetry.flows.values().map(LegTotals::request_in).sum();
    let max_magnitude = groups.iter().map(|g| g.max_magnitude).fold(0.0, f64::max);

    CombinationResult {
        agreement: agreement(telemetry_verdict, &executions),
        setup: evidence.setup(&key).cloned(),
        key,
        verdict,
        telemetry_verdict,
        groups,
        executions,
        sources: telemetry.sources,
        total_requests,
        max_magnitude,
        client_errors: telemetry.errors.client,
        upstream_errors: telemetry.errors.upstream,
    }
}

fn version_axes(
    config: &MatrixConfig,
    tested: &[CombinationKey],
) -> (Vec<String>, Vec<String>) {
    let derive = |pick: fn(&CombinationKey) -> &String| -> Vec<String> {
        tested
            .iter()
            .map(pick)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    };
    let clients = if config.client_versions.is_empty() {
        derive(|k| &k.client_version)
    } else {
        config.client_versions.clone()
    };
    let servers = if config.server_versions.is_empty() {
        derive(|k| &k.server_version)
    } else {
        config.server_versions.clone()
    };
    (clients, servers)
}

fn summarize(combinations: &[CombinationResult], config: &MatrixConfig) -> MatrixSummary {
    let tested: Vec<CombinationKey> = combinations.iter().map(|c| c.key.clone()).collect();
    let (client_versions, server_versions) = version_axes(config, &tested);

    let missing: Vec<CombinationKey> = client_versions
        .iter()
        .flat_map(|c| {
            server_versions
                .iter()
                .map(move |s| CombinationKey::new(c.clone(), s.clone()))
        })
        .filter(|k| !tested.contains(k))
        .collect();

    let count = |v: Verdict| combinations.iter().filter(|c| c.verdict == v).count();
    let compatible = count(Verdict::Compatible);
    let compatible_with_acceptable_failure = count(Verdict::CompatibleWithAcceptableFailure);
    let incompatible = count(Verdict::Incompatible);

    let scored = compatible + compatible_with_acceptable_failure + incompatible;
    let compatibility_percentage = (scored > 0).then(|| {
        (compatible + compatible_with_acceptable_failure) as f64 * 100.0 / scored as f64
    });

    MatrixSummary {
        expected_combinations: client_versions.len() * server_versions.len(),
        tested_combinations: tested.len(),
        missing_combinations: missing.len(),
        missing,
        client_versions,
        server_versions,
        compatible,
        compatible_with_acceptable_failure,
        incompatible,
        indeterminate: count(Verdict::Indeterminate),
        setup_failed: count(Verdict::SetupFailed),
        compatibility_percentage,
    }
}

/// Build the reconciled matrix from decoded snapshots and evidence.
///
/// Every combination mentioned by a snapshot or by any evidence record gets
/// an entry. Combinations known only from evidence have no flows, so their
/// telemetry verdict is `Indeterminate`.
pub fn aggregate(
    snapshots: &[DecodedSnapshot],
    evidence: &EvidenceSet,
    config: &MatrixConfig,
) -> CompatibilityMatrix {
    let mut merged = merge_snapshots(snapshots);
    for key in evidence.keys() {
        merged.entry(key.clone()).or_default();
    }

    let combinations: Vec<CombinationResult> = merged
        .into_iter()
        .map(|(key, telemetry)| evaluate_combination(key, telemetry, evidence, config))
        .collect();

    let summary = summarize(&combinations, config);
    CompatibilityMatrix {
        combinations,
        summary,
    }
}
