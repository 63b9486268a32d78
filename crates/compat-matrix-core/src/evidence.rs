//! Evidence reconciler.
//!
//! Parses independent test-execution evidence (execution summaries and setup
//! status blocks) and joins it to the telemetry-derived verdicts by key.
//! Execution summaries are corroboration only: they never change a verdict.
//! A setup failure is the one piece of evidence with precedence, and the
//! aggregator applies it.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{CombinationKey, MatrixError, Result, TransportMode, Verdict};

/// `FAILURE_TYPE` value meaning setup completed.
pub const FAILURE_TYPE_NONE: &str = "NONE";

/// Counts from one execution summary line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub executed: u64,
    pub failed: u64,
    pub errored: u64,
    pub skipped: u64,
}

impl ExecutionSummary {
    /// Tests that ran and neither failed nor errored.
    pub fn passed(&self) -> u64 {
        self.executed
            .saturating_sub(self.failed)
            .saturating_sub(self.errored)
    }

    /// At least one test ran.
    pub fn ran(&self) -> bool {
        self.executed > 0
    }

    /// At least one test ran and none failed or errored.
    pub fn is_clean(&self) -> bool {
        self.ran() && self.failed == 0 && self.errored == 0
    }

    /// Field-wise sum, saturating at `u64::MAX`.
    pub fn merged(self, other: ExecutionSummary) -> ExecutionSummary {
        ExecutionSummary {
            executed: self.executed.saturating_add(other.executed),
            failed: self.failed.saturating_add(other.failed),
            errored: self.errored.saturating_add(other.errored),
            skipped: self.skipped.saturating_add(other.skipped),
        }
    }
}

fn summary_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Tests run:\s*(\d+),\s*Failures:\s*(\d+),\s*Errors:\s*(\d+),\s*Skipped:\s*(\d+)")
            .expect("summary pattern is valid")
    })
}

/// Parse the execution summary out of a test report.
///
/// When a report holds several summary lines (per-class lines followed by a
/// run total), the last one is the run total and wins.
pub fn parse_execution_summary(text: &str) -> Option<ExecutionSummary> {
    let caps = summary_line_re().captures_iter(text).last()?;
    let field = |idx: usize| caps[idx].parse::<u64>().ok();
    Some(ExecutionSummary {
        executed: field(1)?,
        failed: field(2)?,
        errored: field(3)?,
        skipped: field(4)?,
    })
}

/// Outcome of the environment setup for one combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SetupStatus {
    Succeeded {
        message: String,
        timestamp: Option<String>,
    },
    Failed {
        failure_kind: String,
        message: String,
        timestamp: Option<String>,
    },
}

impl SetupStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, SetupStatus::Failed { .. })
    }

    pub fn failure_kind(&self) -> Option<&str> {
        match self {
            SetupStatus::Failed { failure_kind, .. } => Some(failure_kind),
            SetupStatus::Succeeded { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SetupStatus::Succeeded { message, .. } | SetupStatus::Failed { message, .. } => {
                message
            }
        }
    }
}

/// Parse a `KEY: value` setup status block.
///
/// Requires `FAILURE_TYPE` and a message in `SETUP_FAILED`, `SETUP_SUCCESS`
/// or `STATUS` (first present wins). `TIMESTAMP` is optional and kept
/// verbatim.
pub fn parse_setup_status(source_name: &str, text: &str) -> Result<SetupStatus> {
    let fields: BTreeMap<&str, &str> = text
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    let malformed = |detail: &str| MatrixError::MalformedEvidence {
        source_name: source_name.to_string(),
        detail: detail.to_string(),
    };

    let failure_kind = fields
        .get("FAILURE_TYPE")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| malformed("missing FAILURE_TYPE"))?;

    let message = ["SETUP_FAILED", "SETUP_SUCCESS", "STATUS"]
        .iter()
        .find_map(|k| fields.get(k))
        .ok_or_else(|| malformed("missing status message"))?
        .to_string();

    let timestamp = fields
        .get("TIMESTAMP")
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string());

    if failure_kind.eq_ignore_ascii_case(FAILURE_TYPE_NONE) {
        Ok(SetupStatus::Succeeded { message, timestamp })
    } else {
        Ok(SetupStatus::Failed {
            failure_kind: failure_kind.to_string(),
            message,
            timestamp,
        })
    }
}

/// How the execution evidence relates to the telemetry verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceAgreement {
    /// No execution summary for this combination.
    NoEvidence,
    /// Both sources point the same way.
    Corroborates,
    /// The sources disagree; worth investigating the instrumentation.
    Disagrees,
    /// Telemetry has no verdict to compare against.
    Inconclusive,
}

/// All evidence gathered for a batch, keyed by combination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceSet {
    setups: BTreeMap<CombinationKey, SetupStatus>,
    executions: BTreeMap<CombinationKey, BTreeMap<TransportMode, ExecutionSummary>>,
}

impl EvidenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a setup status. A failure is never replaced by a later success.
    pub fn add_setup(&mut self, key: CombinationKey, status: SetupStatus) {
        match self.setups.get(&key) {
            Some(existing) if existing.is_failure() && !status.is_failure() => {}
            _ => {
                self.setups.insert(key, status);
            }
        }
    }

    /// Record an execution summary for one transport; repeated summaries for
    /// the same key and transport are summed.
    pub fn add_execution(
        &mut self,
        key: CombinationKey,
        transport: TransportMode,
        summary: ExecutionSummary,
    ) {
        let slot = self
            .executions
            .entry(key)
            .or_default()
            .entry(transport)
            .or_default();
        *slot = slot.merged(summary);
    }

    pub fn setup(&self, key: &CombinationKey) -> Option<&SetupStatus> {
        self.setups.get(key)
    }

    pub fn executions(&self, key: &CombinationKey) -> BTreeMap<TransportMode, ExecutionSummary> {
        self.executions.get(key).cloned().unwrap_or_default()
    }

    /// Whether a setup failure forces this key to `SetupFailed`.
    pub fn has_setup_failure(&self, key: &CombinationKey) -> bool {
        self.setups.get(key).is_some_and(SetupStatus::is_failure)
    }

    /// Every key any piece of evidence mentions.
    pub fn keys(&self) -> impl Iterator<Item = &CombinationKey> {
        self.setups.keys().chain(self.executions.keys())
    }

    pub fn is_empty(&self) -> bool {
        self.setups.is_empty() && self.executions.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.setups.len() + self.executions.values().map(BTreeMap::len).sum::<usize>()
    }
}

/// Compare execution evidence with a telemetry verdict. Advisory only.
///
/// Transports where nothing ran say nothing either way; when no transport
/// ran a test the result is inconclusive.
pub fn agreement(
    telemetry: Verdict,
    executions: &BTreeMap<TransportMode, ExecutionSummary>,
) -> EvidenceAgreement {
    if executions.is_empty() {
        return EvidenceAgreement::NoEvidence;
    }
    let mut ran = executions.values().filter(|s| s.ran()).peekable();
    if ran.peek().is_none() {
        return EvidenceAgreement::Inconclusive;
    }
    let evidence_clean = ran.all(ExecutionSummary::is_clean);
    match telemetry {
        Verdict::Compatible | Verdict::CompatibleWithAcceptableFailure if evidence_clean => {
            EvidenceAgreement::Corroborates
        }
        Verdict::Incompatible if !evidence_clean => EvidenceAgreement::Corroborates,
        Verdict::Compatible | Verdict::CompatibleWithAcceptableFailure | Verdict::Incompatible => {
            EvidenceAgreement::Disagrees
        }
        Verdict::Indeterminate | Verdict::SetupFailed => EvidenceAgreement::Inconclusive,
    }
}
