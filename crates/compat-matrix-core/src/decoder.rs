//! Telemetry decoder.
//!
//! Turns one text snapshot of the proxy's exported counters into typed
//! [`Observation`]s, then sums them per [`FlowTuple`]. Parsing sits behind the
//! [`ObservationParser`] trait so the matching strategy can change without
//! touching balance evaluation.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{
    CombinationKey, ErrorSide, ErrorTotals, FlowTuple, LegTotals, Observation, TrafficLeg,
};

/// Label carrying the operation name.
pub const LABEL_OPERATION: &str = "api_key";
/// Label carrying the operation version.
pub const LABEL_OPERATION_VERSION: &str = "api_version";
/// Label carrying the reporting proxy node.
pub const LABEL_NODE: &str = "node_id";
/// Label carrying the isolation group.
pub const LABEL_GROUP: &str = "virtual_cluster";

/// Strategy for turning snapshot text into observations.
pub trait ObservationParser: Send + Sync {
    /// Extract every traffic-leg observation from `text`. Text that does not
    /// match is ignored.
    fn parse(&self, text: &str) -> Vec<Observation>;

    /// Sum the client-side and upstream error counters in `text`.
    fn parse_errors(&self, text: &str) -> ErrorTotals;
}

/// Line-oriented parser for the `family{labels} value` exposition format.
///
/// Label order is irrelevant and extra labels are ignored; a sample is kept
/// when its family maps to a [`TrafficLeg`] and it carries the operation,
/// operation-version and group labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusTextParser;

fn sample_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r#"^\s*([A-Za-z_:][A-Za-z0-9_:]*)"#,
            r#"(?:\{((?:[^}"]|"(?:[^"\\]|\\.)*")*)\})?"#,
            r#"\s+(\S+)(?:\s+-?\d+)?(?:\s+#.*)?\s*$"#,
        ))
        .expect("sample line pattern is valid")
    })
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)\s*=\s*"((?:[^"\\]|\\.)*)""#)
            .expect("label pattern is valid")
    })
}

impl PrometheusTextParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_line(&self, line: &str) -> Option<Observation> {
        let (family, labels, value) = split_sample(line)?;
        let leg = TrafficLeg::from_family(family)?;
        let Some(labels) = labels else {
            tracing::debug!(line = %line, "traffic sample without labels");
            return None;
        };

        let mut operation = None;
        let mut operation_version = None;
        let mut node = None;
        let mut group = None;
        for label in label_re().captures_iter(labels) {
            let value = unescape_label_value(&label[2]);
            match &label[1] {
                LABEL_OPERATION => operation = Some(value),
                LABEL_OPERATION_VERSION => operation_version = Some(value),
                LABEL_NODE => node = Some(value),
                LABEL_GROUP => group = Some(value),
                _ => {}
            }
        }

        match (operation, operation_version, group) {
            (Some(operation), Some(operation_version), Some(group)) => Some(Observation {
                operation,
                operation_version,
                node,
                group,
                leg,
                value,
            }),
            _ => {
                tracing::debug!(line = %line, "traffic sample missing required labels");
                None
            }
        }
    }
}

impl ObservationParser for PrometheusTextParser {
    fn parse(&self, text: &str) -> Vec<Observation> {
        text.lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    fn parse_errors(&self, text: &str) -> ErrorTotals {
        text.lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .filter_map(split_sample)
            .filter_map(|(family, _, value)| Some((ErrorSide::from_family(family)?, value)))
            .fold(ErrorTotals::default(), |mut totals, (side, value)| {
                totals.add(side, value);
                totals
            })
    }
}

/// Split a sample line into family, raw label block and value. Non-finite
/// and negative values are dropped.
fn split_sample(line: &str) -> Option<(&str, Option<&str>, f64)> {
    let caps = sample_line_re().captures(line)?;
    let value: f64 = caps.get(3)?.as_str().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        tracing::debug!(line = %line, "ignoring non-finite or negative sample");
        return None;
    }
    Some((
        caps.get(1)?.as_str(),
        caps.get(2).map(|m| m.as_str()),
        value,
    ))
}

fn unescape_label_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Sum observations per flow tuple, across nodes.
pub fn accumulate(observations: &[Observation]) -> BTreeMap<FlowTuple, LegTotals> {
    observations
        .iter()
        .fold(BTreeMap::new(), |mut flows, obs| {
            flows
                .entry(obs.flow())
                .or_insert_with(LegTotals::default)
                .add(obs.leg, obs.value);
            flows
        })
}

/// One decoded snapshot, ready for balance evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSnapshot {
    /// Combination the snapshot belongs to.
    pub key: CombinationKey,

    /// Where the snapshot came from (file name or URL).
    pub source: String,

    /// Number of matched counter samples.
    pub observation_count: usize,

    /// Accumulated leg totals per flow tuple.
    pub flows: BTreeMap<FlowTuple, LegTotals>,

    /// Error counters, reported alongside the verdict.
    pub errors: ErrorTotals,
}

/// Decode one snapshot. A snapshot with no matching lines yields an empty
/// flow map; that is the normal shape of a run whose setup failed early.
pub fn decode_snapshot(
    parser: &dyn ObservationParser,
    key: CombinationKey,
    source: impl Into<String>,
    text: &str,
) -> DecodedSnapshot {
    let observations = parser.parse(text);
    DecodedSnapshot {
        key,
        source: source.into(),
        observation_count: observations.len(),
        flows: accumulate(&observations),
        errors: parser.parse_errors(text),
    }
}
