//! Balance evaluator.
//!
//! The proxy must forward every request and every response it receives.
//! For each flow tuple the request legs and the response legs are compared
//! with exact equality: both sides come from the same counter family scraped
//! once, so any drift is a forwarding defect rather than noise.
//!
//! The canonical unit is the message count (`*_request_total` /
//! `*_response_total` families). Byte counters are never mixed in.

use serde::{Deserialize, Serialize};

use crate::domain::{FlowTuple, LegTotals, Verdict};

/// Verdict for one flow tuple, with the data it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowVerdict {
    pub flow: FlowTuple,
    pub totals: LegTotals,
    pub verdict: Verdict,
    /// Largest per-direction imbalance. Zero unless the verdict is
    /// `Incompatible`; reported only, never used to decide the verdict.
    pub magnitude: f64,
}

impl FlowVerdict {
    /// Whether the tuple carried any client traffic.
    pub fn has_traffic(&self) -> bool {
        self.totals.request_in() > 0.0
    }
}

/// Classify a flow from its leg totals.
pub fn evaluate(totals: &LegTotals) -> (Verdict, f64) {
    let request_in = totals.request_in();
    if request_in <= 0.0 {
        return (Verdict::Indeterminate, 0.0);
    }

    let request_gap = (request_in - totals.request_out()).abs();
    let response_gap = (totals.response_in() - totals.response_out()).abs();
    if request_gap == 0.0 && response_gap == 0.0 {
        (Verdict::Compatible, 0.0)
    } else {
        (Verdict::Incompatible, request_gap.max(response_gap))
    }
}

/// Evaluate one flow tuple.
pub fn evaluate_flow(flow: &FlowTuple, totals: &LegTotals) -> FlowVerdict {
    let (verdict, magnitude) = evaluate(totals);
    FlowVerdict {
        flow: flow.clone(),
        totals: *totals,
        verdict,
        magnitude,
    }
}
