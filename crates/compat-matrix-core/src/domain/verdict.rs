//! Compatibility verdicts and the shared roll-up rule.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Compatibility verdict at tuple, group or combination level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Compatible,
    Incompatible,
    Indeterminate,
    CompatibleWithAcceptableFailure,
    SetupFailed,
}

impl Verdict {
    /// Roll-up precedence. Higher wins; `Indeterminate` is the identity.
    fn rank(self) -> u8 {
        match self {
            Verdict::Indeterminate => 0,
            Verdict::Compatible => 1,
            Verdict::CompatibleWithAcceptableFailure => 2,
            Verdict::Incompatible => 3,
            Verdict::SetupFailed => 4,
        }
    }

    /// Combine child verdicts into a parent verdict.
    ///
    /// Children without traffic (`Indeterminate`) do not affect a parent that
    /// has at least one child with traffic; a parent with no such child is
    /// `Indeterminate`. Otherwise the most severe child wins.
    pub fn roll_up<I>(children: I) -> Verdict
    where
        I: IntoIterator<Item = Verdict>,
    {
        children
            .into_iter()
            .max_by_key(|v| v.rank())
            .unwrap_or(Verdict::Indeterminate)
    }

    /// Whether the verdict counts as a pass in the compatibility percentage.
    pub fn is_compatible(self) -> bool {
        matches!(
            self,
            Verdict::Compatible | Verdict::CompatibleWithAcceptableFailure
        )
    }

    /// Whether the verdict counts towards the compatibility denominator.
    pub fn is_scored(self) -> bool {
        matches!(
            self,
            Verdict::Compatible | Verdict::CompatibleWithAcceptableFailure | Verdict::Incompatible
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Compatible => "COMPATIBLE",
            Verdict::Incompatible => "INCOMPATIBLE",
            Verdict::Indeterminate => "INDETERMINATE",
            Verdict::CompatibleWithAcceptableFailure => "COMPATIBLE_WITH_ACCEPTABLE_FAILURE",
            Verdict::SetupFailed => "SETUP_FAILED",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
