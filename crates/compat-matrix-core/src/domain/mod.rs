//! Domain models for the compatibility matrix.
//!
//! Canonical definitions for the core entities:
//! - `Observation`: one decoded telemetry counter sample
//! - `FlowTuple`: (operation, operation version, isolation group)
//! - `CombinationKey`: (client version, server version)
//! - `Verdict`: compatibility classification and its roll-up rule

pub mod error;
pub mod flow;
pub mod verdict;

// Re-export main types and errors
pub use error::{MatrixError, Result};
pub use flow::{
    CombinationKey, ErrorSide, ErrorTotals, FlowTuple, LegTotals, Observation, TrafficLeg,
    TransportMode,
};
pub use verdict::Verdict;
