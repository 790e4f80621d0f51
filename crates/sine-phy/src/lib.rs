//! Physical-layer models for SiNE.
//!
//! Stateless functions from channel conditions to link parameters:
//! - **Path aggregation** — coherent sum of complex path gains, propagation
//!   delay and delay-spread jitter
//! - **Error rates** — AWGN BER curves per modulation, code-rate gain,
//!   packet-error rate
//! - **MCS selection** — threshold table with per-link hysteresis
//! - **MAC overlays** — CSMA-CA deferral and TDMA slot orthogonality as
//!   concurrent-transmission probabilities
//! - **Link evaluation** — signal + weighted interference → SINR → MCS →
//!   netem parameters
//!
//! The only sticky state in the pipeline (the previously selected MCS per
//! directed link) is owned by the orchestrator and passed in explicitly.

pub mod error_rate;
pub mod link;
pub mod mac;
pub mod mcs;
pub mod paths;

pub use link::{evaluate_link, Interferer, PhyOptions};
pub use mac::{build_mac, CsmaCa, MacOverlay, NoMac, Tdma};
pub use mcs::{McsRow, McsTable, Modulation, DOWN_MCS};
pub use paths::{PathAggregate, PropagationPath};

/// Errors from table loading and model construction.
#[derive(Debug, thiserror::Error)]
pub enum PhyError {
    #[error("failed to read MCS table: {0}")]
    TableIo(#[from] std::io::Error),
    #[error("failed to parse MCS table: {0}")]
    TableFormat(#[from] csv::Error),
    #[error("MCS table row {row}: {reason}")]
    TableRow { row: usize, reason: String },
    #[error("MCS table is empty")]
    EmptyTable,
    #[error("unknown modulation `{0}`")]
    UnknownModulation(String),
    #[error("TDMA frame has zero slots")]
    ZeroSlots,
    #[error("bad TDMA slot assignment: {0}")]
    BadSlotAssignment(String),
}
