//! Ethical admission gate (dual mode)
//!
//! One vocabulary (ethical colour, toxicity, role weight), two consequences:
//! a hard abort during assembly and a score-weighted admission threshold at
//! the network boundary.

pub mod gate;
pub mod types;

pub use gate::{
    gate_score, hard_gate, resolve_color, soft_gate, ColorSource, HardGateVerdict,
    SoftGateDecision, ADMISSION_THRESHOLD,
};
pub use types::{EthicalColor, EthicalScore, RiskFlag, Role, TOXICITY_THRESHOLD};
