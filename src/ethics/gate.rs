//! Hard and soft ethical gates
//!
//! The hard gate runs inside packet assembly: any risk flag aborts
//! production. The soft gate runs at the network boundary and only decides
//! whether an already-authenticated shard is stored and relayed.

use super::types::{EthicalColor, EthicalScore, RiskFlag, Role, TOXICITY_THRESHOLD};
use serde::{Deserialize, Serialize};

/// Gate scores must exceed this value (strictly) to be admitted.
pub const ADMISSION_THRESHOLD: f64 = 0.5;

/// Outcome of the hard gate, recorded as the fourth frame of a packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardGateVerdict {
    pub ethical_color: EthicalColor,
    pub toxicity_score: f64,
    pub risk_flags: Vec<RiskFlag>,
}

impl HardGateVerdict {
    /// Whether assembly may continue
    pub fn passed(&self) -> bool {
        self.risk_flags.is_empty()
    }
}

/// Compute risk flags for a scoring-stage result.
pub fn hard_gate(score: &EthicalScore) -> HardGateVerdict {
    let mut risk_flags = Vec::new();
    if score.ethical_color.is_high_risk() {
        risk_flags.push(RiskFlag::EthicalColorRed);
    }
    if score.toxicity_score >= TOXICITY_THRESHOLD {
        risk_flags.push(RiskFlag::ToxicityExceeded);
    }
    HardGateVerdict {
        ethical_color: score.ethical_color,
        toxicity_score: score.toxicity_score,
        risk_flags,
    }
}

/// Where the boundary found the colour it scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSource {
    /// Ethical metadata of a wrapping packet
    Upstream,
    /// The shard's own embedded score
    Shard,
    /// Nothing available; denied by default
    Default,
}

/// Resolve the colour to score: upstream metadata, then the shard's own
/// score, then high risk.
pub fn resolve_color(
    upstream: Option<EthicalColor>,
    shard_score: Option<&EthicalScore>,
) -> (EthicalColor, ColorSource) {
    if let Some(color) = upstream {
        return (color, ColorSource::Upstream);
    }
    if let Some(score) = shard_score {
        return (score.ethical_color, ColorSource::Shard);
    }
    (EthicalColor::RedRisk, ColorSource::Default)
}

/// Soft admission decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SoftGateDecision {
    pub role: Role,
    pub ethical_color: EthicalColor,
    pub color_source: ColorSource,
    pub gate_score: f64,
    pub admitted: bool,
}

/// `role_weight × colour_scalar`
pub fn gate_score(role: Role, color: EthicalColor) -> f64 {
    role.weight() * color.scalar()
}

/// Score a submission and decide admission.
pub fn soft_gate(
    role: Role,
    upstream: Option<EthicalColor>,
    shard_score: Option<&EthicalScore>,
) -> SoftGateDecision {
    let (ethical_color, color_source) = resolve_color(upstream, shard_score);
    let gate_score = gate_score(role, ethical_color);
    SoftGateDecision {
        role,
        ethical_color,
        color_source,
        gate_score,
        admitted: gate_score > ADMISSION_THRESHOLD,
    }
}
