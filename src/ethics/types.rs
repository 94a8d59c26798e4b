//! Ethical vocabulary shared by the hard and soft gates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Toxicity at or above this value raises a hard-gate risk flag.
pub const TOXICITY_THRESHOLD: f64 = 0.7;

/// Ethical colour classification produced by the scoring stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EthicalColor {
    /// Highest safety
    #[serde(alias = "green", alias = "safe")]
    GreenSafe,
    /// Caution
    #[serde(alias = "yellow", alias = "caution")]
    YellowCaution,
    /// High risk
    #[serde(alias = "red", alias = "high_risk")]
    RedRisk,
}

impl EthicalColor {
    /// Scalar used by the soft admission gate
    pub fn scalar(self) -> f64 {
        match self {
            EthicalColor::GreenSafe => 1.0,
            EthicalColor::YellowCaution => 0.7,
            EthicalColor::RedRisk => 0.0,
        }
    }

    /// Whether this colour denotes high risk
    pub fn is_high_risk(self) -> bool {
        self == EthicalColor::RedRisk
    }
}

impl fmt::Display for EthicalColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EthicalColor::GreenSafe => "GREEN_SAFE",
            EthicalColor::YellowCaution => "YELLOW_CAUTION",
            EthicalColor::RedRisk => "RED_RISK",
        };
        f.write_str(s)
    }
}

/// Ethical score carried by the scoring stage and embedded in shards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthicalScore {
    pub ethical_color: EthicalColor,
    #[serde(default)]
    pub toxicity_score: f64,
}

impl EthicalScore {
    pub fn new(ethical_color: EthicalColor, toxicity_score: f64) -> Self {
        Self {
            ethical_color,
            toxicity_score,
        }
    }
}

/// Reason the hard gate refused to let assembly continue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskFlag {
    /// The scoring stage classified the content as high risk
    EthicalColorRed,
    /// Toxicity reached [`TOXICITY_THRESHOLD`]
    ToxicityExceeded,
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskFlag::EthicalColorRed => f.write_str("ETHICAL_COLOR_RED"),
            RiskFlag::ToxicityExceeded => f.write_str("TOXICITY_EXCEEDED"),
        }
    }
}

/// Producer role tags, ordered from most to least trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Founder,
    Guardian,
    Member,
    /// Observer role
    Ghost,
}

impl Role {
    /// Every role in the weight table
    pub const ALL: [Role; 4] = [Role::Founder, Role::Guardian, Role::Member, Role::Ghost];

    /// Trust multiplier in `[0, 1]`
    pub fn weight(self) -> f64 {
        match self {
            Role::Founder => 1.0,
            Role::Guardian => 0.8,
            Role::Member => 0.5,
            Role::Ghost => 0.01,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Founder => "founder",
            Role::Guardian => "guardian",
            Role::Member => "member",
            Role::Ghost => "ghost",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "founder" => Ok(Role::Founder),
            "guardian" => Ok(Role::Guardian),
            "member" => Ok(Role::Member),
            "ghost" => Ok(Role::Ghost),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}
