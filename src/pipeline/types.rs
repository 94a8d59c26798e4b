//! Frames, packets and per-stage records

use crate::crypto::content_hash;
use crate::error::Result;
use crate::ethics::{EthicalColor, EthicalScore, RiskFlag};
use crate::shard::{is_hex64, EmoShard, MAX_INTENT_CHARS, MAX_VECTOR_DIMS};
use crate::store::StoreReceipt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Wire protocol tag carried by every packet
pub const PROTOCOL: &str = "HGI/1.0";

/// Packet type for shard-bearing packets
pub const PACKET_TYPE: &str = "EMO_SHARD";

/// Terminal packet state. Assembly only ever produces this state.
pub const STATE_RELEASE: &str = "RELEASE";

/// Frame schema version
pub const FRAME_VERSION: &str = "1.0";

/// Hex length of a packet id
pub const PACKET_ID_LEN: usize = 32;

/// Ordered frame layers, one per assembly step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layer {
    #[serde(rename = "L1_PROSODY")]
    Prosody,
    #[serde(rename = "L2_INTENT")]
    Intent,
    #[serde(rename = "L3_ETHICS")]
    Ethics,
    #[serde(rename = "L4_GATE")]
    Gate,
    #[serde(rename = "L5_SHARD")]
    Shard,
    #[serde(rename = "L6_STORE")]
    Store,
}

impl Layer {
    pub const ALL: [Layer; 6] = [
        Layer::Prosody,
        Layer::Intent,
        Layer::Ethics,
        Layer::Gate,
        Layer::Shard,
        Layer::Store,
    ];
}

/// One stage's content-addressed output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub layer: Layer,
    pub version: String,
    pub message_id: String,
    pub sender_node_id: String,
    pub timestamp: u64,
    pub payload: Value,
}

impl Frame {
    /// Wrap a stage record. The id covers layer, sender and payload only.
    pub fn new<T: Serialize>(
        layer: Layer,
        sender_node_id: &str,
        record: &T,
        timestamp: u64,
    ) -> Result<Self> {
        let payload = serde_json::to_value(record)?;
        let message_id = frame_message_id(layer, sender_node_id, &payload)?;
        Ok(Self {
            layer,
            version: FRAME_VERSION.to_string(),
            message_id,
            sender_node_id: sender_node_id.to_string(),
            timestamp,
            payload,
        })
    }
}

/// Dedup key for a frame: hash of canonical `{layer, sender_node_id, payload}`
pub fn frame_message_id(layer: Layer, sender_node_id: &str, payload: &Value) -> Result<String> {
    content_hash(&json!({
        "layer": layer,
        "sender_node_id": sender_node_id,
        "payload": payload,
    }))
}

/// Top-level ethical summary of a packet, relayed on the metadata topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthicalMetadata {
    pub ethical_color: EthicalColor,
    pub toxicity_score: f64,
    pub risk_flags: Vec<RiskFlag>,
}

/// Terminal assembly output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub protocol: String,
    pub packet_type: String,
    pub state: String,
    pub packet_id: String,
    pub timestamp_ms: u64,
    pub payload: EmoShard,
    pub ethical_metadata: EthicalMetadata,
    pub states: Vec<Frame>,
    #[serde(rename = "final")]
    pub final_receipt: StoreReceipt,
}

impl Packet {
    /// Frame for `layer`, if present
    pub fn frame(&self, layer: Layer) -> Option<&Frame> {
        self.states.iter().find(|f| f.layer == layer)
    }
}

/// Assembly step names used in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prosody,
    Intent,
    Ethics,
    Semantics,
    Gate,
    Envelope,
    Shard,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Prosody => "prosody",
            Stage::Intent => "intent",
            Stage::Ethics => "ethics",
            Stage::Semantics => "semantics",
            Stage::Gate => "gate",
            Stage::Envelope => "envelope",
            Stage::Shard => "shard",
            Stage::Store => "store",
        };
        f.write_str(s)
    }
}

/// Prosody features extracted from raw audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProsodyFeatures {
    pub features: Vec<f64>,
    pub duration_ms: u64,
}

impl ProsodyFeatures {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.features.is_empty() {
            return Err("features must not be empty".into());
        }
        if self.features.len() > MAX_VECTOR_DIMS {
            return Err(format!(
                "features has {} dimensions (max {})",
                self.features.len(),
                MAX_VECTOR_DIMS
            ));
        }
        if let Some(i) = self.features.iter().position(|v| !v.is_finite()) {
            return Err(format!("features[{}] is not a finite number", i));
        }
        Ok(())
    }
}

/// Synthesized intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub intention_core: String,
    pub confidence: f64,
}

impl IntentRecord {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.intention_core.trim().is_empty() {
            return Err("intention_core must not be blank".into());
        }
        if self.intention_core.chars().count() > MAX_INTENT_CHARS {
            return Err(format!("intention_core exceeds {} characters", MAX_INTENT_CHARS));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err("confidence must be within [0, 1]".into());
        }
        Ok(())
    }
}

/// Semantic clustering of an intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticMap {
    pub clusters: Vec<String>,
    pub hash_contextual: String,
}

impl SemanticMap {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.clusters.iter().any(|c| c.trim().is_empty()) {
            return Err("clusters must not contain blank entries".into());
        }
        if !is_hex64(&self.hash_contextual) {
            return Err("hash_contextual must be 64 hex characters".into());
        }
        Ok(())
    }
}

/// Structural check for a scoring-stage result
pub fn validate_score(score: &EthicalScore) -> std::result::Result<(), String> {
    if !(0.0..=1.0).contains(&score.toxicity_score) {
        return Err("toxicity_score must be within [0, 1]".into());
    }
    Ok(())
}

/// Third frame payload: both scoring sub-calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRecord {
    pub ethical_score: EthicalScore,
    pub semantic_map: SemanticMap,
}
