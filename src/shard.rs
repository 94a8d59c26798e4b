//! EmoShard, the unit of storage and relay
//!
//! A shard carries an emotion vector, an intent core, an ethical score and
//! an irreversibility envelope proving the content went through a one-way
//! transform. Structural validation is shared by the assembler, the store
//! and the network boundary.

use crate::ethics::EthicalScore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

/// Envelope similarity must stay strictly below this bound.
pub const MAX_SIMILARITY: f64 = 0.15;

/// Upper bound on emotion vector dimensions
pub const MAX_VECTOR_DIMS: usize = 64;

/// Upper bound on intent core length in characters
pub const MAX_INTENT_CHARS: usize = 512;

/// Irreversibility envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub shard_id: String,
    pub hash_contextual: String,
    pub similarity_score: f64,
}

/// Minimal synthesized artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmoShard {
    pub emotion_vector: Vec<f64>,
    pub intention_core: String,
    #[serde(default)]
    pub ethical_score: Option<EthicalScore>,
    #[serde(default)]
    pub bips_envelope: Option<Envelope>,
    /// Unix milliseconds
    pub timestamp: u64,
}

/// Structural validation failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ShardError {
    #[error("emotion_vector must not be empty")]
    EmptyVector,
    #[error("emotion_vector has {0} dimensions (max {MAX_VECTOR_DIMS})")]
    VectorTooLong(usize),
    #[error("emotion_vector[{0}] is not a finite number")]
    NonFiniteComponent(usize),
    #[error("intention_core must not be blank")]
    BlankIntent,
    #[error("intention_core exceeds {MAX_INTENT_CHARS} characters")]
    IntentTooLong,
    #[error("ethical_score.toxicity_score must be within [0, 1]")]
    ToxicityOutOfRange,
    #[error("timestamp must be positive")]
    MissingTimestamp,
    #[error("bips_envelope.similarity_score must be >= 0 and < {MAX_SIMILARITY}")]
    SimilarityOutOfBounds,
    #[error("bips_envelope.hash_contextual must be 64 hex characters")]
    BadContextHash,
    #[error("bips_envelope.shard_id must match [A-Za-z0-9_-]{{1,64}}")]
    BadShardId,
}

fn shard_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static pattern"))
}

fn hex64_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{64}$").expect("static pattern"))
}

/// Whether `id` is a safe shard identifier (also used as a file stem)
pub fn is_valid_shard_id(id: &str) -> bool {
    shard_id_pattern().is_match(id)
}

/// Whether `hash` is a 64-character hex digest
pub fn is_hex64(hash: &str) -> bool {
    hex64_pattern().is_match(hash)
}

impl Envelope {
    pub fn validate(&self) -> Result<(), ShardError> {
        if !self.similarity_score.is_finite()
            || self.similarity_score < 0.0
            || self.similarity_score >= MAX_SIMILARITY
        {
            return Err(ShardError::SimilarityOutOfBounds);
        }
        if !is_hex64(&self.hash_contextual) {
            return Err(ShardError::BadContextHash);
        }
        if !is_valid_shard_id(&self.shard_id) {
            return Err(ShardError::BadShardId);
        }
        Ok(())
    }
}

impl EmoShard {
    /// Check every structural invariant of the shard
    pub fn validate(&self) -> Result<(), ShardError> {
        if self.emotion_vector.is_empty() {
            return Err(ShardError::EmptyVector);
        }
        if self.emotion_vector.len() > MAX_VECTOR_DIMS {
            return Err(ShardError::VectorTooLong(self.emotion_vector.len()));
        }
        if let Some(i) = self.emotion_vector.iter().position(|v| !v.is_finite()) {
            return Err(ShardError::NonFiniteComponent(i));
        }
        if self.intention_core.trim().is_empty() {
            return Err(ShardError::BlankIntent);
        }
        if self.intention_core.chars().count() > MAX_INTENT_CHARS {
            return Err(ShardError::IntentTooLong);
        }
        if let Some(score) = &self.ethical_score {
            if !(0.0..=1.0).contains(&score.toxicity_score) {
                return Err(ShardError::ToxicityOutOfRange);
            }
        }
        if self.timestamp == 0 {
            return Err(ShardError::MissingTimestamp);
        }
        if let Some(envelope) = &self.bips_envelope {
            envelope.validate()?;
        }
        Ok(())
    }
}
