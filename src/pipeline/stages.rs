//! Synthesis stage collaborators
//!
//! The inference stages are external to the node. The core only sees each
//! one as "returns a record or fails". [`ReferenceStages`] is a deterministic
//! hash-derived implementation used by the CLI and by tests; it is not a
//! model.

use super::backend::{preferred_providers, probe_capabilities, ExecutionProvider};
use super::types::{IntentRecord, ProsodyFeatures, SemanticMap};
use crate::crypto::sha256_hex;
use crate::ethics::{EthicalColor, EthicalScore};
use crate::shard::Envelope;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Failure reported by a stage collaborator
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    /// The input or output did not have the required shape
    #[error("invalid: {0}")]
    Invalid(String),
    /// The stage ran and failed (model load, runtime, provider)
    #[error("failed: {0}")]
    Failed(String),
    /// The stage did not finish in time and no fallback was applied
    #[error("timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

/// The five synthesis stages, in the order assembly calls them
#[async_trait]
pub trait SynthesisStages: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn extract_prosody(&self, audio: &[u8]) -> Result<ProsodyFeatures, StageError>;

    async fn synthesize_intent(
        &self,
        prosody: &ProsodyFeatures,
    ) -> Result<IntentRecord, StageError>;

    async fn score_ethics(&self, intent: &IntentRecord) -> Result<EthicalScore, StageError>;

    async fn map_semantics(&self, intent: &IntentRecord) -> Result<SemanticMap, StageError>;

    /// Irreversibility envelope for the shard. `None` means the transform
    /// could not be proven.
    async fn seal_envelope(
        &self,
        intent: &IntentRecord,
        semantics: &SemanticMap,
    ) -> Result<Option<Envelope>, StageError>;
}

const PROSODY_DIMS: usize = 8;
const INTENTS: [&str; 4] = [
    "seek reassurance",
    "share gratitude",
    "express frustration",
    "ask for guidance",
];

/// Deterministic stages derived from SHA-256 of their inputs
pub struct ReferenceStages {
    providers: Vec<ExecutionProvider>,
}

impl ReferenceStages {
    pub fn new() -> Self {
        Self {
            providers: preferred_providers(&probe_capabilities()),
        }
    }

    /// Providers this node would try, best first
    pub fn providers(&self) -> &[ExecutionProvider] {
        &self.providers
    }
}

impl Default for ReferenceStages {
    fn default() -> Self {
        Self::new()
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[async_trait]
impl SynthesisStages for ReferenceStages {
    fn name(&self) -> &str {
        "reference"
    }

    async fn extract_prosody(&self, audio: &[u8]) -> Result<ProsodyFeatures, StageError> {
        if audio.is_empty() {
            return Err(StageError::Invalid("audio is empty".into()));
        }
        let digest = Sha256::digest(audio);
        let features = digest
            .iter()
            .take(PROSODY_DIMS)
            .map(|b| round4(*b as f64 / 127.5 - 1.0))
            .collect();
        Ok(ProsodyFeatures {
            features,
            // 16-bit mono at 8 kHz
            duration_ms: audio.len() as u64 / 16,
        })
    }

    async fn synthesize_intent(
        &self,
        prosody: &ProsodyFeatures,
    ) -> Result<IntentRecord, StageError> {
        let sum: f64 = prosody.features.iter().sum();
        let mean = sum / prosody.features.len().max(1) as f64;
        let idx = (sum.abs() * 1_000.0) as usize % INTENTS.len();
        Ok(IntentRecord {
            intention_core: INTENTS[idx].to_string(),
            confidence: round4((0.5 + mean.abs() / 2.0).min(1.0)),
        })
    }

    async fn score_ethics(&self, intent: &IntentRecord) -> Result<EthicalScore, StageError> {
        let score = if intent.intention_core.contains("frustration") {
            EthicalScore::new(EthicalColor::YellowCaution, 0.4)
        } else {
            EthicalScore::new(EthicalColor::GreenSafe, 0.05)
        };
        Ok(score)
    }

    async fn map_semantics(&self, intent: &IntentRecord) -> Result<SemanticMap, StageError> {
        let clusters = intent
            .intention_core
            .split_whitespace()
            .next()
            .map(|w| vec![format!("intent:{}", w)])
            .unwrap_or_default();
        Ok(SemanticMap {
            clusters,
            hash_contextual: sha256_hex(intent.intention_core.as_bytes()),
        })
    }

    async fn seal_envelope(
        &self,
        intent: &IntentRecord,
        semantics: &SemanticMap,
    ) -> Result<Option<Envelope>, StageError> {
        let seal = sha256_hex(
            format!("{}|{}", semantics.hash_contextual, intent.intention_core).as_bytes(),
        );
        let spread = u8::from_str_radix(&seal[..2], 16)
            .map_err(|e| StageError::Failed(format!("seal digest: {}", e)))?;
        Ok(Some(Envelope {
            shard_id: format!("bips-{}", &seal[..12]),
            hash_contextual: semantics.hash_contextual.clone(),
            similarity_score: round4(0.01 + spread as f64 / 255.0 * 0.1),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reference_stages_are_deterministic() {
        let stages = ReferenceStages::new();
        let a = stages.extract_prosody(b"hello audio").await.unwrap();
        let b = stages.extract_prosody(b"hello audio").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.features.len(), PROSODY_DIMS);
        assert!(a.validate().is_ok());

        let intent = stages.synthesize_intent(&a).await.unwrap();
        assert!(INTENTS.contains(&intent.intention_core.as_str()));
        assert!(intent.validate().is_ok());
    }

    #[tokio::test]
    async fn test_empty_audio_is_invalid() {
        let stages = ReferenceStages::new();
        assert!(matches!(
            stages.extract_prosody(b"").await,
            Err(StageError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_envelope_is_within_bounds() {
        let stages = ReferenceStages::new();
        for intent in INTENTS {
            let intent = IntentRecord {
                intention_core: intent.into(),
                confidence: 0.9,
            };
            let semantics = stages.map_semantics(&intent).await.unwrap();
            assert!(semantics.validate().is_ok());
            let envelope = stages
                .seal_envelope(&intent, &semantics)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(envelope.validate(), Ok(()));
        }
    }

    #[test]
    fn test_providers_end_with_cpu() {
        let stages = ReferenceStages::new();
        assert_eq!(stages.providers().last(), Some(&ExecutionProvider::Cpu));
    }
}
