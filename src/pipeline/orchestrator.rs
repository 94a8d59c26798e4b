//! Timeout-wrapped stage orchestration
//!
//! [`StageOrchestrator`] decorates another [`SynthesisStages`]. Each call
//! races the inner stage against a timeout. When the timeout fires, or the
//! stage fails with a resource-class message, a fixed fallback record is
//! substituted. Validation failures always propagate.

use super::error::is_resource_failure;
use super::stages::{StageError, SynthesisStages};
use super::types::{IntentRecord, ProsodyFeatures, SemanticMap, Stage};
use crate::crypto::sha256_hex;
use crate::ethics::{EthicalColor, EthicalScore};
use crate::shard::Envelope;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default per-stage time budget
pub const DEFAULT_STAGE_TIMEOUT_MS: u64 = 5_000;

const FALLBACK_DIMS: usize = 8;
const FALLBACK_INTENT: &str = "unspecified";

/// Stage decorator with timeouts and deterministic fallbacks
pub struct StageOrchestrator {
    inner: Arc<dyn SynthesisStages>,
    timeout: Duration,
    fallback_enabled: bool,
}

impl StageOrchestrator {
    pub fn new(inner: Arc<dyn SynthesisStages>) -> Self {
        Self {
            inner,
            timeout: Duration::from_millis(DEFAULT_STAGE_TIMEOUT_MS),
            fallback_enabled: true,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// When disabled, timeouts and resource failures propagate as errors.
    pub fn fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    async fn guard<T, F>(
        &self,
        stage: Stage,
        fut: F,
        fallback: impl FnOnce() -> T,
    ) -> Result<T, StageError>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(StageError::Failed(message)))
                if self.fallback_enabled && is_resource_failure(&message) =>
            {
                tracing::warn!(%stage, error = %message, "Stage resource failure, using fallback");
                Ok(fallback())
            }
            Ok(Err(e)) => Err(e),
            Err(_) if self.fallback_enabled => {
                tracing::warn!(
                    %stage,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Stage timed out, using fallback"
                );
                Ok(fallback())
            }
            Err(_) => Err(StageError::TimedOut {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

fn fallback_prosody() -> ProsodyFeatures {
    ProsodyFeatures {
        features: vec![0.0; FALLBACK_DIMS],
        duration_ms: 0,
    }
}

fn fallback_intent() -> IntentRecord {
    IntentRecord {
        intention_core: FALLBACK_INTENT.to_string(),
        confidence: 0.0,
    }
}

// Never green: a substituted score must not look safer than a real one.
fn fallback_score() -> EthicalScore {
    EthicalScore::new(EthicalColor::YellowCaution, 0.5)
}

fn fallback_semantics(intent: &IntentRecord) -> SemanticMap {
    SemanticMap {
        clusters: vec!["fallback".to_string()],
        hash_contextual: sha256_hex(intent.intention_core.as_bytes()),
    }
}

fn fallback_envelope(semantics: &SemanticMap) -> Option<Envelope> {
    Some(Envelope {
        shard_id: format!("fallback-{}", &semantics.hash_contextual[..16]),
        hash_contextual: semantics.hash_contextual.clone(),
        similarity_score: 0.0,
    })
}

#[async_trait]
impl SynthesisStages for StageOrchestrator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn extract_prosody(&self, audio: &[u8]) -> Result<ProsodyFeatures, StageError> {
        self.guard(Stage::Prosody, self.inner.extract_prosody(audio), fallback_prosody)
            .await
    }

    async fn synthesize_intent(
        &self,
        prosody: &ProsodyFeatures,
    ) -> Result<IntentRecord, StageError> {
        self.guard(Stage::Intent, self.inner.synthesize_intent(prosody), fallback_intent)
            .await
    }

    async fn score_ethics(&self, intent: &IntentRecord) -> Result<EthicalScore, StageError> {
        self.guard(Stage::Ethics, self.inner.score_ethics(intent), fallback_score)
            .await
    }

    async fn map_semantics(&self, intent: &IntentRecord) -> Result<SemanticMap, StageError> {
        self.guard(Stage::Semantics, self.inner.map_semantics(intent), || {
            fallback_semantics(intent)
        })
        .await
    }

    async fn seal_envelope(
        &self,
        intent: &IntentRecord,
        semantics: &SemanticMap,
    ) -> Result<Option<Envelope>, StageError> {
        // the fallback slices the hash, so it must have the expected shape
        if semantics.validate().is_err() {
            return self.inner.seal_envelope(intent, semantics).await;
        }
        self.guard(
            Stage::Envelope,
            self.inner.seal_envelope(intent, semantics),
            || fallback_envelope(semantics),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::ReferenceStages;

    /// Stages that hang, fail or misbehave on demand
    struct FaultyStages {
        mode: Fault,
    }

    #[derive(Clone, Copy)]
    enum Fault {
        Hang,
        Oom,
        Invalid,
        Plain,
    }

    impl FaultyStages {
        async fn fail<T>(&self) -> Result<T, StageError> {
            match self.mode {
                Fault::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(StageError::Failed("unreachable".into()))
                }
                Fault::Oom => Err(StageError::Failed("CUDA out of memory".into())),
                Fault::Invalid => Err(StageError::Invalid("bad shape".into())),
                Fault::Plain => Err(StageError::Failed("model returned garbage".into())),
            }
        }
    }

    #[async_trait]
    impl SynthesisStages for FaultyStages {
        fn name(&self) -> &str {
            "faulty"
        }
        async fn extract_prosody(&self, _: &[u8]) -> Result<ProsodyFeatures, StageError> {
            self.fail().await
        }
        async fn synthesize_intent(&self, _: &ProsodyFeatures) -> Result<IntentRecord, StageError> {
            self.fail().await
        }
        async fn score_ethics(&self, _: &IntentRecord) -> Result<EthicalScore, StageError> {
            self.fail().await
        }
        async fn map_semantics(&self, _: &IntentRecord) -> Result<SemanticMap, StageError> {
            self.fail().await
        }
        async fn seal_envelope(
            &self,
            _: &IntentRecord,
            _: &SemanticMap,
        ) -> Result<Option<Envelope>, StageError> {
            self.fail().await
        }
    }

    fn orchestrate(mode: Fault) -> StageOrchestrator {
        StageOrchestrator::new(Arc::new(FaultyStages { mode })).timeout(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_timeout_substitutes_fallback() {
        let stages = orchestrate(Fault::Hang);
        let prosody = stages.extract_prosody(b"x").await.unwrap();
        assert_eq!(prosody, fallback_prosody());

        let score = stages.score_ethics(&fallback_intent()).await.unwrap();
        assert_eq!(score.ethical_color, EthicalColor::YellowCaution);
    }

    #[tokio::test]
    async fn test_resource_failure_substitutes_fallback() {
        let stages = orchestrate(Fault::Oom);
        let intent = stages
            .synthesize_intent(&fallback_prosody())
            .await
            .unwrap();
        assert_eq!(intent.intention_core, FALLBACK_INTENT);

        let semantics = stages.map_semantics(&intent).await.unwrap();
        let envelope = stages
            .seal_envelope(&intent, &semantics)
            .await
            .unwrap()
            .unwrap();
        assert!(envelope.shard_id.starts_with("fallback-"));
        assert_eq!(envelope.validate(), Ok(()));
    }

    #[tokio::test]
    async fn test_fallbacks_are_deterministic() {
        let a = orchestrate(Fault::Oom);
        let b = orchestrate(Fault::Hang);
        let intent = fallback_intent();
        assert_eq!(
            a.map_semantics(&intent).await.unwrap(),
            b.map_semantics(&intent).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_validation_errors_propagate() {
        let stages = orchestrate(Fault::Invalid);
        assert_eq!(
            stages.extract_prosody(b"x").await,
            Err(StageError::Invalid("bad shape".into()))
        );
    }

    #[tokio::test]
    async fn test_non_resource_failures_propagate() {
        let stages = orchestrate(Fault::Plain);
        assert!(matches!(
            stages.score_ethics(&fallback_intent()).await,
            Err(StageError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_fallback_disabled_reports_timeout() {
        let stages = orchestrate(Fault::Hang).fallback(false);
        assert_eq!(
            stages.extract_prosody(b"x").await,
            Err(StageError::TimedOut { timeout_ms: 20 })
        );
    }

    #[tokio::test]
    async fn test_healthy_stages_pass_through() {
        let inner = Arc::new(ReferenceStages::new());
        let stages = StageOrchestrator::new(inner.clone());
        assert_eq!(
            stages.extract_prosody(b"abc").await.unwrap(),
            inner.extract_prosody(b"abc").await.unwrap()
        );
    }
}
