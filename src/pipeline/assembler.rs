//! Frame and packet assembly
//!
//! Runs the synthesis stages in order, validates and wraps every output in a
//! content-addressed [`Frame`], applies the hard ethical gate, persists the
//! shard and returns the terminal [`Packet`]. Any failure returns an error
//! and no packet; a gate abort also means no store put.

use super::error::AssemblyError;
use super::stages::SynthesisStages;
use super::types::{
    validate_score, EthicalMetadata, Frame, Layer, Packet, ScoringRecord, Stage, PACKET_ID_LEN,
    PACKET_TYPE, PROTOCOL, STATE_RELEASE,
};
use crate::clock::Clock;
use crate::crypto::content_hash;
use crate::ethics::hard_gate;
use crate::shard::EmoShard;
use crate::store::ShardStore;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Builds packets from raw audio
pub struct PacketAssembler {
    stages: Arc<dyn SynthesisStages>,
    store: Arc<ShardStore>,
    clock: Arc<dyn Clock>,
}

impl PacketAssembler {
    pub fn new(
        stages: Arc<dyn SynthesisStages>,
        store: Arc<ShardStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            stages,
            store,
            clock,
        }
    }

    /// Run every stage for `audio` on behalf of `sender_node_id`.
    ///
    /// The packet id hashes the frames and the shard, both of which carry
    /// clock readings, so identical audio assembled at different times gets
    /// different ids.
    pub async fn assemble(
        &self,
        audio: &[u8],
        sender_node_id: &str,
    ) -> Result<Packet, AssemblyError> {
        let mut states = Vec::with_capacity(Layer::ALL.len());

        // L1
        let prosody = self
            .stages
            .extract_prosody(audio)
            .await
            .map_err(|e| AssemblyError::from_stage(Stage::Prosody, e))?;
        check(Stage::Prosody, prosody.validate())?;
        states.push(self.frame(Layer::Prosody, sender_node_id, &prosody)?);

        // L2
        let intent = self
            .stages
            .synthesize_intent(&prosody)
            .await
            .map_err(|e| AssemblyError::from_stage(Stage::Intent, e))?;
        check(Stage::Intent, intent.validate())?;
        states.push(self.frame(Layer::Intent, sender_node_id, &intent)?);

        // L3: both scoring sub-calls at once
        let (score, semantics) = tokio::join!(
            self.stages.score_ethics(&intent),
            self.stages.map_semantics(&intent)
        );
        let score = score.map_err(|e| AssemblyError::from_stage(Stage::Ethics, e))?;
        check(Stage::Ethics, validate_score(&score))?;
        let semantics = semantics.map_err(|e| AssemblyError::from_stage(Stage::Semantics, e))?;
        check(Stage::Semantics, semantics.validate())?;
        let scoring = ScoringRecord {
            ethical_score: score,
            semantic_map: semantics,
        };
        states.push(self.frame(Layer::Ethics, sender_node_id, &scoring)?);

        // L4
        let verdict = hard_gate(&scoring.ethical_score);
        if !verdict.passed() {
            tracing::warn!(
                sender = sender_node_id,
                flags = ?verdict.risk_flags,
                "Hard ethical gate aborted assembly"
            );
            return Err(AssemblyError::EthicalGate {
                flags: verdict.risk_flags,
            });
        }
        states.push(self.frame(Layer::Gate, sender_node_id, &verdict)?);

        // L5
        let envelope = self
            .stages
            .seal_envelope(&intent, &scoring.semantic_map)
            .await
            .map_err(|e| AssemblyError::from_stage(Stage::Envelope, e))?
            .ok_or(AssemblyError::MissingEnvelope)?;
        let shard = EmoShard {
            emotion_vector: prosody.features.clone(),
            intention_core: intent.intention_core.clone(),
            ethical_score: Some(scoring.ethical_score.clone()),
            bips_envelope: Some(envelope),
            timestamp: self.clock.now_ms(),
        };
        shard.validate().map_err(|e| AssemblyError::Validation {
            stage: Stage::Shard,
            reason: e.to_string(),
        })?;
        states.push(self.frame(Layer::Shard, sender_node_id, &shard)?);

        // L6
        let receipt = self
            .store
            .put_receipt(&shard)
            .await
            .map_err(AssemblyError::Store)?;
        states.push(self.frame(Layer::Store, sender_node_id, &receipt)?);

        let ethical_metadata = EthicalMetadata {
            ethical_color: verdict.ethical_color,
            toxicity_score: verdict.toxicity_score,
            risk_flags: verdict.risk_flags,
        };
        let packet_id = packet_id(&json!({
            "protocol": PROTOCOL,
            "packet_type": PACKET_TYPE,
            "state": STATE_RELEASE,
            "payload": &shard,
            "ethical_metadata": &ethical_metadata,
            "store_keys": {
                "shard_id": &receipt.shard_id,
                "shard_hash": &receipt.shard_hash,
                "store_state_id": &receipt.store_state_id,
            },
            "states": &states,
        }))?;

        tracing::info!(
            packet_id = %packet_id,
            shard_id = %receipt.shard_id,
            stages = self.stages.name(),
            "Assembled packet"
        );

        Ok(Packet {
            protocol: PROTOCOL.to_string(),
            packet_type: PACKET_TYPE.to_string(),
            state: STATE_RELEASE.to_string(),
            packet_id,
            timestamp_ms: self.clock.now_ms(),
            payload: shard,
            ethical_metadata,
            states,
            final_receipt: receipt,
        })
    }

    fn frame<T: Serialize>(
        &self,
        layer: Layer,
        sender_node_id: &str,
        record: &T,
    ) -> Result<Frame, AssemblyError> {
        Frame::new(layer, sender_node_id, record, self.clock.now_ms())
            .map_err(|e| AssemblyError::Internal(e.to_string()))
    }
}

fn check(stage: Stage, result: Result<(), String>) -> Result<(), AssemblyError> {
    result.map_err(|reason| AssemblyError::Validation { stage, reason })
}

/// First `PACKET_ID_LEN` hex characters of the canonical hash of `material`.
fn packet_id(material: &serde_json::Value) -> Result<String, AssemblyError> {
    let hash = content_hash(material).map_err(|e| AssemblyError::Internal(e.to_string()))?;
    Ok(hash[..PACKET_ID_LEN].to_string())
}
