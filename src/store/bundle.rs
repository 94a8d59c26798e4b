//! Representation bundles
//!
//! A bundle is the only form of a shard that leaves the store. It carries
//! identities, expiry, a content-independent tone and coarse projections of
//! the emotion vector and context hash. None of the raw shard fields are
//! present, and the projections cannot be inverted back to them.

use crate::crypto::sha256_hex;
use crate::shard::EmoShard;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Spacing between synthetic timeline samples
pub const TIMELINE_STEP_MS: u64 = 250;

/// Width of each context-hash slice used as a scene tag
pub const SCENE_TAG_WIDTH: usize = 8;

/// Maximum number of scene tags per bundle
pub const MAX_SCENE_TAGS: usize = 4;

const TONE_SAMPLE_RATE: u32 = 8_000;
const TONE_SAMPLES: usize = 800;
const TONE_HALF_PERIOD: usize = 9;
const TONE_AMPLITUDE: i16 = 6_000;

/// One synthetic sample on the emotional timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSample {
    pub t_ms: u64,
    pub channel: String,
    pub value: f64,
}

/// Redacted, externally-safe projection of a stored shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentationBundle {
    pub shard_id: String,
    pub shard_hash: String,
    pub store_state_id: String,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    /// Base64 WAV, identical for every shard
    pub synthetic_audio: String,
    pub emotional_timeline: Vec<TimelineSample>,
    pub scene_tags: Vec<String>,
}

/// Identities a put returns to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreReceipt {
    pub shard_id: String,
    pub shard_hash: String,
    pub store_state_id: String,
    pub expires_at_ms: u64,
}

impl RepresentationBundle {
    /// Project a shard whose `shard_hash` has already been computed.
    pub fn project(shard: &EmoShard, shard_hash: &str, created_at_ms: u64, ttl_ms: u64) -> Self {
        let shard_id = derive_shard_id(shard, shard_hash);
        let store_state_id = sha256_hex(format!("{}:{}", shard_hash, created_at_ms).as_bytes())
            [..16]
            .to_string();

        Self {
            shard_id,
            shard_hash: shard_hash.to_string(),
            store_state_id,
            created_at_ms,
            expires_at_ms: created_at_ms.saturating_add(ttl_ms),
            synthetic_audio: synthetic_tone().to_string(),
            emotional_timeline: timeline(&shard.emotion_vector),
            scene_tags: scene_tags(shard),
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms <= now_ms
    }

    pub fn receipt(&self) -> StoreReceipt {
        StoreReceipt {
            shard_id: self.shard_id.clone(),
            shard_hash: self.shard_hash.clone(),
            store_state_id: self.store_state_id.clone(),
            expires_at_ms: self.expires_at_ms,
        }
    }
}

/// Envelope id when present, else the first 16 hex chars of the hash
pub fn derive_shard_id(shard: &EmoShard, shard_hash: &str) -> String {
    match &shard.bips_envelope {
        Some(envelope) => envelope.shard_id.clone(),
        None => shard_hash[..16.min(shard_hash.len())].to_string(),
    }
}

fn timeline(vector: &[f64]) -> Vec<TimelineSample> {
    vector
        .iter()
        .enumerate()
        .map(|(i, v)| TimelineSample {
            t_ms: i as u64 * TIMELINE_STEP_MS,
            channel: format!("ch{}", i),
            // bounded and quantized to quarter steps
            value: (v.tanh() * 4.0).round() / 4.0,
        })
        .collect()
}

fn scene_tags(shard: &EmoShard) -> Vec<String> {
    let Some(envelope) = &shard.bips_envelope else {
        return Vec::new();
    };
    let hash = envelope.hash_contextual.to_ascii_lowercase();
    hash.as_bytes()
        .chunks(SCENE_TAG_WIDTH)
        .take(MAX_SCENE_TAGS)
        .map(|chunk| format!("scene-{}", String::from_utf8_lossy(chunk)))
        .collect()
}

/// Fixed square-wave tone as a base64 mono 16-bit PCM WAV.
pub fn synthetic_tone() -> &'static str {
    static TONE: OnceLock<String> = OnceLock::new();
    TONE.get_or_init(|| STANDARD.encode(tone_wav()))
}

fn tone_wav() -> Vec<u8> {
    let data_len = (TONE_SAMPLES * 2) as u32;
    let byte_rate = TONE_SAMPLE_RATE * 2;
    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&TONE_SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..TONE_SAMPLES {
        let sample = if (i / TONE_HALF_PERIOD) % 2 == 0 {
            TONE_AMPLITUDE
        } else {
            -TONE_AMPLITUDE
        };
        wav.extend_from_slice(&sample.to_le_bytes());
    }
    wav
}
