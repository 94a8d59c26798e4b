//! Content-addressed ephemeral store
//!
//! Shards are persisted only as redacted [`RepresentationBundle`]s with a
//! fixed time-to-live. Expired entries are removed lazily on read and on a
//! scheduled sweep.

mod bundle;
mod ephemeral;

pub use bundle::{
    derive_shard_id, synthetic_tone, RepresentationBundle, StoreReceipt, TimelineSample,
    MAX_SCENE_TAGS, SCENE_TAG_WIDTH, TIMELINE_STEP_MS,
};
pub use ephemeral::{ShardStore, DEFAULT_TTL_MS};
