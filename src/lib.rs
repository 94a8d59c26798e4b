//! HGI Shard - emotional shard ingestion node
//!
//! Ingests short-lived "emotional shard" artifacts produced by a multi-stage
//! synthesis pipeline, stamps them with content-derived identities, gates
//! them on ethical colour and producer role, keeps a redacted projection in a
//! time-bounded local store, and relays admitted shards over gossip.
//!
//! ## Architecture
//!
//! ```text
//!   audio bytes
//!       │
//! ┌─────▼──────────────────────────────────────────────┐
//! │ PacketAssembler                                    │
//! │  prosody → intent → ethics∥semantics → HARD GATE   │
//! │  → shard → store put → Packet (6 frames)           │
//! └─────┬──────────────────────────────────────────────┘
//!       │ Packet / EmoShard
//! ┌─────▼──────────────────────────────────────────────┐
//! │ ShardNode (HTTP boundary)                          │
//! │  role → signature headers → body → identity        │
//! │  → timestamp skew → signature → SOFT GATE          │
//! └─────┬───────────────────────┬──────────────────────┘
//!       │ admitted              │ admitted
//! ┌─────▼─────────────┐  ┌──────▼─────────────────────┐
//! │ ShardStore        │  │ GossipTransport            │
//! │ redacted bundles, │  │ shard topic + ulx topic    │
//! │ 24h TTL           │  │                            │
//! └───────────────────┘  └────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`pipeline`]: frame and packet assembly, stage orchestration
//! - [`ethics`]: ethical colours, role weights, hard and soft gates
//! - [`daemon`]: HTTP boundary and the node service handle
//! - [`store`]: content-addressed ephemeral store
//! - [`gossip`]: relay transport and received-message log
//! - [`crypto`]: canonical hashing and Ed25519 signatures
//! - [`config`]: configuration management

pub mod clock;
pub mod config;
pub mod crypto;
pub mod daemon;
pub mod error;
pub mod ethics;
pub mod gossip;
pub mod pipeline;
pub mod shard;
pub mod store;

pub use config::HgiConfig;
pub use error::{Error, Result};
pub use shard::{EmoShard, Envelope};
