//! Frame and packet assembly pipeline
//!
//! ```text
//! audio → prosody → intent → (ethics ∥ semantics) → hard gate → shard → store
//!   L1        L2         L3                            L4        L5      L6
//! ```

pub mod assembler;
pub mod backend;
pub mod error;
pub mod orchestrator;
pub mod stages;
pub mod types;

pub use assembler::PacketAssembler;
pub use backend::{preferred_providers, probe_capabilities, Capability, ExecutionProvider};
pub use error::{is_resource_failure, AssemblyError};
pub use orchestrator::{StageOrchestrator, DEFAULT_STAGE_TIMEOUT_MS};
pub use stages::{ReferenceStages, StageError, SynthesisStages};
pub use types::{
    frame_message_id, EthicalMetadata, Frame, IntentRecord, Layer, Packet, ProsodyFeatures,
    ScoringRecord, SemanticMap, Stage, FRAME_VERSION, PACKET_ID_LEN, PACKET_TYPE, PROTOCOL,
    STATE_RELEASE,
};
