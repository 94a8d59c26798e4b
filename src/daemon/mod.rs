//! Network boundary daemon
//!
//! Authenticates inbound shards (role, signature, timestamp freshness),
//! derives an idempotent identity, applies the soft ethical gate and on
//! acceptance records, stores and relays the shard.

pub mod admission;
pub mod error;
pub mod handler;
pub mod ingest;
pub mod server;

pub use admission::{AdmissionRecord, DEFAULT_ADMISSION_CAPACITY};
pub use error::BoundaryError;
pub use handler::router;
pub use ingest::{check_skew, parse_submission, resolve_identity, Submission};
pub use server::{
    Credentials, IngestResponse, NodeState, NodeStatus, ShardNode, ShardNodeBuilder,
    PUBKEY_HEADER, ROLE_HEADER, SIGNATURE_HEADER,
};
