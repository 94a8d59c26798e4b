//! Assembly errors

use super::stages::StageError;
use super::types::Stage;
use crate::ethics::RiskFlag;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Why assembly produced no packet
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// A stage record failed structural validation
    #[error("{stage} validation failed: {reason}")]
    Validation { stage: Stage, reason: String },

    /// The hard ethical gate raised risk flags
    #[error("ethical gate aborted assembly: {flags:?}")]
    EthicalGate { flags: Vec<RiskFlag> },

    /// The shard has no irreversibility envelope
    #[error("shard has no irreversibility envelope")]
    MissingEnvelope,

    /// A stage collaborator failed
    #[error("{stage} stage failed: {message}")]
    Stage { stage: Stage, message: String },

    /// A stage exceeded its time budget
    #[error("{stage} stage timed out after {timeout_ms}ms")]
    Timeout { stage: Stage, timeout_ms: u64 },

    /// The ephemeral store rejected the shard
    #[error("store put failed: {0}")]
    Store(crate::error::Error),

    /// Frame or packet encoding failed
    #[error("internal error: {0}")]
    Internal(String),
}

impl AssemblyError {
    /// Map a collaborator error onto the stage it came from.
    pub fn from_stage(stage: Stage, err: StageError) -> Self {
        match err {
            StageError::Invalid(reason) => AssemblyError::Validation { stage, reason },
            StageError::Failed(message) => AssemblyError::Stage { stage, message },
            StageError::TimedOut { timeout_ms } => AssemblyError::Timeout { stage, timeout_ms },
        }
    }

    /// Stage the failure is attributed to
    pub fn stage(&self) -> Stage {
        match self {
            AssemblyError::Validation { stage, .. }
            | AssemblyError::Stage { stage, .. }
            | AssemblyError::Timeout { stage, .. } => *stage,
            AssemblyError::EthicalGate { .. } => Stage::Gate,
            AssemblyError::MissingEnvelope => Stage::Envelope,
            AssemblyError::Store(_) => Stage::Store,
            AssemblyError::Internal(_) => Stage::Shard,
        }
    }

    /// Whether this looks like a resource or model failure rather than bad data
    pub fn is_resource_class(&self) -> bool {
        match self {
            AssemblyError::Timeout { .. } => true,
            AssemblyError::Stage { message, .. } => is_resource_failure(message),
            _ => false,
        }
    }
}

fn resource_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)out[ -]of[ -]memory|\boom\b|execution provider|\bcuda|alloc")
            .expect("static pattern")
    })
}

/// Whether a failure message names memory, allocation or provider trouble
pub fn is_resource_failure(message: &str) -> bool {
    resource_pattern().is_match(message)
}
