//! HGI shard node error types

use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cryptographic error (key parsing, signature verification)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Ephemeral store error
    #[error("Store error: {0}")]
    Store(String),

    /// Gossip transport error
    #[error("Gossip error: {0}")]
    Gossip(String),

    /// Daemon lifecycle error
    #[error("Daemon error: {0}")]
    Daemon(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for shard node operations
pub type Result<T> = std::result::Result<T, Error>;
