//! Gossip relay
//!
//! The node only needs two things from its transport: publish bytes on a
//! topic (reporting success as a bool) and a stream of messages received on
//! a topic. Peer discovery and wire protocols live behind
//! [`GossipTransport`].

mod hub;
mod received;

pub use hub::{GossipHub, HubTransport};
pub use received::{ReceivedLog, DEFAULT_RECEIVED_CAPACITY};

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default topic for relayed shards
pub const SHARD_TOPIC: &str = "hgi/emoshard/1.0.0";

/// Default topic for relayed ethical metadata
pub const ULX_TOPIC: &str = "hgi/ulx/1.0.0";

/// Role a node plays in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    Full,
    Relay,
    Light,
}

impl std::str::FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(NodeType::Full),
            "relay" => Ok(NodeType::Relay),
            "light" => Ok(NodeType::Light),
            other => Err(format!("unknown node type: {}", other)),
        }
    }
}

/// A message delivered on a topic
#[derive(Debug, Clone, PartialEq)]
pub struct GossipMessage {
    pub topic: String,
    pub from: String,
    pub data: Bytes,
}

/// Publish/subscribe capability of the peer-to-peer layer
#[async_trait]
pub trait GossipTransport: Send + Sync {
    async fn start(&self) -> Result<()>;

    /// Leave the mesh and release transport resources
    async fn stop(&self) -> Result<()>;

    async fn is_started(&self) -> bool;

    /// Publish to every peer subscribed to `topic`. `false` when the
    /// transport cannot publish.
    async fn publish(&self, topic: &str, data: Bytes) -> bool;

    async fn subscribe(&self, topic: &str) -> broadcast::Receiver<GossipMessage>;

    /// Currently connected peer ids
    async fn peers(&self) -> Vec<String>;

    fn local_peer_id(&self) -> &str;

    async fn listen_addrs(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_parse() {
        assert_eq!("Relay".parse::<NodeType>().unwrap(), NodeType::Relay);
        assert_eq!(" light ".parse::<NodeType>().unwrap(), NodeType::Light);
        assert!("bootstrap".parse::<NodeType>().is_err());
    }
}
