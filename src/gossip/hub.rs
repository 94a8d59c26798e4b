//! In-process gossip hub
//!
//! Every [`HubTransport`] joined to the same [`GossipHub`] sees every other
//! started transport as a peer, and messages published on a topic fan out to
//! every subscriber of that topic. Used for single-node runs and for
//! multi-node tests without sockets.

use super::{GossipMessage, GossipTransport, NodeType};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const TOPIC_BUFFER: usize = 256;

/// Shared fan-out network
#[derive(Clone, Default)]
pub struct GossipHub {
    inner: Arc<RwLock<HubInner>>,
}

#[derive(Default)]
struct HubInner {
    members: BTreeSet<String>,
    topics: HashMap<String, broadcast::Sender<GossipMessage>>,
}

impl GossipHub {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender(&self, topic: &str) -> broadcast::Sender<GossipMessage> {
        let mut inner = self.inner.write().await;
        inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_BUFFER).0)
            .clone()
    }
}

/// A node's handle on a [`GossipHub`]
pub struct HubTransport {
    hub: GossipHub,
    peer_id: String,
    node_type: NodeType,
    listen_port: u16,
    bootstrap: Vec<String>,
    started: RwLock<bool>,
}

impl HubTransport {
    pub fn new(hub: GossipHub, node_type: NodeType, listen_port: u16) -> Self {
        Self {
            hub,
            peer_id: format!("peer-{}", uuid::Uuid::new_v4().simple()),
            node_type,
            listen_port,
            bootstrap: Vec::new(),
            started: RwLock::new(false),
        }
    }

    /// Bootstrap addresses logged on start
    pub fn with_bootstrap(mut self, peers: Vec<String>) -> Self {
        self.bootstrap = peers;
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }
}

#[async_trait]
impl GossipTransport for HubTransport {
    async fn start(&self) -> Result<()> {
        let mut started = self.started.write().await;
        if *started {
            return Ok(());
        }
        self.hub.inner.write().await.members.insert(self.peer_id.clone());
        *started = true;
        tracing::info!(
            peer_id = %self.peer_id,
            node_type = ?self.node_type,
            bootstrap = self.bootstrap.len(),
            "Gossip transport started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut started = self.started.write().await;
        if !*started {
            return Ok(());
        }
        self.hub.inner.write().await.members.remove(&self.peer_id);
        *started = false;
        tracing::info!(peer_id = %self.peer_id, "Gossip transport stopped");
        Ok(())
    }

    async fn is_started(&self) -> bool {
        *self.started.read().await
    }

    async fn publish(&self, topic: &str, data: Bytes) -> bool {
        if !self.is_started().await {
            tracing::debug!(topic, "Publish on stopped transport");
            return false;
        }
        let message = GossipMessage {
            topic: topic.to_string(),
            from: self.peer_id.clone(),
            data,
        };
        // zero receivers is not a failure
        let delivered = self.hub.sender(topic).await.send(message).unwrap_or(0);
        tracing::debug!(topic, delivered, "Published gossip message");
        true
    }

    async fn subscribe(&self, topic: &str) -> broadcast::Receiver<GossipMessage> {
        self.hub.sender(topic).await.subscribe()
    }

    async fn peers(&self) -> Vec<String> {
        if !self.is_started().await {
            return Vec::new();
        }
        self.hub
            .inner
            .read()
            .await
            .members
            .iter()
            .filter(|id| **id != self.peer_id)
            .cloned()
            .collect()
    }

    fn local_peer_id(&self) -> &str {
        &self.peer_id
    }

    async fn listen_addrs(&self) -> Vec<String> {
        if !self.is_started().await {
            return Vec::new();
        }
        vec![format!(
            "/ip4/127.0.0.1/tcp/{}/p2p/{}",
            self.listen_port, self.peer_id
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_peers_see_each_other() {
        let hub = GossipHub::new();
        let a = HubTransport::new(hub.clone(), NodeType::Full, 4001);
        let b = HubTransport::new(hub.clone(), NodeType::Relay, 4002);
        a.start().await.unwrap();
        b.start().await.unwrap();

        assert_eq!(a.peers().await, vec![b.local_peer_id().to_string()]);
        assert_eq!(b.peers().await, vec![a.local_peer_id().to_string()]);

        b.stop().await.unwrap();
        assert!(a.peers().await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_fans_out() {
        let hub = GossipHub::new();
        let a = HubTransport::new(hub.clone(), NodeType::Full, 4001);
        let b = HubTransport::new(hub.clone(), NodeType::Full, 4002);
        a.start().await.unwrap();
        b.start().await.unwrap();

        let mut rx = b.subscribe("t").await;
        assert!(a.publish("t", Bytes::from_static(b"hello")).await);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.from, a.local_peer_id());
        assert_eq!(msg.data, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let a = HubTransport::new(GossipHub::new(), NodeType::Full, 4001);
        a.start().await.unwrap();
        assert!(a.publish("empty", Bytes::new()).await);
    }

    #[tokio::test]
    async fn test_stopped_transport_cannot_publish() {
        let a = HubTransport::new(GossipHub::new(), NodeType::Light, 4001);
        assert!(!a.publish("t", Bytes::new()).await);
        assert!(a.listen_addrs().await.is_empty());

        a.start().await.unwrap();
        assert_eq!(a.listen_addrs().await.len(), 1);
        a.stop().await.unwrap();
        assert!(!a.publish("t", Bytes::new()).await);
    }
}
