//! Log of shards and ethical metadata received via relay

use super::GossipTransport;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

/// Default number of entries kept per topic
pub const DEFAULT_RECEIVED_CAPACITY: usize = 1_000;

/// Bounded FIFO of received messages, oldest dropped first
pub struct ReceivedLog {
    shards: RwLock<VecDeque<Value>>,
    ulx: RwLock<VecDeque<Value>>,
    capacity: usize,
}

impl ReceivedLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            shards: RwLock::new(VecDeque::new()),
            ulx: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn record_shard(&self, shard: Value) {
        push_bounded(&mut *self.shards.write().await, shard, self.capacity);
    }

    pub async fn record_ulx(&self, metadata: Value) {
        push_bounded(&mut *self.ulx.write().await, metadata, self.capacity);
    }

    pub async fn shard_count(&self) -> usize {
        self.shards.read().await.len()
    }

    pub async fn ulx_items(&self) -> Vec<Value> {
        self.ulx.read().await.iter().cloned().collect()
    }

    pub async fn clear(&self) {
        self.shards.write().await.clear();
        self.ulx.write().await.clear();
    }

    /// Record messages arriving on the two topics until `cancel` fires.
    /// Messages published by the local peer are skipped.
    pub async fn spawn_listener(
        self: &Arc<Self>,
        transport: Arc<dyn GossipTransport>,
        shard_topic: &str,
        ulx_topic: &str,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let mut shard_rx = transport.subscribe(shard_topic).await;
        let mut ulx_rx = transport.subscribe(ulx_topic).await;
        let log = Arc::clone(self);
        let local = transport.local_peer_id().to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = shard_rx.recv() => match msg {
                        Ok(msg) if msg.from != local => {
                            if let Some(value) = decode(&msg.data, &msg.topic) {
                                log.record_shard(value).await;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "Shard relay listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    msg = ulx_rx.recv() => match msg {
                        Ok(msg) if msg.from != local => {
                            if let Some(value) = decode(&msg.data, &msg.topic) {
                                log.record_ulx(value).await;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "Metadata relay listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!("Relay listener stopped");
        })
    }
}

fn push_bounded(queue: &mut VecDeque<Value>, value: Value, capacity: usize) {
    while queue.len() >= capacity {
        queue.pop_front();
    }
    queue.push_back(value);
}

fn decode(data: &[u8], topic: &str) -> Option<Value> {
    match serde_json::from_slice(data) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(topic, "Dropping undecodable relay message: {}", e);
            None
        }
    }
}
