//! In-memory admission record
//!
//! Keyed by resolved submission identity. Capacity-bounded: when full, the
//! oldest admission is evicted. Re-admitting an existing id replaces the
//! shard without changing its position.

use crate::shard::EmoShard;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Default admission capacity
pub const DEFAULT_ADMISSION_CAPACITY: usize = 10_000;

/// Admitted shards for the lifetime of the node
pub struct AdmissionRecord {
    inner: RwLock<AdmissionInner>,
}

struct AdmissionInner {
    map: HashMap<String, EmoShard>,
    /// front = oldest
    order: VecDeque<String>,
    capacity: usize,
}

impl AdmissionRecord {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(AdmissionInner {
                map: HashMap::with_capacity(capacity.min(1024)),
                order: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
            }),
        }
    }

    /// Insert, returning the evicted id if the record was full.
    pub async fn admit(&self, id: String, shard: EmoShard) -> Option<String> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.map.get_mut(&id) {
            *existing = shard;
            return None;
        }

        let evicted = if inner.map.len() >= inner.capacity {
            let oldest = inner.order.pop_front();
            if let Some(oldest) = &oldest {
                inner.map.remove(oldest);
                tracing::debug!(id = %oldest, "Evicted oldest admission");
            }
            oldest
        } else {
            None
        };

        inner.order.push_back(id.clone());
        inner.map.insert(id, shard);
        evicted
    }

    pub async fn get(&self, id: &str) -> Option<EmoShard> {
        self.inner.read().await.map.get(id).cloned()
    }

    /// Admitted ids in lexicographic order
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().await.map.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.map.is_empty()
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.map.clear();
        inner.order.clear();
    }
}

impl Default for AdmissionRecord {
    fn default() -> Self {
        Self::new(DEFAULT_ADMISSION_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::tests::sample_shard;

    #[tokio::test]
    async fn test_admit_and_list() {
        let record = AdmissionRecord::new(10);
        record.admit("b".into(), sample_shard()).await;
        record.admit("a".into(), sample_shard()).await;
        assert_eq!(record.ids().await, vec!["a", "b"]);
        assert!(record.get("a").await.is_some());
        assert!(record.get("c").await.is_none());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let record = AdmissionRecord::new(2);
        record.admit("first".into(), sample_shard()).await;
        record.admit("second".into(), sample_shard()).await;
        let evicted = record.admit("third".into(), sample_shard()).await;
        assert_eq!(evicted.as_deref(), Some("first"));
        assert_eq!(record.ids().await, vec!["second", "third"]);
    }

    #[tokio::test]
    async fn test_readmit_replaces_without_eviction() {
        let record = AdmissionRecord::new(2);
        record.admit("a".into(), sample_shard()).await;
        record.admit("b".into(), sample_shard()).await;

        let mut changed = sample_shard();
        changed.intention_core = "updated".into();
        assert!(record.admit("a".into(), changed).await.is_none());
        assert_eq!(record.len().await, 2);
        assert_eq!(record.get("a").await.unwrap().intention_core, "updated");
    }

    #[tokio::test]
    async fn test_clear() {
        let record = AdmissionRecord::default();
        record.admit("a".into(), sample_shard()).await;
        record.clear().await;
        assert!(record.is_empty().await);
    }
}
