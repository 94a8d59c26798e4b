//! Content-addressed ephemeral store with file-based JSON persistence
//!
//! Directory layout:
//! ```text
//! <root>/
//! ├── <shard_id>.json
//! └── ...
//! ```
//!
//! Every read path sweeps expired entries first, so an expired bundle is
//! never returned even if no scheduled sweep has run yet. Concurrent puts
//! that derive the same `shard_id` are not serialized; the last rename wins.

use super::bundle::{RepresentationBundle, StoreReceipt};
use crate::clock::Clock;
use crate::crypto::content_hash;
use crate::error::{Error, Result};
use crate::shard::{is_valid_shard_id, EmoShard};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default time-to-live for stored bundles (24 hours)
pub const DEFAULT_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Ephemeral store keyed by derived shard id
pub struct ShardStore {
    root: PathBuf,
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl ShardStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: PathBuf, ttl_ms: u64, clock: Arc<dyn Clock>) -> Result<Self> {
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            ttl_ms,
            clock,
        })
    }

    /// Default root directory (<data-local>/hgi-shard/shards)
    pub fn default_dir() -> PathBuf {
        dirs_next::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hgi-shard")
            .join("shards")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Validate, project and persist a shard.
    pub async fn put(&self, shard: &EmoShard) -> Result<RepresentationBundle> {
        shard
            .validate()
            .map_err(|e| Error::Store(format!("Invalid shard: {}", e)))?;

        let shard_hash = content_hash(shard)?;
        let bundle = RepresentationBundle::project(shard, &shard_hash, self.clock.now_ms(), self.ttl_ms);

        let json = serde_json::to_vec_pretty(&bundle)?;
        let final_path = self.path_for(&bundle.shard_id);
        let tmp_path = self
            .root
            .join(format!(".{}.{}.tmp", bundle.shard_id, uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tracing::debug!(
            shard_id = %bundle.shard_id,
            expires_at_ms = bundle.expires_at_ms,
            "Stored representation bundle"
        );
        Ok(bundle)
    }

    /// Put and return only the identities
    pub async fn put_receipt(&self, shard: &EmoShard) -> Result<StoreReceipt> {
        Ok(self.put(shard).await?.receipt())
    }

    /// Fetch a live bundle, sweeping expired entries first.
    pub async fn get(&self, key: &str) -> Result<Option<RepresentationBundle>> {
        let now = self.clock.now_ms();
        self.delete_expired(now).await?;

        if !is_valid_shard_id(key) {
            return Ok(None);
        }
        match read_bundle(&self.path_for(key)).await {
            Ok(Some(bundle)) if !bundle.is_expired(now) => Ok(Some(bundle)),
            Ok(_) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// All live shard ids in lexicographic order, sweeping first.
    pub async fn list(&self) -> Result<Vec<String>> {
        self.delete_expired(self.clock.now_ms()).await?;

        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = bundle_stem(&entry.path()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Remove a bundle explicitly. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        if !is_valid_shard_id(key) {
            return Ok(false);
        }
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete corrupt entries and entries with `expires_at_ms <= now`.
    pub async fn delete_expired(&self, now_ms: u64) -> Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if bundle_stem(&path).is_none() {
                continue;
            }
            let expired = match read_bundle(&path).await {
                Ok(Some(bundle)) => bundle.is_expired(now_ms),
                // vanished between read_dir and read
                Ok(None) => false,
                Err(e) => {
                    tracing::warn!("Removing corrupt bundle {}: {}", path.display(), e);
                    true
                }
            };
            if expired {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Swept expired representation bundles");
        }
        Ok(removed)
    }

    /// Run `delete_expired` every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = store.delete_expired(store.clock.now_ms()).await {
                            tracing::warn!("Scheduled sweep failed: {}", e);
                        }
                    }
                }
            }
            tracing::debug!("Store sweeper stopped");
        })
    }

    fn path_for(&self, shard_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", shard_id))
    }
}

/// Shard id for `<id>.json` files; `None` for temp files and anything else
fn bundle_stem(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    is_valid_shard_id(stem).then(|| stem.to_string())
}

async fn read_bundle(path: &Path) -> Result<Option<RepresentationBundle>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
