//! Shard node service handle
//!
//! A [`ShardNode`] owns everything the boundary needs: admission record,
//! gossip transport, received log, ephemeral store and clock. It is built
//! once at startup and passed to the HTTP router; `start` and `stop` are
//! explicit.

use super::admission::AdmissionRecord;
use super::error::BoundaryError;
use super::ingest::{check_skew, parse_submission, resolve_identity};
use crate::clock::{Clock, SystemClock};
use crate::config::HgiConfig;
use crate::crypto::{content_hash, verify_signature};
use crate::error::{Error, Result};
use crate::ethics::{soft_gate, Role};
use crate::gossip::{
    GossipHub, GossipTransport, HubTransport, ReceivedLog, DEFAULT_RECEIVED_CAPACITY,
};
use crate::store::{derive_shard_id, RepresentationBundle, ShardStore};
use axum::body::Body;
use axum::http::{header, HeaderMap};
use bytes::Bytes;
use serde::Serialize;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Producer role header
pub const ROLE_HEADER: &str = "x-hgi-role";
/// Producer public key header (PEM, base64 DER or base64 raw)
pub const PUBKEY_HEADER: &str = "x-hgi-pubkey";
/// Base64 signature over the raw body
pub const SIGNATURE_HEADER: &str = "x-hgi-signature";

/// Node lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Stopped,
    Starting,
    Running,
    ShuttingDown,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub role: Role,
    /// `(public_key, signature)`; `None` in insecure mode
    pub keys: Option<(String, String)>,
}

/// Successful ingestion response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub id: String,
    pub stored: bool,
    pub gate_score: f64,
}

/// Node status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub started: bool,
    pub peers_connected: usize,
    pub timestamp: u64,
}

struct Background {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// The ingestion node
pub struct ShardNode {
    config: HgiConfig,
    allowed_roles: Vec<Role>,
    state: RwLock<NodeState>,
    admissions: AdmissionRecord,
    received: Arc<ReceivedLog>,
    transport: Arc<dyn GossipTransport>,
    store: Arc<ShardStore>,
    clock: Arc<dyn Clock>,
    background: Mutex<Option<Background>>,
}

impl ShardNode {
    pub fn config(&self) -> &HgiConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ShardStore> {
        &self.store
    }

    pub fn transport(&self) -> &Arc<dyn GossipTransport> {
        &self.transport
    }

    pub fn admissions(&self) -> &AdmissionRecord {
        &self.admissions
    }

    pub fn received(&self) -> &Arc<ReceivedLog> {
        &self.received
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub async fn state(&self) -> NodeState {
        *self.state.read().await
    }

    /// Join the mesh and start background tasks.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != NodeState::Stopped {
            return Err(Error::Daemon("Node already running".to_string()));
        }
        *state = NodeState::Starting;

        if let Err(e) = self.transport.start().await {
            *state = NodeState::Stopped;
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let mut tasks = vec![
            self.received
                .spawn_listener(
                    self.transport.clone(),
                    &self.config.transport.shard_topic,
                    &self.config.transport.ulx_topic,
                    cancel.clone(),
                )
                .await,
        ];
        if self.config.storage.sweep_interval_secs > 0 {
            tasks.push(self.store.spawn_sweeper(
                Duration::from_secs(self.config.storage.sweep_interval_secs),
                cancel.clone(),
            ));
        }
        *self.background.lock().await = Some(Background { cancel, tasks });

        *state = NodeState::Running;
        tracing::info!(
            peer_id = self.transport.local_peer_id(),
            insecure = self.config.daemon.insecure,
            "Shard node started"
        );
        Ok(())
    }

    /// Stop background tasks, clear the admission record and release the
    /// transport.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state == NodeState::Stopped {
            return Ok(());
        }
        *state = NodeState::ShuttingDown;
        tracing::info!("Stopping shard node");

        if let Some(background) = self.background.lock().await.take() {
            background.cancel.cancel();
            for result in futures::future::join_all(background.tasks).await {
                if let Err(e) = result {
                    tracing::warn!("Background task ended abnormally: {}", e);
                }
            }
        }

        self.admissions.clear().await;
        self.received.clear().await;
        self.transport.stop().await?;

        *state = NodeState::Stopped;
        tracing::info!("Shard node stopped");
        Ok(())
    }

    pub async fn status(&self) -> NodeStatus {
        NodeStatus {
            started: self.state().await == NodeState::Running,
            peers_connected: self.transport.peers().await.len(),
            timestamp: self.clock.now_ms(),
        }
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Full ingestion path for a `POST /shard` request.
    pub async fn ingest(
        &self,
        headers: &HeaderMap,
        body: Body,
    ) -> std::result::Result<IngestResponse, BoundaryError> {
        let result: std::result::Result<IngestResponse, BoundaryError> = async {
            let credentials = self.authorize(headers)?;
            let raw = self.read_body(headers, body).await?;
            self.admit(&credentials, &raw).await
        }
        .await;
        if let Err(e) = &result {
            tracing::warn!(code = e.code(), "Rejected submission: {}", e);
        }
        result
    }

    /// Check role and signature headers. Both are skipped in insecure mode.
    pub fn authorize(&self, headers: &HeaderMap) -> std::result::Result<Credentials, BoundaryError> {
        let parsed_role = header_str(headers, ROLE_HEADER).map(Role::from_str);

        if self.config.daemon.insecure {
            // unknown or absent roles get the lowest weight
            let role = match parsed_role {
                Some(Ok(role)) => role,
                _ => Role::Ghost,
            };
            return Ok(Credentials { role, keys: None });
        }

        let role = match parsed_role {
            Some(Ok(role)) if self.allowed_roles.contains(&role) => role,
            Some(Ok(role)) => {
                return Err(BoundaryError::RoleInvalid(format!(
                    "role '{}' is not allowed",
                    role
                )))
            }
            Some(Err(e)) => return Err(BoundaryError::RoleInvalid(e)),
            None => {
                return Err(BoundaryError::RoleInvalid(format!(
                    "missing {} header",
                    ROLE_HEADER
                )))
            }
        };

        match (
            header_str(headers, PUBKEY_HEADER),
            header_str(headers, SIGNATURE_HEADER),
        ) {
            (Some(key), Some(sig)) => Ok(Credentials {
                role,
                keys: Some((key.to_string(), sig.to_string())),
            }),
            _ => Err(BoundaryError::SignatureMissing(format!(
                "{} and {} headers are required",
                PUBKEY_HEADER, SIGNATURE_HEADER
            ))),
        }
    }

    async fn read_body(
        &self,
        headers: &HeaderMap,
        body: Body,
    ) -> std::result::Result<Bytes, BoundaryError> {
        let max = self.config.daemon.max_body_bytes;
        let declared = header_str(headers, header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > max as u64) {
            return Err(too_large(max));
        }
        axum::body::to_bytes(body, max)
            .await
            .map_err(|_| too_large(max))
    }

    /// Parse, identify, check freshness and signature, gate, then admit and
    /// relay an already-read body. Only a running node accepts submissions.
    pub async fn admit(
        &self,
        credentials: &Credentials,
        raw: &[u8],
    ) -> std::result::Result<IngestResponse, BoundaryError> {
        // held until the relay finishes so `stop` waits for in-flight admissions
        let state = self.state.read().await;
        if *state != NodeState::Running {
            return Err(BoundaryError::Unavailable(format!(
                "node is {:?}, not accepting submissions",
                *state
            )));
        }

        let submission = parse_submission(raw)?;
        let id = resolve_identity(submission.packet_id.as_deref(), raw);
        check_skew(
            submission.shard.timestamp,
            self.clock.now_ms(),
            self.config.daemon.max_skew_ms,
        )?;

        if let Some((public_key, signature)) = &credentials.keys {
            verify_signature(public_key, signature, raw)
                .map_err(|e| BoundaryError::SignatureInvalid(e.to_string()))?;
        }

        let decision = soft_gate(
            credentials.role,
            submission.upstream_color,
            submission.shard.ethical_score.as_ref(),
        );

        if !decision.admitted {
            tracing::debug!(
                id = %id,
                role = %decision.role,
                gate_score = decision.gate_score,
                color_source = ?decision.color_source,
                "Submission below admission threshold"
            );
            return Ok(IngestResponse {
                ok: true,
                id,
                stored: false,
                gate_score: decision.gate_score,
            });
        }

        self.admissions
            .admit(id.clone(), submission.shard.clone())
            .await;

        if self.config.storage.persist_admitted {
            if let Err(e) = self.store.put(&submission.shard).await {
                tracing::warn!(id = %id, "Failed to project admitted shard: {}", e);
            }
        }

        let shard_topic = &self.config.transport.shard_topic;
        let shard_bytes = serde_json::to_vec(&submission.shard)
            .map_err(|e| BoundaryError::Internal(e.to_string()))?;
        let mut failed = Vec::new();
        if !self.transport.publish(shard_topic, Bytes::from(shard_bytes)).await {
            failed.push(shard_topic.as_str());
        }

        if let Some(metadata) = &submission.ethical_metadata {
            let ulx_topic = &self.config.transport.ulx_topic;
            self.received.record_ulx(metadata.clone()).await;
            let meta_bytes = serde_json::to_vec(metadata)
                .map_err(|e| BoundaryError::Internal(e.to_string()))?;
            if !self.transport.publish(ulx_topic, Bytes::from(meta_bytes)).await {
                failed.push(ulx_topic.as_str());
            }
        }

        if !failed.is_empty() {
            return Err(BoundaryError::GossipPublishFailed(format!(
                "shard stored locally but relay failed on {}",
                failed.join(", ")
            )));
        }

        tracing::info!(
            id = %id,
            role = %decision.role,
            gate_score = decision.gate_score,
            packet = submission.is_packet(),
            "Admitted shard"
        );
        Ok(IngestResponse {
            ok: true,
            id,
            stored: true,
            gate_score: decision.gate_score,
        })
    }

    /// Representation bundle for an admission id or a store shard id.
    pub async fn representation(&self, id: &str) -> Result<Option<RepresentationBundle>> {
        let key = match self.admissions.get(id).await {
            Some(shard) => derive_shard_id(&shard, &content_hash(&shard)?),
            None => id.to_string(),
        };
        self.store.get(&key).await
    }

    /// Serve HTTP until `shutdown` resolves, then stop the node.
    pub async fn serve<F>(self: Arc<Self>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.config.daemon.host, self.config.daemon.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Daemon(format!("Failed to bind {}: {}", addr, e)))?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        let app = super::handler::router(self.clone());
        // in-flight requests drain before this returns
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.stop().await
    }
}

fn too_large(max: usize) -> BoundaryError {
    BoundaryError::PayloadTooLarge(format!("body exceeds {} bytes", max))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Builder for [`ShardNode`]
pub struct ShardNodeBuilder {
    config: HgiConfig,
    transport: Option<Arc<dyn GossipTransport>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ShardNodeBuilder {
    pub fn new() -> Self {
        Self {
            config: HgiConfig::default(),
            transport: None,
            clock: None,
        }
    }

    pub fn config(mut self, config: HgiConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.daemon.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.daemon.port = port;
        self
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.config.daemon.insecure = insecure;
        self
    }

    /// Use an existing transport instead of a private in-process hub
    pub fn transport(mut self, transport: Arc<dyn GossipTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and open the store.
    pub async fn build(self) -> Result<ShardNode> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = Arc::new(
            ShardStore::open(
                self.config.storage.root_dir.clone(),
                self.config.storage.ttl_ms,
                clock.clone(),
            )
            .await?,
        );
        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(
                HubTransport::new(
                    GossipHub::new(),
                    self.config.transport.node_type,
                    self.config.transport.listen_port,
                )
                .with_bootstrap(self.config.transport.bootstrap_peers.clone()),
            )
        });

        Ok(ShardNode {
            allowed_roles: self.config.allowed_roles(),
            admissions: AdmissionRecord::new(self.config.daemon.admission_capacity),
            received: Arc::new(ReceivedLog::new(DEFAULT_RECEIVED_CAPACITY)),
            state: RwLock::new(NodeState::Stopped),
            background: Mutex::new(None),
            config: self.config,
            transport,
            store,
            clock,
        })
    }
}

impl Default for ShardNodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
