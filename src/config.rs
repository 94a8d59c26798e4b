//! HGI shard node configuration management

use crate::error::{Error, Result};
use crate::ethics::Role;
use crate::gossip::{NodeType, SHARD_TOPIC, ULX_TOPIC};
use crate::pipeline::DEFAULT_STAGE_TIMEOUT_MS;
use crate::store::{ShardStore, DEFAULT_TTL_MS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HgiConfig {
    /// HTTP boundary configuration
    pub daemon: DaemonConfig,

    /// Gossip transport configuration
    pub transport: TransportConfig,

    /// Ephemeral store configuration
    pub storage: StorageConfig,

    /// Packet assembly configuration
    pub assembly: AssemblyConfig,
}

/// HTTP boundary configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Skip role and signature enforcement. Timestamps are still checked.
    pub insecure: bool,

    /// Role tags accepted in `x-hgi-role`
    pub allowed_roles: Vec<String>,

    /// Maximum allowed |now - shard.timestamp|
    pub max_skew_ms: u64,

    /// Maximum request body size
    pub max_body_bytes: usize,

    /// Maximum entries in the in-memory admission record
    pub admission_capacity: usize,

    /// Allowed CORS origins (empty = any)
    pub cors_origins: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            insecure: false,
            allowed_roles: Role::ALL.iter().map(|r| r.as_str().to_string()).collect(),
            max_skew_ms: 300_000,
            max_body_bytes: 256 * 1024,
            admission_capacity: 10_000,
            cors_origins: Vec::new(),
        }
    }
}

/// Gossip transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub node_type: NodeType,

    /// Port the transport listens on
    pub listen_port: u16,

    /// Peers dialled on start
    pub bootstrap_peers: Vec<String>,

    /// Topic admitted shards are relayed on
    pub shard_topic: String,

    /// Topic packet ethical metadata is relayed on
    pub ulx_topic: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            node_type: NodeType::Full,
            listen_port: 4001,
            bootstrap_peers: Vec::new(),
            shard_topic: SHARD_TOPIC.to_string(),
            ulx_topic: ULX_TOPIC.to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON file per shard
    pub root_dir: PathBuf,

    /// Bundle time-to-live
    pub ttl_ms: u64,

    /// Seconds between scheduled sweeps (0 disables)
    pub sweep_interval_secs: u64,

    /// Also project admitted shards into the store
    pub persist_admitted: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: ShardStore::default_dir(),
            ttl_ms: DEFAULT_TTL_MS,
            sweep_interval_secs: 300,
            persist_admitted: true,
        }
    }
}

/// Packet assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Per-stage time budget
    pub stage_timeout_ms: u64,

    /// Substitute fallback records on timeouts and resource failures
    pub fallback_on_resource_error: bool,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            stage_timeout_ms: DEFAULT_STAGE_TIMEOUT_MS,
            fallback_on_resource_error: true,
        }
    }
}

impl HgiConfig {
    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Apply `HGI_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `HGI_*` overrides from an arbitrary lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("HGI_DAEMON_HOST") {
            self.daemon.host = v;
        }
        if let Some(v) = lookup("HGI_DAEMON_PORT") {
            self.daemon.port = parse_env("HGI_DAEMON_PORT", &v)?;
        }
        if let Some(v) = lookup("HGI_INSECURE") {
            self.daemon.insecure = parse_flag(&v);
        }
        if let Some(v) = lookup("HGI_ALLOWED_ROLES") {
            self.daemon.allowed_roles = split_list(&v);
        }
        if let Some(v) = lookup("HGI_MAX_SKEW_MS") {
            self.daemon.max_skew_ms = parse_env("HGI_MAX_SKEW_MS", &v)?;
        }
        if let Some(v) = lookup("HGI_NODE_TYPE") {
            self.transport.node_type = NodeType::from_str(&v).map_err(Error::Config)?;
        }
        if let Some(v) = lookup("HGI_LISTEN_PORT") {
            self.transport.listen_port = parse_env("HGI_LISTEN_PORT", &v)?;
        }
        if let Some(v) = lookup("HGI_BOOTSTRAP") {
            self.transport.bootstrap_peers = split_list(&v);
        }
        if let Some(v) = lookup("HGI_STORE_DIR") {
            self.storage.root_dir = PathBuf::from(v);
        }
        Ok(())
    }

    /// Reject configurations the node cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.daemon.allowed_roles.is_empty() {
            return Err(Error::Config("daemon.allowed_roles must not be empty".into()));
        }
        for role in &self.daemon.allowed_roles {
            Role::from_str(role)
                .map_err(|e| Error::Config(format!("daemon.allowed_roles: {}", e)))?;
        }
        if self.daemon.max_skew_ms == 0 {
            return Err(Error::Config("daemon.max_skew_ms must be positive".into()));
        }
        if self.daemon.max_body_bytes == 0 {
            return Err(Error::Config("daemon.max_body_bytes must be positive".into()));
        }
        if self.transport.shard_topic == self.transport.ulx_topic {
            return Err(Error::Config(
                "transport.shard_topic and transport.ulx_topic must differ".into(),
            ));
        }
        Ok(())
    }

    /// Parsed allow-list. Call after `validate`.
    pub fn allowed_roles(&self) -> Vec<Role> {
        self.daemon
            .allowed_roles
            .iter()
            .filter_map(|r| Role::from_str(r).ok())
            .collect()
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}={:?}: {}", key, value, e)))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = HgiConfig::default();
        assert_eq!(config.daemon.port, 8787);
        assert!(!config.daemon.insecure);
        assert_eq!(config.daemon.max_skew_ms, 300_000);
        assert_eq!(config.allowed_roles(), Role::ALL.to_vec());
        assert_eq!(config.transport.shard_topic, "hgi/emoshard/1.0.0");
        assert_eq!(config.storage.ttl_ms, 24 * 60 * 60 * 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = HgiConfig::from_toml(
            r#"
            [daemon]
            port = 9000
            allowed_roles = ["founder", "guardian"]

            [storage]
            sweep_interval_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.daemon.port, 9000);
        assert_eq!(config.daemon.host, "127.0.0.1");
        assert_eq!(config.allowed_roles(), vec![Role::Founder, Role::Guardian]);
        assert_eq!(config.storage.sweep_interval_secs, 0);
        assert!(config.storage.persist_admitted);
        assert_eq!(config.transport.node_type, NodeType::Full);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = HgiConfig::default();
        let parsed = HgiConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.daemon.allowed_roles, config.daemon.allowed_roles);
        assert_eq!(parsed.storage.root_dir, config.storage.root_dir);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HgiConfig::default();
        config
            .apply_env_from(lookup(&[
                ("HGI_DAEMON_PORT", "9100"),
                ("HGI_INSECURE", "yes"),
                ("HGI_ALLOWED_ROLES", "founder, member ,"),
                ("HGI_NODE_TYPE", "relay"),
                ("HGI_BOOTSTRAP", "/ip4/10.0.0.1/tcp/4001,/ip4/10.0.0.2/tcp/4001"),
                ("HGI_STORE_DIR", "/tmp/shards"),
            ]))
            .unwrap();
        assert_eq!(config.daemon.port, 9100);
        assert!(config.daemon.insecure);
        assert_eq!(config.allowed_roles(), vec![Role::Founder, Role::Member]);
        assert_eq!(config.transport.node_type, NodeType::Relay);
        assert_eq!(config.transport.bootstrap_peers.len(), 2);
        assert_eq!(config.storage.root_dir, PathBuf::from("/tmp/shards"));
    }

    #[test]
    fn test_bad_numeric_env_is_an_error() {
        let mut config = HgiConfig::default();
        let err = config
            .apply_env_from(lookup(&[("HGI_MAX_SKEW_MS", "five minutes")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HgiConfig::default();
        config.daemon.allowed_roles = vec!["admin".into()];
        assert!(config.validate().is_err());

        let mut config = HgiConfig::default();
        config.daemon.allowed_roles.clear();
        assert!(config.validate().is_err());

        let mut config = HgiConfig::default();
        config.daemon.max_skew_ms = 0;
        assert!(config.validate().is_err());

        let mut config = HgiConfig::default();
        config.transport.ulx_topic = config.transport.shard_topic.clone();
        assert!(config.validate().is_err());
    }
}
