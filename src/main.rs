//! HGI Shard - emotional shard ingestion node

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hgi_shard::{
    clock::{Clock, SystemClock},
    config::HgiConfig,
    crypto::SigningKeyPair,
    daemon::ShardNodeBuilder,
    pipeline::{PacketAssembler, ReferenceStages, StageOrchestrator, SynthesisStages},
    store::ShardStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hgi-shard")]
#[command(version)]
#[command(about = "Emotional shard ingestion, gating and relay node")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "HGI_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion daemon
    Daemon {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Disable role and signature enforcement
        #[arg(long)]
        insecure: bool,
    },

    /// Assemble a packet from an audio file and print it
    Synth {
        /// Raw audio file
        audio: PathBuf,

        /// Sender node id recorded in every frame
        #[arg(long, default_value = "local")]
        sender: String,
    },

    /// Generate an Ed25519 producer key pair
    Keygen,

    /// Delete expired bundles from the store
    Sweep,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("hgi_shard={},tower_http={}", log_level, log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => HgiConfig::from_file(path)?,
        None => HgiConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;

    match cli.command {
        Commands::Daemon {
            host,
            port,
            insecure,
        } => {
            if let Some(host) = host {
                config.daemon.host = host;
            }
            if let Some(port) = port {
                config.daemon.port = port;
            }
            config.daemon.insecure |= insecure;
            run_daemon(config).await?;
        }
        Commands::Synth { audio, sender } => {
            run_synth(config, &audio, &sender).await?;
        }
        Commands::Keygen => {
            run_keygen()?;
        }
        Commands::Sweep => {
            run_sweep(config).await?;
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn run_daemon(config: HgiConfig) -> Result<()> {
    tracing::info!("Starting HGI shard node");
    if config.daemon.insecure {
        tracing::warn!("Insecure mode: role and signature checks are disabled");
    }

    let node = Arc::new(ShardNodeBuilder::new().config(config).build().await?);
    node.start().await?;

    tracing::info!("Shard node is running. Press Ctrl+C to stop.");
    node.serve(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
        tracing::info!("Shutting down...");
    })
    .await?;

    Ok(())
}

async fn run_synth(config: HgiConfig, audio: &Path, sender: &str) -> Result<()> {
    let bytes = tokio::fs::read(audio)
        .await
        .with_context(|| format!("Failed to read {}", audio.display()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(
        ShardStore::open(
            config.storage.root_dir.clone(),
            config.storage.ttl_ms,
            clock.clone(),
        )
        .await?,
    );

    let reference = ReferenceStages::new();
    tracing::info!(providers = ?reference.providers(), "Using reference stages");
    let stages: Arc<dyn SynthesisStages> = Arc::new(
        StageOrchestrator::new(Arc::new(reference))
            .timeout(Duration::from_millis(config.assembly.stage_timeout_ms))
            .fallback(config.assembly.fallback_on_resource_error),
    );

    let assembler = PacketAssembler::new(stages, store, clock);
    let packet = assembler.assemble(&bytes, sender).await?;
    println!("{}", serde_json::to_string_pretty(&packet)?);
    Ok(())
}

fn run_keygen() -> Result<()> {
    let keys = SigningKeyPair::generate();
    println!("{}", keys.public_key_pem()?);
    println!("der_base64: {}", keys.public_key_der_base64()?);
    println!("raw_base64: {}", keys.public_key_raw_base64());
    Ok(())
}

async fn run_sweep(config: HgiConfig) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = ShardStore::open(config.storage.root_dir, config.storage.ttl_ms, clock.clone())
        .await?;
    let removed = store.delete_expired(clock.now_ms()).await?;
    println!("Removed {} expired bundle(s)", removed);
    Ok(())
}

fn show_config(config: Option<&HgiConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    println!("{}", config.to_toml()?);
    Ok(())
}
