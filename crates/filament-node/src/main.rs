//! filament-node — the Filament single-node ledger binary.
//!
//! Startup sequence:
//!   1. Load the genesis keypair (env vars, or ephemeral for development)
//!   2. Open the engine: restore + replay the checkpoint, or mint genesis
//!   3. Start the ghost driver (no-op ticks that advance confirmations)
//!   4. Serve the HTTP API until ctrl-c, then stop the driver cleanly

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use filament_core::constants::GHOST_INTERVAL_SECS;
use filament_crypto::SigningKeyPair;
use filament_dag::{DagEngine, EngineConfig, GhostDriver};

#[derive(Parser, Debug)]
#[command(
    name = "filament-node",
    version,
    about = "Filament — a DAG ledger with post-quantum signatures"
)]
struct Args {
    /// Directory for the persistent data root (holds shared/dag.json).
    #[arg(long, default_value = "~/.filament/data")]
    data_dir: PathBuf,

    /// HTTP listen address.
    #[arg(long, default_value = "127.0.0.1:8000")]
    listen: SocketAddr,

    /// Service name embedded in the API path (/api/v1/<api_name>/…).
    #[arg(long, env = "API_NAME", default_value = "filament")]
    api_name: String,

    /// Seconds between ghost transactions.
    #[arg(long, default_value_t = GHOST_INTERVAL_SECS)]
    ghost_interval_secs: u64,

    /// Base64 genesis public key (the mint and ghost signer).
    #[arg(long, env = "GENESIS_PUBLIC_KEY")]
    genesis_public_key: Option<String>,

    /// Base64 genesis secret key.
    #[arg(long, env = "GENESIS_PRIVATE_KEY", hide_env_values = true)]
    genesis_private_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,filament=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("Filament node starting");

    let genesis = load_or_generate_genesis(&args)?;

    // A leading `~` in --data-dir resolves against $HOME; anything else is
    // taken as-is.
    let data_dir = match args.data_dir.strip_prefix("~") {
        Ok(rest) => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(rest))
            .context("--data-dir uses `~` but HOME is not set")?,
        Err(_) => args.data_dir.clone(),
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let mut config = EngineConfig::new(data_dir);
    config.ghost_interval = Duration::from_secs(args.ghost_interval_secs);
    let ghost_interval = config.ghost_interval;

    let engine = DagEngine::open(config, genesis).context("opening DAG engine")?;
    info!(
        vertices = engine.vertex_count(),
        genesis = %engine.genesis_address(),
        "engine ready"
    );

    let driver = GhostDriver::spawn(engine.clone(), ghost_interval);

    let app = filament_rpc::router(engine, &args.api_name);
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(addr = %args.listen, api = %args.api_name, "HTTP API listening");

    axum_serve(listener, app).await?;

    info!("shutting down");
    driver.shutdown().await;
    Ok(())
}

/// Serve until ctrl-c.
async fn axum_serve(listener: tokio::net::TcpListener, app: axum::Router) -> anyhow::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serving HTTP API")
}

/// Load the genesis keypair from the environment, or generate an ephemeral
/// one for local development.
///
/// # Warning
/// Ephemeral keys are not reproducible: a restart against an existing
/// checkpoint signed by different genesis keys will reject every ghost.
fn load_or_generate_genesis(args: &Args) -> anyhow::Result<SigningKeyPair> {
    match (&args.genesis_public_key, &args.genesis_private_key) {
        (Some(pk), Some(sk)) => SigningKeyPair::from_base64(pk.clone(), sk)
            .map_err(|e| anyhow::anyhow!("loading genesis keys: {e}")),
        (None, None) => {
            warn!("No genesis keys provided. Generating ephemeral keys — DO NOT USE IN PRODUCTION.");
            Ok(SigningKeyPair::generate())
        }
        _ => anyhow::bail!(
            "GENESIS_PUBLIC_KEY and GENESIS_PRIVATE_KEY must be provided together"
        ),
    }
}
