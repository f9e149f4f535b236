//! Blobserver Daemon
//!
//! ## Usage
//!
//! ```bash
//! # Start with a config file
//! blobserver --config /etc/blobserver/config.toml
//!
//! # In-memory backend on another port
//! blobserver --storage memory --listen 127.0.0.1:7000
//!
//! # Create and verify all shard containers before serving
//! blobserver --config config.toml --init-containers
//! ```

use blobserver::{Config, HttpServer, StorageRegistry};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "blobserver")]
#[command(about = "HTTP blob storage over a sharded object store")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "BLOBSERVER_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long, env = "BLOBSERVER_LISTEN")]
    listen: Option<String>,

    /// Storage backend (swift, memory)
    #[arg(long, env = "BLOBSERVER_STORAGE")]
    storage: Option<String>,

    /// Create and verify shard containers at startup
    #[arg(long)]
    init_containers: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("blobserver=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(storage) = args.storage {
        config.storage = storage;
    }
    if args.init_containers {
        config.init_containers = true;
    }

    info!(
        listen = %config.listen,
        storage = %config.storage,
        prefix = %config.url_prefix,
        "Starting blobserver"
    );

    let registry = StorageRegistry::with_defaults();
    let storage = registry.create(&config).await?;

    let addr: SocketAddr = config.listen.parse()?;
    let server = HttpServer::new(storage, addr)
        .with_prefix(&config.url_prefix)
        .with_max_blob_size(config.max_blob_size);

    Arc::new(server).run().await?;
    Ok(())
}
