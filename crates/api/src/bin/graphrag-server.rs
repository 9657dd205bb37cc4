//! Server binary: loads configuration from the environment, wires the
//! dependency registry, and serves the HTTP surface.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use graphrag_api::{AppState, GraphragServer};
use graphrag_common::SystemConfig;

#[derive(Parser)]
#[command(name = "graphrag-server")]
#[command(version = "0.1.0")]
#[command(about = "Hybrid vector + graph retrieval service over crawled content")]
struct Cli {
    /// Host to bind to (overrides GRAPHRAG_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides GRAPHRAG_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    graphrag_common::telemetry::init_tracing_with_level(
        cli.log_level.as_deref().unwrap_or("info"),
    )?;

    let mut config = SystemConfig::from_env()?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let addr = format!("{}:{}", config.server.host, config.server.port);

    info!(
        collection = %config.storage.qdrant_collection,
        vector_dimension = config.models.vector_dimension,
        workers = config.ingest.worker_pool_size,
        "Starting GraphRAG server"
    );

    let state = AppState::init(config).await?;
    GraphragServer::new(state).run(&addr).await
}
