//! Proof of Innocence node binary
//!
//! Runs one node per config file, all attached to one in-process network
//! and addressed by `node_name`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use poi_node::{load_config, LocalNetwork, PoiNode};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "poi-node")]
#[command(about = "Proof of Innocence list node", long_about = None)]
struct Cli {
    /// Node config file; repeat to host several nodes
    #[arg(short, long = "config", required = true)]
    configs: Vec<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut configs = Vec::with_capacity(cli.configs.len());
    for path in &cli.configs {
        configs.push(load_config(path).with_context(|| format!("loading {}", path.display()))?);
    }

    let default_level = if cli.verbose {
        "debug".to_string()
    } else {
        configs
            .first()
            .map_or_else(|| "info".to_string(), |config| config.log_level.clone())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let network = LocalNetwork::new();
    let mut nodes = Vec::with_capacity(configs.len());
    for config in configs {
        let name = config.node_name.clone();
        let node = PoiNode::builder(config)
            .transport(network.clone())
            .build()
            .await
            .with_context(|| format!("building node {name}"))?;
        let node = Arc::new(node);
        network.register(name, &node);
        nodes.push(node);
    }
    for node in &nodes {
        node.start().await?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown requested");
    for node in &nodes {
        node.stop();
    }
    Ok(())
}
