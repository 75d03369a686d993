use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clock_sync::{protocol, Algorithm, LogicalClock, Node, NodeConfig};

#[derive(Parser)]
#[command(name = "clock-sync")]
#[command(about = "Synchronize clocks between peer nodes (Cristian, Berkeley, Lamport)", long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Port, when not given with --port
    #[arg(value_name = "PORT")]
    port_arg: Option<u16>,

    /// Synchronization algorithm
    #[arg(short, long, value_enum, default_value_t = AlgorithmArg::Cristian)]
    algo: AlgorithmArg,

    /// Node config file (name, address, peers); overrides --port
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Peer address, repeatable; replaces the default peer set
    #[arg(long = "peer", value_name = "HOST:PORT")]
    peers: Vec<String>,

    /// Seconds to wait for peers to come up before synchronizing
    #[arg(long, default_value_t = 2)]
    startup_delay: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AlgorithmArg {
    Cristian,
    Berkeley,
    Logical,
    Vector,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Cristian => Algorithm::Cristian,
            AlgorithmArg::Berkeley => Algorithm::Berkeley,
            AlgorithmArg::Logical => Algorithm::Logical,
            AlgorithmArg::Vector => Algorithm::Vector,
        }
    }
}

impl Cli {
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path).context("loading node config")?,
            None => NodeConfig::for_port(self.port.or(self.port_arg).unwrap_or(8000), None),
        };
        if !self.peers.is_empty() {
            config.peers = self.peers.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let algorithm = Algorithm::from(cli.algo);
    let config = cli.node_config()?;
    info!(node = %config.name, address = %config.address, %algorithm, "starting");

    let logical_clock = Arc::new(LogicalClock::new());
    let node = Arc::new(Node::new(config).with_logical_clock(logical_clock.clone()));

    // Without a listener the node cannot serve its peers, so a bind failure ends the process.
    let listener = node.bind().await.context("starting listener")?;
    tokio::spawn(node.clone().serve(listener));

    tokio::time::sleep(Duration::from_secs(cli.startup_delay)).await;

    let report = protocol::synchronize(&node, algorithm, &logical_clock).await;
    info!(
        node = %node.name(),
        synchronized = report.synchronized.len(),
        skipped = report.skipped.len(),
        "synchronization finished, serving peers"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to wait for shutdown signal: {}", e);
    }
    node.stop();
    info!(node = %node.name(), "stopped");

    Ok(())
}
