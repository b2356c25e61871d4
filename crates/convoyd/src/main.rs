//! convoyd — the Convoy daemon.
//!
//! Single binary that assembles all Convoy subsystems:
//! - Snapshot store (redb or JSON file)
//! - Pod runtime (simulated in-process, or a remote agent)
//! - Controller loop (drift, probes, rollout, autoscale, alerts)
//! - REST API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! convoyd run --config convoy.toml --port 8080
//! convoyd reconcile-once --config convoy.toml
//! convoyd metrics --config convoy.toml
//! ```

mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use convoy_controller::ConvoyConfig;

const DEFAULT_LOG_FILTER: &str = "info,convoyd=debug,convoy=debug";

#[derive(Parser)]
#[command(name = "convoyd", about = "Convoy daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller loop and the API server.
    Run {
        /// Path to the configuration file.
        #[arg(long, default_value = "convoy.toml")]
        config: PathBuf,

        /// API port (overrides `[api] port`).
        #[arg(long)]
        port: Option<u16>,

        /// Reconcile period in milliseconds (overrides `[controller] tick_ms`).
        #[arg(long)]
        tick_ms: Option<u64>,
    },
    /// Run a single reconcile pass against the configured store and exit.
    ReconcileOnce {
        #[arg(long, default_value = "convoy.toml")]
        config: PathBuf,
    },
    /// Print the Prometheus exposition of the stored snapshot.
    Metrics {
        #[arg(long, default_value = "convoy.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            port,
            tick_ms,
        } => {
            let mut config = ConvoyConfig::load(&config)?;
            if let Some(port) = port {
                config.api.port = port;
            }
            if let Some(tick_ms) = tick_ms {
                config.controller.tick_ms = tick_ms;
            }
            daemon::run(config).await
        }
        Command::ReconcileOnce { config } => {
            daemon::reconcile_once(ConvoyConfig::load(&config)?).await
        }
        Command::Metrics { config } => {
            let store = daemon::open_store(&ConvoyConfig::load(&config)?.store)?;
            print!("{}", convoy_metrics::render_prometheus(&store.load()?));
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
