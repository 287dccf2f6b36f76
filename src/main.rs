//! Multi-server process (v1)
//!
//! Runs an HTTP server, a JSON-RPC server and a background worker side by side
//! under one lifecycle coordinator.
//!
//! # Architecture Overview
//!
//! ```text
//!     SIGTERM / SIGQUIT / SIGINT
//!                │
//!                ▼
//!   ┌──────────────────────────────────────────────────────┐
//!   │                     App (coordinator)                 │
//!   │                                                       │
//!   │   root scope ──▶ task group scope                     │
//!   │                    │                                  │
//!   │        ┌───────────┼────────────┐                     │
//!   │        ▼           ▼            ▼                     │
//!   │   ┌─────────┐ ┌─────────┐ ┌──────────┐                │
//!   │   │  http   │ │   rpc   │ │  worker  │  start-runner  │
//!   │   │ (axum)  │ │ (tcp)   │ │ (ticker) │  + stop-waiter │
//!   │   └─────────┘ └─────────┘ └──────────┘  per component │
//!   └──────────────────────────────────────────────────────┘
//! ```
//!
//! Exit status: 0 on clean shutdown, 1 when the run fails, 2 for bad config.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use multi_server::config::{self, AppConfig};
use multi_server::lifecycle::{App, Component};
use multi_server::observability;
use multi_server::servers::{HttpServer, RpcServer, Worker};

#[derive(Parser)]
#[command(name = "multi-server")]
#[command(about = "Run the HTTP, RPC and worker components under one coordinator", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

fn build_components(config: &AppConfig) -> Vec<Arc<dyn Component>> {
    let mut components: Vec<Arc<dyn Component>> = Vec::new();
    if config.worker.enabled {
        components.push(Arc::new(Worker::new(config.worker.clone())));
    }
    if config.http.enabled {
        components.push(Arc::new(HttpServer::new(config.http.clone())));
    }
    if config.rpc.enabled {
        components.push(Arc::new(RpcServer::new(config.rpc.clone())));
    }
    components
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match config::load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                return ExitCode::from(2);
            }
        },
        None => AppConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    if let Err(e) = observability::init_logging(&config.observability) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if cli.check {
        tracing::info!("Configuration OK");
        return ExitCode::SUCCESS;
    }

    let components = build_components(&config);
    tracing::info!(
        components = components.len(),
        stop_timeout_secs = config.app.stop_timeout_secs,
        signals = ?config.app.signals,
        "Configuration loaded"
    );

    let app = App::from_config(&config.app, components);
    match app.run().await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Exiting after failure");
            ExitCode::FAILURE
        }
    }
}
