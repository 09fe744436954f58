//! Render Gate (v1)
//!
//! Access-controlled front door for a streaming HTML renderer, built with
//! Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                     RENDER GATE                       │
//!                      │                                                       │
//!     Client Request   │  ┌─────────┐    ┌──────────────┐    ┌─────────────┐  │
//!     ─────────────────┼─▶│  http   │───▶│    access    │───▶│  authority  │◀─┼──── Auth
//!                      │  │ server  │    │   decision   │    │   client    │  │     Service
//!                      │  └─────────┘    └──────┬───────┘    └─────────────┘  │
//!                      │                        │ allow                         │
//!                      │                        ▼                               │
//!                      │                 ┌──────────────┐    ┌─────────────┐  │
//!     Client Response  │                 │    render    │───▶│   engine    │◀─┼──── Render
//!     ◀────────────────┼─────────────────│  supervisor  │    │  (upstream) │  │     Server
//!                      │                 └──────────────┘    └─────────────┘  │
//!                      │                                                       │
//!                      │  ┌─────────────────────────────────────────────────┐ │
//!                      │  │ config │ observability (logs, metrics, telemetry)│ │
//!                      │  │        │ lifecycle (signals, shutdown)           │ │
//!                      │  └─────────────────────────────────────────────────┘ │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use render_gate::config::load_config;
use render_gate::http::{Collaborators, GateServer};
use render_gate::lifecycle::Shutdown;
use render_gate::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "render-gate")]
#[command(about = "Access-controlled streaming render gate", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!("render-gate v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        production = config.is_production(),
        authority = %config.authority.base_url(),
        render_upstream = %config.render.upstream_url,
        abort_delay_ms = config.render.abort_delay_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let collaborators = Collaborators::from_config(&config)?;
    let server = GateServer::new(config, collaborators);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
