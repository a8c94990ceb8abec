//! `oath`: token service entry point.
//!
//! Startup sequence (`oath serve`):
//! 1. Parse flags and load [`ServiceConfig`] (defaults < `OATH_*` env < flags).
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP spans).
//! 3. Download the token key pair from S3 into the scratch directory.
//! 4. Build the Axum router: status routes, `/api/v1`, instrumentation chain.
//! 5. Bind (or inherit) the listener and serve until SIGTERM/SIGINT, or until
//!    SIGUSR2 has handed the listener to a successor.

mod api;
mod aws;
mod bootstrap;
mod cli;
mod config;
mod keys;
mod server;
mod telemetry;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};
use config::ServiceConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = match cli.command {
        Command::Serve(args) => args,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
    };

    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = ServiceConfig::load(&args).map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;

    // -----------------------------------------------------------------------
    // 3–5. Provision, route, serve
    // -----------------------------------------------------------------------
    bootstrap::run(cfg).await
}
