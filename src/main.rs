//! Service runtime host.
//!
//! Builds a [`System`], loads the health server into it, runs until a
//! termination signal or the first service failure, then cleans up.

use clap::Parser;
use tokio_util::sync::CancellationToken;

use service_runtime::config::Cli;
use service_runtime::lifecycle::load_health_server;
use service_runtime::observability::{logging, metrics};
use service_runtime::System;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => {
            tracing::info!("exiting 0");
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to run");
            eprintln!("failed to run:\n\t{e}");
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init(config.observability.log_format)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "proxy starting");
    tracing::info!(
        otlp_endpoint = %config.observability.otlp_endpoint,
        health_addr = %config.health.addr,
        termination_delay_secs = config.lifecycle.termination_delay_secs,
        "Configuration loaded"
    );

    let prometheus = if config.observability.metrics_enabled {
        match metrics::install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install metrics recorder");
                None
            }
        }
    } else {
        None
    };

    let mut system = System::new();

    let result = async {
        load_health_server(&config, &mut system, prometheus).await?;
        system
            .run(&CancellationToken::new(), config.lifecycle.termination_delay())
            .await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    }
    .await;

    // Cleanups run whether startup failed or the system stopped.
    system.cleanup(&CancellationToken::new()).await;
    result
}
