//! # relay-agent
//!
//! Relay binary: loads settings, starts the WebSocket relay and waits for a
//! shutdown signal.

#![deny(unsafe_code)]

mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::{RelayServer, ServerConfig};
use relay_settings::{load_settings, load_settings_from_path};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = match &args.config {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => load_settings().context("failed to load settings")?,
    };
    args.apply(&mut settings);
    settings.validate();

    logging::init_subscriber(&settings.logging);

    let mut server = RelayServer::new(ServerConfig::from(&settings.server));
    match relay_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }

    let handle = match server.start().await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, kind = e.error_kind(), "failed to start relay");
            std::process::exit(1);
        }
    };
    tracing::info!(
        "relay listening on ws://{}{}",
        handle.local_addr(),
        settings.server.ws_path
    );

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    if !handle.shutdown().await {
        tracing::warn!("some tasks did not finish before the shutdown timeout");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term =
            signal(SignalKind::terminate()).context("failed to listen for SIGTERM")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    Ok(())
}
