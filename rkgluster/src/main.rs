mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use libgluster::GlusterDriver;
use libgluster::transport::server::PluginServer;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::PluginArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = PluginArgs::parse();
    init_tracing(args.log_json);
    run(args).await
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rkgluster=info,libgluster=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

async fn run(args: PluginArgs) -> Result<()> {
    let config = args.driver_config()?;
    info!(
        servers = %config.servers.join(", "),
        root = %config.mount_root.display(),
        socket = %args.socket.display(),
        "starting GlusterFS volume plugin",
    );

    prepare_mount_root(&config.mount_root)?;

    let driver = Arc::new(GlusterDriver::new(config, args.backend()));
    let server = PluginServer::bind(&args.socket, Arc::clone(&driver))
        .context("Failed to bind plugin socket")?;

    let result = server.serve_with_shutdown(shutdown_signal()).await;

    driver.shutdown().await;
    result.context("Plugin server failed")?;
    info!("plugin stopped");
    Ok(())
}

/// Create the mount root if missing and make sure it is a directory.
fn prepare_mount_root(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("Failed to create mount root {}", root.display()))?;
    if !root.is_dir() {
        bail!("mount root {} is not a directory", root.display());
    }
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to register SIGTERM handler, waiting for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }
}
