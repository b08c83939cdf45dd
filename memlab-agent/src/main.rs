// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod cli;
mod control_plane;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use memlab_detect::DetectorRegistry;
use memlab_kernel::{KernelCommunicator, RECV_FAMILY, SEND_FAMILY};
use memlab_types::UplinkConfig;
use memlab_uplink::UplinkClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::control_plane::ControlPlane;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli).await {
        tracing::error!(%err, "memlab-agent exited with an error");
        return Err(err);
    }
    Ok(())
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let intervals = cli.resolved_intervals();

    let machine_id = memlab_inspect::machine_id().context("failed to determine machine id")?;
    let own_pid = std::process::id();

    let communicator = KernelCommunicator::new(SEND_FAMILY, RECV_FAMILY)
        .await
        .context("failed to establish kernel communicator")?;
    let communicator = Arc::new(communicator);

    let registry = Arc::new(DetectorRegistry::new(Arc::clone(&communicator), cli.max_detectors));

    let uplink_config = UplinkConfig::new(cli.api_url.clone(), cli.api_token.clone());
    let uplink = Arc::new(UplinkClient::new(&uplink_config).context("failed to construct uplink client")?);

    let control_plane = ControlPlane::new(
        Arc::clone(&registry),
        Arc::clone(&uplink),
        machine_id,
        own_pid,
        intervals,
    );

    control_plane.start().await;
    info!("memlab-agent started");

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping");

    control_plane.stop().await;

    // `registry.stop()` (run inside `control_plane.stop()`) has already
    // unwatched every process and cancelled every detector's scope, so
    // every `Arc<KernelCommunicator>` clone outside this scope has been
    // dropped; the process exit tears down the underlying sockets.
    drop(communicator);

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}
