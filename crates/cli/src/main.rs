//! Health-monitoring sidecar for a Tezos node.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod config;
mod error;
mod http;
mod serde_duration;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use prometheus::Registry;
use sentinel_bootable::Bootable;
use sentinel_monitor::{
    HealthChecker, HeadMonitor, HeadMonitorOptions, MempoolMonitor, MempoolMonitorOptions, Poller,
    PollerOptions,
};
use sentinel_node_client_rpc::RpcNodeClient;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::AppState;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

type Service = Box<dyn Bootable<Error = sentinel_monitor::Error>>;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "sentinel.yaml", env = "SENTINEL_CONFIG")]
    config: PathBuf,

    /// Log level (error, warn, info, debug or trace)
    #[arg(short, long, default_value = "info", env = "SENTINEL_LOG_LEVEL")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let config = Config::load(&args.config)?;
    info!(url = %config.url, chain_id = %config.chain_id, "starting sentinel");

    let registry = Registry::new();
    let client = RpcNodeClient::new(config.url.clone());

    let head = HeadMonitor::connect(
        client.clone(),
        HeadMonitorOptions {
            chain_id: config.chain_id,
            timeout: config.timeout,
            tolerance: config.tolerance,
            reconnect_delay: config.reconnect_delay,
            use_timestamps: config.use_timestamps,
            registry: Some(registry.clone()),
        },
    )
    .await?;

    let poller = Poller::new(
        client.clone(),
        head.protocols_reader(),
        PollerOptions {
            chain_id: config.chain_id,
            timeout: config.timeout,
            poll_interval: config.poll_interval,
            registry: Some(registry.clone()),
        },
    )?;

    let health = HealthChecker::new(
        config.health_checks(),
        poller.bootstrap_reader(),
        head.block_delay_status(),
    );

    let mempool = if config.enable_mempool_monitor {
        Some(MempoolMonitor::new(
            client,
            head.protocols_reader(),
            MempoolMonitorOptions {
                chain_id: config.chain_id,
                timeout: config.timeout,
                reconnect_delay: config.reconnect_delay,
                registry: Some(registry.clone()),
            },
        )?)
    } else {
        None
    };

    let mut services: Vec<Service> = vec![Box::new(head), Box::new(poller)];
    if let Some(mempool) = mempool {
        services.push(Box::new(mempool));
    }

    for service in &services {
        service.start().await?;
    }

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .map_err(|e| Error::Io("failed to bind listener", e))?;
    info!("listening on {}", config.listen);

    let served = axum::serve(listener, http::router(AppState { health, registry }))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(e) = &served {
        error!("http server exited: {}", e);
    }

    for service in services.iter().rev() {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, service.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("failed to stop {}: {}", service.name(), e),
            Err(_) => error!("{} did not stop within {:?}", service.name(), SHUTDOWN_TIMEOUT),
        }
    }

    info!("sentinel shutdown cleanly");

    served.map_err(|e| Error::Io("http server failed", e))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("received SIGTERM"),
                    _ = sigint.recv() => info!("received SIGINT"),
                }
            }
            _ => {
                error!("failed to install signal handlers, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received interrupt signal");
    }

    info!("shutting down");
}
