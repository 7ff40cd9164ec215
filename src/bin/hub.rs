use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use metrics_relay::{
    api::{ApiConfig, ApiState, spawn_api_server_with_shutdown},
    config::{HubConfig, read_config_file},
    rpc::spawn_rpc_server,
    service::MetricService,
    storage,
    util::{env_string, shutdown_signal},
};
use tokio::sync::watch;
use tracing::{error, info, metadata::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(version, about = "Receives metrics from relay agents and stores them")]
struct Args {
    /// Listen address (`host:port`)
    #[arg(short, long)]
    address: Option<String>,

    /// Seconds between snapshots, `0` snapshots every write
    #[arg(short = 'i', long)]
    store_interval: Option<u64>,

    /// Snapshot file, empty keeps metrics in memory only
    #[arg(short = 'f', long)]
    file_storage_path: Option<String>,

    /// Load the snapshot on start
    #[arg(short, long)]
    restore: Option<bool>,

    /// PostgreSQL connection string
    #[arg(short = 'd', long)]
    database_dsn: Option<String>,

    /// Shared secret for request verification and response signing
    #[arg(short, long)]
    key: Option<String>,

    /// PEM file with the private key
    #[arg(long)]
    crypto_key: Option<PathBuf>,

    /// gRPC listen address (`host:port`), unset disables the RPC server
    #[arg(short, long)]
    grpc_address: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("metrics_relay", LevelFilter::DEBUG),
        ("hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn resolve_config(args: Args) -> anyhow::Result<HubConfig> {
    let mut config = match args.config.or_else(|| env_string("CONFIG").map(PathBuf::from)) {
        Some(path) => read_config_file(path)?,
        None => HubConfig::default(),
    };
    config.apply_env()?;

    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(interval) = args.store_interval {
        config.store_interval = interval;
    }
    if let Some(path) = args.file_storage_path {
        config.file_storage_path = path;
    }
    if let Some(restore) = args.restore {
        config.restore = restore;
    }
    if let Some(dsn) = args.database_dsn {
        config.database_dsn = Some(dsn);
    }
    if let Some(key) = args.key {
        config.hash_key = Some(key);
    }
    if let Some(path) = args.crypto_key {
        config.crypto_key = Some(path);
    }
    if let Some(address) = args.grpc_address {
        config.grpc_address = Some(address);
    }

    config.hash_key = config.hash_key.filter(|key| !key.is_empty());
    config.grpc_address = config.grpc_address.filter(|address| !address.is_empty());
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = resolve_config(args)?;

    let backend = storage::open(&config.storage())
        .await
        .context("failed to open storage backend")?;
    info!("using {} storage", backend.name());

    let service = Arc::new(MetricService::new(backend));
    let (stop_tx, stop_rx) = watch::channel(false);

    let api_config = ApiConfig::from_hub(&config)?;
    let (_, api_task) = spawn_api_server_with_shutdown(
        api_config,
        ApiState::new(service.clone()),
        stopped(stop_rx.clone()),
    )
    .await?;

    let rpc_task = match &config.grpc_address {
        Some(address) => {
            let (_, task) = spawn_rpc_server(address, service.clone(), stopped(stop_rx)).await?;
            Some(task)
        }
        None => None,
    };

    shutdown_signal().await?;

    info!("shutting down");
    let _ = stop_tx.send(true);
    if let Err(e) = api_task.await {
        error!("API server task failed: {}", e);
    }
    if let Some(task) = rpc_task
        && let Err(e) = task.await
    {
        error!("RPC server task failed: {}", e);
    }

    if let Err(e) = service.close().await {
        error!("failed to close storage cleanly: {}", e);
    }

    Ok(())
}

/// Resolves once the stop flag is raised or its sender is gone
async fn stopped(mut stop_rx: watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}
