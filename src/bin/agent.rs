use std::path::PathBuf;

use clap::Parser;
use metrics_relay::{
    agent::{AgentHandle, Schedule, build_transport},
    config::{AgentConfig, TransportKind, read_config_file},
    util::{env_string, shutdown_signal},
};
use tracing::{info, metadata::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(version, about = "Collects host metrics and reports them to a relay hub")]
struct Args {
    /// Hub address (`host:port`)
    #[arg(short, long)]
    address: Option<String>,

    /// Seconds between polls
    #[arg(short, long)]
    poll_interval: Option<u64>,

    /// Seconds between reports
    #[arg(short, long)]
    report_interval: Option<u64>,

    /// Shared secret for the `HashSHA256` signature
    #[arg(short, long)]
    key: Option<String>,

    /// Maximum number of concurrent sends
    #[arg(short = 'l', long)]
    rate_limit: Option<usize>,

    /// PEM file with the hub's public key
    #[arg(long)]
    crypto_key: Option<PathBuf>,

    /// `rest` or `grpc`
    #[arg(short, long)]
    transport: Option<TransportKind>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("metrics_relay", LevelFilter::DEBUG),
        ("agent", LevelFilter::TRACE),
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

fn resolve_config(args: Args) -> anyhow::Result<AgentConfig> {
    let mut config = match args.config.or_else(|| env_string("CONFIG").map(PathBuf::from)) {
        Some(path) => read_config_file(path)?,
        None => AgentConfig::default(),
    };
    config.apply_env()?;

    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(interval) = args.poll_interval {
        config.poll_interval = interval;
    }
    if let Some(interval) = args.report_interval {
        config.report_interval = interval;
    }
    if let Some(key) = args.key {
        config.hash_key = Some(key);
    }
    if let Some(limit) = args.rate_limit {
        config.rate_limit = limit;
    }
    if let Some(path) = args.crypto_key {
        config.crypto_key = Some(path);
    }
    if let Some(transport) = args.transport {
        config.transport = transport;
    }

    config.hash_key = config.hash_key.filter(|key| !key.is_empty());
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = resolve_config(args)?;
    let transport = build_transport(&config)?;

    let handle = AgentHandle::spawn(Schedule::from(&config), transport);
    info!(
        "agent running: poll every {}s, report every {}s, {} workers",
        config.poll_interval, config.report_interval, config.rate_limit
    );

    shutdown_signal().await?;

    info!("shutting down, draining queued reports");
    handle.shutdown().await?;

    Ok(())
}
