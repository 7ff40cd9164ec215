use std::fmt::Display;
use std::net::{IpAddr, UdpSocket};
use std::str::FromStr;

use anyhow::{Context, anyhow};
use tracing::info;

/// Value of environment variable `name`, `None` when unset or empty
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Parse `value` taken from setting `name`, naming the setting on failure
pub fn parse_setting<T>(name: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("invalid value {:?} for `{}`: {}", value, name, e))
}

/// Address of the interface that routes outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only asks the OS to pick the
/// source address. Loopback results are discarded.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_loopback() && !ip.is_unspecified()).then_some(ip)
}

/// Resolve on the first Ctrl-C or, on unix, SIGTERM
pub async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminated = terminate.recv();
    #[cfg(not(unix))]
    let terminated = std::future::pending::<Option<()>>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            info!("received SIGINT");
        }
        _ = terminated => info!("received SIGTERM"),
    }

    Ok(())
}
