//! Agent and hub configuration
//!
//! Settings are resolved in layers: built-in defaults, then an optional JSON
//! file, then environment variables, then command line flags (applied by the
//! binaries). [`AgentConfig::validate`] / [`HubConfig::validate`] run last.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::util::{env_string, parse_setting};

pub const DEFAULT_ADDRESS: &str = "localhost:8080";
pub const DEFAULT_POLL_INTERVAL: u64 = 2;
pub const DEFAULT_REPORT_INTERVAL: u64 = 10;
pub const DEFAULT_RATE_LIMIT: usize = 10;
pub const DEFAULT_STORE_INTERVAL: u64 = 300;
pub const DEFAULT_FILE_STORAGE_PATH: &str = "storefile.json";

/// Upper bound for poll and report intervals, in seconds
pub const MAX_INTERVAL: u64 = 100;

/// How the agent talks to the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Rest,
    Grpc,
}

impl FromStr for TransportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rest" | "http" => Ok(TransportKind::Rest),
            "grpc" | "rpc" => Ok(TransportKind::Grpc),
            other => Err(anyhow!("unknown transport {:?} (expected rest or grpc)", other)),
        }
    }
}

/// Where the hub keeps its metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// Nothing survives a restart
    Memory,

    /// In-memory map snapshotted to `path`
    File {
        path: PathBuf,
        store_interval: Duration,
        restore: bool,
    },

    /// PostgreSQL table
    Postgres { dsn: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub address: String,

    /// Seconds between two polls
    pub poll_interval: u64,

    /// Seconds between two reports
    pub report_interval: u64,

    /// Shared secret for request signatures
    #[serde(rename = "key")]
    pub hash_key: Option<String>,

    /// Number of concurrent senders and queued reports
    pub rate_limit: usize,

    /// PEM file with the hub's public key
    pub crypto_key: Option<PathBuf>,

    pub transport: TransportKind,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            report_interval: DEFAULT_REPORT_INTERVAL,
            hash_key: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            crypto_key: None,
            transport: TransportKind::default(),
        }
    }
}

impl AgentConfig {
    /// Overlay process environment variables
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_env_from(env_string)
    }

    /// Overlay variables resolved through `lookup`
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(address) = lookup("ADDRESS") {
            self.address = address;
        }
        if let Some(value) = lookup("POLL_INTERVAL") {
            self.poll_interval = parse_setting("POLL_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("REPORT_INTERVAL") {
            self.report_interval = parse_setting("REPORT_INTERVAL", &value)?;
        }
        if let Some(key) = lookup("KEY") {
            self.hash_key = Some(key);
        }
        if let Some(value) = lookup("RATE_LIMIT") {
            self.rate_limit = parse_setting("RATE_LIMIT", &value)?;
        }
        if let Some(path) = lookup("CRYPTO_KEY") {
            self.crypto_key = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup("TRANSPORT") {
            self.transport = parse_setting("TRANSPORT", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.address.trim().is_empty() {
            bail!("address must not be empty");
        }
        check_interval("poll_interval", self.poll_interval)?;
        check_interval("report_interval", self.report_interval)?;
        if self.rate_limit == 0 {
            bail!("rate_limit must be at least 1");
        }
        check_key_file(self.crypto_key.as_deref())
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn report_period(&self) -> Duration {
        Duration::from_secs(self.report_interval)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub address: String,

    /// Seconds between snapshots, `0` writes on every change
    pub store_interval: u64,

    /// Snapshot file, empty disables persistence
    pub file_storage_path: String,

    /// Load the snapshot on start
    pub restore: bool,

    /// PostgreSQL connection string, takes precedence over the snapshot file
    pub database_dsn: Option<String>,

    /// Shared secret for request signatures
    #[serde(rename = "key")]
    pub hash_key: Option<String>,

    /// PEM file with the private key
    pub crypto_key: Option<PathBuf>,

    /// gRPC listen address, `None` keeps the RPC server off
    pub grpc_address: Option<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            store_interval: DEFAULT_STORE_INTERVAL,
            file_storage_path: DEFAULT_FILE_STORAGE_PATH.to_string(),
            restore: true,
            database_dsn: None,
            hash_key: None,
            crypto_key: None,
            grpc_address: None,
        }
    }
}

impl HubConfig {
    /// Overlay process environment variables
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_env_from(env_string)
    }

    /// Overlay variables resolved through `lookup`
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(address) = lookup("ADDRESS") {
            self.address = address;
        }
        if let Some(value) = lookup("STORE_INTERVAL") {
            self.store_interval = parse_setting("STORE_INTERVAL", &value)?;
        }
        if let Some(path) = lookup("FILE_STORAGE_PATH") {
            self.file_storage_path = path;
        }
        if let Some(value) = lookup("RESTORE") {
            self.restore = parse_setting("RESTORE", &value.to_ascii_lowercase())?;
        }
        if let Some(dsn) = lookup("DATABASE_DSN") {
            self.database_dsn = Some(dsn);
        }
        if let Some(key) = lookup("KEY") {
            self.hash_key = Some(key);
        }
        if let Some(path) = lookup("CRYPTO_KEY") {
            self.crypto_key = Some(PathBuf::from(path));
        }
        if let Some(address) = lookup("GRPC_ADDRESS") {
            self.grpc_address = Some(address);
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.address.trim().is_empty() {
            bail!("address must not be empty");
        }
        if self.grpc_address.as_ref() == Some(&self.address) {
            bail!("grpc_address must differ from address {}", self.address);
        }
        check_key_file(self.crypto_key.as_deref())
    }

    /// Backend selection: DSN, else snapshot file, else memory only
    pub fn storage(&self) -> StorageConfig {
        match &self.database_dsn {
            Some(dsn) if !dsn.is_empty() => StorageConfig::Postgres { dsn: dsn.clone() },
            _ if self.file_storage_path.is_empty() => StorageConfig::Memory,
            _ => StorageConfig::File {
                path: PathBuf::from(&self.file_storage_path),
                store_interval: Duration::from_secs(self.store_interval),
                restore: self.restore,
            },
        }
    }
}

fn check_interval(name: &str, seconds: u64) -> anyhow::Result<()> {
    if seconds == 0 || seconds > MAX_INTERVAL {
        bail!(
            "{} must satisfy 0 < {} <= {}, got {}",
            name,
            name,
            MAX_INTERVAL,
            seconds
        );
    }
    Ok(())
}

fn check_key_file(path: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = path
        && !path.is_file()
    {
        bail!("crypto key file {} does not exist", path.display());
    }
    Ok(())
}

/// Load a JSON configuration file
pub fn read_config_file<T: DeserializeOwned + Debug>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow!("invalid configuration file {}: {}", path.display(), e))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
