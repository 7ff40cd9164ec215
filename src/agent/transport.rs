//! Transports delivering a batch to the hub
//!
//! - [`RestTransport`]: one gzip `POST /updates/` per batch, optionally
//!   signed and encrypted, retried with capped exponential backoff when the
//!   hub could not be reached. An answered request is never resent: the hub
//!   may have folded the batch before failing.
//! - [`RpcTransport`]: one unary `AddMetrics` call with a per-call deadline

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use tracing::{debug, instrument, warn};

use crate::Metric;
use crate::codec::signing::HASH_HEADER;
use crate::codec::{BatchEncoder, CodecError, compression};
use crate::rpc::MetricsRpcClient;
use crate::rpc::proto::{self, AddMetricsRequest};

/// Header naming the agent's own address
pub const REAL_IP_HEADER: &str = "X-Real-IP";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline of a single RPC call
pub const RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum TransportError {
    /// The batch could not be encoded
    Encode(CodecError),

    /// The request never got an answer (connect, timeout, reset)
    Request(reqwest::Error),

    /// The hub answered with a non-success status
    Rejected { status: StatusCode, body: String },

    /// The RPC call failed
    Rpc(tonic::Status),

    /// The transport could not be set up
    Setup(String),
}

impl TransportError {
    /// Failures worth another attempt: the hub never answered
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Request(_) => true,
            TransportError::Rpc(status) => status.code() == tonic::Code::Unavailable,
            _ => false,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Encode(err) => write!(f, "failed to encode batch: {}", err),
            TransportError::Request(err) => write!(f, "request failed: {}", err),
            TransportError::Rejected { status, body } => {
                write!(f, "hub rejected batch with {}: {}", status, body.trim())
            }
            TransportError::Rpc(status) => write!(f, "rpc failed: {}", status),
            TransportError::Setup(msg) => write!(f, "failed to set up transport: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        TransportError::Encode(err)
    }
}

/// One way of handing a batch to the hub
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_metrics(&self, batch: &[Metric]) -> Result<(), TransportError>;
}

/// Capped exponential backoff between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub max_retries: u32,
    pub wait: Duration,
    pub max_wait: Duration,
}

impl Backoff {
    /// Delay before retry number `attempt` (starting at 0)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.wait
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_wait)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(5),
        }
    }
}

pub struct RestTransport {
    client: reqwest::Client,
    url: String,
    encoder: BatchEncoder,
    real_ip: Option<IpAddr>,
    backoff: Backoff,
}

impl RestTransport {
    /// Transport posting to `http://{address}/updates/`
    ///
    /// `address` may already carry a scheme, in which case it is kept.
    pub fn new(address: &str, encoder: BatchEncoder) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        let base = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };

        Ok(Self {
            client,
            url: format!("{}/updates/", base),
            encoder,
            real_ip: None,
            backoff: Backoff::default(),
        })
    }

    pub fn with_real_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.real_ip = ip;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, body: &[u8], signature: Option<&str>) -> Result<(), TransportError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .header(ACCEPT_ENCODING, "gzip")
            .body(body.to_vec());

        if let Some(signature) = signature {
            request = request.header(HASH_HEADER, signature);
        }
        if let Some(ip) = self.real_ip {
            request = request.header(REAL_IP_HEADER, ip.to_string());
        }

        let response = request.send().await.map_err(TransportError::Request)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let gzipped = response
            .headers()
            .get(CONTENT_ENCODING)
            .is_some_and(|encoding| encoding.as_bytes().eq_ignore_ascii_case(b"gzip"));
        let bytes = response.bytes().await.unwrap_or_default();
        let body = if gzipped {
            compression::decompress(&bytes).unwrap_or_else(|_| bytes.to_vec())
        } else {
            bytes.to_vec()
        };

        Err(TransportError::Rejected {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[async_trait]
impl Transport for RestTransport {
    #[instrument(skip_all, fields(url = %self.url, count = batch.len()))]
    async fn send_metrics(&self, batch: &[Metric]) -> Result<(), TransportError> {
        let encoded = self.encoder.encode(batch)?;

        let mut attempt = 0;
        loop {
            match self.post(&encoded.body, encoded.signature.as_deref()).await {
                Ok(()) => {
                    debug!("delivered {} metrics", batch.len());
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.backoff.max_retries => {
                    let delay = self.backoff.delay(attempt);
                    attempt += 1;
                    warn!(
                        "send failed, retry {}/{} in {:?}: {}",
                        attempt, self.backoff.max_retries, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub struct RpcTransport {
    client: MetricsRpcClient,
}

impl RpcTransport {
    pub fn new(address: &str) -> Result<Self, TransportError> {
        let client = MetricsRpcClient::new(address, RPC_TIMEOUT)
            .map_err(|e| TransportError::Setup(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for RpcTransport {
    #[instrument(skip_all, fields(count = batch.len()))]
    async fn send_metrics(&self, batch: &[Metric]) -> Result<(), TransportError> {
        let request = AddMetricsRequest {
            metrics: batch.iter().map(proto::Metric::from).collect(),
        };

        let response = self
            .client
            .add_metrics(request)
            .await
            .map_err(TransportError::Rpc)?;

        debug!("hub answered: {}", response.get_ref().message);
        Ok(())
    }
}
