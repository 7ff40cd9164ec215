//! REST boundary of the hub
//!
//! ## Endpoints
//!
//! - `POST /update/` - fold one JSON metric, answer with the stored value
//! - `POST /updates/` - fold a JSON batch
//! - `POST /update/:type/:id/:value` - path-parameter form of a single update
//! - `POST /value/` - JSON lookup
//! - `GET /value/:type/:id` - plain-text lookup
//! - `GET /ping` - storage liveness
//! - `GET /` - `id:value` listing
//!
//! ## Layers (outermost first)
//!
//! ```text
//! trace ─► response gzip ─► request gunzip
//!       ─► decrypt ─► verify/sign ─► handler
//! ```
//!
//! Decryption and integrity checking are installed only when a private key
//! or shared secret is configured.

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;

use std::sync::Arc;

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post},
};
#[cfg(feature = "api")]
use std::future::Future;
#[cfg(feature = "api")]
use std::net::SocketAddr;
#[cfg(feature = "api")]
use tokio::task::JoinHandle;
#[cfg(feature = "api")]
use tracing::info;

use crate::codec::encryption::Decryptor;
use crate::config::HubConfig;

/// Largest request body the hub buffers
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "localhost:8080")
    pub bind_addr: String,

    /// Shared secret for request verification and response signing
    pub hash_key: Option<String>,

    /// Private key for encrypted request bodies
    pub decryptor: Option<Arc<Decryptor>>,
}

impl ApiConfig {
    /// Resolve the API settings of a hub, loading the private key if configured
    pub fn from_hub(config: &HubConfig) -> anyhow::Result<Self> {
        let decryptor = match &config.crypto_key {
            Some(path) => Some(Arc::new(Decryptor::from_pem_file(path)?)),
            None => None,
        };

        Ok(Self {
            bind_addr: config.address.clone(),
            hash_key: config.hash_key.clone(),
            decryptor,
        })
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            hash_key: None,
            decryptor: None,
        }
    }
}

/// Build the router with every route and the configured layers
#[cfg(feature = "api")]
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::compression::CompressionLayer;
    use tower_http::decompression::RequestDecompressionLayer;
    use tower_http::trace::TraceLayer;

    let mut app = Router::new()
        .route("/", get(routes::value::list_metrics))
        .route("/ping", get(routes::health::ping))
        .route("/update/", post(routes::update::update_json))
        .route("/updates/", post(routes::update::update_batch))
        .route("/update/:type/:id/:value", post(routes::update::update_path))
        .route("/value/", post(routes::value::value_json))
        .route("/value/:type/:id", get(routes::value::value_path))
        .with_state(state);

    // innermost first: verification must see the decrypted JSON
    if let Some(key) = config.hash_key.as_deref().filter(|key| !key.is_empty()) {
        app = app.layer(axum::middleware::from_fn_with_state(
            middleware::integrity::IntegrityKey::new(key),
            middleware::integrity::verify_integrity,
        ));
    }

    if let Some(decryptor) = &config.decryptor {
        app = app.layer(axum::middleware::from_fn_with_state(
            decryptor.clone(),
            middleware::crypto::decrypt_body,
        ));
    }

    app.layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task that runs until the
/// process exits. Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    let (addr, _task) =
        spawn_api_server_with_shutdown(config, state, std::future::pending()).await?;
    Ok(addr)
}

/// Spawn the API server, stopping gracefully once `shutdown` resolves
///
/// Returns the server's local address and the task serving it.
#[cfg(feature = "api")]
pub async fn spawn_api_server_with_shutdown<F>(
    config: ApiConfig,
    state: ApiState,
    shutdown: F,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str()).await?;
    let addr = listener.local_addr()?;

    info!(
        "API server listening on {} (verify: {}, decrypt: {})",
        addr,
        config.hash_key.is_some(),
        config.decryptor.is_some()
    );

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok((addr, task))
}
