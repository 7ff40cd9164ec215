//! Storage backends for metric persistence
//!
//! This module provides a trait-based abstraction over the places the hub
//! keeps its metric set.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` is implemented by every backend, the
//!   aggregation service only ever sees `Arc<dyn StorageBackend>`
//! - **Absolute values**: backends store final totals, accumulation happens
//!   in [`crate::service::MetricService`]
//! - **Chosen once**: [`open`] picks the backend from the configuration
//!
//! ## Backends
//!
//! - **In-Memory**: no persistence, used when the snapshot path is empty
//! - **File**: in-memory map snapshotted to a JSON file (default)
//! - **PostgreSQL**: single upsert table, used when a DSN is configured
//!
//! ## Usage
//!
//! ```no_run
//! use metrics_relay::config::StorageConfig;
//! use metrics_relay::storage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = storage::open(&StorageConfig::Memory).await?;
//!     backend.ping().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod file;
pub mod memory;
#[cfg(feature = "storage-postgres")]
pub mod postgres;
pub mod retry;
pub mod schema;

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use schema::InternalMetric;

/// Open the backend selected by `config`
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config {
        StorageConfig::Memory => Arc::new(memory::MemoryBackend::new()),

        StorageConfig::File {
            path,
            store_interval,
            restore,
        } => {
            let mode = file::SnapshotMode::from_interval(*store_interval);
            Arc::new(file::FileBackend::open(path, mode, *restore).await?)
        }

        #[cfg(feature = "storage-postgres")]
        StorageConfig::Postgres { dsn } => {
            let backend = postgres::PostgresBackend::connect(dsn).await?;
            Arc::new(retry::RetryingBackend::new(
                backend,
                retry::RetryPolicy::default(),
            ))
        }

        #[cfg(not(feature = "storage-postgres"))]
        StorageConfig::Postgres { .. } => {
            return Err(StorageError::ConnectionFailed(
                "built without the storage-postgres feature".to_string(),
            ));
        }
    };

    info!("using {} storage backend", backend.name());
    Ok(backend)
}
