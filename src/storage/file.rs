//! File-snapshotted storage backend
//!
//! Wraps a [`MemoryBackend`] and persists its full content as a JSON array
//! of [`InternalMetric`] objects:
//!
//! ```json
//! [{"id":"PollCount","type":"counter","value":"42"},{"id":"Alloc","type":"gauge","value":"1024"}]
//! ```
//!
//! ## Snapshot modes
//!
//! - **Sync** (`store_interval == 0`): every successful write rewrites the file.
//!   A failed rewrite is logged and does not undo or fail the write, since the
//!   map already holds the new state and the next snapshot carries it
//! - **Periodic**: a background task rewrites the file on a fixed interval and
//!   once more when the backend is closed
//!
//! Snapshots are written to a sibling `*.tmp` file and renamed into place, so
//! a crash mid-write leaves the previous snapshot intact.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, instrument, trace};

use crate::MetricType;

use super::backend::StorageBackend;
use super::error::StorageResult;
use super::memory::MemoryBackend;
use super::schema::InternalMetric;

/// When the in-memory state is written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// After every successful write
    Sync,

    /// On a fixed interval, plus once on close
    Periodic(Duration),
}

impl SnapshotMode {
    /// `0` selects synchronous snapshots, anything else the periodic mode
    pub fn from_interval(interval: Duration) -> Self {
        if interval.is_zero() {
            SnapshotMode::Sync
        } else {
            SnapshotMode::Periodic(interval)
        }
    }
}

/// The snapshot file on disk
#[derive(Debug)]
pub struct SnapshotFile {
    path: PathBuf,

    /// Serializes writers so two snapshots never interleave on the temp file
    write_lock: Mutex<()>,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write the current content of `memory` to disk
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn backup(&self, memory: &MemoryBackend) -> StorageResult<usize> {
        let _guard = self.write_lock.lock().await;

        // list under the write lock so the newest snapshot always lands last
        let mut metrics = memory.get_all_metrics().await?;
        metrics.sort_by(|a, b| (a.kind, &a.id).cmp(&(b.kind, &b.id)));

        let content = serde_json::to_vec(&metrics)?;
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        trace!("wrote snapshot with {} metrics", metrics.len());
        Ok(metrics.len())
    }

    /// Read the snapshot back; a missing or empty file yields no metrics
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> StorageResult<Vec<InternalMetric>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no snapshot found, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_slice(&content)?)
    }
}

/// Background snapshot task and its stop signal
struct Flusher {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// In-memory storage persisted to a JSON snapshot file
pub struct FileBackend {
    memory: Arc<MemoryBackend>,
    file: Arc<SnapshotFile>,
    mode: SnapshotMode,
    flusher: Mutex<Option<Flusher>>,
}

impl FileBackend {
    /// Open the backend, restoring the snapshot first when `restore` is set.
    ///
    /// Restored entries are installed as absolute values on an empty map.
    /// In periodic mode the snapshot task is spawned on the current runtime.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), ?mode, restore))]
    pub async fn open(
        path: impl AsRef<Path>,
        mode: SnapshotMode,
        restore: bool,
    ) -> StorageResult<Self> {
        let memory = Arc::new(MemoryBackend::new());
        let file = Arc::new(SnapshotFile::new(path.as_ref()));

        if restore {
            let metrics = file.load().await?;
            info!("restored {} metrics from snapshot", metrics.len());
            memory.replace_all(metrics).await;
        }

        let flusher = match mode {
            SnapshotMode::Sync => None,
            SnapshotMode::Periodic(period) => {
                Some(spawn_flusher(memory.clone(), file.clone(), period))
            }
        };

        Ok(Self {
            memory,
            file,
            mode,
            flusher: Mutex::new(flusher),
        })
    }

    /// Write a snapshot now, regardless of the mode
    pub async fn backup(&self) -> StorageResult<usize> {
        self.file.backup(&self.memory).await
    }

    async fn after_write(&self) {
        if self.mode != SnapshotMode::Sync {
            return;
        }
        if let Err(e) = self.file.backup(&self.memory).await {
            error!("snapshot after write failed: {}", e);
        }
    }
}

fn spawn_flusher(
    memory: Arc<MemoryBackend>,
    file: Arc<SnapshotFile>,
    period: Duration,
) -> Flusher {
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        debug!("snapshot task started (every {:?})", period);
        let mut ticker = time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = file.backup(&memory).await {
                        // keep going, the next tick retries with fresher state
                        error!("periodic snapshot failed: {}", e);
                    }
                }

                _ = &mut stop_rx => break,
            }
        }

        debug!("snapshot task stopped");
    });

    Flusher { stop_tx, task }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn add_metric(&self, metric: InternalMetric) -> StorageResult<()> {
        self.memory.add_metric(metric).await?;
        self.after_write().await;
        Ok(())
    }

    async fn add_multiple_metrics(&self, metrics: Vec<InternalMetric>) -> StorageResult<()> {
        self.memory.add_multiple_metrics(metrics).await?;
        self.after_write().await;
        Ok(())
    }

    async fn get_metric(&self, kind: MetricType, id: &str) -> StorageResult<InternalMetric> {
        self.memory.get_metric(kind, id).await
    }

    async fn get_all_metrics(&self) -> StorageResult<Vec<InternalMetric>> {
        self.memory.get_all_metrics().await
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Stop the snapshot task and write a final snapshot
    async fn close(&self) -> StorageResult<()> {
        if let Some(flusher) = self.flusher.lock().await.take() {
            let _ = flusher.stop_tx.send(());
            if let Err(e) = flusher.task.await {
                error!("snapshot task panicked: {}", e);
            }
        }

        let count = self.backup().await?;
        info!("final snapshot written ({} metrics)", count);
        Ok(())
    }
}
