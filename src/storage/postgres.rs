//! PostgreSQL storage backend implementation
//!
//! One table, `metric_storage`, keyed by `(name, type)`:
//!
//! - Single writes are `INSERT ... ON CONFLICT DO UPDATE` upserts
//! - Batch writes run every upsert inside one transaction (all-or-nothing)
//! - Every call runs under a short deadline (1s ping, 2s single ops, 3s
//!   batches and listings)
//!
//! Values are stored as `double precision`; counters are read back by
//! truncating to `i64`. Connection-class errors surface as
//! `StorageError::Transient` so that [`super::retry::RetryingBackend`] can
//! retry them.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Connection, Postgres, Transaction};
use tracing::{debug, info, instrument};

use crate::MetricType;

use super::backend::StorageBackend;
use super::error::{StorageError, StorageResult};
use super::schema::{
    CREATE_TABLE, InternalMetric, SELECT_ALL_METRICS, SELECT_METRIC, TABLE_NAME, UPSERT_METRIC,
};

const PING_TIMEOUT: Duration = Duration::from_secs(1);
const SINGLE_OP_TIMEOUT: Duration = Duration::from_secs(2);
const BATCH_TIMEOUT: Duration = Duration::from_secs(3);

/// PostgreSQL storage backend
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Connect and create the schema if it does not exist yet
    #[instrument(skip_all)]
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(BATCH_TIMEOUT)
            .connect(dsn)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        info!("PostgreSQL connection pool created");

        let backend = Self { pool };
        backend.create_schema().await?;
        Ok(backend)
    }

    async fn create_schema(&self) -> StorageResult<()> {
        debug!("ensuring table {} exists", TABLE_NAME);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        sqlx::query(CREATE_TABLE)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        Ok(())
    }

    async fn upsert(
        tx: &mut Transaction<'_, Postgres>,
        metric: &InternalMetric,
    ) -> StorageResult<()> {
        sqlx::query(UPSERT_METRIC)
            .bind(&metric.id)
            .bind(metric.kind.as_str())
            .bind(column_value(metric)?)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

/// Run `fut` under `limit`, mapping an elapsed deadline to `StorageError::Timeout`
async fn with_deadline<T, F>(operation: &'static str, limit: Duration, fut: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StorageError::Timeout(operation))?
}

/// Numeric column value for a stored metric.
///
/// The column is `double precision`, so counter totals beyond 2^53 lose
/// their low bits on the way in and are read back rounded.
fn column_value(metric: &InternalMetric) -> StorageResult<f64> {
    match metric.kind {
        MetricType::Counter => Ok(metric.counter_total()? as f64),
        MetricType::Gauge => metric.gauge_value(),
    }
}

fn from_row((name, kind, value): (String, String, f64)) -> StorageResult<InternalMetric> {
    Ok(match kind.parse::<MetricType>()? {
        MetricType::Counter => InternalMetric::counter(name, value as i64),
        MetricType::Gauge => InternalMetric::gauge(name, value),
    })
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    #[instrument(skip(self, metric), fields(id = %metric.id, kind = %metric.kind))]
    async fn add_metric(&self, metric: InternalMetric) -> StorageResult<()> {
        let value = column_value(&metric)?;

        with_deadline("add_metric", SINGLE_OP_TIMEOUT, async {
            sqlx::query(UPSERT_METRIC)
                .bind(&metric.id)
                .bind(metric.kind.as_str())
                .bind(value)
                .execute(&self.pool)
                .await?;
            Ok::<_, StorageError>(())
        })
        .await
    }

    #[instrument(skip(self, metrics), fields(count = metrics.len()))]
    async fn add_multiple_metrics(&self, metrics: Vec<InternalMetric>) -> StorageResult<()> {
        if metrics.is_empty() {
            return Ok(());
        }

        with_deadline("add_multiple_metrics", BATCH_TIMEOUT, async {
            // dropping the transaction on error rolls it back
            let mut tx = self.pool.begin().await?;
            for metric in &metrics {
                Self::upsert(&mut tx, metric).await?;
            }
            tx.commit().await?;

            debug!("committed {} metrics", metrics.len());
            Ok::<_, StorageError>(())
        })
        .await
    }

    async fn get_metric(&self, kind: MetricType, id: &str) -> StorageResult<InternalMetric> {
        let row = with_deadline("get_metric", SINGLE_OP_TIMEOUT, async {
            Ok::<_, StorageError>(sqlx::query_as::<_, (String, String, f64)>(SELECT_METRIC)
                .bind(id)
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await?)
        })
        .await?;

        match row {
            Some(row) => from_row(row),
            None => Err(StorageError::MetricNotFound {
                kind,
                id: id.to_string(),
            }),
        }
    }

    async fn get_all_metrics(&self) -> StorageResult<Vec<InternalMetric>> {
        let rows = with_deadline("get_all_metrics", BATCH_TIMEOUT, async {
            Ok::<_, StorageError>(sqlx::query_as::<_, (String, String, f64)>(SELECT_ALL_METRICS)
                .fetch_all(&self.pool)
                .await?)
        })
        .await?;

        rows.into_iter().map(from_row).collect()
    }

    async fn ping(&self) -> StorageResult<()> {
        with_deadline("ping", PING_TIMEOUT, async {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await?;
            Ok::<_, StorageError>(())
        })
        .await
    }

    async fn close(&self) -> StorageResult<()> {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
        Ok(())
    }
}
