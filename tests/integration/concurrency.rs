//! Concurrency and race condition tests
//!
//! These tests verify that:
//! - Concurrent counter updates are never lost, whatever the backend
//! - Concurrent batches containing the same counter add up exactly
//! - Gauges written concurrently end with one of the written values

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics_relay::Metric;
use metrics_relay::config::StorageConfig;
use metrics_relay::service::MetricService;
use metrics_relay::storage;
use tempfile::tempdir;

use crate::helpers::memory_service;

async fn hammer_counter(service: Arc<MetricService>, tasks: usize, per_task: usize) {
    let handles = (0..tasks).map(|_| {
        let service = service.clone();
        tokio::spawn(async move {
            for _ in 0..per_task {
                service.add_metric(Metric::counter("hits", 1)).await.unwrap();
            }
        })
    });

    for result in join_all(handles).await {
        result.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_counters_memory() {
    let service = memory_service();
    hammer_counter(service.clone(), 16, 25).await;

    let stored = service.get_metric("counter", "hits").await.unwrap();
    assert_eq!(stored.delta, Some(400));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_counters_file_snapshot() {
    let dir = tempdir().unwrap();
    let config = StorageConfig::File {
        path: dir.path().join("metrics.json"),
        store_interval: Duration::ZERO,
        restore: false,
    };
    let service = Arc::new(MetricService::new(storage::open(&config).await.unwrap()));

    hammer_counter(service.clone(), 8, 10).await;
    service.close().await.unwrap();

    // the last snapshot on disk holds the final total
    let reopened = StorageConfig::File {
        path: dir.path().join("metrics.json"),
        store_interval: Duration::ZERO,
        restore: true,
    };
    let service = MetricService::new(storage::open(&reopened).await.unwrap());
    assert_eq!(
        service.get_metric("counter", "hits").await.unwrap().delta,
        Some(80)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_sum_exactly() {
    let service = memory_service();

    let handles = (0..10i64).map(|i| {
        let service = service.clone();
        tokio::spawn(async move {
            let batch = vec![
                Metric::counter("PollCount", i),
                Metric::counter("PollCount", 1),
                Metric::gauge("Alloc", i as f64),
            ];
            service.add_multiple_metrics(batch).await.unwrap();
        })
    });
    for result in join_all(handles).await {
        result.unwrap();
    }

    // 0 + 1 + ... + 9 plus one extra per batch
    let stored = service.get_metric("counter", "PollCount").await.unwrap();
    assert_eq!(stored.delta, Some(45 + 10));

    let alloc = service.get_metric("gauge", "Alloc").await.unwrap().value.unwrap();
    assert!((0.0..10.0).contains(&alloc));
    assert_eq!(alloc.fract(), 0.0);
}
