//! Snapshot persistence across hub restarts
//!
//! These tests verify that:
//! - Metrics written through the service survive close + reopen
//! - Counters resume from their stored totals instead of double counting
//! - `restore = false` starts from an empty set even when a snapshot exists
//! - The snapshot file is a plain JSON array of `{id, type, value}` objects

use std::sync::Arc;
use std::time::Duration;

use metrics_relay::Metric;
use metrics_relay::config::{HubConfig, StorageConfig};
use metrics_relay::service::MetricService;
use metrics_relay::storage;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

async fn open_service(config: &StorageConfig) -> MetricService {
    MetricService::new(storage::open(config).await.unwrap())
}

fn file_config(path: std::path::PathBuf, interval: u64, restore: bool) -> StorageConfig {
    StorageConfig::File {
        path,
        store_interval: Duration::from_secs(interval),
        restore,
    }
}

#[tokio::test]
async fn test_restart_restores_absolute_values() {
    let dir = tempdir().unwrap();
    let config = file_config(dir.path().join("metrics.json"), 0, true);

    let service = open_service(&config).await;
    service.add_metric(Metric::counter("requests", 5)).await.unwrap();
    service.add_metric(Metric::counter("requests", 3)).await.unwrap();
    service.add_metric(Metric::gauge("cpu", 7.25)).await.unwrap();
    service.close().await.unwrap();

    // two restarts must not inflate the counter
    for _ in 0..2 {
        let service = open_service(&config).await;
        assert_eq!(
            service.get_metric("counter", "requests").await.unwrap(),
            Metric::counter("requests", 8)
        );
        assert_eq!(
            service.get_metric("gauge", "cpu").await.unwrap(),
            Metric::gauge("cpu", 7.25)
        );
        service.close().await.unwrap();
    }

    let service = open_service(&config).await;
    service.add_metric(Metric::counter("requests", 2)).await.unwrap();
    assert_eq!(
        service.get_metric("counter", "requests").await.unwrap().delta,
        Some(10)
    );
    service.close().await.unwrap();
}

#[tokio::test]
async fn test_restore_disabled_starts_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let service = open_service(&file_config(path.clone(), 0, true)).await;
    service.add_metric(Metric::gauge("cpu", 1.0)).await.unwrap();
    service.close().await.unwrap();

    let service = open_service(&file_config(path, 0, false)).await;
    assert!(service.get_all_metrics().await.unwrap().is_empty());
    service.close().await.unwrap();
}

#[tokio::test]
async fn test_periodic_mode_flushes_on_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let config = file_config(path.clone(), 300, true);

    let service = open_service(&config).await;
    service
        .add_multiple_metrics(vec![
            Metric::counter("PollCount", 1),
            Metric::counter("PollCount", 2),
            Metric::gauge("Alloc", 64.0),
        ])
        .await
        .unwrap();

    // nothing is written before the first tick
    assert!(!path.exists());
    service.close().await.unwrap();

    let service = open_service(&config).await;
    let metrics = service.get_all_metrics().await.unwrap();
    assert_eq!(
        metrics,
        vec![Metric::gauge("Alloc", 64.0), Metric::counter("PollCount", 3)]
    );
    service.close().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_format() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let service = open_service(&file_config(path.clone(), 0, true)).await;
    service.add_metric(Metric::counter("hits", 42)).await.unwrap();
    service.close().await.unwrap();

    let content: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        content,
        serde_json::json!([{ "id": "hits", "type": "counter", "value": "42" }])
    );
}

#[tokio::test]
async fn test_snapshot_written_by_hand_is_restored() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let snapshot = concat!(
        r#"[{"id":"Alloc","type":"gauge","value":"1.5"},"#,
        r#"{"id":"PollCount","type":"counter","value":"7"}]"#,
    );
    std::fs::write(&path, snapshot).unwrap();

    let service = open_service(&file_config(path, 0, true)).await;
    assert_eq!(
        service.get_metric("gauge", "Alloc").await.unwrap().value,
        Some(1.5)
    );
    assert_eq!(
        service.get_metric("counter", "PollCount").await.unwrap().delta,
        Some(7)
    );
    service.close().await.unwrap();
}

#[tokio::test]
async fn test_empty_path_selects_memory_backend() {
    let config = HubConfig {
        file_storage_path: String::new(),
        ..HubConfig::default()
    };

    let backend = storage::open(&config.storage()).await.unwrap();
    assert_eq!(backend.name(), "memory");

    let service = Arc::new(MetricService::new(backend));
    service.add_metric(Metric::gauge("cpu", 3.0)).await.unwrap();
    assert_eq!(service.get_all_metrics().await.unwrap().len(), 1);
}
