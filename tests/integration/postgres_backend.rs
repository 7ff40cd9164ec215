//! PostgreSQL backend against a live database
//!
//! Runs only when `TEST_DATABASE_URL` points at a disposable database; every
//! test uses its own metric ids so runs do not interfere.

use std::sync::Arc;

use metrics_relay::Metric;
use metrics_relay::config::StorageConfig;
use metrics_relay::service::MetricService;
use metrics_relay::storage;
use pretty_assertions::assert_eq;

async fn service() -> Option<MetricService> {
    let Ok(dsn) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };

    let backend = storage::open(&StorageConfig::Postgres { dsn }).await.unwrap();
    Some(MetricService::new(backend))
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, rand::random::<u32>())
}

#[tokio::test]
async fn test_counter_accumulates_in_table() {
    let Some(service) = service().await else {
        return;
    };
    let id = unique("requests");

    service.add_metric(Metric::counter(&id, 5)).await.unwrap();
    service.add_metric(Metric::counter(&id, 3)).await.unwrap();

    assert_eq!(
        service.get_metric("counter", &id).await.unwrap(),
        Metric::counter(&id, 8)
    );
    service.close().await.unwrap();
}

#[tokio::test]
async fn test_batch_upsert_and_listing() {
    let Some(service) = service().await else {
        return;
    };
    let service = Arc::new(service);
    let counter = unique("PollCount");
    let gauge = unique("Alloc");

    service
        .add_multiple_metrics(vec![
            Metric::counter(&counter, 2),
            Metric::gauge(&gauge, 1.5),
            Metric::counter(&counter, 2),
            Metric::gauge(&gauge, 4.5),
        ])
        .await
        .unwrap();

    let all = service.get_all_metrics().await.unwrap();
    assert!(all.contains(&Metric::counter(&counter, 4)));
    assert!(all.contains(&Metric::gauge(&gauge, 4.5)));

    service.ping().await.unwrap();
    service.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_row_is_not_found() {
    let Some(service) = service().await else {
        return;
    };

    let result = service.get_metric("gauge", &unique("absent")).await;
    assert!(matches!(
        result,
        Err(metrics_relay::storage::StorageError::MetricNotFound { .. })
    ));
    service.close().await.unwrap();
}
