//! End-to-end delivery: agent transport → hub API → aggregation service
//!
//! These tests verify that:
//! - A signed, encrypted, gzipped batch is accepted and folded correctly
//! - The agent reports once at start-up and resets its counter on delivery
//! - A batch signed with the wrong secret is rejected and never stored
//! - A failing snapshot never causes a counter delta to be folded twice

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use metrics_relay::Metric;
use metrics_relay::agent::collector::{POLL_COUNT, RANDOM_VALUE};
use metrics_relay::agent::transport::{Transport, TransportError};
use metrics_relay::agent::{AgentHandle, Schedule, build_transport};
use metrics_relay::api::{ApiConfig, ApiState, spawn_api_server};
use metrics_relay::config::{AgentConfig, HubConfig, StorageConfig};
use metrics_relay::service::MetricService;
use metrics_relay::storage;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use tempfile::{TempDir, tempdir};

use crate::helpers::{memory_service, write_key_files};

struct Hub {
    service: Arc<MetricService>,
    // keeps the key files alive
    _dir: TempDir,
}

/// Hub with both a shared secret and a private key, plus the matching agent config
async fn secured_hub() -> (Hub, AgentConfig) {
    let dir = tempdir().unwrap();
    let (public_key, private_key) = write_key_files(dir.path());

    let hub_config = HubConfig {
        address: "127.0.0.1:0".to_string(),
        hash_key: Some("secret".to_string()),
        crypto_key: Some(private_key),
        ..HubConfig::default()
    };
    let service = memory_service();
    let addr = spawn_api_server(
        ApiConfig::from_hub(&hub_config).unwrap(),
        ApiState::new(service.clone()),
    )
    .await
    .unwrap();

    let agent_config = AgentConfig {
        address: addr.to_string(),
        hash_key: Some("secret".to_string()),
        crypto_key: Some(public_key),
        ..AgentConfig::default()
    };

    (
        Hub {
            service,
            _dir: dir,
        },
        agent_config,
    )
}

#[tokio::test]
async fn test_secured_batch_is_folded() {
    let (hub, agent_config) = secured_hub().await;
    let transport = build_transport(&agent_config).unwrap();

    // enough metrics to span several OAEP blocks
    let mut batch: Vec<Metric> = (0..20)
        .map(|i| Metric::gauge(format!("CPUutilization{}", i + 1), i as f64 * 1.5))
        .collect();
    batch.push(Metric::counter(POLL_COUNT, 5));
    batch.push(Metric::counter(POLL_COUNT, 3));

    transport.send_metrics(&batch).await.unwrap();

    let stored = hub.service.get_metric("counter", POLL_COUNT).await.unwrap();
    assert_eq!(stored.delta, Some(8));

    let cpu = hub.service.get_metric("gauge", "CPUutilization20").await.unwrap();
    assert_eq!(cpu.value, Some(28.5));
    assert_eq!(hub.service.get_all_metrics().await.unwrap().len(), 21);
}

#[tokio::test]
async fn test_agent_reports_at_startup() {
    let (hub, agent_config) = secured_hub().await;
    let transport = build_transport(&agent_config).unwrap();

    let schedule = Schedule {
        poll_interval: Duration::from_secs(3600),
        report_interval: Duration::from_secs(3600),
        rate_limit: 2,
    };
    let handle = AgentHandle::spawn(schedule, transport);
    handle.shutdown().await.unwrap();

    let stored = hub.service.get_metric("counter", POLL_COUNT).await.unwrap();
    assert_eq!(stored.delta, Some(1));
    assert!(hub.service.get_metric("gauge", RANDOM_VALUE).await.is_ok());
    assert_eq!(handle.agent().poll_count().await, 0);
}

#[tokio::test]
async fn test_wrong_secret_is_rejected() {
    let (hub, mut agent_config) = secured_hub().await;
    agent_config.hash_key = Some("not-the-secret".to_string());
    let transport = build_transport(&agent_config).unwrap();

    let result = transport.send_metrics(&[Metric::gauge("cpu", 1.0)]).await;

    assert_matches!(
        result,
        Err(TransportError::Rejected { status, ref body })
            if status == StatusCode::BAD_REQUEST && body.contains("invalid hash value")
    );
    assert!(hub.service.get_all_metrics().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unsigned_plain_batch_without_keys() {
    let service = memory_service();
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..ApiConfig::default()
    };
    let addr = spawn_api_server(config, ApiState::new(service.clone()))
        .await
        .unwrap();

    let agent_config = AgentConfig {
        address: addr.to_string(),
        ..AgentConfig::default()
    };
    let transport = build_transport(&agent_config).unwrap();
    transport
        .send_metrics(&[Metric::gauge("Alloc", 2.5)])
        .await
        .unwrap();

    assert_eq!(
        service.get_metric("gauge", "Alloc").await.unwrap().value,
        Some(2.5)
    );
}

#[tokio::test]
async fn test_snapshot_failure_does_not_duplicate_counter() {
    let dir = tempdir().unwrap();
    let storage_config = StorageConfig::File {
        path: dir.path().join("missing").join("metrics.json"),
        store_interval: Duration::ZERO,
        restore: false,
    };
    let service = Arc::new(MetricService::new(
        storage::open(&storage_config).await.unwrap(),
    ));
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..ApiConfig::default()
    };
    let addr = spawn_api_server(config, ApiState::new(service.clone()))
        .await
        .unwrap();

    let agent_config = AgentConfig {
        address: addr.to_string(),
        ..AgentConfig::default()
    };
    let transport = build_transport(&agent_config).unwrap();
    transport
        .send_metrics(&[Metric::counter(POLL_COUNT, 5)])
        .await
        .unwrap();

    let stored = service.get_metric("counter", POLL_COUNT).await.unwrap();
    assert_eq!(stored.delta, Some(5));
}
