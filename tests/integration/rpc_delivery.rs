//! End-to-end delivery over gRPC: agent RPC transport → hub RPC server
//!
//! These tests verify that:
//! - Batches sent through the RPC transport accumulate in the hub's store
//! - A rejected batch is reported as final and leaves the store untouched
//! - An unreachable hub yields an error the agent may retry

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use metrics_relay::Metric;
use metrics_relay::agent::build_transport;
use metrics_relay::agent::collector::POLL_COUNT;
use metrics_relay::agent::transport::{RpcTransport, Transport, TransportError};
use metrics_relay::config::{AgentConfig, TransportKind};
use metrics_relay::rpc::spawn_rpc_server;
use pretty_assertions::assert_eq;
use tokio::sync::oneshot;

use crate::helpers::memory_service;

#[tokio::test]
async fn test_rpc_batches_accumulate() {
    let service = memory_service();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let (addr, server) = spawn_rpc_server("127.0.0.1:0", service.clone(), async {
        let _ = stop_rx.await;
    })
    .await
    .unwrap();

    let agent_config = AgentConfig {
        address: addr.to_string(),
        transport: TransportKind::Grpc,
        ..AgentConfig::default()
    };
    let transport = build_transport(&agent_config).unwrap();

    transport
        .send_metrics(&[Metric::counter(POLL_COUNT, 5), Metric::gauge("Alloc", 1.5)])
        .await
        .unwrap();
    transport
        .send_metrics(&[Metric::counter(POLL_COUNT, 3), Metric::gauge("Alloc", 4.0)])
        .await
        .unwrap();

    let stored = service.get_metric("counter", POLL_COUNT).await.unwrap();
    assert_eq!(stored.delta, Some(8));
    let alloc = service.get_metric("gauge", "Alloc").await.unwrap();
    assert_eq!(alloc.value, Some(4.0));

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_rpc_overflow_is_rejected_without_retry() {
    let service = memory_service();
    let (addr, _server) = spawn_rpc_server("127.0.0.1:0", service.clone(), std::future::pending())
        .await
        .unwrap();

    let transport = RpcTransport::new(&format!("http://{}", addr)).unwrap();
    let result = transport
        .send_metrics(&[Metric::counter(POLL_COUNT, i64::MAX)])
        .await;
    assert!(result.is_ok());

    let result = transport
        .send_metrics(&[Metric::counter(POLL_COUNT, 1)])
        .await;
    assert_matches!(
        result,
        Err(TransportError::Rpc(ref status)) if status.code() == tonic::Code::InvalidArgument
    );
    assert!(!result.unwrap_err().is_retryable());

    let stored = service.get_metric("counter", POLL_COUNT).await.unwrap();
    assert_eq!(stored.delta, Some(i64::MAX));
}

#[tokio::test]
async fn test_unreachable_hub_is_retryable() {
    // nothing listens on the discard port
    let transport = RpcTransport::new("127.0.0.1:9").unwrap();

    let err = transport
        .send_metrics(&[Metric::gauge("Alloc", 1.0)])
        .await
        .unwrap_err();

    assert_matches!(
        err,
        TransportError::Rpc(ref status) if status.code() == tonic::Code::Unavailable
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_services_share_one_store() {
    let service = memory_service();
    let (addr, _server) = spawn_rpc_server("127.0.0.1:0", service.clone(), std::future::pending())
        .await
        .unwrap();
    let transport: Arc<dyn Transport> = Arc::new(RpcTransport::new(&addr.to_string()).unwrap());

    service.add_metric(Metric::counter(POLL_COUNT, 2)).await.unwrap();
    transport
        .send_metrics(&[Metric::counter(POLL_COUNT, 2)])
        .await
        .unwrap();

    let stored = service.get_metric("counter", POLL_COUNT).await.unwrap();
    assert_eq!(stored.delta, Some(4));
}
