//! Integration tests for the REST endpoints over a real socket
//!
//! These tests verify that:
//! - The path and JSON forms of update and lookup agree with each other
//! - Responses are gzip-encoded when the client asks for it
//! - Unknown metrics and malformed input map to 404 and 400

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_relay::Metric;
use metrics_relay::api::{ApiConfig, ApiState, spawn_api_server};
use metrics_relay::codec::compression;
use metrics_relay::service::MetricService;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING};
use serde_json::json;

use crate::helpers::memory_service;

async fn spawn_test_api() -> (SocketAddr, Arc<MetricService>) {
    let service = memory_service();
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..ApiConfig::default()
    };
    let addr = spawn_api_server(config, ApiState::new(service.clone()))
        .await
        .unwrap();
    (addr, service)
}

#[tokio::test]
async fn test_path_and_json_forms_agree() {
    let (addr, _service) = spawn_test_api().await;
    let client = reqwest::Client::new();

    for delta in [5, 3] {
        let response = client
            .post(format!("http://{addr}/update/counter/requests/{delta}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = client
        .post(format!("http://{addr}/value/"))
        .json(&json!({ "id": "requests", "type": "counter" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let metric: Metric = response.json().await.unwrap();
    assert_eq!(metric, Metric::counter("requests", 8));

    let text = client
        .get(format!("http://{addr}/value/counter/requests"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "8");
}

#[tokio::test]
async fn test_gauge_overwrite_via_json() {
    let (addr, _service) = spawn_test_api().await;
    let client = reqwest::Client::new();

    for value in [12.5, 7.25] {
        let response = client
            .post(format!("http://{addr}/update/"))
            .json(&Metric::gauge("cpu", value))
            .send()
            .await
            .unwrap();
        let stored: Metric = response.json().await.unwrap();
        assert_eq!(stored.value, Some(value));
    }

    let text = client
        .get(format!("http://{addr}/value/gauge/cpu"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "7.25");
}

#[tokio::test]
async fn test_listing_is_gzipped_on_request() {
    let (addr, service) = spawn_test_api().await;
    let batch: Vec<Metric> = (0..10)
        .map(|i| Metric::gauge(format!("Gauge{i}"), i as f64))
        .collect();
    service.add_multiple_metrics(batch).await.unwrap();

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/"))
        .header(ACCEPT_ENCODING, "gzip")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");

    let body = compression::decompress(&response.bytes().await.unwrap()).unwrap();
    let listing = String::from_utf8(body).unwrap();
    assert_eq!(listing.lines().count(), 10);
    assert!(listing.starts_with("Gauge0:0\n"));
}

#[tokio::test]
async fn test_error_statuses() {
    let (addr, _service) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/value/gauge/unknown"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .post(format!("http://{addr}/update/gauge/cpu/fast"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("http://{addr}/updates/"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .get(format!("http://{addr}/value/summary/cpu"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ping() {
    let (addr, _service) = spawn_test_api().await;

    let response = reqwest::get(format!("http://{addr}/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "Pong");
}
