//! Tests for the middleware stack

use crate::storage::{MemoryStorage, MetricStorage};
use crate::{create_router, AppState};
use axum::http::header::HeaderName;
use axum_test::TestServer;
use std::sync::Arc;

fn real_ip() -> HeaderName {
    HeaderName::from_static("x-real-ip")
}

fn server_with_subnet(trusted_subnet: Option<&str>) -> TestServer {
    let state = AppState {
        storage: Arc::new(MemoryStorage::new()) as Arc<dyn MetricStorage>,
        signing_key: None,
        database_dsn: None,
        trusted_subnet: trusted_subnet.map(String::from),
    };
    TestServer::new(create_router(state)).expect("router builds")
}

// ============================================================================
// Trusted Subnet
// ============================================================================

#[tokio::test]
async fn test_no_subnet_configured_passes_everything() {
    let server = server_with_subnet(None);

    let response = server.post("/update/counter/c/1").await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_missing_real_ip_header_is_400() {
    let server = server_with_subnet(Some("10.0.0.0/8"));

    let response = server.post("/update/counter/c/1").await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_unparsable_real_ip_is_400() {
    let server = server_with_subnet(Some("10.0.0.0/8"));

    let response = server
        .post("/update/counter/c/1")
        .add_header(real_ip(), "not-an-ip".parse::<axum::http::HeaderValue>().unwrap())
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_ip_outside_subnet_is_403() {
    let server = server_with_subnet(Some("10.0.0.0/8"));

    let response = server
        .post("/update/counter/c/1")
        .add_header(real_ip(), "192.168.1.5".parse::<axum::http::HeaderValue>().unwrap())
        .await;
    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn test_ip_inside_subnet_passes() {
    let server = server_with_subnet(Some("10.0.0.0/8"));

    let response = server
        .post("/update/counter/c/1")
        .add_header(real_ip(), "10.20.30.40".parse::<axum::http::HeaderValue>().unwrap())
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_unparsable_configured_cidr_is_400() {
    let server = server_with_subnet(Some("not-a-cidr"));

    let response = server
        .post("/update/counter/c/1")
        .add_header(real_ip(), "10.0.0.1".parse::<axum::http::HeaderValue>().unwrap())
        .await;
    assert_eq!(response.status_code(), 400);
}

// ============================================================================
// Content Type Restriction
// ============================================================================

#[tokio::test]
async fn test_unsupported_content_type_is_400() {
    let server = server_with_subnet(None);

    let response = server
        .post("/update/")
        .bytes("<metric/>".into())
        .content_type("text/xml")
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_json_and_html_content_types_pass() {
    let server = server_with_subnet(None);

    let response = server
        .post("/update/")
        .json(&serde_json::json!({"id": "g", "type": "gauge", "value": 1.0}))
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_corrupt_gzip_body_is_400() {
    let server = server_with_subnet(None);

    let response = server
        .post("/updates/")
        .content_type("application/json")
        .add_header(
            HeaderName::from_static("content-encoding"),
            "gzip".parse::<axum::http::HeaderValue>().unwrap(),
        )
        .bytes(vec![0x1f, 0x8b, 0xff, 0xff, 0x00].into())
        .await;

    assert_eq!(response.status_code(), 400);
}
