//! Notion Client Integration Tests
//!
//! Runs the Notion record source against a mock HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use drilling_stream_emulator::infrastructure::notion::{
    NotionConfig, NotionError, NotionRecordSource,
};
use drilling_stream_emulator::{DataSource, RecordSource, SourceError};

const QUERY_PATH: &str = "/v1/data_sources/ds-42/query";

fn config(server: &MockServer) -> NotionConfig {
    NotionConfig {
        api_key: "secret_test".to_string(),
        data_source_id: "ds-42".to_string(),
        api_url: format!("{}/v1", server.uri()),
        api_version: "2025-09-03".to_string(),
        sort_property: Some("Номер".to_string()),
        page_size: 2,
        timeout: Duration::from_secs(5),
    }
}

fn page(number: i64, depth: Option<f64>) -> Value {
    json!({
        "object": "page",
        "id": format!("page-{number}"),
        "properties": {
            "Номер": {"id": "n", "type": "number", "number": number},
            "Depth": {"id": "d", "type": "number", "number": depth},
            "Comment": {"id": "c", "type": "rich_text", "rich_text": []}
        }
    })
}

#[tokio::test]
async fn fetches_all_pages_in_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(header("authorization", "Bearer secret_test"))
        .and(header("notion-version", "2025-09-03"))
        .and(|req: &Request| {
            serde_json::from_slice::<Value>(&req.body)
                .map(|body| body.get("start_cursor").is_none())
                .unwrap_or(false)
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "results": [page(1, Some(1500.5)), page(2, None)],
            "has_more": true,
            "next_cursor": "cursor-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(json!({"start_cursor": "cursor-2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "results": [page(3, Some(1510.0))],
            "has_more": false,
            "next_cursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = NotionRecordSource::new(config(&server)).unwrap();
    let records = source.fetch_records().await.unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].get_f64("Depth"), Some(1500.5));
    assert_eq!(records[1].get_f64("Depth"), Some(0.0));
    assert_eq!(records[2].get_f64("Номер"), Some(3.0));
    assert!(records.iter().all(|r| r.get("Comment").is_none()));
}

#[tokio::test]
async fn sends_sort_and_page_size() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(json!({
            "page_size": 2,
            "sorts": [{"property": "Номер", "direction": "ascending"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [page(1, Some(10.0))],
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = NotionRecordSource::new(config(&server)).unwrap();
    assert_eq!(source.fetch_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn api_error_maps_to_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "object": "error",
            "status": 401,
            "code": "unauthorized",
            "message": "API token is invalid."
        })))
        .mount(&server)
        .await;

    let source = NotionRecordSource::new(config(&server)).unwrap();

    assert_eq!(
        source.fetch_records().await,
        Err(NotionError::Api {
            status: 401,
            message: "unauthorized: API token is invalid.".to_string()
        })
    );
    assert_eq!(
        source.fetch_all().await,
        Err(SourceError::Unavailable(
            "notion api error (401): unauthorized: API token is invalid.".to_string()
        ))
    );
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let source = NotionRecordSource::new(config(&server)).unwrap();
    assert!(matches!(
        source.fetch_records().await,
        Err(NotionError::JsonParse(_))
    ));
}

#[tokio::test]
async fn empty_data_source_is_rejected_by_data_source() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [],
            "has_more": false
        })))
        .mount(&server)
        .await;

    let source = NotionRecordSource::new(config(&server)).unwrap();
    let data = DataSource::new(std::sync::Arc::new(source));

    assert_eq!(data.load().await, Err(SourceError::Empty));
    assert!(!data.is_loaded());
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let server = MockServer::start().await;
    let cfg = config(&server);
    drop(server);

    let source = NotionRecordSource::new(cfg).unwrap();
    assert!(matches!(
        source.fetch_records().await,
        Err(NotionError::Network(_))
    ));
}
