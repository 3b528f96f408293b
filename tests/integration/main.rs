//! Integration tests for the indexer
//!
//! These tests use wiremock to stand in for the gateway and drive resolution,
//! crawling and full pipeline cycles end-to-end.

mod crawl_tests;
mod pipeline_tests;
mod resolution_tests;

use arns_indexer::gateway::GatewayClient;
use arns_indexer::storage::{ProcessRecord, SharedStorage, SqliteStorage, Storage};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Gateway client pointed at a mock server
pub fn gateway_for(server: &MockServer) -> GatewayClient {
    GatewayClient::with_client(reqwest::Client::new(), server.uri())
}

/// A file-backed database in a temporary directory
pub fn temp_storage() -> (TempDir, SharedStorage) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let storage = SqliteStorage::new(&dir.path().join("index.db")).expect("Failed to open DB");
    (dir, Arc::new(Mutex::new(storage)))
}

/// Registers an undername pointing at a transaction
pub fn add_process_record(storage: &SharedStorage, name: &str, transaction_id: &str) {
    let record = ProcessRecord {
        name: name.to_string(),
        process_id: format!("proc-{}", name),
        undername: "@".to_string(),
        transaction_id: transaction_id.to_string(),
        ttl_seconds: 3600,
        description: None,
        priority: None,
        owner: None,
        display_name: None,
        logo: None,
        keywords: Vec::new(),
        controllers: Vec::new(),
    };
    storage
        .lock()
        .unwrap()
        .upsert_process_records(&[record])
        .expect("Failed to insert process record");
}

/// Answers every GraphQL query with a transaction carrying these tags
pub async fn mount_tags(server: &MockServer, tags: &[(&str, &str)]) {
    let tags: Vec<_> = tags
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "transaction": { "tags": tags } } })),
        )
        .mount(server)
        .await;
}

/// Serves a GET path with a body and content type
pub async fn mount_get(server: &MockServer, route: &str, content_type: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body, content_type),
        )
        .mount(server)
        .await;
}
