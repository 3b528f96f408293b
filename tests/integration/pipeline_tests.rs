//! Full pipeline cycles against a mock gateway

use crate::{mount_get, mount_tags};
use arns_indexer::config::parse_config;
use arns_indexer::output::load_statistics;
use arns_indexer::pipeline::{PipelineOrchestrator, Stage, StageOutcome};
use arns_indexer::storage::{SqliteStorage, Storage};
use arns_indexer::{CrawlStatus, ResolutionStatus, TargetCategory};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_snapshot(dir: &TempDir, snapshot: serde_json::Value) -> String {
    let snapshot_path = dir.path().join("snapshot.json");
    std::fs::write(&snapshot_path, snapshot.to_string()).expect("Failed to write snapshot");
    snapshot_path.display().to_string()
}

fn write_config(server: &MockServer, dir: &TempDir, snapshot_path: &str) -> String {
    let host = server
        .uri()
        .trim_start_matches("http://")
        .to_string();
    let database_path = dir.path().join("index.db");

    format!(
        r#"
[gateway]
host = "{host}"
scheme = "http"

[user-agent]
crawler-name = "TestIndexer"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "ops@example.com"

[output]
database-path = "{db}"

[discovery]
snapshot-path = "{snapshot}"

[resolution]
enabled = true
max-retries = 2

[crawl]
enabled = true
"#,
        host = host,
        db = database_path.display(),
        snapshot = snapshot_path,
    )
}

#[tokio::test]
async fn test_single_cycle_resolves_and_crawls() {
    let server = MockServer::start().await;
    mount_tags(&server, &[("Content-Type", "text/plain")]).await;
    mount_get(&server, "/raw/note-tx", "text/plain", "Release notes for v2").await;

    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(
        &dir,
        json!({
            "names": [
                { "name": "notes", "processId": "proc-notes", "type": "permabuy" },
                { "name": "old", "processId": "proc-old", "type": "lease", "endTimestamp": 1000 }
            ],
            "undernames": [
                { "name": "notes", "processId": "proc-notes", "undername": "@",
                  "transactionId": "note-tx", "ttlSeconds": 3600 },
                { "name": "old", "processId": "proc-old", "undername": "@",
                  "transactionId": "old-tx", "ttlSeconds": 3600 }
            ]
        }),
    );
    let config = parse_config(&write_config(&server, &dir, &snapshot)).expect("Invalid config");
    let database_path = config.output.database_path.clone();

    let (orchestrator, receiver) = PipelineOrchestrator::from_config(config).unwrap();
    let report = orchestrator.run_once(receiver).await;

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(
        report.outcome(Stage::CrawlTargets),
        Some(&StageOutcome::Completed)
    );

    let storage = SqliteStorage::new(Path::new(&database_path)).unwrap();

    // The expired lease was archived before resolution ran
    assert_eq!(storage.count_name_records().unwrap(), 1);
    assert!(storage.get_resolved_target("old-tx").unwrap().is_none());

    let target = storage.get_resolved_target("note-tx").unwrap().unwrap();
    assert_eq!(target.status, ResolutionStatus::Resolved);
    assert_eq!(target.category, Some(TargetCategory::Transaction));
    assert_eq!(target.crawl_status, Some(CrawlStatus::Crawled));

    let document = storage.get_crawled_document("note-tx", None).unwrap().unwrap();
    assert_eq!(document.body.as_deref(), Some("Release notes for v2"));

    let stats = load_statistics(&storage).unwrap();
    assert_eq!(stats.total_targets, 1);
    assert_eq!(stats.crawled_documents, 1);
}

#[tokio::test]
async fn test_not_found_target_stays_pending_for_next_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "transaction": null } })),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(
        &dir,
        json!({
            "names": [{ "name": "soon", "processId": "proc-soon", "type": "permabuy" }],
            "undernames": [{ "name": "soon", "processId": "proc-soon", "undername": "@",
                             "transactionId": "pending-tx" }]
        }),
    );
    let config = parse_config(&write_config(&server, &dir, &snapshot)).unwrap();
    let database_path = config.output.database_path.clone();

    let (orchestrator, receiver) = PipelineOrchestrator::from_config(config).unwrap();
    let report = orchestrator.run_once(receiver).await;
    assert!(report.is_success());

    let storage = SqliteStorage::new(Path::new(&database_path)).unwrap();
    let target = storage.get_resolved_target("pending-tx").unwrap().unwrap();
    // Attempted once in the stage; the delayed retry job is left for later
    assert_eq!(target.status, ResolutionStatus::Pending);
    assert_eq!(target.retry_count, 1);
}
