//! Resolution against a mock tag index and gateway

use crate::{add_process_record, gateway_for, mount_get, mount_tags, temp_storage};
use arns_indexer::config::ResolutionConfig;
use arns_indexer::resolver::TargetResolver;
use arns_indexer::storage::{SharedStorage, Storage, UnresolvedTarget};
use arns_indexer::{CrawlStatus, IndexerError, ResolutionStatus, TargetCategory};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MANIFEST: &str = r#"{
    "manifest": "arweave/paths",
    "version": "0.2.0",
    "index": { "path": "index.html" },
    "paths": {
        "index.html": { "id": "page-1" },
        "about.html": { "id": "page-2" }
    }
}"#;

fn candidate(transaction_id: &str) -> UnresolvedTarget {
    UnresolvedTarget {
        transaction_id: transaction_id.to_string(),
        name: "docs".to_string(),
        undername: "@".to_string(),
    }
}

fn resolver(server: &MockServer, storage: &SharedStorage, crawl_enabled: bool) -> TargetResolver {
    TargetResolver::new(
        storage.clone(),
        gateway_for(server),
        ResolutionConfig::default(),
        crawl_enabled,
    )
}

#[tokio::test]
async fn test_manifest_resolves_with_validation() {
    let server = MockServer::start().await;
    mount_tags(
        &server,
        &[("Content-Type", "application/x.arweave-manifest json")],
    )
    .await;
    mount_get(&server, "/raw/manifest-tx", "application/json", MANIFEST).await;

    let (_dir, storage) = temp_storage();
    let resolver = resolver(&server, &storage, true);

    let outcome = resolver
        .process_target(&candidate("manifest-tx"), 3)
        .await
        .expect("Resolution failed");
    assert!(outcome.resolved);
    assert!(!outcome.should_retry);

    let target = storage
        .lock()
        .unwrap()
        .get_resolved_target("manifest-tx")
        .unwrap()
        .expect("Target not stored");
    assert_eq!(target.status, ResolutionStatus::Resolved);
    assert_eq!(target.category, Some(TargetCategory::Manifest));
    assert_eq!(
        target.content_type.as_deref(),
        Some("application/x.arweave-manifest+json")
    );
    assert_eq!(target.crawl_status, Some(CrawlStatus::Pending));
    assert_eq!(target.name.as_deref(), Some("docs"));
    assert!(target.resolved_at.is_some());

    let validation = target.manifest_validation.expect("Validation not stored");
    assert!(validation.is_valid);
    assert_eq!(validation.path_count, Some(2));
    assert_eq!(validation.has_index, Some(true));
    assert_eq!(validation.has_fallback, Some(false));
}

#[tokio::test]
async fn test_manifest_with_crawl_disabled_is_skipped() {
    let server = MockServer::start().await;
    mount_tags(
        &server,
        &[("Content-Type", "application/x.arweave-manifest+json")],
    )
    .await;
    mount_get(&server, "/raw/manifest-tx", "application/json", MANIFEST).await;

    let (_dir, storage) = temp_storage();
    resolver(&server, &storage, false)
        .process_target(&candidate("manifest-tx"), 3)
        .await
        .unwrap();

    let target = storage
        .lock()
        .unwrap()
        .get_resolved_target("manifest-tx")
        .unwrap()
        .unwrap();
    assert_eq!(target.crawl_status, Some(CrawlStatus::Skipped));
    assert!(target.manifest_validation.unwrap().is_valid);
}

#[tokio::test]
async fn test_unsupported_manifest_version() {
    let server = MockServer::start().await;
    mount_tags(
        &server,
        &[("Content-Type", "application/x.arweave-manifest json")],
    )
    .await;
    mount_get(
        &server,
        "/raw/old-tx",
        "application/json",
        r#"{ "manifest": "arweave/paths", "version": "0.1.0", "paths": {} }"#,
    )
    .await;

    let (_dir, storage) = temp_storage();
    resolver(&server, &storage, true)
        .process_target(&candidate("old-tx"), 3)
        .await
        .unwrap();

    let target = storage
        .lock()
        .unwrap()
        .get_resolved_target("old-tx")
        .unwrap()
        .unwrap();
    let validation = target.manifest_validation.unwrap();
    assert!(!validation.is_valid);
    assert_eq!(
        validation.error.as_deref(),
        Some("Unsupported manifest version: 0.1.0")
    );
    assert_eq!(target.crawl_status, Some(CrawlStatus::Skipped));
}

#[tokio::test]
async fn test_manifest_fetch_failure_recorded() {
    let server = MockServer::start().await;
    mount_tags(
        &server,
        &[("Content-Type", "application/x.arweave-manifest json")],
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/raw/gone-tx"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (_dir, storage) = temp_storage();
    let resolver = resolver(&server, &storage, true);

    let validation = resolver.validate_manifest("gone-tx").await;
    assert!(!validation.is_valid);
    assert_eq!(
        validation.error.as_deref(),
        Some("Failed to fetch manifest: HTTP 404")
    );
}

#[tokio::test]
async fn test_ao_process_is_not_crawled() {
    let server = MockServer::start().await;
    mount_tags(
        &server,
        &[
            ("Data-Protocol", "ao"),
            ("Type", "Process"),
            ("Content-Type", "text/plain"),
        ],
    )
    .await;

    let (_dir, storage) = temp_storage();
    resolver(&server, &storage, true)
        .process_target(&candidate("process-tx"), 3)
        .await
        .unwrap();

    let target = storage
        .lock()
        .unwrap()
        .get_resolved_target("process-tx")
        .unwrap()
        .unwrap();
    assert_eq!(target.category, Some(TargetCategory::AoProcess));
    assert!(target.manifest_validation.is_none());
    // text/plain is crawlable regardless of category
    assert_eq!(target.crawl_status, Some(CrawlStatus::Pending));
}

#[tokio::test]
async fn test_not_found_retries_until_cap() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "transaction": null } })),
        )
        .mount(&server)
        .await;

    let (_dir, storage) = temp_storage();
    add_process_record(&storage, "docs", "missing-tx");
    let resolver = resolver(&server, &storage, true);

    let candidates = resolver.find_unresolved_targets(2, 10).unwrap();
    assert_eq!(candidates.len(), 1);

    let first = resolver.process_target(&candidates[0], 2).await.unwrap();
    assert!(!first.resolved);
    assert!(first.should_retry);
    assert_eq!(first.retry_count, 1);
    {
        let storage = storage.lock().unwrap();
        let target = storage.get_resolved_target("missing-tx").unwrap().unwrap();
        assert_eq!(target.status, ResolutionStatus::Pending);
        assert_eq!(target.retry_count, 1);
    }

    // Still a candidate below the cap
    assert_eq!(resolver.find_unresolved_targets(2, 10).unwrap().len(), 1);

    let second = resolver.process_target(&candidates[0], 2).await.unwrap();
    assert!(!second.should_retry);
    assert_eq!(second.retry_count, 2);

    let target = storage
        .lock()
        .unwrap()
        .get_resolved_target("missing-tx")
        .unwrap()
        .unwrap();
    assert_eq!(target.status, ResolutionStatus::NotFound);
    assert!(target.category.is_none());
    assert!(resolver.find_unresolved_targets(2, 10).unwrap().is_empty());

    let stats = resolver.get_stats().unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.not_found, 1);
    assert_eq!(stats.resolved, 0);
}

#[tokio::test]
async fn test_lookup_error_persists_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let (_dir, storage) = temp_storage();
    let result = resolver(&server, &storage, true)
        .process_target(&candidate("flaky-tx"), 3)
        .await;

    assert!(matches!(result, Err(IndexerError::TagIndex { .. })));
    assert!(storage
        .lock()
        .unwrap()
        .get_resolved_target("flaky-tx")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_http_404_from_tag_index_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (_dir, storage) = temp_storage();
    let outcome = resolver(&server, &storage, true)
        .process_target(&candidate("unknown-tx"), 3)
        .await
        .unwrap();

    assert!(!outcome.resolved);
    assert!(outcome.should_retry);
}
