//! Integration tests for the crawler
//!
//! These tests serve manifests and their documents from a mock gateway and
//! check what ends up in the database.

use crate::{add_process_record, gateway_for, mount_get, temp_storage};
use arns_indexer::config::{CrawlConfig, NameFilter};
use arns_indexer::crawler::{CrawlOutcome, ManifestCrawler};
use arns_indexer::gateway::{ManifestValidation, MANIFEST_CONTENT_TYPE};
use arns_indexer::pipeline::{job_queue, Job, JobOptions, JobReceiver};
use arns_indexer::storage::{ResolvedTarget, SharedStorage, Storage};
use arns_indexer::{CrawlStatus, ResolutionStatus, TargetCategory};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TX: &str = "manifest-tx";

fn crawler(
    server: &MockServer,
    storage: &SharedStorage,
    config: CrawlConfig,
) -> (ManifestCrawler, JobReceiver) {
    let (jobs, receiver) = job_queue();
    let crawler = ManifestCrawler::new(
        storage.clone(),
        gateway_for(server),
        config,
        jobs,
        JobOptions::once(),
    );
    (crawler, receiver)
}

fn crawl_config() -> CrawlConfig {
    CrawlConfig {
        enabled: true,
        ..CrawlConfig::default()
    }
}

fn store_target(storage: &SharedStorage, target: &ResolvedTarget) {
    storage
        .lock()
        .unwrap()
        .upsert_resolved_target(target)
        .expect("Failed to store target");
}

fn manifest_target() -> ResolvedTarget {
    let mut target = ResolvedTarget::new_pending(TX, Some("docs".into()), Some("@".into()));
    target.status = ResolutionStatus::Resolved;
    target.category = Some(TargetCategory::Manifest);
    target.content_type = Some(MANIFEST_CONTENT_TYPE.to_string());
    target.manifest_validation = Some(ManifestValidation {
        is_valid: true,
        error: None,
        path_count: Some(7),
        has_index: Some(true),
        has_fallback: Some(false),
    });
    target.crawl_status = Some(CrawlStatus::Pending);
    target
}

fn text_target(transaction_id: &str, name: &str) -> ResolvedTarget {
    let mut target = ResolvedTarget::new_pending(transaction_id, Some(name.into()), None);
    target.status = ResolutionStatus::Resolved;
    target.category = Some(TargetCategory::Transaction);
    target.content_type = Some("text/plain".to_string());
    target.crawl_status = Some(CrawlStatus::Pending);
    target
}

/// Mounts a manifest site with robots.txt, a sitemap and linked pages
async fn mount_manifest_site(server: &MockServer) {
    let base = server.uri();

    mount_get(
        server,
        &format!("/raw/{}", TX),
        "application/json",
        r#"{
            "manifest": "arweave/paths",
            "version": "0.2.0",
            "index": { "path": "index.html" },
            "paths": {
                "index.html": { "id": "p1" },
                "about.html": { "id": "p2" },
                "docs.html": { "id": "p3" },
                "secret/hidden.html": { "id": "p4" },
                "image.png": { "id": "p5" },
                "robots.txt": { "id": "p6" },
                "sitemap.xml": { "id": "p7" }
            }
        }"#,
    )
    .await;

    mount_get(
        server,
        &format!("/{}/robots.txt", TX),
        "text/plain",
        &format!(
            "User-agent: *\nDisallow: /secret/\nSitemap: {}/{}/sitemap.xml\n",
            base, TX
        ),
    )
    .await;

    mount_get(
        server,
        &format!("/{}/sitemap.xml", TX),
        "application/xml",
        &format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>{}/{}/docs.html</loc><priority>0.8</priority></url>
              <url><loc>{}/{}/not-in-manifest.html</loc></url>
            </urlset>"#,
            base, TX, base, TX
        ),
    )
    .await;

    mount_get(
        server,
        &format!("/{}/index.html", TX),
        "text/html; charset=utf-8",
        &format!(
            r#"<html><head><title>Home</title>
            <meta name="description" content="Project home"></head>
            <body><h1>Welcome</h1>
            <a href="about.html">About</a>
            <a href="/{}/secret/hidden.html">Hidden</a>
            <a href="image.png">Logo</a>
            <a href="https://elsewhere.example/page">Elsewhere</a>
            </body></html>"#,
            TX
        ),
    )
    .await;

    mount_get(
        server,
        &format!("/{}/about.html", TX),
        "text/html",
        r#"<html><head><title>About</title></head><body><p>About us</p></body></html>"#,
    )
    .await;

    mount_get(
        server,
        &format!("/{}/docs.html", TX),
        "text/html",
        r#"<html><head><title>Docs</title></head><body><h2>Guide</h2></body></html>"#,
    )
    .await;

    mount_get(server, &format!("/{}/image.png", TX), "image/png", "PNG").await;

    Mock::given(method("GET"))
        .and(path(format!("/{}/secret/hidden.html", TX)))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_manifest_crawl_follows_links_and_robots() {
    let server = MockServer::start().await;
    mount_manifest_site(&server).await;

    let (_dir, storage) = temp_storage();
    let target = manifest_target();
    store_target(&storage, &target);

    let (crawler, mut receiver) = crawler(&server, &storage, crawl_config());
    assert_eq!(crawler.crawl_target(&target).await, CrawlOutcome::Crawled);

    let storage_guard = storage.lock().unwrap();
    let mut paths: Vec<String> = storage_guard
        .list_crawled_documents(TX)
        .unwrap()
        .into_iter()
        .filter_map(|d| d.manifest_path)
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["about.html", "index.html", "robots.txt", "sitemap.xml"]);

    let index = storage_guard
        .get_crawled_document(TX, Some("index.html"))
        .unwrap()
        .unwrap();
    assert_eq!(index.depth, 0);
    assert_eq!(index.title.as_deref(), Some("Home"));
    assert_eq!(index.meta_description.as_deref(), Some("Project home"));
    assert_eq!(index.url, format!("{}/{}/index.html", server.uri(), TX));

    let about = storage_guard
        .get_crawled_document(TX, Some("about.html"))
        .unwrap()
        .unwrap();
    assert_eq!(about.depth, 1);

    let robots = storage_guard
        .get_crawled_document(TX, Some("robots.txt"))
        .unwrap()
        .unwrap();
    assert_eq!(robots.content_type.as_deref(), Some("text/plain"));

    let stored = storage_guard.get_resolved_target(TX).unwrap().unwrap();
    assert_eq!(stored.crawl_status, Some(CrawlStatus::Crawled));
    assert!(stored.crawled_at.is_some());
    assert!(stored.robots_txt.unwrap().contains("Disallow: /secret/"));
    assert!(stored.sitemap_xml.unwrap().contains("docs.html"));
    drop(storage_guard);

    // Only sitemap paths present in the manifest are queued
    let jobs = receiver.drain();
    assert_eq!(jobs.len(), 1);
    assert_eq!(
        jobs[0].job,
        Job::CrawlManifestPath {
            transaction_id: TX.to_string(),
            manifest_path: "docs.html".to_string(),
            depth: 1,
        }
    );
}

#[tokio::test]
async fn test_queued_manifest_path_is_crawled() {
    let server = MockServer::start().await;
    mount_manifest_site(&server).await;

    let (_dir, storage) = temp_storage();
    let mut target = manifest_target();
    target.robots_txt = Some("User-agent: *\nDisallow: /secret/\n".to_string());
    store_target(&storage, &target);

    let (crawler, _receiver) = crawler(&server, &storage, crawl_config());
    crawler
        .process_crawl_manifest_path(TX, "docs.html", 1)
        .await
        .expect("Path crawl failed");
    crawler
        .process_crawl_manifest_path(TX, "secret/hidden.html", 1)
        .await
        .expect("Path crawl failed");

    let storage = storage.lock().unwrap();
    let docs = storage
        .get_crawled_document(TX, Some("docs.html"))
        .unwrap()
        .unwrap();
    assert_eq!(docs.depth, 1);
    assert_eq!(docs.title.as_deref(), Some("Docs"));
    assert_eq!(docs.headings, vec!["Guide".to_string()]);
    assert!(storage
        .get_crawled_document(TX, Some("secret/hidden.html"))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_max_depth_zero_stops_at_index() {
    let server = MockServer::start().await;
    mount_manifest_site(&server).await;

    let (_dir, storage) = temp_storage();
    let target = manifest_target();
    store_target(&storage, &target);

    let config = CrawlConfig {
        max_depth: 0,
        ..crawl_config()
    };
    let (crawler, _receiver) = crawler(&server, &storage, config);
    assert_eq!(crawler.crawl_target(&target).await, CrawlOutcome::Crawled);

    let storage = storage.lock().unwrap();
    assert!(storage
        .get_crawled_document(TX, Some("index.html"))
        .unwrap()
        .is_some());
    assert!(storage
        .get_crawled_document(TX, Some("about.html"))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_batch_crawl_isolates_failures() {
    let server = MockServer::start().await;
    mount_get(&server, "/raw/note-tx", "text/plain", "  Plain notes  \n").await;
    Mock::given(method("GET"))
        .and(path("/raw/broken-tx"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_dir, storage) = temp_storage();
    for (tx, name) in [("note-tx", "notes"), ("broken-tx", "broken")] {
        add_process_record(&storage, name, tx);
        store_target(&storage, &text_target(tx, name));
    }

    let (crawler, _receiver) = crawler(&server, &storage, crawl_config());
    let summary = crawler.process_crawl_targets().await.unwrap();
    assert_eq!(summary.crawled, 1);
    assert_eq!(summary.failed, 1);

    let storage = storage.lock().unwrap();
    let note = storage.get_crawled_document("note-tx", None).unwrap().unwrap();
    assert_eq!(note.body.as_deref(), Some("Plain notes"));
    assert_eq!(note.url, format!("{}/note-tx", server.uri()));
    assert_eq!(note.depth, 0);

    assert_eq!(
        storage
            .get_resolved_target("broken-tx")
            .unwrap()
            .unwrap()
            .crawl_status,
        Some(CrawlStatus::Failed)
    );
}

#[tokio::test]
async fn test_deny_list_excludes_names() {
    let server = MockServer::start().await;
    mount_get(&server, "/raw/note-tx", "text/plain", "notes").await;
    Mock::given(method("GET"))
        .and(path("/raw/private-tx"))
        .respond_with(ResponseTemplate::new(200).set_body_string("private"))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, storage) = temp_storage();
    for (tx, name) in [("note-tx", "notes"), ("private-tx", "private")] {
        add_process_record(&storage, name, tx);
        store_target(&storage, &text_target(tx, name));
    }

    let config = CrawlConfig {
        deny_list: NameFilter::parse("private"),
        ..crawl_config()
    };
    let (crawler, _receiver) = crawler(&server, &storage, config);
    let summary = crawler.process_crawl_targets().await.unwrap();
    assert_eq!(summary.crawled, 1);

    let storage = storage.lock().unwrap();
    assert_eq!(
        storage
            .get_resolved_target("private-tx")
            .unwrap()
            .unwrap()
            .crawl_status,
        Some(CrawlStatus::Pending)
    );
}

#[tokio::test]
async fn test_pages_linking_each_other_are_fetched_once() {
    let server = MockServer::start().await;
    let tx = "loop-tx";

    mount_get(
        &server,
        &format!("/raw/{}", tx),
        "application/json",
        r#"{
            "manifest": "arweave/paths",
            "version": "0.2.0",
            "index": { "path": "index.html" },
            "paths": {
                "index.html": { "id": "l1" },
                "a.html": { "id": "l2" },
                "b.html": { "id": "l3" }
            }
        }"#,
    )
    .await;

    let pages = [
        ("index.html", r#"<a href="a.html">A</a><a href="b.html">B</a>"#.to_string()),
        (
            "a.html",
            format!(r#"<a href="b.html">B</a><a href="/{}/index.html">Home</a>"#, tx),
        ),
        ("b.html", r#"<a href="a.html">A</a><a href="./index.html">Home</a>"#.to_string()),
    ];
    for (page, links) in pages {
        Mock::given(method("GET"))
            .and(path(format!("/{}/{}", tx, page)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(format!("<html><body>{}</body></html>", links), "text/html"),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let (_dir, storage) = temp_storage();
    let mut target = manifest_target();
    target.transaction_id = tx.to_string();
    store_target(&storage, &target);

    let (crawler, _receiver) = crawler(&server, &storage, crawl_config());
    assert_eq!(crawler.crawl_target(&target).await, CrawlOutcome::Crawled);

    let documents = storage.lock().unwrap().list_crawled_documents(tx).unwrap();
    let mut paths: Vec<String> = documents
        .into_iter()
        .filter_map(|d| d.manifest_path)
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["a.html", "b.html", "index.html"]);
}
