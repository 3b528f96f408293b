//! Crawl coordination for resolved targets
//!
//! This module contains the crawl driver, including:
//! - Dispatching each pending target to a manifest crawl or a single fetch
//! - Robots.txt and sitemap discovery for manifests
//! - Depth-first traversal of links that stay inside a manifest
//! - Batch processing with bounded concurrency and per-target failure isolation

use crate::config::{CrawlConfig, NameFilters};
use crate::crawler::parser::{
    is_crawlable_content_type, is_html_content_type, manifest_relative_path, normalize_link,
    ContentParser, ParseLimits, ParsedDocument,
};
use crate::crawler::sitemap::{extract_manifest_paths, parse_sitemap_xml};
use crate::gateway::{FetchResult, GatewayClient, PathManifest};
use crate::pipeline::{Job, JobOptions, JobQueue};
use crate::robots::{parse_robots_txt, RobotsTxtRules};
use crate::state::{CrawlStatus, TargetCategory};
use crate::storage::{lock_storage, CrawledDocument, ResolvedTarget, SharedStorage, Storage};
use crate::IndexerError;
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

const ROBOTS_PATH: &str = "robots.txt";
const SITEMAP_PATH: &str = "sitemap.xml";

/// Result of crawling one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    Crawled,
    Skipped,
    Failed,
}

/// Totals for one run of the crawl stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub batches: u32,
    pub crawled: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl CrawlSummary {
    fn record(&mut self, outcome: CrawlOutcome) {
        match outcome {
            CrawlOutcome::Crawled => self.crawled += 1,
            CrawlOutcome::Skipped => self.skipped += 1,
            CrawlOutcome::Failed => self.failed += 1,
        }
    }
}

/// State of one manifest traversal
struct ManifestCrawlContext {
    transaction_id: String,
    manifest: PathManifest,
    robots: Option<RobotsTxtRules>,
    base_url: String,
    visited: HashSet<String>,
}

impl ManifestCrawlContext {
    fn is_allowed(&self, manifest_path: &str) -> bool {
        match &self.robots {
            Some(rules) => rules.is_path_allowed(&format!("/{}", manifest_path)),
            None => true,
        }
    }
}

/// Crawls resolved targets into documents
pub struct ManifestCrawler {
    storage: SharedStorage,
    gateway: GatewayClient,
    parser: ContentParser,
    config: CrawlConfig,
    jobs: JobQueue,
    path_job_options: JobOptions,
}

impl ManifestCrawler {
    /// Creates a crawler
    ///
    /// # Arguments
    ///
    /// * `storage` - Shared database handle
    /// * `gateway` - Gateway client used for every fetch
    /// * `config` - Crawl limits and name filters
    /// * `jobs` - Queue that receives sitemap-discovered path jobs
    /// * `path_job_options` - Attempts and backoff for those jobs
    pub fn new(
        storage: SharedStorage,
        gateway: GatewayClient,
        config: CrawlConfig,
        jobs: JobQueue,
        path_job_options: JobOptions,
    ) -> Self {
        Self {
            storage,
            gateway,
            parser: ContentParser::new(ParseLimits::from(&config)),
            config,
            jobs,
            path_job_options,
        }
    }

    pub fn parser(&self) -> &ContentParser {
        &self.parser
    }

    /// Crawls every pending target, batch by batch
    ///
    /// Each batch is split into chunks of `concurrency` targets that are crawled
    /// together. A target that fails is marked failed and the batch goes on.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlSummary)` - Totals across all batches
    /// * `Err(IndexerError)` - Selecting a batch failed
    pub async fn process_crawl_targets(&self) -> Result<CrawlSummary, IndexerError> {
        let filters = NameFilters::new(&self.config.allow_list, &self.config.deny_list);
        let mut summary = CrawlSummary::default();

        if filters.denies_all() {
            info!("Crawl deny-list is *, skipping all targets");
            return Ok(summary);
        }

        info!("Starting batch content crawl");
        let chunk_size = self.config.concurrency.max(1) as usize;
        let mut cursor: Option<String> = None;

        loop {
            let batch = {
                let storage = lock_storage(&self.storage)?;
                storage.find_pending_crawl_targets(
                    self.config.batch_size,
                    filters,
                    cursor.as_deref(),
                )?
            };

            if batch.is_empty() {
                debug!(
                    "No more pending crawl targets after {} batches",
                    summary.batches
                );
                break;
            }

            summary.batches += 1;
            info!(
                "Batch {}: crawling {} targets",
                summary.batches,
                batch.len()
            );
            cursor = batch.last().map(|t| t.transaction_id.clone());

            for chunk in batch.chunks(chunk_size) {
                let outcomes = join_all(chunk.iter().map(|target| self.crawl_target(target))).await;
                for outcome in outcomes {
                    summary.record(outcome);
                }
            }

            info!(
                "Batch {} complete: crawled={}, skipped={}, failed={}",
                summary.batches, summary.crawled, summary.skipped, summary.failed
            );
        }

        info!(
            "Crawl complete after {} batches: crawled={}, skipped={}, failed={}",
            summary.batches, summary.crawled, summary.skipped, summary.failed
        );

        Ok(summary)
    }

    /// Crawls one target; errors are caught and recorded as a failed crawl
    pub async fn crawl_target(&self, target: &ResolvedTarget) -> CrawlOutcome {
        match self.dispatch(target).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to crawl target {}: {}", target.transaction_id, e);
                if let Err(e) =
                    self.set_crawl_status(&target.transaction_id, CrawlStatus::Failed, None)
                {
                    error!(
                        "Failed to mark {} as failed: {}",
                        target.transaction_id, e
                    );
                }
                CrawlOutcome::Failed
            }
        }
    }

    async fn dispatch(&self, target: &ResolvedTarget) -> Result<CrawlOutcome, IndexerError> {
        self.set_crawl_status(&target.transaction_id, CrawlStatus::Crawling, None)?;

        let indexed_manifest = target.category == Some(TargetCategory::Manifest)
            && target
                .manifest_validation
                .as_ref()
                .map(|v| v.is_crawlable())
                .unwrap_or(false);

        if indexed_manifest {
            self.crawl_manifest(target).await?;
            return Ok(CrawlOutcome::Crawled);
        }

        if is_crawlable_content_type(target.content_type.as_deref()) {
            self.crawl_simple_target(target).await?;
            return Ok(CrawlOutcome::Crawled);
        }

        self.set_crawl_status(&target.transaction_id, CrawlStatus::Skipped, None)?;
        Ok(CrawlOutcome::Skipped)
    }

    /// Fetches a non-manifest target and stores it as the root document
    pub async fn crawl_simple_target(&self, target: &ResolvedTarget) -> Result<(), IndexerError> {
        let transaction_id = &target.transaction_id;
        let raw_url = self.gateway.raw_url(transaction_id);
        let body = self.gateway.fetch(&raw_url).await.into_body(&raw_url)?;

        let url = self.gateway.content_url(transaction_id);
        let content_type = target.content_type.as_deref();
        let parsed = if is_html_content_type(content_type) {
            self.parser.parse_html(&body, &url)
        } else {
            self.parser.parse_text(&body)
        };

        self.save_document(&crawled_document(
            transaction_id,
            None,
            url,
            content_type,
            0,
            parsed,
        ))?;

        self.set_crawl_status(transaction_id, CrawlStatus::Crawled, Some(Utc::now()))?;
        debug!("Crawled simple target {}", transaction_id);
        Ok(())
    }

    /// Crawls a manifest: robots.txt, sitemap discovery, then the index page
    ///
    /// Sitemap paths are queued as separate jobs at depth 1. The index page is
    /// crawled here at depth 0 and its links followed depth-first.
    pub async fn crawl_manifest(&self, target: &ResolvedTarget) -> Result<(), IndexerError> {
        let transaction_id = target.transaction_id.as_str();
        let manifest = self.gateway.fetch_manifest(transaction_id).await?;

        let mut context = ManifestCrawlContext {
            transaction_id: transaction_id.to_string(),
            manifest,
            robots: None,
            base_url: self.gateway.content_url(transaction_id),
            visited: HashSet::new(),
        };

        let robots_txt = self.fetch_robots(&mut context).await;
        let sitemap_xml = self.discover_sitemap(&mut context).await?;

        {
            let mut storage = lock_storage(&self.storage)?;
            storage.update_crawl_artifacts(
                transaction_id,
                robots_txt.as_deref(),
                sitemap_xml.as_deref(),
            )?;
        }

        if let Some(index_path) = context.manifest.index_path().map(str::to_string) {
            context.visited.insert(index_path.clone());
            self.crawl_manifest_path(&mut context, index_path, 0).await;
        }

        self.set_crawl_status(transaction_id, CrawlStatus::Crawled, Some(Utc::now()))?;
        info!(
            "Crawled manifest {} ({} paths visited)",
            transaction_id,
            context.visited.len()
        );
        Ok(())
    }

    /// Fetches robots.txt when the manifest has one, keeping its rules on the
    /// context and storing it as a document
    async fn fetch_robots(&self, context: &mut ManifestCrawlContext) -> Option<String> {
        if !context.manifest.contains_path(ROBOTS_PATH) {
            return None;
        }

        let robots_url = self.gateway.path_url(&context.transaction_id, ROBOTS_PATH);
        let body = match self.gateway.fetch(&robots_url).await {
            FetchResult::Success { body, .. } => body,
            failure => {
                warn!(
                    "Failed to fetch robots.txt for {}: {}",
                    context.transaction_id,
                    describe_failure(&failure)
                );
                return None;
            }
        };

        context.robots = Some(parse_robots_txt(&body));

        let document = crawled_document(
            &context.transaction_id,
            Some(ROBOTS_PATH),
            robots_url,
            Some("text/plain"),
            0,
            self.parser.parse_text(&body),
        );
        if let Err(e) = self.save_document(&document) {
            warn!(
                "Failed to store robots.txt for {}: {}",
                context.transaction_id, e
            );
        }

        Some(body)
    }

    /// Finds the first sitemap present in the manifest, stores it and queues
    /// its manifest paths
    async fn discover_sitemap(
        &self,
        context: &mut ManifestCrawlContext,
    ) -> Result<Option<String>, IndexerError> {
        let mut candidates = vec![SITEMAP_PATH.to_string()];
        if let Some(rules) = &context.robots {
            for sitemap_url in &rules.sitemap_urls {
                let path = normalize_link(sitemap_url, &context.base_url)
                    .and_then(|link| manifest_relative_path(&link, &context.transaction_id));
                if let Some(path) = path {
                    if !candidates.contains(&path) {
                        candidates.push(path);
                    }
                }
            }
        }

        for sitemap_path in candidates {
            if !context.manifest.contains_path(&sitemap_path) {
                continue;
            }

            let sitemap_url = self.gateway.path_url(&context.transaction_id, &sitemap_path);
            let body = match self.gateway.fetch(&sitemap_url).await {
                FetchResult::Success { body, .. } => body,
                failure => {
                    warn!(
                        "Failed to fetch {} for {}: {}",
                        sitemap_path,
                        context.transaction_id,
                        describe_failure(&failure)
                    );
                    continue;
                }
            };

            let document = crawled_document(
                &context.transaction_id,
                Some(&sitemap_path),
                sitemap_url,
                Some("application/xml"),
                0,
                self.parser.parse_text(&body),
            );
            if let Err(e) = self.save_document(&document) {
                warn!(
                    "Failed to store {} for {}: {}",
                    sitemap_path, context.transaction_id, e
                );
            }

            let validation = parse_sitemap_xml(&body);
            if validation.is_valid {
                let mut queued = 0;
                for path in extract_manifest_paths(&validation.entries, &context.base_url) {
                    let Some(path) = manifest_relative_path(&path, &context.transaction_id)
                    else {
                        continue;
                    };
                    if context.manifest.contains_path(&path) && context.visited.insert(path.clone())
                    {
                        self.queue_manifest_path(&context.transaction_id, path, 1)?;
                        queued += 1;
                    }
                }
                debug!(
                    "Queued {} sitemap paths for {}",
                    queued, context.transaction_id
                );
            } else {
                debug!(
                    "Invalid sitemap {} for {}: {}",
                    sitemap_path,
                    context.transaction_id,
                    validation.error.as_deref().unwrap_or("unknown error")
                );
            }

            return Ok(Some(body));
        }

        Ok(None)
    }

    /// Crawls one manifest path and, for HTML, the manifest paths it links to
    ///
    /// Returns without storing anything when the path is too deep, blocked by
    /// robots.txt, missing from the manifest, fails to fetch, or is not a
    /// crawlable content type. Linked paths are marked visited before recursing.
    fn crawl_manifest_path<'a>(
        &'a self,
        context: &'a mut ManifestCrawlContext,
        manifest_path: String,
        depth: u32,
    ) -> BoxFuture<'a, ()> {
        async move {
            let max_depth = self.config.max_depth;
            let transaction_id = context.transaction_id.clone();

            if depth > max_depth {
                debug!(
                    "Skipping {} for {}: max depth reached",
                    manifest_path, transaction_id
                );
                return;
            }

            if !context.is_allowed(&manifest_path) {
                debug!(
                    "Skipping {} for {}: blocked by robots.txt",
                    manifest_path, transaction_id
                );
                return;
            }

            if !context.manifest.contains_path(&manifest_path) {
                debug!(
                    "Skipping {} for {}: not in manifest",
                    manifest_path, transaction_id
                );
                return;
            }

            let url = format!("{}/{}", context.base_url, manifest_path);
            let (content_type, body) = match self.gateway.fetch(&url).await {
                FetchResult::Success {
                    content_type, body, ..
                } => (content_type, body),
                failure => {
                    warn!(
                        "Failed to fetch {} for {}: {}",
                        manifest_path,
                        transaction_id,
                        describe_failure(&failure)
                    );
                    return;
                }
            };

            if !is_crawlable_content_type(content_type.as_deref()) {
                debug!(
                    "Skipping {} for {}: content type {:?} not crawlable",
                    manifest_path, transaction_id, content_type
                );
                return;
            }

            let parsed = if is_html_content_type(content_type.as_deref()) {
                let parsed = self.parser.parse_html(&body, &url);

                if depth < max_depth {
                    for link in &parsed.links {
                        let Some(next) = manifest_relative_path(link, &transaction_id) else {
                            continue;
                        };
                        if context.manifest.contains_path(&next)
                            && context.visited.insert(next.clone())
                        {
                            self.crawl_manifest_path(context, next, depth + 1).await;
                        }
                    }
                }

                parsed
            } else {
                self.parser.parse_text(&body)
            };

            let document = crawled_document(
                &transaction_id,
                Some(&manifest_path),
                url,
                content_type.as_deref(),
                depth,
                parsed,
            );
            if let Err(e) = self.save_document(&document) {
                error!(
                    "Error storing {} for {}: {}",
                    manifest_path, transaction_id, e
                );
            }
        }
        .boxed()
    }

    /// Resumes a manifest path queued by sitemap discovery
    ///
    /// The visited set starts with only this path, so paths already crawled by
    /// the index traversal may be crawled again.
    pub async fn process_crawl_manifest_path(
        &self,
        transaction_id: &str,
        manifest_path: &str,
        depth: u32,
    ) -> Result<(), IndexerError> {
        let target = {
            let storage = lock_storage(&self.storage)?;
            storage.get_resolved_target(transaction_id)?
        };

        let Some(target) = target else {
            warn!(
                "Target {} not found for manifest path crawl",
                transaction_id
            );
            return Ok(());
        };

        let manifest = self.gateway.fetch_manifest(transaction_id).await?;

        let mut context = ManifestCrawlContext {
            transaction_id: transaction_id.to_string(),
            manifest,
            robots: target.robots_txt.as_deref().map(parse_robots_txt),
            base_url: self.gateway.content_url(transaction_id),
            visited: HashSet::from([manifest_path.to_string()]),
        };

        self.crawl_manifest_path(&mut context, manifest_path.to_string(), depth)
            .await;
        Ok(())
    }

    fn queue_manifest_path(
        &self,
        transaction_id: &str,
        manifest_path: String,
        depth: u32,
    ) -> Result<(), IndexerError> {
        self.jobs.submit(
            Job::CrawlManifestPath {
                transaction_id: transaction_id.to_string(),
                manifest_path,
                depth,
            },
            self.path_job_options,
        )
    }

    fn save_document(&self, document: &CrawledDocument) -> Result<(), IndexerError> {
        let mut storage = lock_storage(&self.storage)?;
        storage.upsert_crawled_document(document)?;
        Ok(())
    }

    fn set_crawl_status(
        &self,
        transaction_id: &str,
        status: CrawlStatus,
        crawled_at: Option<DateTime<Utc>>,
    ) -> Result<(), IndexerError> {
        let mut storage = lock_storage(&self.storage)?;
        storage.update_crawl_status(transaction_id, status, crawled_at)?;
        Ok(())
    }
}

fn describe_failure(result: &FetchResult) -> String {
    match result {
        FetchResult::Success { status_code, .. } => format!("HTTP {}", status_code),
        FetchResult::HttpError { status_code } => format!("HTTP {}", status_code),
        FetchResult::NetworkError { error } => error.clone(),
    }
}

fn crawled_document(
    transaction_id: &str,
    manifest_path: Option<&str>,
    url: String,
    content_type: Option<&str>,
    depth: u32,
    parsed: ParsedDocument,
) -> CrawledDocument {
    CrawledDocument {
        transaction_id: transaction_id.to_string(),
        manifest_path: manifest_path.map(str::to_string),
        url,
        title: parsed.title,
        body: parsed.body,
        body_truncated: parsed.body_truncated,
        meta_description: parsed.meta_description,
        meta_keywords: parsed.meta_keywords,
        headings: parsed.headings,
        links: parsed.links,
        content_hash: parsed.content_hash,
        content_type: content_type.map(str::to_string),
        depth,
        content_length: parsed.content_length,
        last_crawled_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NameFilter;
    use crate::pipeline::job_queue;
    use crate::storage::SqliteStorage;
    use std::sync::{Arc, Mutex};

    fn crawler(config: CrawlConfig) -> (ManifestCrawler, SharedStorage) {
        let storage: SharedStorage = Arc::new(Mutex::new(SqliteStorage::open_in_memory().unwrap()));
        let gateway = GatewayClient::with_client(reqwest::Client::new(), "http://127.0.0.1:9");
        let (jobs, _receiver) = job_queue();
        (
            ManifestCrawler::new(
                Arc::clone(&storage),
                gateway,
                config,
                jobs,
                JobOptions::once(),
            ),
            storage,
        )
    }

    #[tokio::test]
    async fn test_deny_all_crawls_nothing() {
        let config = CrawlConfig {
            enabled: true,
            deny_list: NameFilter::All,
            ..CrawlConfig::default()
        };
        let (crawler, _storage) = crawler(config);
        let summary = crawler.process_crawl_targets().await.unwrap();
        assert_eq!(summary, CrawlSummary::default());
    }

    #[tokio::test]
    async fn test_non_crawlable_target_is_skipped() {
        let (crawler, storage) = crawler(CrawlConfig::default());

        let mut target = ResolvedTarget::new_pending("tx-img", None, None);
        target.content_type = Some("image/png".to_string());
        target.category = Some(TargetCategory::Transaction);
        target.crawl_status = Some(CrawlStatus::Pending);
        storage.lock().unwrap().upsert_resolved_target(&target).unwrap();

        assert_eq!(crawler.crawl_target(&target).await, CrawlOutcome::Skipped);
        let stored = storage
            .lock()
            .unwrap()
            .get_resolved_target("tx-img")
            .unwrap()
            .unwrap();
        assert_eq!(stored.crawl_status, Some(CrawlStatus::Skipped));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_marks_failed() {
        let (crawler, storage) = crawler(CrawlConfig::default());

        let mut target = ResolvedTarget::new_pending("tx-html", None, None);
        target.content_type = Some("text/html".to_string());
        target.crawl_status = Some(CrawlStatus::Pending);
        storage.lock().unwrap().upsert_resolved_target(&target).unwrap();

        assert_eq!(crawler.crawl_target(&target).await, CrawlOutcome::Failed);
        let stored = storage
            .lock()
            .unwrap()
            .get_resolved_target("tx-html")
            .unwrap()
            .unwrap();
        assert_eq!(stored.crawl_status, Some(CrawlStatus::Failed));
    }

    #[test]
    fn test_crawled_document_from_parsed() {
        let parser = ContentParser::default();
        let parsed = parser.parse_text("hello");
        let document = crawled_document(
            "tx",
            Some("a.txt"),
            "https://arweave.net/tx/a.txt".to_string(),
            Some("text/plain"),
            2,
            parsed.clone(),
        );
        assert_eq!(document.manifest_path.as_deref(), Some("a.txt"));
        assert_eq!(document.depth, 2);
        assert_eq!(document.content_hash, parsed.content_hash);
        assert_eq!(document.content_length, 5);
    }
}
