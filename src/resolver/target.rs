//! Target resolution: classify a transaction and decide whether to crawl it

use crate::config::{NameFilters, ResolutionConfig};
use crate::crawler::is_crawlable_content_type;
use crate::gateway::{
    FetchResult, GatewayClient, ManifestValidation, TagLookup, TransactionTags,
    MANIFEST_CONTENT_TYPE,
};
use crate::state::{CrawlStatus, ResolutionStatus, TargetCategory};
use crate::storage::{lock_storage, ResolvedTarget, SharedStorage, Storage, UnresolvedTarget};
use crate::IndexerError;
use chrono::Utc;
use std::collections::HashMap;
use tracing::{error, info, warn};

const DATA_PROTOCOL_TAG: &str = "Data-Protocol";
const TYPE_TAG: &str = "Type";

/// Result of one resolution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub resolved: bool,
    /// Not found, but still under the retry cap
    pub should_retry: bool,
    pub retry_count: u32,
}

/// Counts of resolved targets by status and category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    pub total: u64,
    pub resolved: u64,
    pub pending: u64,
    pub not_found: u64,
    pub by_category: HashMap<TargetCategory, u64>,
}

/// Classifies transactions and owns the resolution state machine
pub struct TargetResolver {
    storage: SharedStorage,
    gateway: GatewayClient,
    config: ResolutionConfig,
    crawl_enabled: bool,
}

impl TargetResolver {
    /// Creates a resolver
    ///
    /// # Arguments
    ///
    /// * `storage` - Shared database handle
    /// * `gateway` - Gateway client for tag lookups and manifest fetches
    /// * `config` - Retry cap, batching and name filters
    /// * `crawl_enabled` - Whether resolved targets may be queued for crawling
    pub fn new(
        storage: SharedStorage,
        gateway: GatewayClient,
        config: ResolutionConfig,
        crawl_enabled: bool,
    ) -> Self {
        Self {
            storage,
            gateway,
            config,
            crawl_enabled,
        }
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Finds transaction ids that still need resolution
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Pending targets at or above this retry count are left out
    /// * `limit` - Maximum number of candidates
    ///
    /// # Returns
    ///
    /// Never-resolved ids and pending ids under the retry cap, each with a name
    /// that points at it. Empty when the deny-list is `*`.
    pub fn find_unresolved_targets(
        &self,
        max_retries: u32,
        limit: u32,
    ) -> Result<Vec<UnresolvedTarget>, IndexerError> {
        self.find_unresolved_targets_after(max_retries, limit, None)
    }

    /// Same as [`find_unresolved_targets`](Self::find_unresolved_targets),
    /// starting after the given transaction id
    pub fn find_unresolved_targets_after(
        &self,
        max_retries: u32,
        limit: u32,
        after: Option<&str>,
    ) -> Result<Vec<UnresolvedTarget>, IndexerError> {
        let filters = NameFilters::new(&self.config.allow_list, &self.config.deny_list);
        if filters.denies_all() {
            return Ok(Vec::new());
        }

        let storage = lock_storage(&self.storage)?;
        Ok(storage.find_unresolved_targets(max_retries, limit, filters, after)?)
    }

    pub async fn resolve_transaction_tags(&self, transaction_id: &str) -> TagLookup {
        self.gateway.query_transaction_tags(transaction_id).await
    }

    /// Fetches a manifest's raw bytes and checks its marker and version
    ///
    /// Failures are reported in the returned validation, never as errors.
    pub async fn validate_manifest(&self, transaction_id: &str) -> ManifestValidation {
        let url = self.gateway.raw_url(transaction_id);

        match self.gateway.fetch(&url).await {
            FetchResult::Success { body, .. } => ManifestValidation::from_body(&body),
            FetchResult::HttpError { status_code } => ManifestValidation::invalid(format!(
                "Failed to fetch manifest: HTTP {}",
                status_code
            )),
            FetchResult::NetworkError { error } => {
                ManifestValidation::invalid(format!("Failed to fetch manifest: {}", error))
            }
        }
    }

    /// Runs one resolution attempt for a candidate
    ///
    /// # Returns
    ///
    /// * `Ok(ProcessOutcome)` - The target was resolved, or not found and its
    ///   retry count advanced
    /// * `Err(IndexerError::TagIndex)` - The tag lookup failed; nothing was written
    pub async fn process_target(
        &self,
        candidate: &UnresolvedTarget,
        max_retries: u32,
    ) -> Result<ProcessOutcome, IndexerError> {
        let transaction_id = candidate.transaction_id.as_str();

        let existing = {
            let storage = lock_storage(&self.storage)?;
            storage.get_resolved_target(transaction_id)?
        };
        let mut target = existing
            .unwrap_or_else(|| ResolvedTarget::new_pending(transaction_id, None, None));

        if target.name.is_none() && !candidate.name.is_empty() {
            target.name = Some(candidate.name.clone());
        }
        if target.undername.is_none() && !candidate.undername.is_empty() {
            target.undername = Some(candidate.undername.clone());
        }

        match self.resolve_transaction_tags(transaction_id).await {
            TagLookup::Resolved { tags, content_type } => {
                let category = categorize_target(content_type.as_deref(), &tags);

                target.status = ResolutionStatus::Resolved;
                target.content_type = content_type;
                target.category = Some(category);
                target.resolved_at = Some(Utc::now());

                if category == TargetCategory::Manifest {
                    target.manifest_validation = Some(self.validate_manifest(transaction_id).await);
                }

                let crawl_status = determine_crawl_status(
                    self.crawl_enabled,
                    target.category,
                    target.manifest_validation.as_ref(),
                    target.content_type.as_deref(),
                );
                target.crawl_status = Some(crawl_status);

                self.save(&target)?;
                info!(
                    "Resolved target {}: {} ({}), crawl_status={}",
                    transaction_id,
                    category,
                    target.content_type.as_deref().unwrap_or("none"),
                    crawl_status
                );

                Ok(ProcessOutcome {
                    resolved: true,
                    should_retry: false,
                    retry_count: target.retry_count,
                })
            }
            TagLookup::NotFound => {
                target.retry_count += 1;
                if target.retry_count >= max_retries {
                    target.status = ResolutionStatus::NotFound;
                    warn!(
                        "Target {} marked as not found after {} attempts",
                        transaction_id, target.retry_count
                    );
                } else {
                    target.status = ResolutionStatus::Pending;
                    info!(
                        "Target {} not found, retry {}/{}",
                        transaction_id, target.retry_count, max_retries
                    );
                }

                self.save(&target)?;

                Ok(ProcessOutcome {
                    resolved: false,
                    should_retry: target.retry_count < max_retries,
                    retry_count: target.retry_count,
                })
            }
            TagLookup::Error(message) => {
                error!("Error resolving target {}: {}", transaction_id, message);
                Err(IndexerError::TagIndex {
                    transaction_id: transaction_id.to_string(),
                    message,
                })
            }
        }
    }

    /// Counts targets by status and category
    pub fn get_stats(&self) -> Result<ResolutionStats, IndexerError> {
        let storage = lock_storage(&self.storage)?;
        Ok(ResolutionStats {
            total: storage.count_targets()?,
            resolved: storage.count_targets_by_status(ResolutionStatus::Resolved)?,
            pending: storage.count_targets_by_status(ResolutionStatus::Pending)?,
            not_found: storage.count_targets_by_status(ResolutionStatus::NotFound)?,
            by_category: storage.count_targets_by_category()?,
        })
    }

    fn save(&self, target: &ResolvedTarget) -> Result<(), IndexerError> {
        let mut storage = lock_storage(&self.storage)?;
        storage.upsert_resolved_target(target)?;
        Ok(())
    }
}

/// Classifies a transaction from its content type and tags
///
/// The manifest check comes first: a manifest carrying process tags is still
/// a manifest.
pub fn categorize_target(content_type: Option<&str>, tags: &TransactionTags) -> TargetCategory {
    if content_type == Some(MANIFEST_CONTENT_TYPE) {
        return TargetCategory::Manifest;
    }

    let tag = |name: &str| tags.get(name).map(String::as_str);
    if tag(DATA_PROTOCOL_TAG) == Some("ao") && tag(TYPE_TAG) == Some("Process") {
        return TargetCategory::AoProcess;
    }

    TargetCategory::Transaction
}

/// Decides the crawl status of a freshly resolved target
///
/// # Arguments
///
/// * `crawl_enabled` - Global crawl switch
/// * `category` - Category assigned at resolution
/// * `validation` - Manifest validation, for manifests
/// * `content_type` - Content-Type tag value
///
/// # Returns
///
/// `Pending` for valid manifests with an index and for crawlable content types,
/// `Skipped` otherwise or when crawling is disabled.
pub fn determine_crawl_status(
    crawl_enabled: bool,
    category: Option<TargetCategory>,
    validation: Option<&ManifestValidation>,
    content_type: Option<&str>,
) -> CrawlStatus {
    if !crawl_enabled {
        return CrawlStatus::Skipped;
    }

    let indexed_manifest = category == Some(TargetCategory::Manifest)
        && validation.map(ManifestValidation::is_crawlable).unwrap_or(false);

    if indexed_manifest || is_crawlable_content_type(content_type) {
        CrawlStatus::Pending
    } else {
        CrawlStatus::Skipped
    }
}
