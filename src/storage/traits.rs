//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::config::NameFilters;
use crate::state::{CrawlStatus, ResolutionStatus, TargetCategory};
use crate::storage::{
    ArchiveOutcome, CrawledDocument, NameRecord, ProcessRecord, ResolvedTarget, UnresolvedTarget,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Writes are keyed by primary or unique key so concurrent workers can update
/// different rows without coordination. Archival is the only multi-table write
/// and must be atomic.
pub trait Storage {
    // ===== Name and process records =====

    /// Inserts or updates name records keyed by name
    ///
    /// # Returns
    ///
    /// The number of records written
    fn upsert_name_records(&mut self, records: &[NameRecord]) -> StorageResult<usize>;

    /// Inserts or updates process records keyed by (name, undername)
    fn upsert_process_records(&mut self, records: &[ProcessRecord]) -> StorageResult<usize>;

    /// Lists all name records ordered by name
    fn list_name_records(&self) -> StorageResult<Vec<NameRecord>>;

    /// Lists the process records published under a name
    fn list_process_records(&self, name: &str) -> StorageResult<Vec<ProcessRecord>>;

    /// Archives up to `limit` lease name records that ended before `now_ms`,
    /// together with their process records, then deletes the originals
    ///
    /// Runs as one transaction: on any failure nothing is archived or deleted.
    fn archive_expired_records(
        &mut self,
        now_ms: i64,
        limit: u32,
        reason: &str,
    ) -> StorageResult<ArchiveOutcome>;

    // ===== Resolution =====

    /// Finds transaction ids that were never resolved, or are pending with
    /// `retry_count < max_retries`
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Retry cap for pending targets
    /// * `limit` - Maximum number of candidates returned
    /// * `filters` - Name allow/deny lists
    /// * `after` - Only ids sorting after this one, for paging through a run
    fn find_unresolved_targets(
        &self,
        max_retries: u32,
        limit: u32,
        filters: NameFilters<'_>,
        after: Option<&str>,
    ) -> StorageResult<Vec<UnresolvedTarget>>;

    fn get_resolved_target(&self, transaction_id: &str) -> StorageResult<Option<ResolvedTarget>>;

    /// Inserts or replaces the full state of a target
    fn upsert_resolved_target(&mut self, target: &ResolvedTarget) -> StorageResult<()>;

    // ===== Crawling =====

    /// Finds resolved targets whose crawl status is pending, ordered by
    /// transaction id and starting after `after` when given
    fn find_pending_crawl_targets(
        &self,
        limit: u32,
        filters: NameFilters<'_>,
        after: Option<&str>,
    ) -> StorageResult<Vec<ResolvedTarget>>;

    /// Sets the crawl status; `crawled_at` is only written when given
    fn update_crawl_status(
        &mut self,
        transaction_id: &str,
        status: CrawlStatus,
        crawled_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;

    /// Stores the raw robots.txt and sitemap.xml text found for a target
    fn update_crawl_artifacts(
        &mut self,
        transaction_id: &str,
        robots_txt: Option<&str>,
        sitemap_xml: Option<&str>,
    ) -> StorageResult<()>;

    /// Inserts a document or updates the one stored for the same pair
    fn upsert_crawled_document(&mut self, document: &CrawledDocument) -> StorageResult<()>;

    fn get_crawled_document(
        &self,
        transaction_id: &str,
        manifest_path: Option<&str>,
    ) -> StorageResult<Option<CrawledDocument>>;

    fn list_crawled_documents(&self, transaction_id: &str) -> StorageResult<Vec<CrawledDocument>>;

    // ===== Statistics =====

    fn count_targets(&self) -> StorageResult<u64>;

    fn count_targets_by_status(&self, status: ResolutionStatus) -> StorageResult<u64>;

    fn count_targets_by_category(&self) -> StorageResult<HashMap<TargetCategory, u64>>;

    fn count_targets_by_crawl_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>>;

    fn count_crawled_documents(&self) -> StorageResult<u64>;

    fn count_name_records(&self) -> StorageResult<u64>;

    fn count_process_records(&self) -> StorageResult<u64>;
}
