//! Storage module for persisting records, resolution state and documents
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Name and process record ingestion and archival
//! - Resolved target state and crawl status
//! - Crawled document upserts

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::gateway::ManifestValidation;
use crate::state::{CrawlStatus, ResolutionStatus, TargetCategory};
use crate::IndexerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage shared between concurrent workers
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Opens a storage database and wraps it for sharing
pub fn open_shared_storage(path: &Path) -> Result<SharedStorage, IndexerError> {
    Ok(Arc::new(Mutex::new(SqliteStorage::new(path)?)))
}

/// Locks shared storage, reporting a poisoned lock as an error
pub fn lock_storage(storage: &SharedStorage) -> Result<MutexGuard<'_, SqliteStorage>, IndexerError> {
    storage
        .lock()
        .map_err(|_| IndexerError::Storage("storage lock poisoned".to_string()))
}

/// A registered name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameRecord {
    pub name: String,
    pub process_id: String,
    /// "lease" or "permabuy"
    #[serde(rename = "type", default)]
    pub record_type: Option<String>,
    #[serde(default)]
    pub start_timestamp: Option<i64>,
    /// Lease end in milliseconds since the epoch
    #[serde(default)]
    pub end_timestamp: Option<i64>,
    #[serde(default)]
    pub undername_limit: Option<i64>,
    #[serde(default)]
    pub purchase_price: Option<i64>,
}

impl NameRecord {
    pub fn is_lease(&self) -> bool {
        self.record_type.as_deref() == Some("lease")
    }
}

/// An undername record published by a name's process
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    pub name: String,
    pub process_id: String,
    pub undername: String,
    pub transaction_id: String,
    #[serde(default)]
    pub ttl_seconds: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub controllers: Vec<String>,
}

/// A transaction id awaiting resolution, with the name that points at it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedTarget {
    pub transaction_id: String,
    pub name: String,
    pub undername: String,
}

/// Resolution and crawl state of one transaction id
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub transaction_id: String,
    pub name: Option<String>,
    pub undername: Option<String>,
    pub status: ResolutionStatus,
    pub content_type: Option<String>,
    pub category: Option<TargetCategory>,
    pub retry_count: u32,
    pub manifest_validation: Option<ManifestValidation>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub crawl_status: Option<CrawlStatus>,
    pub crawled_at: Option<DateTime<Utc>>,
    pub robots_txt: Option<String>,
    pub sitemap_xml: Option<String>,
}

impl ResolvedTarget {
    /// A fresh pending row
    pub fn new_pending(
        transaction_id: impl Into<String>,
        name: Option<String>,
        undername: Option<String>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            name,
            undername,
            status: ResolutionStatus::Pending,
            content_type: None,
            category: None,
            retry_count: 0,
            manifest_validation: None,
            resolved_at: None,
            crawl_status: None,
            crawled_at: None,
            robots_txt: None,
            sitemap_xml: None,
        }
    }
}

/// A parsed document stored for a (transaction, path) pair
#[derive(Debug, Clone, PartialEq)]
pub struct CrawledDocument {
    pub transaction_id: String,
    /// `None` for the root document of a non-manifest target
    pub manifest_path: Option<String>,
    pub url: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub body_truncated: bool,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub headings: Vec<String>,
    pub links: Vec<String>,
    pub content_hash: String,
    pub content_type: Option<String>,
    pub depth: u32,
    pub content_length: usize,
    pub last_crawled_at: DateTime<Utc>,
}

/// Counts reported by one archival batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub archived: usize,
    pub dependents_archived: usize,
}
