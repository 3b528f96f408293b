//! Statistics from the indexer database
//!
//! This module extracts and displays record, resolution and crawl counts
//! from the storage layer.

use crate::state::{CrawlStatus, ResolutionStatus, TargetCategory};
use crate::storage::Storage;
use crate::IndexerError;
use std::collections::HashMap;

/// Index statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStatistics {
    pub name_records: u64,
    pub process_records: u64,

    /// Total number of resolved-target rows, in any status
    pub total_targets: u64,

    /// Count of targets by resolution status
    pub targets_by_status: HashMap<ResolutionStatus, u64>,

    pub targets_by_category: HashMap<TargetCategory, u64>,

    pub targets_by_crawl_status: HashMap<CrawlStatus, u64>,

    pub crawled_documents: u64,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(IndexStatistics)` - Successfully loaded statistics
/// * `Err(IndexerError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<IndexStatistics, IndexerError> {
    let mut targets_by_status = HashMap::new();
    for status in ResolutionStatus::all_states() {
        let count = storage.count_targets_by_status(status)?;
        if count > 0 {
            targets_by_status.insert(status, count);
        }
    }

    Ok(IndexStatistics {
        name_records: storage.count_name_records()?,
        process_records: storage.count_process_records()?,
        total_targets: storage.count_targets()?,
        targets_by_status,
        targets_by_category: storage.count_targets_by_category()?,
        targets_by_crawl_status: storage.count_targets_by_crawl_status()?,
        crawled_documents: storage.count_crawled_documents()?,
    })
}

fn sorted_counts<K: std::fmt::Display>(counts: &HashMap<K, u64>) -> Vec<(String, u64)> {
    let mut entries: Vec<_> = counts
        .iter()
        .map(|(key, count)| (key.to_string(), *count))
        .collect();
    // Highest count first, ties by name
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &IndexStatistics) {
    println!("=== Index Statistics ===\n");

    println!("Records:");
    println!("  Name records: {}", stats.name_records);
    println!("  Process records: {}", stats.process_records);
    println!();

    println!("Targets ({}):", stats.total_targets);
    for (status, count) in sorted_counts(&stats.targets_by_status) {
        let percentage = if stats.total_targets > 0 {
            (count as f64 / stats.total_targets as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.targets_by_category.is_empty() {
        println!("By Category:");
        for (category, count) in sorted_counts(&stats.targets_by_category) {
            println!("  {}: {}", category, count);
        }
        println!();
    }

    if !stats.targets_by_crawl_status.is_empty() {
        println!("By Crawl Status:");
        for (status, count) in sorted_counts(&stats.targets_by_crawl_status) {
            println!("  {}: {}", status, count);
        }
        println!();
    }

    println!("Crawled documents: {}", stats.crawled_documents);
}
