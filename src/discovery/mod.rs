//! Discovery module: where name and process records come from
//!
//! The naming registry is an external collaborator. It is reached through the
//! `RecordSource` trait; the bundled implementation reads a JSON snapshot of the
//! registry from disk.

use async_trait::async_trait;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::storage::{NameRecord, ProcessRecord};
use crate::IndexerError;

/// A source of registered names and the undername records their processes publish
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_name_records(&self) -> Result<Vec<NameRecord>, IndexerError>;

    async fn fetch_process_records(
        &self,
        name: &NameRecord,
    ) -> Result<Vec<ProcessRecord>, IndexerError>;
}

/// A source with no records
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRecordSource;

#[async_trait]
impl RecordSource for EmptyRecordSource {
    async fn fetch_name_records(&self) -> Result<Vec<NameRecord>, IndexerError> {
        Ok(Vec::new())
    }

    async fn fetch_process_records(
        &self,
        _name: &NameRecord,
    ) -> Result<Vec<ProcessRecord>, IndexerError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    names: Vec<NameRecord>,
    #[serde(default)]
    undernames: Vec<ProcessRecord>,
}

/// Reads records from a JSON snapshot file
///
/// The file is re-read on every fetch, so an updated snapshot is picked up by
/// the next discovery cycle.
///
/// ```json
/// {
///   "names": [{ "name": "docs", "processId": "...", "type": "permabuy" }],
///   "undernames": [{ "name": "docs", "processId": "...", "undername": "@",
///                    "transactionId": "...", "ttlSeconds": 3600 }]
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotRecordSource {
    path: PathBuf,
}

impl SnapshotRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Snapshot, IndexerError> {
        let content = fs::read_to_string(&self.path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        debug!(
            "Loaded snapshot {}: {} names, {} undernames",
            self.path.display(),
            snapshot.names.len(),
            snapshot.undernames.len()
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl RecordSource for SnapshotRecordSource {
    async fn fetch_name_records(&self) -> Result<Vec<NameRecord>, IndexerError> {
        Ok(self.load()?.names)
    }

    async fn fetch_process_records(
        &self,
        name: &NameRecord,
    ) -> Result<Vec<ProcessRecord>, IndexerError> {
        Ok(self
            .load()?
            .undernames
            .into_iter()
            .filter(|record| record.name == name.name)
            .collect())
    }
}
