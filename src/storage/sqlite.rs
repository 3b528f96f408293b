//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::config::{NameFilter, NameFilters};
use crate::state::{CrawlStatus, ResolutionStatus, TargetCategory};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{
    ArchiveOutcome, CrawledDocument, NameRecord, ProcessRecord, ResolvedTarget, UnresolvedTarget,
};
use crate::IndexerError;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const TARGET_COLUMNS: &str = "transaction_id, name, undername, status, content_type, \
     target_category, retry_count, manifest_validation, resolved_at, crawl_status, crawled_at, \
     robots_txt, sitemap_xml";

const DOCUMENT_COLUMNS: &str = "transaction_id, manifest_path, url, title, body, body_truncated, \
     meta_description, meta_keywords, headings, links, content_hash, content_type, depth, \
     content_length, last_crawled_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(IndexerError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, IndexerError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, IndexerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Appends `AND <column> <op> (?, ...)` and binds the items
fn push_list(sql: &mut String, values: &mut Vec<Value>, column: &str, op: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    sql.push_str(&format!(
        " AND {} {} ({})",
        column,
        op,
        placeholders(items.len())
    ));
    values.extend(items.iter().cloned().map(Value::Text));
}

/// Keyset cursor: only rows ordered after the last id of the previous page
fn push_cursor(sql: &mut String, values: &mut Vec<Value>, column: &str, after: Option<&str>) {
    if let Some(after) = after {
        sql.push_str(&format!(" AND {} > ?", column));
        values.push(Value::Text(after.to_string()));
    }
}

fn push_name_filters(
    sql: &mut String,
    values: &mut Vec<Value>,
    column: &str,
    filters: NameFilters<'_>,
) {
    if let NameFilter::Names(names) = filters.allow {
        push_list(sql, values, column, "IN", names);
    }
    if let NameFilter::Names(names) = filters.deny {
        push_list(sql, values, column, "NOT IN", names);
    }
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|s| s.parse::<DateTime<Utc>>().ok())
}

fn target_from_row(row: &Row<'_>) -> rusqlite::Result<ResolvedTarget> {
    let status: String = row.get(3)?;
    let category: Option<String> = row.get(5)?;
    let validation: Option<String> = row.get(7)?;
    let crawl_status: Option<String> = row.get(9)?;

    Ok(ResolvedTarget {
        transaction_id: row.get(0)?,
        name: row.get(1)?,
        undername: row.get(2)?,
        status: ResolutionStatus::from_db_string(&status).unwrap_or(ResolutionStatus::Pending),
        content_type: row.get(4)?,
        category: category.as_deref().and_then(TargetCategory::from_db_string),
        retry_count: row.get(6)?,
        manifest_validation: validation.and_then(|json| serde_json::from_str(&json).ok()),
        resolved_at: parse_timestamp(row.get(8)?),
        crawl_status: crawl_status.as_deref().and_then(CrawlStatus::from_db_string),
        crawled_at: parse_timestamp(row.get(10)?),
        robots_txt: row.get(11)?,
        sitemap_xml: row.get(12)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<CrawledDocument> {
    let manifest_path: String = row.get(1)?;
    let headings: String = row.get(8)?;
    let links: String = row.get(9)?;
    let content_hash: Option<String> = row.get(10)?;
    let content_length: Option<i64> = row.get(13)?;
    let last_crawled_at: String = row.get(14)?;

    Ok(CrawledDocument {
        transaction_id: row.get(0)?,
        manifest_path: if manifest_path.is_empty() {
            None
        } else {
            Some(manifest_path)
        },
        url: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        body_truncated: row.get(5)?,
        meta_description: row.get(6)?,
        meta_keywords: row.get(7)?,
        headings: serde_json::from_str(&headings).unwrap_or_default(),
        links: serde_json::from_str(&links).unwrap_or_default(),
        content_hash: content_hash.unwrap_or_default(),
        content_type: row.get(11)?,
        depth: row.get(12)?,
        content_length: content_length.unwrap_or(0).max(0) as usize,
        last_crawled_at: last_crawled_at.parse().unwrap_or_default(),
    })
}

fn name_record_from_row(row: &Row<'_>) -> rusqlite::Result<NameRecord> {
    Ok(NameRecord {
        name: row.get(0)?,
        process_id: row.get(1)?,
        record_type: row.get(2)?,
        start_timestamp: row.get(3)?,
        end_timestamp: row.get(4)?,
        undername_limit: row.get(5)?,
        purchase_price: row.get(6)?,
    })
}

fn process_record_from_row(row: &Row<'_>) -> rusqlite::Result<ProcessRecord> {
    let keywords: String = row.get(10)?;
    let controllers: String = row.get(11)?;

    Ok(ProcessRecord {
        name: row.get(0)?,
        process_id: row.get(1)?,
        undername: row.get(2)?,
        transaction_id: row.get(3)?,
        ttl_seconds: row.get(4)?,
        description: row.get(5)?,
        priority: row.get(6)?,
        owner: row.get(7)?,
        display_name: row.get(8)?,
        logo: row.get(9)?,
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        controllers: serde_json::from_str(&controllers).unwrap_or_default(),
    })
}

impl Storage for SqliteStorage {
    // ===== Name and process records =====

    fn upsert_name_records(&mut self, records: &[NameRecord]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO name_records
                    (name, process_id, record_type, start_timestamp, end_timestamp,
                     undername_limit, purchase_price, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(name) DO UPDATE SET
                    process_id = excluded.process_id,
                    record_type = excluded.record_type,
                    start_timestamp = excluded.start_timestamp,
                    end_timestamp = excluded.end_timestamp,
                    undername_limit = excluded.undername_limit,
                    purchase_price = excluded.purchase_price,
                    updated_at = excluded.updated_at",
            )?;

            for record in records {
                stmt.execute(params![
                    record.name,
                    record.process_id,
                    record.record_type,
                    record.start_timestamp,
                    record.end_timestamp,
                    record.undername_limit,
                    record.purchase_price,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn upsert_process_records(&mut self, records: &[ProcessRecord]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO process_records
                    (name, process_id, undername, transaction_id, ttl_seconds, description,
                     priority, owner, display_name, logo, keywords, controllers,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                 ON CONFLICT(name, undername) DO UPDATE SET
                    process_id = excluded.process_id,
                    transaction_id = excluded.transaction_id,
                    ttl_seconds = excluded.ttl_seconds,
                    description = excluded.description,
                    priority = excluded.priority,
                    owner = excluded.owner,
                    display_name = excluded.display_name,
                    logo = excluded.logo,
                    keywords = excluded.keywords,
                    controllers = excluded.controllers,
                    updated_at = excluded.updated_at",
            )?;

            for record in records {
                let keywords = serde_json::to_string(&record.keywords)?;
                let controllers = serde_json::to_string(&record.controllers)?;
                stmt.execute(params![
                    record.name,
                    record.process_id,
                    record.undername,
                    record.transaction_id,
                    record.ttl_seconds,
                    record.description,
                    record.priority,
                    record.owner,
                    record.display_name,
                    record.logo,
                    keywords,
                    controllers,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn list_name_records(&self) -> StorageResult<Vec<NameRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, process_id, record_type, start_timestamp, end_timestamp,
                    undername_limit, purchase_price
             FROM name_records ORDER BY name",
        )?;
        let records = stmt
            .query_map([], name_record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn list_process_records(&self, name: &str) -> StorageResult<Vec<ProcessRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, process_id, undername, transaction_id, ttl_seconds, description,
                    priority, owner, display_name, logo, keywords, controllers
             FROM process_records WHERE name = ?1 ORDER BY undername",
        )?;
        let records = stmt
            .query_map(params![name], process_record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn archive_expired_records(
        &mut self,
        now_ms: i64,
        limit: u32,
        reason: &str,
    ) -> StorageResult<ArchiveOutcome> {
        let archived_at = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        let ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM name_records
                 WHERE record_type = 'lease' AND end_timestamp IS NOT NULL AND end_timestamp < ?1
                 ORDER BY end_timestamp LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![now_ms, limit], |row| row.get(0))?;
            rows.collect::<Result<Vec<i64>, _>>()?
        };

        if ids.is_empty() {
            return Ok(ArchiveOutcome::default());
        }

        let id_list = placeholders(ids.len());
        let id_values: Vec<Value> = ids.iter().map(|id| Value::Integer(*id)).collect();
        let mut archive_values = vec![Value::Text(archived_at), Value::Text(reason.to_string())];
        archive_values.extend(id_values.iter().cloned());

        let archived = tx.execute(
            &format!(
                "INSERT INTO name_record_archive
                    (archived_at, archive_reason, original_id, original_created_at,
                     original_updated_at, name, process_id, record_type, start_timestamp,
                     end_timestamp, undername_limit, purchase_price)
                 SELECT ?, ?, id, created_at, updated_at, name, process_id, record_type,
                        start_timestamp, end_timestamp, undername_limit, purchase_price
                 FROM name_records WHERE id IN ({})",
                id_list
            ),
            params_from_iter(archive_values.iter()),
        )?;

        let dependents_archived = tx.execute(
            &format!(
                "INSERT INTO process_record_archive
                    (archived_at, archive_reason, original_id, original_created_at,
                     original_updated_at, name, process_id, undername, transaction_id,
                     ttl_seconds, description, priority, owner, display_name, logo,
                     keywords, controllers)
                 SELECT ?, ?, id, created_at, updated_at, name, process_id, undername,
                        transaction_id, ttl_seconds, description, priority, owner,
                        display_name, logo, keywords, controllers
                 FROM process_records
                 WHERE name IN (SELECT name FROM name_records WHERE id IN ({}))",
                id_list
            ),
            params_from_iter(archive_values.iter()),
        )?;

        tx.execute(
            &format!(
                "DELETE FROM process_records
                 WHERE name IN (SELECT name FROM name_records WHERE id IN ({}))",
                id_list
            ),
            params_from_iter(id_values.iter()),
        )?;

        tx.execute(
            &format!("DELETE FROM name_records WHERE id IN ({})", id_list),
            params_from_iter(id_values.iter()),
        )?;

        tx.commit()?;

        Ok(ArchiveOutcome {
            archived,
            dependents_archived,
        })
    }

    // ===== Resolution =====

    fn find_unresolved_targets(
        &self,
        max_retries: u32,
        limit: u32,
        filters: NameFilters<'_>,
        after: Option<&str>,
    ) -> StorageResult<Vec<UnresolvedTarget>> {
        if filters.denies_all() {
            return Ok(Vec::new());
        }

        // Bare columns in an aggregate query take their values from the MIN(p.id) row
        let mut sql = String::from(
            "SELECT p.transaction_id, p.name, p.undername, MIN(p.id)
             FROM process_records p
             LEFT JOIN resolved_targets r ON r.transaction_id = p.transaction_id
             WHERE (r.transaction_id IS NULL OR (r.status = ? AND r.retry_count < ?))",
        );
        let mut values = vec![
            Value::Text(ResolutionStatus::Pending.to_db_string().to_string()),
            Value::Integer(i64::from(max_retries)),
        ];
        push_name_filters(&mut sql, &mut values, "p.name", filters);
        push_cursor(&mut sql, &mut values, "p.transaction_id", after);
        sql.push_str(" GROUP BY p.transaction_id ORDER BY p.transaction_id LIMIT ?");
        values.push(Value::Integer(i64::from(limit)));

        let mut stmt = self.conn.prepare(&sql)?;
        let candidates = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(UnresolvedTarget {
                    transaction_id: row.get(0)?,
                    name: row.get(1)?,
                    undername: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(candidates)
    }

    fn get_resolved_target(&self, transaction_id: &str) -> StorageResult<Option<ResolvedTarget>> {
        let target = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM resolved_targets WHERE transaction_id = ?1",
                    TARGET_COLUMNS
                ),
                params![transaction_id],
                target_from_row,
            )
            .optional()?;
        Ok(target)
    }

    fn upsert_resolved_target(&mut self, target: &ResolvedTarget) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let validation = target
            .manifest_validation
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            "INSERT INTO resolved_targets
                (transaction_id, name, undername, status, content_type, target_category,
                 retry_count, manifest_validation, resolved_at, crawl_status, crawled_at,
                 robots_txt, sitemap_xml, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
             ON CONFLICT(transaction_id) DO UPDATE SET
                name = excluded.name,
                undername = excluded.undername,
                status = excluded.status,
                content_type = excluded.content_type,
                target_category = excluded.target_category,
                retry_count = excluded.retry_count,
                manifest_validation = excluded.manifest_validation,
                resolved_at = excluded.resolved_at,
                crawl_status = excluded.crawl_status,
                crawled_at = excluded.crawled_at,
                robots_txt = excluded.robots_txt,
                sitemap_xml = excluded.sitemap_xml,
                updated_at = excluded.updated_at",
            params![
                target.transaction_id,
                target.name,
                target.undername,
                target.status.to_db_string(),
                target.content_type,
                target.category.map(|c| c.to_db_string()),
                target.retry_count,
                validation,
                target.resolved_at.map(|t| t.to_rfc3339()),
                target.crawl_status.map(|s| s.to_db_string()),
                target.crawled_at.map(|t| t.to_rfc3339()),
                target.robots_txt,
                target.sitemap_xml,
                now,
            ],
        )?;
        Ok(())
    }

    // ===== Crawling =====

    fn find_pending_crawl_targets(
        &self,
        limit: u32,
        filters: NameFilters<'_>,
        after: Option<&str>,
    ) -> StorageResult<Vec<ResolvedTarget>> {
        if filters.denies_all() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT {} FROM resolved_targets t
             WHERE t.crawl_status = ?
               AND EXISTS (SELECT 1 FROM process_records p
                           WHERE p.transaction_id = t.transaction_id",
            TARGET_COLUMNS
        );
        let mut values = vec![Value::Text(CrawlStatus::Pending.to_db_string().to_string())];
        push_name_filters(&mut sql, &mut values, "p.name", filters);
        sql.push(')');
        push_cursor(&mut sql, &mut values, "t.transaction_id", after);
        sql.push_str(" ORDER BY t.transaction_id LIMIT ?");
        values.push(Value::Integer(i64::from(limit)));

        let mut stmt = self.conn.prepare(&sql)?;
        let targets = stmt
            .query_map(params_from_iter(values.iter()), target_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets)
    }

    fn update_crawl_status(
        &mut self,
        transaction_id: &str,
        status: CrawlStatus,
        crawled_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE resolved_targets
             SET crawl_status = ?1, crawled_at = COALESCE(?2, crawled_at), updated_at = ?3
             WHERE transaction_id = ?4",
            params![
                status.to_db_string(),
                crawled_at.map(|t| t.to_rfc3339()),
                Utc::now().to_rfc3339(),
                transaction_id
            ],
        )?;
        Ok(())
    }

    fn update_crawl_artifacts(
        &mut self,
        transaction_id: &str,
        robots_txt: Option<&str>,
        sitemap_xml: Option<&str>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE resolved_targets
             SET robots_txt = ?1, sitemap_xml = ?2, updated_at = ?3
             WHERE transaction_id = ?4",
            params![
                robots_txt,
                sitemap_xml,
                Utc::now().to_rfc3339(),
                transaction_id
            ],
        )?;
        Ok(())
    }

    fn upsert_crawled_document(&mut self, document: &CrawledDocument) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let headings = serde_json::to_string(&document.headings)?;
        let links = serde_json::to_string(&document.links)?;

        // Depth is kept from the first crawl of a pair
        self.conn.execute(
            "INSERT INTO crawled_documents
                (transaction_id, manifest_path, url, title, body, body_truncated,
                 meta_description, meta_keywords, headings, links, content_hash, content_type,
                 depth, content_length, last_crawled_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
             ON CONFLICT(transaction_id, manifest_path) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                body = excluded.body,
                body_truncated = excluded.body_truncated,
                meta_description = excluded.meta_description,
                meta_keywords = excluded.meta_keywords,
                headings = excluded.headings,
                links = excluded.links,
                content_hash = excluded.content_hash,
                content_type = excluded.content_type,
                content_length = excluded.content_length,
                last_crawled_at = excluded.last_crawled_at,
                updated_at = excluded.updated_at",
            params![
                document.transaction_id,
                document.manifest_path.as_deref().unwrap_or(""),
                document.url,
                document.title,
                document.body,
                document.body_truncated,
                document.meta_description,
                document.meta_keywords,
                headings,
                links,
                document.content_hash,
                document.content_type,
                document.depth,
                document.content_length as i64,
                document.last_crawled_at.to_rfc3339(),
                now,
            ],
        )?;
        Ok(())
    }

    fn get_crawled_document(
        &self,
        transaction_id: &str,
        manifest_path: Option<&str>,
    ) -> StorageResult<Option<CrawledDocument>> {
        let document = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM crawled_documents
                     WHERE transaction_id = ?1 AND manifest_path = ?2",
                    DOCUMENT_COLUMNS
                ),
                params![transaction_id, manifest_path.unwrap_or("")],
                document_from_row,
            )
            .optional()?;
        Ok(document)
    }

    fn list_crawled_documents(&self, transaction_id: &str) -> StorageResult<Vec<CrawledDocument>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawled_documents WHERE transaction_id = ?1 ORDER BY manifest_path",
            DOCUMENT_COLUMNS
        ))?;
        let documents = stmt
            .query_map(params![transaction_id], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    // ===== Statistics =====

    fn count_targets(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM resolved_targets", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_targets_by_status(&self, status: ResolutionStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM resolved_targets WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_targets_by_category(&self) -> StorageResult<HashMap<TargetCategory, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT target_category, COUNT(*) FROM resolved_targets
             WHERE target_category IS NOT NULL GROUP BY target_category",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (category, count) = row?;
            if let Some(category) = TargetCategory::from_db_string(&category) {
                counts.insert(category, count as u64);
            }
        }
        Ok(counts)
    }

    fn count_targets_by_crawl_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT crawl_status, COUNT(*) FROM resolved_targets
             WHERE crawl_status IS NOT NULL GROUP BY crawl_status",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = CrawlStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }

    fn count_crawled_documents(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM crawled_documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_name_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM name_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_process_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM process_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
