//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the indexer database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Registered names and the process each one resolves through
CREATE TABLE IF NOT EXISTS name_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    process_id TEXT NOT NULL,
    record_type TEXT,
    start_timestamp INTEGER,
    end_timestamp INTEGER,
    undername_limit INTEGER,
    purchase_price INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_name_records_expiry ON name_records(record_type, end_timestamp);

-- Undername records published by each name's process
CREATE TABLE IF NOT EXISTS process_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    process_id TEXT NOT NULL,
    undername TEXT NOT NULL,
    transaction_id TEXT NOT NULL,
    ttl_seconds INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    priority INTEGER,
    owner TEXT,
    display_name TEXT,
    logo TEXT,
    keywords TEXT NOT NULL DEFAULT '[]',
    controllers TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(name, undername)
);

CREATE INDEX IF NOT EXISTS idx_process_records_transaction ON process_records(transaction_id);
CREATE INDEX IF NOT EXISTS idx_process_records_name ON process_records(name);

-- Archived copies of expired name records
CREATE TABLE IF NOT EXISTS name_record_archive (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    archived_at TEXT NOT NULL,
    archive_reason TEXT,
    original_id INTEGER NOT NULL,
    original_created_at TEXT NOT NULL,
    original_updated_at TEXT NOT NULL,
    name TEXT NOT NULL,
    process_id TEXT NOT NULL,
    record_type TEXT,
    start_timestamp INTEGER,
    end_timestamp INTEGER,
    undername_limit INTEGER,
    purchase_price INTEGER
);

CREATE INDEX IF NOT EXISTS idx_name_record_archive_name ON name_record_archive(name);

-- Archived copies of process records whose name expired
CREATE TABLE IF NOT EXISTS process_record_archive (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    archived_at TEXT NOT NULL,
    archive_reason TEXT,
    original_id INTEGER NOT NULL,
    original_created_at TEXT NOT NULL,
    original_updated_at TEXT NOT NULL,
    name TEXT NOT NULL,
    process_id TEXT NOT NULL,
    undername TEXT NOT NULL,
    transaction_id TEXT NOT NULL,
    ttl_seconds INTEGER NOT NULL,
    description TEXT,
    priority INTEGER,
    owner TEXT,
    display_name TEXT,
    logo TEXT,
    keywords TEXT NOT NULL,
    controllers TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_process_record_archive_name ON process_record_archive(name);

-- Resolution and crawl state, one row per transaction id
CREATE TABLE IF NOT EXISTS resolved_targets (
    transaction_id TEXT PRIMARY KEY,
    name TEXT,
    undername TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    content_type TEXT,
    target_category TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    manifest_validation TEXT,
    resolved_at TEXT,
    crawl_status TEXT,
    crawled_at TEXT,
    robots_txt TEXT,
    sitemap_xml TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_resolved_targets_status ON resolved_targets(status);
CREATE INDEX IF NOT EXISTS idx_resolved_targets_category ON resolved_targets(target_category);
CREATE INDEX IF NOT EXISTS idx_resolved_targets_crawl_status ON resolved_targets(crawl_status);

-- Parsed documents, one per (transaction, manifest path); '' is the root document
CREATE TABLE IF NOT EXISTS crawled_documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_id TEXT NOT NULL REFERENCES resolved_targets(transaction_id) ON DELETE CASCADE,
    manifest_path TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL,
    title TEXT,
    body TEXT,
    body_truncated INTEGER NOT NULL DEFAULT 0,
    meta_description TEXT,
    meta_keywords TEXT,
    headings TEXT NOT NULL DEFAULT '[]',
    links TEXT NOT NULL DEFAULT '[]',
    content_hash TEXT,
    content_type TEXT,
    depth INTEGER NOT NULL DEFAULT 0,
    content_length INTEGER,
    last_crawled_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(transaction_id, manifest_path)
);

CREATE INDEX IF NOT EXISTS idx_crawled_documents_hash ON crawled_documents(content_hash);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
