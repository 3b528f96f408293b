//! Crawler module for manifest and document content
//!
//! This module contains the crawling logic, including:
//! - HTML and text parsing, link normalization and content hashing
//! - Sitemap parsing
//! - Manifest traversal and batch crawl coordination

mod coordinator;
mod parser;
mod sitemap;

pub use coordinator::{CrawlOutcome, CrawlSummary, ManifestCrawler};
pub use parser::{
    hash_content, is_crawlable_content_type, is_html_content_type, manifest_relative_path,
    normalize_link, ContentParser, ParseLimits, ParsedDocument,
};
pub use sitemap::{extract_manifest_paths, parse_sitemap_xml, SitemapEntry, SitemapValidation};
