//! Configuration module for the indexer
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use arns_indexer::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("indexer.toml")).unwrap();
//! println!("Crawl max depth: {}", config.crawl.max_depth);
//! ```

mod filter;
mod parser;
mod types;
mod validation;

// Re-export types
pub use filter::{NameFilter, NameFilters};
pub use types::{
    Config, CrawlConfig, DiscoveryConfig, GatewayConfig, JobsConfig, OutputConfig,
    ResolutionConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
