//! Robots.txt handling module
//!
//! Manifests may carry a `robots.txt` path. Its rules restrict which manifest
//! paths are crawled, and its sitemap lines feed sitemap discovery.

mod parser;

pub use parser::{is_path_allowed, matches_pattern, parse_robots_txt, RobotsTxtRules};
