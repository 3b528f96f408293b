//! State module for resolution and crawl progress
//!
//! # Components
//!
//! - `ResolutionStatus`: where a transaction is in the tag-lookup state machine
//! - `TargetCategory`: what a resolved transaction turned out to be
//! - `CrawlStatus`: crawl eligibility and progress of a resolved target

mod target_state;

pub use target_state::{CrawlStatus, ResolutionStatus, TargetCategory};
