//! Resolver module
//!
//! Turns candidate transaction ids into resolved targets: tag lookup,
//! categorization, manifest validation and crawl eligibility.

mod target;

pub use target::{
    categorize_target, determine_crawl_status, ProcessOutcome, ResolutionStats, TargetResolver,
};
