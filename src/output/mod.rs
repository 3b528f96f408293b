//! Output module for reporting on the index
//!
//! This module handles loading counts from the database and printing them.

pub mod stats;

pub use stats::{load_statistics, print_statistics, IndexStatistics};
