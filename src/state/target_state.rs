/// State enums persisted on resolved targets
///
/// Every enum has a stable lowercase database representation.
use std::fmt;

/// Resolution state of a transaction id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionStatus {
    /// Not resolved yet, or not found but still under the retry cap
    Pending,

    /// Tags were found and the target was categorized
    Resolved,

    /// Tag lookup kept returning nothing until the retry cap was reached
    NotFound,
}

impl ResolutionStatus {
    /// Returns true if no further resolution attempts will be made
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::NotFound => "not_found",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            "not_found" => Some(Self::NotFound),
            _ => None,
        }
    }

    pub fn all_states() -> [Self; 3] {
        [Self::Pending, Self::Resolved, Self::NotFound]
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// What a resolved transaction is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetCategory {
    /// A path manifest serving a document tree
    Manifest,

    /// An AO process
    AoProcess,

    /// Any other transaction
    Transaction,
}

impl TargetCategory {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Manifest => "manifest",
            Self::AoProcess => "ao_process",
            Self::Transaction => "transaction",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "manifest" => Some(Self::Manifest),
            "ao_process" => Some(Self::AoProcess),
            "transaction" => Some(Self::Transaction),
            _ => None,
        }
    }

    pub fn all_categories() -> [Self; 3] {
        [Self::Manifest, Self::AoProcess, Self::Transaction]
    }
}

impl fmt::Display for TargetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Crawl state of a resolved target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlStatus {
    /// Eligible and waiting for the crawl stage
    Pending,

    /// A crawl is in progress
    Crawling,

    /// Crawled successfully
    Crawled,

    /// Not eligible for crawling
    Skipped,

    /// The last crawl attempt failed
    Failed,
}

impl CrawlStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Crawled | Self::Skipped | Self::Failed)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Crawling => "crawling",
            Self::Crawled => "crawled",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "crawling" => Some(Self::Crawling),
            "crawled" => Some(Self::Crawled),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn all_states() -> [Self; 5] {
        [
            Self::Pending,
            Self::Crawling,
            Self::Crawled,
            Self::Skipped,
            Self::Failed,
        ]
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
