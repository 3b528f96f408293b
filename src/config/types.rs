use crate::config::filter::NameFilter;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the indexer
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Gateway the transactions and manifests are fetched through
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GatewayConfig {
    /// Gateway hostname, optionally with a port (e.g. "arweave.net")
    pub host: String,

    /// URL scheme used to reach the gateway
    pub scheme: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Connection establishment timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "arweave.net".to_string(),
            scheme: "https".to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl GatewayConfig {
    /// Base URL of the gateway without a trailing slash
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

/// Name and process record discovery
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DiscoveryConfig {
    /// JSON snapshot of name and undername records to ingest each cycle
    pub snapshot_path: Option<String>,

    /// Delay between the end of one discovery pass and the next (milliseconds)
    pub cycle_delay_ms: u64,

    /// Process ids whose records are never ingested
    pub blocked_process_ids: Vec<String>,

    /// Number of expired name records archived per transaction
    pub cleanup_batch_size: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            cycle_delay_ms: 3_600_000,
            blocked_process_ids: Vec::new(),
            cleanup_batch_size: 100,
        }
    }
}

impl DiscoveryConfig {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
}

/// Target resolution stage
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResolutionConfig {
    pub enabled: bool,

    /// Candidates loaded per batch
    pub batch_size: u32,

    /// Candidates resolved concurrently within a batch
    pub concurrency: u32,

    /// Not-found lookups tolerated before a target becomes terminally not found
    pub max_retries: u32,

    /// Delay before a not-found target is looked up again (milliseconds)
    pub retry_delay_ms: u64,

    pub allow_list: NameFilter,
    pub deny_list: NameFilter,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 100,
            concurrency: 2,
            max_retries: 3,
            retry_delay_ms: 7_200_000,
            allow_list: NameFilter::Unset,
            deny_list: NameFilter::Unset,
        }
    }
}

impl ResolutionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Content crawl stage
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlConfig {
    pub enabled: bool,

    /// Targets loaded per batch
    pub batch_size: u32,

    /// Targets crawled concurrently within a batch
    pub concurrency: u32,

    /// Deepest manifest traversal level that is still fetched
    pub max_depth: u32,

    /// Body text cap in characters
    pub max_body_size: usize,

    /// Title cap in characters
    pub max_title_size: usize,

    pub max_headings_count: usize,
    pub max_links_count: usize,

    pub allow_list: NameFilter,
    pub deny_list: NameFilter,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: 50,
            concurrency: 2,
            max_depth: 10,
            max_body_size: 5_242_880,
            max_title_size: 1024,
            max_headings_count: 25,
            max_links_count: 25,
            allow_list: NameFilter::Unset,
            deny_list: NameFilter::Unset,
        }
    }
}

/// Background job execution
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct JobsConfig {
    /// Execution attempts for retryable jobs
    pub attempts: u32,

    /// Base delay of the exponential backoff between attempts (milliseconds)
    pub backoff_base_ms: u64,

    /// Failed job records kept for inspection
    pub keep_failed: usize,

    /// Jobs executing at the same time
    pub worker_concurrency: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_base_ms: 5000,
            keep_failed: 8,
            worker_concurrency: 2,
        }
    }
}
