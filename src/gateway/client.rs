//! HTTP access to the gateway
//!
//! This module handles every outbound request of the pipeline:
//! - Building the HTTP client with the crawler's user agent and timeouts
//! - Laying out gateway URLs for raw transactions, manifest paths and GraphQL
//! - Classifying responses into a `FetchResult`

use crate::config::{GatewayConfig, UserAgentConfig};
use crate::gateway::manifest::PathManifest;
use crate::IndexerError;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched the resource
    Success {
        /// Final URL after redirects
        final_url: String,
        /// HTTP status code
        status_code: u16,
        /// Content-Type header value, if any
        content_type: Option<String>,
        /// Response body
        body: String,
    },

    /// The gateway answered with a non-success status
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Network error (connection refused, timeout, etc.)
    NetworkError {
        /// Error description
        error: String,
    },
}

impl FetchResult {
    /// Converts into the response body, turning failures into errors
    pub fn into_body(self, url: &str) -> Result<String, IndexerError> {
        match self {
            Self::Success { body, .. } => Ok(body),
            Self::HttpError { status_code } => Err(IndexerError::HttpStatus {
                url: url.to_string(),
                status: status_code,
            }),
            Self::NetworkError { error } => Err(IndexerError::Network {
                url: url.to_string(),
                message: error,
            }),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `gateway` - Gateway settings providing the request and connect timeouts
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    gateway: &GatewayConfig,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        user_agent.crawler_name,
        user_agent.crawler_version,
        user_agent.contact_url,
        user_agent.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(gateway.request_timeout_secs))
        .connect_timeout(Duration::from_secs(gateway.connect_timeout_secs))
        // Gateways redirect /<id> to a per-transaction sandbox subdomain
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL and classifies the outcome
///
/// Non-success statuses and transport failures are returned as values so callers
/// can decide whether they are fatal.
pub async fn fetch_url(client: &Client, url: &str) -> FetchResult {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            let error = if e.is_timeout() {
                format!("Request timeout: {}", e)
            } else if e.is_connect() {
                format!("Connection failed: {}", e)
            } else {
                e.to_string()
            };
            return FetchResult::NetworkError { error };
        }
    };

    let status = response.status();
    if !status.is_success() {
        return FetchResult::HttpError {
            status_code: status.as_u16(),
        };
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match response.text().await {
        Ok(body) => FetchResult::Success {
            final_url,
            status_code: status.as_u16(),
            content_type,
            body,
        },
        Err(e) => FetchResult::NetworkError {
            error: e.to_string(),
        },
    }
}

/// Client bound to one gateway
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    /// Creates a gateway client from configuration
    pub fn new(user_agent: &UserAgentConfig, gateway: &GatewayConfig) -> Result<Self, IndexerError> {
        let client = build_http_client(user_agent, gateway)?;
        Ok(Self::with_client(client, gateway.base_url()))
    }

    /// Wraps an existing HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    /// `<scheme>://<host>`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Raw bytes of a transaction: `<base>/raw/<id>`
    pub fn raw_url(&self, transaction_id: &str) -> String {
        format!("{}/raw/{}", self.base_url, transaction_id)
    }

    /// Served content of a transaction: `<base>/<id>`
    pub fn content_url(&self, transaction_id: &str) -> String {
        format!("{}/{}", self.base_url, transaction_id)
    }

    /// A manifest-relative path: `<base>/<id>/<path>`
    pub fn path_url(&self, transaction_id: &str, manifest_path: &str) -> String {
        format!("{}/{}/{}", self.base_url, transaction_id, manifest_path)
    }

    pub fn graphql_url(&self) -> String {
        format!("{}/graphql", self.base_url)
    }

    pub async fn fetch(&self, url: &str) -> FetchResult {
        fetch_url(&self.client, url).await
    }

    /// Fetches and parses the path manifest of a transaction
    ///
    /// Only JSON shape is checked here; marker and version checks belong to
    /// manifest validation at resolution time.
    pub async fn fetch_manifest(&self, transaction_id: &str) -> Result<PathManifest, IndexerError> {
        let url = self.raw_url(transaction_id);
        let body = self.fetch(&url).await.into_body(&url)?;

        PathManifest::from_json(&body).map_err(|e| IndexerError::Manifest {
            transaction_id: transaction_id.to_string(),
            message: e.to_string(),
        })
    }
}
