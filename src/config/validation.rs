use crate::config::types::{
    Config, CrawlConfig, DiscoveryConfig, GatewayConfig, JobsConfig, OutputConfig,
    ResolutionConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_gateway_config(&config.gateway)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_discovery_config(&config.discovery)?;
    validate_resolution_config(&config.resolution)?;
    validate_crawl_config(&config.crawl)?;
    validate_jobs_config(&config.jobs)?;
    Ok(())
}

fn validate_gateway_config(config: &GatewayConfig) -> Result<(), ConfigError> {
    if config.host.is_empty() {
        return Err(ConfigError::Validation(
            "gateway host cannot be empty".to_string(),
        ));
    }

    if config.scheme != "https" && config.scheme != "http" {
        return Err(ConfigError::Validation(format!(
            "gateway scheme must be http or https, got '{}'",
            config.scheme
        )));
    }

    Url::parse(&config.base_url())
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid gateway: {}", e)))?;

    if config.request_timeout_secs < 1 || config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "gateway timeouts must be at least 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    if config.cleanup_batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "cleanup_batch_size must be >= 1, got {}",
            config.cleanup_batch_size
        )));
    }

    if matches!(&config.snapshot_path, Some(path) if path.is_empty()) {
        return Err(ConfigError::Validation(
            "snapshot_path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_resolution_config(config: &ResolutionConfig) -> Result<(), ConfigError> {
    validate_batching("resolution", config.batch_size, config.concurrency)?;

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "resolution max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    Ok(())
}

fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    validate_batching("crawl", config.batch_size, config.concurrency)?;

    if config.max_body_size == 0 || config.max_title_size == 0 {
        return Err(ConfigError::Validation(
            "crawl max_body_size and max_title_size must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_jobs_config(config: &JobsConfig) -> Result<(), ConfigError> {
    if config.attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "job attempts must be >= 1, got {}",
            config.attempts
        )));
    }

    if config.worker_concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "worker_concurrency must be >= 1, got {}",
            config.worker_concurrency
        )));
    }

    Ok(())
}

fn validate_batching(stage: &str, batch_size: u32, concurrency: u32) -> Result<(), ConfigError> {
    if batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "{} batch_size must be >= 1, got {}",
            stage, batch_size
        )));
    }

    if concurrency < 1 || concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "{} concurrency must be between 1 and 100, got {}",
            stage, concurrency
        )));
    }

    Ok(())
}

/// Validates an email address (basic validation)
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email address: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email address: '{}'",
            email
        )));
    }

    Ok(())
}
