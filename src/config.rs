use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Remote API endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the Monitored Entities API, e.g.
    /// `https://my-activegate:9999/e/ENV_ID/api/v2`
    pub base_url: String,
    /// Name of the environment variable holding the API token
    /// (entities.read scope). The token itself never appears in config
    /// files or logs.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Verify TLS certificates. On-prem ActiveGates often run self-signed
    /// certs; disabling is allowed but surfaced as a warning at startup.
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Traversal tuning
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Entities per page in full-scan mode (API max is 500)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Ids per batch request in BFS mode
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Optional timeframe start (e.g. "now-3d"), passed through unmodified
    #[serde(default)]
    pub from_time: Option<String>,
    /// Optional timeframe end (e.g. "now"), passed through unmodified
    #[serde(default)]
    pub to_time: Option<String>,
}

/// Retry/backoff tuning for transient API failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: f64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: f64,
}

fn default_token_env() -> String {
    "DYNATRACE_API_TOKEN".to_string()
}

fn default_verify_ssl() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_page_size() -> usize {
    500
}

fn default_batch_size() -> usize {
    50
}

fn default_max_retries() -> usize {
    5
}

fn default_initial_backoff() -> f64 {
    1.0
}

fn default_max_backoff() -> f64 {
    60.0
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            from_time: None,
            to_time: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.max_backoff_secs)
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading
    /// config. Looks for the config file in this order:
    /// 1. Path specified in SVCTOPO_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let path = std::env::var("SVCTOPO_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path (CLI `--config` override)
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid base URL: {}", self.api.base_url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!(
                "Invalid base URL scheme '{}': must be http or https",
                url.scheme()
            );
        }

        if self.discovery.page_size < 1 || self.discovery.page_size > 500 {
            anyhow::bail!(
                "discovery.page_size must be between 1 and 500 (got {})",
                self.discovery.page_size
            );
        }

        if self.discovery.batch_size < 10 || self.discovery.batch_size > 100 {
            anyhow::bail!(
                "discovery.batch_size must be between 10 and 100 (got {})",
                self.discovery.batch_size
            );
        }

        if self.retry.initial_backoff_secs <= 0.0 {
            anyhow::bail!("retry.initial_backoff_secs must be positive");
        }

        if self.retry.max_backoff_secs < self.retry.initial_backoff_secs {
            anyhow::bail!("retry.max_backoff_secs must be >= retry.initial_backoff_secs");
        }

        // The token env var must be set; its value is read lazily and never logged
        std::env::var(&self.api.token_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or environment \
                 with an API token carrying the entities.read scope.",
                self.api.token_env
            )
        })?;

        Ok(())
    }

    /// Read the API token from the configured environment variable
    pub fn api_token(&self) -> Result<String> {
        std::env::var(&self.api.token_env)
            .with_context(|| format!("Environment variable {} not set", self.api.token_env))
    }

    /// Base URL with any trailing slash removed
    pub fn base_url(&self) -> &str {
        self.api.base_url.trim_end_matches('/')
    }
}
