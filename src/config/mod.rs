//! Configuration management.
//!
//! A [`HarvestConfig`] is built once at start-up and handed to every
//! component. Values are layered, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, `./pubmed-harvest.toml`, or
//!    `<config_dir>/pubmed-harvest/config.toml`)
//! 3. Environment variables prefixed with `PUBMED_HARVEST_`, nested keys
//!    separated by `__` (e.g. `PUBMED_HARVEST_RETRY__MAX_ATTEMPTS=5`)
//!
//! # Configuration File Format
//!
//! ```toml
//! email = "you@example.org"
//! query = "transposon[Title/Abstract]"
//! page_size = 1000
//! output_dir = "/data/pubmed"
//! checkpoint_path = "checkpoint.json"
//! batch_pause_ms = 400
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 1000
//! backoff_multiplier = 2.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default E-utilities endpoint root
pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Name of the config file looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "pubmed-harvest.toml";

/// Search expression for transposable-element literature
pub const DEFAULT_QUERY: &str = "transposable elements[Title/Abstract] OR \
    mobile genetic elements[Title/Abstract] OR \
    jumping genes[Title/Abstract] OR \
    transposition mechanisms[Title/Abstract] OR \
    TE class[Title/Abstract] OR \
    TE family[Title/Abstract] OR \
    TE subfamily[Title/Abstract] OR \
    mobile element[Title/Abstract] OR \
    repeating element[Title/Abstract] OR \
    transposon[Title/Abstract] OR \
    RepeatMasker[Title/Abstract] OR \
    Repbase[Title/Abstract] OR \
    Dfam[Title/Abstract]";

/// Harvester configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Contact address sent with every request, required by NCBI usage policy
    pub email: String,

    /// Tool name sent with every request
    pub tool: String,

    /// NCBI API key (optional, raises the rate limit)
    pub api_key: Option<String>,

    /// Search expression submitted to esearch
    pub query: String,

    /// Articles requested per efetch call
    pub page_size: u64,

    /// Upper bound on results. Logged against the result count but not
    /// applied to the fetch loop.
    pub max_results: u64,

    /// Directory receiving `papers_chunk_<offset>.json` files
    pub output_dir: PathBuf,

    /// Checkpoint file location
    pub checkpoint_path: PathBuf,

    /// Pause between batches, in milliseconds
    pub batch_pause_ms: u64,

    /// E-utilities endpoint root
    pub base_url: String,

    /// Per-request timeout, in seconds
    pub request_timeout_secs: u64,

    /// Retry behavior for page fetches
    pub retry: RetryConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            email: "pubmed-harvest@example.org".to_string(),
            tool: env!("CARGO_PKG_NAME").to_string(),
            api_key: std::env::var("NCBI_API_KEY").ok(),
            query: DEFAULT_QUERY.to_string(),
            page_size: 1000,
            max_results: 100_000,
            output_dir: default_output_dir(),
            checkpoint_path: PathBuf::from("checkpoint.json"),
            batch_pause_ms: 400,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 120,
            retry: RetryConfig::default(),
        }
    }
}

impl HarvestConfig {
    /// Pause between batches
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject values the harvester cannot run with
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.page_size == 0 {
            return Err(config::ConfigError::Message(
                "page_size must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(config::ConfigError::Message(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(config::ConfigError::Message(
                "retry.backoff_multiplier must be a finite number of at least 1.0".to_string(),
            ));
        }
        if self.query.trim().is_empty() {
            return Err(config::ConfigError::Message("query must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Retry settings for page fetches
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after each retry
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

/// `$MY_HOME/datasets/TEbase/pubmed`, relative to the working directory when
/// `MY_HOME` is unset
fn default_output_dir() -> PathBuf {
    let base = std::env::var_os("MY_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("datasets").join("TEbase").join("pubmed")
}

/// Load configuration, layering an optional file and the environment over
/// the defaults
pub fn load_config(path: Option<&Path>) -> Result<HarvestConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix("PUBMED_HARVEST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: HarvestConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Find a config file in the working directory or the user config directory
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("pubmed-harvest").join("config.toml"))
        .filter(|path| path.is_file())
}
