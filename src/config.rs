//! TOML configuration.
//!
//! Every section is optional; a missing file yields [`Config::default`].
//! Values are validated by [`Config::validate`] before any network or
//! filesystem work starts.
//!
//! ```toml
//! [output]
//! dir = "passport_results"
//!
//! [search]
//! api_url = "https://www.justice.gov/multimedia-search"
//! max_pages = 50
//! cookie = "session=..."
//!
//! [fetch]
//! concurrency = 4
//! max_attempts = 3
//!
//! [extract]
//! min_chars = 80
//!
//! [dedupe]
//! threshold = 0.95
//! num_perm = 512
//! ```

use anyhow::{Context, Result};
use docharvest_core::dedup::DedupParams;
use docharvest_core::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub dedupe: DedupeConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    /// Output root. When unset it is derived from the queries.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_results_per_page")]
    pub results_per_page: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: u64,
    #[serde(default = "default_page_delay_min_ms")]
    pub page_delay_min_ms: u64,
    #[serde(default = "default_page_delay_max_ms")]
    pub page_delay_max_ms: u64,
    #[serde(default = "default_search_retries")]
    pub max_retries: u32,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    /// Raw `Cookie` header of an externally established session.
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            results_per_page: default_results_per_page(),
            max_pages: default_max_pages(),
            page_delay_min_ms: default_page_delay_min_ms(),
            page_delay_max_ms: default_page_delay_max_ms(),
            max_retries: default_search_retries(),
            timeout_secs: default_search_timeout_secs(),
            cookie: None,
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_url() -> String {
    "https://www.justice.gov/multimedia-search".to_string()
}
fn default_results_per_page() -> u64 {
    10
}
fn default_max_pages() -> u64 {
    9999
}
fn default_page_delay_min_ms() -> u64 {
    300
}
fn default_page_delay_max_ms() -> u64 {
    800
}
fn default_search_retries() -> u32 {
    3
}
fn default_search_timeout_secs() -> u64 {
    60
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    /// Bodies of this many bytes or fewer count as a failed (transient) fetch.
    #[serde(default = "default_min_bytes")]
    pub min_bytes: u64,
    /// Progress is reported every `batch_size` settled items.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            timeout_secs: default_fetch_timeout_secs(),
            min_bytes: default_min_bytes(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_fetch_timeout_secs() -> u64 {
    300
}
fn default_min_bytes() -> u64 {
    500
}
fn default_batch_size() -> usize {
    25
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Texts shorter than this (trimmed) are kept on disk but not deduplicated.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            min_chars: default_min_chars(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupeConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_num_perm")]
    pub num_perm: usize,
    #[serde(default = "default_shingle_size")]
    pub shingle_size: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            num_perm: default_num_perm(),
            shingle_size: default_shingle_size(),
            seed: default_seed(),
        }
    }
}

fn default_threshold() -> f64 {
    0.95
}
fn default_num_perm() -> usize {
    512
}
fn default_shingle_size() -> usize {
    3
}
fn default_seed() -> u64 {
    1
}
fn default_min_chars() -> usize {
    80
}

impl Config {
    pub fn dedup_params(&self) -> DedupParams {
        DedupParams {
            threshold: self.dedupe.threshold,
            num_perm: self.dedupe.num_perm,
            shingle_size: self.dedupe.shingle_size,
            seed: self.dedupe.seed,
            min_chars: self.extract.min_chars,
        }
    }

    /// Reject values that would make the run meaningless or unbounded.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.fetch.concurrency == 0 {
            return invalid("fetch.concurrency must be > 0");
        }
        if self.fetch.max_attempts == 0 {
            return invalid("fetch.max_attempts must be > 0");
        }
        if self.fetch.backoff_max_ms < self.fetch.backoff_base_ms {
            return invalid("fetch.backoff_max_ms must be >= fetch.backoff_base_ms");
        }
        if self.fetch.timeout_secs == 0 {
            return invalid("fetch.timeout_secs must be > 0");
        }
        if self.fetch.batch_size == 0 {
            return invalid("fetch.batch_size must be > 0");
        }
        if self.search.results_per_page == 0 {
            return invalid("search.results_per_page must be > 0");
        }
        if self.search.max_pages == 0 {
            return invalid("search.max_pages must be > 0");
        }
        if self.search.page_delay_max_ms < self.search.page_delay_min_ms {
            return invalid("search.page_delay_max_ms must be >= search.page_delay_min_ms");
        }
        if self.extract.include_globs.is_empty() {
            return invalid("extract.include_globs must not be empty");
        }
        self.dedup_params().validate()?;
        Ok(())
    }
}

/// Load and validate a config file.
///
/// `None` means "no file given": defaults are used. A path that was given
/// but cannot be read or parsed is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}
