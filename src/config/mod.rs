//! Configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `SCHOLAR_HUB_*` environment variables (see [`load_config`]).

mod file_config;

pub use file_config::{find_config_file, load_config, ConfigError};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// API keys and contact addresses for external services
    #[serde(default)]
    pub api_keys: ApiKeys,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub circuit_breaker: BreakerConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Check values that would make the service misbehave rather than fail fast.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.paper_ttl_seconds == 0 || self.cache.network_ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "cache TTLs must be greater than zero".into(),
            ));
        }
        if self.timeouts.adapter_ms == 0 || self.timeouts.pdf_attempt_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be greater than zero".into(),
            ));
        }
        if self.network.max_citing == 0 || self.network.max_cited == 0 {
            return Err(ConfigError::Invalid(
                "network.max_citing and network.max_cited must be at least 1".into(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if let Some(id) = self
            .sources
            .priority
            .iter()
            .chain(&self.sources.pdf_priority)
            .find(|id| id.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "empty source id in priority list: {:?}",
                id
            )));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// API keys for external services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeys {
    /// Semantic Scholar API key (optional, for higher rate limits)
    #[serde(default)]
    pub semantic_scholar: Option<String>,

    /// Contact address for the OpenAlex polite pool
    #[serde(default)]
    pub openalex_email: Option<String>,

    /// Unpaywall requires an email on every request
    #[serde(default)]
    pub unpaywall_email: Option<String>,

    /// Contact address for the CrossRef polite pool
    #[serde(default)]
    pub crossref_mailto: Option<String>,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            semantic_scholar: None,
            openalex_email: None,
            unpaywall_email: None,
            crossref_mailto: None,
        }
        .with_env_fallback()
    }
}

impl ApiKeys {
    /// Fill unset keys from the well-known environment variables.
    pub fn with_env_fallback(mut self) -> Self {
        fn env(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }
        self.semantic_scholar = self
            .semantic_scholar
            .or_else(|| env("SEMANTIC_SCHOLAR_API_KEY"));
        self.openalex_email = self.openalex_email.or_else(|| env("OPENALEX_EMAIL"));
        self.unpaywall_email = self.unpaywall_email.or_else(|| env("UNPAYWALL_EMAIL"));
        self.crossref_mailto = self.crossref_mailto.or_else(|| env("CROSSREF_MAILTO"));
        self
    }
}

/// Which sources run, and in what order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Ranking tie-break order; sources not listed follow in registration order
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,

    /// PDF fallback chain order, open-access sources first
    #[serde(default = "default_pdf_priority")]
    pub pdf_priority: Vec<String>,

    /// Sources never queried
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Per-source API base URL overrides, keyed by source id
    #[serde(default)]
    pub base_urls: HashMap<String, String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            pdf_priority: default_pdf_priority(),
            disabled: Vec::new(),
            base_urls: HashMap::new(),
        }
    }
}

impl SourcesConfig {
    pub fn is_enabled(&self, id: &str) -> bool {
        !self.disabled.iter().any(|d| d.eq_ignore_ascii_case(id))
    }

    pub fn base_url(&self, id: &str) -> Option<&str> {
        self.base_urls.get(id).map(String::as_str)
    }
}

fn default_priority() -> Vec<String> {
    ["semantic", "openalex", "crossref", "unpaywall"]
        .map(String::from)
        .to_vec()
}

fn default_pdf_priority() -> Vec<String> {
    ["unpaywall", "openalex", "semantic", "crossref"]
        .map(String::from)
        .to_vec()
}

/// Per-call upstream timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Budget for one adapter call during fan-out
    #[serde(default = "default_adapter_ms")]
    pub adapter_ms: u64,

    /// Budget for one step of the PDF fallback chain
    #[serde(default = "default_pdf_attempt_ms")]
    pub pdf_attempt_ms: u64,

    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            adapter_ms: default_adapter_ms(),
            pdf_attempt_ms: default_pdf_attempt_ms(),
            connect_ms: default_connect_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn adapter(&self) -> Duration {
        Duration::from_millis(self.adapter_ms)
    }

    pub fn pdf_attempt(&self) -> Duration {
        Duration::from_millis(self.pdf_attempt_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }
}

fn default_adapter_ms() -> u64 {
    8_000
}

fn default_pdf_attempt_ms() -> u64 {
    4_000
}

fn default_connect_ms() -> u64 {
    5_000
}

/// Resource cache freshness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_paper_ttl")]
    pub paper_ttl_seconds: u64,

    #[serde(default = "default_network_ttl")]
    pub network_ttl_seconds: u64,

    /// Background purge interval; 0 disables the sweeper
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            paper_ttl_seconds: default_paper_ttl(),
            network_ttl_seconds: default_network_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_paper_ttl() -> u64 {
    600
}

fn default_network_ttl() -> u64 {
    900
}

fn default_sweep_interval() -> u64 {
    60
}

/// Citation network bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_max_neighbours")]
    pub max_citing: usize,

    #[serde(default = "default_max_neighbours")]
    pub max_cited: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_citing: default_max_neighbours(),
            max_cited: default_max_neighbours(),
        }
    }
}

fn default_max_neighbours() -> usize {
    50
}

/// How conflicting records of the same paper are merged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The record with the highest citation count represents the group
    #[default]
    HighestCitations,
    /// The record from the highest-priority source represents the group;
    /// citation and reference counts take the group maximum
    SourcePriority,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub policy: MergePolicy,
}

/// Per-source circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive unavailable outcomes before a source is skipped
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    #[serde(default = "default_open_seconds")]
    pub open_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_seconds: default_open_seconds(),
        }
    }
}

fn default_failure_threshold() -> usize {
    5
}

fn default_open_seconds() -> u64 {
    60
}

/// HTTP API listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
