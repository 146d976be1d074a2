//! Configuration file discovery and layered loading.
//!
//! # Configuration File Format
//!
//! ```toml
//! [api_keys]
//! semantic_scholar = "your-api-key"
//! unpaywall_email = "you@example.org"
//!
//! [sources]
//! priority = ["semantic", "openalex", "crossref", "unpaywall"]
//! pdf_priority = ["unpaywall", "openalex", "semantic", "crossref"]
//! disabled = []
//!
//! [timeouts]
//! adapter_ms = 8000
//! pdf_attempt_ms = 4000
//!
//! [cache]
//! paper_ttl_seconds = 600
//! network_ttl_seconds = 900
//!
//! [network]
//! max_citing = 50
//! max_cited = 50
//!
//! [merge]
//! policy = "highest_citations"
//! ```
//!
//! Every key can be overridden from the environment with the `SCHOLAR_HUB_`
//! prefix and `__` between path segments, e.g.
//! `SCHOLAR_HUB_CACHE__PAPER_TTL_SECONDS=120` or
//! `SCHOLAR_HUB_SOURCES__DISABLED=crossref,unpaywall`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::Config;

const ENV_PREFIX: &str = "SCHOLAR_HUB";
const FILE_NAME: &str = "scholar-hub.toml";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Load configuration: defaults, then `path` (if any), then the environment.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_layers(path, None)
}

/// Look for `./scholar-hub.toml`, then `<config dir>/scholar-hub/config.toml`.
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("scholar-hub").join("config.toml"))
        .filter(|path| path.is_file())
}

fn load_layers(
    path: Option<&Path>,
    env_override: Option<HashMap<String, String>>,
) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        tracing::debug!(path = %path.display(), "Loading configuration file");
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let environment = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("sources.priority")
        .with_list_parse_key("sources.pdf_priority")
        .with_list_parse_key("sources.disabled")
        .try_parsing(true)
        .source(env_override);

    let loaded: Config = builder.add_source(environment).build()?.try_deserialize()?;

    let config = Config {
        api_keys: loaded.api_keys.clone().with_env_fallback(),
        ..loaded
    };
    config.validate()?;
    Ok(config)
}
