//! Configuration management for confluence.
//!
//! Configuration is read from `~/.config/confluence/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

pub mod interval;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::SourceKind;

/// Upstream listings never go past the front page.
pub const MAX_STORY_LIMIT: usize = 100;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sources: SourcesConfig,
    pub fetcher: FetcherConfig,
    pub cache: CacheConfig,
    pub comments: CommentsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Source used when a command doesn't name one.
    pub default: SourceKind,
    /// Base URL of the per-item API.
    pub item_base_url: String,
    /// Base URL of the search index API.
    pub search_base_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            default: SourceKind::Item,
            item_base_url: "https://hacker-news.firebaseio.com/v0/".to_string(),
            search_base_url: "https://hn.algolia.com/api/v1/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Maximum requests in flight during a fan-out (default: 10)
    pub concurrency: usize,
    /// Per-request timeout in seconds (default: 10)
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Number of front-page candidates to fetch, at most 100 (default: 100)
    pub story_limit: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout_secs: 10,
            user_agent: concat!("confluence/", env!("CARGO_PKG_VERSION")).to_string(),
            story_limit: MAX_STORY_LIMIT,
        }
    }
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Clamp the configured limit into `1..=100`.
    pub fn effective_story_limit(&self) -> usize {
        self.story_limit.clamp(1, MAX_STORY_LIMIT)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a result stays fresh (default: 5m)
    #[serde(with = "interval")]
    pub ttl: Duration,
    /// How long a failure is remembered before retrying (default: 5s)
    #[serde(with = "interval")]
    pub failure_backoff: Duration,
    /// Stale results older than this are dropped instead of served (default: 1h)
    #[serde(with = "interval")]
    pub max_stale: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            failure_backoff: Duration::from_secs(5),
            max_stale: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommentsConfig {
    /// Deepest reply level expanded; 0 means top-level comments only (default: 3)
    pub max_depth: usize,
    /// Maximum comments resolved per tree (default: 200)
    pub max_nodes: usize,
    /// Comments shown by `preview` (default: 5)
    pub preview_limit: usize,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_nodes: 200,
            preview_limit: 5,
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path: `~/.config/confluence/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("confluence").join("config.toml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetcher.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "fetcher.concurrency must be at least 1".into(),
            ));
        }
        if self.comments.max_nodes == 0 {
            return Err(ConfigError::Invalid(
                "comments.max_nodes must be at least 1".into(),
            ));
        }
        for (name, base) in [
            ("sources.item_base_url", &self.sources.item_base_url),
            ("sources.search_base_url", &self.sources.search_base_url),
        ] {
            url::Url::parse(base)
                .map_err(|e| ConfigError::Invalid(format!("{} is not a URL: {}", name, e)))?;
        }
        Ok(())
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# confluence configuration
#
# Durations accept "250ms", "30s", "5m", "1h", "1d" or a bare number of seconds.

[sources]
# Source used when --source is not given: "item" or "searchIndex"
default = "item"
item_base_url = "https://hacker-news.firebaseio.com/v0/"
search_base_url = "https://hn.algolia.com/api/v1/"

[fetcher]
# Maximum concurrent upstream requests per fan-out
concurrency = 10

# Per-request timeout in seconds
timeout_secs = 10

# Front-page candidates to fetch (at most 100)
story_limit = 100

[cache]
# Results younger than this are served without touching the network
ttl = "5m"

# A failed fetch is reported from cache for this long before retrying
failure_backoff = "5s"

# Stale results older than this are dropped instead of served
max_stale = "1h"

[comments]
# Deepest reply level expanded (0 = top-level comments only)
max_depth = 3

# Maximum comments resolved per thread
max_nodes = 200

# Comments shown by `confluence preview`
preview_limit = 5
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.sources.default, SourceKind::Item);
        assert_eq!(config.fetcher.concurrency, 10);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.cache.failure_backoff, Duration::from_secs(5));
        assert_eq!(config.cache.max_stale, Duration::from_secs(3600));
        assert_eq!(config.comments.max_depth, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[cache]
ttl = 90

[sources]
default = "searchIndex"
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.cache.ttl, Duration::from_secs(90));
        assert_eq!(config.sources.default, SourceKind::SearchIndex);
        // Defaults fill the rest
        assert_eq!(config.cache.failure_backoff, Duration::from_secs(5));
        assert_eq!(config.fetcher.story_limit, MAX_STORY_LIMIT);
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");
        assert_eq!(config.comments.max_nodes, 200);
        assert_eq!(config.fetcher.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_bad_interval_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[cache]\nttl = \"soon\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_story_limit_is_capped() {
        let mut fetcher = FetcherConfig::default();
        fetcher.story_limit = 500;
        assert_eq!(fetcher.effective_story_limit(), 100);
        fetcher.story_limit = 0;
        assert_eq!(fetcher.effective_story_limit(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[fetcher]\nconcurrency = 4\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.fetcher.concurrency, 4);
    }

    #[test]
    fn test_load_from_rejects_zero_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[fetcher]\nconcurrency = 0\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_create_default_config_writes_parsable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::create_default_config(&path).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.comments.preview_limit, 5);
    }
}
