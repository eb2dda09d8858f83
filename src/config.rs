//! Configuration file parser for ~/.config/feedimport/config.toml.
//!
//! The config file is optional; a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted but logged as a warning
//! since they are usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FetchLimits, ImportOptions, DEFAULT_MAX_FEED_SIZE, DEFAULT_TIMEOUT};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A key required for the requested operation is not set.
    #[error("Missing config key '{0}'")]
    Missing(&'static str),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database path. Defaults to `feeds.db` in the config directory.
    pub database: Option<PathBuf>,

    /// Person id imported articles fall back to when no author matches and
    /// the feed has no default author. Required for imports.
    pub fallback_author: Option<i64>,

    /// Timeout for one feed fetch, in seconds.
    pub request_timeout_secs: u64,

    /// Largest accepted feed body, in bytes.
    pub max_feed_size_bytes: usize,

    /// User-Agent header sent with every request.
    pub user_agent: String,

    /// Allow subscribing to loopback and private network addresses.
    pub allow_private_urls: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            fallback_author: None,
            request_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_feed_size_bytes: DEFAULT_MAX_FEED_SIZE,
            user_agent: format!("feedimport/{}", env!("CARGO_PKG_VERSION")),
            allow_private_urls: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "database",
        "fallback_author",
        "request_timeout_secs",
        "max_feed_size_bytes",
        "user_agent",
        "allow_private_urls",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check the size before reading so a huge file is never loaded
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            fallback_author = ?config.fallback_author,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Database path, `feeds.db` under `config_dir` unless configured
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| config_dir.join("feeds.db"))
    }

    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_size: self.max_feed_size_bytes,
        }
    }

    /// Import settings; fails when `fallback_author` is not configured
    pub fn import_options(&self) -> Result<ImportOptions, ConfigError> {
        let fallback_author = self
            .fallback_author
            .ok_or(ConfigError::Missing("fallback_author"))?;
        Ok(ImportOptions {
            fallback_author,
            limits: self.fetch_limits(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
