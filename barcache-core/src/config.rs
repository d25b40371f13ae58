//! TOML configuration for the loader.
//!
//! ```toml
//! [feed]
//! instruments = ["600848", "hs300"]
//! from_year = 2012
//! to_year = 2016
//! storage = "storage"
//! skip_errors = true
//!
//! [source]
//! type = "tushare"
//! token = "..."
//! adjust = "qfq"   # or "raw"
//! ```

use crate::data::provider::{DataError, HistorySource};
use crate::data::loader::is_valid_instrument;
use crate::data::{Adjustment, FeedOptions, TushareSource, YahooSource};
use crate::domain::Frequency;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete loader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub feed: FeedSection,
    pub source: SourceConfig,
}

/// `[feed]` — which pairs to load and where to cache them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSection {
    pub instruments: Vec<String>,
    pub from_year: i32,
    pub to_year: i32,
    #[serde(default = "default_storage")]
    pub storage: PathBuf,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default)]
    pub skip_errors: bool,
}

fn default_storage() -> PathBuf {
    PathBuf::from(".")
}

/// `[source]` — which remote source fills the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Tushare {
        token: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        adjust: Adjustment,
    },
    Yahoo,
}

impl SourceConfig {
    /// Cache file tag of the configured source.
    pub fn tag(&self) -> &'static str {
        match self {
            SourceConfig::Tushare { .. } => "tushare",
            SourceConfig::Yahoo => "yahoo",
        }
    }

    /// Construct the configured source.
    pub fn build(&self) -> Result<Box<dyn HistorySource>, DataError> {
        match self {
            SourceConfig::Tushare {
                token,
                base_url,
                adjust,
            } => {
                let source = match base_url {
                    Some(url) => TushareSource::with_base_url(token.clone(), url.clone())?,
                    None => TushareSource::new(token.clone())?,
                };
                Ok(Box::new(source.with_adjustment(*adjust)))
            }
            SourceConfig::Yahoo => Ok(Box::new(YahooSource::new()?)),
        }
    }
}

impl LoaderConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: LoaderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.instruments.is_empty() {
            return Err(ConfigError::Invalid("feed.instruments is empty".into()));
        }
        if let Some(bad) = self.feed.instruments.iter().find(|i| !is_valid_instrument(i)) {
            return Err(ConfigError::Invalid(format!(
                "feed.instruments contains '{bad}', which is not a plain file-name component"
            )));
        }
        if let SourceConfig::Tushare { token, .. } = &self.source {
            if token.trim().is_empty() {
                return Err(ConfigError::Invalid("source.token is required for tushare".into()));
            }
        }
        // Frequency and year range are checked by the loader itself.
        Ok(())
    }

    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions::new(
            self.feed.instruments.iter().cloned(),
            self.feed.from_year,
            self.feed.to_year,
            self.feed.storage.clone(),
        )
        .with_frequency(self.feed.frequency)
        .with_skip_errors(self.feed.skip_errors)
    }
}
