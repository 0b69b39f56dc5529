use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding `analyzer.base_url`.
pub const ANALYZER_URL_ENV: &str = "PROOFMARK_ANALYZER_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analyzer: AnalyzerConfig,
    pub scheduler: SchedulerConfig,
    pub language: LanguageConfig,
    pub popup: PopupConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Replacements kept per match; the rest are dropped on receipt.
    pub max_replacements: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            timeout_ms: 10_000,
            max_replacements: 3,
        }
    }
}

impl AnalyzerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub debounce_ms: u64,
    pub idle_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 800,
            idle_timeout_ms: 1000,
        }
    }
}

impl SchedulerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    pub default_language: String,
    /// Skips detection entirely when set.
    pub force_language: Option<String>,
    /// Texts with fewer non-whitespace chars use the default language.
    pub min_detect_chars: usize,
    /// ISO 639-3 code to analyzer language tag.
    pub map: BTreeMap<String, String>,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        let map = [
            ("eng", "en-US"),
            ("deu", "de-DE"),
            ("fra", "fr"),
            ("ukr", "uk-UA"),
        ]
        .into_iter()
        .map(|(code, tag)| (code.to_string(), tag.to_string()))
        .collect();
        Self {
            default_language: "en-US".to_string(),
            force_language: None,
            min_detect_chars: 10,
            map,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopupConfig {
    pub hide_grace_ms: u64,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            hide_grace_ms: 2000,
        }
    }
}

impl PopupConfig {
    pub fn hide_grace(&self) -> Duration {
        Duration::from_millis(self.hide_grace_ms)
    }
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// `$XDG_CONFIG_HOME/proofmark/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("proofmark").join("config.toml"))
    }

    /// Load from `explicit`, or from [`Config::default_path`] when it exists.
    /// An explicit path that cannot be read is an error; a missing default
    /// file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        let source = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ANALYZER_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.analyzer.base_url = url;
        }
    }
}
