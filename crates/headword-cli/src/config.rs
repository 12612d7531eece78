//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use headword_core::{DEFAULT_BASE_URL, DEFAULT_SELECTOR, HttpConfig};
use serde::Deserialize;

/// File-level configuration for headword
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub http: HttpSection,
    pub extract: ExtractSection,
    pub workers: WorkersSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Page URL prefix; the key is appended
    pub base_url: String,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            user_agent: None,
        }
    }
}

impl HttpSection {
    pub fn to_http_config(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractSection {
    /// CSS selector of the element holding the value
    pub selector: String,
}

impl Default for ExtractSection {
    fn default() -> Self {
        Self {
            selector: DEFAULT_SELECTOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
pub struct WorkersSection {
    /// Pool size when `-t` is not given; 0 = number of CPUs
    pub default: usize,
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./headword.toml (current directory)
    /// 2. ~/.config/headword/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("headword.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "headword") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
