use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SelectionConfig {
    /// How long an unanswered prompt stays resolvable
    pub ttl_secs: u64,
    pub max_capacity: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            max_capacity: 10_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            user_agent: format!("postgrab/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size_mb: u64,
    pub max_thumbnail_dimension: u32,
    /// Timeout for downloading a single media file
    pub download_timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 25,
            max_thumbnail_dimension: 1280,
            download_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub discord_token: Option<String>,
    pub logging: LoggingConfig,
    pub selection: SelectionConfig,
    pub fetch: FetchConfig,
    pub upload: UploadConfig,
    /// Empty means everyone may use the bot
    pub allowed_users: HashSet<u64>,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file {}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn get_logging_format(&self) -> &str {
        &self.logging.format
    }

    pub fn get_discord_token(&self) -> Option<&str> {
        self.discord_token.as_deref()
    }

    pub fn selection_ttl(&self) -> Duration {
        Duration::from_secs(self.selection.ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.upload.download_timeout_secs)
    }

    pub fn is_allowed(&self, user_id: u64) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user_id)
    }
}
