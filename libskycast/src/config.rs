//! Configuration management for Skycast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::media::DEFAULT_BUDGET_BYTES;

pub const DEFAULT_BASE_URL: &str = "https://bsky.social/xrpc";

/// Most images a single post record can embed
pub const MAX_IMAGES_PER_POST: usize = 4;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Remote XRPC endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Per-request timeout applied by the HTTP client
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Hard ceiling for a single encoded image
    pub budget_bytes: usize,
    pub max_images: usize,
    pub max_concurrent_uploads: usize,
    /// Alt text attached to every embedded image
    pub alt_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Where the session file lives; tilde-expanded
    pub path: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            budget_bytes: DEFAULT_BUDGET_BYTES,
            max_images: 4,
            max_concurrent_uploads: 4,
            alt_text: "Image".to_string(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: "~/.config/skycast/session.json".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CredentialsConfig {
    /// Expand `~` in the configured path
    pub fn expand_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.service.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("service.base_url".to_string()).into());
        }
        if self.media.budget_bytes == 0 {
            return Err(invalid("media.budget_bytes", "must be greater than zero"));
        }
        let range = format!("must be between 1 and {}", MAX_IMAGES_PER_POST);
        if !(1..=MAX_IMAGES_PER_POST).contains(&self.media.max_images) {
            return Err(invalid("media.max_images", &range));
        }
        if !(1..=MAX_IMAGES_PER_POST).contains(&self.media.max_concurrent_uploads) {
            return Err(invalid("media.max_concurrent_uploads", &range));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::SkycastError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Resolve the configuration file path, honouring `SKYCAST_CONFIG`
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SKYCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("skycast").join("config.toml"))
}
