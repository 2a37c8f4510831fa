//! Client configuration (~/.wirefeed/config.json).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dates::WeekStart;
use crate::error::FeedError;
use crate::persist::default_state_path;
use crate::store::PAGE_CAP;
use crate::transport::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Section searched and used for topic filtering (`wire`, `agenda`).
    #[serde(default = "default_section")]
    pub section: String,
    #[serde(default)]
    pub user: Option<String>,
    /// IANA timezone name used for local-day math.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub week_start: WeekStart,
    #[serde(default = "default_page_cap")]
    pub page_cap: usize,
    #[serde(default = "default_click_delay_ms")]
    pub click_delay_ms: u64,
    #[serde(default = "default_preview_delay_ms")]
    pub preview_delay_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Override for the local state file.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

fn default_base_url() -> String {
    "http://localhost:5050".to_string()
}

fn default_section() -> String {
    "wire".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_page_cap() -> usize {
    PAGE_CAP
}

fn default_click_delay_ms() -> u64 {
    200
}

fn default_preview_delay_ms() -> u64 {
    500
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            section: default_section(),
            user: None,
            timezone: default_timezone(),
            week_start: WeekStart::default(),
            page_cap: default_page_cap(),
            click_delay_ms: default_click_delay_ms(),
            preview_delay_ms: default_preview_delay_ms(),
            retry: RetryPolicy::default(),
            state_path: None,
        }
    }
}

impl FeedConfig {
    pub fn timezone(&self) -> Result<Tz, FeedError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| FeedError::Timezone(self.timezone.clone()))
    }

    pub fn click_delay(&self) -> Duration {
        Duration::from_millis(self.click_delay_ms)
    }

    pub fn preview_delay(&self) -> Duration {
        Duration::from_millis(self.preview_delay_ms)
    }

    pub fn state_path(&self) -> Result<PathBuf, FeedError> {
        match &self.state_path {
            Some(path) => Ok(path.clone()),
            None => default_state_path(),
        }
    }

    fn validate(&self) -> Result<(), FeedError> {
        if self.page_cap == 0 {
            return Err(FeedError::Config("pageCap must be at least 1".to_string()));
        }
        if self.section.trim().is_empty() {
            return Err(FeedError::Config("section must not be empty".to_string()));
        }
        self.timezone()?;
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, FeedError> {
    let home = dirs::home_dir()
        .ok_or_else(|| FeedError::Config("Could not find home directory".to_string()))?;
    Ok(home.join(".wirefeed").join("config.json"))
}

/// Load and validate the config at `path`.
pub fn load_config(path: &Path) -> Result<FeedConfig, FeedError> {
    if !path.exists() {
        return Err(FeedError::ConfigNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    let config: FeedConfig = serde_json::from_str(&content)
        .map_err(|e| FeedError::Config(format!("Failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// Load the config at `path`, or the defaults when the file does not exist.
pub fn load_config_or_default(path: &Path) -> Result<FeedConfig, FeedError> {
    match load_config(path) {
        Err(FeedError::ConfigNotFound(missing)) => {
            log::info!("No config at {}, using defaults", missing.display());
            Ok(FeedConfig::default())
        }
        other => other,
    }
}
