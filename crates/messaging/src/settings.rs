//! Messenger settings
//!
//! Settings are loaded using the following priority:
//! 1. JSON file (~/.config/textline/settings.json)
//! 2. Environment variable overrides
//! 3. Built-in defaults for anything left unset

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;
use crate::notify::RetryPolicy;

/// Settings filename in the Textline config directory
pub const SETTINGS_FILE: &str = "settings.json";

const ENV_CACHE_CAPACITY: &str = "TEXTLINE_CACHE_CAPACITY";
const ENV_NOTIFICATIONS: &str = "TEXTLINE_NOTIFICATIONS";

/// New-message notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub retry_delay_ms: u64,
    pub max_retries: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            enabled: true,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            retry_delay_ms: policy.retry_delay.as_millis() as u64,
            max_retries: policy.max_retries,
        }
    }
}

impl From<&NotificationSettings> for RetryPolicy {
    fn from(settings: &NotificationSettings) -> Self {
        Self {
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            max_retries: settings.max_retries,
        }
    }
}

/// Messenger-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Entries kept by each of the conversation and message caches
    pub cache_capacity: usize,
    /// Background hydration workers
    pub hydration_threads: usize,
    pub notifications: NotificationSettings,
    /// SQLite database path; the data directory is used when unset
    pub database: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CAPACITY,
            hydration_threads: 2,
            notifications: NotificationSettings::default(),
            database: None,
        }
    }
}

impl Settings {
    /// Load settings from the config directory and the environment
    pub fn load() -> Result<Self> {
        let mut settings = if config::config_exists(SETTINGS_FILE) {
            config::load_json(SETTINGS_FILE)?
        } else {
            Self::default()
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Load settings from a specific JSON file, without environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse settings JSON")
    }

    /// Save settings to the config directory
    pub fn save(&self) -> Result<()> {
        config::save_json(SETTINGS_FILE, self)
    }

    /// Save settings to a specific JSON file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        config::save_json_file(path, self)
    }

    /// Apply overrides read through `var`
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = var(ENV_CACHE_CAPACITY) {
            match value.trim().parse::<usize>() {
                Ok(capacity) if capacity > 0 => self.cache_capacity = capacity,
                _ => warn!("Ignoring invalid {}={:?}", ENV_CACHE_CAPACITY, value),
            }
        }

        if let Some(value) = var(ENV_NOTIFICATIONS) {
            match parse_flag(&value) {
                Some(enabled) => self.notifications.enabled = enabled,
                None => warn!("Ignoring invalid {}={:?}", ENV_NOTIFICATIONS, value),
            }
        }
    }

    /// Database path, falling back to the Textline data directory
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database
            .clone()
            .or_else(|| config::data_dir().map(|dir| dir.join("messages.sqlite")))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.notifications)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
