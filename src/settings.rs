use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000/api";
const MIN_REQUEST_TIMEOUT_MS: u64 = 100;
const MAX_REQUEST_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const MIN_SNAP_MINUTES: u32 = 1;
const MAX_SNAP_MINUTES: u32 = 60;
const DEFAULT_SNAP_MINUTES: u32 = 15;
const MIN_DURATION_MINUTES: u32 = 5;
const MAX_DURATION_MINUTES: u32 = 1_440;
const DEFAULT_DURATION_MINUTES: u32 = 60;

/// What a cross-column move writes back besides the moved task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiblingPolicy {
    /// Only the moved task is persisted; siblings are renumbered locally.
    MovedOnly,
    /// Siblings whose position changed are persisted as well.
    Renumber,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub snap_minutes: u32,
    pub default_duration_minutes: u32,
    pub persist_sibling_positions: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            snap_minutes: DEFAULT_SNAP_MINUTES,
            default_duration_minutes: DEFAULT_DURATION_MINUTES,
            persist_sibling_positions: false,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("planboard");
        path.push("settings.toml");
        Some(path)
    }

    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        Self::load_from_path(&path)
    }

    fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(mut settings) => {
                    settings.validate();
                    settings
                }
                Err(error) => {
                    warn!(
                        "failed to parse settings config '{}': {}",
                        path.display(),
                        error
                    );
                    Self::default()
                }
            },
            Err(error) => {
                warn!(
                    "failed to read settings config '{}': {}",
                    path.display(),
                    error
                );
                Self::default()
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path().ok_or_else(|| anyhow!("unable to determine config path"))?;
        self.save_to_path(&path)
    }

    fn save_to_path(&self, path: &Path) -> anyhow::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("invalid settings config path"))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory '{}'", parent.display()))?;

        let mut validated = self.clone();
        validated.validate();
        let contents =
            toml::to_string_pretty(&validated).context("failed to serialize settings to TOML")?;

        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("invalid settings config file name"))?
            .to_string_lossy()
            .to_string();
        let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

        fs::write(&tmp_path, contents).with_context(|| {
            format!(
                "failed to write temporary settings file '{}'",
                tmp_path.display()
            )
        })?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "failed to atomically rename settings file '{}' to '{}'",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sibling_policy(&self) -> SiblingPolicy {
        if self.persist_sibling_positions {
            SiblingPolicy::Renumber
        } else {
            SiblingPolicy::MovedOnly
        }
    }

    pub fn validate(&mut self) {
        self.request_timeout_ms = self
            .request_timeout_ms
            .clamp(MIN_REQUEST_TIMEOUT_MS, MAX_REQUEST_TIMEOUT_MS);
        self.snap_minutes = self.snap_minutes.clamp(MIN_SNAP_MINUTES, MAX_SNAP_MINUTES);
        self.default_duration_minutes = self
            .default_duration_minutes
            .clamp(MIN_DURATION_MINUTES, MAX_DURATION_MINUTES);

        let trimmed = self.api_base_url.trim().trim_end_matches('/');
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            self.api_base_url = trimmed.to_string();
        } else {
            warn!(
                "invalid api_base_url '{}' in settings config; falling back to {}",
                self.api_base_url, DEFAULT_API_BASE_URL
            );
            self.api_base_url = DEFAULT_API_BASE_URL.to_string();
        }
    }
}
