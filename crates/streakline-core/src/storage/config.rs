//! TOML-based engine configuration.
//!
//! Stores tunables for:
//! - XP per completion and the level threshold
//! - Consistency window, level thresholds, trend and heat-map spans
//! - Reminder hour learning and danger-level cut-offs
//! - Dispatch record retention
//! - The periodic wake-up (timeouts, delivery command)
//!
//! Configuration is stored at `~/.config/streakline/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::dispatch::DispatchConfig;
use crate::error::{ConfigError, Result};
use crate::leveling::LevelingConfig;
use crate::scheduler::SchedulerConfig;
use crate::stats::StatsConfig;

const MAX_TREND_DAYS: u64 = 366;
const MAX_HEATMAP_WEEKS: u64 = 520;
const MAX_RETENTION_DAYS: u64 = 3650;
const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Periodic wake-up configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeConfig {
    /// Give up on a cycle after this many seconds; the next wake-up retries.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Kill a delivery command that has not exited after this many seconds.
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
    /// Shell command that receives each nudge as JSON on stdin. When unset,
    /// nudges are printed as JSON lines on stdout.
    #[serde(default)]
    pub delivery_command: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_delivery_timeout_secs() -> u64 {
    10
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            delivery_command: None,
        }
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/streakline/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub leveling: LevelingConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub wake: WakeConfig,
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    // optional fields are serialized as null; accept any string
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Reject combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if self.leveling.xp_threshold == 0 {
            return Err(invalid("leveling.xp_threshold", "must be greater than zero"));
        }
        if self.stats.medium_threshold > self.stats.high_threshold {
            return Err(invalid(
                "stats.medium_threshold",
                "must not exceed stats.high_threshold",
            ));
        }
        let s = &self.scheduler;
        if s.default_hour > 23 || s.earliest_hour > 23 {
            return Err(invalid("scheduler", "hours must be within 0-23"));
        }
        if !(s.moderate_from_hour <= s.high_from_hour && s.high_from_hour <= s.critical_from_hour) {
            return Err(invalid(
                "scheduler",
                "danger hours must be ordered moderate <= high <= critical",
            ));
        }

        let ranges = [
            ("stats.trend_window_days", u64::from(self.stats.trend_window_days), 1, MAX_TREND_DAYS),
            ("stats.heatmap_weeks", u64::from(self.stats.heatmap_weeks), 1, MAX_HEATMAP_WEEKS),
            ("dispatch.retention_days", u64::from(self.dispatch.retention_days), 0, MAX_RETENTION_DAYS),
            ("wake.timeout_secs", self.wake.timeout_secs, 1, MAX_TIMEOUT_SECS),
            ("wake.delivery_timeout_secs", self.wake.delivery_timeout_secs, 1, MAX_TIMEOUT_SECS),
        ];
        for (key, value, min, max) in ranges {
            if !(min..=max).contains(&value) {
                return Err(invalid(key, &format!("must be within {min}-{max}")));
            }
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without persisting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or leaves the config invalid.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and save. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.save()
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default config");
            Self::default()
        })
    }
}
