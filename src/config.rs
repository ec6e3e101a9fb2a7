//! Configuration for the monitor process.
//!
//! Loaded from TOML (`paths::config_file()` by default). Every section has
//! defaults, so an empty file is valid; targets can also come from the
//! command line as `entity[:interval_minutes]`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};
use crate::monitor::MonitorOptions;
use crate::source::Category;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Where per-entity state and media are written.
    pub storage: StorageConfig,
    /// Remote profile gateway.
    pub gateway: GatewayConfig,
    /// Cycle behaviour.
    pub monitor: MonitorConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Profiles to watch.
    pub targets: Vec<TargetConfig>,
}

/// Storage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for `<entity>_data/` directories (None = `paths::output_dir()`).
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(crate::paths::output_dir)
    }
}

/// Profile gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL, e.g. `http://127.0.0.1:8787`.
    pub base_url: String,
    /// Bearer token for the gateway session.
    pub token: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787".to_owned(),
            token: None,
            timeout_secs: 30,
        }
    }
}

/// Cycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval for targets that do not set their own.
    pub default_interval_minutes: u64,
    pub download_highlights: bool,
    pub download_stories: bool,
    /// Archive the whole profile after every cycle.
    pub snapshot_profile: bool,
    /// Watchdog for a stuck cycle (None = no limit).
    pub cycle_timeout_secs: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_interval_minutes: 30,
            download_highlights: true,
            download_stories: true,
            snapshot_profile: true,
            cycle_timeout_secs: None,
        }
    }
}

impl MonitorConfig {
    pub fn enabled_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|category| match category {
                Category::Highlights => self.download_highlights,
                Category::Stories => self.download_stories,
            })
            .collect()
    }

    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            categories: self.enabled_categories(),
            snapshot_profile: self.snapshot_profile,
        }
    }

    pub fn cycle_timeout(&self) -> Option<Duration> {
        self.cycle_timeout_secs.map(Duration::from_secs)
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write a daily rolling log file.
    pub file: bool,
    /// Log directory (None = `paths::logs_dir()`).
    pub directory: Option<PathBuf>,
}

/// One profile to watch, as written by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub entity: String,
    #[serde(default)]
    pub interval_minutes: Option<u64>,
}

impl FromStr for TargetConfig {
    type Err = WatchError;

    /// Parse `entity` or `entity:minutes`.
    fn from_str(s: &str) -> Result<Self> {
        let (entity, interval_minutes) = match s.split_once(':') {
            Some((entity, minutes)) => {
                let minutes = minutes.trim().parse::<u64>().map_err(|_| {
                    WatchError::Config(format!("invalid interval in target {s:?}"))
                })?;
                (entity, Some(minutes))
            }
            None => (s, None),
        };
        let entity = entity.trim();
        validate_entity_id(entity)?;
        Ok(Self {
            entity: entity.to_owned(),
            interval_minutes,
        })
    }
}

/// A validated target with its effective interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub entity: String,
    pub interval: Duration,
}

/// Reject ids that cannot safely name a directory.
pub fn validate_entity_id(entity: &str) -> Result<()> {
    if entity.is_empty() {
        return Err(WatchError::Config("entity id must not be empty".to_owned()));
    }
    if entity == "." || entity == ".." {
        return Err(WatchError::Config(format!("invalid entity id {entity:?}")));
    }
    if entity
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control())
    {
        return Err(WatchError::Config(format!(
            "entity id {entity:?} contains a path separator or whitespace"
        )));
    }
    Ok(())
}

impl WatchConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WatchError::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| WatchError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Explicit path must exist; the default path may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = crate::paths::config_file();
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| WatchError::Config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Add command-line targets; a CLI target replaces a configured one with
    /// the same entity id.
    pub fn merge_targets(&mut self, extra: Vec<TargetConfig>) {
        for target in extra {
            match self.targets.iter_mut().find(|t| t.entity == target.entity) {
                Some(existing) => *existing = target,
                None => self.targets.push(target),
            }
        }
    }

    /// Validate everything and resolve targets to effective intervals.
    pub fn resolve_targets(&self) -> Result<Vec<Target>> {
        self.validate()?;
        if self.targets.is_empty() {
            return Err(WatchError::Config("no targets configured".to_owned()));
        }

        let mut resolved: Vec<Target> = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            validate_entity_id(&target.entity)?;
            if resolved.iter().any(|t| t.entity == target.entity) {
                return Err(WatchError::Config(format!(
                    "target {} listed twice",
                    target.entity
                )));
            }
            let minutes = target
                .interval_minutes
                .unwrap_or(self.monitor.default_interval_minutes);
            if minutes == 0 {
                return Err(WatchError::Config(format!(
                    "interval for {} must be at least one minute",
                    target.entity
                )));
            }
            resolved.push(Target {
                entity: target.entity.clone(),
                interval: Duration::from_secs(minutes.saturating_mul(60)),
            });
        }
        Ok(resolved)
    }

    fn validate(&self) -> Result<()> {
        if reqwest::Url::parse(&self.gateway.base_url).is_err() {
            return Err(WatchError::Config(format!(
                "gateway.base_url {:?} is not a valid URL",
                self.gateway.base_url
            )));
        }
        if self.gateway.timeout_secs == 0 {
            return Err(WatchError::Config(
                "gateway.timeout_secs must be positive".to_owned(),
            ));
        }
        if self.monitor.cycle_timeout_secs == Some(0) {
            return Err(WatchError::Config(
                "monitor.cycle_timeout_secs must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}
