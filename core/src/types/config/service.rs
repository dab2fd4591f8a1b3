use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Process tunables, persisted as service.toml in the data directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
    pub maintenance: MaintenanceConfig,
    pub storage: StorageConfig,
    pub coordination: CoordinationConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            maintenance: MaintenanceConfig::default(),
            storage: StorageConfig::default(),
            coordination: CoordinationConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Returns the config file path within the given data directory.
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join("service.toml")
    }

    /// Loads config from a TOML file. Returns default config if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, ServiceConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ServiceConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates config values and returns list of validation errors.
    /// Returns empty vec if config is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.maintenance.interval_secs == 0 {
            errors.push("maintenance.interval_secs must be at least 1".to_string());
        }

        if self.maintenance.temporary_url_ttl_secs == 0 {
            errors.push("maintenance.temporary_url_ttl_secs must be at least 1".to_string());
        }

        if self.coordination.open_timeout_ms < self.coordination.blocked_after_ms {
            errors.push(
                "coordination.open_timeout_ms must not be shorter than blocked_after_ms"
                    .to_string(),
            );
        }

        errors
    }

    /// Returns a validated config, replacing invalid values with defaults.
    pub fn with_defaults_for_invalid(&self) -> Self {
        let defaults = Self::default();
        let mut config = self.clone();

        if config.maintenance.interval_secs == 0 {
            config.maintenance.interval_secs = defaults.maintenance.interval_secs;
        }
        if config.maintenance.temporary_url_ttl_secs == 0 {
            config.maintenance.temporary_url_ttl_secs =
                defaults.maintenance.temporary_url_ttl_secs;
        }
        if config.coordination.open_timeout_ms < config.coordination.blocked_after_ms {
            config.coordination = defaults.coordination;
        }

        config
    }
}

/// Background sweep scheduling.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub interval_secs: u64,
    pub orphan_grace_secs: u64,
    pub temporary_url_ttl_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60 * 60,
            orphan_grace_secs: 10 * 60,
            temporary_url_ttl_secs: 5 * 60,
        }
    }
}

impl MaintenanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Storage limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub default_max_clips: i64,
    /// Reported capacity; `None` reports an unbounded quota.
    pub capacity_bytes: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_max_clips: 100,
            capacity_bytes: None,
        }
    }
}

/// Schema-upgrade coordination timeouts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// How long an upgrade waits for old connections before reporting itself blocked.
    pub blocked_after_ms: u64,
    /// How long an upgrade waits in total before the open fails.
    pub open_timeout_ms: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            blocked_after_ms: 2_000,
            open_timeout_ms: 30_000,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Errors that can occur when loading or saving config.
#[derive(Debug, Error)]
pub enum ServiceConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
