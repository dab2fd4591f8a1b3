use super::ServiceConfig;
use std::time::Duration;

/// Settings passed to retention sweeps.
#[derive(Clone, Copy, Debug)]
pub struct RetentionConfig {
    /// Used when no settings record exists yet.
    pub default_max_clips: i64,
    /// Unreferenced binaries younger than this are left alone; their clip may not be
    /// committed yet.
    pub orphan_grace: Duration,
    pub temporary_url_ttl: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for RetentionConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            default_max_clips: config.storage.default_max_clips,
            orphan_grace: Duration::from_secs(config.maintenance.orphan_grace_secs),
            temporary_url_ttl: Duration::from_secs(config.maintenance.temporary_url_ttl_secs),
        }
    }
}
