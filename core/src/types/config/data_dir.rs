use std::path::PathBuf;

use super::ServiceConfig;

/// On-disk layout and tunables for one data directory.
#[derive(Clone, Debug)]
pub struct Config {
    pub base_path: PathBuf,
    pub service: ServiceConfig,
}

impl Config {
    /// Config for `base_path` with default tunables.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            service: ServiceConfig::default(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.base_path.join("clipshelf.redb")
    }

    pub fn blobs_path(&self) -> PathBuf {
        self.base_path.join("blobs")
    }

    pub fn temporary_path(&self) -> PathBuf {
        self.base_path.join("temporary")
    }

    pub fn service_config_path(&self) -> PathBuf {
        ServiceConfig::path(&self.base_path)
    }
}
