mod data_dir;
mod retention;
mod service;

pub use data_dir::Config;
pub use retention::RetentionConfig;
pub use service::{
    CoordinationConfig, MaintenanceConfig, ServiceConfig, ServiceConfigError, StorageConfig,
};
