use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) mod config;
pub use config::{
    Config, CoordinationConfig, MaintenanceConfig, RetentionConfig, ServiceConfig,
    ServiceConfigError, StorageConfig,
};

pub(crate) mod id;
pub use id::{BlobId, ClipId, MAX_ID_LENGTH};

pub(crate) mod clip;
pub use clip::{ClipDraft, ClipPatch, ClipRecord, MAX_CONTENT_CHARS, ValidationError};

pub(crate) mod settings;
pub use settings::{
    AppearancePatch, AppearanceSettings, ExportPatch, ExportSettings, ShortcutPatch,
    ShortcutSettings, StoragePatch, StorageSettings, Theme, Toggle, TogglePatch, UserSettings,
    UserSettingsPatch,
};

pub(crate) mod created_key;
pub use created_key::CreatedKey;

pub(crate) mod metadata;

/// Milliseconds since the Unix epoch; the timestamp unit of every persisted record.
pub type EpochMillis = u64;

pub fn epoch_millis(time: SystemTime) -> EpochMillis {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as EpochMillis)
        .unwrap_or(0)
}

pub fn from_epoch_millis(millis: EpochMillis) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}
