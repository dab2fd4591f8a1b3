//! The singleton user settings record and its partial-update form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use super::{EpochMillis, epoch_millis};

/// User-facing settings, stored as a single JSON row.
///
/// Missing fields fall back to their defaults when an older row is read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSettings {
    pub auto_clip: bool,
    pub shortcuts: ShortcutSettings,
    pub storage: StorageSettings,
    pub export: ExportSettings,
    pub appearance: AppearanceSettings,
    pub notifications: Toggle,
    pub context_menu: Toggle,
    pub quick_entry: Toggle,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            auto_clip: false,
            shortcuts: ShortcutSettings::default(),
            storage: StorageSettings::default(),
            export: ExportSettings::default(),
            appearance: AppearanceSettings::default(),
            notifications: Toggle::on(),
            context_menu: Toggle::on(),
            quick_entry: Toggle::on(),
            created_at: 0,
            updated_at: 0,
        }
    }
}

impl UserSettings {
    /// Default settings stamped as created at `now`.
    pub fn defaults_at(now: SystemTime) -> Self {
        let now = epoch_millis(now);
        Self {
            created_at: now,
            updated_at: now,
            ..Self::default()
        }
    }

    /// Merges `patch` one level deep: each given group overwrites only the leaves it names.
    pub fn apply(&mut self, patch: &UserSettingsPatch, now: SystemTime) {
        if let Some(auto_clip) = patch.auto_clip {
            self.auto_clip = auto_clip;
        }
        if let Some(p) = &patch.shortcuts {
            merge(&mut self.shortcuts.clip, &p.clip);
            merge(&mut self.shortcuts.manager, &p.manager);
        }
        if let Some(p) = &patch.storage {
            merge(&mut self.storage.max_clips, &p.max_clips);
        }
        if let Some(p) = &patch.export {
            merge(&mut self.export.auto_export, &p.auto_export);
            merge(&mut self.export.default_path, &p.default_path);
        }
        if let Some(p) = &patch.appearance {
            merge(&mut self.appearance.theme, &p.theme);
            merge(&mut self.appearance.language, &p.language);
        }
        if let Some(p) = &patch.notifications {
            merge(&mut self.notifications.enabled, &p.enabled);
        }
        if let Some(p) = &patch.context_menu {
            merge(&mut self.context_menu.enabled, &p.enabled);
        }
        if let Some(p) = &patch.quick_entry {
            merge(&mut self.quick_entry.enabled, &p.enabled);
        }
        self.updated_at = epoch_millis(now);
    }
}

fn merge<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortcutSettings {
    pub clip: String,
    pub manager: String,
}

impl Default for ShortcutSettings {
    fn default() -> Self {
        Self {
            clip: "Command+Shift+C".to_string(),
            manager: "Command+Shift+M".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageSettings {
    /// Zero or negative disables retention.
    pub max_clips: i64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { max_clips: 100 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportSettings {
    pub auto_export: bool,
    pub default_path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceSettings {
    pub theme: Theme,
    pub language: String,
}

impl Default for AppearanceSettings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            language: "zh-CN".to_string(),
        }
    }
}

/// Theme preference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    Auto,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
            Theme::Auto => write!(f, "auto"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toggle {
    pub enabled: bool,
}

impl Toggle {
    pub const fn on() -> Self {
        Self { enabled: true }
    }
}

impl Default for Toggle {
    fn default() -> Self {
        Self::on()
    }
}

/// Partial settings update. Absent groups and absent leaves keep their stored values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSettingsPatch {
    pub auto_clip: Option<bool>,
    pub shortcuts: Option<ShortcutPatch>,
    pub storage: Option<StoragePatch>,
    pub export: Option<ExportPatch>,
    pub appearance: Option<AppearancePatch>,
    pub notifications: Option<TogglePatch>,
    pub context_menu: Option<TogglePatch>,
    pub quick_entry: Option<TogglePatch>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortcutPatch {
    pub clip: Option<String>,
    pub manager: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoragePatch {
    pub max_clips: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportPatch {
    pub auto_export: Option<bool>,
    pub default_path: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearancePatch {
    pub theme: Option<Theme>,
    pub language: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TogglePatch {
    pub enabled: Option<bool>,
}

#[cfg(test)]
mod tests;
