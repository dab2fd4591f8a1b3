use super::*;
use std::time::{Duration, UNIX_EPOCH};

fn at(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}

mod defaults {
    use super::*;

    #[test]
    fn test_default_values() {
        let settings = UserSettings::default();
        assert!(!settings.auto_clip);
        assert_eq!(settings.shortcuts.clip, "Command+Shift+C");
        assert_eq!(settings.shortcuts.manager, "Command+Shift+M");
        assert_eq!(settings.storage.max_clips, 100);
        assert_eq!(settings.appearance.theme, Theme::Auto);
        assert_eq!(settings.appearance.language, "zh-CN");
        assert!(settings.notifications.enabled);
        assert!(settings.context_menu.enabled);
        assert!(settings.quick_entry.enabled);
    }

    #[test]
    fn test_defaults_at_stamps_both_timestamps() {
        let settings = UserSettings::defaults_at(at(500));
        assert_eq!(settings.created_at, 500);
        assert_eq!(settings.updated_at, 500);
    }

    #[test]
    fn test_missing_groups_deserialize_to_defaults() {
        let settings: UserSettings =
            serde_json::from_str(r#"{"autoClip": true, "storage": {}}"#).unwrap();
        assert!(settings.auto_clip);
        assert_eq!(settings.storage.max_clips, 100);
        assert_eq!(settings.shortcuts, ShortcutSettings::default());
    }
}

mod merge {
    use super::*;

    #[test]
    fn test_patch_keeps_sibling_leaves() {
        let mut settings = UserSettings::defaults_at(at(1));
        let patch = UserSettingsPatch {
            shortcuts: Some(ShortcutPatch {
                clip: Some("Ctrl+Shift+X".to_string()),
                manager: None,
            }),
            ..Default::default()
        };

        settings.apply(&patch, at(2));

        assert_eq!(settings.shortcuts.clip, "Ctrl+Shift+X");
        assert_eq!(settings.shortcuts.manager, "Command+Shift+M");
    }

    #[test]
    fn test_patch_keeps_untouched_groups() {
        let mut settings = UserSettings::defaults_at(at(1));
        settings.appearance.theme = Theme::Dark;

        let patch = UserSettingsPatch {
            storage: Some(StoragePatch { max_clips: Some(5) }),
            ..Default::default()
        };
        settings.apply(&patch, at(2));

        assert_eq!(settings.storage.max_clips, 5);
        assert_eq!(settings.appearance.theme, Theme::Dark);
        assert_eq!(settings.appearance.language, "zh-CN");
    }

    #[test]
    fn test_apply_refreshes_updated_at_only() {
        let mut settings = UserSettings::defaults_at(at(1));
        settings.apply(&UserSettingsPatch::default(), at(9));
        assert_eq!(settings.created_at, 1);
        assert_eq!(settings.updated_at, 9);
    }

    #[test]
    fn test_patch_from_camel_case_json() {
        let patch: UserSettingsPatch =
            serde_json::from_str(r#"{"quickEntry": {"enabled": false}, "contextMenu": {}}"#)
                .unwrap();
        let mut settings = UserSettings::defaults_at(at(1));
        settings.apply(&patch, at(2));

        assert!(!settings.quick_entry.enabled);
        assert!(settings.context_menu.enabled);
    }
}
