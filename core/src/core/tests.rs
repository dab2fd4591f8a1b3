use super::*;
use crate::core::coordination::OpenOptions;
use crate::core::error::ErrorKind;
use std::time::Duration;
use tempfile::TempDir;

mod common {
    use super::*;

    pub(super) fn create_test_shelf() -> (ClipShelf, DatabaseHub, TempDir) {
        create_test_shelf_for(ContextKind::Background)
    }

    pub(super) fn create_test_shelf_for(context: ContextKind) -> (ClipShelf, DatabaseHub, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::new(temp_dir.path());
        let hub = DatabaseHub::new(config.db_path(), OpenOptions::default());
        let shelf = ClipShelf::open(&hub, &config, context).unwrap();
        (shelf, hub, temp_dir)
    }

    pub(super) fn make_clip_id(s: &str) -> ClipId {
        ClipId::try_from(s).unwrap()
    }

    pub(super) fn make_blob_id(s: &str) -> BlobId {
        BlobId::try_from(s).unwrap()
    }

    pub(super) fn draft_with_pdf(id: &str, pdf_id: Option<&str>) -> ClipDraft {
        ClipDraft {
            id: Some(make_clip_id(id)),
            title: id.to_string(),
            url: format!("https://example.com/{id}"),
            pdf_id: pdf_id.map(make_blob_id),
            ..ClipDraft::default()
        }
    }
}

mod clips {
    use super::common::*;
    use super::*;

    #[test]
    fn test_update_changes_only_title_and_updated_at() {
        let (shelf, _hub, _temp) = create_test_shelf();
        let t0 = SystemTime::now();
        let before = shelf
            .save_clip(draft_with_pdf("c1", Some("p1")), t0)
            .unwrap();

        let after = shelf
            .update_clip(
                &make_clip_id("c1"),
                ClipPatch::title("renamed"),
                t0 + Duration::from_secs(5),
            )
            .unwrap();

        assert_eq!(after.title, "renamed");
        assert!(after.updated_at > before.updated_at);
        assert_eq!(
            ClipRecord {
                title: before.title.clone(),
                updated_at: before.updated_at,
                ..after
            },
            before
        );
    }

    #[test]
    fn test_update_missing_reports_not_found() {
        let (shelf, _hub, _temp) = create_test_shelf();
        let err = shelf
            .update_clip(&make_clip_id("nope"), ClipPatch::title("x"), SystemTime::now())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_delete_removes_unshared_binary() {
        let (shelf, _hub, _temp) = create_test_shelf();
        let now = SystemTime::now();
        let pdf = shelf.store_binary(Some(make_blob_id("p1")), b"%PDF", now).unwrap();
        shelf.save_clip(draft_with_pdf("c1", Some("p1")), now).unwrap();

        assert!(shelf.delete_clip(&make_clip_id("c1")).unwrap());
        assert!(!shelf.delete_clip(&make_clip_id("c1")).unwrap());
        assert!(shelf.get_clip(&make_clip_id("c1")).unwrap().is_none());
        assert!(!shelf.binary_exists(&pdf));
    }

    #[test]
    fn test_delete_keeps_shared_binary() {
        let (shelf, _hub, _temp) = create_test_shelf();
        let now = SystemTime::now();
        let pdf = shelf.store_binary(Some(make_blob_id("p1")), b"%PDF", now).unwrap();
        shelf.save_clip(draft_with_pdf("c1", Some("p1")), now).unwrap();
        shelf.save_clip(draft_with_pdf("c2", Some("p1")), now).unwrap();

        shelf.delete_clip(&make_clip_id("c1")).unwrap();

        assert!(shelf.binary_exists(&pdf));
    }

    #[test]
    fn test_clear_removes_binaries_and_keeps_settings() {
        let (shelf, _hub, _temp) = create_test_shelf();
        let now = SystemTime::now();
        shelf.store_binary(Some(make_blob_id("p1")), b"1", now).unwrap();
        shelf.store_binary(Some(make_blob_id("p2")), b"2", now).unwrap();
        shelf.save_clip(draft_with_pdf("c1", Some("p1")), now).unwrap();
        shelf.save_clip(draft_with_pdf("c2", Some("p2")), now).unwrap();
        let settings = shelf.settings(now).unwrap();

        assert_eq!(shelf.clear_clips().unwrap(), 2);

        assert!(shelf.list_clips().unwrap().is_empty());
        assert_eq!(shelf.storage_usage().unwrap().blob_count, 0);
        assert_eq!(shelf.settings(now).unwrap(), settings);
    }
}

mod binaries {
    use super::common::*;
    use super::*;

    #[test]
    fn test_store_generates_id() {
        let (shelf, _hub, _temp) = create_test_shelf();
        let id = shelf.store_binary(None, b"%PDF", SystemTime::now()).unwrap();

        assert!(id.starts_with("pdf_"));
        assert_eq!(shelf.get_binary(&id).unwrap(), b"%PDF");
    }

    #[test]
    fn test_get_missing_reports_not_found() {
        let (shelf, _hub, _temp) = create_test_shelf();
        let err = shelf.get_binary(&make_blob_id("nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_capture_context_has_no_binary_storage() {
        let (shelf, _hub, _temp) = create_test_shelf_for(ContextKind::Capture);

        assert!(!shelf.has_blob_storage());
        let err = shelf
            .store_binary(None, b"%PDF", SystemTime::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);

        // Metadata still works from this context.
        shelf
            .save_clip(draft_with_pdf("c1", None), SystemTime::now())
            .unwrap();
        assert_eq!(shelf.list_clips().unwrap().len(), 1);
    }

    #[test]
    fn test_storage_usage_reports_quota() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::new(temp_dir.path());
        config.service.storage.capacity_bytes = Some(1 << 30);
        let hub = DatabaseHub::new(config.db_path(), OpenOptions::default());
        let shelf = ClipShelf::open(&hub, &config, ContextKind::Options).unwrap();
        shelf
            .store_binary(Some(make_blob_id("p1")), &[0; 100], SystemTime::now())
            .unwrap();

        let usage = shelf.storage_usage().unwrap();

        assert_eq!(usage.capacity_bytes, Some(1 << 30));
        assert_eq!(usage.blob_count, 1);
        assert!(usage.used_bytes >= 100);
    }
}

mod settings {
    use super::common::*;
    use super::*;
    use crate::types::ExportPatch;

    #[test]
    fn test_settings_materialized_on_first_read() {
        let (shelf, _hub, _temp) = create_test_shelf();
        let settings = shelf.settings(SystemTime::now()).unwrap();

        assert_eq!(settings.storage.max_clips, 100);
        assert_eq!(settings.appearance.language, "zh-CN");
    }

    #[test]
    fn test_save_keeps_untouched_leaves() {
        let (shelf, _hub, _temp) = create_test_shelf();
        let now = SystemTime::now();

        let saved = shelf
            .save_settings(
                &UserSettingsPatch {
                    export: Some(ExportPatch {
                        auto_export: Some(true),
                        ..ExportPatch::default()
                    }),
                    ..UserSettingsPatch::default()
                },
                now,
            )
            .unwrap();

        assert!(saved.export.auto_export);
        assert_eq!(saved.export.default_path, "");
        assert_eq!(saved.shortcuts.clip, "Command+Shift+C");
    }

    #[test]
    fn test_export_bundle() {
        let (shelf, _hub, _temp) = create_test_shelf();
        let now = SystemTime::now();
        shelf.save_clip(draft_with_pdf("c1", None), now).unwrap();

        let bundle = shelf.export(now).unwrap();

        assert_eq!(bundle.clip_list.len(), 1);
        assert_eq!(bundle.version, "1.0.0");
        assert_eq!(bundle.export_date, epoch_millis(now));
    }
}

mod maintenance {
    use super::common::*;
    use super::*;

    #[test]
    fn test_runs_only_when_due() {
        let (shelf, _hub, _temp) = create_test_shelf();
        let now = SystemTime::now();

        assert!(shelf.run_maintenance_if_due(now).unwrap().is_some());
        assert!(
            shelf
                .run_maintenance_if_due(now + Duration::from_secs(60))
                .unwrap()
                .is_none()
        );
        assert!(
            shelf
                .run_maintenance_if_due(now + Duration::from_secs(3600))
                .unwrap()
                .is_some()
        );
    }
}

mod reopen {
    use super::common::*;
    use super::*;

    #[test]
    fn test_operations_reopen_after_close() {
        let (shelf, _hub, _temp) = create_test_shelf();
        shelf.connection().close();

        shelf
            .save_clip(draft_with_pdf("c1", None), SystemTime::now())
            .unwrap();
        assert_eq!(shelf.list_clips().unwrap().len(), 1);
    }

    #[test]
    fn test_contexts_share_one_database() {
        let (background, hub, temp) = create_test_shelf();
        let config = Config::new(temp.path());
        let side_panel = ClipShelf::open(&hub, &config, ContextKind::SidePanel).unwrap();

        background
            .save_clip(draft_with_pdf("c1", None), SystemTime::now())
            .unwrap();

        assert!(side_panel.get_clip(&make_clip_id("c1")).unwrap().is_some());
        assert_eq!(hub.open_connections(), 2);
    }
}
