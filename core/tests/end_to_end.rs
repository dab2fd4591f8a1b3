use clipshelf_core::core::error::ErrorKind;
use clipshelf_core::types::{BlobId, ClipDraft, ClipId, Config, StoragePatch, UserSettingsPatch};
use clipshelf_core::{ClipShelf, ContextKind, DatabaseHub, OpenOptions, RequestRouter};
use serde_json::{Value, json};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn open_shelf(temp: &TempDir, context: ContextKind) -> (ClipShelf, DatabaseHub) {
    let config = Config::new(temp.path());
    let hub = DatabaseHub::new(config.db_path(), OpenOptions::default());
    let shelf = ClipShelf::open(&hub, &config, context).unwrap();
    (shelf, hub)
}

fn send(router: &mut RequestRouter, request: Value) -> Value {
    serde_json::to_value(router.handle_json(&request.to_string(), SystemTime::now())).unwrap()
}

/// Verify a clip saved with `pdfId` is listed, and deleting it removes both the row and the binary.
#[test]
fn test_capture_list_delete() {
    let temp = TempDir::new().unwrap();
    let (shelf, _hub) = open_shelf(&temp, ContextKind::Background);
    let mut router = RequestRouter::new(shelf);

    let stored = send(
        &mut router,
        json!({ "action": "storeBinary", "data": { "id": "p1", "bytes": [37, 80, 68, 70] } }),
    );
    assert_eq!(stored["success"], true);

    let saved = send(
        &mut router,
        json!({ "action": "saveClip", "data": { "title": "Page", "url": "https://a.example", "pdfId": "p1" } }),
    );
    let id = saved["data"]["id"].clone();

    let listed = send(&mut router, json!({ "action": "listClips" }));
    let clips = listed["data"].as_array().unwrap();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0]["id"], id);
    assert_eq!(clips[0]["pdfId"], "p1");

    send(&mut router, json!({ "action": "deleteClip", "data": { "id": id } }));

    let fetched = send(&mut router, json!({ "action": "getClip", "data": { "id": id } }));
    assert_eq!(fetched["errorKind"], "NotFound");
    let binary = send(&mut router, json!({ "action": "getBinary", "data": { "id": "p1" } }));
    assert_eq!(binary["errorKind"], "NotFound");
}

/// Verify an orphaned binary (its clip removed without the router) is reclaimed by maintenance.
#[test]
fn test_orphan_reclaimed_by_maintenance() {
    let temp = TempDir::new().unwrap();
    let (shelf, hub) = open_shelf(&temp, ContextKind::Background);
    let now = SystemTime::now();
    let pdf = BlobId::try_from("p1").unwrap();
    shelf.store_binary(Some(pdf.clone()), b"%PDF", now).unwrap();

    // The capture context cannot touch binaries, so its delete leaves `p1` behind.
    let config = Config::new(temp.path());
    let capture = ClipShelf::open(&hub, &config, ContextKind::Capture).unwrap();
    capture
        .save_clip(
            ClipDraft {
                id: Some(ClipId::try_from("c1").unwrap()),
                url: "https://a.example".to_string(),
                pdf_id: Some(pdf.clone()),
                ..ClipDraft::default()
            },
            now,
        )
        .unwrap();
    capture.delete_clip(&ClipId::try_from("c1").unwrap()).unwrap();
    assert!(shelf.binary_exists(&pdf));

    let outcome = shelf
        .run_maintenance(now + Duration::from_secs(601))
        .unwrap();

    assert_eq!(outcome.orphans_removed, 1);
    assert!(!shelf.binary_exists(&pdf));
}

/// Verify retention keeps the newest `maxClips` clips and removes the evicted clip's binary.
#[test]
fn test_retention_by_created_at() {
    let temp = TempDir::new().unwrap();
    let (shelf, _hub) = open_shelf(&temp, ContextKind::Background);
    let now = SystemTime::now();
    shelf
        .save_settings(
            &UserSettingsPatch {
                storage: Some(StoragePatch { max_clips: Some(2) }),
                ..UserSettingsPatch::default()
            },
            now,
        )
        .unwrap();

    for created_at in 1..=3u64 {
        let pdf = shelf
            .store_binary(Some(BlobId::try_from(format!("p{created_at}")).unwrap()), b"%PDF", now)
            .unwrap();
        shelf
            .save_clip(
                ClipDraft {
                    id: Some(ClipId::try_from(format!("c{created_at}")).unwrap()),
                    url: format!("https://example.com/{created_at}"),
                    pdf_id: Some(pdf),
                    created_at: Some(created_at),
                    ..ClipDraft::default()
                },
                now,
            )
            .unwrap();
    }

    let outcome = shelf.run_maintenance(now).unwrap();

    assert_eq!(outcome.evicted, 1);
    let remaining: Vec<u64> = shelf
        .list_clips()
        .unwrap()
        .iter()
        .map(|c| c.created_at)
        .collect();
    assert_eq!(remaining, [3, 2]);
    assert!(!shelf.binary_exists(&BlobId::try_from("p1").unwrap()));
    assert!(shelf.binary_exists(&BlobId::try_from("p2").unwrap()));
}

/// Verify a write from one context is visible to another context's next read.
#[test]
fn test_cross_context_visibility() {
    let temp = TempDir::new().unwrap();
    let (background, hub) = open_shelf(&temp, ContextKind::Background);
    let config = Config::new(temp.path());
    let options = ClipShelf::open(&hub, &config, ContextKind::Options).unwrap();

    options
        .save_settings(
            &UserSettingsPatch {
                auto_clip: Some(true),
                ..UserSettingsPatch::default()
            },
            SystemTime::now(),
        )
        .unwrap();

    assert!(background.settings(SystemTime::now()).unwrap().auto_clip);
}

/// Verify the capture context reports `StorageUnavailable` instead of dropping binary writes.
#[test]
fn test_capture_context_binary_write_fails_fast() {
    let temp = TempDir::new().unwrap();
    let (capture, _hub) = open_shelf(&temp, ContextKind::Capture);

    let err = capture
        .store_binary(None, b"%PDF", SystemTime::now())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
}

/// Verify data survives closing every handle and reopening the directory.
#[test]
fn test_reopen_preserves_data() {
    let temp = TempDir::new().unwrap();
    {
        let (shelf, _hub) = open_shelf(&temp, ContextKind::Background);
        shelf
            .save_clip(
                ClipDraft {
                    id: Some(ClipId::try_from("c1").unwrap()),
                    url: "https://a.example".to_string(),
                    ..ClipDraft::default()
                },
                SystemTime::now(),
            )
            .unwrap();
    }

    let (shelf, _hub) = open_shelf(&temp, ContextKind::Background);
    assert!(shelf.get_clip(&ClipId::try_from("c1").unwrap()).unwrap().is_some());
}
