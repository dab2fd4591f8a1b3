use super::*;
use tempfile::TempDir;

fn create_test_storage() -> (BlobStorage, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let storage = BlobStorage::new(
        temp_dir.path().join("blobs"),
        temp_dir.path().join("temporary"),
    );
    (storage, temp_dir)
}

fn make_id(s: &str) -> BlobId {
    BlobId::try_from(s).unwrap()
}

mod payloads {
    use super::*;

    #[test]
    fn test_store_and_get_round_trip() {
        let (storage, _temp) = create_test_storage();
        let id = make_id("pdf_1_abc");
        let bytes = b"%PDF-1.7 body".to_vec();

        assert_eq!(storage.store(&id, &bytes).unwrap(), bytes.len() as u64);
        assert_eq!(storage.get(&id).unwrap(), Some(bytes));
    }

    #[test]
    fn test_empty_payload() {
        let (storage, _temp) = create_test_storage();
        let id = make_id("empty");

        storage.store(&id, &[]).unwrap();

        assert!(storage.exists(&id));
        assert_eq!(storage.get(&id).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_large_payload_is_bit_identical() {
        let (storage, _temp) = create_test_storage();
        let id = make_id("large");
        let bytes: Vec<u8> = (0..16 * 1024 * 1024).map(|i| (i % 251) as u8).collect();

        storage.store(&id, &bytes).unwrap();

        assert!(storage.get(&id).unwrap().unwrap() == bytes);
    }

    #[test]
    fn test_get_missing_is_none() {
        let (storage, _temp) = create_test_storage();
        assert_eq!(storage.get(&make_id("missing")).unwrap(), None);
    }

    #[test]
    fn test_store_leaves_no_partial_files() {
        let (storage, temp) = create_test_storage();
        storage.store(&make_id("a"), b"abc").unwrap();

        let names: Vec<_> = std::fs::read_dir(temp.path().join("blobs"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, ["a.pdf"]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (storage, _temp) = create_test_storage();
        let id = make_id("a");
        storage.store(&id, b"abc").unwrap();

        assert!(storage.delete(&id).unwrap());
        assert!(!storage.delete(&id).unwrap());
        assert!(!storage.exists(&id));
    }

    #[test]
    fn test_usage_counts_committed_payloads() {
        let (storage, temp) = create_test_storage();
        storage.store(&make_id("a"), &[0; 10]).unwrap();
        storage.store(&make_id("b"), &[0; 5]).unwrap();
        std::fs::write(temp.path().join("blobs/c.pdf.123.partial"), [0; 100]).unwrap();

        assert_eq!(
            storage.usage().unwrap(),
            BlobUsage {
                total_bytes: 15,
                count: 2
            }
        );
    }

    #[test]
    fn test_usage_of_fresh_storage_is_zero() {
        let (storage, _temp) = create_test_storage();
        assert_eq!(storage.usage().unwrap(), BlobUsage::default());
    }

    #[test]
    fn test_remove_stale_partials_respects_grace() {
        let (storage, temp) = create_test_storage();
        storage.store(&make_id("a"), b"abc").unwrap();
        let partial = temp.path().join("blobs/b.pdf.123.partial");
        std::fs::write(&partial, b"half").unwrap();
        let now = SystemTime::now();

        assert_eq!(
            storage
                .remove_stale_partials(now, Duration::from_secs(600))
                .unwrap(),
            0
        );
        assert_eq!(
            storage
                .remove_stale_partials(now + Duration::from_secs(601), Duration::from_secs(600))
                .unwrap(),
            1
        );
        assert!(!partial.exists());
        assert!(storage.exists(&make_id("a")));
    }
}

mod unavailable {
    use super::*;

    #[test]
    fn test_writes_and_reads_fail_fast() {
        let storage = BlobStorage::unavailable();
        let id = make_id("a");

        assert!(!storage.is_available());
        assert!(matches!(
            storage.store(&id, b"abc"),
            Err(BlobStorageError::Unavailable)
        ));
        assert!(matches!(
            storage.get(&id),
            Err(BlobStorageError::Unavailable)
        ));
        assert!(matches!(
            storage.create_temporary_url(&id, SystemTime::now(), Duration::from_secs(60)),
            Err(BlobStorageError::Unavailable)
        ));
    }

    #[test]
    fn test_queries_report_empty() {
        let storage = BlobStorage::unavailable();
        let id = make_id("a");

        assert!(!storage.exists(&id));
        assert!(!storage.delete(&id).unwrap());
        assert_eq!(storage.usage().unwrap(), BlobUsage::default());
    }
}

mod temporary_url {
    use super::*;

    #[test]
    fn test_url_points_at_payload_copy() {
        let (storage, _temp) = create_test_storage();
        let id = make_id("a");
        storage.store(&id, b"payload").unwrap();
        let now = SystemTime::now();

        let handle = storage
            .create_temporary_url(&id, now, Duration::from_secs(60))
            .unwrap();

        assert_eq!(handle.url().scheme(), "file");
        let path = handle.url().to_file_path().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
        assert_eq!(handle.expires_at(), epoch_millis(now) + 60_000);
        assert!(!handle.is_expired(now));
        assert!(handle.is_expired(now + Duration::from_secs(60)));
    }

    #[test]
    fn test_release_removes_file_but_not_payload() {
        let (storage, _temp) = create_test_storage();
        let id = make_id("a");
        storage.store(&id, b"payload").unwrap();

        let handle = storage
            .create_temporary_url(&id, SystemTime::now(), Duration::from_secs(60))
            .unwrap();
        let path = handle.url().to_file_path().unwrap();
        handle.release().unwrap();

        assert!(!path.exists());
        assert!(storage.exists(&id));
    }

    #[test]
    fn test_drop_removes_file() {
        let (storage, _temp) = create_test_storage();
        let id = make_id("a");
        storage.store(&id, b"payload").unwrap();

        let path = {
            let handle = storage
                .create_temporary_url(&id, SystemTime::now(), Duration::from_secs(60))
                .unwrap();
            handle.url().to_file_path().unwrap()
        };

        assert!(!path.exists());
    }

    #[test]
    fn test_missing_payload_is_not_found() {
        let (storage, _temp) = create_test_storage();
        let err = storage
            .create_temporary_url(&make_id("nope"), SystemTime::now(), Duration::from_secs(60))
            .unwrap_err();

        assert!(matches!(err, BlobStorageError::NotFound(id) if id == "nope"));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (storage, _temp) = create_test_storage();
        let id = make_id("a");
        storage.store(&id, b"payload").unwrap();
        let ttl = Duration::from_secs(300);
        let t0 = SystemTime::now();

        let old = storage.create_temporary_url(&id, t0, ttl).unwrap();
        let fresh = storage
            .create_temporary_url(&id, t0 + Duration::from_secs(200), ttl)
            .unwrap();
        let old_path = old.url().to_file_path().unwrap();
        let fresh_path = fresh.url().to_file_path().unwrap();

        let removed = storage
            .sweep_expired_temporary(t0 + Duration::from_secs(300), ttl)
            .unwrap();

        assert_eq!(removed, 1);
        assert!(!old_path.exists());
        assert!(fresh_path.exists());
        // Releasing a swept handle is still fine.
        old.release().unwrap();
        fresh.release().unwrap();
    }

    #[test]
    fn test_unbounded_ttl_never_expires() {
        let (storage, _temp) = create_test_storage();
        let id = make_id("a");
        storage.store(&id, b"payload").unwrap();
        let now = SystemTime::now();

        let handle = storage
            .create_temporary_url(&id, now, Duration::MAX)
            .unwrap();
        let path = handle.url().to_file_path().unwrap();

        assert_eq!(handle.expires_at(), EpochMillis::MAX);
        assert!(!handle.is_expired(now + Duration::from_secs(86_400)));
        assert_eq!(storage.sweep_expired_temporary(now, Duration::MAX).unwrap(), 0);
        assert!(path.exists());
    }
}
