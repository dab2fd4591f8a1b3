//! Metadata store for clip records and the user settings row.
//!
//! This module handles all redb operations including:
//! - Clip records (ClipId → VersionedClip) and their secondary indexes
//! - The singleton settings row (JSON string)
//! - Maintenance bookkeeping (JSON strings)
//!
//! Every operation works through the context's [`Connection`]; callers run
//! `ensure_open` first and get `DatabaseError::Closed` otherwise.

use crate::core::coordination::Connection;
use crate::core::db::error::DatabaseError;
use crate::core::db::schema::{
    CLIPS_TABLE, CREATED_INDEX, METADATA_TABLE, PDF_INDEX, SETTINGS_TABLE, TAG_INDEX,
    TITLE_INDEX, URL_INDEX,
};
use crate::types::clip::versioned_clip::VersionedClip;
use crate::types::metadata::MaintenanceMetadata;
use crate::types::{
    BlobId, ClipDraft, ClipId, ClipPatch, ClipRecord, CreatedKey, UserSettings,
    UserSettingsPatch, epoch_millis,
};
use redb::{ReadableDatabase, ReadableTable, WriteTransaction};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

pub mod error {
    use crate::types::{ClipId, ValidationError};
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum DatabaseError {
        #[error("Database error: {0}")]
        Redb(#[from] redb::DatabaseError),

        #[error("Table error: {0}")]
        TableError(#[from] redb::TableError),

        #[error("Storage error: {0}")]
        StorageError(#[from] redb::StorageError),

        #[error("Transaction error: {0}")]
        TransactionError(#[from] redb::TransactionError),

        #[error("Commit error: {0}")]
        CommitError(#[from] redb::CommitError),

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Settings encoding error: {0}")]
        Json(#[from] serde_json::Error),

        #[error("Clip not found: {0}")]
        NotFound(ClipId),

        #[error("Invalid input: {0}")]
        Invalid(#[from] ValidationError),

        #[error("Database connection is closed")]
        Closed,

        #[error(
            "Upgrade to version {requested} blocked by {waiting_on} connection(s) at version {current}"
        )]
        Blocked {
            requested: u32,
            current: u32,
            waiting_on: usize,
        },

        #[error("Requested version {requested} is older than the database version {current}")]
        VersionTooLow { requested: u32, current: u32 },
    }
}

mod index_table;
pub(crate) mod schema;

/// Fixed key of the settings row.
const SETTINGS_ID: &str = "default";

/// Metadata key for maintenance tracking.
const METADATA_KEY_MAINTENANCE: &str = "maintenance";

/// The metadata store, as seen from one context.
#[derive(Clone)]
pub struct MetadataStore {
    conn: Connection,
}

impl MetadataStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn db(&self) -> Result<Arc<redb::Database>, DatabaseError> {
        self.conn.handle()
    }
}

/// Clip write operations.
impl MetadataStore {
    /// Inserts or fully replaces a clip.
    ///
    /// Generates an id when the draft has none. A replace keeps the stored `created_at`
    /// unless the draft carries one.
    pub fn put(&self, draft: ClipDraft, now: SystemTime) -> Result<ClipRecord, DatabaseError> {
        draft.validate()?;

        let db = self.db()?;
        let write_txn = db.begin_write()?;
        let id = draft.id.clone().unwrap_or_else(|| ClipId::generate(now));

        let record = {
            let mut clips = write_txn.open_table(CLIPS_TABLE)?;
            let existing = clips
                .get(&id)?
                .map(|g| ClipRecord::from_latest(g.value().into_latest()));

            if let Some(existing) = &existing {
                Self::remove_indexes(&write_txn, existing)?;
            }

            let record = draft.into_record(id, existing.map(|e| e.created_at), now);
            clips.insert(&record.id, &VersionedClip::V1(record.clone().into_latest()))?;
            record
        };
        Self::insert_indexes(&write_txn, &record)?;

        write_txn.commit()?;
        debug!(id = %record.id, pdf_id = ?record.pdf_id, size = record.size, "clip stored");
        Ok(record)
    }

    /// Merges `patch` into an existing clip.
    ///
    /// Returns `Err(NotFound)` if the clip doesn't exist.
    pub fn update(
        &self,
        id: &ClipId,
        patch: ClipPatch,
        now: SystemTime,
    ) -> Result<ClipRecord, DatabaseError> {
        patch.validate()?;

        let db = self.db()?;
        let write_txn = db.begin_write()?;

        let record = {
            let mut clips = write_txn.open_table(CLIPS_TABLE)?;
            let mut record = clips
                .get(id)?
                .map(|g| ClipRecord::from_latest(g.value().into_latest()))
                .ok_or_else(|| DatabaseError::NotFound(id.clone()))?;

            Self::remove_indexes(&write_txn, &record)?;
            patch.apply(&mut record, now);
            clips.insert(id, &VersionedClip::V1(record.clone().into_latest()))?;
            record
        };
        Self::insert_indexes(&write_txn, &record)?;

        write_txn.commit()?;
        debug!(id = %id, "clip updated");
        Ok(record)
    }

    /// Removes a clip. Missing ids are not an error; the removed record is returned so the
    /// caller can release its binary.
    pub fn delete(&self, id: &ClipId) -> Result<Option<ClipRecord>, DatabaseError> {
        let db = self.db()?;
        let write_txn = db.begin_write()?;

        let removed = {
            let mut clips = write_txn.open_table(CLIPS_TABLE)?;
            clips
                .remove(id)?
                .map(|g| ClipRecord::from_latest(g.value().into_latest()))
        };
        if let Some(record) = &removed {
            Self::remove_indexes(&write_txn, record)?;
        }

        write_txn.commit()?;
        debug!(id = %id, existed = removed.is_some(), "clip deleted");
        Ok(removed)
    }

    /// Removes every clip, leaving settings untouched. Returns the removed records.
    pub fn clear(&self) -> Result<Vec<ClipRecord>, DatabaseError> {
        let db = self.db()?;
        let write_txn = db.begin_write()?;

        let removed = {
            let clips = write_txn.open_table(CLIPS_TABLE)?;
            let mut removed = Vec::new();
            for entry in clips.iter()? {
                let (_, guard) = entry?;
                removed.push(ClipRecord::from_latest(guard.value().into_latest()));
            }
            removed
        };

        write_txn.delete_table(CLIPS_TABLE)?;
        let _ = write_txn.open_table(CLIPS_TABLE)?;
        CREATED_INDEX.clear(&write_txn)?;
        URL_INDEX.clear(&write_txn)?;
        TITLE_INDEX.clear(&write_txn)?;
        PDF_INDEX.clear(&write_txn)?;
        TAG_INDEX.clear(&write_txn)?;

        write_txn.commit()?;
        debug!(removed = removed.len(), "clips cleared");
        Ok(removed)
    }
}

/// Clip read operations.
impl MetadataStore {
    pub fn get(&self, id: &ClipId) -> Result<Option<ClipRecord>, DatabaseError> {
        let db = self.db()?;
        let read_txn = db.begin_read()?;
        let clips = read_txn.open_table(CLIPS_TABLE)?;

        Ok(clips
            .get(id)?
            .map(|g| ClipRecord::from_latest(g.value().into_latest())))
    }

    /// All clips in id order. Callers impose their own ordering.
    pub fn all(&self) -> Result<Vec<ClipRecord>, DatabaseError> {
        let db = self.db()?;
        let read_txn = db.begin_read()?;
        let clips = read_txn.open_table(CLIPS_TABLE)?;

        let mut records = Vec::new();
        for entry in clips.iter()? {
            let (_, guard) = entry?;
            records.push(ClipRecord::from_latest(guard.value().into_latest()));
        }
        Ok(records)
    }

    /// Clips ordered by descending `created_at`, at most `limit` of them.
    pub fn newest_first(&self, limit: Option<usize>) -> Result<Vec<ClipRecord>, DatabaseError> {
        let db = self.db()?;
        let read_txn = db.begin_read()?;
        let ids = CREATED_INDEX.newest_first(&read_txn, limit)?;
        Self::load(&read_txn, ids)
    }

    pub fn find_by_url(&self, url: &str) -> Result<Vec<ClipRecord>, DatabaseError> {
        let db = self.db()?;
        let read_txn = db.begin_read()?;
        let ids = URL_INDEX.ids(&read_txn, url)?;
        Self::load(&read_txn, ids)
    }

    pub fn find_by_title(&self, title: &str) -> Result<Vec<ClipRecord>, DatabaseError> {
        let db = self.db()?;
        let read_txn = db.begin_read()?;
        let ids = TITLE_INDEX.ids(&read_txn, title)?;
        Self::load(&read_txn, ids)
    }

    pub fn find_by_tag(&self, tag: &str) -> Result<Vec<ClipRecord>, DatabaseError> {
        let db = self.db()?;
        let read_txn = db.begin_read()?;
        let ids = TAG_INDEX.ids(&read_txn, tag)?;
        Self::load(&read_txn, ids)
    }

    pub fn find_by_pdf_id(&self, pdf_id: &BlobId) -> Result<Vec<ClipRecord>, DatabaseError> {
        let db = self.db()?;
        let read_txn = db.begin_read()?;
        let ids = PDF_INDEX.ids(&read_txn, pdf_id.as_str())?;
        Self::load(&read_txn, ids)
    }

    /// Whether any stored clip still names `pdf_id`. Binaries are shared, so callers check this
    /// before deleting one.
    pub fn is_pdf_referenced(&self, pdf_id: &BlobId) -> Result<bool, DatabaseError> {
        let db = self.db()?;
        let read_txn = db.begin_read()?;
        Ok(!PDF_INDEX.ids(&read_txn, pdf_id.as_str())?.is_empty())
    }

    /// Case-insensitive substring search, newest first.
    pub fn search(&self, query: &str) -> Result<Vec<ClipRecord>, DatabaseError> {
        Ok(self
            .newest_first(None)?
            .into_iter()
            .filter(|record| record.matches(query))
            .collect())
    }

    fn load(
        read_txn: &redb::ReadTransaction,
        ids: Vec<ClipId>,
    ) -> Result<Vec<ClipRecord>, DatabaseError> {
        let clips = read_txn.open_table(CLIPS_TABLE)?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(guard) = clips.get(&id)? {
                records.push(ClipRecord::from_latest(guard.value().into_latest()));
            }
        }
        Ok(records)
    }
}

/// Index helpers.
impl MetadataStore {
    fn insert_indexes(txn: &WriteTransaction, record: &ClipRecord) -> Result<(), DatabaseError> {
        CREATED_INDEX.insert(
            txn,
            &CreatedKey {
                created_at: record.created_at,
                id: record.id.clone(),
            },
        )?;
        URL_INDEX.insert(txn, &record.url, &record.id)?;
        TITLE_INDEX.insert(txn, &record.title, &record.id)?;
        if let Some(pdf_id) = &record.pdf_id {
            PDF_INDEX.insert(txn, pdf_id.as_str(), &record.id)?;
        }
        for tag in &record.tags {
            TAG_INDEX.insert(txn, tag, &record.id)?;
        }
        Ok(())
    }

    fn remove_indexes(txn: &WriteTransaction, record: &ClipRecord) -> Result<(), DatabaseError> {
        CREATED_INDEX.remove(
            txn,
            &CreatedKey {
                created_at: record.created_at,
                id: record.id.clone(),
            },
        )?;
        URL_INDEX.remove(txn, &record.url, &record.id)?;
        TITLE_INDEX.remove(txn, &record.title, &record.id)?;
        if let Some(pdf_id) = &record.pdf_id {
            PDF_INDEX.remove(txn, pdf_id.as_str(), &record.id)?;
        }
        for tag in &record.tags {
            TAG_INDEX.remove(txn, tag, &record.id)?;
        }
        Ok(())
    }
}

/// Settings operations.
impl MetadataStore {
    /// The stored settings, without materializing defaults.
    pub fn settings(&self) -> Result<Option<UserSettings>, DatabaseError> {
        let db = self.db()?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SETTINGS_TABLE)?;

        match table.get(SETTINGS_ID)? {
            None => Ok(None),
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
        }
    }

    /// Returns the settings, creating the default row on first use.
    pub fn ensure_default_settings(&self, now: SystemTime) -> Result<UserSettings, DatabaseError> {
        if let Some(settings) = self.settings()? {
            return Ok(settings);
        }

        let db = self.db()?;
        let write_txn = db.begin_write()?;
        let settings = {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            // Another context may have created it since the read above.
            let existing = match table.get(SETTINGS_ID)? {
                Some(guard) => Some(serde_json::from_str::<UserSettings>(guard.value())?),
                None => None,
            };
            match existing {
                Some(settings) => settings,
                None => {
                    let settings = UserSettings::defaults_at(now);
                    let json = serde_json::to_string(&settings)?;
                    table.insert(SETTINGS_ID, json.as_str())?;
                    debug!("default settings created");
                    settings
                }
            }
        };
        write_txn.commit()?;
        Ok(settings)
    }

    /// Deep-merges `patch` into the stored settings (or the defaults) and saves the result.
    pub fn save_settings(
        &self,
        patch: &UserSettingsPatch,
        now: SystemTime,
    ) -> Result<UserSettings, DatabaseError> {
        let db = self.db()?;
        let write_txn = db.begin_write()?;
        let settings = {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            let existing = match table.get(SETTINGS_ID)? {
                Some(guard) => Some(serde_json::from_str::<UserSettings>(guard.value())?),
                None => None,
            };

            let mut settings = existing.unwrap_or_else(|| UserSettings::defaults_at(now));
            settings.apply(patch, now);

            let json = serde_json::to_string(&settings)?;
            table.insert(SETTINGS_ID, json.as_str())?;
            settings
        };
        write_txn.commit()?;
        debug!("settings saved");
        Ok(settings)
    }
}

/// Maintenance bookkeeping.
impl MetadataStore {
    fn maintenance_metadata(&self) -> Result<MaintenanceMetadata, DatabaseError> {
        let db = self.db()?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(METADATA_TABLE)?;
        match table.get(METADATA_KEY_MAINTENANCE)? {
            Some(guard) => Ok(serde_json::from_str(guard.value()).unwrap_or_default()),
            None => Ok(MaintenanceMetadata::default()),
        }
    }

    pub fn record_maintenance(&self, now: SystemTime) -> Result<(), DatabaseError> {
        let metadata = MaintenanceMetadata {
            last_run_at: Some(epoch_millis(now)),
        };
        let json = serde_json::to_string(&metadata)?;

        let db = self.db()?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(METADATA_TABLE)?;
            table.insert(METADATA_KEY_MAINTENANCE, json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Returns true if maintenance should run (never run or interval elapsed).
    pub fn should_run_maintenance(
        &self,
        now: SystemTime,
        interval: Duration,
    ) -> Result<bool, DatabaseError> {
        let Some(last) = self.maintenance_metadata()?.last_run_at else {
            return Ok(true);
        };
        let elapsed = epoch_millis(now).saturating_sub(last);
        Ok(elapsed >= interval.as_millis() as u64)
    }
}
