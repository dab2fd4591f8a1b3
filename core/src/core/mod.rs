//! One context's view of the shelf, combining the metadata and binary stores.

use crate::core::blob_storage::error::BlobStorageError;
use crate::core::blob_storage::{BlobStorage, TemporaryUrl};
use crate::core::coordination::{Connection, ContextKind, DatabaseHub};
use crate::core::db::MetadataStore;
use crate::core::db::error::DatabaseError;
use crate::core::db::schema::SCHEMA_VERSION;
use crate::core::retention::{RetentionPolicy, SweepOutcome};
use crate::types::{
    BlobId, ClipDraft, ClipId, ClipPatch, ClipRecord, Config, EpochMillis, RetentionConfig,
    ServiceConfig, UserSettings, UserSettingsPatch, epoch_millis,
};
use error::ShelfError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{debug, warn};

pub mod blob_storage;
pub mod coordination;
pub mod db;
pub mod retention;

pub mod error {
    use super::*;
    use std::fmt;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ShelfError {
        #[error("Database error: {0}")]
        Database(#[from] DatabaseError),

        #[error("Binary storage error: {0}")]
        BlobStorage(#[from] BlobStorageError),

        #[error("Clip not found: {0}")]
        ClipNotFound(ClipId),

        #[error("Binary object not found: {0}")]
        BinaryNotFound(BlobId),

        #[error("Temporary URL not found: {0}")]
        TemporaryUrlNotFound(String),
    }

    /// Failure classes reported across the context boundary.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
    pub enum ErrorKind {
        NotFound,
        StorageUnavailable,
        Persistence,
        Validation,
    }

    impl fmt::Display for ErrorKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                ErrorKind::NotFound => write!(f, "NotFound"),
                ErrorKind::StorageUnavailable => write!(f, "StorageUnavailable"),
                ErrorKind::Persistence => write!(f, "Persistence"),
                ErrorKind::Validation => write!(f, "Validation"),
            }
        }
    }

    impl ShelfError {
        pub fn kind(&self) -> ErrorKind {
            match self {
                ShelfError::Database(DatabaseError::NotFound(_)) => ErrorKind::NotFound,
                ShelfError::Database(DatabaseError::Invalid(_)) => ErrorKind::Validation,
                ShelfError::Database(_) => ErrorKind::Persistence,
                ShelfError::BlobStorage(BlobStorageError::Unavailable) => {
                    ErrorKind::StorageUnavailable
                }
                ShelfError::BlobStorage(BlobStorageError::NotFound(_)) => ErrorKind::NotFound,
                ShelfError::BlobStorage(_) => ErrorKind::Persistence,
                ShelfError::ClipNotFound(_)
                | ShelfError::BinaryNotFound(_)
                | ShelfError::TemporaryUrlNotFound(_) => ErrorKind::NotFound,
            }
        }
    }
}

/// Storage quota report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    /// Binary payloads plus the metadata database file.
    pub used_bytes: u64,
    /// `None` when no quota is configured.
    pub capacity_bytes: Option<u64>,
    pub blob_count: u64,
    pub clip_count: u64,
}

/// Full data export.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub clip_list: Vec<ClipRecord>,
    pub settings: UserSettings,
    pub export_date: EpochMillis,
    pub version: String,
}

pub const EXPORT_FORMAT_VERSION: &str = "1.0.0";

pub struct ClipShelf {
    db_path: PathBuf,
    meta: MetadataStore,
    blobs: BlobStorage,
    retention: RetentionPolicy,
    service: ServiceConfig,
}

impl ClipShelf {
    /// Connects `context` to the hub's database and opens it.
    ///
    /// Contexts without filesystem access get a binary store that reports `StorageUnavailable`.
    pub fn open(hub: &DatabaseHub, config: &Config, context: ContextKind) -> Result<Self, ShelfError> {
        let blobs = if context.supports_blob_storage() {
            BlobStorage::new(config.blobs_path(), config.temporary_path())
        } else {
            BlobStorage::unavailable()
        };

        let conn = hub.connect(context, SCHEMA_VERSION);
        conn.ensure_open()?;

        Ok(Self {
            db_path: hub.path().to_path_buf(),
            meta: MetadataStore::new(conn),
            blobs,
            retention: RetentionPolicy::new(RetentionConfig::from(&config.service)),
            service: config.service.clone(),
        })
    }

    pub fn context(&self) -> ContextKind {
        self.meta.connection().context()
    }

    pub fn connection(&self) -> &Connection {
        self.meta.connection()
    }

    /// Reopens the connection if a version change closed it.
    pub fn ensure_open(&self) -> Result<(), ShelfError> {
        Ok(self.meta.connection().ensure_open()?)
    }

    pub fn has_blob_storage(&self) -> bool {
        self.blobs.is_available()
    }
}

/// Clip operations.
impl ClipShelf {
    pub fn save_clip(&self, draft: ClipDraft, now: SystemTime) -> Result<ClipRecord, ShelfError> {
        self.ensure_open()?;
        Ok(self.meta.put(draft, now)?)
    }

    /// All clips, newest first.
    pub fn list_clips(&self) -> Result<Vec<ClipRecord>, ShelfError> {
        self.ensure_open()?;
        Ok(self.meta.newest_first(None)?)
    }

    pub fn get_clip(&self, id: &ClipId) -> Result<Option<ClipRecord>, ShelfError> {
        self.ensure_open()?;
        Ok(self.meta.get(id)?)
    }

    pub fn update_clip(
        &self,
        id: &ClipId,
        patch: ClipPatch,
        now: SystemTime,
    ) -> Result<ClipRecord, ShelfError> {
        self.ensure_open()?;
        Ok(self.meta.update(id, patch, now)?)
    }

    pub fn search(&self, query: &str) -> Result<Vec<ClipRecord>, ShelfError> {
        self.ensure_open()?;
        Ok(self.meta.search(query)?)
    }

    /// Deletes a clip, then its binary if no other clip still points at it.
    ///
    /// Returns `true` if the clip existed. Binary removal failures are logged only.
    pub fn delete_clip(&self, id: &ClipId) -> Result<bool, ShelfError> {
        self.ensure_open()?;
        let Some(record) = self.meta.delete(id)? else {
            return Ok(false);
        };

        if let Some(pdf_id) = &record.pdf_id {
            self.release_binary(pdf_id);
        }
        Ok(true)
    }

    /// Removes every clip and the binaries they owned. Settings are kept.
    pub fn clear_clips(&self) -> Result<usize, ShelfError> {
        self.ensure_open()?;
        let removed = self.meta.clear()?;

        for pdf_id in removed.iter().filter_map(|r| r.pdf_id.as_ref()) {
            self.release_binary(pdf_id);
        }
        debug!(removed = removed.len(), "shelf cleared");
        Ok(removed.len())
    }

    fn release_binary(&self, pdf_id: &BlobId) {
        match self.meta.is_pdf_referenced(pdf_id) {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!(pdf_id = %pdf_id, error = %e, "failed to check binary owners; keeping binary");
                return;
            }
        }
        if let Err(e) = self.blobs.delete(pdf_id) {
            warn!(pdf_id = %pdf_id, error = %e, "failed to delete binary of removed clip");
        }
    }
}

/// Binary operations.
impl ClipShelf {
    /// Stores a payload, generating a `pdf_…` id when none is given.
    pub fn store_binary(
        &self,
        id: Option<BlobId>,
        bytes: &[u8],
        now: SystemTime,
    ) -> Result<BlobId, ShelfError> {
        let id = id.unwrap_or_else(|| BlobId::generate(now));
        self.blobs.store(&id, bytes)?;
        Ok(id)
    }

    pub fn get_binary(&self, id: &BlobId) -> Result<Vec<u8>, ShelfError> {
        self.blobs
            .get(id)?
            .ok_or_else(|| ShelfError::BinaryNotFound(id.clone()))
    }

    pub fn binary_exists(&self, id: &BlobId) -> bool {
        self.blobs.exists(id)
    }

    pub fn create_temporary_url(
        &self,
        id: &BlobId,
        now: SystemTime,
    ) -> Result<TemporaryUrl, ShelfError> {
        let ttl = self.retention.config().temporary_url_ttl;
        Ok(self.blobs.create_temporary_url(id, now, ttl)?)
    }

    pub fn storage_usage(&self) -> Result<StorageUsage, ShelfError> {
        self.ensure_open()?;
        let blobs = self.blobs.usage()?;
        let db_bytes = match std::fs::metadata(&self.db_path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                warn!(path = %self.db_path.display(), error = %e, "failed to stat database file");
                0
            }
        };
        let clip_count = self.meta.all()?.len() as u64;

        Ok(StorageUsage {
            used_bytes: blobs.total_bytes + db_bytes,
            capacity_bytes: self.service.storage.capacity_bytes,
            blob_count: blobs.count,
            clip_count,
        })
    }
}

/// Settings operations.
impl ClipShelf {
    /// Returns the settings, materializing the defaults on first use.
    pub fn settings(&self, now: SystemTime) -> Result<UserSettings, ShelfError> {
        self.ensure_open()?;
        Ok(self.meta.ensure_default_settings(now)?)
    }

    pub fn save_settings(
        &self,
        patch: &UserSettingsPatch,
        now: SystemTime,
    ) -> Result<UserSettings, ShelfError> {
        self.ensure_open()?;
        Ok(self.meta.save_settings(patch, now)?)
    }

    pub fn export(&self, now: SystemTime) -> Result<ExportBundle, ShelfError> {
        Ok(ExportBundle {
            clip_list: self.list_clips()?,
            settings: self.settings(now)?,
            export_date: epoch_millis(now),
            version: EXPORT_FORMAT_VERSION.to_string(),
        })
    }
}

/// Maintenance operations.
impl ClipShelf {
    /// Runs a retention sweep and records it as the last run.
    pub fn run_maintenance(&self, now: SystemTime) -> Result<SweepOutcome, ShelfError> {
        self.ensure_open()?;
        let outcome = self.retention.sweep(&self.meta, &self.blobs, now)?;
        self.meta.record_maintenance(now)?;
        Ok(outcome)
    }

    /// Runs a sweep only if the configured interval has elapsed since the last one.
    pub fn run_maintenance_if_due(
        &self,
        now: SystemTime,
    ) -> Result<Option<SweepOutcome>, ShelfError> {
        self.ensure_open()?;
        let interval = self.service.maintenance.interval();
        if !self.meta.should_run_maintenance(now, interval)? {
            return Ok(None);
        }
        self.run_maintenance(now).map(Some)
    }
}

#[cfg(test)]
mod tests;
