//! Filesystem-backed store for binary payloads (PDF bodies).
//!
//! Payloads live in one flat directory, one `<id>.pdf` file per [`BlobId`]. Writes go to a
//! uniquely named `.partial` file first and are renamed into place, so readers never see a
//! half-written payload.
//!
//! Not every context has the capability. A storage built with [`BlobStorage::unavailable`]
//! fails `store`, `get` and `create_temporary_url` with `Unavailable`; the read-only queries
//! (`exists`, `delete`, `usage`) report an empty store instead.

use crate::types::{BlobId, EpochMillis, epoch_millis, from_epoch_millis};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

pub mod error {
    use std::path::PathBuf;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum BlobStorageError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Binary storage is not available in this context")]
        Unavailable,

        #[error("Binary object not found: {0}")]
        NotFound(String),

        #[error("Path cannot be expressed as a file URL: {0}")]
        InvalidPath(PathBuf),
    }
}

use error::BlobStorageError;

const BLOB_EXTENSION: &str = "pdf";
const PARTIAL_SUFFIX: &str = ".partial";

struct Paths {
    blobs: PathBuf,
    temporary: PathBuf,
}

pub struct BlobStorage {
    paths: Option<Paths>,
}

/// Aggregate size of the stored payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlobUsage {
    pub total_bytes: u64,
    pub count: u64,
}

/// One stored payload, as seen by maintenance sweeps.
#[derive(Clone, Debug)]
pub struct BlobEntry {
    pub id: BlobId,
    pub size: u64,
    pub modified: SystemTime,
}

impl BlobStorage {
    pub fn new(blobs_path: impl Into<PathBuf>, temporary_path: impl Into<PathBuf>) -> Self {
        Self {
            paths: Some(Paths {
                blobs: blobs_path.into(),
                temporary: temporary_path.into(),
            }),
        }
    }

    /// Storage for a context without filesystem access.
    pub fn unavailable() -> Self {
        Self { paths: None }
    }

    pub fn is_available(&self) -> bool {
        self.paths.is_some()
    }

    fn paths(&self) -> Result<&Paths, BlobStorageError> {
        self.paths.as_ref().ok_or(BlobStorageError::Unavailable)
    }

    fn blob_file(blobs: &Path, id: &BlobId) -> PathBuf {
        blobs.join(format!("{}.{}", id.as_str(), BLOB_EXTENSION))
    }

    /// Returns the file backing `id`, if this context has the capability.
    pub fn blob_path(&self, id: &BlobId) -> Option<PathBuf> {
        self.paths.as_ref().map(|p| Self::blob_file(&p.blobs, id))
    }
}

/// Payload operations.
impl BlobStorage {
    /// Writes `bytes` under `id`, replacing any previous payload. Returns the byte count.
    pub fn store(&self, id: &BlobId, bytes: &[u8]) -> Result<u64, BlobStorageError> {
        let paths = self.paths()?;
        std::fs::create_dir_all(&paths.blobs)?;

        let dest = Self::blob_file(&paths.blobs, id);
        let partial = paths.blobs.join(format!(
            "{}.{}.{}{}",
            id.as_str(),
            BLOB_EXTENSION,
            Uuid::new_v4().simple(),
            PARTIAL_SUFFIX
        ));

        if let Err(e) = std::fs::write(&partial, bytes) {
            let _ = std::fs::remove_file(&partial);
            return Err(e.into());
        }
        if let Err(e) = std::fs::rename(&partial, &dest) {
            let _ = std::fs::remove_file(&partial);
            return Err(e.into());
        }

        debug!(id = %id, bytes = bytes.len(), "binary stored");
        Ok(bytes.len() as u64)
    }

    /// Returns `Ok(None)` if nothing is stored under `id`.
    pub fn get(&self, id: &BlobId) -> Result<Option<Vec<u8>>, BlobStorageError> {
        let paths = self.paths()?;
        match std::fs::read(Self::blob_file(&paths.blobs, id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, id: &BlobId) -> bool {
        self.blob_path(id).is_some_and(|path| path.is_file())
    }

    /// Removes the payload. Returns `true` if one was removed.
    pub fn delete(&self, id: &BlobId) -> Result<bool, BlobStorageError> {
        let Some(path) = self.blob_path(id) else {
            return Ok(false);
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(id = %id, "binary deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn usage(&self) -> Result<BlobUsage, BlobStorageError> {
        let usage = self
            .list_entries()?
            .iter()
            .fold(BlobUsage::default(), |acc, entry| BlobUsage {
                total_bytes: acc.total_bytes + entry.size,
                count: acc.count + 1,
            });
        Ok(usage)
    }

    /// Lists the committed payloads. Partial writes and foreign files are skipped.
    pub fn list_entries(&self) -> Result<Vec<BlobEntry>, BlobStorageError> {
        let Some(paths) = &self.paths else {
            return Ok(Vec::new());
        };
        if !paths.blobs.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&paths.blobs)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_none_or(|e| e != BLOB_EXTENSION) {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| BlobId::try_from(s).ok())
            else {
                continue;
            };

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(BlobEntry {
                id,
                size: metadata.len(),
                modified: metadata.modified()?,
            });
        }

        Ok(entries)
    }

    /// Removes `.partial` files older than `grace`, left behind by interrupted writes.
    pub fn remove_stale_partials(
        &self,
        now: SystemTime,
        grace: Duration,
    ) -> Result<usize, BlobStorageError> {
        let Some(paths) = &self.paths else {
            return Ok(0);
        };
        if !paths.blobs.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&paths.blobs)? {
            let entry = entry?;
            let is_partial = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(PARTIAL_SUFFIX));
            if !is_partial {
                continue;
            }

            let modified = entry.metadata()?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= grace {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "stale partial writes removed");
        }
        Ok(removed)
    }
}

/// A revocable file URL pointing at a snapshot of one payload.
///
/// Call [`TemporaryUrl::release`] when done. Dropping the handle also removes the file, and
/// [`BlobStorage::sweep_expired_temporary`] removes whatever outlived its expiry.
#[derive(Debug)]
pub struct TemporaryUrl {
    token: String,
    url: Url,
    path: PathBuf,
    expires_at: EpochMillis,
    released: bool,
}

impl TemporaryUrl {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn expires_at(&self) -> EpochMillis {
        self.expires_at
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        epoch_millis(now) >= self.expires_at
    }

    pub fn release(mut self) -> Result<(), BlobStorageError> {
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TemporaryUrl {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Temporary URL operations.
impl BlobStorage {
    /// Issues a URL for `id` that stays valid for `ttl`.
    ///
    /// The file is a hard link to the payload where the filesystem allows it, a copy otherwise.
    pub fn create_temporary_url(
        &self,
        id: &BlobId,
        now: SystemTime,
        ttl: Duration,
    ) -> Result<TemporaryUrl, BlobStorageError> {
        let paths = self.paths()?;
        let source = Self::blob_file(&paths.blobs, id);
        if !source.is_file() {
            return Err(BlobStorageError::NotFound(id.to_string()));
        }

        std::fs::create_dir_all(&paths.temporary)?;
        let issued_at = epoch_millis(now);
        let token = Uuid::new_v4().simple().to_string();
        let path = paths
            .temporary
            .join(format!("{issued_at}-{token}.{BLOB_EXTENSION}"));

        if std::fs::hard_link(&source, &path).is_err() {
            std::fs::copy(&source, &path)?;
        }

        let absolute = std::path::absolute(&path)?;
        let url = match Url::from_file_path(&absolute) {
            Ok(url) => url,
            Err(()) => {
                let _ = std::fs::remove_file(&path);
                return Err(BlobStorageError::InvalidPath(absolute));
            }
        };

        debug!(id = %id, token = %token, "temporary url issued");
        Ok(TemporaryUrl {
            token,
            url,
            path,
            expires_at: now
                .checked_add(ttl)
                .map_or(EpochMillis::MAX, epoch_millis),
            released: false,
        })
    }

    /// Removes temporary files issued at least `ttl` ago. Returns how many were removed.
    pub fn sweep_expired_temporary(
        &self,
        now: SystemTime,
        ttl: Duration,
    ) -> Result<usize, BlobStorageError> {
        let Some(paths) = &self.paths else {
            return Ok(0);
        };
        if !paths.temporary.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&paths.temporary)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(issued_at) = file_name
                .to_str()
                .and_then(|name| name.split_once('-'))
                .and_then(|(millis, _)| millis.parse::<EpochMillis>().ok())
            else {
                warn!(file = ?file_name, "unrecognised file in temporary directory");
                continue;
            };

            let expired = from_epoch_millis(issued_at)
                .checked_add(ttl)
                .is_some_and(|expiry| expiry <= now);
            if expired {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if removed > 0 {
            info!(removed, "expired temporary urls removed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests;
