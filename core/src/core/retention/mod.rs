//! Retention and reconciliation sweep.
//!
//! A sweep evicts the oldest clips beyond the configured `maxClips`, then removes binaries
//! that no clip references any more, stale partial writes and expired temporary URLs.
//! Failures on single records are logged and counted; only failing to read the metadata
//! store aborts a sweep.

use crate::core::blob_storage::BlobStorage;
use crate::core::db::MetadataStore;
use crate::core::db::error::DatabaseError;
use crate::types::{BlobId, ClipRecord, RetentionConfig};
use serde::Serialize;
use std::collections::HashSet;
use std::time::SystemTime;
use tracing::{info, warn};

/// What a sweep did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepOutcome {
    pub evicted: usize,
    pub blobs_removed: usize,
    pub orphans_removed: usize,
    pub partials_removed: usize,
    pub temporary_urls_expired: usize,
    pub failures: usize,
}

pub struct RetentionPolicy {
    config: RetentionConfig,
}

/// Splits `records` into the newest `max_clips` (kept) and the rest (evicted).
///
/// Ordering is descending `created_at`, ties broken by descending id. A limit of zero or
/// below keeps everything.
pub fn partition_for_eviction(
    mut records: Vec<ClipRecord>,
    max_clips: i64,
) -> (Vec<ClipRecord>, Vec<ClipRecord>) {
    if max_clips <= 0 {
        return (records, Vec::new());
    }

    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    let keep = usize::try_from(max_clips).unwrap_or(usize::MAX);
    if records.len() <= keep {
        return (records, Vec::new());
    }
    let evicted = records.split_off(keep);
    (records, evicted)
}

impl RetentionPolicy {
    pub fn new(config: RetentionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    pub fn sweep(
        &self,
        meta: &MetadataStore,
        blobs: &BlobStorage,
        now: SystemTime,
    ) -> Result<SweepOutcome, DatabaseError> {
        let mut outcome = SweepOutcome::default();

        let max_clips = meta
            .settings()?
            .map(|s| s.storage.max_clips)
            .unwrap_or(self.config.default_max_clips);
        self.evict(meta, blobs, max_clips, &mut outcome)?;
        self.remove_orphans(meta, blobs, now, &mut outcome)?;

        match blobs.remove_stale_partials(now, self.config.orphan_grace) {
            Ok(n) => outcome.partials_removed = n,
            Err(e) => {
                warn!(error = %e, "failed to remove stale partial writes");
                outcome.failures += 1;
            }
        }
        match blobs.sweep_expired_temporary(now, self.config.temporary_url_ttl) {
            Ok(n) => outcome.temporary_urls_expired = n,
            Err(e) => {
                warn!(error = %e, "failed to sweep temporary urls");
                outcome.failures += 1;
            }
        }

        info!(
            max_clips,
            evicted = outcome.evicted,
            blobs_removed = outcome.blobs_removed,
            orphans_removed = outcome.orphans_removed,
            temporary_urls_expired = outcome.temporary_urls_expired,
            failures = outcome.failures,
            "retention sweep finished"
        );
        Ok(outcome)
    }

    fn evict(
        &self,
        meta: &MetadataStore,
        blobs: &BlobStorage,
        max_clips: i64,
        outcome: &mut SweepOutcome,
    ) -> Result<(), DatabaseError> {
        if max_clips <= 0 {
            return Ok(());
        }

        let (_, evicted) = partition_for_eviction(meta.all()?, max_clips);
        for record in evicted {
            if let Err(e) = meta.delete(&record.id) {
                warn!(id = %record.id, error = %e, "failed to evict clip");
                outcome.failures += 1;
                continue;
            }
            outcome.evicted += 1;

            let Some(pdf_id) = &record.pdf_id else {
                continue;
            };
            match meta.is_pdf_referenced(pdf_id) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(id = %record.id, pdf_id = %pdf_id, error = %e, "failed to check binary owners; keeping binary");
                    outcome.failures += 1;
                    continue;
                }
            }
            match blobs.delete(pdf_id) {
                Ok(true) => outcome.blobs_removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(id = %record.id, pdf_id = %pdf_id, error = %e, "failed to delete evicted binary");
                    outcome.failures += 1;
                }
            }
        }
        Ok(())
    }

    fn remove_orphans(
        &self,
        meta: &MetadataStore,
        blobs: &BlobStorage,
        now: SystemTime,
        outcome: &mut SweepOutcome,
    ) -> Result<(), DatabaseError> {
        if !blobs.is_available() {
            return Ok(());
        }

        let entries = match blobs.list_entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "failed to list binaries");
                outcome.failures += 1;
                return Ok(());
            }
        };
        if entries.is_empty() {
            return Ok(());
        }

        let referenced: HashSet<BlobId> = meta
            .all()?
            .into_iter()
            .filter_map(|record| record.pdf_id)
            .collect();

        for entry in entries {
            if referenced.contains(&entry.id) {
                continue;
            }
            // Young binaries may belong to a clip that is not committed yet.
            let age = now.duration_since(entry.modified).unwrap_or_default();
            if age < self.config.orphan_grace {
                continue;
            }

            match blobs.delete(&entry.id) {
                Ok(true) => outcome.orphans_removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(pdf_id = %entry.id, error = %e, "failed to delete orphaned binary");
                    outcome.failures += 1;
                }
            }
        }
        Ok(())
    }
}
