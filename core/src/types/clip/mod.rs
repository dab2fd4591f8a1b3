//! Clip record types exchanged with callers.
//!
//! Records are persisted through [`versioned_clip::VersionedClip`]; the types here are
//! what the stores accept and return.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use thiserror::Error;

use super::{BlobId, ClipId, EpochMillis, epoch_millis};

pub(crate) mod versioned_clip;

use versioned_clip::latest_clip;

/// Upper bound on the text excerpt stored with each clip.
pub const MAX_CONTENT_CHARS: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("url is required")]
    MissingUrl,

    #[error("content excerpt too long: {len} chars exceeds {max}")]
    ContentTooLong { len: usize, max: usize },

    #[error("tags must not be empty strings")]
    EmptyTag,
}

/// A stored clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRecord {
    pub id: ClipId,
    pub title: String,
    pub url: String,
    pub content: String,
    pub size: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub pdf_id: Option<BlobId>,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

impl ClipRecord {
    pub(crate) fn from_latest(clip: latest_clip::Clip) -> Self {
        Self {
            id: clip.id,
            title: clip.title,
            url: clip.url,
            content: clip.content,
            size: clip.size,
            tags: clip.tags,
            pdf_id: clip.pdf_id,
            created_at: clip.created_at,
            updated_at: clip.updated_at,
        }
    }

    pub(crate) fn into_latest(self) -> latest_clip::Clip {
        latest_clip::Clip {
            id: self.id,
            title: self.title,
            url: self.url,
            content: self.content,
            size: self.size,
            tags: self.tags,
            pdf_id: self.pdf_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Case-insensitive substring match over title, url, content and tags.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.title.to_lowercase().contains(&query)
            || self.url.to_lowercase().contains(&query)
            || self.content.to_lowercase().contains(&query)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&query))
    }
}

/// A clip as submitted by the capture path: the full record minus timestamps.
///
/// `id` is generated when absent. `created_at` is kept when given, which lets imports
/// preserve original creation times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipDraft {
    #[serde(default)]
    pub id: Option<ClipId>,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pdf_id: Option<BlobId>,
    #[serde(default)]
    pub created_at: Option<EpochMillis>,
}

impl ClipDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::MissingUrl);
        }

        let len = self.content.chars().count();
        if len > MAX_CONTENT_CHARS {
            return Err(ValidationError::ContentTooLong {
                len,
                max: MAX_CONTENT_CHARS,
            });
        }

        validate_tags(&self.tags)
    }

    /// Builds the record to store. `existing_created_at` wins over a generated stamp so a
    /// full replace never moves a clip's creation time unless the draft says so.
    pub(crate) fn into_record(
        self,
        id: ClipId,
        existing_created_at: Option<EpochMillis>,
        now: SystemTime,
    ) -> ClipRecord {
        let now = epoch_millis(now);
        ClipRecord {
            id,
            title: self.title,
            url: self.url,
            content: self.content,
            size: self.size,
            tags: self.tags,
            pdf_id: self.pdf_id,
            created_at: self.created_at.or(existing_created_at).unwrap_or(now),
            updated_at: now,
        }
    }
}

/// Fields a caller may change on an existing clip. `url` and `content` are immutable, so
/// naming them (or any unknown field) fails to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClipPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub pdf_id: Option<BlobId>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl ClipPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.tags {
            Some(tags) => validate_tags(tags),
            None => Ok(()),
        }
    }

    pub(crate) fn apply(self, record: &mut ClipRecord, now: SystemTime) {
        if let Some(title) = self.title {
            record.title = title;
        }
        if let Some(tags) = self.tags {
            record.tags = tags;
        }
        if let Some(pdf_id) = self.pdf_id {
            record.pdf_id = Some(pdf_id);
        }
        if let Some(size) = self.size {
            record.size = size;
        }
        record.updated_at = epoch_millis(now);
    }
}

fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err(ValidationError::EmptyTag);
    }
    Ok(())
}
