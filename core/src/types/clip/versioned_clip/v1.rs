use serde::{Deserialize, Serialize};

use super::ClipVariant;
use crate::types::{BlobId, ClipId, EpochMillis};

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub title: String,
    pub url: String,
    pub content: String,
    pub size: u64,
    pub tags: Vec<String>,
    pub pdf_id: Option<BlobId>,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

impl ClipVariant for Clip {
    const VERSION: u8 = 1;
}
