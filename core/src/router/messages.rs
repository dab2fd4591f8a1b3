//! Wire types exchanged with UI and capture contexts.
//!
//! A request is `{ "action": <camelCase name>, "data": <payload> }`. Actions without input
//! may omit `data`. Anything else fails to parse and is answered with a `Validation`
//! failure.

use crate::core::error::{ErrorKind, ShelfError};
use crate::core::retention::SweepOutcome;
use crate::core::{ExportBundle, StorageUsage};
use crate::types::{
    BlobId, ClipDraft, ClipId, ClipPatch, ClipRecord, EpochMillis, UserSettings,
    UserSettingsPatch,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(
    tag = "action",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    StoreBinary {
        #[serde(default)]
        id: Option<BlobId>,
        bytes: Vec<u8>,
    },
    SaveClip(ClipDraft),
    #[serde(alias = "getClips")]
    ListClips,
    GetClip {
        id: ClipId,
    },
    UpdateClip {
        id: ClipId,
        updates: ClipPatch,
    },
    DeleteClip {
        id: ClipId,
    },
    ClearClips,
    GetSettings,
    SaveSettings(UserSettingsPatch),
    GetStorageUsage,
    SearchClips {
        query: String,
    },
    GetBinary {
        id: BlobId,
    },
    CreateTemporaryUrl {
        id: BlobId,
    },
    RevokeTemporaryUrl {
        token: String,
    },
    ExportData,
    RunMaintenance,
}

impl Request {
    /// Action name as it appears on the wire, for logging.
    pub fn action(&self) -> &'static str {
        match self {
            Request::StoreBinary { .. } => "storeBinary",
            Request::SaveClip(_) => "saveClip",
            Request::ListClips => "listClips",
            Request::GetClip { .. } => "getClip",
            Request::UpdateClip { .. } => "updateClip",
            Request::DeleteClip { .. } => "deleteClip",
            Request::ClearClips => "clearClips",
            Request::GetSettings => "getSettings",
            Request::SaveSettings(_) => "saveSettings",
            Request::GetStorageUsage => "getStorageUsage",
            Request::SearchClips { .. } => "searchClips",
            Request::GetBinary { .. } => "getBinary",
            Request::CreateTemporaryUrl { .. } => "createTemporaryUrl",
            Request::RevokeTemporaryUrl { .. } => "revokeTemporaryUrl",
            Request::ExportData => "exportData",
            Request::RunMaintenance => "runMaintenance",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum ResponseData {
    Id { id: String },
    Clip(ClipRecord),
    Clips(Vec<ClipRecord>),
    Settings(UserSettings),
    Usage(StorageUsage),
    Binary { bytes: Vec<u8> },
    TemporaryUrl {
        token: String,
        url: String,
        expires_at: EpochMillis,
    },
    Deleted { existed: bool },
    Cleared { removed: usize },
    Export(ExportBundle),
    Maintenance(SweepOutcome),
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            error_kind: None,
            data: None,
        }
    }

    pub fn with_data(data: ResponseData) -> Self {
        Self {
            data: Some(data),
            ..Self::ok()
        }
    }

    pub fn failure(error: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            error_kind: Some(kind),
            data: None,
        }
    }
}

impl From<&ShelfError> for Response {
    fn from(e: &ShelfError) -> Self {
        Self::failure(e.to_string(), e.kind())
    }
}
