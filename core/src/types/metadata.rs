//! Bookkeeping rows kept next to the clip tables.

use serde::{Deserialize, Serialize};

use super::EpochMillis;

/// Maintenance metadata. Missing fields default to None.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceMetadata {
    #[serde(default)]
    pub last_run_at: Option<EpochMillis>,
}
