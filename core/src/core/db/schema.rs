//! Table layout and version upgrades of the metadata database.

use crate::core::db::error::DatabaseError;
use crate::core::db::index_table::{CreatedIndex, FieldIndex};
use crate::types::ClipId;
use crate::types::clip::versioned_clip::VersionedClip;
use redb::{ReadableDatabase, TableDefinition};
use std::path::Path;
use tracing::info;

/// Version this build of the schema opens at.
pub const SCHEMA_VERSION: u32 = 2;

/// Clips table: ClipId → VersionedClip
pub(crate) const CLIPS_TABLE: TableDefinition<ClipId, VersionedClip> =
    TableDefinition::new("clips");

/// Settings table: fixed id → JSON string
pub(crate) const SETTINGS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Metadata table: &str → JSON string
pub(crate) const METADATA_TABLE: TableDefinition<&str, &str> = TableDefinition::new("metadata");

const SCHEMA_TABLE: TableDefinition<&str, u32> = TableDefinition::new("schema");
const SCHEMA_KEY_VERSION: &str = "version";

pub(crate) const CREATED_INDEX: CreatedIndex = CreatedIndex::new("idx_created_at");
pub(crate) const URL_INDEX: FieldIndex = FieldIndex::new("idx_url");
pub(crate) const TITLE_INDEX: FieldIndex = FieldIndex::new("idx_title");
pub(crate) const PDF_INDEX: FieldIndex = FieldIndex::new("idx_pdf_id");
pub(crate) const TAG_INDEX: FieldIndex = FieldIndex::new("idx_tags");

/// Opens (or creates) the database file without touching its tables.
pub(crate) fn open(path: &Path) -> Result<redb::Database, DatabaseError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(redb::Database::create(path)?)
}

/// Returns the version recorded in the file, 0 for a fresh file.
pub(crate) fn stored_version(db: &redb::Database) -> Result<u32, DatabaseError> {
    let read_txn = db.begin_read()?;
    let table = match read_txn.open_table(SCHEMA_TABLE) {
        Ok(table) => table,
        Err(redb::TableError::TableDoesNotExist(_)) => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    Ok(table.get(SCHEMA_KEY_VERSION)?.map(|g| g.value()).unwrap_or(0))
}

/// Applies every step in `(from, to]` in a single write transaction.
pub(crate) fn upgrade(db: &redb::Database, from: u32, to: u32) -> Result<(), DatabaseError> {
    let write_txn = db.begin_write()?;

    for version in from + 1..=to {
        match version {
            1 => {
                let _ = write_txn.open_table(CLIPS_TABLE)?;
                let _ = write_txn.open_table(SETTINGS_TABLE)?;
                let _ = write_txn.open_table(METADATA_TABLE)?;
                CREATED_INDEX.init(&write_txn)?;
                URL_INDEX.init(&write_txn)?;
                TITLE_INDEX.init(&write_txn)?;
                PDF_INDEX.init(&write_txn)?;
                TAG_INDEX.init(&write_txn)?;
            }
            // v2 moved binary payloads out of the database; nothing to create.
            _ => {}
        }
    }

    {
        let mut table = write_txn.open_table(SCHEMA_TABLE)?;
        table.insert(SCHEMA_KEY_VERSION, &to)?;
    }

    write_txn.commit()?;
    info!(from, to, "metadata schema upgraded");
    Ok(())
}
