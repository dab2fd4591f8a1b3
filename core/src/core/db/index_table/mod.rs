//! Secondary index tables kept in step with the clips table.

use crate::core::db::error::DatabaseError;
use crate::types::{ClipId, CreatedKey};
use redb::{
    MultimapTableDefinition, ReadTransaction, ReadableMultimapTable, ReadableTable,
    TableDefinition, WriteTransaction,
};

/// Stores `CreatedKey { created_at, id }` entries, iterated in creation order.
pub struct CreatedIndex {
    definition: TableDefinition<'static, CreatedKey, ()>,
}

impl CreatedIndex {
    pub const fn new(name: &'static str) -> Self {
        Self {
            definition: TableDefinition::new(name),
        }
    }

    pub fn init(&self, txn: &WriteTransaction) -> Result<(), DatabaseError> {
        txn.open_table(self.definition)?;
        Ok(())
    }

    pub fn insert(&self, txn: &WriteTransaction, key: &CreatedKey) -> Result<(), DatabaseError> {
        let mut table = txn.open_table(self.definition)?;
        table.insert(key, &())?;
        Ok(())
    }

    /// Returns `true` if the entry was present.
    pub fn remove(&self, txn: &WriteTransaction, key: &CreatedKey) -> Result<bool, DatabaseError> {
        let mut table = txn.open_table(self.definition)?;
        Ok(table.remove(key)?.is_some())
    }

    /// Returns ids newest first, at most `limit` of them.
    pub fn newest_first(
        &self,
        txn: &ReadTransaction,
        limit: Option<usize>,
    ) -> Result<Vec<ClipId>, DatabaseError> {
        let table = txn.open_table(self.definition)?;
        let limit = limit.unwrap_or(usize::MAX);

        table
            .iter()?
            .rev()
            .take(limit)
            .map(|entry| {
                let (key_guard, _) = entry?;
                Ok(key_guard.value().id)
            })
            .collect()
    }

    pub fn clear(&self, txn: &WriteTransaction) -> Result<(), DatabaseError> {
        txn.delete_table(self.definition)?;
        self.init(txn)
    }
}

/// Many-to-many lookup from a field value to the ids of clips carrying it.
pub struct FieldIndex {
    definition: MultimapTableDefinition<'static, &'static str, &'static str>,
}

impl FieldIndex {
    pub const fn new(name: &'static str) -> Self {
        Self {
            definition: MultimapTableDefinition::new(name),
        }
    }

    pub fn init(&self, txn: &WriteTransaction) -> Result<(), DatabaseError> {
        txn.open_multimap_table(self.definition)?;
        Ok(())
    }

    pub fn insert(
        &self,
        txn: &WriteTransaction,
        value: &str,
        id: &ClipId,
    ) -> Result<(), DatabaseError> {
        let mut table = txn.open_multimap_table(self.definition)?;
        table.insert(value, id.as_str())?;
        Ok(())
    }

    /// Returns `true` if the entry was present.
    pub fn remove(
        &self,
        txn: &WriteTransaction,
        value: &str,
        id: &ClipId,
    ) -> Result<bool, DatabaseError> {
        let mut table = txn.open_multimap_table(self.definition)?;
        Ok(table.remove(value, id.as_str())?)
    }

    pub fn ids(&self, txn: &ReadTransaction, value: &str) -> Result<Vec<ClipId>, DatabaseError> {
        let table = txn.open_multimap_table(self.definition)?;
        let mut ids = Vec::new();

        for entry in table.get(value)? {
            let guard = entry?;
            if let Ok(id) = ClipId::try_from(guard.value()) {
                ids.push(id);
            }
        }

        Ok(ids)
    }

    pub fn clear(&self, txn: &WriteTransaction) -> Result<(), DatabaseError> {
        txn.delete_multimap_table(self.definition)?;
        self.init(txn)
    }
}
