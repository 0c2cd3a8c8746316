// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Immutable versioned tables

use super::lib::{CatalogError, CatalogResult};
use super::schema::{IndexDef, PRIMARY_INDEX, Schema};
use crate::storage::{ChunkConfig, Hash, NodeStore, ProllyMap, Tuple};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// A single row change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowEdit {
    Insert(Tuple),
    /// Delete by full row; for keyed tables only the key columns matter
    Delete(Tuple),
}

/// Immutable table: schema, row data and one map per secondary index
///
/// The `tag` survives renames and schema changes, which is how deltas
/// between two roots recognize the same table under a new name.
#[derive(Debug, Clone)]
pub struct Table {
    tag: u64,
    name: String,
    schema: Arc<Schema>,
    rows: ProllyMap,
    indexes: BTreeMap<String, ProllyMap>,
}

impl Table {
    /// Create an empty table with a fresh random tag
    pub fn create(store: Arc<dyn NodeStore>, config: ChunkConfig, name: impl Into<String>, schema: Schema) -> CatalogResult<Self> {
        Self::with_tag(store, config, rand::random(), name, schema)
    }

    pub fn with_tag(store: Arc<dyn NodeStore>, config: ChunkConfig, tag: u64, name: impl Into<String>, schema: Schema) -> CatalogResult<Self> {
        let rows = ProllyMap::empty(store.clone(), config)?;
        let mut indexes = BTreeMap::new();
        for idx in schema.indexes() {
            indexes.insert(idx.name.to_lowercase(), ProllyMap::empty(store.clone(), config)?);
        }
        Ok(Self { tag, name: name.into(), schema: Arc::new(schema), rows, indexes })
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Primary row map
    pub fn rows(&self) -> &ProllyMap {
        &self.rows
    }

    /// Map backing an index; the primary index is the row map itself
    pub fn index_data(&self, name: &str) -> Option<&ProllyMap> {
        if name.eq_ignore_ascii_case(PRIMARY_INDEX) {
            return (!self.schema.is_keyless()).then_some(&self.rows);
        }
        self.indexes.get(&name.to_lowercase())
    }

    /// Content hash over schema and all data; equal hashes mean identical tables
    pub fn hash_of(&self) -> CatalogResult<Hash> {
        let schema_hash = self.schema.hash()?;
        let rows_hash = self.rows.root_hash();
        let mut parts: Vec<Vec<u8>> = vec![schema_hash.0.to_vec(), rows_hash.0.to_vec()];
        for (name, map) in &self.indexes {
            parts.push(name.as_bytes().to_vec());
            parts.push(map.root_hash().0.to_vec());
        }
        Ok(Hash::of_parts(parts.iter().map(|p| p.as_slice())))
    }

    /// Number of logical rows, counting keyless duplicates
    pub fn row_count(&self) -> CatalogResult<u64> {
        if !self.schema.is_keyless() {
            return Ok(self.rows.count());
        }
        let mut total = 0;
        for (_, value) in self.rows.entries()? {
            total += Schema::keyless_count(&value).unwrap_or(0);
        }
        Ok(total)
    }

    /// All logical rows in key order; keyless duplicates are repeated
    pub fn scan(&self) -> CatalogResult<Vec<Tuple>> {
        let mut out = Vec::new();
        for (key, value) in self.rows.entries()? {
            let row = self.schema.row_from_entry(&key, &value)?;
            let copies = if self.schema.is_keyless() { Schema::keyless_count(&value).unwrap_or(0) } else { 1 };
            for _ in 0..copies {
                out.push(row.clone());
            }
        }
        Ok(out)
    }

    pub fn rename(&self, name: impl Into<String>) -> Table {
        Table { name: name.into(), ..self.clone() }
    }

    /// Apply row edits in order, returning the new table version
    pub fn apply(&self, edits: Vec<RowEdit>) -> CatalogResult<Table> {
        let keyless = self.schema.is_keyless();
        let secondary: Vec<IndexDef> = self.schema.indexes().to_vec();
        let mut row_edits: BTreeMap<Tuple, Option<Tuple>> = BTreeMap::new();
        let mut index_edits: BTreeMap<String, BTreeMap<Tuple, Option<Tuple>>> = BTreeMap::new();

        for edit in edits {
            let row = match &edit {
                RowEdit::Insert(row) | RowEdit::Delete(row) => row,
            };
            let key = self.schema.row_key(row)?;
            let current = match row_edits.get(&key) {
                Some(pending) => pending.clone(),
                None => self.rows.get(&key)?,
            };
            match edit {
                RowEdit::Insert(row) if keyless => {
                    let count = current.as_ref().and_then(Schema::keyless_count).unwrap_or(0) + 1;
                    row_edits.insert(key, Some(self.schema.row_value(&row, count)?));
                    for idx in &secondary {
                        index_edits.entry(idx.name.to_lowercase()).or_default().insert(self.schema.index_key(idx, &row)?, Some(Tuple::empty()));
                    }
                }
                RowEdit::Insert(row) => {
                    if let Some(old) = &current {
                        let old_row = self.schema.row_from_entry(&key, old)?;
                        for idx in &secondary {
                            index_edits.entry(idx.name.to_lowercase()).or_default().insert(self.schema.index_key(idx, &old_row)?, None);
                        }
                    }
                    row_edits.insert(key, Some(self.schema.row_value(&row, 1)?));
                    for idx in &secondary {
                        index_edits.entry(idx.name.to_lowercase()).or_default().insert(self.schema.index_key(idx, &row)?, Some(Tuple::empty()));
                    }
                }
                RowEdit::Delete(row) => {
                    let Some(old) = current else {
                        continue;
                    };
                    let old_row = self.schema.row_from_entry(&key, &old)?;
                    let remaining = if keyless { Schema::keyless_count(&old).unwrap_or(1).saturating_sub(1) } else { 0 };
                    if remaining > 0 {
                        row_edits.insert(key, Some(self.schema.row_value(&row, remaining)?));
                    } else {
                        row_edits.insert(key, None);
                        for idx in &secondary {
                            index_edits.entry(idx.name.to_lowercase()).or_default().insert(self.schema.index_key(idx, &old_row)?, None);
                        }
                    }
                }
            }
        }

        trace!(table = %self.name, rows = row_edits.len(), "applying row edits");
        let rows = self.rows.edit(row_edits)?;
        let mut indexes = self.indexes.clone();
        for (name, edits) in index_edits {
            let map = indexes.get(&name).ok_or_else(|| CatalogError::TableNotFound(format!("{}.{}", self.name, name)))?;
            let edited = map.edit(edits)?;
            indexes.insert(name, edited);
        }
        Ok(Table { rows, indexes, ..self.clone() })
    }

    /// Replace the schema, carrying rows over by column name
    ///
    /// New columns are filled with NULL; dropped columns are discarded.
    pub fn alter_schema(&self, schema: Schema) -> CatalogResult<Table> {
        let old_rows = self.scan()?;
        let mapping: Vec<Option<usize>> = schema.columns().iter().map(|c| self.schema.column(&c.name).map(|(i, _)| i)).collect();
        let store = self.rows.node_store().clone();
        let fresh = Table::with_tag(store, self.rows.config(), self.tag, self.name.clone(), schema)?;
        let edits = old_rows
            .into_iter()
            .map(|row| {
                let values = mapping.iter().map(|m| m.map(|i| row.values()[i].clone()).unwrap_or(crate::storage::Value::Null)).collect();
                RowEdit::Insert(Tuple::new(values))
            })
            .collect();
        fresh.apply(edits)
    }
}

/// Uniform access to the immutable table behind any table wrapper
pub trait VersionedTable: Send + Sync {
    fn versioned_table(&self) -> &Table;
}

impl VersionedTable for Table {
    fn versioned_table(&self) -> &Table {
        self
    }
}

impl VersionedTable for Arc<Table> {
    fn versioned_table(&self) -> &Table {
        self
    }
}

/// Table with buffered, not yet applied row edits
#[derive(Debug, Clone)]
pub struct WritableTable {
    base: Arc<Table>,
    pending: Vec<RowEdit>,
}

impl WritableTable {
    pub fn new(base: Arc<Table>) -> Self {
        Self { base, pending: Vec::new() }
    }

    pub fn insert(&mut self, row: Tuple) {
        self.pending.push(RowEdit::Insert(row));
    }

    pub fn delete(&mut self, row: Tuple) {
        self.pending.push(RowEdit::Delete(row));
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Apply buffered edits, producing the next table version
    pub fn finish(self) -> CatalogResult<Table> {
        self.base.apply(self.pending)
    }
}

impl VersionedTable for WritableTable {
    fn versioned_table(&self) -> &Table {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::{Column, ColumnType};
    use crate::storage::{MemoryNodeStore, Value};

    fn table(schema: Schema) -> Table {
        Table::with_tag(Arc::new(MemoryNodeStore::new()), ChunkConfig::default(), 1, "t", schema).unwrap()
    }

    fn row(vals: &[i64]) -> Tuple {
        Tuple::new(vals.iter().map(|v| Value::Int(*v)).collect())
    }

    fn keyed() -> Schema {
        Schema::new(vec![Column::new("pk", ColumnType::Int).primary_key(), Column::new("c0", ColumnType::Int)], vec![IndexDef::new("c0_idx", &["c0"])]).unwrap()
    }

    #[test]
    fn test_insert_update_delete_keeps_index_in_sync() {
        let t = table(keyed());
        let t = t.apply(vec![RowEdit::Insert(row(&[1, 10])), RowEdit::Insert(row(&[2, 20]))]).unwrap();
        let t = t.apply(vec![RowEdit::Insert(row(&[1, 11]))]).unwrap();
        assert_eq!(t.row_count().unwrap(), 2);
        let idx = t.index_data("c0_idx").unwrap();
        assert_eq!(idx.count(), 2);
        assert!(idx.get(&row(&[11, 1])).unwrap().is_some());
        assert!(idx.get(&row(&[10, 1])).unwrap().is_none());

        let t = t.apply(vec![RowEdit::Delete(row(&[2, 0]))]).unwrap();
        assert_eq!(t.scan().unwrap(), vec![row(&[1, 11])]);
        assert_eq!(t.index_data("c0_idx").unwrap().count(), 1);
    }

    #[test]
    fn test_keyless_duplicates() {
        let schema = Schema::new(vec![Column::new("a", ColumnType::Int), Column::new("b", ColumnType::Int)], vec![]).unwrap();
        let t = table(schema);
        let t = t.apply(vec![RowEdit::Insert(row(&[1, 1])), RowEdit::Insert(row(&[1, 1])), RowEdit::Insert(row(&[2, 2]))]).unwrap();
        assert_eq!(t.rows().count(), 2);
        assert_eq!(t.row_count().unwrap(), 3);
        let t = t.apply(vec![RowEdit::Delete(row(&[1, 1]))]).unwrap();
        assert_eq!(t.row_count().unwrap(), 2);
        assert!(t.index_data(PRIMARY_INDEX).is_none());
    }

    #[test]
    fn test_hash_tracks_content() {
        let a = table(keyed());
        let b = a.apply(vec![RowEdit::Insert(row(&[1, 1]))]).unwrap();
        let c = b.apply(vec![RowEdit::Delete(row(&[1, 1]))]).unwrap();
        assert_ne!(a.hash_of().unwrap(), b.hash_of().unwrap());
        assert_eq!(a.hash_of().unwrap(), c.hash_of().unwrap());
        assert_eq!(a.rename("u").hash_of().unwrap(), a.hash_of().unwrap());
    }

    #[test]
    fn test_alter_schema_carries_rows() {
        let t = table(keyed()).apply(vec![RowEdit::Insert(row(&[1, 5]))]).unwrap();
        let wider = Schema::new(vec![Column::new("pk", ColumnType::Int).primary_key(), Column::new("c0", ColumnType::Int), Column::new("c1", ColumnType::Text)], vec![]).unwrap();
        let altered = t.alter_schema(wider).unwrap();
        assert_eq!(altered.tag(), t.tag());
        assert_eq!(altered.scan().unwrap(), vec![Tuple::new(vec![Value::Int(1), Value::Int(5), Value::Null])]);
        assert!(altered.index_data("c0_idx").is_none());
    }

    #[test]
    fn test_writable_table_exposes_base() {
        let base = Arc::new(table(keyed()));
        let mut w = WritableTable::new(base.clone());
        w.insert(row(&[3, 3]));
        assert_eq!(w.pending(), 1);
        assert_eq!(w.versioned_table().hash_of().unwrap(), base.hash_of().unwrap());
        assert_eq!(w.finish().unwrap().row_count().unwrap(), 1);
    }
}
