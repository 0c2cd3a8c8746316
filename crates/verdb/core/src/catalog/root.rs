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

//! Root values: the full set of tables at one point in history

use super::lib::{CatalogError, CatalogResult};
use super::schema::Schema;
use super::table::Table;
use crate::storage::{ChunkConfig, Hash, HashDigest, NodeStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Schema-qualified table name; the default schema is the empty string
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self { schema: String::new(), name: name.into() }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self { schema: schema.into(), name: name.into() }
    }

    fn normalized(&self) -> TableName {
        TableName { schema: self.schema.to_lowercase(), name: self.name.to_lowercase() }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schema.is_empty() { write!(f, "{}", self.name) } else { write!(f, "{}.{}", self.schema, self.name) }
    }
}

/// Immutable snapshot of a database's tables
#[derive(Clone)]
pub struct RootValue {
    store: Arc<dyn NodeStore>,
    config: ChunkConfig,
    tables: BTreeMap<TableName, Arc<Table>>,
}

impl fmt::Debug for RootValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootValue").field("tables", &self.tables.keys().collect::<Vec<_>>()).finish()
    }
}

impl RootValue {
    pub fn empty(store: Arc<dyn NodeStore>, config: ChunkConfig) -> Self {
        Self { store, config, tables: BTreeMap::new() }
    }

    pub fn node_store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        self.config
    }

    /// Distinct schema names in sorted order
    pub fn schema_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().map(|t| t.schema.clone()).collect();
        names.dedup();
        names
    }

    /// Tables of one schema, ordered by name
    pub fn table_names(&self, schema: &str) -> Vec<TableName> {
        let schema = schema.to_lowercase();
        self.tables.keys().filter(|t| t.schema == schema).cloned().collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = (&TableName, &Arc<Table>)> {
        self.tables.iter()
    }

    pub fn get_table(&self, name: &TableName) -> Option<Arc<Table>> {
        self.tables.get(&name.normalized()).cloned()
    }

    /// Add a new empty table
    pub fn create_table(&self, name: TableName, schema: Schema) -> CatalogResult<RootValue> {
        let key = name.normalized();
        if self.tables.contains_key(&key) {
            return Err(CatalogError::TableExists(name.to_string()));
        }
        let table = Table::create(self.store.clone(), self.config, name.name.clone(), schema)?;
        Ok(self.put_table(key, table))
    }

    /// Insert or replace a table
    pub fn put_table(&self, name: TableName, table: Table) -> RootValue {
        let mut tables = self.tables.clone();
        tables.insert(name.normalized(), Arc::new(table));
        RootValue { tables, ..self.clone() }
    }

    pub fn remove_table(&self, name: &TableName) -> CatalogResult<RootValue> {
        let mut tables = self.tables.clone();
        tables.remove(&name.normalized()).ok_or_else(|| CatalogError::TableNotFound(name.to_string()))?;
        Ok(RootValue { tables, ..self.clone() })
    }

    pub fn rename_table(&self, from: &TableName, to: TableName) -> CatalogResult<RootValue> {
        let table = self.get_table(from).ok_or_else(|| CatalogError::TableNotFound(from.to_string()))?;
        if self.tables.contains_key(&to.normalized()) {
            return Err(CatalogError::TableExists(to.to_string()));
        }
        let renamed = table.rename(to.name.clone());
        Ok(self.remove_table(from)?.put_table(to, renamed))
    }

    /// Digest over every table name and content hash
    pub fn hash(&self) -> CatalogResult<Hash> {
        let mut digest = HashDigest::new();
        for (name, table) in &self.tables {
            digest.write(name.to_string().as_bytes());
            digest.write_hash(&table.hash_of()?);
        }
        Ok(digest.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::{Column, ColumnType};
    use crate::storage::MemoryNodeStore;

    fn schema() -> Schema {
        Schema::new(vec![Column::new("pk", ColumnType::Int).primary_key()], vec![]).unwrap()
    }

    #[test]
    fn test_create_rename_remove() {
        let root = RootValue::empty(Arc::new(MemoryNodeStore::new()), ChunkConfig::default());
        let root = root.create_table(TableName::new("T1"), schema()).unwrap();
        assert!(root.get_table(&TableName::new("t1")).is_some());
        assert!(matches!(root.create_table(TableName::new("t1"), schema()), Err(CatalogError::TableExists(_))));

        let tag = root.get_table(&TableName::new("t1")).unwrap().tag();
        let root = root.rename_table(&TableName::new("t1"), TableName::new("t2")).unwrap();
        assert_eq!(root.get_table(&TableName::new("t2")).unwrap().tag(), tag);
        assert_eq!(root.table_names(""), vec![TableName::new("t2")]);

        let root = root.remove_table(&TableName::new("t2")).unwrap();
        assert_eq!(root.tables().count(), 0);
    }

    #[test]
    fn test_hash_changes_with_tables() {
        let empty = RootValue::empty(Arc::new(MemoryNodeStore::new()), ChunkConfig::default());
        let one = empty.create_table(TableName::with_schema("s", "t"), schema()).unwrap();
        assert_ne!(empty.hash().unwrap(), one.hash().unwrap());
        assert_eq!(one.schema_names(), vec!["s".to_string()]);
    }
}
