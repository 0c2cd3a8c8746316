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

//! Per-table changes between two roots

use super::lib::{CatalogError, CatalogResult};
use super::root::{RootValue, TableName};
use super::schema::Schema;
use super::table::Table;
use crate::storage::{Diff, diff_maps};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What changed in one table between two roots
///
/// Tables are matched by tag, so a rename shows up as one delta with both
/// names set rather than a drop plus an add.
#[derive(Debug, Clone)]
pub struct TableDelta {
    pub from_name: Option<TableName>,
    pub to_name: Option<TableName>,
    pub from_table: Option<Arc<Table>>,
    pub to_table: Option<Arc<Table>>,
}

impl TableDelta {
    pub fn is_add(&self) -> bool {
        self.from_table.is_none() && self.to_table.is_some()
    }

    pub fn is_drop(&self) -> bool {
        self.from_table.is_some() && self.to_table.is_none()
    }

    pub fn is_rename(&self) -> bool {
        match (&self.from_name, &self.to_name) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        }
    }

    /// Name in the newer root, falling back to the old name for drops
    pub fn current_name(&self) -> CatalogResult<&TableName> {
        self.to_name.as_ref().or(self.from_name.as_ref()).ok_or(CatalogError::EmptyDelta)
    }

    pub fn from_schema(&self) -> Option<&Arc<Schema>> {
        self.from_table.as_ref().map(|t| t.schema())
    }

    pub fn to_schema(&self) -> Option<&Arc<Schema>> {
        self.to_table.as_ref().map(|t| t.schema())
    }

    pub fn has_schema_changed(&self) -> CatalogResult<bool> {
        match (self.from_schema(), self.to_schema()) {
            (Some(a), Some(b)) => Ok(a.hash()? != b.hash()?),
            _ => Ok(true),
        }
    }

    pub fn has_data_changed(&self) -> bool {
        let from = self.from_table.as_ref().map(|t| t.rows().root_hash());
        let to = self.to_table.as_ref().map(|t| t.rows().root_hash());
        match (from, to) {
            (Some(a), Some(b)) => a != b,
            (Some(_), None) => self.from_table.as_ref().is_some_and(|t| !t.rows().is_empty()),
            (None, Some(_)) => self.to_table.as_ref().is_some_and(|t| !t.rows().is_empty()),
            (None, None) => false,
        }
    }

    /// Row-level changes of the primary row map, in key order
    pub fn row_diffs(&self) -> CatalogResult<Vec<Diff>> {
        Ok(diff_maps(self.from_table.as_ref().map(|t| t.rows()), self.to_table.as_ref().map(|t| t.rows()))?)
    }
}

/// Compute deltas for every table that differs between `before` and `after`
///
/// Deltas for tables present in `after` come first in name order, then drops.
pub fn table_deltas(before: &RootValue, after: &RootValue) -> CatalogResult<Vec<TableDelta>> {
    let mut old_by_tag: BTreeMap<u64, (TableName, Arc<Table>)> = before.tables().map(|(n, t)| (t.tag(), (n.clone(), t.clone()))).collect();
    let mut deltas = Vec::new();

    for (name, table) in after.tables() {
        let delta = match old_by_tag.remove(&table.tag()) {
            Some((old_name, old)) => {
                if old_name == *name && old.hash_of()? == table.hash_of()? {
                    continue;
                }
                TableDelta { from_name: Some(old_name), to_name: Some(name.clone()), from_table: Some(old), to_table: Some(table.clone()) }
            }
            None => TableDelta { from_name: None, to_name: Some(name.clone()), from_table: None, to_table: Some(table.clone()) },
        };
        deltas.push(delta);
    }

    for (_, (name, table)) in old_by_tag {
        deltas.push(TableDelta { from_name: Some(name), to_name: None, from_table: Some(table), to_table: None });
    }
    Ok(deltas)
}
