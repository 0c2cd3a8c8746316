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

//! JSON snapshots of one database, used as CLI input
//!
//! ```json
//! {
//!   "database": "app",
//!   "tables": [{
//!     "name": "people",
//!     "columns": [{"name": "id", "type": "bigint", "primary_key": true}, {"name": "city", "type": {"varchar": 32}}],
//!     "indexes": [{"name": "city_idx", "columns": ["city"]}],
//!     "rows": [[1, "oslo"], [2, null]]
//!   }]
//! }
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;
use verdb_core::catalog::{Column, IndexDef, RootValue, RowEdit, Schema, Table, TableName};
use verdb_core::storage::{Hash, Tuple, Value};

#[derive(Debug, Deserialize)]
pub struct DatabaseFixture {
    pub database: String,
    #[serde(default)]
    pub tables: Vec<TableFixture>,
}

#[derive(Debug, Deserialize)]
pub struct TableFixture {
    pub name: String,
    /// Identity that survives renames; derived from the name when absent
    #[serde(default)]
    pub tag: Option<u64>,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl DatabaseFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading fixture {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing fixture {}", path.display()))
    }

    /// Add every table of the fixture to `root`
    pub fn build(&self, root: RootValue) -> Result<RootValue> {
        let mut root = root;
        for table in &self.tables {
            root = table.install(root)?;
        }
        Ok(root)
    }
}

impl TableFixture {
    fn tag(&self) -> u64 {
        self.tag.unwrap_or_else(|| {
            let digest = Hash::of(self.name.to_lowercase().as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest.0[..8]);
            u64::from_le_bytes(bytes)
        })
    }

    fn install(&self, root: RootValue) -> Result<RootValue> {
        let schema = Schema::new(self.columns.clone(), self.indexes.clone()).with_context(|| format!("schema of {}", self.name))?;
        let table = Table::with_tag(root.node_store().clone(), root.chunk_config(), self.tag(), self.name.clone(), schema)?;
        let mut edits = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                bail!("{} row {} has {} values, expected {}", self.name, i, row.len(), self.columns.len());
            }
            let values = row.iter().map(json_value).collect::<Result<Vec<_>>>()?;
            edits.push(RowEdit::Insert(Tuple::new(values)));
        }
        let table = table.apply(edits).with_context(|| format!("loading rows of {}", self.name))?;
        Ok(root.put_table(TableName::new(self.name.clone()), table))
    }
}

fn json_value(value: &serde_json::Value) -> Result<Value> {
    Ok(match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Int(i64::from(*b)),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Value::Int(i),
            (None, Some(u), _) => Value::UInt(u),
            (None, None, Some(f)) => Value::Float(f),
            _ => bail!("unrepresentable number {}", n),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => bail!("unsupported cell value {}", other),
    })
}
