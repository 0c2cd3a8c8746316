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

//! Table schemas and the row storage encoding
//!
//! Primary-keyed tables store `key = pk columns`, `value = remaining columns`.
//! Keyless tables store `key = [row hash]`, `value = [duplicate count, all columns]`,
//! so identical rows collapse into one entry with a count. Secondary index
//! maps store `key = index columns ++ pk columns` (or the keyless row hash)
//! with an empty value.

use super::lib::{CatalogError, CatalogResult};
use crate::storage::lib::encode;
use crate::storage::{Hash, Tuple, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the implicit index over the primary key
pub const PRIMARY_INDEX: &str = "primary";

/// SQL column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Varchar(u32),
    Text,
    Blob,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::TinyInt => write!(f, "tinyint"),
            ColumnType::SmallInt => write!(f, "smallint"),
            ColumnType::Int => write!(f, "int"),
            ColumnType::BigInt => write!(f, "bigint"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Double => write!(f, "double"),
            ColumnType::Varchar(n) => write!(f, "varchar({})", n),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Blob => write!(f, "blob"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self { name: name.into(), ty, nullable: true, primary_key: false }
    }

    /// Mark as primary key; primary key columns are never nullable
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Btree,
    Spatial,
    FullText,
    Vector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub kind: IndexKind,
    /// Backed by a generated column expression
    #[serde(default)]
    pub generated: bool,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
            kind: IndexKind::Btree,
            generated: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn kind(mut self, kind: IndexKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_primary(&self) -> bool {
        self.name.eq_ignore_ascii_case(PRIMARY_INDEX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
    #[serde(default)]
    indexes: Vec<IndexDef>,
}

impl Schema {
    pub fn new(columns: Vec<Column>, indexes: Vec<IndexDef>) -> CatalogResult<Self> {
        let schema = Self { columns, indexes };
        for idx in &schema.indexes {
            if idx.is_primary() {
                return Err(CatalogError::InvalidRow(format!("index name `{}` is reserved", idx.name)));
            }
            for col in &idx.columns {
                if schema.column(col).is_none() {
                    return Err(CatalogError::UnknownColumn(format!("{} (index {})", col, idx.name)));
                }
            }
        }
        Ok(schema)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Secondary indexes
    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    /// Case-insensitive column lookup
    pub fn column(&self, name: &str) -> Option<(usize, &Column)> {
        self.columns.iter().enumerate().find(|(_, c)| c.name.eq_ignore_ascii_case(name))
    }

    pub fn is_keyless(&self) -> bool {
        !self.columns.iter().any(|c| c.primary_key)
    }

    pub fn pk_ordinals(&self) -> Vec<usize> {
        self.columns.iter().enumerate().filter(|(_, c)| c.primary_key).map(|(i, _)| i).collect()
    }

    pub fn non_pk_ordinals(&self) -> Vec<usize> {
        self.columns.iter().enumerate().filter(|(_, c)| !c.primary_key).map(|(i, _)| i).collect()
    }

    /// Primary index (if any) followed by secondary indexes
    pub fn all_indexes(&self) -> Vec<IndexDef> {
        let mut out = Vec::with_capacity(self.indexes.len() + 1);
        if !self.is_keyless() {
            let pk: Vec<&str> = self.columns.iter().filter(|c| c.primary_key).map(|c| c.name.as_str()).collect();
            out.push(IndexDef::new(PRIMARY_INDEX, &pk).unique());
        }
        out.extend(self.indexes.iter().cloned());
        out
    }

    pub fn index(&self, name: &str) -> Option<IndexDef> {
        self.all_indexes().into_iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// Stable content hash; changes whenever columns or indexes change
    pub fn hash(&self) -> CatalogResult<Hash> {
        Ok(Hash::of(&encode(self)?))
    }

    fn check_row(&self, row: &Tuple) -> CatalogResult<()> {
        if row.len() != self.columns.len() {
            return Err(CatalogError::InvalidRow(format!("expected {} values, got {}", self.columns.len(), row.len())));
        }
        for (col, val) in self.columns.iter().zip(row.values()) {
            if val.is_null() && !col.nullable {
                return Err(CatalogError::InvalidRow(format!("column `{}` cannot be NULL", col.name)));
            }
        }
        Ok(())
    }

    /// Identity of a keyless row
    pub fn keyless_row_id(row: &Tuple) -> CatalogResult<Tuple> {
        Ok(Tuple::new(vec![Value::Bytes(Hash::of(&row.encode()?).0.to_vec())]))
    }

    /// Primary map key for a full row
    pub fn row_key(&self, row: &Tuple) -> CatalogResult<Tuple> {
        self.check_row(row)?;
        if self.is_keyless() {
            return Self::keyless_row_id(row);
        }
        Ok(Tuple::new(self.pk_ordinals().into_iter().map(|i| row.values()[i].clone()).collect()))
    }

    /// Primary map value for a full row; keyless values carry `count` first
    pub fn row_value(&self, row: &Tuple, count: u64) -> CatalogResult<Tuple> {
        self.check_row(row)?;
        if self.is_keyless() {
            let mut values = Vec::with_capacity(row.len() + 1);
            values.push(Value::UInt(count));
            values.extend(row.values().iter().cloned());
            return Ok(Tuple::new(values));
        }
        Ok(Tuple::new(self.non_pk_ordinals().into_iter().map(|i| row.values()[i].clone()).collect()))
    }

    /// Rebuild a full row from a primary map entry
    pub fn row_from_entry(&self, key: &Tuple, value: &Tuple) -> CatalogResult<Tuple> {
        if self.is_keyless() {
            if value.len() != self.columns.len() + 1 {
                return Err(CatalogError::InvalidRow(format!("keyless value has {} fields", value.len())));
            }
            return Ok(Tuple::new(value.values()[1..].to_vec()));
        }
        let pk = self.pk_ordinals();
        let rest = self.non_pk_ordinals();
        if key.len() != pk.len() || value.len() != rest.len() {
            return Err(CatalogError::InvalidRow(format!("entry shape ({}, {}) does not match schema", key.len(), value.len())));
        }
        let mut values = vec![Value::Null; self.columns.len()];
        for (i, v) in pk.into_iter().zip(key.values()) {
            values[i] = v.clone();
        }
        for (i, v) in rest.into_iter().zip(value.values()) {
            values[i] = v.clone();
        }
        Ok(Tuple::new(values))
    }

    /// Duplicate count stored in a keyless value
    pub fn keyless_count(value: &Tuple) -> Option<u64> {
        value.get(0).and_then(Value::as_u64)
    }

    /// Secondary index key for a full row
    pub fn index_key(&self, index: &IndexDef, row: &Tuple) -> CatalogResult<Tuple> {
        let mut values = Vec::with_capacity(index.columns.len() + 1);
        for name in &index.columns {
            let (i, _) = self.column(name).ok_or_else(|| CatalogError::UnknownColumn(name.clone()))?;
            values.push(row.values()[i].clone());
        }
        values.extend(self.row_key(row)?.0);
        Ok(Tuple::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Schema {
        Schema::new(
            vec![Column::new("id", ColumnType::Int).primary_key(), Column::new("name", ColumnType::Varchar(32)), Column::new("age", ColumnType::Int)],
            vec![IndexDef::new("by_age", &["age"])],
        )
        .unwrap()
    }

    #[test]
    fn test_pk_row_encoding() {
        let schema = people();
        let row = Tuple::new(vec![Value::Int(1), Value::from("ann"), Value::Int(30)]);
        let key = schema.row_key(&row).unwrap();
        let value = schema.row_value(&row, 1).unwrap();
        assert_eq!(key, Tuple::new(vec![Value::Int(1)]));
        assert_eq!(value.len(), 2);
        assert_eq!(schema.row_from_entry(&key, &value).unwrap(), row);
        let idx = &schema.indexes()[0];
        assert_eq!(schema.index_key(idx, &row).unwrap(), Tuple::new(vec![Value::Int(30), Value::Int(1)]));
    }

    #[test]
    fn test_keyless_row_encoding() {
        let schema = Schema::new(vec![Column::new("a", ColumnType::Int), Column::new("b", ColumnType::Text)], vec![]).unwrap();
        assert!(schema.is_keyless());
        assert!(schema.all_indexes().is_empty());
        let row = Tuple::new(vec![Value::Int(1), Value::from("x")]);
        let value = schema.row_value(&row, 4).unwrap();
        assert_eq!(Schema::keyless_count(&value), Some(4));
        let key = schema.row_key(&row).unwrap();
        assert_eq!(schema.row_from_entry(&key, &value).unwrap(), row);
    }

    #[test]
    fn test_primary_index_listed_first() {
        let names: Vec<String> = people().all_indexes().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["primary".to_string(), "by_age".to_string()]);
    }

    #[test]
    fn test_rejects_bad_rows_and_indexes() {
        let schema = people();
        assert!(matches!(schema.row_key(&Tuple::new(vec![Value::Int(1)])), Err(CatalogError::InvalidRow(_))));
        assert!(matches!(schema.row_key(&Tuple::new(vec![Value::Null, Value::Null, Value::Null])), Err(CatalogError::InvalidRow(_))));
        let bad = Schema::new(vec![Column::new("a", ColumnType::Int)], vec![IndexDef::new("i", &["nope"])]);
        assert!(matches!(bad, Err(CatalogError::UnknownColumn(_))));
    }

    #[test]
    fn test_schema_hash_tracks_changes() {
        let a = people();
        let mut cols = a.columns().to_vec();
        cols.push(Column::new("extra", ColumnType::Blob));
        let b = Schema::new(cols, a.indexes().to_vec()).unwrap();
        assert_eq!(a.hash().unwrap(), people().hash().unwrap());
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }
}
