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

//! Row images and column type metadata for row-based replication

use super::lib::{BinlogError, BinlogResult};
use crate::catalog::{ColumnType, Schema};
use crate::storage::{Diff, DiffType, Tuple, Value};

pub const TYPE_TINY: u8 = 1;
pub const TYPE_SHORT: u8 = 2;
pub const TYPE_LONG: u8 = 3;
pub const TYPE_FLOAT: u8 = 4;
pub const TYPE_DOUBLE: u8 = 5;
pub const TYPE_LONGLONG: u8 = 8;
pub const TYPE_VARCHAR: u8 = 15;
pub const TYPE_BLOB: u8 = 252;

/// Bytes per character of the default utf8mb4 collation
const MAX_CHAR_BYTES: u32 = 4;

/// Fixed-size bit set, least significant bit first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u8>,
    count: usize,
}

impl Bitmap {
    pub fn new(count: usize) -> Self {
        Self { bits: vec![0; count.div_ceil(8)], count }
    }

    /// Bitmap with every bit set
    pub fn full(count: usize) -> Self {
        let mut bitmap = Self::new(count);
        for i in 0..count {
            bitmap.set(i, true);
        }
        bitmap
    }

    pub fn set(&mut self, i: usize, value: bool) {
        if i >= self.count {
            return;
        }
        if value {
            self.bits[i / 8] |= 1 << (i % 8);
        } else {
            self.bits[i / 8] &= !(1 << (i % 8));
        }
    }

    pub fn is_set(&self, i: usize) -> bool {
        i < self.count && self.bits[i / 8] & (1 << (i % 8)) != 0
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bits
    }
}

/// Column layout of one table as sent in a table map event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMap {
    pub flags: u16,
    pub database: String,
    pub name: String,
    pub types: Vec<u8>,
    pub can_be_null: Bitmap,
    pub metadata: Vec<u16>,
}

/// One row image pair; unused halves stay empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowImage {
    pub null_columns: Bitmap,
    pub data: Vec<u8>,
    pub null_identify_columns: Bitmap,
    pub identify: Vec<u8>,
}

/// Rows of one rows event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rows {
    pub flags: u16,
    pub identify_columns: Option<Bitmap>,
    pub data_columns: Option<Bitmap>,
    pub rows: Vec<RowImage>,
}

/// Wire type code and metadata for a column type
pub fn column_metadata(ty: &ColumnType) -> BinlogResult<(u8, u16)> {
    Ok(match ty {
        ColumnType::TinyInt => (TYPE_TINY, 0),
        ColumnType::SmallInt => (TYPE_SHORT, 0),
        ColumnType::Int => (TYPE_LONG, 0),
        ColumnType::BigInt => (TYPE_LONGLONG, 0),
        ColumnType::Float => (TYPE_FLOAT, 4),
        ColumnType::Double => (TYPE_DOUBLE, 8),
        ColumnType::Varchar(n) => {
            let max_bytes = n.checked_mul(MAX_CHAR_BYTES).and_then(|b| u16::try_from(b).ok()).ok_or_else(|| BinlogError::UnsupportedType(ty.to_string()))?;
            (TYPE_VARCHAR, max_bytes)
        }
        // 2-byte length prefix
        ColumnType::Text | ColumnType::Blob => (TYPE_BLOB, 2),
    })
}

/// Append the table map metadata bytes for one column
pub fn write_metadata(out: &mut Vec<u8>, ty: u8, meta: u16) {
    match ty {
        TYPE_FLOAT | TYPE_DOUBLE | TYPE_BLOB => out.push(meta as u8),
        TYPE_VARCHAR => out.extend_from_slice(&meta.to_le_bytes()),
        _ => {}
    }
}

/// Table map for `schema`, listing every column
pub fn table_map_for(database: &str, name: &str, schema: &Schema) -> BinlogResult<TableMap> {
    let columns = schema.columns();
    let mut types = Vec::with_capacity(columns.len());
    let mut metadata = Vec::with_capacity(columns.len());
    let mut can_be_null = Bitmap::new(columns.len());
    for (i, col) in columns.iter().enumerate() {
        let (ty, meta) = column_metadata(&col.ty)?;
        types.push(ty);
        metadata.push(meta);
        can_be_null.set(i, col.nullable);
    }
    Ok(TableMap { flags: 0, database: database.to_string(), name: name.to_string(), types, can_be_null, metadata })
}

fn type_mismatch(ty: &ColumnType, value: &Value) -> BinlogError {
    BinlogError::UnsupportedType(format!("cannot encode {:?} as {}", value, ty))
}

fn integer(ty: &ColumnType, value: &Value) -> BinlogResult<i64> {
    value.as_i64().ok_or_else(|| type_mismatch(ty, value))
}

fn float(ty: &ColumnType, value: &Value) -> BinlogResult<f64> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        Value::UInt(u) => Ok(*u as f64),
        _ => Err(type_mismatch(ty, value)),
    }
}

fn raw_bytes<'a>(ty: &ColumnType, value: &'a Value) -> BinlogResult<&'a [u8]> {
    match value {
        Value::Text(s) => Ok(s.as_bytes()),
        Value::Bytes(b) => Ok(b),
        _ => Err(type_mismatch(ty, value)),
    }
}

fn out_of_range(ty: &ColumnType, value: &Value) -> BinlogError {
    BinlogError::ValueOutOfRange(format!("{} does not fit {}", value, ty))
}

fn narrow<T: TryFrom<i64>>(ty: &ColumnType, value: &Value) -> BinlogResult<T> {
    T::try_from(integer(ty, value)?).map_err(|_| out_of_range(ty, value))
}

fn write_value(out: &mut Vec<u8>, ty: &ColumnType, value: &Value) -> BinlogResult<()> {
    match ty {
        ColumnType::TinyInt => out.extend_from_slice(&narrow::<i8>(ty, value)?.to_le_bytes()),
        ColumnType::SmallInt => out.extend_from_slice(&narrow::<i16>(ty, value)?.to_le_bytes()),
        ColumnType::Int => out.extend_from_slice(&narrow::<i32>(ty, value)?.to_le_bytes()),
        ColumnType::BigInt => out.extend_from_slice(&integer(ty, value)?.to_le_bytes()),
        ColumnType::Float => out.extend_from_slice(&(float(ty, value)? as f32).to_le_bytes()),
        ColumnType::Double => out.extend_from_slice(&float(ty, value)?.to_le_bytes()),
        ColumnType::Varchar(chars) => {
            let bytes = raw_bytes(ty, value)?;
            let (_, max_bytes) = column_metadata(ty)?;
            let too_long = match value {
                Value::Text(s) => s.chars().count() > *chars as usize,
                _ => false,
            };
            if too_long || bytes.len() > max_bytes as usize {
                return Err(out_of_range(ty, value));
            }
            // max_bytes bounds the length, so the prefix cannot truncate
            if max_bytes > 255 {
                out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
            } else {
                out.push(bytes.len() as u8);
            }
            out.extend_from_slice(bytes);
        }
        ColumnType::Text | ColumnType::Blob => {
            let bytes = raw_bytes(ty, value)?;
            let len = u16::try_from(bytes.len()).map_err(|_| out_of_range(ty, value))?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(bytes);
        }
    }
    Ok(())
}

/// Encode a full row as a binlog row image plus its null bitmap
pub fn serialize_row(schema: &Schema, row: &Tuple) -> BinlogResult<(Vec<u8>, Bitmap)> {
    let columns = schema.columns();
    if row.len() != columns.len() {
        return Err(BinlogError::Catalog(crate::catalog::CatalogError::InvalidRow(format!("expected {} columns, found {}", columns.len(), row.len()))));
    }
    let mut data = Vec::new();
    let mut nulls = Bitmap::new(columns.len());
    for (i, (col, value)) in columns.iter().zip(row.values()).enumerate() {
        if value.is_null() {
            nulls.set(i, true);
            continue;
        }
        write_value(&mut data, &col.ty, value)?;
    }
    Ok((data, nulls))
}

fn keyless_count(side: Option<&Tuple>) -> BinlogResult<u64> {
    side.and_then(Schema::keyless_count).ok_or(BinlogError::NullKeylessCardinality)
}

/// How many row events a diff stands for, and of which kind
///
/// Keyed tables always map one diff to one event. Keyless rows carry a
/// duplicate count, so a modified keyless entry becomes that many inserts
/// or deletes; equal counts on both sides are rejected.
pub fn extract_row_count_and_diff_type(schema: &Schema, diff: &Diff) -> BinlogResult<(u64, DiffType)> {
    if !schema.is_keyless() {
        return Ok((1, diff.kind));
    }
    match diff.kind {
        DiffType::Added => Ok((keyless_count(diff.to.as_ref())?, DiffType::Added)),
        DiffType::Removed => Ok((keyless_count(diff.from.as_ref())?, DiffType::Removed)),
        DiffType::Modified => {
            let to = keyless_count(diff.to.as_ref())?;
            let from = keyless_count(diff.from.as_ref())?;
            if to > from {
                Ok((to - from, DiffType::Added))
            } else if to < from {
                Ok((from - to, DiffType::Removed))
            } else {
                Err(BinlogError::EqualKeylessCardinality)
            }
        }
    }
}
