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

//! Row values and tuples
//!
//! Tuples are the unit stored in the ordered map: an index key is a tuple of
//! the indexed columns, a row value is a tuple of the remaining columns.
//! Tuples carry a total order so they can be used as map keys.

use super::lib::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single SQL value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) | Value::UInt(_) | Value::Float(_) => 1,
            Value::Text(_) => 2,
            Value::Bytes(_) => 3,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::UInt(a), Value::UInt(b)) => a.cmp(b),
            (Value::Int(a), Value::UInt(b)) => (*a as i128).cmp(&(*b as i128)),
            (Value::UInt(a), Value::Int(b)) => (*a as i128).cmp(&(*b as i128)),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Float(a), Value::UInt(b)) => a.total_cmp(&(*b as f64)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::UInt(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
            Value::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// An ordered sequence of values
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tuple(pub Vec<Value>);

/// Rows handed to statistics consumers are plain tuples
pub type Row = Tuple;

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Value> {
        self.0.get(i)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// The leading `n` fields, clamped to the tuple length
    pub fn prefix(&self, n: usize) -> Tuple {
        Tuple(self.0[..n.min(self.0.len())].to_vec())
    }

    /// True if any of the leading `n` fields is NULL
    pub fn prefix_has_nulls(&self, n: usize) -> bool {
        self.0.iter().take(n).any(Value::is_null)
    }

    /// Stable byte encoding, used as hashing input
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        let (tuple, _): (Tuple, _) = bincode::serde::decode_from_slice(data, bincode::config::standard()).map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(tuple)
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Tuple(values)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_total_order() {
        assert!(Value::Null < Value::Int(-5));
        assert!(Value::Int(-1) < Value::UInt(0));
        assert!(Value::UInt(3) > Value::Int(2));
        assert!(Value::Float(1.5) < Value::Int(2));
        assert!(Value::Int(10) < Value::Text("a".into()));
        assert_eq!(Value::Int(7), Value::UInt(7));
    }

    #[test]
    fn test_tuple_prefix_and_nulls() {
        let t = Tuple::new(vec![Value::Int(1), Value::Null, Value::from("x")]);
        assert_eq!(t.prefix(1), Tuple::new(vec![Value::Int(1)]));
        assert_eq!(t.prefix(9).len(), 3);
        assert!(!t.prefix_has_nulls(1));
        assert!(t.prefix_has_nulls(2));
    }

    #[test]
    fn test_tuple_lexicographic_order() {
        let a = Tuple::new(vec![Value::Int(1), Value::Int(9)]);
        let b = Tuple::new(vec![Value::Int(2), Value::Int(0)]);
        assert!(a < b);
    }

    #[test]
    fn test_tuple_encode_decode() {
        let t = Tuple::new(vec![Value::Int(1), Value::from("abc"), Value::Null]);
        let bytes = t.encode().unwrap();
        assert_eq!(Tuple::decode(&bytes).unwrap(), t);
    }
}
