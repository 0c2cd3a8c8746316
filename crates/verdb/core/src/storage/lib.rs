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

// Common types for the content-addressed row store

use super::hash::Hash;
use std::io;

/// Error types specific to the row store
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Node {0} not found")]
    NodeNotFound(Hash),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Ordinal range [{start}, {end}) out of bounds for map of {count} entries")]
    OrdinalOutOfRange { start: u64, end: u64, count: u64 },

    #[error("Corrupted storage: {0}")]
    Corruption(String),
}

/// Result type for row store operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Generate a wall clock timestamp in nanoseconds
pub fn generate_timestamp() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or_default()
}

/// Encode any serializable value with the store's bincode configuration
pub fn encode<T: serde::Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Decode a value written by [`encode`]
pub fn decode<T: serde::de::DeserializeOwned>(data: &[u8]) -> StorageResult<T> {
    let (value, _) = bincode::serde::decode_from_slice(data, bincode::config::standard()).map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(value)
}
