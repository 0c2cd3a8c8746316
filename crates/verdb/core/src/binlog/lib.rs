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

// Common types for binlog production

use crate::catalog::CatalogError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BinlogError {
    #[error("Unexpected GTID format: {0}")]
    UnexpectedGtidFormat(String),
    #[error("Unable to parse GTID position: {0}")]
    InvalidGtid(String),
    #[error("Row count for a keyless table row cannot be null")]
    NullKeylessCardinality,
    #[error("Row count for a modified row diff cannot be the same on both sides of the diff")]
    EqualKeylessCardinality,
    #[error("Unsupported type for binlog replication: {0}")]
    UnsupportedType(String),
    #[error("Value out of range for binlog replication: {0}")]
    ValueOutOfRange(String),
    #[error("Unsupported binlog_checksum value: {0}")]
    UnsupportedChecksum(String),
    #[error("Unable to read system variable {0}")]
    MissingSystemVariable(String),
    #[error("Unable to store GTID executed metadata: {0}")]
    PositionStore(String),
    #[error("Malformed binlog event: {0}")]
    MalformedEvent(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

pub type BinlogResult<T> = Result<T, BinlogError>;
