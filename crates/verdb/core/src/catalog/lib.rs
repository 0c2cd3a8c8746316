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

// Common types for databases, branches and tables

use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),
    #[error("Database already exists: {0}")]
    DatabaseExists(String),
    #[error("Branch not found: {database}/{branch}")]
    BranchNotFound { database: String, branch: String },
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Table already exists: {0}")]
    TableExists(String),
    #[error("Invalid row: {0}")]
    InvalidRow(String),
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
    #[error("Table delta has neither an old nor a new table")]
    EmptyDelta,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Update listener failed: {0}")]
    Listener(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Outcome returned by update listeners; any error type can be surfaced
pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
