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

// Common types for statistics collection

use crate::catalog::CatalogError;
use crate::storage::{Hash, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Statistics work cancelled")]
    Cancelled,
    #[error("Attempted to place a nil stats object")]
    NilStats,
    #[error("GC generation {found} did not match update generation {expected}")]
    GcGenerationMismatch { expected: u64, found: u64 },
    #[error("GC interrupted")]
    GcInterrupted,
    #[error("Failed to generate a statistic template: {0}")]
    TemplateFailed(String),
    #[error("Missing histogram bucket for node {0}")]
    MissingBucket(Hash),
    #[error("Worker panicked running work: {0}")]
    Panicked(String),
    #[error("Stats worker is not running")]
    WorkerNotRunning,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

pub type StatsResult<T> = Result<T, StatsError>;
