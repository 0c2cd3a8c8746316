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

//! Catalog
//!
//! Databases, branches and the immutable tables that statistics and binlog
//! production read from.
//!
//! # Core Components
//!
//! ## Schemas and Tables
//! - Column types, primary keys and secondary index definitions
//! - Keyed and keyless row encodings over the ordered row map
//!
//! ## Roots and Providers
//! - Root values map table names to immutable tables
//! - Committing a new working root notifies update listeners synchronously
//!
//! ## Deltas
//! - Tag-matched table deltas between two roots, rename aware
//! - DDL generation for schema changes

pub mod delta;
pub mod lib;
pub mod provider;
pub mod root;
pub mod schema;
pub mod sqlfmt;
pub mod table;

// Re-export commonly used types
pub use delta::{TableDelta, table_deltas};
pub use lib::{CatalogError, CatalogResult, ListenerResult};
pub use provider::{DEFAULT_BRANCH, DatabaseProvider, DatabaseUpdateListener, VersionedDatabase};
pub use root::{RootValue, TableName};
pub use schema::{Column, ColumnType, IndexDef, IndexKind, PRIMARY_INDEX, Schema};
pub use sqlfmt::{create_table_statement, schema_patch_statements};
pub use table::{RowEdit, Table, VersionedTable, WritableTable};
