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

//! Content-Addressed Row Store
//!
//! This module provides the immutable storage layer that both the statistics
//! worker and the binlog producer read from.
//!
//! # Core Components
//!
//! ## Ordered Map
//! - Immutable key/value map built from content-addressed nodes
//! - Content-defined chunking keeps unchanged key ranges at the same address
//! - Ordinal range iteration using per-subtree entry counts
//!
//! ## Diffing
//! - Ordered Added/Modified/Removed stream between two map versions
//! - Identical roots short-circuit without reading nodes
//!
//! ## Durable Key/Value Stores
//! - Volatile and single-file implementations of a byte-keyed store
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use verdb_core::storage::{ChunkConfig, MemoryNodeStore, NodeStore, ProllyMap, Tuple, Value, diff_maps};
//!
//! let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::new());
//! let key = |i: i64| Tuple::new(vec![Value::Int(i)]);
//!
//! let before = ProllyMap::from_entries(store, ChunkConfig::default(), (0..100).map(|i| (key(i), key(i)))).unwrap();
//! let after = before.edit([(key(7), None)]).unwrap();
//!
//! assert_eq!(after.count(), 99);
//! assert_eq!(diff_maps(Some(&before), Some(&after)).unwrap().len(), 1);
//! ```

pub mod diff;
pub mod hash;
pub mod kv;
pub mod lib;
pub mod map;
pub mod node;
pub mod node_store;
pub mod tuple;

// Re-export commonly used types
pub use diff::{Diff, DiffType, diff_maps};
pub use hash::{Hash, HashDigest};
pub use kv::{FileKv, KvOp, KvStore, MemoryKv};
pub use lib::{StorageError, StorageResult, generate_timestamp};
pub use map::{ChunkConfig, OrdinalRangeIter, ProllyMap};
pub use node::{ChildRef, Node, NodeType};
pub use node_store::{MemoryNodeStore, NodeStore};
pub use tuple::{Row, Tuple, Value};
