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

//! Node storage
//!
//! Nodes are written once and never mutated, so the store is an append-only
//! map from address to node.

use super::hash::Hash;
use super::lib::{StorageError, StorageResult};
use super::node::Node;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for node storage backends
pub trait NodeStore: Send + Sync {
    /// Get a node by its address
    fn read(&self, id: &Hash) -> StorageResult<Arc<Node>>;

    /// Store a node, returning its address
    fn write(&self, node: Node) -> StorageResult<Hash>;

    /// Check whether a node is present
    fn contains(&self, id: &Hash) -> bool;
}

/// In-memory node store
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    nodes: RwLock<HashMap<Hash, Arc<Node>>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored nodes
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl NodeStore for MemoryNodeStore {
    fn read(&self, id: &Hash) -> StorageResult<Arc<Node>> {
        self.nodes.read().get(id).cloned().ok_or(StorageError::NodeNotFound(*id))
    }

    fn write(&self, node: Node) -> StorageResult<Hash> {
        let id = node.hash_of();
        self.nodes.write().entry(id).or_insert_with(|| Arc::new(node));
        Ok(id)
    }

    fn contains(&self, id: &Hash) -> bool {
        self.nodes.read().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tuple::{Tuple, Value};

    #[test]
    fn test_write_is_idempotent() {
        let store = MemoryNodeStore::new();
        let node = Node::new_leaf(vec![Tuple::new(vec![Value::Int(1)])], vec![Tuple::empty()]).unwrap();
        let a = store.write(node.clone()).unwrap();
        let b = store.write(node).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&a));
    }

    #[test]
    fn test_missing_node() {
        let store = MemoryNodeStore::new();
        assert!(matches!(store.read(&Hash::of(b"x")), Err(StorageError::NodeNotFound(_))));
    }
}
