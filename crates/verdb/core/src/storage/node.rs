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

//! Tree nodes for the ordered row map
//!
//! A node is immutable and identified by the hash of its encoded content.
//! Leaf nodes hold key/value tuples; internal nodes hold the first key of each
//! child together with the child's address and subtree row count, which is
//! what allows ordinal (row number) addressing without reading leaves.

use super::hash::Hash;
use super::lib::{StorageResult, decode, encode};
use super::tuple::Tuple;
use serde::{Deserialize, Serialize};

/// Reference from an internal node to one child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
    /// First key stored under the child
    pub first_key: Tuple,
    /// Address of the child node
    pub address: Hash,
    /// Number of leaf entries under the child
    pub tree_count: u64,
}

/// Content of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    /// Level 0: key/value entries
    Leaf { keys: Vec<Tuple>, values: Vec<Tuple> },
    /// Level > 0: ordered children
    Internal { level: u32, children: Vec<ChildRef> },
}

/// Content-addressed tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: Hash,
    node_type: NodeType,
}

impl Node {
    /// Create a leaf node; keys must already be sorted
    pub fn new_leaf(keys: Vec<Tuple>, values: Vec<Tuple>) -> StorageResult<Self> {
        Self::from_type(NodeType::Leaf { keys, values })
    }

    /// Create an internal node one level above its children
    pub fn new_internal(level: u32, children: Vec<ChildRef>) -> StorageResult<Self> {
        Self::from_type(NodeType::Internal { level, children })
    }

    fn from_type(node_type: NodeType) -> StorageResult<Self> {
        let encoded = encode(&node_type)?;
        Ok(Self { id: Hash::of(&encoded), node_type })
    }

    /// Decode a node and recompute its address
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        let node_type: NodeType = decode(data)?;
        Ok(Self { id: Hash::of(data), node_type })
    }

    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        encode(&self.node_type)
    }

    pub fn hash_of(&self) -> Hash {
        self.id
    }

    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    pub fn level(&self) -> u32 {
        match &self.node_type {
            NodeType::Leaf { .. } => 0,
            NodeType::Internal { level, .. } => *level,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.node_type, NodeType::Leaf { .. })
    }

    /// Number of entries directly in this node
    pub fn count(&self) -> usize {
        match &self.node_type {
            NodeType::Leaf { keys, .. } => keys.len(),
            NodeType::Internal { children, .. } => children.len(),
        }
    }

    /// Number of leaf entries in the subtree rooted here
    pub fn tree_count(&self) -> u64 {
        match &self.node_type {
            NodeType::Leaf { keys, .. } => keys.len() as u64,
            NodeType::Internal { children, .. } => children.iter().map(|c| c.tree_count).sum(),
        }
    }

    pub fn first_key(&self) -> Option<&Tuple> {
        match &self.node_type {
            NodeType::Leaf { keys, .. } => keys.first(),
            NodeType::Internal { children, .. } => children.first().map(|c| &c.first_key),
        }
    }

    pub fn children(&self) -> &[ChildRef] {
        match &self.node_type {
            NodeType::Leaf { .. } => &[],
            NodeType::Internal { children, .. } => children,
        }
    }
}
