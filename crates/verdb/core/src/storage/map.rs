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

//! Immutable ordered map over content-addressed nodes
//!
//! Entries are chunked into leaves with content-defined boundaries: whether a
//! chunk ends after a key depends only on that key's hash. An edit therefore
//! only rewrites the chunks whose entries changed, and every untouched key
//! range keeps the exact same node address across versions. Internal levels
//! are chunked the same way over child addresses.

use super::hash::Hash;
use super::lib::{StorageError, StorageResult};
use super::node::{ChildRef, Node, NodeType};
use super::node_store::NodeStore;
use super::tuple::Tuple;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Content-defined chunking parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Average number of entries per leaf
    pub target_leaf: u32,
    /// Average number of children per internal node
    pub target_internal: u32,
    /// Hard cap on entries per node
    pub max_chunk: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_leaf: 16,
            target_internal: 8,
            max_chunk: 256,
        }
    }
}

fn is_boundary(hash: &Hash, target: u32) -> bool {
    let word = u32::from_le_bytes([hash.0[0], hash.0[1], hash.0[2], hash.0[3]]);
    target <= 1 || word % target == 0
}

/// Immutable ordered key/value map
#[derive(Clone)]
pub struct ProllyMap {
    root: Arc<Node>,
    store: Arc<dyn NodeStore>,
    config: ChunkConfig,
}

impl fmt::Debug for ProllyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProllyMap").field("root", &self.root.hash_of()).field("count", &self.root.tree_count()).finish()
    }
}

impl ProllyMap {
    /// Create an empty map
    pub fn empty(store: Arc<dyn NodeStore>, config: ChunkConfig) -> StorageResult<Self> {
        Self::from_sorted(store, config, Vec::new())
    }

    /// Build a map from unsorted entries; later duplicates win
    pub fn from_entries<I>(store: Arc<dyn NodeStore>, config: ChunkConfig, entries: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = (Tuple, Tuple)>,
    {
        let sorted: BTreeMap<Tuple, Tuple> = entries.into_iter().collect();
        Self::from_sorted(store, config, sorted.into_iter().collect())
    }

    /// Load a map whose root node is already in `store`
    pub fn load(store: Arc<dyn NodeStore>, config: ChunkConfig, root: &Hash) -> StorageResult<Self> {
        let root = store.read(root)?;
        Ok(Self { root, store, config })
    }

    fn from_sorted(store: Arc<dyn NodeStore>, config: ChunkConfig, entries: Vec<(Tuple, Tuple)>) -> StorageResult<Self> {
        if entries.is_empty() {
            let node = Node::new_leaf(Vec::new(), Vec::new())?;
            let id = store.write(node)?;
            let root = store.read(&id)?;
            return Ok(Self { root, store, config });
        }

        let leaf_cap = config.max_chunk.max(1);
        // an internal node needs two children for each level to shrink
        let internal_cap = config.max_chunk.max(2);
        let mut level_refs = Vec::new();
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for (key, value) in entries {
            let boundary = is_boundary(&Hash::of(&key.encode()?), config.target_leaf);
            keys.push(key);
            values.push(value);
            if boundary || keys.len() >= leaf_cap {
                level_refs.push(Self::write_leaf(&store, std::mem::take(&mut keys), std::mem::take(&mut values))?);
            }
        }
        if !keys.is_empty() {
            level_refs.push(Self::write_leaf(&store, keys, values)?);
        }

        let mut level = 0u32;
        while level_refs.len() > 1 {
            level += 1;
            let mut next = Vec::new();
            let mut chunk: Vec<ChildRef> = Vec::new();
            for child in level_refs {
                let boundary = is_boundary(&Hash::of(child.address.as_bytes()), config.target_internal);
                chunk.push(child);
                if (chunk.len() >= 2 && boundary) || chunk.len() >= internal_cap {
                    next.push(Self::write_internal(&store, level, std::mem::take(&mut chunk))?);
                }
            }
            if !chunk.is_empty() {
                next.push(Self::write_internal(&store, level, chunk)?);
            }
            level_refs = next;
        }

        let root = store.read(&level_refs[0].address)?;
        Ok(Self { root, store, config })
    }

    fn write_leaf(store: &Arc<dyn NodeStore>, keys: Vec<Tuple>, values: Vec<Tuple>) -> StorageResult<ChildRef> {
        let first_key = keys[0].clone();
        let tree_count = keys.len() as u64;
        let address = store.write(Node::new_leaf(keys, values)?)?;
        Ok(ChildRef { first_key, address, tree_count })
    }

    fn write_internal(store: &Arc<dyn NodeStore>, level: u32, children: Vec<ChildRef>) -> StorageResult<ChildRef> {
        let first_key = children[0].first_key.clone();
        let tree_count = children.iter().map(|c| c.tree_count).sum();
        let address = store.write(Node::new_internal(level, children)?)?;
        Ok(ChildRef { first_key, address, tree_count })
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    pub fn root_hash(&self) -> Hash {
        self.root.hash_of()
    }

    pub fn node_store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    pub fn count(&self) -> u64 {
        self.root.tree_count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Point lookup
    pub fn get(&self, key: &Tuple) -> StorageResult<Option<Tuple>> {
        let mut node = self.root.clone();
        loop {
            match node.node_type() {
                NodeType::Leaf { keys, values } => {
                    return Ok(keys.binary_search(key).ok().map(|i| values[i].clone()));
                }
                NodeType::Internal { children, .. } => {
                    let idx = children.partition_point(|c| c.first_key <= *key);
                    if idx == 0 {
                        return Ok(None);
                    }
                    node = self.store.read(&children[idx - 1].address)?;
                }
            }
        }
    }

    /// Every entry in key order
    pub fn entries(&self) -> StorageResult<Vec<(Tuple, Tuple)>> {
        self.iter_ordinal_range(0, self.count()).map(|it| it.collect())
    }

    /// Entries with ordinal position in `[start, end)`
    ///
    /// Whole subtrees outside the range are skipped using their stored
    /// counts, so the cost is proportional to the range size plus tree height.
    pub fn iter_ordinal_range(&self, start: u64, end: u64) -> StorageResult<OrdinalRangeIter> {
        let count = self.count();
        if start > end || end > count {
            return Err(StorageError::OrdinalOutOfRange { start, end, count });
        }
        let mut out = Vec::with_capacity((end - start) as usize);
        if start < end {
            self.collect_range(&self.root, 0, start, end, &mut out)?;
        }
        Ok(OrdinalRangeIter { inner: out.into_iter() })
    }

    fn collect_range(&self, node: &Node, offset: u64, start: u64, end: u64, out: &mut Vec<(Tuple, Tuple)>) -> StorageResult<()> {
        match node.node_type() {
            NodeType::Leaf { keys, values } => {
                let lo = start.saturating_sub(offset) as usize;
                let hi = ((end - offset) as usize).min(keys.len());
                for i in lo..hi {
                    out.push((keys[i].clone(), values[i].clone()));
                }
            }
            NodeType::Internal { children, .. } => {
                let mut child_start = offset;
                for child in children {
                    let child_end = child_start + child.tree_count;
                    if child_end > start && child_start < end {
                        let child_node = self.store.read(&child.address)?;
                        self.collect_range(&child_node, child_start, start, end, out)?;
                    }
                    if child_end >= end {
                        break;
                    }
                    child_start = child_end;
                }
            }
        }
        Ok(())
    }

    /// Smallest key in the map
    pub fn first_key(&self) -> StorageResult<Option<Tuple>> {
        Ok(self.iter_ordinal_range(0, self.count().min(1))?.next().map(|(k, _)| k))
    }

    /// Nodes of the highest tree level holding at least `low_count` nodes
    ///
    /// Descends from the root until a level is wide enough or the leaves are
    /// reached. The returned nodes partition the key space in order, so each
    /// one can be summarized into one histogram bucket.
    pub fn histogram_level(&self, low_count: usize) -> StorageResult<Vec<Arc<Node>>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let mut level = vec![self.root.clone()];
        while level.len() < low_count && !level[0].is_leaf() {
            let mut next = Vec::new();
            for node in &level {
                for child in node.children() {
                    next.push(self.store.read(&child.address)?);
                }
            }
            level = next;
        }
        Ok(level)
    }

    /// Apply puts (`Some`) and deletes (`None`), returning the new map
    pub fn edit<I>(&self, edits: I) -> StorageResult<ProllyMap>
    where
        I: IntoIterator<Item = (Tuple, Option<Tuple>)>,
    {
        let mut entries: BTreeMap<Tuple, Tuple> = self.entries()?.into_iter().collect();
        for (key, value) in edits {
            match value {
                Some(value) => {
                    entries.insert(key, value);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Self::from_sorted(self.store.clone(), self.config, entries.into_iter().collect())
    }
}

/// Iterator returned by [`ProllyMap::iter_ordinal_range`]
pub struct OrdinalRangeIter {
    inner: std::vec::IntoIter<(Tuple, Tuple)>,
}

impl Iterator for OrdinalRangeIter {
    type Item = (Tuple, Tuple);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::node_store::MemoryNodeStore;
    use crate::storage::tuple::Value;

    fn key(i: i64) -> Tuple {
        Tuple::new(vec![Value::Int(i)])
    }

    fn build(n: i64) -> ProllyMap {
        let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::new());
        ProllyMap::from_entries(store, ChunkConfig::default(), (0..n).map(|i| (key(i), key(i * 2)))).unwrap()
    }

    #[test]
    fn test_empty_map() {
        let map = build(0);
        assert!(map.is_empty());
        assert!(map.first_key().unwrap().is_none());
        assert!(map.histogram_level(4).unwrap().is_empty());
    }

    #[test]
    fn test_get_and_count() {
        let map = build(500);
        assert_eq!(map.count(), 500);
        assert_eq!(map.get(&key(321)).unwrap(), Some(key(642)));
        assert_eq!(map.get(&key(-1)).unwrap(), None);
        assert_eq!(map.get(&key(500)).unwrap(), None);
        assert!(map.root().level() > 0);
    }

    #[test]
    fn test_ordinal_range() {
        let map = build(300);
        let got: Vec<_> = map.iter_ordinal_range(100, 110).unwrap().map(|(k, _)| k).collect();
        assert_eq!(got, (100..110).map(key).collect::<Vec<_>>());
        assert_eq!(map.iter_ordinal_range(5, 5).unwrap().count(), 0);
        assert!(matches!(map.iter_ordinal_range(0, 301), Err(StorageError::OrdinalOutOfRange { .. })));
    }

    #[test]
    fn test_same_entries_same_root() {
        assert_eq!(build(200).root_hash(), build(200).root_hash());
    }

    #[test]
    fn test_edit_preserves_untouched_leaves() {
        let before = build(1000);
        let after = before.edit([(key(999), Some(key(0)))]).unwrap();
        let before_leaves: Vec<Hash> = before.histogram_level(usize::MAX).unwrap().iter().map(|n| n.hash_of()).collect();
        let after_leaves: Vec<Hash> = after.histogram_level(usize::MAX).unwrap().iter().map(|n| n.hash_of()).collect();
        assert_eq!(before_leaves.len(), after_leaves.len());
        let shared = before_leaves.iter().zip(&after_leaves).filter(|(a, b)| a == b).count();
        assert_eq!(shared, before_leaves.len() - 1);
    }

    #[test]
    fn test_histogram_level_partitions_keys() {
        let map = build(700);
        let level = map.histogram_level(8).unwrap();
        assert!(level.len() >= 8 || level[0].is_leaf());
        let total: u64 = level.iter().map(|n| n.tree_count()).sum();
        assert_eq!(total, 700);
        for pair in level.windows(2) {
            assert!(pair[0].first_key() < pair[1].first_key());
        }
    }

    #[test]
    fn test_delete_edit() {
        let map = build(50).edit([(key(10), None), (key(11), None)]).unwrap();
        assert_eq!(map.count(), 48);
        assert_eq!(map.get(&key(10)).unwrap(), None);
    }

    #[test]
    fn test_tiny_max_chunk_still_builds_a_root() {
        for max_chunk in [0, 1, 2] {
            let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::new());
            let config = ChunkConfig { target_leaf: 1_000_000, target_internal: 1_000_000, max_chunk };
            let map = ProllyMap::from_entries(store, config, (0..40).map(|i| (key(i), key(i)))).unwrap();
            assert_eq!(map.count(), 40);
            assert_eq!(map.get(&key(39)).unwrap(), Some(key(39)));
        }
    }
}
