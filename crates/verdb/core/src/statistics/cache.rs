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

//! Content-addressed bucket, bound and template cache
//!
//! Buckets are keyed by the address of the node they summarize. A node
//! address determines its content, so an entry can never go stale while the
//! node exists, and putting the same address twice is a no-op.

use super::bucket::StatBucket;
use super::histogram::Statistic;
use super::template::TemplateKey;
use crate::storage::{Hash, Node, Tuple};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cache entry identity, used to track what still needs flushing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Bucket(Hash),
    Bound(Hash, usize),
    Template(TemplateKey),
}

pub trait StatsCache: Send + Sync {
    fn get_bucket(&self, node: &Hash) -> Option<Arc<StatBucket>>;

    fn put_bucket(&self, node: Hash, bucket: Arc<StatBucket>);

    fn get_bound(&self, node: &Hash, prefix_len: usize) -> Option<Tuple>;

    fn put_bound(&self, node: Hash, prefix_len: usize, bound: Tuple);

    fn get_template(&self, key: &TemplateKey) -> Option<Statistic>;

    fn put_template(&self, key: TemplateKey, template: Statistic);
}

/// In-memory statistics cache
///
/// A cache created for garbage collection records the generation that
/// triggered it; the controller only swaps it in if that generation is the
/// one that completes.
#[derive(Debug, Default)]
pub struct MemStats {
    buckets: RwLock<HashMap<Hash, Arc<StatBucket>>>,
    bounds: RwLock<HashMap<(Hash, usize), Tuple>>,
    templates: RwLock<HashMap<TemplateKey, Statistic>>,
    unflushed: Mutex<HashSet<CacheKey>>,
    gc_gen: Option<u64>,
    gc_interrupted: AtomicBool,
}

impl MemStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty cache that will collect the live set for a GC started at `generation`
    pub fn for_gc(generation: u64) -> Self {
        Self { gc_gen: Some(generation), ..Self::default() }
    }

    pub fn gc_gen(&self) -> Option<u64> {
        self.gc_gen
    }

    /// Abort marking; subsequent [`MemStats::gc_mark`] calls fail
    pub fn interrupt_gc(&self) {
        self.gc_interrupted.store(true, Ordering::Release);
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    pub fn template_count(&self) -> usize {
        self.templates.read().len()
    }

    pub fn bound_count(&self) -> usize {
        self.bounds.read().len()
    }

    /// Copy the live entries for one index from `from` into this cache
    ///
    /// `nodes` and `buckets` are the histogram level and its buckets. Returns
    /// false when marking was interrupted or the inputs do not line up, in
    /// which case the GC pass must be abandoned.
    pub fn gc_mark(&self, from: &dyn StatsCache, nodes: &[Arc<Node>], buckets: &[Arc<StatBucket>], prefix_len: usize) -> bool {
        if self.gc_gen.is_none() || self.gc_interrupted.load(Ordering::Acquire) {
            return false;
        }
        if nodes.len() != buckets.len() {
            return false;
        }
        let Some(first) = nodes.first() else {
            return true;
        };
        match from.get_bound(&first.hash_of(), prefix_len) {
            Some(bound) => self.put_bound(first.hash_of(), prefix_len, bound),
            None => return false,
        }
        for (node, bucket) in nodes.iter().zip(buckets) {
            self.put_bucket(node.hash_of(), bucket.clone());
        }
        true
    }

    /// Drain the set of entries written since the last flush
    pub fn take_unflushed(&self) -> Vec<CacheKey> {
        self.unflushed.lock().drain().collect()
    }

    /// Re-queue entries whose flush failed
    pub fn mark_unflushed(&self, keys: impl IntoIterator<Item = CacheKey>) {
        self.unflushed.lock().extend(keys);
    }

    /// Every entry currently cached
    pub fn all_keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.buckets.read().keys().map(|h| CacheKey::Bucket(*h)).collect();
        keys.extend(self.bounds.read().keys().map(|(h, l)| CacheKey::Bound(*h, *l)));
        keys.extend(self.templates.read().keys().cloned().map(CacheKey::Template));
        keys
    }

    /// Load an entry without queueing it for flush
    pub(crate) fn restore_bucket(&self, node: Hash, bucket: Arc<StatBucket>) {
        self.buckets.write().insert(node, bucket);
    }

    pub(crate) fn restore_bound(&self, node: Hash, prefix_len: usize, bound: Tuple) {
        self.bounds.write().insert((node, prefix_len), bound);
    }

    pub(crate) fn restore_template(&self, key: TemplateKey, template: Statistic) {
        self.templates.write().insert(key, template);
    }
}

impl StatsCache for MemStats {
    fn get_bucket(&self, node: &Hash) -> Option<Arc<StatBucket>> {
        self.buckets.read().get(node).cloned()
    }

    fn put_bucket(&self, node: Hash, bucket: Arc<StatBucket>) {
        let mut buckets = self.buckets.write();
        if !buckets.contains_key(&node) {
            buckets.insert(node, bucket);
            self.unflushed.lock().insert(CacheKey::Bucket(node));
        }
    }

    fn get_bound(&self, node: &Hash, prefix_len: usize) -> Option<Tuple> {
        self.bounds.read().get(&(*node, prefix_len)).cloned()
    }

    fn put_bound(&self, node: Hash, prefix_len: usize, bound: Tuple) {
        let mut bounds = self.bounds.write();
        if !bounds.contains_key(&(node, prefix_len)) {
            bounds.insert((node, prefix_len), bound);
            self.unflushed.lock().insert(CacheKey::Bound(node, prefix_len));
        }
    }

    fn get_template(&self, key: &TemplateKey) -> Option<Statistic> {
        self.templates.read().get(key).cloned()
    }

    fn put_template(&self, key: TemplateKey, template: Statistic) {
        self.templates.write().insert(key.clone(), template);
        self.unflushed.lock().insert(CacheKey::Template(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::bucket::BucketBuilder;
    use crate::storage::Value;

    fn leaf(v: i64) -> Arc<Node> {
        Arc::new(Node::new_leaf(vec![Tuple::new(vec![Value::Int(v)])], vec![Tuple::empty()]).unwrap())
    }

    fn bucket_for(node: &Node) -> Arc<StatBucket> {
        let mut b = BucketBuilder::new(1, 3);
        if let Some(key) = node.first_key() {
            b.add(key);
        }
        Arc::new(b.finalize(node.hash_of()))
    }

    #[test]
    fn test_put_bucket_is_idempotent() {
        let cache = MemStats::new();
        let node = leaf(1);
        let first = bucket_for(&node);
        cache.put_bucket(node.hash_of(), first.clone());
        cache.put_bucket(node.hash_of(), bucket_for(&node));
        assert!(Arc::ptr_eq(&cache.get_bucket(&node.hash_of()).unwrap(), &first));
        assert_eq!(cache.take_unflushed(), vec![CacheKey::Bucket(node.hash_of())]);
        assert!(cache.take_unflushed().is_empty());
    }

    #[test]
    fn test_bounds_keyed_by_prefix_len() {
        let cache = MemStats::new();
        let h = Hash::of(b"n");
        cache.put_bound(h, 1, Tuple::new(vec![Value::Int(1)]));
        assert!(cache.get_bound(&h, 1).is_some());
        assert!(cache.get_bound(&h, 2).is_none());
    }

    #[test]
    fn test_gc_mark_copies_live_entries() {
        let old = MemStats::new();
        let nodes = vec![leaf(1), leaf(2)];
        let buckets: Vec<_> = nodes.iter().map(|n| bucket_for(n)).collect();
        for (n, b) in nodes.iter().zip(&buckets) {
            old.put_bucket(n.hash_of(), b.clone());
        }
        old.put_bucket(Hash::of(b"dead"), bucket_for(&leaf(3)));
        old.put_bound(nodes[0].hash_of(), 1, Tuple::new(vec![Value::Int(1)]));

        let gc = MemStats::for_gc(7);
        assert!(gc.gc_mark(&old, &nodes, &buckets, 1));
        assert_eq!(gc.bucket_count(), 2);
        assert_eq!(gc.bound_count(), 1);
        assert_eq!(gc.gc_gen(), Some(7));

        assert!(!gc.gc_mark(&old, &nodes, &buckets[..1], 1));
        gc.interrupt_gc();
        assert!(!gc.gc_mark(&old, &nodes, &buckets, 1));
        assert!(!MemStats::new().gc_mark(&old, &nodes, &buckets, 1));
    }
}
