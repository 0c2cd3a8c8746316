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

//! Durable statistics storage
//!
//! Buckets, lower bounds and templates are written to a [`KvStore`] under
//! separate key prefixes. Flushing only writes entries added since the last
//! flush; rotation rewrites the store to hold exactly a GC'd live set.

use super::cache::{CacheKey, MemStats, StatsCache};
use super::histogram::Statistic;
use super::lib::StatsResult;
use super::template::TemplateKey;
use crate::storage::lib::{decode, encode};
use crate::storage::{Hash, KvOp, KvStore, StorageError, Tuple};
use std::sync::Arc;
use tracing::{debug, warn};

const BUCKET_PREFIX: &[u8] = b"stats/bucket/";
const BOUND_PREFIX: &[u8] = b"stats/bound/";
const TEMPLATE_PREFIX: &[u8] = b"stats/template/";

fn prefixed(prefix: &[u8], rest: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + rest.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(rest);
    key
}

fn cache_key_bytes(key: &CacheKey) -> StatsResult<Vec<u8>> {
    Ok(match key {
        CacheKey::Bucket(h) => prefixed(BUCKET_PREFIX, h.as_bytes()),
        CacheKey::Bound(h, len) => prefixed(BOUND_PREFIX, &encode(&(h, *len as u64))?),
        CacheKey::Template(k) => prefixed(TEMPLATE_PREFIX, &encode(k)?),
    })
}

/// Statistics persisted in a key/value store
pub struct StatsStore {
    kv: Arc<dyn KvStore>,
}

impl StatsStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn put_op(&self, cache: &MemStats, key: &CacheKey) -> StatsResult<Option<KvOp>> {
        let value = match key {
            CacheKey::Bucket(h) => cache.get_bucket(h).map(|b| encode(b.as_ref())).transpose()?,
            CacheKey::Bound(h, len) => cache.get_bound(h, *len).map(|b| encode(&b)).transpose()?,
            CacheKey::Template(k) => cache.get_template(k).map(|t| encode(&t)).transpose()?,
        };
        Ok(match value {
            Some(value) => Some(KvOp::Put { key: cache_key_bytes(key)?, value }),
            None => None,
        })
    }

    /// Write entries added to `cache` since the last flush; returns how many
    pub fn flush(&self, cache: &MemStats) -> StatsResult<usize> {
        let keys = cache.take_unflushed();
        if keys.is_empty() {
            return Ok(0);
        }
        let result = (|| -> StatsResult<usize> {
            let mut ops = Vec::with_capacity(keys.len());
            for key in &keys {
                if let Some(op) = self.put_op(cache, key)? {
                    ops.push(op);
                }
            }
            let n = ops.len();
            self.kv.batch(ops)?;
            self.kv.flush()?;
            Ok(n)
        })();
        match result {
            Ok(n) => {
                debug!(entries = n, "flushed statistics");
                Ok(n)
            }
            Err(e) => {
                cache.mark_unflushed(keys);
                Err(e)
            }
        }
    }

    /// Load every persisted entry into `cache` without marking it dirty
    pub fn load(&self, cache: &MemStats) -> StatsResult<usize> {
        let mut loaded = 0;
        for (key, value) in self.kv.scan_prefix(BUCKET_PREFIX)? {
            let raw = &key[BUCKET_PREFIX.len()..];
            let Ok(bytes) = <[u8; 32]>::try_from(raw) else {
                warn!(key = %hex::encode(&key), "skipping malformed bucket key");
                continue;
            };
            cache.restore_bucket(Hash(bytes), Arc::new(decode(&value)?));
            loaded += 1;
        }
        for (key, value) in self.kv.scan_prefix(BOUND_PREFIX)? {
            let (h, len): (Hash, u64) = decode(&key[BOUND_PREFIX.len()..])?;
            let bound: Tuple = decode(&value)?;
            cache.restore_bound(h, len as usize, bound);
            loaded += 1;
        }
        for (key, value) in self.kv.scan_prefix(TEMPLATE_PREFIX)? {
            let k: TemplateKey = decode(&key[TEMPLATE_PREFIX.len()..])?;
            let template: Statistic = decode(&value)?;
            cache.restore_template(k, template);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Replace all persisted entries with exactly the contents of `live`
    pub fn rotate(&self, live: &MemStats) -> StatsResult<()> {
        let mut ops = self.delete_ops()?;
        let keys = live.all_keys();
        for key in &keys {
            if let Some(op) = self.put_op(live, key)? {
                ops.push(op);
            }
        }
        self.kv.batch(ops)?;
        self.kv.flush()?;
        live.take_unflushed();
        debug!(entries = keys.len(), "rotated statistics storage");
        Ok(())
    }

    /// Remove every persisted entry
    pub fn purge(&self) -> StatsResult<()> {
        let ops = self.delete_ops()?;
        self.kv.batch(ops)?;
        self.kv.flush()?;
        Ok(())
    }

    fn delete_ops(&self) -> Result<Vec<KvOp>, StorageError> {
        let mut ops = Vec::new();
        for prefix in [BUCKET_PREFIX, BOUND_PREFIX, TEMPLATE_PREFIX] {
            for (key, _) in self.kv.scan_prefix(prefix)? {
                ops.push(KvOp::Delete { key });
            }
        }
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnType;
    use crate::statistics::bucket::BucketBuilder;
    use crate::statistics::template::{ColSet, FunctionalDeps, IndexClass, StatQualifier};
    use crate::storage::{FileKv, MemoryKv, Value};

    fn bucket(seed: &[u8]) -> Arc<crate::statistics::bucket::StatBucket> {
        let mut b = BucketBuilder::new(1, 3);
        b.add(&Tuple::new(vec![Value::Int(seed.len() as i64)]));
        Arc::new(b.finalize(Hash::of(seed)))
    }

    fn template() -> Statistic {
        Statistic::template(StatQualifier::new("", "t", "primary"), vec!["a".into()], vec![ColumnType::Int], IndexClass::Default, FunctionalDeps::default(), ColSet::new())
    }

    #[test]
    fn test_flush_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.kv");
        let cache = MemStats::new();
        cache.put_bucket(Hash::of(b"a"), bucket(b"a"));
        cache.put_bound(Hash::of(b"a"), 1, Tuple::new(vec![Value::Int(0)]));
        cache.put_template(TemplateKey { schema_hash: Hash::of(b"s"), index: "primary".into() }, template());
        {
            let store = StatsStore::new(Arc::new(FileKv::open(&path).unwrap()));
            assert_eq!(store.flush(&cache).unwrap(), 3);
            assert_eq!(store.flush(&cache).unwrap(), 0);
        }
        let store = StatsStore::new(Arc::new(FileKv::open(&path).unwrap()));
        let loaded = MemStats::new();
        assert_eq!(store.load(&loaded).unwrap(), 3);
        assert_eq!(loaded.get_bucket(&Hash::of(b"a")), cache.get_bucket(&Hash::of(b"a")));
        assert!(loaded.take_unflushed().is_empty());
    }

    #[test]
    fn test_rotate_keeps_only_live() {
        let kv = Arc::new(MemoryKv::new());
        let store = StatsStore::new(kv.clone());
        let old = MemStats::new();
        old.put_bucket(Hash::of(b"dead"), bucket(b"dead"));
        old.put_bucket(Hash::of(b"live"), bucket(b"live"));
        store.flush(&old).unwrap();

        let live = MemStats::for_gc(1);
        live.put_bucket(Hash::of(b"live"), old.get_bucket(&Hash::of(b"live")).unwrap());
        store.rotate(&live).unwrap();

        let reloaded = MemStats::new();
        assert_eq!(store.load(&reloaded).unwrap(), 1);
        assert!(reloaded.get_bucket(&Hash::of(b"dead")).is_none());

        store.purge().unwrap();
        assert!(kv.is_empty());
    }
}
