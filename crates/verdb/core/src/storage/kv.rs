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

//! Byte-keyed key/value stores used for durable side data
//!
//! Statistics buckets and the binlog GTID position live here rather than in
//! the versioned row store.

use super::lib::{StorageError, StorageResult, decode, encode};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Batch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Key/value store interface
pub trait KvStore: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Put a key-value pair
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    /// Delete a key, returning whether it existed
    fn delete(&self, key: &[u8]) -> StorageResult<bool>;

    /// Apply a batch of operations under one lock acquisition
    fn batch(&self, ops: Vec<KvOp>) -> StorageResult<()>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Make previous writes durable
    fn flush(&self) -> StorageResult<()>;

    fn contains(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

fn apply(map: &mut BTreeMap<Vec<u8>, Vec<u8>>, ops: Vec<KvOp>) {
    for op in ops {
        match op {
            KvOp::Put { key, value } => {
                map.insert(key, value);
            }
            KvOp::Delete { key } => {
                map.remove(&key);
            }
        }
    }
}

fn scan(map: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    map.range(prefix.to_vec()..).take_while(|(k, _)| k.starts_with(prefix)).map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Volatile store
#[derive(Debug, Default)]
pub struct MemoryKv {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        self.data.write().insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    fn batch(&self, ops: Vec<KvOp>) -> StorageResult<()> {
        apply(&mut self.data.write(), ops);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(scan(&self.data.read(), prefix))
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Single-file store
///
/// The whole map is kept in memory and rewritten on [`KvStore::flush`]. The
/// new image is written to a temporary file in the same directory and renamed
/// over the old one, so a crash leaves either the previous or the new image.
#[derive(Debug)]
pub struct FileKv {
    path: PathBuf,
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    dirty: AtomicBool,
}

impl FileKv {
    /// Open the store at `path`, loading any existing image
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let entries: Vec<(Vec<u8>, Vec<u8>)> = decode(&bytes).map_err(|e| StorageError::Corruption(format!("{}: {}", path.display(), e)))?;
            entries.into_iter().collect()
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, data: RwLock::new(data), dirty: AtomicBool::new(false) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }
}

impl KvStore for FileKv {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        self.data.write().insert(key, value);
        self.mark_dirty();
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StorageResult<bool> {
        let existed = self.data.write().remove(key).is_some();
        if existed {
            self.mark_dirty();
        }
        Ok(existed)
    }

    fn batch(&self, ops: Vec<KvOp>) -> StorageResult<()> {
        apply(&mut self.data.write(), ops);
        self.mark_dirty();
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(scan(&self.data.read(), prefix))
    }

    fn flush(&self) -> StorageResult<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let entries: Vec<(Vec<u8>, Vec<u8>)> = self.data.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let bytes = encode(&entries)?;
        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        let result = (|| -> StorageResult<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;
            Ok(())
        })();
        if result.is_err() {
            self.mark_dirty();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_kv_prefix_scan() {
        let kv = MemoryKv::new();
        kv.put(b"a/1".to_vec(), b"x".to_vec()).unwrap();
        kv.put(b"a/2".to_vec(), b"y".to_vec()).unwrap();
        kv.put(b"b/1".to_vec(), b"z".to_vec()).unwrap();
        let got = kv.scan_prefix(b"a/").unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].1, b"y".to_vec());
        assert!(kv.delete(b"a/1").unwrap());
        assert!(!kv.contains(b"a/1").unwrap());
    }

    #[test]
    fn test_file_kv_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.db");
        {
            let kv = FileKv::open(&path).unwrap();
            kv.batch(vec![KvOp::Put { key: b"k".to_vec(), value: b"v".to_vec() }, KvOp::Put { key: b"gone".to_vec(), value: vec![] }]).unwrap();
            kv.delete(b"gone").unwrap();
            kv.flush().unwrap();
            kv.put(b"unflushed".to_vec(), b"lost".to_vec()).unwrap();
        }
        let kv = FileKv::open(&path).unwrap();
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(kv.get(b"gone").unwrap(), None);
        assert_eq!(kv.get(b"unflushed").unwrap(), None);
    }

    #[test]
    fn test_file_kv_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.db");
        std::fs::write(&path, [0x05, 0x01]).unwrap();
        assert!(matches!(FileKv::open(&path), Err(StorageError::Corruption(_))));
    }
}
