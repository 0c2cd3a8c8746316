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

//! Row-level differences between two map versions

use super::lib::StorageResult;
use super::map::ProllyMap;
use super::tuple::Tuple;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Kind of change for a single key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffType {
    Added,
    Modified,
    Removed,
}

/// One changed key with its old and new values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub kind: DiffType,
    pub key: Tuple,
    pub from: Option<Tuple>,
    pub to: Option<Tuple>,
}

/// Compute changes from `from` to `to` in key order
///
/// A missing map is treated as empty. Identical roots produce no diffs
/// without reading any nodes.
pub fn diff_maps(from: Option<&ProllyMap>, to: Option<&ProllyMap>) -> StorageResult<Vec<Diff>> {
    if let (Some(a), Some(b)) = (from, to) {
        if a.root_hash() == b.root_hash() {
            return Ok(Vec::new());
        }
    }
    let old = match from {
        Some(m) => m.entries()?,
        None => Vec::new(),
    };
    let new = match to {
        Some(m) => m.entries()?,
        None => Vec::new(),
    };

    let mut diffs = Vec::new();
    let mut old = old.into_iter().peekable();
    let mut new = new.into_iter().peekable();
    loop {
        let order = match (old.peek(), new.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((a, _)), Some((b, _))) => a.cmp(b),
        };
        match order {
            Ordering::Less => {
                if let Some((key, value)) = old.next() {
                    diffs.push(Diff { kind: DiffType::Removed, key, from: Some(value), to: None });
                }
            }
            Ordering::Greater => {
                if let Some((key, value)) = new.next() {
                    diffs.push(Diff { kind: DiffType::Added, key, from: None, to: Some(value) });
                }
            }
            Ordering::Equal => {
                if let (Some((key, before)), Some((_, after))) = (old.next(), new.next()) {
                    if before != after {
                        diffs.push(Diff { kind: DiffType::Modified, key, from: Some(before), to: Some(after) });
                    }
                }
            }
        }
    }
    Ok(diffs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::map::ChunkConfig;
    use crate::storage::node_store::{MemoryNodeStore, NodeStore};
    use crate::storage::tuple::Value;
    use std::sync::Arc;

    fn t(i: i64) -> Tuple {
        Tuple::new(vec![Value::Int(i)])
    }

    #[test]
    fn test_diff_kinds() {
        let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::new());
        let before = ProllyMap::from_entries(store.clone(), ChunkConfig::default(), vec![(t(1), t(10)), (t(2), t(20)), (t(3), t(30))]).unwrap();
        let after = before.edit([(t(1), None), (t(2), Some(t(21))), (t(4), Some(t(40)))]).unwrap();
        let diffs = diff_maps(Some(&before), Some(&after)).unwrap();
        let kinds: Vec<_> = diffs.iter().map(|d| (d.kind, d.key.clone())).collect();
        assert_eq!(kinds, vec![(DiffType::Removed, t(1)), (DiffType::Modified, t(2)), (DiffType::Added, t(4))]);
        assert_eq!(diffs[1].from, Some(t(20)));
        assert_eq!(diffs[1].to, Some(t(21)));
    }

    #[test]
    fn test_missing_side_is_empty() {
        let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::new());
        let map = ProllyMap::from_entries(store, ChunkConfig::default(), vec![(t(1), t(1))]).unwrap();
        assert_eq!(diff_maps(None, Some(&map)).unwrap()[0].kind, DiffType::Added);
        assert_eq!(diff_maps(Some(&map), None).unwrap()[0].kind, DiffType::Removed);
        assert!(diff_maps(Some(&map), Some(&map)).unwrap().is_empty());
        assert!(diff_maps(None, None).unwrap().is_empty());
    }
}
