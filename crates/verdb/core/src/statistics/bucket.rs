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

//! Histogram bucket construction
//!
//! A bucket summarizes one tree node's key range: row count, distinct
//! prefixes, NULL-bearing rows and the most common prefixes. Rows arrive in
//! index order, so equal prefixes are always adjacent and distinct counting
//! only needs to remember the current run.

use crate::storage::{Hash, Tuple, generate_timestamp};
use serde::{Deserialize, Serialize};

/// Summary of one contiguous key range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatBucket {
    /// Address of the node this bucket was built from
    pub chunk: Hash,
    pub row_count: u64,
    pub distinct_count: u64,
    pub null_count: u64,
    /// Most common prefixes, most frequent first
    pub mcvs: Vec<Tuple>,
    pub mcv_counts: Vec<u64>,
    /// Largest prefix in the range
    pub upper_bound: Tuple,
    /// Number of rows equal to `upper_bound`
    pub bound_count: u64,
    pub created_at: u64,
}

/// Bounded most-common-values tracker
#[derive(Debug, Clone)]
struct McvList {
    capacity: usize,
    entries: Vec<(Tuple, u64)>,
}

impl McvList {
    fn new(capacity: usize) -> Self {
        Self { capacity, entries: Vec::with_capacity(capacity + 1) }
    }

    /// Offer a completed run; keeps the `capacity` largest, first seen wins ties
    fn add(&mut self, key: Tuple, count: u64) {
        if self.capacity == 0 {
            return;
        }
        let pos = self.entries.iter().position(|(_, c)| *c < count).unwrap_or(self.entries.len());
        if pos >= self.capacity {
            return;
        }
        self.entries.insert(pos, (key, count));
        self.entries.truncate(self.capacity);
    }

    fn into_parts(self) -> (Vec<Tuple>, Vec<u64>) {
        self.entries.into_iter().unzip()
    }
}

/// Streaming bucket builder over index keys restricted to a prefix
#[derive(Debug, Clone)]
pub struct BucketBuilder {
    prefix_len: usize,
    mcv_capacity: usize,
    count: u64,
    distinct: u64,
    nulls: u64,
    current: Option<Tuple>,
    current_count: u64,
    mcvs: McvList,
}

impl BucketBuilder {
    pub fn new(prefix_len: usize, mcv_capacity: usize) -> Self {
        Self {
            prefix_len,
            mcv_capacity,
            count: 0,
            distinct: 0,
            nulls: 0,
            current: None,
            current_count: 0,
            mcvs: McvList::new(mcv_capacity),
        }
    }

    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    /// Reset state for the next bucket
    pub fn new_bucket(&mut self) {
        self.count = 0;
        self.distinct = 0;
        self.nulls = 0;
        self.current = None;
        self.current_count = 0;
        self.mcvs = McvList::new(self.mcv_capacity);
    }

    /// Add one full index key; only its leading `prefix_len` fields count
    pub fn add(&mut self, key: &Tuple) {
        let prefix = key.prefix(self.prefix_len);
        self.count += 1;
        if prefix.prefix_has_nulls(self.prefix_len) {
            self.nulls += 1;
        }
        match &self.current {
            Some(current) if *current == prefix => {
                self.current_count += 1;
            }
            _ => {
                self.flush_run();
                self.current = Some(prefix);
                self.current_count = 1;
                self.distinct += 1;
            }
        }
    }

    fn flush_run(&mut self) {
        if let Some(current) = self.current.take() {
            self.mcvs.add(current, self.current_count);
        }
    }

    /// Materialize the bucket for `chunk` and reset the builder
    ///
    /// Most common values are kept inline in the returned bucket, so nothing
    /// is written to a node store and finalizing cannot fail.
    pub fn finalize(&mut self, chunk: Hash) -> StatBucket {
        let upper_bound = self.current.clone().unwrap_or_default();
        let bound_count = self.current_count;
        self.flush_run();
        let (mcvs, mcv_counts) = std::mem::replace(&mut self.mcvs, McvList::new(self.mcv_capacity)).into_parts();
        let bucket = StatBucket {
            chunk,
            row_count: self.count,
            distinct_count: self.distinct,
            null_count: self.nulls,
            mcvs,
            mcv_counts,
            upper_bound,
            bound_count,
            created_at: generate_timestamp(),
        };
        self.new_bucket();
        bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;
    use proptest::prelude::*;

    fn key(vals: &[Option<i64>]) -> Tuple {
        Tuple::new(vals.iter().map(|v| v.map(Value::Int).unwrap_or(Value::Null)).collect())
    }

    #[test]
    fn test_counts_and_mcvs() {
        let mut b = BucketBuilder::new(1, 3);
        b.new_bucket();
        for (i, v) in [1, 1, 2, 3, 3, 3, 4, 5, 5].iter().enumerate() {
            b.add(&key(&[Some(*v), Some(i as i64)]));
        }
        let bucket = b.finalize(Hash::of(b"n"));
        assert_eq!(bucket.row_count, 9);
        assert_eq!(bucket.distinct_count, 5);
        assert_eq!(bucket.null_count, 0);
        assert_eq!(bucket.mcvs, vec![key(&[Some(3)]), key(&[Some(1)]), key(&[Some(5)])]);
        assert_eq!(bucket.mcv_counts, vec![3, 2, 2]);
        assert_eq!(bucket.upper_bound, key(&[Some(5)]));
        assert_eq!(bucket.bound_count, 2);
    }

    #[test]
    fn test_nulls_only_counted_in_prefix() {
        let mut b = BucketBuilder::new(1, 3);
        b.add(&key(&[None, Some(1)]));
        b.add(&key(&[None, Some(2)]));
        b.add(&key(&[Some(1), None]));
        let bucket = b.finalize(Hash::EMPTY);
        assert_eq!(bucket.null_count, 2);
        assert_eq!(bucket.distinct_count, 2);
    }

    #[test]
    fn test_finalize_resets() {
        let mut b = BucketBuilder::new(1, 3);
        b.add(&key(&[Some(1)]));
        b.finalize(Hash::EMPTY);
        let empty = b.finalize(Hash::EMPTY);
        assert_eq!(empty.row_count, 0);
        assert!(empty.mcvs.is_empty());
        assert!(empty.upper_bound.is_empty());
    }

    proptest! {
        #[test]
        fn prop_bucket_counts_consistent(mut vals in proptest::collection::vec(0i64..20, 0..200)) {
            vals.sort();
            let mut b = BucketBuilder::new(1, 3);
            for v in &vals {
                b.add(&key(&[Some(*v)]));
            }
            let bucket = b.finalize(Hash::EMPTY);
            let mut distinct = vals.clone();
            distinct.dedup();
            prop_assert_eq!(bucket.row_count, vals.len() as u64);
            prop_assert_eq!(bucket.distinct_count, distinct.len() as u64);
            prop_assert!(bucket.mcvs.len() <= 3);
            prop_assert!(bucket.mcv_counts.windows(2).all(|w| w[0] >= w[1]));
            prop_assert!(bucket.mcv_counts.iter().sum::<u64>() <= bucket.row_count);
        }
    }
}
