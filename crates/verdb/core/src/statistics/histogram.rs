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

//! Per-index histograms

use super::bucket::StatBucket;
use super::template::{ColSet, FunctionalDeps, IndexClass, StatQualifier};
use crate::catalog::ColumnType;
use crate::storage::{Tuple, generate_timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Histogram over one index
///
/// Aggregate counts always equal the sum over `buckets`, and buckets are
/// ordered by key range without overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistic {
    pub qual: StatQualifier,
    pub columns: Vec<String>,
    pub types: Vec<ColumnType>,
    pub class: IndexClass,
    pub fds: FunctionalDeps,
    pub colset: ColSet,
    pub row_count: u64,
    pub distinct_count: u64,
    pub null_count: u64,
    /// First key prefix of the index
    pub lower_bound: Option<Tuple>,
    pub buckets: Vec<Arc<StatBucket>>,
    pub created_at: u64,
}

impl Statistic {
    /// Statistic without any data, as produced from a schema
    pub fn template(qual: StatQualifier, columns: Vec<String>, types: Vec<ColumnType>, class: IndexClass, fds: FunctionalDeps, colset: ColSet) -> Self {
        Self {
            qual,
            columns,
            types,
            class,
            fds,
            colset,
            row_count: 0,
            distinct_count: 0,
            null_count: 0,
            lower_bound: None,
            buckets: Vec::new(),
            created_at: generate_timestamp(),
        }
    }

    /// Check the aggregate and ordering invariants
    pub fn is_consistent(&self) -> bool {
        let rows: u64 = self.buckets.iter().map(|b| b.row_count).sum();
        let distinct: u64 = self.buckets.iter().map(|b| b.distinct_count).sum();
        let nulls: u64 = self.buckets.iter().map(|b| b.null_count).sum();
        let ordered = self.buckets.windows(2).all(|w| w[0].upper_bound <= w[1].upper_bound);
        rows == self.row_count && distinct == self.distinct_count && nulls == self.null_count && ordered
    }

    /// Estimated number of rows whose index prefix equals `key`
    ///
    /// Uses the most common values of the covering bucket when `key` is one
    /// of them, otherwise assumes a uniform spread over the bucket's
    /// distinct values.
    pub fn estimate_equal_rows(&self, key: &Tuple) -> f64 {
        if self.lower_bound.as_ref().is_some_and(|lb| key < lb) {
            return 0.0;
        }
        let Some(bucket) = self.buckets.iter().find(|b| *key <= b.upper_bound) else {
            return 0.0;
        };
        if let Some(i) = bucket.mcvs.iter().position(|m| m == key) {
            return bucket.mcv_counts[i] as f64;
        }
        if *key == bucket.upper_bound {
            return bucket.bound_count as f64;
        }
        if bucket.distinct_count == 0 {
            return 0.0;
        }
        bucket.row_count as f64 / bucket.distinct_count as f64
    }
}

/// Assemble a histogram from a template and its ordered buckets
pub fn finalize_histogram(template: &Statistic, buckets: Vec<Arc<StatBucket>>, lower_bound: Option<Tuple>) -> Statistic {
    let mut stat = template.clone();
    stat.lower_bound = lower_bound;
    for b in &buckets {
        stat.row_count += b.row_count;
        stat.distinct_count += b.distinct_count;
        stat.null_count += b.null_count;
    }
    stat.buckets = buckets;
    stat.created_at = generate_timestamp();
    stat
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::bucket::BucketBuilder;
    use crate::storage::{Hash, Value};
    use proptest::prelude::*;

    fn k(v: i64) -> Tuple {
        Tuple::new(vec![Value::Int(v)])
    }

    fn bucket(vals: &[i64]) -> Arc<StatBucket> {
        let mut b = BucketBuilder::new(1, 3);
        for v in vals {
            b.add(&k(*v));
        }
        Arc::new(b.finalize(Hash::of(format!("{:?}", vals).as_bytes())))
    }

    fn template() -> Statistic {
        Statistic::template(StatQualifier::new("db", "t", "primary"), vec!["a".into()], vec![ColumnType::Int], IndexClass::Default, FunctionalDeps::default(), ColSet::new())
    }

    #[test]
    fn test_finalize_sums_buckets() {
        let stat = finalize_histogram(&template(), vec![bucket(&[1, 1, 2]), bucket(&[3, 4, 4, 4])], Some(k(1)));
        assert_eq!(stat.row_count, 7);
        assert_eq!(stat.distinct_count, 4);
        assert_eq!(stat.lower_bound, Some(k(1)));
        assert!(stat.is_consistent());
    }

    #[test]
    fn test_statistic_serializes_shared_buckets() {
        let stat = finalize_histogram(&template(), vec![bucket(&[1, 2]), bucket(&[3])], Some(k(1)));
        let json = serde_json::to_string(&stat).unwrap();
        let back: Statistic = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stat);
        assert_eq!(back.buckets.len(), 2);
    }

    #[test]
    fn test_estimate_equal_rows() {
        let stat = finalize_histogram(&template(), vec![bucket(&[1, 1, 2, 5, 6, 7, 8]), bucket(&[10, 10, 10, 11])], Some(k(1)));
        assert_eq!(stat.estimate_equal_rows(&k(10)), 3.0);
        assert_eq!(stat.estimate_equal_rows(&k(0)), 0.0);
        assert_eq!(stat.estimate_equal_rows(&k(99)), 0.0);
        assert!((stat.estimate_equal_rows(&k(3)) - 7.0 / 6.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_histogram_counts_match_buckets(mut vals in proptest::collection::vec(-50i64..50, 1..300), splits in 1usize..8) {
            vals.sort();
            let chunk = vals.len().div_ceil(splits);
            let buckets: Vec<_> = vals.chunks(chunk).map(bucket).collect();
            let stat = finalize_histogram(&template(), buckets, vals.first().map(|v| k(*v)));
            prop_assert_eq!(stat.row_count, vals.len() as u64);
            prop_assert!(stat.is_consistent());
        }
    }
}
