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

//! Index Statistics
//!
//! This module maintains per-index histograms for every table on every
//! branch, refreshed in the background without blocking readers.
//!
//! # Core Components
//!
//! ## Buckets and Histograms
//! - One bucket per node of an index's histogram level
//! - Row, distinct and null counts with bounded most-common-values
//! - Histograms aggregate buckets under a schema-derived template
//!
//! ## Caching and Persistence
//! - Buckets cached by node address, bounds by node and prefix length
//! - Templates cached by schema hash and index name
//! - Optional durable storage with incremental flush and GC rotation
//!
//! ## Controller
//! - Background worker with rate limiting and cancellation
//! - Generation counter guards publication of complete snapshots
//! - Unchanged tables carried forward without recomputation
//! - Generational garbage collection of unreachable buckets

pub mod bucket;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod controller;
pub mod histogram;
pub mod lib;
pub mod persist;
pub mod rate_limit;
pub mod template;

// Re-export commonly used types
pub use bucket::{BucketBuilder, StatBucket};
pub use cache::{CacheKey, MemStats, StatsCache};
pub use cancel::CancellationToken;
pub use config::{RateLimitConfig, StatsConfig};
pub use controller::{RootStats, StatsController, StatsInfo, TableIndexesKey};
pub use histogram::{Statistic, finalize_histogram};
pub use lib::{StatsError, StatsResult};
pub use persist::StatsStore;
pub use rate_limit::RateLimiter;
pub use template::{ColSet, FunctionalDeps, IndexClass, StatQualifier, TemplateKey, build_template, index_fds};
