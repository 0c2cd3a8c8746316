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

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token bucket settings for background statistics work
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained number of work units admitted per second
    pub ops_per_second: f64,
    /// Work units that may run back to back before throttling starts
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { ops_per_second: 100.0, burst: 20 }
    }
}

/// Statistics worker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Start the background worker
    pub enabled: bool,
    /// Keep buckets in memory only; nothing is flushed
    pub memory_only: bool,
    /// Pause between collection passes
    #[serde(with = "duration_millis")]
    pub job_interval: Duration,
    /// How often a garbage collection pass is requested
    #[serde(with = "duration_millis")]
    pub gc_interval: Duration,
    pub gc_enabled: bool,
    /// New buckets built per rate limiter admission
    pub collect_batch_size: usize,
    /// Minimum number of tree nodes a histogram level should span
    pub bucket_low_count: usize,
    /// Most common values tracked per bucket
    pub mcv_capacity: usize,
    /// Schemas never collected (case-insensitive)
    pub skipped_schemas: Vec<String>,
    pub rate_limit: RateLimitConfig,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_only: false,
            job_interval: Duration::from_millis(500),
            gc_interval: Duration::from_secs(24 * 60 * 60),
            gc_enabled: true,
            collect_batch_size: 20,
            bucket_low_count: 24,
            mcv_capacity: 3,
            skipped_schemas: vec!["dolt".to_string(), "information_schema".to_string(), "pg_catalog".to_string()],
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl StatsConfig {
    pub fn is_skipped_schema(&self, schema: &str) -> bool {
        self.skipped_schemas.iter().any(|s| s.eq_ignore_ascii_case(schema))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: StatsConfig = serde_json::from_str(r#"{"job_interval": 50, "memory_only": true}"#).unwrap();
        assert_eq!(config.job_interval, Duration::from_millis(50));
        assert!(config.memory_only);
        assert_eq!(config.collect_batch_size, 20);
        assert!(config.is_skipped_schema("INFORMATION_SCHEMA"));
        assert!(!config.is_skipped_schema(""));
    }
}
