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

//! VerDB core
//!
//! Versioned storage, the catalog on top of it, background index statistics
//! and binlog production for MySQL replicas.

pub mod binlog;
pub mod catalog;
pub mod statistics;
pub mod storage;

use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded from JSON by the CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdbConfig {
    pub stats: statistics::StatsConfig,
    pub binlog: binlog::BinlogConfig,
}

impl VerdbConfig {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = VerdbConfig::from_json("{}").unwrap();
        assert_eq!(config, VerdbConfig::default());
        assert_eq!(config.binlog.branch, "main");
    }
}
