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

/// Binlog producer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinlogConfig {
    /// Produce events for replication at all
    pub enabled: bool,
    /// The only branch whose commits are replicated
    pub branch: String,
    /// `@@server_id`; replication cannot start without one
    pub server_id: Option<u32>,
    /// `@@server_uuid`; generated at startup when unset
    pub server_uuid: Option<String>,
    /// `@@binlog_checksum`, either `CRC32` or `NONE`
    pub binlog_checksum: String,
}

impl Default for BinlogConfig {
    fn default() -> Self {
        Self { enabled: true, branch: "main".to_string(), server_id: Some(1), server_uuid: None, binlog_checksum: "CRC32".to_string() }
    }
}

impl BinlogConfig {
    /// Name reported in rotate events
    pub fn binlog_filename(&self) -> String {
        format!("binlog-{}.000001", self.branch)
    }
}
