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

use super::gtid::Position;
use super::lib::{BinlogError, BinlogResult};
use crate::storage::KvStore;
use std::sync::Arc;
use tracing::debug;

/// Key under which the executed GTID set is stored
pub const GTID_EXECUTED_KEY: &[u8] = b"binlog/gtid_executed";

/// Durable home of the replication position
#[cfg_attr(test, mockall::automock)]
pub trait PositionStore: Send + Sync {
    /// Last saved position, or `None` if nothing was ever saved
    fn load(&self) -> BinlogResult<Option<Position>>;

    /// Persist `position`; must be durable when this returns
    fn save(&self, position: &Position) -> BinlogResult<()>;
}

/// Position store over any key/value store
pub struct KvPositionStore {
    kv: Arc<dyn KvStore>,
}

impl KvPositionStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }
}

impl PositionStore for KvPositionStore {
    fn load(&self) -> BinlogResult<Option<Position>> {
        let Some(raw) = self.kv.get(GTID_EXECUTED_KEY)? else {
            return Ok(None);
        };
        let text = String::from_utf8(raw).map_err(|e| BinlogError::InvalidGtid(e.to_string()))?;
        debug!(gtid_executed = %text, "loaded replication position");
        Ok(Some(text.parse()?))
    }

    fn save(&self, position: &Position) -> BinlogResult<()> {
        self.kv.put(GTID_EXECUTED_KEY.to_vec(), position.to_string().into_bytes()).map_err(|e| BinlogError::PositionStore(e.to_string()))?;
        self.kv.flush().map_err(|e| BinlogError::PositionStore(e.to_string()))
    }
}
