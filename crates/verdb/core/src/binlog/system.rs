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

use super::config::BinlogConfig;
use super::lib::{BinlogError, BinlogResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

pub const SERVER_UUID: &str = "server_uuid";
pub const SERVER_ID: &str = "server_id";
pub const BINLOG_CHECKSUM: &str = "binlog_checksum";
pub const GTID_EXECUTED: &str = "gtid_executed";

/// Server variables the producer reads and writes
pub trait SystemConfig: Send + Sync {
    fn server_uuid(&self) -> BinlogResult<Uuid>;

    fn server_id(&self) -> BinlogResult<u32>;

    fn binlog_checksum(&self) -> BinlogResult<String>;

    /// Publish the executed GTID set as `@@gtid_executed`
    fn assign_gtid_executed(&self, value: &str) -> BinlogResult<()>;
}

/// In-memory global system variables
#[derive(Debug, Default)]
pub struct SystemVariables {
    values: RwLock<HashMap<String, String>>,
}

impl SystemVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables seeded from configuration, generating a server uuid if none is set
    pub fn from_config(config: &BinlogConfig) -> Self {
        let vars = Self::new();
        let uuid = config.server_uuid.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        vars.set(SERVER_UUID, uuid);
        if let Some(id) = config.server_id {
            vars.set(SERVER_ID, id.to_string());
        }
        vars.set(BINLOG_CHECKSUM, config.binlog_checksum.clone());
        vars
    }

    pub fn set(&self, name: &str, value: impl Into<String>) {
        self.values.write().insert(name.to_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.values.read().get(&name.to_lowercase()).cloned()
    }

    fn require(&self, name: &str) -> BinlogResult<String> {
        self.get(name).ok_or_else(|| BinlogError::MissingSystemVariable(name.to_string()))
    }
}

impl SystemConfig for SystemVariables {
    fn server_uuid(&self) -> BinlogResult<Uuid> {
        let raw = self.require(SERVER_UUID)?;
        Uuid::parse_str(&raw).map_err(|e| BinlogError::InvalidGtid(format!("server_uuid {}: {}", raw, e)))
    }

    fn server_id(&self) -> BinlogResult<u32> {
        let raw = self.require(SERVER_ID)?;
        raw.parse().map_err(|_| BinlogError::MissingSystemVariable(format!("{} (invalid value {})", SERVER_ID, raw)))
    }

    fn binlog_checksum(&self) -> BinlogResult<String> {
        self.require(BINLOG_CHECKSUM)
    }

    fn assign_gtid_executed(&self, value: &str) -> BinlogResult<()> {
        self.set(GTID_EXECUTED, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = BinlogConfig { server_uuid: Some("3e11fa47-71ca-11e1-9e33-c80aa9429562".into()), server_id: Some(42), ..BinlogConfig::default() };
        let vars = SystemVariables::from_config(&config);
        assert_eq!(vars.server_id().unwrap(), 42);
        assert_eq!(vars.server_uuid().unwrap().to_string(), "3e11fa47-71ca-11e1-9e33-c80aa9429562");
        assert_eq!(vars.binlog_checksum().unwrap(), "CRC32");
        assert!(vars.get(GTID_EXECUTED).is_none());
        vars.assign_gtid_executed("x").unwrap();
        assert_eq!(vars.get("GTID_EXECUTED").as_deref(), Some("x"));
    }

    #[test]
    fn test_missing_server_id() {
        let vars = SystemVariables::from_config(&BinlogConfig { server_id: None, ..BinlogConfig::default() });
        assert!(matches!(vars.server_id(), Err(BinlogError::MissingSystemVariable(_))));
        assert!(vars.server_uuid().is_ok());
    }
}
