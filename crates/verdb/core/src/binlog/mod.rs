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

//! Binlog Production
//!
//! This module turns committed changes on the replicated branch into the
//! MySQL row-based replication event stream consumed by replicas.
//!
//! # Core Components
//!
//! ## Event Framing
//! - v4 headers with next-position bookkeeping and optional CRC32 trailers
//! - GTID, query, table map, rows and XID encoders
//!
//! ## Row Images
//! - Column type metadata for table maps
//! - Row serialization with null bitmaps
//! - Duplicate-count translation for keyless tables
//!
//! ## Producer
//! - Schema changes as one GTID and query pair per statement
//! - Data changes as one GTID, BEGIN, table maps, rows, XID transaction
//! - GTID sequence persisted before delivery and resumed after restart

pub mod config;
pub mod event;
pub mod gtid;
pub mod lib;
pub mod position;
pub mod producer;
pub mod rows;
pub mod sink;
pub mod system;

// Re-export commonly used types
pub use config::BinlogConfig;
pub use event::{BinlogEvent, BinlogFormat, BinlogStream, ChecksumAlgorithm, EventHeader, EventType, Query, STMT_END_F};
pub use gtid::{Gtid, GtidSet, Position};
pub use lib::{BinlogError, BinlogResult};
pub use position::{GTID_EXECUTED_KEY, KvPositionStore, PositionStore};
pub use producer::BinlogProducer;
pub use rows::{Bitmap, RowImage, Rows, TableMap, extract_row_count_and_diff_type, serialize_row, table_map_for};
pub use sink::{CollectingSink, EventSink};
pub use system::{SystemConfig, SystemVariables};
