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

//! MySQL v4 binlog event framing
//!
//! Every event is a 19-byte header, a type-specific body and, when the
//! format uses CRC32 checksums, a 4-byte trailer. The header carries the
//! position of the next event, so encoders take the stream whose log
//! position the caller advances after each event.

use super::gtid::Gtid;
use super::lib::{BinlogError, BinlogResult};
use super::rows::{Bitmap, Rows, TableMap, write_metadata};
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use uuid::Uuid;

/// Size of the v4 event header
pub const HEADER_LEN: usize = 19;
/// Size of the CRC32 trailer
pub const CHECKSUM_LEN: usize = 4;
pub const BINLOG_VERSION: u16 = 4;
pub const SERVER_VERSION: &str = "8.0.33-verdb";
/// Rows event flag marking the end of a statement
pub const STMT_END_F: u16 = 0x0001;

const SERVER_VERSION_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Query,
    Rotate,
    FormatDescription,
    Xid,
    TableMap,
    WriteRows,
    UpdateRows,
    DeleteRows,
    Gtid,
}

impl EventType {
    pub fn code(self) -> u8 {
        match self {
            EventType::Query => 2,
            EventType::Rotate => 4,
            EventType::FormatDescription => 15,
            EventType::Xid => 16,
            EventType::TableMap => 19,
            EventType::WriteRows => 30,
            EventType::UpdateRows => 31,
            EventType::DeleteRows => 32,
            EventType::Gtid => 33,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            2 => EventType::Query,
            4 => EventType::Rotate,
            15 => EventType::FormatDescription,
            16 => EventType::Xid,
            19 => EventType::TableMap,
            30 => EventType::WriteRows,
            31 => EventType::UpdateRows,
            32 => EventType::DeleteRows,
            33 => EventType::Gtid,
            _ => return None,
        })
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Query => "Query",
            EventType::Rotate => "Rotate",
            EventType::FormatDescription => "Format_desc",
            EventType::Xid => "Xid",
            EventType::TableMap => "Table_map",
            EventType::WriteRows => "Write_rows",
            EventType::UpdateRows => "Update_rows",
            EventType::DeleteRows => "Delete_rows",
            EventType::Gtid => "Gtid",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Off,
    Crc32,
}

impl ChecksumAlgorithm {
    /// Parse a `@@binlog_checksum` value
    pub fn from_variable(value: &str) -> BinlogResult<Self> {
        match value.to_uppercase().as_str() {
            "NONE" => Ok(ChecksumAlgorithm::Off),
            "CRC32" => Ok(ChecksumAlgorithm::Crc32),
            _ => Err(BinlogError::UnsupportedChecksum(value.to_string())),
        }
    }

    fn code(self) -> u8 {
        match self {
            ChecksumAlgorithm::Off => 0,
            ChecksumAlgorithm::Crc32 => 1,
        }
    }
}

/// Shape of every event in one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogFormat {
    pub checksum: ChecksumAlgorithm,
    pub server_version: String,
}

impl BinlogFormat {
    pub fn new(checksum: ChecksumAlgorithm) -> Self {
        Self { checksum, server_version: SERVER_VERSION.to_string() }
    }

    /// Post-header length for event types 1 through 35
    fn post_header_lengths() -> Vec<u8> {
        let mut lengths = vec![
            56, 13, 0, 8, 0, 18, 0, 4, 0, 4, // 1..=10
            4, 18, 0, 0, 0, 0, 4, 26, 8, 0, // 11..=20
            0, 0, 8, 8, 8, 2, 0, 0, 0, 10, // 21..=30
            10, 10, 25, 25, 0, // 31..=35
        ];
        lengths[EventType::FormatDescription.code() as usize - 1] = (2 + SERVER_VERSION_LEN + 4 + 1 + lengths.len()) as u8;
        lengths
    }

    fn trailer_len(&self, event_type: EventType) -> usize {
        if event_type == EventType::FormatDescription || self.checksum == ChecksumAlgorithm::Crc32 { CHECKSUM_LEN } else { 0 }
    }
}

/// Per-stream header fields; `log_position` is where the next event starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogStream {
    pub server_id: u32,
    pub log_position: u32,
    pub timestamp: u32,
}

/// Decoded v4 event header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub timestamp: u32,
    pub event_type: u8,
    pub server_id: u32,
    pub event_length: u32,
    pub next_position: u32,
    pub flags: u16,
}

/// Statement carried by a query event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub database: String,
    pub sql: String,
}

impl Query {
    pub fn new(database: impl Into<String>, sql: impl Into<String>) -> Self {
        Self { database: database.into(), sql: sql.into() }
    }
}

/// One fully framed event
#[derive(Clone, PartialEq, Eq)]
pub struct BinlogEvent {
    bytes: Vec<u8>,
}

impl fmt::Debug for BinlogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.event_type().map(|t| t.to_string()).unwrap_or_else(|| "Unknown".to_string());
        f.debug_struct("BinlogEvent").field("type", &kind).field("length", &self.length()).finish()
    }
}

fn write_lenenc(out: &mut Vec<u8>, n: u64) {
    if n < 251 {
        out.push(n as u8);
    } else if n < 1 << 16 {
        out.push(0xfc);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n < 1 << 24 {
        out.push(0xfd);
        out.extend_from_slice(&(n as u32).to_le_bytes()[..3]);
    } else {
        out.push(0xfe);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

fn write_short_string(out: &mut Vec<u8>, s: &str) -> BinlogResult<()> {
    let len = u8::try_from(s.len()).map_err(|_| BinlogError::MalformedEvent(format!("name too long: {}", s)))?;
    out.push(len);
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    Ok(())
}

fn malformed(what: &str) -> BinlogError {
    BinlogError::MalformedEvent(what.to_string())
}

impl BinlogEvent {
    /// Wrap raw bytes, e.g. read back from a stream
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    fn packetize(format: &BinlogFormat, stream: &BinlogStream, event_type: EventType, flags: u16, data: &[u8]) -> Self {
        let length = HEADER_LEN + data.len() + format.trailer_len(event_type);
        let mut bytes = Vec::with_capacity(length);
        bytes.extend_from_slice(&stream.timestamp.to_le_bytes());
        bytes.push(event_type.code());
        bytes.extend_from_slice(&stream.server_id.to_le_bytes());
        bytes.extend_from_slice(&(length as u32).to_le_bytes());
        bytes.extend_from_slice(&(stream.log_position.wrapping_add(length as u32)).to_le_bytes());
        bytes.extend_from_slice(&flags.to_le_bytes());
        bytes.extend_from_slice(data);
        match format.trailer_len(event_type) {
            0 => {}
            _ if format.checksum == ChecksumAlgorithm::Crc32 => {
                let crc = crc32fast::hash(&bytes);
                bytes.extend_from_slice(&crc.to_le_bytes());
            }
            _ => bytes.extend_from_slice(&[0; CHECKSUM_LEN]),
        }
        Self { bytes }
    }

    pub fn new_format_description(format: &BinlogFormat, stream: &BinlogStream) -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(&BINLOG_VERSION.to_le_bytes());
        let mut version = [0u8; SERVER_VERSION_LEN];
        let n = format.server_version.len().min(SERVER_VERSION_LEN);
        version[..n].copy_from_slice(&format.server_version.as_bytes()[..n]);
        data.extend_from_slice(&version);
        data.extend_from_slice(&stream.timestamp.to_le_bytes());
        data.push(HEADER_LEN as u8);
        data.extend_from_slice(&BinlogFormat::post_header_lengths());
        data.push(format.checksum.code());
        Self::packetize(format, stream, EventType::FormatDescription, 0, &data)
    }

    pub fn new_rotate(format: &BinlogFormat, stream: &BinlogStream, position: u64, filename: &str) -> Self {
        let mut data = Vec::with_capacity(8 + filename.len());
        data.extend_from_slice(&position.to_le_bytes());
        data.extend_from_slice(filename.as_bytes());
        Self::packetize(format, stream, EventType::Rotate, 0, &data)
    }

    pub fn new_gtid(format: &BinlogFormat, stream: &BinlogStream, gtid: Gtid) -> Self {
        let mut data = Vec::with_capacity(25);
        // commit flag
        data.push(1);
        data.extend_from_slice(gtid.server.as_bytes());
        data.extend_from_slice(&gtid.sequence.to_le_bytes());
        Self::packetize(format, stream, EventType::Gtid, 0, &data)
    }

    pub fn new_query(format: &BinlogFormat, stream: &BinlogStream, query: &Query) -> BinlogResult<Self> {
        let db_len = u8::try_from(query.database.len()).map_err(|_| malformed("database name too long"))?;
        let mut data = Vec::with_capacity(13 + query.database.len() + 1 + query.sql.len());
        // slave proxy id, execution time
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.push(db_len);
        // error code, status vars length
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(query.database.as_bytes());
        data.push(0);
        data.extend_from_slice(query.sql.as_bytes());
        Ok(Self::packetize(format, stream, EventType::Query, 0, &data))
    }

    pub fn new_xid(format: &BinlogFormat, stream: &BinlogStream, xid: u64) -> Self {
        let mut data = Vec::with_capacity(8);
        data.extend_from_slice(&xid.to_le_bytes());
        Self::packetize(format, stream, EventType::Xid, 0, &data)
    }

    pub fn new_table_map(format: &BinlogFormat, stream: &BinlogStream, table_id: u64, map: &TableMap) -> BinlogResult<Self> {
        let mut data = Vec::new();
        data.extend_from_slice(&table_id.to_le_bytes()[..6]);
        data.extend_from_slice(&map.flags.to_le_bytes());
        write_short_string(&mut data, &map.database)?;
        write_short_string(&mut data, &map.name)?;
        write_lenenc(&mut data, map.types.len() as u64);
        data.extend_from_slice(&map.types);
        let mut metadata = Vec::new();
        for (ty, meta) in map.types.iter().zip(&map.metadata) {
            write_metadata(&mut metadata, *ty, *meta);
        }
        write_lenenc(&mut data, metadata.len() as u64);
        data.extend_from_slice(&metadata);
        data.extend_from_slice(map.can_be_null.bytes());
        Ok(Self::packetize(format, stream, EventType::TableMap, 0, &data))
    }

    fn new_rows(format: &BinlogFormat, stream: &BinlogStream, event_type: EventType, table_id: u64, rows: &Rows) -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(&table_id.to_le_bytes()[..6]);
        data.extend_from_slice(&rows.flags.to_le_bytes());
        // v2 extra data length, counting itself
        data.extend_from_slice(&2u16.to_le_bytes());
        let columns = rows.identify_columns.as_ref().or(rows.data_columns.as_ref()).map(Bitmap::count).unwrap_or_default();
        write_lenenc(&mut data, columns as u64);
        if let Some(identify) = &rows.identify_columns {
            data.extend_from_slice(identify.bytes());
        }
        if let Some(columns) = &rows.data_columns {
            data.extend_from_slice(columns.bytes());
        }
        for row in &rows.rows {
            if rows.identify_columns.is_some() {
                data.extend_from_slice(row.null_identify_columns.bytes());
                data.extend_from_slice(&row.identify);
            }
            if rows.data_columns.is_some() {
                data.extend_from_slice(row.null_columns.bytes());
                data.extend_from_slice(&row.data);
            }
        }
        Self::packetize(format, stream, event_type, 0, &data)
    }

    pub fn new_write_rows(format: &BinlogFormat, stream: &BinlogStream, table_id: u64, rows: &Rows) -> Self {
        Self::new_rows(format, stream, EventType::WriteRows, table_id, rows)
    }

    pub fn new_update_rows(format: &BinlogFormat, stream: &BinlogStream, table_id: u64, rows: &Rows) -> Self {
        Self::new_rows(format, stream, EventType::UpdateRows, table_id, rows)
    }

    pub fn new_delete_rows(format: &BinlogFormat, stream: &BinlogStream, table_id: u64, rows: &Rows) -> Self {
        Self::new_rows(format, stream, EventType::DeleteRows, table_id, rows)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn length(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn header(&self) -> BinlogResult<EventHeader> {
        if self.bytes.len() < HEADER_LEN {
            return Err(malformed("event shorter than header"));
        }
        let b = &self.bytes;
        Ok(EventHeader {
            timestamp: LittleEndian::read_u32(&b[0..4]),
            event_type: b[4],
            server_id: LittleEndian::read_u32(&b[5..9]),
            event_length: LittleEndian::read_u32(&b[9..13]),
            next_position: LittleEndian::read_u32(&b[13..17]),
            flags: LittleEndian::read_u16(&b[17..19]),
        })
    }

    pub fn event_type(&self) -> Option<EventType> {
        self.bytes.get(4).copied().and_then(EventType::from_code)
    }

    /// Event body without header and checksum trailer
    pub fn body(&self, format: &BinlogFormat) -> BinlogResult<&[u8]> {
        let event_type = self.event_type().ok_or_else(|| malformed("unknown event type"))?;
        let end = self.bytes.len().checked_sub(format.trailer_len(event_type)).filter(|end| *end >= HEADER_LEN).ok_or_else(|| malformed("event too short"))?;
        Ok(&self.bytes[HEADER_LEN..end])
    }

    /// Verify the CRC32 trailer; events without one are always valid
    pub fn is_checksum_valid(&self, format: &BinlogFormat) -> bool {
        if format.checksum != ChecksumAlgorithm::Crc32 || self.bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return format.checksum != ChecksumAlgorithm::Crc32;
        }
        let (payload, trailer) = self.bytes.split_at(self.bytes.len() - CHECKSUM_LEN);
        crc32fast::hash(payload) == LittleEndian::read_u32(trailer)
    }

    pub fn decode_query(&self, format: &BinlogFormat) -> BinlogResult<Query> {
        if self.event_type() != Some(EventType::Query) {
            return Err(malformed("not a query event"));
        }
        let body = self.body(format)?;
        if body.len() < 13 {
            return Err(malformed("query event too short"));
        }
        let db_len = body[8] as usize;
        let status_len = LittleEndian::read_u16(&body[11..13]) as usize;
        let db_start = 13 + status_len;
        let sql_start = db_start + db_len + 1;
        if body.len() < sql_start {
            return Err(malformed("query event truncated"));
        }
        Ok(Query {
            database: String::from_utf8_lossy(&body[db_start..db_start + db_len]).into_owned(),
            sql: String::from_utf8_lossy(&body[sql_start..]).into_owned(),
        })
    }

    pub fn decode_gtid(&self, format: &BinlogFormat) -> BinlogResult<Gtid> {
        if self.event_type() != Some(EventType::Gtid) {
            return Err(malformed("not a gtid event"));
        }
        let body = self.body(format)?;
        if body.len() < 25 {
            return Err(malformed("gtid event too short"));
        }
        let server = Uuid::from_slice(&body[1..17]).map_err(|e| malformed(&e.to_string()))?;
        Ok(Gtid::new(server, LittleEndian::read_i64(&body[17..25])))
    }

    /// Table id of a table map or rows event
    pub fn table_id(&self, format: &BinlogFormat) -> BinlogResult<u64> {
        match self.event_type() {
            Some(EventType::TableMap | EventType::WriteRows | EventType::UpdateRows | EventType::DeleteRows) => {}
            _ => return Err(malformed("event has no table id")),
        }
        let body = self.body(format)?;
        if body.len() < 8 {
            return Err(malformed("event too short"));
        }
        Ok(LittleEndian::read_u48(&body[0..6]))
    }

    /// Flags of a rows event body
    pub fn rows_flags(&self, format: &BinlogFormat) -> BinlogResult<u16> {
        match self.event_type() {
            Some(EventType::WriteRows | EventType::UpdateRows | EventType::DeleteRows) => {}
            _ => return Err(malformed("not a rows event")),
        }
        let body = self.body(format)?;
        if body.len() < 8 {
            return Err(malformed("rows event too short"));
        }
        Ok(LittleEndian::read_u16(&body[6..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(position: u32) -> BinlogStream {
        BinlogStream { server_id: 7, log_position: position, timestamp: 1_700_000_000 }
    }

    #[test]
    fn test_header_fields() {
        let format = BinlogFormat::new(ChecksumAlgorithm::Crc32);
        let event = BinlogEvent::new_xid(&format, &stream(100), 9);
        let header = event.header().unwrap();
        assert_eq!(header.event_type, 16);
        assert_eq!(header.server_id, 7);
        assert_eq!(header.event_length, (HEADER_LEN + 8 + CHECKSUM_LEN) as u32);
        assert_eq!(header.next_position, 100 + header.event_length);
        assert_eq!(header.timestamp, 1_700_000_000);
        assert!(event.is_checksum_valid(&format));
        assert_eq!(event.body(&format).unwrap(), &9u64.to_le_bytes());
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let format = BinlogFormat::new(ChecksumAlgorithm::Crc32);
        let event = BinlogEvent::new_query(&format, &stream(0), &Query::new("db", "BEGIN")).unwrap();
        let mut bytes = event.bytes().to_vec();
        bytes[HEADER_LEN + 14] ^= 0xff;
        assert!(!BinlogEvent::from_bytes(bytes).is_checksum_valid(&format));
    }

    #[test]
    fn test_no_checksum_has_no_trailer() {
        let format = BinlogFormat::new(ChecksumAlgorithm::Off);
        let event = BinlogEvent::new_xid(&format, &stream(0), 1);
        assert_eq!(event.length() as usize, HEADER_LEN + 8);
        let fde = BinlogEvent::new_format_description(&format, &stream(0));
        assert_eq!(fde.bytes()[fde.bytes().len() - CHECKSUM_LEN..], [0; CHECKSUM_LEN]);
        assert_eq!(*fde.body(&format).unwrap().last().unwrap(), 0);
    }

    #[test]
    fn test_query_and_gtid_decode() {
        let format = BinlogFormat::new(ChecksumAlgorithm::Crc32);
        let query = Query::new("mydb", "create database `mydb`;");
        let event = BinlogEvent::new_query(&format, &stream(4), &query).unwrap();
        assert_eq!(event.decode_query(&format).unwrap(), query);

        let gtid = Gtid::new(Uuid::new_v4(), 42);
        let event = BinlogEvent::new_gtid(&format, &stream(4), gtid);
        assert_eq!(event.event_type(), Some(EventType::Gtid));
        assert_eq!(event.decode_gtid(&format).unwrap(), gtid);
        assert!(event.decode_query(&format).is_err());
    }

    #[test]
    fn test_rows_header_layout() {
        let format = BinlogFormat::new(ChecksumAlgorithm::Crc32);
        let rows = Rows { flags: STMT_END_F, identify_columns: None, data_columns: Some(Bitmap::full(3)), rows: Vec::new() };
        let event = BinlogEvent::new_write_rows(&format, &stream(0), 0x0605_0403_0201, &rows);
        let body = event.body(&format).unwrap();
        assert_eq!(&body[..10], &[1, 2, 3, 4, 5, 6, 1, 0, 2, 0]);
        assert_eq!(event.table_id(&format).unwrap(), 0x0605_0403_0201);
        assert_eq!(event.rows_flags(&format).unwrap(), STMT_END_F);
    }

    #[test]
    fn test_lenenc() {
        let mut out = Vec::new();
        write_lenenc(&mut out, 250);
        write_lenenc(&mut out, 251);
        write_lenenc(&mut out, 70_000);
        assert_eq!(out, vec![250, 0xfc, 251, 0, 0xfd, 0x70, 0x11, 0x01]);
    }

    #[test]
    fn test_unsupported_checksum() {
        assert_eq!(ChecksumAlgorithm::from_variable("crc32").unwrap(), ChecksumAlgorithm::Crc32);
        assert!(matches!(ChecksumAlgorithm::from_variable("MD5"), Err(BinlogError::UnsupportedChecksum(_))));
    }
}
