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

//! Translation of committed root changes into replication events
//!
//! The producer listens for working root updates on one branch. Schema
//! changes go out first, one GTID and query pair per DDL statement. Row
//! changes follow as a single transaction framed by a GTID, a `BEGIN`
//! query and an XID. Every event advances the shared log position, and
//! every GTID is persisted before the batch containing it is delivered.

use super::event::{BinlogEvent, BinlogFormat, BinlogStream, ChecksumAlgorithm, EventType, Query, STMT_END_F};
use super::gtid::{Gtid, Position};
use super::lib::{BinlogError, BinlogResult};
use super::position::PositionStore;
use super::rows::{Bitmap, RowImage, Rows, extract_row_count_and_diff_type, serialize_row, table_map_for};
use super::sink::EventSink;
use super::system::SystemConfig;
use crate::catalog::{DatabaseUpdateListener, ListenerResult, RootValue, Schema, TableDelta, TableName, schema_patch_statements, table_deltas};
use crate::storage::{DiffType, Tuple, Value, generate_timestamp};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Table ids at or below this value are reserved
const RESERVED_TABLE_ID: u64 = 2;

/// Next sequence to hand out and the executed set it extends
#[derive(Debug, Clone)]
struct GtidState {
    position: Position,
    sequence: i64,
}

struct ProducerState {
    stream: BinlogStream,
    gtid: Option<GtidState>,
}

/// Events of one notification, encoded against a moving log position
struct EventBatch<'a> {
    format: &'a BinlogFormat,
    stream: &'a mut BinlogStream,
    events: Vec<BinlogEvent>,
}

impl<'a> EventBatch<'a> {
    fn new(format: &'a BinlogFormat, stream: &'a mut BinlogStream) -> Self {
        Self { format, stream, events: Vec::new() }
    }

    fn emit<F>(&mut self, encode: F) -> BinlogResult<()>
    where
        F: FnOnce(&BinlogFormat, &BinlogStream) -> BinlogResult<BinlogEvent>,
    {
        let event = encode(self.format, self.stream)?;
        self.stream.log_position = self.stream.log_position.wrapping_add(event.length());
        self.events.push(event);
        Ok(())
    }

    fn into_events(self) -> Vec<BinlogEvent> {
        self.events
    }
}

/// Rows collected for one rows event before encoding
struct PendingRows {
    event_type: EventType,
    table_id: u64,
    rows: Rows,
}

pub struct BinlogProducer {
    branch: String,
    format: BinlogFormat,
    state: Mutex<ProducerState>,
    positions: Arc<dyn PositionStore>,
    system: Arc<dyn SystemConfig>,
    sink: Arc<dyn EventSink>,
}

impl BinlogProducer {
    /// Create a producer for `branch`
    ///
    /// Fails when `@@binlog_checksum` is neither `NONE` nor `CRC32` or when no
    /// server id is configured; callers are expected to run without
    /// replication in that case.
    pub fn new(branch: impl Into<String>, system: Arc<dyn SystemConfig>, positions: Arc<dyn PositionStore>, sink: Arc<dyn EventSink>) -> BinlogResult<Self> {
        let checksum = ChecksumAlgorithm::from_variable(&system.binlog_checksum()?)?;
        let server_id = system.server_id()?;
        let timestamp = (generate_timestamp() / 1_000_000_000) as u32;
        let stream = BinlogStream { server_id, log_position: 0, timestamp };
        let branch = branch.into();
        debug!(branch = %branch, server_id, checksum = ?checksum, "binlog producer created");
        Ok(Self { branch, format: BinlogFormat::new(checksum), state: Mutex::new(ProducerState { stream, gtid: None }), positions, system, sink })
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn format(&self) -> &BinlogFormat {
        &self.format
    }

    /// Offset at which the next event will be written
    pub fn log_position(&self) -> u32 {
        self.state.lock().stream.log_position
    }

    /// Rotate and format description events that open a stream to a replica
    ///
    /// These describe the stream rather than belong to it, so the shared log
    /// position is left untouched.
    pub fn preamble(&self, filename: &str) -> Vec<BinlogEvent> {
        let stream = self.state.lock().stream.clone();
        let rotate = BinlogEvent::new_rotate(&self.format, &BinlogStream { log_position: 0, ..stream.clone() }, 4, filename);
        let fde = BinlogEvent::new_format_description(&self.format, &stream);
        vec![rotate, fde]
    }

    /// Allocate the next GTID event without delivering it
    ///
    /// The position is persisted exactly as for a delivered event, which makes
    /// this useful to reproduce a crash between persisting and delivery.
    pub fn create_gtid_event(&self) -> BinlogResult<BinlogEvent> {
        let mut state = self.state.lock();
        let ProducerState { stream, gtid } = &mut *state;
        let mut batch = EventBatch::new(&self.format, stream);
        self.gtid_event(&mut batch, gtid)?;
        let mut events = batch.into_events();
        events.pop().ok_or_else(|| BinlogError::MalformedEvent("no gtid event produced".to_string()))
    }

    /// Produce and deliver the events for a working root change
    pub fn process_root_update(&self, database: &str, branch: &str, before: &RootValue, after: &RootValue) -> BinlogResult<()> {
        if branch != self.branch {
            trace!(database, branch, "ignoring update outside the replicated branch");
            return Ok(());
        }
        let deltas = table_deltas(before, after)?;

        // TODO: serialize concurrent commits through a queue so GTID order always matches delivery order
        let mut state = self.state.lock();
        let ProducerState { stream, gtid } = &mut *state;
        let mut batch = EventBatch::new(&self.format, stream);

        let has_data_changes = self.schema_change_events(&mut batch, gtid, database, &deltas)?;
        if has_data_changes {
            let transaction = self.gtid_event(&mut batch, gtid)?;
            batch.emit(|f, s| BinlogEvent::new_query(f, s, &Query::new(database, "BEGIN")))?;
            let table_ids = self.table_map_events(&mut batch, database, &deltas)?;
            self.row_events(&mut batch, &deltas, &table_ids)?;
            batch.emit(|f, s| Ok(BinlogEvent::new_xid(f, s, transaction.sequence as u64)))?;
        }

        let events = batch.into_events();
        drop(state);
        if events.is_empty() {
            return Ok(());
        }
        debug!(database, events = events.len(), "delivering binlog events");
        self.sink.send_events(events);
        Ok(())
    }

    fn database_statement(&self, database: &str, sql: String) -> BinlogResult<()> {
        let mut state = self.state.lock();
        let ProducerState { stream, gtid } = &mut *state;
        let mut batch = EventBatch::new(&self.format, stream);
        self.gtid_event(&mut batch, gtid)?;
        batch.emit(|f, s| BinlogEvent::new_query(f, s, &Query::new(database, sql)))?;
        let events = batch.into_events();
        drop(state);
        self.sink.send_events(events);
        Ok(())
    }

    fn load_gtid_state(&self) -> BinlogResult<GtidState> {
        let Some(position) = self.positions.load()?.filter(|p| !p.is_zero()) else {
            info!("no persisted GTID position, starting at sequence 1");
            return Ok(GtidState { position: Position::default(), sequence: 1 });
        };
        let sequence = position.last_sequence()?.map_or(1, |n| n + 1);
        info!(gtid_executed = %position, next_sequence = sequence, "resuming from persisted GTID position");
        Ok(GtidState { position, sequence })
    }

    /// Emit a GTID event, then persist and publish the extended executed set
    fn gtid_event(&self, batch: &mut EventBatch<'_>, gtid: &mut Option<GtidState>) -> BinlogResult<Gtid> {
        let loaded = match gtid.take() {
            Some(state) => state,
            None => self.load_gtid_state()?,
        };
        let state = gtid.insert(loaded);

        let current = Gtid::new(self.system.server_uuid()?, state.sequence);
        batch.emit(|f, s| Ok(BinlogEvent::new_gtid(f, s, current)))?;
        state.sequence += 1;

        state.position.gtid_set.add_gtid(current);
        self.positions.save(&state.position)?;
        self.system.assign_gtid_executed(&state.position.gtid_set.to_string())?;
        trace!(gtid = %current, "allocated gtid");
        Ok(current)
    }

    /// DDL events; returns whether any surviving table also changed data
    fn schema_change_events(&self, batch: &mut EventBatch<'_>, gtid: &mut Option<GtidState>, database: &str, deltas: &[TableDelta]) -> BinlogResult<bool> {
        let mut has_data_changes = false;
        for delta in deltas {
            let schema_changed = delta.has_schema_changed()?;
            if delta.has_data_changed() && !delta.is_drop() {
                has_data_changes = true;
            }
            if !schema_changed && !delta.is_rename() {
                continue;
            }
            for statement in schema_patch_statements(delta)? {
                // DDL commits implicitly, so every statement is its own transaction
                self.gtid_event(batch, gtid)?;
                batch.emit(|f, s| BinlogEvent::new_query(f, s, &Query::new(database, statement.as_str())))?;
            }
        }
        Ok(has_data_changes)
    }

    fn table_map_events(&self, batch: &mut EventBatch<'_>, database: &str, deltas: &[TableDelta]) -> BinlogResult<HashMap<TableName, u64>> {
        let mut table_id = RESERVED_TABLE_ID;
        let mut ids = HashMap::new();
        for delta in deltas {
            if !delta.has_data_changed() || delta.is_drop() {
                continue;
            }
            let Some(table) = &delta.to_table else {
                continue;
            };
            table_id += 1;
            let name = delta.current_name()?;
            ids.insert(name.clone(), table_id);
            let map = table_map_for(database, &name.name, table.schema())?;
            batch.emit(|f, s| BinlogEvent::new_table_map(f, s, table_id, &map))?;
        }
        Ok(ids)
    }

    fn row_events(&self, batch: &mut EventBatch<'_>, deltas: &[TableDelta], table_ids: &HashMap<TableName, u64>) -> BinlogResult<()> {
        let mut pending = Vec::new();
        for delta in deltas {
            // dropped tables lose their rows with the DROP TABLE statement
            if delta.is_drop() || !delta.has_data_changed() {
                continue;
            }
            let name = delta.current_name()?;
            let table_id = *table_ids.get(name).ok_or_else(|| BinlogError::MalformedEvent(format!("no table map for {}", name)))?;
            pending.extend(self.table_rows(delta, table_id)?);
        }

        if let Some(last) = pending.last_mut() {
            last.rows.flags |= STMT_END_F;
        }
        for p in pending {
            batch.emit(|f, s| {
                Ok(match p.event_type {
                    EventType::WriteRows => BinlogEvent::new_write_rows(f, s, p.table_id, &p.rows),
                    EventType::DeleteRows => BinlogEvent::new_delete_rows(f, s, p.table_id, &p.rows),
                    _ => BinlogEvent::new_update_rows(f, s, p.table_id, &p.rows),
                })
            })?;
        }
        Ok(())
    }

    /// Write, delete and update rows for one table, in that order
    fn table_rows(&self, delta: &TableDelta, table_id: u64) -> BinlogResult<Vec<PendingRows>> {
        let Some(schema) = delta.to_schema() else {
            return Ok(Vec::new());
        };
        let from_schema = delta.from_schema().unwrap_or(schema);
        let mut writes = Vec::new();
        let mut deletes = Vec::new();
        let mut updates = Vec::new();

        for diff in delta.row_diffs()? {
            let (count, kind) = extract_row_count_and_diff_type(schema, &diff)?;
            let image = match kind {
                DiffType::Added => {
                    let (data, null_columns) = row_image(schema, schema, &diff.key, diff.to.as_ref())?;
                    (&mut writes, RowImage { null_columns, data, null_identify_columns: Bitmap::new(0), identify: Vec::new() })
                }
                DiffType::Removed => {
                    let (identify, null_identify_columns) = row_image(from_schema, schema, &diff.key, diff.from.as_ref())?;
                    (&mut deletes, RowImage { null_columns: Bitmap::new(0), data: Vec::new(), null_identify_columns, identify })
                }
                DiffType::Modified => {
                    let (data, null_columns) = row_image(schema, schema, &diff.key, diff.to.as_ref())?;
                    let (identify, null_identify_columns) = row_image(from_schema, schema, &diff.key, diff.from.as_ref())?;
                    (&mut updates, RowImage { null_columns, data, null_identify_columns, identify })
                }
            };
            let (target, row) = image;
            target.extend(std::iter::repeat_n(row, count as usize));
        }

        let columns = schema.columns().len();
        let mut out = Vec::new();
        if !writes.is_empty() {
            let rows = Rows { flags: 0, identify_columns: None, data_columns: Some(Bitmap::full(columns)), rows: writes };
            out.push(PendingRows { event_type: EventType::WriteRows, table_id, rows });
        }
        if !deletes.is_empty() {
            let rows = Rows { flags: 0, identify_columns: Some(Bitmap::full(columns)), data_columns: None, rows: deletes };
            out.push(PendingRows { event_type: EventType::DeleteRows, table_id, rows });
        }
        if !updates.is_empty() {
            let rows = Rows { flags: 0, identify_columns: Some(Bitmap::full(columns)), data_columns: Some(Bitmap::full(columns)), rows: updates };
            out.push(PendingRows { event_type: EventType::UpdateRows, table_id, rows });
        }
        trace!(table = ?delta.to_name, events = out.len(), "collected row changes");
        Ok(out)
    }
}

/// Serialize one side of a diff in the layout of `target`
///
/// Rows from an older schema are matched to the new columns by name.
fn row_image(source: &Schema, target: &Schema, key: &Tuple, value: Option<&Tuple>) -> BinlogResult<(Vec<u8>, Bitmap)> {
    let value = value.ok_or_else(|| BinlogError::MalformedEvent("row diff is missing a side".to_string()))?;
    let row = source.row_from_entry(key, value)?;
    if source.columns() == target.columns() {
        return serialize_row(target, &row);
    }
    let projected = target.columns().iter().map(|c| source.column(&c.name).and_then(|(i, _)| row.get(i).cloned()).unwrap_or(Value::Null)).collect();
    serialize_row(target, &Tuple::new(projected))
}

impl DatabaseUpdateListener for BinlogProducer {
    fn working_root_updated(&self, database: &str, branch: &str, before: &RootValue, after: &RootValue) -> ListenerResult {
        Ok(self.process_root_update(database, branch, before, after)?)
    }

    fn database_created(&self, database: &str) -> ListenerResult {
        Ok(self.database_statement(database, format!("create database `{}`;", database))?)
    }

    fn database_dropped(&self, database: &str) -> ListenerResult {
        Ok(self.database_statement(database, format!("drop database `{}`;", database))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binlog::position::{KvPositionStore, MockPositionStore};
    use crate::binlog::sink::CollectingSink;
    use crate::binlog::system::{GTID_EXECUTED, SystemVariables};
    use crate::binlog::config::BinlogConfig;
    use crate::catalog::{Column, ColumnType, RowEdit};
    use crate::storage::{ChunkConfig, MemoryKv, MemoryNodeStore};

    const SID: &str = "3e11fa47-71ca-11e1-9e33-c80aa9429562";

    struct Fixture {
        producer: BinlogProducer,
        sink: Arc<CollectingSink>,
        system: Arc<SystemVariables>,
    }

    fn fixture(checksum: &str) -> Fixture {
        let config = BinlogConfig { server_uuid: Some(SID.to_string()), binlog_checksum: checksum.to_string(), ..BinlogConfig::default() };
        let system = Arc::new(SystemVariables::from_config(&config));
        let sink = Arc::new(CollectingSink::new());
        let positions = Arc::new(KvPositionStore::new(Arc::new(MemoryKv::new())));
        let producer = BinlogProducer::new("main", system.clone(), positions, sink.clone()).unwrap();
        Fixture { producer, sink, system }
    }

    fn empty_root() -> RootValue {
        RootValue::empty(Arc::new(MemoryNodeStore::new()), ChunkConfig::default())
    }

    fn schema() -> Schema {
        Schema::new(vec![Column::new("pk", ColumnType::Int).primary_key(), Column::new("c1", ColumnType::Varchar(20))], vec![]).unwrap()
    }

    fn row(pk: i64, c1: &str) -> Tuple {
        Tuple::new(vec![Value::Int(pk), Value::Text(c1.to_string())])
    }

    fn with_rows(root: &RootValue, name: &str, edits: Vec<RowEdit>) -> RootValue {
        let name = TableName::new(name);
        let table = root.get_table(&name).unwrap().apply(edits).unwrap();
        root.put_table(name, table)
    }

    fn types(events: &[BinlogEvent]) -> Vec<EventType> {
        events.iter().map(|e| e.event_type().unwrap()).collect()
    }

    #[test]
    fn test_constructor_validates_system_variables() {
        let sink = Arc::new(CollectingSink::new());
        let positions = Arc::new(KvPositionStore::new(Arc::new(MemoryKv::new())));
        let bad_checksum = Arc::new(SystemVariables::from_config(&BinlogConfig { binlog_checksum: "SHA1".into(), ..BinlogConfig::default() }));
        assert!(matches!(BinlogProducer::new("main", bad_checksum, positions.clone(), sink.clone()), Err(BinlogError::UnsupportedChecksum(_))));
        let no_id = Arc::new(SystemVariables::from_config(&BinlogConfig { server_id: None, ..BinlogConfig::default() }));
        assert!(matches!(BinlogProducer::new("main", no_id, positions, sink), Err(BinlogError::MissingSystemVariable(_))));
    }

    #[test]
    fn test_create_table_and_insert_in_one_commit() {
        let f = fixture("CRC32");
        let before = empty_root();
        let created = before.create_table(TableName::new("t"), schema()).unwrap();
        let after = with_rows(&created, "t", vec![RowEdit::Insert(row(1, "a")), RowEdit::Insert(row(2, "b"))]);
        f.producer.process_root_update("db01", "main", &before, &after).unwrap();

        let events = f.sink.take();
        assert_eq!(
            types(&events),
            vec![EventType::Gtid, EventType::Query, EventType::Gtid, EventType::Query, EventType::TableMap, EventType::WriteRows, EventType::Xid]
        );
        let format = f.producer.format().clone();
        assert!(events[1].decode_query(&format).unwrap().sql.starts_with("CREATE TABLE `t`"));
        assert_eq!(events[3].decode_query(&format).unwrap().sql, "BEGIN");
        assert_eq!(events[4].table_id(&format).unwrap(), 3);
        assert_eq!(events[5].rows_flags(&format).unwrap(), STMT_END_F);
        assert_eq!(events[0].decode_gtid(&format).unwrap().sequence, 1);
        assert_eq!(events[2].decode_gtid(&format).unwrap().sequence, 2);
        assert_eq!(events[6].body(&format).unwrap(), &2u64.to_le_bytes());

        let mut position = 0;
        for event in &events {
            let header = event.header().unwrap();
            assert!(event.is_checksum_valid(&format));
            assert_eq!(header.next_position, position + event.length());
            position = header.next_position;
        }
        assert_eq!(f.producer.log_position(), position);
        assert_eq!(f.system.get(GTID_EXECUTED).unwrap(), format!("{}:1-2", SID));
    }

    #[test]
    fn test_update_and_delete_ordering() {
        let f = fixture("NONE");
        let base = empty_root().create_table(TableName::new("t"), schema()).unwrap();
        let before = with_rows(&base, "t", vec![RowEdit::Insert(row(1, "a")), RowEdit::Insert(row(2, "b"))]);
        let after = with_rows(&before, "t", vec![RowEdit::Insert(row(1, "z")), RowEdit::Delete(row(2, "b")), RowEdit::Insert(row(3, "c"))]);
        f.producer.process_root_update("db", "main", &before, &after).unwrap();

        let events = f.sink.take();
        assert_eq!(
            types(&events),
            vec![EventType::Gtid, EventType::Query, EventType::TableMap, EventType::WriteRows, EventType::DeleteRows, EventType::UpdateRows, EventType::Xid]
        );
        let format = f.producer.format();
        assert_eq!(events[3].rows_flags(format).unwrap(), 0);
        assert_eq!(events[5].rows_flags(format).unwrap(), STMT_END_F);
    }

    #[test]
    fn test_other_branches_are_ignored() {
        let f = fixture("CRC32");
        let before = empty_root();
        let after = before.create_table(TableName::new("t"), schema()).unwrap();
        f.producer.process_root_update("db", "dev", &before, &after).unwrap();
        assert!(f.sink.is_empty());
        assert_eq!(f.producer.log_position(), 0);
    }

    #[test]
    fn test_schema_only_change_has_no_transaction() {
        let f = fixture("CRC32");
        let before = empty_root();
        let after = before.create_table(TableName::new("t"), schema()).unwrap();
        f.producer.process_root_update("db", "main", &before, &after).unwrap();
        assert_eq!(types(&f.sink.take()), vec![EventType::Gtid, EventType::Query]);
    }

    #[test]
    fn test_database_lifecycle_events() {
        let f = fixture("CRC32");
        f.producer.database_created("shop").unwrap();
        f.producer.database_dropped("shop").unwrap();
        let events = f.sink.take();
        let format = f.producer.format();
        assert_eq!(types(&events), vec![EventType::Gtid, EventType::Query, EventType::Gtid, EventType::Query]);
        assert_eq!(events[1].decode_query(format).unwrap(), Query::new("shop", "create database `shop`;"));
        assert_eq!(events[3].decode_query(format).unwrap(), Query::new("shop", "drop database `shop`;"));
        assert_eq!(events[2].decode_gtid(format).unwrap().sequence, 2);
    }

    #[test]
    fn test_failed_save_blocks_delivery() {
        let mut positions = MockPositionStore::new();
        positions.expect_load().times(1).returning(|| Ok(Some(format!("{}:1-9", SID).parse().unwrap())));
        positions.expect_save().times(1).withf(|p| p.last_sequence().unwrap() == Some(10)).returning(|_| Err(BinlogError::PositionStore("disk full".to_string())));
        let system = Arc::new(SystemVariables::from_config(&BinlogConfig { server_uuid: Some(SID.to_string()), ..BinlogConfig::default() }));
        let sink = Arc::new(CollectingSink::new());
        let producer = BinlogProducer::new("main", system.clone(), Arc::new(positions), sink.clone()).unwrap();

        let err = producer.database_created("db").unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert!(sink.is_empty());
        assert!(system.get(GTID_EXECUTED).is_none());
    }

    #[test]
    fn test_preamble_does_not_move_position() {
        let f = fixture("CRC32");
        let preamble = f.producer.preamble("binlog-main.000001");
        assert_eq!(types(&preamble), vec![EventType::Rotate, EventType::FormatDescription]);
        assert_eq!(f.producer.log_position(), 0);
    }
}
