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

use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;
use verdb_core::binlog::{BinlogConfig, BinlogEvent, BinlogProducer, CollectingSink, EventType, KvPositionStore, PositionStore, STMT_END_F, SystemVariables};
use verdb_core::catalog::{Column, ColumnType, DEFAULT_BRANCH, DatabaseProvider, RootValue, RowEdit, Schema, TableName};
use verdb_core::storage::{FileKv, MemoryKv, Tuple, Value};

const SID: &str = "b5a7c3d1-4f2e-4a6b-9c8d-0e1f2a3b4c5d";

struct Harness {
    provider: DatabaseProvider,
    producer: Arc<BinlogProducer>,
    sink: Arc<CollectingSink>,
}

fn harness_with(positions: Arc<dyn PositionStore>) -> Harness {
    let config = BinlogConfig { server_uuid: Some(SID.to_string()), ..BinlogConfig::default() };
    let system = Arc::new(SystemVariables::from_config(&config));
    let sink = Arc::new(CollectingSink::new());
    let producer = Arc::new(BinlogProducer::new(config.branch.clone(), system, positions, sink.clone()).unwrap());
    let provider = DatabaseProvider::default();
    provider.register_listener(producer.clone());
    Harness { provider, producer, sink }
}

fn harness() -> Harness {
    harness_with(Arc::new(KvPositionStore::new(Arc::new(MemoryKv::new()))))
}

fn file_positions(path: &Path) -> Arc<dyn PositionStore> {
    Arc::new(KvPositionStore::new(Arc::new(FileKv::open(path).unwrap())))
}

fn keyed() -> Schema {
    Schema::new(vec![Column::new("pk", ColumnType::Int).primary_key(), Column::new("c1", ColumnType::Varchar(100))], vec![]).unwrap()
}

fn row(pk: i64, c1: &str) -> Tuple {
    Tuple::new(vec![Value::Int(pk), Value::Text(c1.to_string())])
}

impl Harness {
    fn root(&self, db: &str) -> RootValue {
        self.provider.database(db).unwrap().working_root(DEFAULT_BRANCH).unwrap()
    }

    fn create_table(&self, root: RootValue, name: &str, schema: Schema) -> RootValue {
        root.create_table(TableName::new(name), schema).unwrap()
    }

    fn edit(&self, root: RootValue, name: &str, edits: Vec<RowEdit>) -> RootValue {
        let name = TableName::new(name);
        let table = root.get_table(&name).unwrap().apply(edits).unwrap();
        root.put_table(name, table)
    }

    fn gtid_sequences(&self, events: &[BinlogEvent]) -> Vec<i64> {
        let format = self.producer.format();
        events.iter().filter(|e| e.event_type() == Some(EventType::Gtid)).map(|e| e.decode_gtid(format).unwrap().sequence).collect()
    }
}

fn types(events: &[BinlogEvent]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type().unwrap()).collect()
}

#[test]
fn test_create_and_insert_produces_seven_events() {
    let h = harness();
    h.provider.create_database("db01").unwrap();
    let created = h.sink.take();
    assert_eq!(types(&created), vec![EventType::Gtid, EventType::Query]);

    let root = h.create_table(h.root("db01"), "t", keyed());
    let root = h.edit(root, "t", vec![RowEdit::Insert(row(1, "42")), RowEdit::Insert(row(2, "foo"))]);
    h.provider.commit("db01", DEFAULT_BRANCH, root).unwrap();

    let events = h.sink.take();
    assert_eq!(
        types(&events),
        vec![EventType::Gtid, EventType::Query, EventType::Gtid, EventType::Query, EventType::TableMap, EventType::WriteRows, EventType::Xid]
    );
    let format = h.producer.format();
    let create = events[1].decode_query(format).unwrap();
    assert_eq!(create.database, "db01");
    assert!(create.sql.contains("`c1` varchar(100)"));
    assert_eq!(events[3].decode_query(format).unwrap().sql, "BEGIN");
    assert_eq!(h.gtid_sequences(&created), vec![1]);
    assert_eq!(h.gtid_sequences(&events), vec![2, 3]);

    let mut position = created.last().unwrap().header().unwrap().next_position;
    for event in &events {
        let header = event.header().unwrap();
        assert!(header.next_position > position);
        assert_eq!(header.next_position, position + header.event_length);
        assert!(event.is_checksum_valid(format));
        position = header.next_position;
    }
    assert_eq!(h.producer.log_position(), position);
}

#[test]
fn test_sequence_resumes_after_crash() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("binlog.kv");

    {
        let h = harness_with(file_positions(&path));
        h.provider.create_database("db").unwrap();
        let root = h.create_table(h.root("db"), "t", keyed());
        h.provider.commit("db", DEFAULT_BRANCH, root).unwrap();
        assert_eq!(h.gtid_sequences(&h.sink.take()), vec![1, 2]);

        // persisted but never delivered
        let orphan = h.producer.create_gtid_event().unwrap();
        assert_eq!(orphan.decode_gtid(h.producer.format()).unwrap().sequence, 3);
        assert!(h.sink.is_empty());
    }

    let positions = file_positions(&path);
    let stored = positions.load().unwrap().unwrap();
    assert_eq!(stored.to_string(), format!("{}:1-3", SID));
    assert_eq!(stored.last_sequence().unwrap(), Some(3));

    let h = harness_with(positions);
    h.provider.create_database("db").unwrap();
    let events = h.sink.take();
    let gtid = events[0].decode_gtid(h.producer.format()).unwrap();
    assert_eq!(gtid.server, Uuid::parse_str(SID).unwrap());
    assert_eq!(gtid.sequence, 4);
    // a fresh process starts its own log at zero
    assert_eq!(events[0].header().unwrap().next_position, events[0].length());
}

#[test]
fn test_keyless_duplicates_become_repeated_rows() {
    let h = harness();
    h.provider.create_database("db").unwrap();
    let schema = Schema::new(vec![Column::new("a", ColumnType::Int), Column::new("b", ColumnType::Varchar(10))], vec![]).unwrap();
    let root = h.create_table(h.root("db"), "k", schema);
    h.provider.commit("db", DEFAULT_BRANCH, root).unwrap();
    h.sink.take();

    let dup = Tuple::new(vec![Value::Int(7), Value::Text("x".into())]);
    let root = h.edit(h.root("db"), "k", vec![RowEdit::Insert(dup.clone()), RowEdit::Insert(dup.clone())]);
    h.provider.commit("db", DEFAULT_BRANCH, root).unwrap();
    let inserted = h.sink.take();
    assert_eq!(types(&inserted), vec![EventType::Gtid, EventType::Query, EventType::TableMap, EventType::WriteRows, EventType::Xid]);

    let root = h.edit(h.root("db"), "k", vec![RowEdit::Delete(dup)]);
    h.provider.commit("db", DEFAULT_BRANCH, root).unwrap();
    let deleted = h.sink.take();
    assert_eq!(types(&deleted), vec![EventType::Gtid, EventType::Query, EventType::TableMap, EventType::DeleteRows, EventType::Xid]);

    // table id, flags, extra data, column count, one column bitmap, then per row a null bitmap and the data
    let format = h.producer.format();
    let image = 1 + 4 + 1 + 1;
    assert_eq!(inserted[3].body(format).unwrap().len(), 12 + 2 * image);
    assert_eq!(deleted[3].body(format).unwrap().len(), 12 + image);
}

#[test]
fn test_multi_table_transaction_ordering() {
    let h = harness();
    h.provider.create_database("db").unwrap();
    let mut root = h.root("db");
    for name in ["a", "b", "c"] {
        root = h.create_table(root, name, keyed());
        root = h.edit(root, name, vec![RowEdit::Insert(row(1, "one")), RowEdit::Insert(row(2, "two"))]);
    }
    h.provider.commit("db", DEFAULT_BRANCH, root).unwrap();
    h.sink.take();

    let mut root = h.root("db");
    root = h.edit(root, "a", vec![RowEdit::Insert(row(3, "three"))]);
    root = h.edit(root, "b", vec![RowEdit::Delete(row(1, "one")), RowEdit::Insert(row(2, "deux"))]);
    root = h.edit(root, "c", vec![RowEdit::Insert(row(1, "uno"))]);
    h.provider.commit("db", DEFAULT_BRANCH, root).unwrap();

    let events = h.sink.take();
    assert_eq!(
        types(&events),
        vec![
            EventType::Gtid,
            EventType::Query,
            EventType::TableMap,
            EventType::TableMap,
            EventType::TableMap,
            EventType::WriteRows,
            EventType::DeleteRows,
            EventType::UpdateRows,
            EventType::UpdateRows,
            EventType::Xid,
        ]
    );
    let format = h.producer.format();
    let ids: Vec<u64> = events[2..9].iter().map(|e| e.table_id(format).unwrap()).collect();
    assert_eq!(ids, vec![3, 4, 5, 3, 4, 4, 5]);
    let flags: Vec<u16> = events[5..9].iter().map(|e| e.rows_flags(format).unwrap()).collect();
    assert_eq!(flags, vec![0, 0, 0, STMT_END_F]);
}

#[test]
fn test_drop_and_rename_are_statements_only() {
    let h = harness();
    h.provider.create_database("db").unwrap();
    let root = h.create_table(h.root("db"), "old", keyed());
    let root = h.edit(root, "old", vec![RowEdit::Insert(row(1, "a"))]);
    let root = h.create_table(root, "gone", keyed());
    let root = h.edit(root, "gone", vec![RowEdit::Insert(row(1, "a"))]);
    h.provider.commit("db", DEFAULT_BRANCH, root).unwrap();
    h.sink.take();

    let root = h.root("db").rename_table(&TableName::new("old"), TableName::new("new")).unwrap().remove_table(&TableName::new("gone")).unwrap();
    h.provider.commit("db", DEFAULT_BRANCH, root).unwrap();

    let events = h.sink.take();
    let format = h.producer.format();
    let statements: Vec<String> = events.iter().filter(|e| e.event_type() == Some(EventType::Query)).map(|e| e.decode_query(format).unwrap().sql).collect();
    assert_eq!(types(&events), vec![EventType::Gtid, EventType::Query, EventType::Gtid, EventType::Query]);
    assert!(statements.contains(&"RENAME TABLE `old` TO `new`;".to_string()));
    assert!(statements.contains(&"DROP TABLE `gone`;".to_string()));
}

#[test]
fn test_database_lifecycle_and_branch_filter() {
    let h = harness();
    h.provider.create_database("shop").unwrap();
    let db = h.provider.database("shop").unwrap();
    db.create_branch("feature", DEFAULT_BRANCH).unwrap();
    h.sink.take();

    let root = h.create_table(db.working_root("feature").unwrap(), "t", keyed());
    h.provider.commit("shop", "feature", root).unwrap();
    assert!(h.sink.is_empty());

    h.provider.drop_database("shop").unwrap();
    let events = h.sink.take();
    let query = events[1].decode_query(h.producer.format()).unwrap();
    assert_eq!(query.sql, "drop database `shop`;");
    assert_eq!(h.gtid_sequences(&events), vec![2]);
}
