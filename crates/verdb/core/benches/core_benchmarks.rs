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

//! Benchmarks for the hot paths of statistics collection and binlog production

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use verdb_core::binlog::{BinlogConfig, BinlogProducer, CollectingSink, KvPositionStore, SystemVariables};
use verdb_core::catalog::{Column, ColumnType, RootValue, RowEdit, Schema, TableName};
use verdb_core::statistics::BucketBuilder;
use verdb_core::storage::{ChunkConfig, Hash, MemoryKv, MemoryNodeStore, ProllyMap, Tuple, Value, diff_maps};

/// Benchmark building one bucket from an ordered run of keys
fn bench_bucket_builder(c: &mut Criterion) {
    let keys: Vec<Tuple> = (0..4096).map(|i| Tuple::new(vec![Value::Int(i / 16), Value::Int(i)])).collect();
    let mut group = c.benchmark_group("bucket_builder");
    group.throughput(Throughput::Elements(keys.len() as u64));

    group.bench_function("prefix_1_mcv_3", |b| {
        b.iter(|| {
            let mut builder = BucketBuilder::new(1, 3);
            builder.new_bucket();
            for key in &keys {
                builder.add(black_box(key));
            }
            builder.finalize(Hash::default())
        })
    });

    group.finish();
}

/// Benchmark diffing two map versions that differ in a few keys
fn bench_diff_maps(c: &mut Criterion) {
    let store = Arc::new(MemoryNodeStore::new());
    let key = |i: i64| Tuple::new(vec![Value::Int(i)]);
    let before = ProllyMap::from_entries(store, ChunkConfig::default(), (0..20_000).map(|i| (key(i), key(i * 2)))).unwrap();
    let after = before.edit((0..20_000).step_by(1000).map(|i| (key(i), Some(key(-i))))).unwrap();

    c.bench_function("diff_maps_20k_sparse", |b| b.iter(|| diff_maps(Some(black_box(&before)), Some(black_box(&after))).unwrap()));
}

/// Benchmark turning a 1000-row insert into binlog events
fn bench_binlog_insert(c: &mut Criterion) {
    let schema = Schema::new(vec![Column::new("pk", ColumnType::BigInt).primary_key(), Column::new("name", ColumnType::Varchar(64)), Column::new("score", ColumnType::Double)], vec![]).unwrap();
    let empty = RootValue::empty(Arc::new(MemoryNodeStore::new()), ChunkConfig::default());
    let before = empty.create_table(TableName::new("t"), schema).unwrap();
    let table = before.get_table(&TableName::new("t")).unwrap();
    let edits = (0..1000).map(|i| RowEdit::Insert(Tuple::new(vec![Value::Int(i), Value::Text(format!("row-{i}")), Value::Float(i as f64 / 3.0)]))).collect();
    let after = before.put_table(TableName::new("t"), table.apply(edits).unwrap());

    let config = BinlogConfig::default();
    let sink = Arc::new(CollectingSink::new());
    let producer = BinlogProducer::new(
        config.branch.clone(),
        Arc::new(SystemVariables::from_config(&config)),
        Arc::new(KvPositionStore::new(Arc::new(MemoryKv::new()))),
        sink.clone(),
    )
    .unwrap();

    let mut group = c.benchmark_group("binlog_producer");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("insert_1000_rows", |b| {
        b.iter(|| {
            producer.process_root_update("db", "main", black_box(&before), black_box(&after)).unwrap();
            sink.take()
        })
    });
    group.finish();
}

criterion_group!(core_benches, bench_bucket_builder, bench_diff_maps, bench_binlog_insert);

criterion_main!(core_benches);
