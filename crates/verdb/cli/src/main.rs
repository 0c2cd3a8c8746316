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

//! VerDB CLI Tool
//!
//! Runs the statistics worker and the binlog producer over JSON snapshots.

mod fixture;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use fixture::DatabaseFixture;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use verdb_core::VerdbConfig;
use verdb_core::binlog::{BinlogEvent, BinlogProducer, CollectingSink, KvPositionStore, SystemVariables};
use verdb_core::catalog::{DEFAULT_BRANCH, DatabaseProvider, RootValue};
use verdb_core::statistics::StatsController;
use verdb_core::storage::{ChunkConfig, MemoryKv, MemoryNodeStore, NodeStore};

#[derive(Parser)]
#[command(name = "verdb")]
#[command(about = "VerDB - statistics and binlog tooling")]
#[command(version = "0.1.0")]
struct Cli {
    /// JSON configuration file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect statistics for a snapshot and print its histograms
    Stats {
        /// Database fixture
        fixture: PathBuf,
    },
    /// Print the binlog events replicating one snapshot into another
    Binlog {
        /// Fixture before the change
        before: PathBuf,
        /// Fixture after the change
        after: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Stats { fixture } => handle_stats(&config, &fixture).await,
        Commands::Binlog { before, after } => handle_binlog(&config, &before, &after),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<VerdbConfig> {
    let Some(path) = path else {
        return Ok(VerdbConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(VerdbConfig::from_json(&text)?)
}

async fn handle_stats(config: &VerdbConfig, path: &Path) -> Result<()> {
    let fixture = DatabaseFixture::load(path)?;
    let provider = Arc::new(DatabaseProvider::default());
    provider.create_database(&fixture.database)?;
    let root = fixture.build(provider.empty_root())?;
    provider.commit(&fixture.database, DEFAULT_BRANCH, root)?;

    // one-off run, nothing to persist between invocations
    let stats_config = verdb_core::statistics::StatsConfig { memory_only: true, ..config.stats.clone() };
    let controller = StatsController::new(provider, stats_config, None)?;
    let summary = controller.collect_once().await?;
    println!("{summary}");

    for table in &fixture.tables {
        for stat in controller.stats_for_table(&fixture.database, DEFAULT_BRANCH, &table.name) {
            println!(
                "{}.{} ({}): rows={} distinct={} nulls={} buckets={}",
                table.name,
                stat.qual.index,
                stat.columns.join(","),
                stat.row_count,
                stat.distinct_count,
                stat.null_count,
                stat.buckets.len()
            );
            for bucket in &stat.buckets {
                println!("  <= {} rows={} distinct={} nulls={} bound_count={}", bucket.upper_bound, bucket.row_count, bucket.distinct_count, bucket.null_count, bucket.bound_count);
            }
        }
    }
    info!("Collected statistics for {}", fixture.database);
    Ok(())
}

fn handle_binlog(config: &VerdbConfig, before_path: &Path, after_path: &Path) -> Result<()> {
    if !config.binlog.enabled {
        bail!("binlog production is disabled in the configuration");
    }
    let before = DatabaseFixture::load(before_path)?;
    let after = DatabaseFixture::load(after_path)?;
    if before.database != after.database {
        bail!("fixtures describe different databases: {} and {}", before.database, after.database);
    }

    let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::new());
    let empty = RootValue::empty(store, ChunkConfig::default());
    let before_root = before.build(empty.clone())?;
    let after_root = after.build(empty)?;

    let system = Arc::new(SystemVariables::from_config(&config.binlog));
    let sink = Arc::new(CollectingSink::new());
    let positions = Arc::new(KvPositionStore::new(Arc::new(MemoryKv::new())));
    let producer = BinlogProducer::new(config.binlog.branch.clone(), system, positions, sink.clone())?;

    for event in producer.preamble(&config.binlog.binlog_filename()) {
        print_event(&event)?;
    }
    producer.process_root_update(&after.database, &config.binlog.branch, &before_root, &after_root)?;
    let events = sink.take();
    for event in &events {
        print_event(event)?;
    }
    info!("Produced {} binlog events for {}", events.len(), after.database);
    Ok(())
}

fn print_event(event: &BinlogEvent) -> Result<()> {
    let header = event.header()?;
    let kind = event.event_type().map(|t| t.to_string()).unwrap_or_else(|| format!("type {}", header.event_type));
    println!("{:<12} len={:<5} next={:<7} {}", kind, header.event_length, header.next_position, hex::encode(event.bytes()));
    Ok(())
}
