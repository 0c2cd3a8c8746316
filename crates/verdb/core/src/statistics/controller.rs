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

//! Statistics controller
//!
//! Owns the background worker that refreshes histograms for every index of
//! every table on every branch. Each pass builds a complete [`RootStats`]
//! generation off to the side and publishes it with a compare-and-swap on
//! the generation counter, so readers only ever see whole generations and
//! two overlapping passes can never both publish.
//!
//! Tables whose content hash matches the previous generation are carried
//! forward without recomputation. Buckets are cached by node address, so a
//! changed table only rebuilds buckets for the nodes that actually changed.
//!
//! A garbage collection pass collects into a fresh cache instead of the live
//! one. Only entries reachable from the new generation are marked into it,
//! and it replaces the live cache when the pass publishes.

use super::bucket::{BucketBuilder, StatBucket};
use super::cache::{MemStats, StatsCache};
use super::cancel::CancellationToken;
use super::config::StatsConfig;
use super::histogram::{Statistic, finalize_histogram};
use super::lib::{StatsError, StatsResult};
use super::persist::StatsStore;
use super::rate_limit::RateLimiter;
use super::template::{TemplateKey, build_template};
use crate::catalog::{CatalogError, DatabaseProvider, IndexDef, IndexKind, RootValue, TableName, VersionedTable};
use crate::storage::{Hash, HashDigest, KvStore, Node, ProllyMap, Tuple, generate_timestamp};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Identifies one table on one branch; all parts are lower-cased
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableIndexesKey {
    pub db: String,
    pub branch: String,
    pub schema: String,
    pub table: String,
}

impl TableIndexesKey {
    pub fn new(db: &str, branch: &str, schema: &str, table: &str) -> Self {
        Self { db: db.to_lowercase(), branch: branch.to_lowercase(), schema: schema.to_lowercase(), table: table.to_lowercase() }
    }
}

impl fmt::Display for TableIndexesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schema.is_empty() {
            write!(f, "{}/{}/{}", self.db, self.branch, self.table)
        } else {
            write!(f, "{}/{}/{}.{}", self.db, self.branch, self.schema, self.table)
        }
    }
}

/// One published generation of statistics
#[derive(Debug, Clone, Default)]
pub struct RootStats {
    pub stats: HashMap<TableIndexesKey, Vec<Arc<Statistic>>>,
    pub hashes: HashMap<TableIndexesKey, Hash>,
    pub db_count: usize,
    pub tables_processed: usize,
    pub tables_skipped: usize,
    pub bucket_writes: usize,
    /// Digest over every visited database, branch and root hash
    pub hash: Hash,
}

#[derive(Serialize)]
struct Summary {
    #[serde(rename = "dbCnt")]
    db_count: usize,
    #[serde(rename = "bucketWrites")]
    bucket_writes: usize,
    #[serde(rename = "tablesProcessed")]
    tables_processed: usize,
    #[serde(rename = "tablesSkipped")]
    tables_skipped: usize,
}

impl fmt::Display for RootStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = Summary {
            db_count: self.db_count,
            bucket_writes: self.bucket_writes,
            tables_processed: self.tables_processed,
            tables_skipped: self.tables_skipped,
        };
        let json = serde_json::to_string(&summary).map_err(|_| fmt::Error)?;
        write!(f, "{}", json)
    }
}

/// Snapshot returned by [`StatsController::info`]
#[derive(Debug, Clone, Serialize)]
pub struct StatsInfo {
    pub enabled: bool,
    pub active: bool,
    pub memory_only: bool,
    pub generation: u64,
    pub gc_count: u64,
    pub gc_pending: bool,
    pub db_count: usize,
    pub tables_processed: usize,
    pub tables_skipped: usize,
    pub bucket_writes: usize,
    pub cached_buckets: usize,
    pub cached_templates: usize,
    pub cached_bounds: usize,
    pub last_error: Option<String>,
    pub last_error_at: Option<u64>,
}

#[derive(Debug, Clone)]
struct LastError {
    message: String,
    at: u64,
}

struct ControllerState {
    stats: Arc<RootStats>,
    kv: Arc<MemStats>,
    do_gc: bool,
    gc_count: u64,
    active_gc: Option<Arc<MemStats>>,
    last_error: Option<LastError>,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Background statistics collection
pub struct StatsController {
    provider: Arc<DatabaseProvider>,
    config: RwLock<StatsConfig>,
    gen_cnt: AtomicU64,
    state: Mutex<ControllerState>,
    store: Option<StatsStore>,
    rate_limiter: RateLimiter,
    published: watch::Sender<u64>,
    trigger: Notify,
    worker: Mutex<Option<Worker>>,
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl StatsController {
    /// Create a controller over `provider`
    ///
    /// When `kv` is given and the config is not memory-only, previously
    /// flushed statistics are loaded from it and new ones are flushed to it.
    pub fn new(provider: Arc<DatabaseProvider>, config: StatsConfig, kv: Option<Arc<dyn KvStore>>) -> StatsResult<Arc<Self>> {
        let cache = Arc::new(MemStats::new());
        let store = match kv {
            Some(kv) if !config.memory_only => {
                let store = StatsStore::new(kv);
                let loaded = store.load(&cache)?;
                debug!(entries = loaded, "loaded persisted statistics");
                Some(store)
            }
            _ => None,
        };
        let (published, _) = watch::channel(0);
        Ok(Arc::new(Self {
            provider,
            rate_limiter: RateLimiter::new(config.rate_limit),
            config: RwLock::new(config),
            gen_cnt: AtomicU64::new(0),
            state: Mutex::new(ControllerState {
                stats: Arc::new(RootStats::default()),
                kv: cache,
                do_gc: false,
                gc_count: 0,
                active_gc: None,
                last_error: None,
            }),
            store,
            published,
            trigger: Notify::new(),
            worker: Mutex::new(None),
        }))
    }

    pub fn generation(&self) -> u64 {
        self.gen_cnt.load(Ordering::SeqCst)
    }

    /// The most recently published generation
    pub fn current_stats(&self) -> Arc<RootStats> {
        self.state.lock().stats.clone()
    }

    /// Histograms for one table in the default schema
    pub fn stats_for_table(&self, db: &str, branch: &str, table: &str) -> Vec<Arc<Statistic>> {
        let key = TableIndexesKey::new(db, branch, "", table);
        self.current_stats().stats.get(&key).cloned().unwrap_or_default()
    }

    /// Published statistics for `key` if they were built from content `hash`
    pub fn preexisting_stats(&self, key: &TableIndexesKey, hash: &Hash) -> Option<Vec<Arc<Statistic>>> {
        let state = self.state.lock();
        match state.stats.hashes.get(key) {
            Some(h) if h == hash => state.stats.stats.get(key).cloned(),
            _ => None,
        }
    }

    fn kv(&self) -> Arc<MemStats> {
        self.state.lock().kv.clone()
    }

    /// Record an error for the info procedure and log it
    fn describe_error(&self, context: &str, err: &StatsError) {
        let message = if context.is_empty() { err.to_string() } else { format!("{}: {}", context, err) };
        warn!(error = %message, "stats error");
        self.state.lock().last_error = Some(LastError { message, at: generate_timestamp() });
    }

    /// Run one full pass immediately, bypassing the rate limiter
    ///
    /// Returns the summary of the published generation, or an empty string
    /// when a concurrent pass published first.
    pub async fn collect_once(&self) -> StatsResult<String> {
        let gen_start = self.gen_cnt.load(Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let new_stats = Arc::new(self.collect_pass(None, true, &cancel).await?);
        if self.try_swap_stats(gen_start, Some(new_stats.clone()), None, &cancel).await? {
            Ok(new_stats.to_string())
        } else {
            Ok(String::new())
        }
    }

    /// One pass wrapped in the failure boundary
    ///
    /// Panics inside the pass are converted to [`StatsError::Panicked`].
    pub(crate) async fn collect_pass(&self, gc_kv: Option<Arc<MemStats>>, bypass_rate_limit: bool, cancel: &CancellationToken) -> StatsResult<RootStats> {
        let result = AssertUnwindSafe(self.new_stats_for_root(gc_kv, bypass_rate_limit, cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(StatsError::Panicked(panic_message(panic.as_ref()))));
        if let Err(e) = &result {
            if !matches!(e, StatsError::Cancelled) {
                self.describe_error("stats update interrupted", e);
            }
        }
        result
    }

    async fn exec<T, F>(&self, bypass_rate_limit: bool, cancel: &CancellationToken, f: F) -> StatsResult<T>
    where
        F: FnOnce() -> StatsResult<T>,
    {
        if bypass_rate_limit {
            return f();
        }
        self.rate_limiter.execute(cancel, f).await
    }

    async fn new_stats_for_root(&self, gc_kv: Option<Arc<MemStats>>, bypass_rate_limit: bool, cancel: &CancellationToken) -> StatsResult<RootStats> {
        let config = self.config.read().clone();
        let mut new_stats = RootStats::default();
        let mut digest = HashDigest::new();

        let mut to_visit: Vec<(String, String, RootValue)> = Vec::new();
        self.exec(bypass_rate_limit, cancel, || {
            for db in self.provider.databases() {
                for branch in db.branches() {
                    let root = match db.working_root(&branch) {
                        Ok(root) => root,
                        Err(e) => {
                            self.describe_error("working root", &StatsError::Catalog(e));
                            continue;
                        }
                    };
                    digest.write(db.name().as_bytes());
                    digest.write(branch.as_bytes());
                    digest.write_hash(&root.hash()?);
                    to_visit.push((db.name().to_string(), branch, root));
                }
            }
            Ok(())
        })
        .await?;

        for (db, branch, root) in &to_visit {
            for schema in root.schema_names() {
                if config.is_skipped_schema(&schema) {
                    continue;
                }
                new_stats.db_count += 1;
                for name in root.table_names(&schema) {
                    if cancel.is_cancelled() {
                        return Err(StatsError::Cancelled);
                    }
                    match self.update_table(&config, &mut new_stats, db, branch, root, &name, gc_kv.as_ref(), bypass_rate_limit, cancel).await {
                        Ok(()) => {}
                        Err(e @ (StatsError::Cancelled | StatsError::TemplateFailed(_) | StatsError::GcInterrupted | StatsError::Panicked(_))) => return Err(e),
                        Err(e) => self.describe_error(&format!("update table {}/{}/{}", db, branch, name), &e),
                    }
                }
            }
        }

        new_stats.hash = digest.finish();
        Ok(new_stats)
    }

    #[allow(clippy::too_many_arguments)]
    async fn update_table(
        &self,
        config: &StatsConfig,
        new_stats: &mut RootStats,
        db: &str,
        branch: &str,
        root: &RootValue,
        name: &TableName,
        gc_kv: Option<&Arc<MemStats>>,
        bypass_rate_limit: bool,
        cancel: &CancellationToken,
    ) -> StatsResult<()> {
        let handle: Arc<dyn VersionedTable> = self.exec(bypass_rate_limit, cancel, || root.get_table(name).map(|t| t as Arc<dyn VersionedTable>).ok_or_else(|| StatsError::Catalog(CatalogError::TableNotFound(name.to_string())))).await?;
        let table = handle.versioned_table();

        let key = TableIndexesKey::new(db, branch, &name.schema, &name.name);
        let table_hash = table.hash_of()?;
        if gc_kv.is_none() {
            if let Some(stats) = self.preexisting_stats(&key, &table_hash) {
                trace!(table = %key, "table unchanged, reusing statistics");
                new_stats.stats.insert(key.clone(), stats);
                new_stats.hashes.insert(key, table_hash);
                new_stats.tables_skipped += 1;
                return Ok(());
            }
        }

        let mut table_stats = Vec::new();
        for idx in table.schema().all_indexes() {
            if idx.kind != IndexKind::Btree || idx.generated {
                continue;
            }
            let Some(map) = table.index_data(&idx.name) else {
                warn!(table = %key, index = %idx.name, "index has no data");
                continue;
            };

            let (template_key, mut template) = self.exec(bypass_rate_limit, cancel, || self.get_template(table, &idx)).await?;
            if template.fds.is_empty() {
                return Err(StatsError::TemplateFailed(format!("failed to create template for {}/{}/{}/{}", branch, db, name, idx.name)));
            }
            template.qual.database = db.to_string();

            let prefix_len = idx.columns.len();
            let level_nodes = self.exec(bypass_rate_limit, cancel, || Ok(map.histogram_level(config.bucket_low_count)?)).await?;

            let mut buckets = Vec::new();
            let mut first_bound = None;
            if !level_nodes.is_empty() {
                match self.collect_index_nodes(config, map, prefix_len, &level_nodes, bypass_rate_limit, cancel).await {
                    Ok((b, bound, writes)) => {
                        buckets = b;
                        first_bound = Some(bound);
                        new_stats.bucket_writes += writes;
                    }
                    Err(StatsError::Cancelled) => return Err(StatsError::Cancelled),
                    Err(e) => {
                        self.describe_error(&format!("collect {}/{}", key, idx.name), &e);
                        continue;
                    }
                }
            }

            table_stats.push(Arc::new(finalize_histogram(&template, buckets.clone(), first_bound)));

            if let Some(gc) = gc_kv {
                let live = self.kv();
                if !gc.gc_mark(live.as_ref(), &level_nodes, &buckets, prefix_len) {
                    return Err(StatsError::GcInterrupted);
                }
                gc.put_template(template_key, template);
            }
        }

        new_stats.stats.insert(key.clone(), table_stats);
        new_stats.hashes.insert(key, table_hash);
        new_stats.tables_processed += 1;
        Ok(())
    }

    /// Cached template for `idx`, building and caching it on first use
    fn get_template(&self, table: &crate::catalog::Table, idx: &IndexDef) -> StatsResult<(TemplateKey, Statistic)> {
        let key = TemplateKey { schema_hash: table.schema().hash()?, index: idx.name.clone() };
        let kv = self.kv();
        if let Some(template) = kv.get_template(&key) {
            return Ok((key, template));
        }
        let template = build_template(table.name(), table.schema(), idx)?;
        kv.put_template(key.clone(), template.clone());
        Ok((key, template))
    }

    /// Buckets for every node of a histogram level, building missing ones
    ///
    /// Returns the buckets in node order, the index lower bound and how many
    /// buckets had to be built.
    async fn collect_index_nodes(
        &self,
        config: &StatsConfig,
        map: &ProllyMap,
        prefix_len: usize,
        nodes: &[Arc<Node>],
        bypass_rate_limit: bool,
        cancel: &CancellationToken,
    ) -> StatsResult<(Vec<Arc<StatBucket>>, Tuple, usize)> {
        let kv = self.kv();
        let first = nodes[0].hash_of();
        let lower_bound = match kv.get_bound(&first, prefix_len) {
            Some(bound) => bound,
            None => {
                self.exec(bypass_rate_limit, cancel, || {
                    let bound = map.first_key()?.map(|k| k.prefix(prefix_len)).unwrap_or_default();
                    trace!(node = %first.short(), bound = %bound, "put bound");
                    kv.put_bound(first, prefix_len, bound.clone());
                    Ok(bound)
                })
                .await?
            }
        };

        let mut builder = BucketBuilder::new(prefix_len, config.mcv_capacity);
        let batch = config.collect_batch_size.max(1);
        let mut writes = 0;
        let mut offset = 0u64;
        let mut i = 0;
        while i < nodes.len() {
            self.exec(bypass_rate_limit, cancel, || {
                let mut new_writes = 0;
                while i < nodes.len() && new_writes < batch {
                    let node = &nodes[i];
                    i += 1;
                    let (start, stop) = (offset, offset + node.tree_count());
                    offset = stop;

                    if kv.get_bucket(&node.hash_of()).is_some() {
                        continue;
                    }
                    writes += 1;
                    new_writes += 1;

                    builder.new_bucket();
                    for (key, _) in map.iter_ordinal_range(start, stop)? {
                        builder.add(&key);
                    }
                    kv.put_bucket(node.hash_of(), Arc::new(builder.finalize(node.hash_of())));
                }
                Ok(())
            })
            .await?;
        }

        let mut buckets = Vec::with_capacity(nodes.len());
        for node in nodes {
            let bucket = kv.get_bucket(&node.hash_of()).ok_or(StatsError::MissingBucket(node.hash_of()))?;
            buckets.push(bucket);
        }
        Ok((buckets, lower_bound, writes))
    }

    /// Publish `new_stats` if no other pass published since `prev_gen`
    ///
    /// Returns false, without error, when another pass won. With `gc_kv` the
    /// collected cache replaces the live one, provided it was started for
    /// exactly `prev_gen`. Storage rotation and flushing run after the lock
    /// is released.
    pub(crate) async fn try_swap_stats(&self, prev_gen: u64, new_stats: Option<Arc<RootStats>>, gc_kv: Option<Arc<MemStats>>, cancel: &CancellationToken) -> StatsResult<bool> {
        let new_stats = new_stats.ok_or(StatsError::NilStats)?;
        let (kv, rotated) = {
            let mut state = self.state.lock();
            if cancel.is_cancelled() {
                return Err(StatsError::Cancelled);
            }
            if self.gen_cnt.compare_exchange(prev_gen, prev_gen + 1, Ordering::SeqCst, Ordering::SeqCst).is_err() {
                return Ok(false);
            }
            state.stats = new_stats;
            let mut rotated = None;
            if let Some(gc) = gc_kv {
                state.active_gc = None;
                if gc.gc_gen() != Some(prev_gen) {
                    return Err(StatsError::GcGenerationMismatch { expected: prev_gen, found: gc.gc_gen().unwrap_or_default() });
                }
                state.do_gc = false;
                state.gc_count += 1;
                state.kv = gc.clone();
                rotated = Some(gc);
            }
            (state.kv.clone(), rotated)
        };

        if let Some(store) = &self.store {
            if let Some(gc) = rotated {
                if let Err(e) = self.rate_limiter.execute(cancel, || store.rotate(&gc)).await {
                    self.describe_error("rotate storage", &e);
                }
            }
            if let Err(e) = store.flush(&kv) {
                self.describe_error("flush", &e);
            }
        }
        self.published.send_replace(prev_gen + 1);
        Ok(true)
    }

    async fn run_worker(self: Arc<Self>, cancel: CancellationToken) {
        let gc_interval = self.config.read().gc_interval;
        let mut gc_ticker = tokio::time::interval_at(tokio::time::Instant::now() + gc_interval, gc_interval);
        gc_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("stats worker started");

        loop {
            if cancel.is_cancelled() {
                info!(reason = ?cancel.cancellation_reason(), "stats worker stopped");
                return;
            }

            let gen_start = self.gen_cnt.load(Ordering::SeqCst);
            let gc_enabled = self.config.read().gc_enabled;
            if gc_ticker.tick().now_or_never().is_some() && gc_enabled {
                self.state.lock().do_gc = true;
            }

            let gc_kv = {
                let mut state = self.state.lock();
                if state.do_gc {
                    let gc = Arc::new(MemStats::for_gc(gen_start));
                    state.active_gc = Some(gc.clone());
                    Some(gc)
                } else {
                    None
                }
            };

            match self.collect_pass(gc_kv.clone(), false, &cancel).await {
                Err(StatsError::Cancelled) => continue,
                Err(_) => {
                    self.state.lock().active_gc = None;
                }
                Ok(new_stats) => match self.try_swap_stats(gen_start, Some(Arc::new(new_stats)), gc_kv, &cancel).await {
                    Ok(true) => trace!(generation = gen_start + 1, summary = %self.current_stats(), "stats successful swap"),
                    Ok(false) => trace!(generation = gen_start, "stats swap lost to a concurrent pass"),
                    Err(StatsError::Cancelled) => continue,
                    Err(e) => self.describe_error("failed to swap stats", &e),
                },
            }

            let job_interval = self.config.read().job_interval;
            tokio::select! {
                _ = tokio::time::sleep(job_interval) => {}
                _ = self.trigger.notified() => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    /// Start (or restart) the background worker on the current tokio runtime
    pub fn restart(self: &Arc<Self>) {
        self.stop();
        if !self.config.read().enabled {
            info!("statistics disabled, worker not started");
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.clone().run_worker(cancel.clone()));
        *self.worker.lock() = Some(Worker { cancel, handle });
    }

    /// Stop the background worker; returns whether one was running
    pub fn stop(&self) -> bool {
        let Some(worker) = self.worker.lock().take() else {
            return false;
        };
        worker.cancel.cancel(Some("stopped"));
        if let Some(gc) = self.state.lock().active_gc.take() {
            gc.interrupt_gc();
        }
        drop(worker.handle);
        true
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(|w| !w.handle.is_finished())
    }

    pub fn info(&self) -> StatsInfo {
        let enabled = self.config.read().enabled;
        let active = self.is_running();
        let memory_only = self.store.is_none();
        let generation = self.generation();
        let state = self.state.lock();
        StatsInfo {
            enabled,
            active,
            memory_only,
            generation,
            gc_count: state.gc_count,
            gc_pending: state.do_gc,
            db_count: state.stats.db_count,
            tables_processed: state.stats.tables_processed,
            tables_skipped: state.stats.tables_skipped,
            bucket_writes: state.stats.bucket_writes,
            cached_buckets: state.kv.bucket_count(),
            cached_templates: state.kv.template_count(),
            cached_bounds: state.kv.bound_count(),
            last_error: state.last_error.as_ref().map(|e| e.message.clone()),
            last_error_at: state.last_error.as_ref().map(|e| e.at),
        }
    }

    /// [`StatsController::info`] rendered as JSON
    pub fn info_json(&self) -> StatsResult<String> {
        serde_json::to_string(&self.info()).map_err(|e| StatsError::Storage(crate::storage::StorageError::Serialization(e.to_string())))
    }

    /// Drop all cached, published and persisted statistics
    ///
    /// Bumps the generation so an in-flight pass cannot publish data
    /// collected before the purge.
    pub fn purge(&self) -> StatsResult<()> {
        {
            let mut state = self.state.lock();
            self.gen_cnt.fetch_add(1, Ordering::SeqCst);
            state.stats = Arc::new(RootStats::default());
            state.kv = Arc::new(MemStats::new());
            if let Some(gc) = state.active_gc.take() {
                gc.interrupt_gc();
            }
        }
        if let Some(store) = &self.store {
            store.purge()?;
        }
        info!("statistics purged");
        Ok(())
    }

    /// Block until the worker publishes its next generation
    pub async fn wait(&self) -> StatsResult<()> {
        if !self.is_running() {
            return Err(StatsError::WorkerNotRunning);
        }
        let mut rx = self.published.subscribe();
        rx.borrow_and_update();
        rx.changed().await.map_err(|_| StatsError::WorkerNotRunning)
    }

    /// Flush cached entries to durable storage; returns how many were written
    pub fn flush(&self) -> StatsResult<usize> {
        match &self.store {
            Some(store) => store.flush(&self.kv()),
            None => Ok(0),
        }
    }

    /// Request a garbage collection pass and wait for it to publish
    pub async fn gc(&self) -> StatsResult<()> {
        if !self.is_running() {
            return Err(StatsError::WorkerNotRunning);
        }
        let mut rx = self.published.subscribe();
        let target = {
            let mut state = self.state.lock();
            state.do_gc = true;
            state.gc_count + 1
        };
        self.trigger.notify_one();
        loop {
            if self.state.lock().gc_count >= target {
                return Ok(());
            }
            if !self.is_running() {
                return Err(StatsError::WorkerNotRunning);
            }
            tokio::select! {
                changed = rx.changed() => changed.map_err(|_| StatsError::WorkerNotRunning)?,
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
        }
    }

    /// Change the job and GC intervals; takes effect on the next worker restart for GC
    pub fn timers(&self, job_interval: Duration, gc_interval: Duration) {
        let mut config = self.config.write();
        config.job_interval = job_interval;
        config.gc_interval = gc_interval;
        drop(config);
        self.trigger.notify_one();
    }
}

impl Drop for StatsController {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel(Some("controller dropped"));
        }
    }
}
