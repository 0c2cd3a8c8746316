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

//! Databases, branches and commit notifications

use super::lib::{CatalogError, CatalogResult, ListenerResult};
use super::root::RootValue;
use crate::storage::{ChunkConfig, MemoryNodeStore, NodeStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Branch every new database starts with
pub const DEFAULT_BRANCH: &str = "main";

/// Receives notifications about database changes
///
/// Listeners are invoked synchronously on the committing thread, after the
/// new state has been installed.
pub trait DatabaseUpdateListener: Send + Sync {
    /// The working root of `database`/`branch` changed from `before` to `after`
    fn working_root_updated(&self, database: &str, branch: &str, before: &RootValue, after: &RootValue) -> ListenerResult;

    fn database_created(&self, database: &str) -> ListenerResult;

    fn database_dropped(&self, database: &str) -> ListenerResult;
}

/// A database with named branches, each holding a working root
pub struct VersionedDatabase {
    name: String,
    branches: RwLock<BTreeMap<String, RootValue>>,
}

impl VersionedDatabase {
    fn new(name: String, root: RootValue) -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(DEFAULT_BRANCH.to_string(), root);
        Self { name, branches: RwLock::new(branches) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn branches(&self) -> Vec<String> {
        self.branches.read().keys().cloned().collect()
    }

    pub fn working_root(&self, branch: &str) -> CatalogResult<RootValue> {
        self.branches.read().get(branch).cloned().ok_or_else(|| CatalogError::BranchNotFound { database: self.name.clone(), branch: branch.to_string() })
    }

    /// Create `branch` pointing at the current root of `from`
    pub fn create_branch(&self, branch: &str, from: &str) -> CatalogResult<()> {
        let root = self.working_root(from)?;
        self.branches.write().insert(branch.to_string(), root);
        Ok(())
    }

    fn swap_root(&self, branch: &str, root: RootValue) -> CatalogResult<RootValue> {
        let mut branches = self.branches.write();
        let slot = branches.get_mut(branch).ok_or_else(|| CatalogError::BranchNotFound { database: self.name.clone(), branch: branch.to_string() })?;
        Ok(std::mem::replace(slot, root))
    }
}

/// Owns every database and the node store they share
pub struct DatabaseProvider {
    store: Arc<dyn NodeStore>,
    config: ChunkConfig,
    databases: RwLock<BTreeMap<String, Arc<VersionedDatabase>>>,
    listeners: RwLock<Vec<Arc<dyn DatabaseUpdateListener>>>,
}

impl Default for DatabaseProvider {
    fn default() -> Self {
        Self::new(Arc::new(MemoryNodeStore::new()), ChunkConfig::default())
    }
}

impl DatabaseProvider {
    pub fn new(store: Arc<dyn NodeStore>, config: ChunkConfig) -> Self {
        Self { store, config, databases: RwLock::new(BTreeMap::new()), listeners: RwLock::new(Vec::new()) }
    }

    pub fn node_store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn register_listener(&self, listener: Arc<dyn DatabaseUpdateListener>) {
        self.listeners.write().push(listener);
    }

    /// All databases ordered by name
    pub fn databases(&self) -> Vec<Arc<VersionedDatabase>> {
        self.databases.read().values().cloned().collect()
    }

    pub fn database(&self, name: &str) -> CatalogResult<Arc<VersionedDatabase>> {
        self.databases.read().get(&name.to_lowercase()).cloned().ok_or_else(|| CatalogError::DatabaseNotFound(name.to_string()))
    }

    /// An empty root sharing this provider's node store
    pub fn empty_root(&self) -> RootValue {
        RootValue::empty(self.store.clone(), self.config)
    }

    pub fn create_database(&self, name: &str) -> CatalogResult<Arc<VersionedDatabase>> {
        let db = {
            let mut dbs = self.databases.write();
            let key = name.to_lowercase();
            if dbs.contains_key(&key) {
                return Err(CatalogError::DatabaseExists(name.to_string()));
            }
            let db = Arc::new(VersionedDatabase::new(name.to_string(), self.empty_root()));
            dbs.insert(key, db.clone());
            db
        };
        debug!(database = name, "database created");
        self.notify(|l| l.database_created(name))?;
        Ok(db)
    }

    pub fn drop_database(&self, name: &str) -> CatalogResult<()> {
        self.databases.write().remove(&name.to_lowercase()).ok_or_else(|| CatalogError::DatabaseNotFound(name.to_string()))?;
        debug!(database = name, "database dropped");
        self.notify(|l| l.database_dropped(name))
    }

    /// Install `root` as the working root of `database`/`branch` and notify listeners
    pub fn commit(&self, database: &str, branch: &str, root: RootValue) -> CatalogResult<()> {
        let db = self.database(database)?;
        let before = db.swap_root(branch, root.clone())?;
        self.notify(|l| l.working_root_updated(db.name(), branch, &before, &root))
    }

    fn notify<F>(&self, f: F) -> CatalogResult<()>
    where
        F: Fn(&dyn DatabaseUpdateListener) -> ListenerResult,
    {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if let Err(e) = f(listener.as_ref()) {
                warn!(error = %e, "database update listener failed");
                return Err(CatalogError::Listener(e.to_string()));
            }
        }
        Ok(())
    }
}
