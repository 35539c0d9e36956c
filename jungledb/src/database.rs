//! The top-level facade: owns a set of `ObjectStore`s and the database's
//! version/connection lifecycle (spec.md §3, §6). Schema operations
//! (`create_object_store`/`delete_object_store`) are only permitted while
//! disconnected; `connect`/`close`/`destroy` are the suspension points §5
//! names for this layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::in_memory::InMemoryBackend;
use crate::combined_transaction::CombinedTransaction;
use crate::error::{CResult, Error};
use crate::object_store::{ObjectStore, ObjectStoreOptions, UpgradeCondition};
use crate::transaction::Transaction;
use crate::value::Value;

pub struct JungleDB<V: Value> {
    name: String,
    version: u32,
    stored_version: Mutex<u32>,
    connected: Mutex<bool>,
    stores: Mutex<HashMap<String, Arc<ObjectStore<V>>>>,
}

impl<V: Value> JungleDB<V> {
    pub fn new(name: impl Into<String>, version: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            version,
            stored_version: Mutex::new(0),
            connected: Mutex::new(false),
            stores: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    fn require_disconnected(&self) -> CResult<()> {
        if *self.connected.lock().unwrap() {
            return Err(Error::Schema("structural operation attempted while connected".into()));
        }
        Ok(())
    }

    /// Declares a store. If it already exists from a prior `connect`, the
    /// store's own `upgrade_condition` decides whether this call's structural
    /// intent (re-declaring it) applies on this version bump, per spec.md §6;
    /// otherwise the existing store is handed back untouched.
    pub fn create_object_store(self: &Arc<Self>, name: impl Into<String>, options: ObjectStoreOptions) -> CResult<Arc<ObjectStore<V>>> {
        self.require_disconnected()?;
        let name = name.into();
        let mut stores = self.stores.lock().unwrap();
        if let Some(existing) = stores.get(&name) {
            let stored_version = *self.stored_version.lock().unwrap();
            if !options.upgrade_condition.applies(stored_version, self.version) {
                return Ok(Arc::clone(existing));
            }
        }
        let store = ObjectStore::new(name.clone(), Box::new(InMemoryBackend::new()), options);
        stores.insert(name, Arc::clone(&store));
        Ok(store)
    }

    /// Drops a store, subject to `upgrade_condition` the same way
    /// `create_object_store` is: a missing store is a silent no-op, one that
    /// doesn't clear its upgrade condition on this version bump is kept.
    pub fn delete_object_store(&self, name: &str, upgrade_condition: UpgradeCondition) -> CResult<()> {
        self.require_disconnected()?;
        let mut stores = self.stores.lock().unwrap();
        if !stores.contains_key(name) {
            return Ok(());
        }
        let stored_version = *self.stored_version.lock().unwrap();
        if upgrade_condition.applies(stored_version, self.version) {
            stores.remove(name);
        }
        Ok(())
    }

    pub fn object_store(&self, name: &str) -> Option<Arc<ObjectStore<V>>> {
        self.stores.lock().unwrap().get(name).cloned()
    }

    /// Opens the database: declared stores become usable, and the stored
    /// schema version advances to the version this instance was constructed
    /// with, so a later `create_object_store`/`delete_object_store` against
    /// the same instance correctly sees "no bump pending".
    pub async fn connect(&self) -> CResult<()> {
        let mut connected = self.connected.lock().unwrap();
        if *connected {
            return Err(Error::Usage(format!("database {:?} is already connected", self.name)));
        }
        log::info!("jungledb {:?} connecting at version {}", self.name, self.version);
        *connected = true;
        *self.stored_version.lock().unwrap() = self.version;
        Ok(())
    }

    pub async fn close(&self) -> CResult<()> {
        *self.connected.lock().unwrap() = false;
        log::info!("jungledb {:?} closed", self.name);
        Ok(())
    }

    /// Closes the database and drops every store it owns.
    pub async fn destroy(&self) -> CResult<()> {
        self.close().await?;
        self.stores.lock().unwrap().clear();
        log::info!("jungledb {:?} destroyed", self.name);
        Ok(())
    }

    /// A volatile store not registered with any `JungleDB` instance,
    /// matching spec.md §6's `static createVolatileObjectStore`.
    pub fn create_volatile_object_store(name: impl Into<String>) -> Arc<ObjectStore<V>> {
        ObjectStore::volatile(name)
    }

    /// Atomically commits leaf transactions from distinct stores, matching
    /// spec.md §6's `static commitCombined`.
    pub async fn commit_combined(legs: Vec<(Arc<ObjectStore<V>>, Arc<Transaction<V>>)>) -> CResult<()> {
        CombinedTransaction::new(legs)?.commit().await
    }
}
