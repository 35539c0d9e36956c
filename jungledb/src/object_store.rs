//! User-facing façade over a backend: owns the stack of committed-but-
//! unflushed transactions, hands out new transactions parented at the
//! current chain head, and drives the flush-to-backend protocol once a
//! committed transaction has no unflushed ancestor left above it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::{Backend, CommitScope, PersistentBackend};
use crate::error::CResult;
use crate::index::in_memory_index::IndexDescriptor;
use crate::index::key_path::IndexKey;
use crate::index_handle::IndexHandle;
use crate::key_range::KeyRange;
use crate::query::PrimaryKey;
use crate::snapshot::Snapshot;
use crate::transaction::{Parent, Transaction, TxId};
use crate::value::Value;

/// Structural options accepted by `createObjectStore`. Codec selection is an
/// encoding-layer concern (spec.md §1, out of scope) and is not modeled here.
#[derive(Clone)]
pub struct ObjectStoreOptions {
    pub persistent: bool,
    pub upgrade_condition: UpgradeCondition,
    pub enable_lru_cache: bool,
    pub lru_cache_size: usize,
}

impl Default for ObjectStoreOptions {
    fn default() -> Self {
        Self { persistent: true, upgrade_condition: UpgradeCondition::Default, enable_lru_cache: false, lru_cache_size: 0 }
    }
}

/// `upgradeCondition`: `null | true | false | (oldVersion, newVersion) -> bool`.
#[derive(Clone)]
pub enum UpgradeCondition {
    /// Apply on any version bump.
    Default,
    Always,
    Never,
    Predicate(Arc<dyn Fn(u32, u32) -> bool + Send + Sync>),
}

impl UpgradeCondition {
    pub fn applies(&self, old_version: u32, new_version: u32) -> bool {
        match self {
            UpgradeCondition::Default => new_version > old_version,
            UpgradeCondition::Always => true,
            UpgradeCondition::Never => false,
            UpgradeCondition::Predicate(f) => f(old_version, new_version),
        }
    }
}

/// Wraps a boxed `PersistentBackend` behind a mutex so it can be shared as an
/// `Arc<dyn Backend<V>>` read parent for every transaction rooted on this
/// store, while still admitting the occasional `&mut self` flush/schema
/// call. Mirrors `InMemoryBackend`'s own `Mutex<Arc<BackendState>>` swap
/// shell, one level up, generalized to any pluggable backend.
struct SharedBackend<V: Value> {
    inner: Mutex<Box<dyn PersistentBackend<V>>>,
}

impl<V: Value> Backend<V> for SharedBackend<V> {
    fn get(&self, key: &PrimaryKey) -> Option<V> {
        self.inner.lock().unwrap().get(key)
    }

    fn key_stream(&self, ascending: bool, range: Option<&KeyRange<PrimaryKey>>, cb: &mut dyn FnMut(&PrimaryKey) -> bool) {
        self.inner.lock().unwrap().key_stream(ascending, range, cb)
    }

    fn index_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().index_names()
    }

    fn index_key_stream(
        &self,
        index: &str,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) -> CResult<()> {
        self.inner.lock().unwrap().index_key_stream(index, ascending, range, cb)
    }
}

impl<V: Value> SharedBackend<V> {
    fn apply_sync(&self, put: &[(PrimaryKey, V)], removed: &[PrimaryKey], truncated: bool) -> CResult<()> {
        self.inner.lock().unwrap().apply_sync(put, removed, truncated)
    }

    fn apply_combined(&self, scope: &CommitScope, put: &[(PrimaryKey, V)], removed: &[PrimaryKey], truncated: bool) -> CResult<()> {
        self.inner.lock().unwrap().apply_combined(scope, put, removed, truncated)
    }

    fn create_index(&self, descriptor: IndexDescriptor) -> CResult<()> {
        self.inner.lock().unwrap().create_index(descriptor)
    }

    fn delete_index(&self, name: &str) -> CResult<()> {
        self.inner.lock().unwrap().delete_index(name)
    }

    fn frozen_view(&self) -> Arc<dyn Backend<V>> {
        self.inner.lock().unwrap().frozen_view()
    }
}

pub struct ObjectStore<V: Value> {
    name: String,
    options: ObjectStoreOptions,
    backend: Arc<SharedBackend<V>>,
    index_descriptors: Mutex<Arc<HashMap<String, IndexDescriptor>>>,
    /// Commit slot shared by every transaction rooted directly on the
    /// backend (i.e. created while the committed stack was empty). Replaced
    /// with a fresh, unclaimed slot each time the chain fully drains: an
    /// old sibling that captured the previous generation must still see the
    /// backend as "already advanced" and conflict, while a transaction
    /// created after the drain gets to claim the new generation.
    root_slot: Mutex<Arc<Mutex<Option<TxId>>>>,
    /// Frozen, point-in-time view of the backend paired with the current
    /// generation of `root_slot`. A transaction rooted directly on the
    /// backend reads through this instead of the live backend, so later
    /// flushes (which mutate the live backend in place) never become visible
    /// to it — the fix that makes root-level snapshot isolation hold.
    root_view: Mutex<Arc<dyn Backend<V>>>,
    /// Committed-but-not-yet-flushed transactions, oldest first. Every entry
    /// here is `Committed`; draining applies them to the backend in order.
    committed_stack: Mutex<Vec<Arc<Transaction<V>>>>,
}

impl<V: Value> ObjectStore<V> {
    pub fn new(name: impl Into<String>, backend: Box<dyn PersistentBackend<V>>, options: ObjectStoreOptions) -> Arc<Self> {
        let backend = Arc::new(SharedBackend { inner: Mutex::new(backend) });
        let root_view = backend.frozen_view();
        Arc::new(Self {
            name: name.into(),
            options,
            backend,
            index_descriptors: Mutex::new(Arc::new(HashMap::new())),
            root_slot: Mutex::new(Arc::new(Mutex::new(None))),
            root_view: Mutex::new(root_view),
            committed_stack: Mutex::new(Vec::new()),
        })
    }

    /// A standalone volatile store, not backed by any durable medium.
    pub fn volatile(name: impl Into<String>) -> Arc<Self> {
        Self::new(name, Box::new(crate::backend::in_memory::InMemoryBackend::new()), ObjectStoreOptions { persistent: false, ..Default::default() })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ObjectStoreOptions {
        &self.options
    }

    /// Declares a secondary index, backfilling it on the backend if it
    /// already holds data. New transactions created after this call see it;
    /// transactions already open keep whatever index set they started with.
    pub fn create_index(&self, descriptor: IndexDescriptor) -> CResult<()> {
        self.backend.create_index(descriptor.clone())?;
        let mut guard = self.index_descriptors.lock().unwrap();
        let mut map = (**guard).clone();
        map.insert(descriptor.name.clone(), descriptor);
        *guard = Arc::new(map);
        Ok(())
    }

    pub fn delete_index(&self, name: &str) -> CResult<()> {
        self.backend.delete_index(name)?;
        let mut guard = self.index_descriptors.lock().unwrap();
        let mut map = (**guard).clone();
        map.remove(name);
        *guard = Arc::new(map);
        Ok(())
    }

    pub fn index_names(&self) -> Vec<String> {
        self.index_descriptors.lock().unwrap().keys().cloned().collect()
    }

    /// A new leaf transaction, parented on the current chain head: the
    /// newest committed-but-unflushed transaction if any, otherwise the
    /// backend itself.
    pub fn transaction(self: &Arc<Self>) -> Arc<Transaction<V>> {
        let stack = self.committed_stack.lock().unwrap();
        let descriptors = Arc::clone(&self.index_descriptors.lock().unwrap());
        let parent = match stack.last() {
            Some(tx) => Parent::Tx(Arc::clone(tx)),
            None => Parent::Backend {
                read: Arc::clone(&self.root_view.lock().unwrap()),
                slot: Arc::clone(&self.root_slot.lock().unwrap()),
            },
        };
        Transaction::new(parent, descriptors)
    }

    /// A pinned read view over the current chain head, independent of
    /// whatever transactions commit afterwards. Must be `abort()`-ed to
    /// release its hold on the committed chain.
    pub fn snapshot(self: &Arc<Self>) -> Snapshot<V> {
        Snapshot::new(self.transaction())
    }

    /// Commits `tx` and, unless it belongs to a `CombinedTransaction` still
    /// gathering its peers, immediately flushes everything flushable.
    /// Returns `tx.commit()`'s own result.
    pub fn commit(&self, tx: &Arc<Transaction<V>>) -> CResult<bool> {
        if !tx.commit()? {
            return Ok(false);
        }
        self.push_committed(Arc::clone(tx));
        self.drain_flushable()?;
        Ok(true)
    }

    /// Records `tx` as committed without draining. Used by `CombinedTransaction`,
    /// which defers the flush until every participating store has reported
    /// flushable (spec.md §4.7 step 2, §4.8 step 2).
    pub(crate) fn push_committed(&self, tx: Arc<Transaction<V>>) {
        self.committed_stack.lock().unwrap().push(tx);
    }

    /// Removes `tx` from the committed stack without flushing it. Used when
    /// a `CombinedTransaction` aborts every leg uniformly after one of its
    /// siblings failed preprocessing or the backend flush (spec.md §4.8
    /// step 6): `tx` was already pushed by `push_committed` but must never
    /// reach the backend.
    pub(crate) fn discard_committed(&self, tx: &Arc<Transaction<V>>) {
        self.committed_stack.lock().unwrap().retain(|t| !Arc::ptr_eq(t, tx));
    }

    /// Applies every committed-but-unflushed transaction to the backend, in
    /// commit order, via `apply`, and marks each `Flushed`. Once the chain is
    /// empty again, the backend's own state now reflects everything up to
    /// this point, so the root commit slot is released: the next transaction
    /// rooted directly on the backend must be free to claim it anew.
    fn drain_committed(&self, apply: impl Fn(&SharedBackend<V>, &[(PrimaryKey, V)], &[PrimaryKey], bool) -> CResult<()>) -> CResult<()> {
        loop {
            let head = {
                let mut stack = self.committed_stack.lock().unwrap();
                if stack.is_empty() {
                    break;
                }
                stack.remove(0)
            };
            let (put, removed, truncated) = head.drain_delta();
            apply(&self.backend, &put, &removed, truncated)?;
            head.mark_flushed();
        }
        *self.root_slot.lock().unwrap() = Arc::new(Mutex::new(None));
        *self.root_view.lock().unwrap() = self.backend.frozen_view();
        Ok(())
    }

    /// Applies every committed-but-unflushed transaction to the backend as a
    /// standalone atomic write per transaction. Used by `ObjectStore::commit`.
    pub(crate) fn drain_flushable(&self) -> CResult<()> {
        self.drain_committed(|backend, put, removed, truncated| backend.apply_sync(put, removed, truncated))
    }

    /// Applies every committed-but-unflushed transaction to the backend under
    /// one shared cross-store atomic write scope (spec.md §4.8 step 4). Used
    /// by `CombinedTransaction`, which pushes every leg via `push_committed`
    /// and then flushes every participating store through the same `scope`
    /// once preprocessing has passed for all of them.
    pub(crate) fn flush_combined(&self, scope: &CommitScope) -> CResult<()> {
        self.drain_committed(|backend, put, removed, truncated| backend.apply_combined(scope, put, removed, truncated))
    }

    pub fn get(&self, key: &PrimaryKey) -> Option<V> {
        Backend::get(self, key)
    }

    pub fn put(self: &Arc<Self>, key: PrimaryKey, value: V) -> CResult<()> {
        let tx = self.transaction();
        tx.put(key, value)?;
        self.commit(&tx)?;
        Ok(())
    }

    pub fn remove(self: &Arc<Self>, key: PrimaryKey) -> CResult<()> {
        let tx = self.transaction();
        tx.remove(key)?;
        self.commit(&tx)?;
        Ok(())
    }

    pub fn truncate(self: &Arc<Self>) -> CResult<()> {
        let tx = self.transaction();
        tx.truncate()?;
        self.commit(&tx)?;
        Ok(())
    }

    pub fn keys(&self, query: Option<&crate::query::Query>, limit: Option<usize>) -> CResult<Vec<PrimaryKey>> {
        self.query_keys_via(query, limit)
    }

    fn query_keys_via(&self, query: Option<&crate::query::Query>, limit: Option<usize>) -> CResult<Vec<PrimaryKey>> {
        match query {
            None => Ok(Backend::keys(self, None, limit)),
            Some(q) => Backend::query_keys(self, q, limit),
        }
    }

    pub fn values(&self, query: Option<&crate::query::Query>, limit: Option<usize>) -> CResult<Vec<V>> {
        Ok(self.keys(query, limit)?.iter().filter_map(|k| self.get(k)).collect())
    }

    pub fn count(&self, query: Option<&crate::query::Query>) -> CResult<usize> {
        match query {
            None => Ok(Backend::count(self, None)),
            Some(q) => Backend::query_count(self, q),
        }
    }

    /// Streams `(primary key, value)` pairs over the primary range.
    pub fn value_stream(&self, ascending: bool, range: Option<&KeyRange<PrimaryKey>>, cb: &mut dyn FnMut(&PrimaryKey, &V) -> bool) {
        Backend::value_stream(self, ascending, range, cb)
    }

    /// A queryable handle onto one named secondary index (spec.md §6).
    pub fn index(self: &Arc<Self>, name: impl Into<String>) -> IndexHandle<Self, V> {
        IndexHandle::new(Arc::clone(self), name)
    }
}

impl<V: Value> Backend<V> for ObjectStore<V> {
    fn get(&self, key: &PrimaryKey) -> Option<V> {
        match self.committed_stack.lock().unwrap().last() {
            Some(tx) => tx.get(key),
            None => self.backend.get(key),
        }
    }

    fn key_stream(&self, ascending: bool, range: Option<&KeyRange<PrimaryKey>>, cb: &mut dyn FnMut(&PrimaryKey) -> bool) {
        match self.committed_stack.lock().unwrap().last() {
            Some(tx) => Backend::key_stream(tx.as_ref(), ascending, range, cb),
            None => self.backend.key_stream(ascending, range, cb),
        }
    }

    fn index_names(&self) -> Vec<String> {
        self.index_names()
    }

    fn index_key_stream(
        &self,
        index: &str,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) -> CResult<()> {
        match self.committed_stack.lock().unwrap().last() {
            Some(tx) => Backend::index_key_stream(tx.as_ref(), index, ascending, range, cb),
            None => self.backend.index_key_stream(index, ascending, range, cb),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::key_path::KeyPath;
    use serde_json::json;

    #[test]
    fn put_flushes_to_backend_immediately() {
        let store: Arc<ObjectStore<serde_json::Value>> = ObjectStore::volatile("items");
        store.put(b"a".to_vec(), json!(1)).unwrap();
        assert_eq!(store.get(&b"a".to_vec()), Some(json!(1)));
        assert!(store.committed_stack.lock().unwrap().is_empty());
    }

    #[test]
    fn secondary_index_s1() {
        let store: Arc<ObjectStore<serde_json::Value>> = ObjectStore::volatile("s1");
        store.create_index(IndexDescriptor::new("testIndex", KeyPath::single("val"), false, false)).unwrap();
        store.create_index(IndexDescriptor::new("testIndex2", KeyPath::sequence(["a", "b"]), false, false)).unwrap();
        store.put(b"test".to_vec(), json!({"val": 123, "a": {"b": 1}})).unwrap();

        assert_eq!(store.keys(Some(&crate::query::Query::eq("testIndex", 123)), None).unwrap(), vec![b"test".to_vec()]);
        assert_eq!(store.keys(Some(&crate::query::Query::eq("testIndex2", 1)), None).unwrap(), vec![b"test".to_vec()]);
        assert_eq!(store.index("testIndex").max_keys(None).unwrap(), vec![b"test".to_vec()]);
    }

    #[test]
    fn nonconforming_values_are_skipped_s2() {
        let store: Arc<ObjectStore<serde_json::Value>> = ObjectStore::volatile("s2");
        store.create_index(IndexDescriptor::new("testIndex2", KeyPath::sequence(["a", "b"]), false, false)).unwrap();
        store.put(b"test".to_vec(), json!({"a": {"b": 1}})).unwrap();
        store.put(b"test2".to_vec(), json!("other")).unwrap();
        assert_eq!(Backend::index_count(&*store, "testIndex2", None).unwrap(), 1);
    }

    #[test]
    fn transactions_chain_onto_committed_head() {
        let store: Arc<ObjectStore<serde_json::Value>> = ObjectStore::volatile("chain");
        let tx1 = store.transaction();
        tx1.put(b"a".to_vec(), json!(1)).unwrap();
        assert!(store.commit(&tx1).unwrap());

        let tx2 = store.transaction();
        assert_eq!(tx2.get(&b"a".to_vec()), Some(json!(1)));
        tx2.put(b"b".to_vec(), json!(2)).unwrap();
        assert!(store.commit(&tx2).unwrap());

        assert_eq!(store.get(&b"a".to_vec()), Some(json!(1)));
        assert_eq!(store.get(&b"b".to_vec()), Some(json!(2)));
    }
}
