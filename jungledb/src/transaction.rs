//! Snapshot-isolated, optimistic buffered mutations over a parent — the
//! backend itself, or another still-open (now `NESTED`) transaction.
//!
//! A `Transaction` is always handed out wrapped in an `Arc` because once it
//! commits it keeps living, frozen, as the parent of whatever transactions
//! get created next on its `ObjectStore` (or as the read view the backend
//! flush consumes) — it never needs cloning, only shared reads.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use crate::backend::Backend;
use crate::error::{CResult, Error};
use crate::index::in_memory_index::IndexDescriptor;
use crate::index::key_path::IndexKey;
use crate::index::transaction_index::{IndexDelta, TransactionIndex};
use crate::index::IndexView;
use crate::index_handle::IndexHandle;
use crate::key_range::KeyRange;
use crate::query::{PrimaryKey, Query};
use crate::snapshot::Snapshot;
use crate::value::{self, Value};

pub type TxId = u64;

fn next_tx_id() -> TxId {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, AtomicOrdering::Relaxed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Open,
    Committed,
    Aborted,
    Conflicted,
    Nested,
    Flushed,
}

/// What a transaction reads through: the store's backend, or another
/// transaction (a still-unflushed committed ancestor on the store's stack,
/// or — while this transaction is nested inside it — its live, now-frozen
/// parent).
pub enum Parent<V: Value> {
    Backend { read: Arc<dyn Backend<V>>, slot: Arc<Mutex<Option<TxId>>> },
    Tx(Arc<Transaction<V>>),
}

impl<V: Value> Parent<V> {
    fn try_claim(&self, child: TxId) -> CResult<()> {
        let slot = match self {
            Parent::Backend { slot, .. } => slot,
            Parent::Tx(tx) => &tx.commit_slot,
        };
        let mut guard = slot.lock().unwrap();
        match *guard {
            Some(existing) if existing != child => Err(Error::OptimisticConflict(format!(
                "parent already has a committed child ({existing})"
            ))),
            _ => {
                *guard = Some(child);
                Ok(())
            }
        }
    }

    fn get(&self, key: &PrimaryKey) -> Option<V> {
        match self {
            Parent::Backend { read, .. } => read.get(key),
            Parent::Tx(tx) => tx.get(key),
        }
    }

    fn key_stream_through(&self, ascending: bool, range: Option<&KeyRange<PrimaryKey>>, cb: &mut dyn FnMut(&PrimaryKey) -> bool) {
        match self {
            Parent::Backend { read, .. } => read.key_stream(ascending, range, cb),
            Parent::Tx(tx) => tx.key_stream(ascending, range, cb),
        }
    }
}

struct Inner<V: Value> {
    modified: HashMap<PrimaryKey, V>,
    removed: HashSet<PrimaryKey>,
    original_values: HashMap<PrimaryKey, Option<V>>,
    truncated: bool,
    state: State,
    nested_child: Option<Arc<Transaction<V>>>,
}

impl<V: Value> Inner<V> {
    fn new() -> Self {
        Self {
            modified: HashMap::new(),
            removed: HashSet::new(),
            original_values: HashMap::new(),
            truncated: false,
            state: State::Open,
            nested_child: None,
        }
    }
}

pub struct Transaction<V: Value> {
    id: TxId,
    parent: Parent<V>,
    /// Index descriptors declared on the owning `ObjectStore`, shared so a
    /// nested child inherits the same index set without re-declaring it.
    index_descriptors: Arc<HashMap<String, IndexDescriptor>>,
    inner: Mutex<Inner<V>>,
    /// This transaction's own commit slot: set the first time a child
    /// nested inside it, or a sibling stacked atop it on the store, commits.
    commit_slot: Mutex<Option<TxId>>,
}

impl<V: Value> Transaction<V> {
    pub(crate) fn new(parent: Parent<V>, index_descriptors: Arc<HashMap<String, IndexDescriptor>>) -> Arc<Self> {
        Arc::new(Self { id: next_tx_id(), parent, index_descriptors, inner: Mutex::new(Inner::new()), commit_slot: Mutex::new(None) })
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn state(&self) -> State {
        self.inner.lock().unwrap().state
    }

    fn require_open(&self, inner: &Inner<V>) -> CResult<()> {
        match inner.state {
            State::Open => Ok(()),
            other => Err(Error::Usage(format!("transaction is not open (state = {other:?})"))),
        }
    }

    /// Original value visible in the parent at first touch of `key` in this
    /// transaction, used for index maintenance.
    fn parent_value(&self, inner: &Inner<V>, key: &PrimaryKey) -> Option<V> {
        if let Some(original) = inner.original_values.get(key) {
            return original.clone();
        }
        if inner.truncated {
            None
        } else {
            self.parent.get(key)
        }
    }

    pub fn put(&self, key: PrimaryKey, new_value: V) -> CResult<()> {
        let mut inner = self.inner.lock().unwrap();
        self.require_open(&inner)?;
        if !inner.original_values.contains_key(&key) {
            let original = self.parent_value(&inner, &key);
            inner.original_values.insert(key.clone(), original);
        }
        self.check_unique_constraints(&inner, &key, Some(&new_value))?;
        inner.removed.remove(&key);
        inner.modified.insert(key, new_value);
        Ok(())
    }

    /// Identical contract to `put`, kept separate because callers that must
    /// observe the uniqueness check without any suspension point (inside a
    /// `CombinedTransaction` preprocessing phase) call this name explicitly.
    pub fn put_sync(&self, key: PrimaryKey, new_value: V) -> CResult<()> {
        self.put(key, new_value)
    }

    pub fn remove(&self, key: PrimaryKey) -> CResult<()> {
        let mut inner = self.inner.lock().unwrap();
        self.require_open(&inner)?;
        if !inner.original_values.contains_key(&key) {
            let original = self.parent_value(&inner, &key);
            inner.original_values.insert(key.clone(), original);
        }
        inner.modified.remove(&key);
        inner.removed.insert(key);
        Ok(())
    }

    pub fn truncate(&self) -> CResult<()> {
        let mut inner = self.inner.lock().unwrap();
        self.require_open(&inner)?;
        inner.modified.clear();
        inner.removed.clear();
        inner.original_values.clear();
        inner.truncated = true;
        Ok(())
    }

    /// Checks every `unique` index this record participates in before the
    /// write is buffered, scanning the transaction's own overlay as well as
    /// the parent chain.
    fn check_unique_constraints(&self, inner: &Inner<V>, key: &PrimaryKey, new_value: Option<&V>) -> CResult<()> {
        let Some(new_value) = new_value else { return Ok(()) };
        let new_json = value::to_json(new_value);
        for descriptor in self.index_descriptors.values() {
            if !descriptor.unique {
                continue;
            }
            for secondary in descriptor.key_path.extract_keys(&new_json, descriptor.multi_entry) {
                let range = KeyRange::only(secondary);
                let owners = self.index_keys_locked(inner, &descriptor.name, Some(&range), None)?;
                if owners.iter().any(|pk| pk != key) {
                    return Err(Error::UniquenessViolation(format!(
                        "index {:?}: secondary key already claimed by another primary key",
                        descriptor.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &PrimaryKey) -> Option<V> {
        let inner = self.inner.lock().unwrap();
        if inner.removed.contains(key) {
            return None;
        }
        if let Some(v) = inner.modified.get(key) {
            return Some(v.clone());
        }
        if inner.truncated {
            return None;
        }
        self.parent.get(key)
    }

    /// Merges this transaction's own sorted primary-key delta with the
    /// parent's stream, skipping keys this transaction has touched.
    fn key_stream(&self, ascending: bool, range: Option<&KeyRange<PrimaryKey>>, cb: &mut dyn FnMut(&PrimaryKey) -> bool) {
        let inner = self.inner.lock().unwrap();
        let mut own: Vec<PrimaryKey> = inner
            .modified
            .keys()
            .filter(|k| range.is_none_or(|r| r.includes(k)))
            .cloned()
            .collect();
        own.sort();
        if !ascending {
            own.reverse();
        }
        let touched: HashSet<&PrimaryKey> = inner.modified.keys().chain(inner.removed.iter()).collect();

        let mut parent_buf = Vec::new();
        if !inner.truncated {
            self.parent.key_stream_through(ascending, range, &mut |k| {
                if !touched.contains(k) {
                    parent_buf.push(k.clone());
                }
                true
            });
        }
        drop(inner);

        let before = |a: &PrimaryKey, b: &PrimaryKey| if ascending { a < b } else { a > b };
        let mut oi = own.into_iter().peekable();
        let mut pi = parent_buf.into_iter().peekable();
        loop {
            let take_own = match (oi.peek(), pi.peek()) {
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
                (Some(o), Some(p)) => before(o, p) || o == p,
            };
            let k = if take_own { oi.next().unwrap() } else { pi.next().unwrap() };
            if !cb(&k) {
                break;
            }
        }
    }

    /// Streams `(secondary key, primary key)` pairs for the named index,
    /// merging this transaction's delta with its parent's view on the fly.
    fn index_key_stream_locked(
        &self,
        inner: &Inner<V>,
        name: &str,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) -> CResult<()> {
        let descriptor = self.index_descriptors.get(name).ok_or_else(|| Error::Usage(format!("unknown index {name:?}")))?;
        let touched = build_touched_map(inner);
        let delta = IndexDelta { key_path: &descriptor.key_path, multi_entry: descriptor.multi_entry, touched: &touched, truncated: inner.truncated };
        let parent_view = ParentIndexView { parent: &self.parent, name };
        TransactionIndex::new(parent_view, delta).key_stream(ascending, range, cb);
        Ok(())
    }

    fn index_keys_locked(
        &self,
        inner: &Inner<V>,
        name: &str,
        range: Option<&KeyRange<IndexKey>>,
        limit: Option<usize>,
    ) -> CResult<Vec<PrimaryKey>> {
        let mut out = Vec::new();
        self.index_key_stream_locked(inner, name, true, range, &mut |_, pk| {
            out.push(pk.clone());
            !limit.is_some_and(|l| out.len() >= l)
        })?;
        Ok(out)
    }

    fn index_min_keys_locked(&self, inner: &Inner<V>, name: &str, range: Option<&KeyRange<IndexKey>>) -> CResult<Vec<PrimaryKey>> {
        let mut out = Vec::new();
        let mut min_key: Option<IndexKey> = None;
        self.index_key_stream_locked(inner, name, true, range, &mut |k, pk| {
            match &min_key {
                None => {
                    min_key = Some(k.clone());
                    out.push(pk.clone());
                }
                Some(m) if k == m => out.push(pk.clone()),
                Some(_) => return false,
            }
            true
        })?;
        Ok(out)
    }

    fn index_max_keys_locked(&self, inner: &Inner<V>, name: &str, range: Option<&KeyRange<IndexKey>>) -> CResult<Vec<PrimaryKey>> {
        let mut out = Vec::new();
        let mut max_key: Option<IndexKey> = None;
        self.index_key_stream_locked(inner, name, false, range, &mut |k, pk| {
            match &max_key {
                None => {
                    max_key = Some(k.clone());
                    out.push(pk.clone());
                }
                Some(m) if k == m => out.push(pk.clone()),
                Some(_) => return false,
            }
            true
        })?;
        out.reverse();
        Ok(out)
    }

    pub fn keys(&self, query: Option<&Query>, limit: Option<usize>) -> CResult<Vec<PrimaryKey>> {
        match query {
            None | Some(Query::Primary(_)) => {
                let range = query.and_then(|q| match q {
                    Query::Primary(r) => Some(r.clone()),
                    _ => None,
                });
                let mut out = Vec::new();
                self.key_stream(true, range.as_ref(), &mut |k| {
                    out.push(k.clone());
                    !limit.is_some_and(|l| out.len() >= l)
                });
                Ok(out)
            }
            Some(Query::Index(name, range)) => {
                let inner = self.inner.lock().unwrap();
                self.index_keys_locked(&inner, name, Some(range), limit)
            }
        }
    }

    pub fn values(&self, query: Option<&Query>, limit: Option<usize>) -> CResult<Vec<V>> {
        Ok(self.keys(query, limit)?.iter().filter_map(|k| self.get(k)).collect())
    }

    pub fn count(&self, query: Option<&Query>) -> CResult<usize> {
        Ok(self.keys(query, None)?.len())
    }

    pub fn min_keys(&self, query: Option<&Query>) -> CResult<Vec<PrimaryKey>> {
        match query {
            None | Some(Query::Primary(_)) => {
                let mut out = Vec::new();
                let range = query.and_then(|q| match q {
                    Query::Primary(r) => Some(r.clone()),
                    _ => None,
                });
                self.key_stream(true, range.as_ref(), &mut |k| {
                    out.push(k.clone());
                    false
                });
                Ok(out)
            }
            Some(Query::Index(name, range)) => {
                let inner = self.inner.lock().unwrap();
                self.index_min_keys_locked(&inner, name, Some(range))
            }
        }
    }

    pub fn max_keys(&self, query: Option<&Query>) -> CResult<Vec<PrimaryKey>> {
        match query {
            None | Some(Query::Primary(_)) => {
                let mut out = Vec::new();
                let range = query.and_then(|q| match q {
                    Query::Primary(r) => Some(r.clone()),
                    _ => None,
                });
                self.key_stream(false, range.as_ref(), &mut |k| {
                    out.push(k.clone());
                    false
                });
                Ok(out)
            }
            Some(Query::Index(name, range)) => {
                let inner = self.inner.lock().unwrap();
                self.index_max_keys_locked(&inner, name, Some(range))
            }
        }
    }

    /// Streams `(primary key, value)` pairs over the primary range.
    pub fn value_stream(&self, ascending: bool, range: Option<&KeyRange<PrimaryKey>>, cb: &mut dyn FnMut(&PrimaryKey, &V) -> bool) {
        Backend::value_stream(self, ascending, range, cb)
    }

    /// A queryable handle onto one named secondary index (spec.md §4.6, §6).
    pub fn index(self: &Arc<Self>, name: impl Into<String>) -> IndexHandle<Self, V> {
        IndexHandle::new(Arc::clone(self), name)
    }

    /// A pinned read view over this transaction's own state at the moment of
    /// the call, independent of whatever this transaction does afterwards.
    /// Implemented as a nested child (the same mechanism `ObjectStore::snapshot`
    /// uses one level up), so this transaction moves to `NESTED` until the
    /// snapshot is aborted.
    pub fn snapshot(self: &Arc<Self>) -> CResult<Snapshot<V>> {
        Ok(Snapshot::new(self.transaction()?))
    }

    /// Opens a nested child. This transaction moves to `NESTED` and rejects
    /// further direct writes until the child resolves.
    pub fn transaction(self: &Arc<Self>) -> CResult<Arc<Transaction<V>>> {
        let mut inner = self.inner.lock().unwrap();
        self.require_open(&inner)?;
        inner.state = State::Nested;
        let child = Transaction::new(Parent::Tx(Arc::clone(self)), Arc::clone(&self.index_descriptors));
        inner.nested_child = Some(Arc::clone(&child));
        Ok(child)
    }

    /// Commits this transaction. Returns `Ok(true)` on success, `Ok(false)`
    /// if a sibling had already committed against the same parent (state
    /// becomes `CONFLICTED`). A `UniquenessViolation` discovered here aborts
    /// the transaction and is returned as an error.
    pub fn commit(self: &Arc<Self>) -> CResult<bool> {
        {
            let inner = self.inner.lock().unwrap();
            self.require_open(&inner)?;
            for key in inner.modified.keys() {
                self.check_unique_constraints(&inner, key, inner.modified.get(key))?;
            }
        }

        match self.parent.try_claim(self.id) {
            Ok(()) => {}
            Err(Error::OptimisticConflict(_)) => {
                self.inner.lock().unwrap().state = State::Conflicted;
                return Ok(false);
            }
            Err(other) => return Err(other),
        }

        if let Parent::Tx(parent) = &self.parent {
            if matches!(parent.state(), State::Nested) {
                self.merge_into_nested_parent(parent)?;
                self.inner.lock().unwrap().state = State::Committed;
                return Ok(true);
            }
        }

        self.inner.lock().unwrap().state = State::Committed;
        Ok(true)
    }

    fn merge_into_nested_parent(&self, parent: &Arc<Transaction<V>>) -> CResult<()> {
        let child = self.inner.lock().unwrap();
        let mut parent_inner = parent.inner.lock().unwrap();
        if child.truncated {
            parent_inner.modified.clear();
            parent_inner.removed.clear();
            parent_inner.truncated = true;
        }
        for key in &child.removed {
            parent_inner.modified.remove(key);
            parent_inner.removed.insert(key.clone());
            parent_inner.original_values.entry(key.clone()).or_insert_with(|| child.original_values.get(key).cloned().flatten());
        }
        for (key, value) in &child.modified {
            parent_inner.removed.remove(key);
            parent_inner.original_values.entry(key.clone()).or_insert_with(|| child.original_values.get(key).cloned().flatten());
            parent_inner.modified.insert(key.clone(), value.clone());
        }
        parent_inner.state = State::Open;
        parent_inner.nested_child = None;
        Ok(())
    }

    /// Discards this transaction's buffer. If it was nested, its parent
    /// reverts to `OPEN`.
    pub fn abort(&self) -> CResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.modified.clear();
        inner.removed.clear();
        inner.original_values.clear();
        inner.truncated = false;
        inner.state = State::Aborted;
        if let Parent::Tx(parent) = &self.parent {
            if matches!(parent.state(), State::Nested) {
                let mut parent_inner = parent.inner.lock().unwrap();
                parent_inner.state = State::Open;
                parent_inner.nested_child = None;
            }
        }
        Ok(())
    }

    /// The committed delta, consumed by `ObjectStore` to flush into the
    /// backend. Only meaningful once `state() == Committed`.
    pub(crate) fn drain_delta(&self) -> (Vec<(PrimaryKey, V)>, Vec<PrimaryKey>, bool) {
        let inner = self.inner.lock().unwrap();
        (inner.modified.iter().map(|(k, v)| (k.clone(), v.clone())).collect(), inner.removed.iter().cloned().collect(), inner.truncated)
    }

    pub(crate) fn mark_flushed(&self) {
        self.inner.lock().unwrap().state = State::Flushed;
    }

    /// Re-runs unique-index checks over this transaction's own modified
    /// keys. Used as the "preprocessing" step `CombinedTransaction` runs
    /// concurrently across every leg after each has committed locally but
    /// before any backend is touched (spec.md §4.8 step 3).
    pub(crate) fn revalidate_uniqueness(&self) -> CResult<()> {
        let inner = self.inner.lock().unwrap();
        for key in inner.modified.keys() {
            self.check_unique_constraints(&inner, key, inner.modified.get(key))?;
        }
        Ok(())
    }
}

impl<V: Value> Backend<V> for Transaction<V> {
    fn get(&self, key: &PrimaryKey) -> Option<V> {
        Transaction::get(self, key)
    }

    fn key_stream(&self, ascending: bool, range: Option<&KeyRange<PrimaryKey>>, cb: &mut dyn FnMut(&PrimaryKey) -> bool) {
        Transaction::key_stream(self, ascending, range, cb)
    }

    fn index_names(&self) -> Vec<String> {
        self.index_descriptors.keys().cloned().collect()
    }

    fn index_key_stream(
        &self,
        index: &str,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) -> CResult<()> {
        let inner = self.inner.lock().unwrap();
        self.index_key_stream_locked(&inner, index, ascending, range, cb)
    }
}

/// Per-primary-key (value before this transaction touched it, value after)
/// pairs, restricted to keys this transaction actually modified or removed.
fn build_touched_map<V: Value>(
    inner: &Inner<V>,
) -> std::collections::BTreeMap<PrimaryKey, (Option<serde_json::Value>, Option<serde_json::Value>)> {
    let mut touched = std::collections::BTreeMap::new();
    for key in &inner.removed {
        let before = inner.original_values.get(key).cloned().flatten().as_ref().map(value::to_json);
        touched.insert(key.clone(), (before, None));
    }
    for (key, after) in &inner.modified {
        let before = inner.original_values.get(key).cloned().flatten().as_ref().map(value::to_json);
        touched.insert(key.clone(), (before, Some(value::to_json(after))));
    }
    touched
}

/// Adapts a `Parent<V>` to `IndexView` so `TransactionIndex` can compose
/// across the chain without caring whether the parent is the backend or
/// another transaction.
struct ParentIndexView<'a, V: Value> {
    parent: &'a Parent<V>,
    name: &'a str,
}

impl<'a, V: Value> IndexView for ParentIndexView<'a, V> {
    fn key_stream(&self, ascending: bool, range: Option<&KeyRange<IndexKey>>, cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool) {
        // The index name was already validated against this transaction's own
        // `index_descriptors` before a `ParentIndexView` is built; a parent
        // that doesn't know the index (not yet created when it was snapshot)
        // simply contributes nothing.
        match self.parent {
            Parent::Backend { read, .. } => {
                let _ = read.index_key_stream(self.name, ascending, range, cb);
            }
            Parent::Tx(tx) => {
                let _ = tx.index_key_stream(self.name, ascending, range, cb);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::in_memory::InMemoryBackend;
    use crate::index::key_path::KeyPath;
    use serde_json::json;

    /// Every transaction rooted directly on the same backend shares one
    /// commit slot, mirroring how an `ObjectStore` hands out a single
    /// `Backend` parent to all the leaf transactions it creates.
    fn store(
        descriptors: Vec<IndexDescriptor>,
    ) -> (Arc<InMemoryBackend<serde_json::Value>>, Arc<HashMap<String, IndexDescriptor>>, Arc<Mutex<Option<TxId>>>) {
        let backend = Arc::new(InMemoryBackend::new());
        let map: HashMap<String, IndexDescriptor> = descriptors.into_iter().map(|d| (d.name.clone(), d)).collect();
        (backend, Arc::new(map), Arc::new(Mutex::new(None)))
    }

    fn root_tx(
        backend: &Arc<InMemoryBackend<serde_json::Value>>,
        descriptors: &Arc<HashMap<String, IndexDescriptor>>,
        slot: &Arc<Mutex<Option<TxId>>>,
    ) -> Arc<Transaction<serde_json::Value>> {
        Transaction::new(
            Parent::Backend { read: backend.clone() as Arc<dyn Backend<serde_json::Value>>, slot: Arc::clone(slot) },
            descriptors.clone(),
        )
    }

    #[test]
    fn read_your_writes() {
        let (backend, descriptors, slot) = store(vec![]);
        let tx = root_tx(&backend, &descriptors, &slot);
        tx.put(b"a".to_vec(), json!(1)).unwrap();
        assert_eq!(tx.get(&b"a".to_vec()), Some(json!(1)));
        tx.remove(b"a".to_vec()).unwrap();
        assert_eq!(tx.get(&b"a".to_vec()), None);
    }

    #[test]
    fn snapshot_isolation_s4() {
        let (backend, descriptors, slot) = store(vec![]);
        for i in 0..10 {
            backend.put(format!("key{i}").into_bytes(), json!(format!("value{i}"))).unwrap();
        }
        let tx1 = root_tx(&backend, &descriptors, &slot);
        let tx2 = root_tx(&backend, &descriptors, &slot);

        tx1.remove(b"key0".to_vec()).unwrap();
        tx1.put(b"test".to_vec(), json!("success")).unwrap();
        assert!(tx1.commit().unwrap());

        assert_eq!(tx2.get(&b"key0".to_vec()), Some(json!("value0")));
        assert_eq!(tx2.get(&b"test".to_vec()), None);
        assert!(!tx2.commit().unwrap());
        assert_eq!(tx2.state(), State::Conflicted);
    }

    #[test]
    fn uniqueness_rejection_s3() {
        let descriptor = IndexDescriptor::new("depth", KeyPath::sequence(["a", "b"]), false, true);
        let (backend, descriptors, slot) = store(vec![descriptor]);
        let tx1 = root_tx(&backend, &descriptors, &slot);
        tx1.put(b"t1".to_vec(), json!({"a": {"b": 1}})).unwrap();
        assert!(tx1.commit().unwrap());

        // tx1 is committed but not yet flushed to the backend, so the next
        // transaction chains onto it directly rather than re-rooting on the
        // (still stale) backend snapshot.
        let tx2 = Transaction::new(Parent::Tx(Arc::clone(&tx1)), descriptors.clone());
        let err = tx2.put(b"t2".to_vec(), json!({"a": {"b": 1}}));
        assert!(matches!(err, Err(Error::UniquenessViolation(_))));
        tx2.abort().unwrap();
    }

    #[test]
    fn ordered_range_scan_s5() {
        let (backend, descriptors, slot) = store(vec![]);
        let tx = root_tx(&backend, &descriptors, &slot);
        for i in 0..4 {
            tx.put(format!("test{i}").into_bytes(), json!(i)).unwrap();
        }
        let upper = Query::primary(KeyRange::upper_bound(b"test1".to_vec(), false));
        let values = tx.values(Some(&upper), None).unwrap();
        assert_eq!(values, vec![json!(0), json!(1)]);

        let lower = Query::primary(KeyRange::lower_bound(b"test2".to_vec(), false));
        let keys = tx.keys(Some(&lower), None).unwrap();
        assert_eq!(keys, vec![b"test2".to_vec(), b"test3".to_vec()]);
    }

    #[test]
    fn nested_commit_merges_into_parent() {
        let (backend, descriptors, slot) = store(vec![]);
        let parent = root_tx(&backend, &descriptors, &slot);
        parent.put(b"a".to_vec(), json!(1)).unwrap();

        let child = parent.transaction().unwrap();
        assert_eq!(parent.state(), State::Nested);
        assert!(parent.put(b"x".to_vec(), json!(0)).is_err());

        child.put(b"b".to_vec(), json!(2)).unwrap();
        assert!(child.commit().unwrap());

        assert_eq!(parent.state(), State::Open);
        assert_eq!(parent.get(&b"a".to_vec()), Some(json!(1)));
        assert_eq!(parent.get(&b"b".to_vec()), Some(json!(2)));
    }

    #[test]
    fn nested_abort_restores_parent() {
        let (backend, descriptors, slot) = store(vec![]);
        let parent = root_tx(&backend, &descriptors, &slot);
        let child = parent.transaction().unwrap();
        child.put(b"b".to_vec(), json!(2)).unwrap();
        child.abort().unwrap();

        assert_eq!(parent.state(), State::Open);
        assert_eq!(parent.get(&b"b".to_vec()), None);
        parent.put(b"ok".to_vec(), json!(true)).unwrap();
    }
}
