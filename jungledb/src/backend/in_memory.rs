//! The volatile backend: an ordered primary map plus a set of secondary
//! indices. Used both as a standalone in-memory database and, unwrapped from
//! its `Arc`-swap shell, as the plain buffer a `Transaction` mutates.
//!
//! `InMemoryBackend` hands out its current state as a cheap `Arc` clone via
//! `snapshot()`. A transaction takes one such snapshot at creation time and
//! reads through it for its whole lifetime, even if the backend is mutated
//! afterwards — `Arc::make_mut` only deep-clones `BackendState` when a
//! snapshot is still outstanding, so the common case (no concurrent readers)
//! mutates in place.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::{Backend, CommitScope, PersistentBackend};
use crate::error::{CResult, Error};
use crate::index::in_memory_index::{IndexDescriptor, InMemoryIndex};
use crate::index::key_path::IndexKey;
use crate::key_range::KeyRange;
use crate::ordered_map::OrderedMap;
use crate::query::PrimaryKey;
use crate::value::{self, Value};

#[derive(Clone)]
pub struct BackendState<V: Value> {
    data: OrderedMap<PrimaryKey, V>,
    indices: HashMap<String, InMemoryIndex>,
}

impl<V: Value> Default for BackendState<V> {
    fn default() -> Self {
        Self { data: OrderedMap::new(), indices: HashMap::new() }
    }
}

impl<V: Value> BackendState<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: PrimaryKey, new_value: V) -> CResult<()> {
        let new_json = value::to_json(&new_value);
        let old_json = self.data.get(&key).map(value::to_json);
        for index in self.indices.values_mut() {
            index.put(&key, &new_json, old_json.as_ref())?;
        }
        self.data.insert(key, new_value);
        Ok(())
    }

    /// Returns `false` if `key` was absent.
    pub fn remove(&mut self, key: &PrimaryKey) -> CResult<bool> {
        let Some(old) = self.data.get(key).cloned() else { return Ok(false) };
        let old_json = value::to_json(&old);
        for index in self.indices.values_mut() {
            index.remove(key, &old_json);
        }
        self.data.remove(key);
        Ok(true)
    }

    pub fn truncate(&mut self) {
        self.data.clear();
        for index in self.indices.values_mut() {
            index.truncate();
        }
    }

    /// Declares a secondary index, backfilling it by scanning every live
    /// value if the backend is non-empty.
    pub fn create_index(&mut self, descriptor: IndexDescriptor) -> CResult<()> {
        let mut index = InMemoryIndex::new(descriptor.clone());
        for (key, record) in self.data.iter() {
            let json = value::to_json(record);
            index.put(key, &json, None)?;
        }
        self.indices.insert(descriptor.name.clone(), index);
        Ok(())
    }

    pub fn delete_index(&mut self, name: &str) {
        self.indices.remove(name);
    }

    pub fn index(&self, name: &str) -> CResult<&InMemoryIndex> {
        self.indices.get(name).ok_or_else(|| Error::Usage(format!("unknown index {name:?}")))
    }
}

impl<V: Value> Backend<V> for BackendState<V> {
    fn get(&self, key: &PrimaryKey) -> Option<V> {
        self.data.get(key).cloned()
    }

    fn key_stream(&self, ascending: bool, range: Option<&KeyRange<PrimaryKey>>, cb: &mut dyn FnMut(&PrimaryKey) -> bool) {
        let mut iter: Box<dyn DoubleEndedIterator<Item = (&PrimaryKey, &V)>> = match range {
            None => Box::new(self.data.iter()),
            Some(r) => Box::new(self.data.range(r.as_bounds())),
        };
        loop {
            let next = if ascending { iter.next() } else { iter.next_back() };
            let Some((key, _)) = next else { break };
            if !cb(key) {
                break;
            }
        }
    }

    fn index_names(&self) -> Vec<String> {
        self.indices.keys().cloned().collect()
    }

    fn index_key_stream(
        &self,
        index: &str,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) -> CResult<()> {
        self.index(index)?.key_stream(ascending, range, cb);
        Ok(())
    }
}

/// Standalone volatile backend: the root of the transaction chain when no
/// durable store backs an `ObjectStore`.
pub struct InMemoryBackend<V: Value> {
    state: Mutex<Arc<BackendState<V>>>,
}

impl<V: Value> Default for InMemoryBackend<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Value> InMemoryBackend<V> {
    pub fn new() -> Self {
        Self { state: Mutex::new(Arc::new(BackendState::new())) }
    }

    /// A point-in-time, shareable view of the current state. Cheap: it's an
    /// `Arc` clone, not a deep copy.
    pub fn snapshot(&self) -> Arc<BackendState<V>> {
        Arc::clone(&self.state.lock().unwrap())
    }

    fn with_state_mut<R>(&self, f: impl FnOnce(&mut BackendState<V>) -> CResult<R>) -> CResult<R> {
        let mut guard = self.state.lock().unwrap();
        let mut next = Arc::clone(&guard);
        let result = f(Arc::make_mut(&mut next))?;
        *guard = next;
        Ok(result)
    }

    pub fn put(&self, key: PrimaryKey, value: V) -> CResult<()> {
        self.with_state_mut(|s| s.put(key, value))
    }

    pub fn remove(&self, key: &PrimaryKey) -> CResult<bool> {
        self.with_state_mut(|s| s.remove(key))
    }

    pub fn truncate(&self) {
        self.with_state_mut(|s| Ok(s.truncate())).expect("truncate is infallible");
    }
}

impl<V: Value> Backend<V> for InMemoryBackend<V> {
    fn get(&self, key: &PrimaryKey) -> Option<V> {
        self.snapshot().get(key)
    }

    fn key_stream(&self, ascending: bool, range: Option<&KeyRange<PrimaryKey>>, cb: &mut dyn FnMut(&PrimaryKey) -> bool) {
        self.snapshot().key_stream(ascending, range, cb)
    }

    fn index_names(&self) -> Vec<String> {
        self.snapshot().index_names()
    }

    fn index_key_stream(
        &self,
        index: &str,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) -> CResult<()> {
        self.snapshot().index_key_stream(index, ascending, range, cb)
    }
}

impl<V: Value> PersistentBackend<V> for InMemoryBackend<V> {
    fn apply_combined(&mut self, _scope: &CommitScope, put: &[(PrimaryKey, V)], removed: &[PrimaryKey], truncated: bool) -> CResult<()> {
        self.with_state_mut(|s| {
            if truncated {
                s.truncate();
            }
            for key in removed {
                s.remove(key)?;
            }
            for (key, value) in put {
                s.put(key.clone(), value.clone())?;
            }
            Ok(())
        })
    }

    fn create_index(&mut self, descriptor: IndexDescriptor) -> CResult<()> {
        self.with_state_mut(|s| s.create_index(descriptor))
    }

    fn delete_index(&mut self, name: &str) -> CResult<()> {
        self.with_state_mut(|s| Ok(s.delete_index(name)))
    }

    fn frozen_view(&self) -> Arc<dyn Backend<V>> {
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::key_path::KeyPath;
    use serde_json::json;

    #[test]
    fn put_get_remove_roundtrip() {
        let backend: InMemoryBackend<serde_json::Value> = InMemoryBackend::new();
        backend.put(b"a".to_vec(), json!({"v": 1})).unwrap();
        assert_eq!(backend.get(&b"a".to_vec()), Some(json!({"v": 1})));
        assert!(backend.remove(&b"a".to_vec()).unwrap());
        assert_eq!(backend.get(&b"a".to_vec()), None);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_writes() {
        let backend: InMemoryBackend<serde_json::Value> = InMemoryBackend::new();
        backend.put(b"a".to_vec(), json!(1)).unwrap();
        let snap = backend.snapshot();
        backend.put(b"b".to_vec(), json!(2)).unwrap();
        assert_eq!(snap.get(&b"a".to_vec()), Some(json!(1)));
        assert_eq!(snap.get(&b"b".to_vec()), None);
        assert_eq!(backend.get(&b"b".to_vec()), Some(json!(2)));
    }

    #[test]
    fn create_index_backfills_existing_data() {
        let mut backend: InMemoryBackend<serde_json::Value> = InMemoryBackend::new();
        backend.put(b"a".to_vec(), json!({"tag": "x"})).unwrap();
        backend.put(b"b".to_vec(), json!({"tag": "y"})).unwrap();
        backend.create_index(IndexDescriptor::new("byTag", KeyPath::single("tag"), false, false)).unwrap();
        assert_eq!(backend.index_count("byTag", None).unwrap(), 2);
        assert_eq!(
            backend.index_keys("byTag", Some(&KeyRange::only(IndexKey(json!("x")))), None).unwrap(),
            vec![b"a".to_vec()]
        );
    }
}
