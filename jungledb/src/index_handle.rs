//! A queryable handle onto one named secondary index (spec.md §4.3, §6):
//! the return type of `index(name)` on an `ObjectStore` or `Transaction`.
//! Generic over any `Backend` so both owners share this one implementation
//! rather than each growing their own index-accessor surface.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::backend::Backend;
use crate::error::CResult;
use crate::index::key_path::IndexKey;
use crate::key_range::KeyRange;
use crate::query::PrimaryKey;
use crate::value::Value;

pub struct IndexHandle<T, V: Value> {
    owner: Arc<T>,
    name: String,
    _marker: PhantomData<V>,
}

impl<T: Backend<V>, V: Value> IndexHandle<T, V> {
    pub(crate) fn new(owner: Arc<T>, name: impl Into<String>) -> Self {
        Self { owner, name: name.into(), _marker: PhantomData }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self, range: Option<&KeyRange<IndexKey>>, limit: Option<usize>) -> CResult<Vec<PrimaryKey>> {
        self.owner.index_keys(&self.name, range, limit)
    }

    pub fn count(&self, range: Option<&KeyRange<IndexKey>>) -> CResult<usize> {
        self.owner.index_count(&self.name, range)
    }

    /// Primary keys sharing the least secondary key in range.
    pub fn min_keys(&self, range: Option<&KeyRange<IndexKey>>) -> CResult<Vec<PrimaryKey>> {
        self.owner.index_min_keys(&self.name, range)
    }

    /// Primary keys sharing the greatest secondary key in range.
    pub fn max_keys(&self, range: Option<&KeyRange<IndexKey>>) -> CResult<Vec<PrimaryKey>> {
        self.owner.index_max_keys(&self.name, range)
    }

    pub fn values(&self, range: Option<&KeyRange<IndexKey>>, limit: Option<usize>) -> CResult<Vec<V>> {
        self.owner.index_values(&self.name, range, limit)
    }

    pub fn min_values(&self, range: Option<&KeyRange<IndexKey>>) -> CResult<Vec<V>> {
        self.owner.index_min_values(&self.name, range)
    }

    pub fn max_values(&self, range: Option<&KeyRange<IndexKey>>) -> CResult<Vec<V>> {
        self.owner.index_max_values(&self.name, range)
    }

    pub fn key_stream(&self, ascending: bool, range: Option<&KeyRange<IndexKey>>, cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool) -> CResult<()> {
        self.owner.index_key_stream(&self.name, ascending, range, cb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::in_memory_index::IndexDescriptor;
    use crate::index::key_path::KeyPath;
    use crate::object_store::ObjectStore;
    use serde_json::json;

    #[test]
    fn index_handle_reads_max_keys_s1() {
        let store: Arc<ObjectStore<serde_json::Value>> = ObjectStore::volatile("s1");
        store.create_index(IndexDescriptor::new("testIndex", KeyPath::single("val"), false, false)).unwrap();
        store.put(b"test".to_vec(), json!({"val": 123})).unwrap();

        assert_eq!(store.index("testIndex").max_keys(None).unwrap(), vec![b"test".to_vec()]);
        assert_eq!(store.index("testIndex").values(None, None).unwrap(), vec![json!({"val": 123})]);
    }
}
