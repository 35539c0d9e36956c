//! A long-lived read view pinned to the chain position it was created at.
//! Unlike a transaction it is never committed; its only terminal action is
//! `abort()`, which releases its hold on the committed chain (an unaborted
//! snapshot otherwise pins old versions in memory for as long as it lives).

use std::sync::Arc;

use crate::backend::Backend;
use crate::error::CResult;
use crate::index::key_path::IndexKey;
use crate::key_range::KeyRange;
use crate::query::PrimaryKey;
use crate::transaction::Transaction;
use crate::value::Value;

pub struct Snapshot<V: Value> {
    tx: Arc<Transaction<V>>,
}

impl<V: Value> Snapshot<V> {
    pub(crate) fn new(tx: Arc<Transaction<V>>) -> Self {
        Self { tx }
    }

    pub fn get(&self, key: &PrimaryKey) -> Option<V> {
        self.tx.get(key)
    }

    pub fn keys(&self, query: Option<&crate::query::Query>, limit: Option<usize>) -> CResult<Vec<PrimaryKey>> {
        self.tx.keys(query, limit)
    }

    pub fn values(&self, query: Option<&crate::query::Query>, limit: Option<usize>) -> CResult<Vec<V>> {
        self.tx.values(query, limit)
    }

    pub fn count(&self, query: Option<&crate::query::Query>) -> CResult<usize> {
        self.tx.count(query)
    }

    /// Releases this snapshot's pin on the committed chain. The snapshot
    /// itself is never committed, so this is the only way it leaves `OPEN`.
    pub fn abort(&self) -> CResult<()> {
        self.tx.abort()
    }
}

impl<V: Value> Backend<V> for Snapshot<V> {
    fn get(&self, key: &PrimaryKey) -> Option<V> {
        Snapshot::get(self, key)
    }

    fn key_stream(&self, ascending: bool, range: Option<&KeyRange<PrimaryKey>>, cb: &mut dyn FnMut(&PrimaryKey) -> bool) {
        Backend::key_stream(self.tx.as_ref(), ascending, range, cb)
    }

    fn index_names(&self) -> Vec<String> {
        Backend::index_names(self.tx.as_ref())
    }

    fn index_key_stream(
        &self,
        index: &str,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) -> CResult<()> {
        Backend::index_key_stream(self.tx.as_ref(), index, ascending, range, cb)
    }
}
