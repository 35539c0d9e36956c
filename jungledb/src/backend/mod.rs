//! The read/write contract every chain link (a volatile in-memory store, a
//! persistent store, a transaction's buffer) satisfies, so `Transaction` and
//! `ObjectStore` can walk the parent chain generically.

pub mod in_memory;

use std::sync::Arc;

use crate::error::CResult;
use crate::index::key_path::IndexKey;
use crate::index::in_memory_index::IndexDescriptor;
use crate::key_range::KeyRange;
use crate::query::{PrimaryKey, Query};
use crate::value::Value;

/// Read side shared by every link in a parent chain: a backend (volatile or
/// persistent) and a transaction's own buffer both implement it.
pub trait Backend<V: Value>: Send + Sync {
    fn get(&self, key: &PrimaryKey) -> Option<V>;

    fn contains_key(&self, key: &PrimaryKey) -> bool {
        self.get(key).is_some()
    }

    fn key_stream(&self, ascending: bool, range: Option<&KeyRange<PrimaryKey>>, cb: &mut dyn FnMut(&PrimaryKey) -> bool);

    fn keys(&self, range: Option<&KeyRange<PrimaryKey>>, limit: Option<usize>) -> Vec<PrimaryKey> {
        let mut out = Vec::new();
        self.key_stream(true, range, &mut |k| {
            out.push(k.clone());
            !limit.is_some_and(|l| out.len() >= l)
        });
        out
    }

    fn values(&self, range: Option<&KeyRange<PrimaryKey>>, limit: Option<usize>) -> Vec<V> {
        self.keys(range, limit).iter().filter_map(|k| self.get(k)).collect()
    }

    /// Streams `(primary key, value)` pairs in the given direction, stopping
    /// when `cb` returns `false`. Built on `keys`/`get` rather than threading
    /// the callback through `key_stream` itself: several `Backend` impls
    /// (`SharedBackend`, `ObjectStore`) hold a lock for the duration of their
    /// `key_stream` call, and invoking `get` from inside that callback would
    /// deadlock on the same mutex.
    fn value_stream(&self, ascending: bool, range: Option<&KeyRange<PrimaryKey>>, cb: &mut dyn FnMut(&PrimaryKey, &V) -> bool) {
        let mut keys = self.keys(range, None);
        if !ascending {
            keys.reverse();
        }
        for key in &keys {
            if let Some(value) = self.get(key) {
                if !cb(key, &value) {
                    break;
                }
            }
        }
    }

    fn count(&self, range: Option<&KeyRange<PrimaryKey>>) -> usize {
        let mut n = 0;
        self.key_stream(true, range, &mut |_| {
            n += 1;
            true
        });
        n
    }

    fn min_keys(&self, range: Option<&KeyRange<PrimaryKey>>) -> Vec<PrimaryKey> {
        let mut out = Vec::new();
        self.key_stream(true, range, &mut |k| {
            out.push(k.clone());
            false
        });
        out
    }

    fn max_keys(&self, range: Option<&KeyRange<PrimaryKey>>) -> Vec<PrimaryKey> {
        let mut out = Vec::new();
        self.key_stream(false, range, &mut |k| {
            out.push(k.clone());
            false
        });
        out
    }

    /// Index names this backend currently maintains.
    fn index_names(&self) -> Vec<String>;

    /// Streams `(secondary key, primary key)` pairs for the named index,
    /// honoring `IndexView`'s contract. The one primitive every other index
    /// read is built from, so composing a `TransactionIndex` on top of any
    /// `Backend` never needs to materialize more than the requested range.
    fn index_key_stream(
        &self,
        index: &str,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) -> CResult<()>;

    fn index_keys(&self, index: &str, range: Option<&KeyRange<IndexKey>>, limit: Option<usize>) -> CResult<Vec<PrimaryKey>> {
        let mut out = Vec::new();
        self.index_key_stream(index, true, range, &mut |_, pk| {
            out.push(pk.clone());
            !limit.is_some_and(|l| out.len() >= l)
        })?;
        Ok(out)
    }

    fn index_count(&self, index: &str, range: Option<&KeyRange<IndexKey>>) -> CResult<usize> {
        let mut n = 0usize;
        self.index_key_stream(index, true, range, &mut |_, _| {
            n += 1;
            true
        })?;
        Ok(n)
    }

    fn index_min_keys(&self, index: &str, range: Option<&KeyRange<IndexKey>>) -> CResult<Vec<PrimaryKey>> {
        let mut out = Vec::new();
        let mut min_key: Option<IndexKey> = None;
        self.index_key_stream(index, true, range, &mut |k, pk| {
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

    fn index_max_keys(&self, index: &str, range: Option<&KeyRange<IndexKey>>) -> CResult<Vec<PrimaryKey>> {
        let mut out = Vec::new();
        let mut max_key: Option<IndexKey> = None;
        self.index_key_stream(index, false, range, &mut |k, pk| {
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

    /// Records matching an index scan, resolved via `get`. Mirrors `values`'s
    /// relationship to `keys`.
    fn index_values(&self, index: &str, range: Option<&KeyRange<IndexKey>>, limit: Option<usize>) -> CResult<Vec<V>> {
        Ok(self.index_keys(index, range, limit)?.iter().filter_map(|k| self.get(k)).collect())
    }

    /// Records sharing the least secondary key in range.
    fn index_min_values(&self, index: &str, range: Option<&KeyRange<IndexKey>>) -> CResult<Vec<V>> {
        Ok(self.index_min_keys(index, range)?.iter().filter_map(|k| self.get(k)).collect())
    }

    /// Records sharing the greatest secondary key in range.
    fn index_max_values(&self, index: &str, range: Option<&KeyRange<IndexKey>>) -> CResult<Vec<V>> {
        Ok(self.index_max_keys(index, range)?.iter().filter_map(|k| self.get(k)).collect())
    }

    /// Resolves `query` (primary scan or named index scan) to primary keys.
    fn query_keys(&self, query: &Query, limit: Option<usize>) -> CResult<Vec<PrimaryKey>> {
        match query {
            Query::Primary(range) => Ok(self.keys(Some(range), limit)),
            Query::Index(name, range) => self.index_keys(name, Some(range), limit),
        }
    }

    fn query_count(&self, query: &Query) -> CResult<usize> {
        match query {
            Query::Primary(range) => Ok(self.count(Some(range))),
            Query::Index(name, range) => self.index_count(name, Some(range)),
        }
    }
}

/// Identifies one atomic write scope spanning every backend participating in
/// a single combined commit (spec.md §4.8 step 4). Every store flushed as
/// part of the same `CombinedTransaction::commit` call shares one scope, so a
/// `PersistentBackend` that does stage real cross-store coordination (a
/// concrete durable backend, out of scope here) has a handle to key it on;
/// the in-memory backend only needs the identity, not the data.
pub struct CommitScope(#[allow(dead_code)] u64);

impl CommitScope {
    pub(crate) fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Additional contract a durable backend implementation must satisfy. Never
/// implemented in this crate (a concrete LSM-tree or memory-mapped B+-tree
/// adapter is out of scope); the engine only consumes it at flush time.
pub trait PersistentBackend<V: Value>: Backend<V> {
    /// Applies one store's flushed deltas as part of a cross-store atomic
    /// write scope (see `CombinedTransaction`). Must not be externally
    /// observable until every participating store's `apply_combined` call in
    /// the same scope has succeeded.
    fn apply_combined(
        &mut self,
        scope: &CommitScope,
        put: &[(PrimaryKey, V)],
        removed: &[PrimaryKey],
        truncated: bool,
    ) -> CResult<()>;

    /// Applies one store's flushed deltas as a standalone atomic write, used
    /// when a leaf transaction flushes outside of a `CombinedTransaction`.
    /// A one-off scope of its own, since nothing else shares this write.
    fn apply_sync(&mut self, put: &[(PrimaryKey, V)], removed: &[PrimaryKey], truncated: bool) -> CResult<()> {
        self.apply_combined(&CommitScope::new(), put, removed, truncated)
    }

    /// Declares a secondary index, backfilling it from existing data if the
    /// backend is non-empty.
    fn create_index(&mut self, descriptor: IndexDescriptor) -> CResult<()>;

    fn delete_index(&mut self, name: &str) -> CResult<()>;

    /// A read-only view pinned to the backend's state at the moment this is
    /// called, independent of whatever `apply_combined`/`apply_sync` calls
    /// happen afterwards. `ObjectStore` takes one whenever a new generation
    /// of root-level transactions begins, so a transaction rooted directly
    /// on the backend keeps its snapshot-isolated view even across a flush
    /// that lands between its creation and a later read.
    fn frozen_view(&self) -> Arc<dyn Backend<V>>;
}
