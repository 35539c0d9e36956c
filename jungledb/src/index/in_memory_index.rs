//! A single secondary index: a `B+Tree`-shaped map from secondary key to the
//! primary key(s) that produce it, maintained incrementally as records are
//! put/removed/truncated.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::{CResult, Error};
use crate::index::key_path::{IndexKey, KeyPath};
use crate::key_range::KeyRange;
use crate::ordered_map::OrderedMap;
use crate::query::PrimaryKey;

#[derive(Clone, Debug)]
pub struct IndexDescriptor {
    pub name: String,
    pub key_path: KeyPath,
    pub multi_entry: bool,
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>, key_path: KeyPath, multi_entry: bool, unique: bool) -> Self {
        Self { name: name.into(), key_path, multi_entry, unique }
    }
}

/// Maintains a secondary key -> primary key set mapping for one index.
#[derive(Clone)]
pub struct InMemoryIndex {
    pub descriptor: IndexDescriptor,
    map: OrderedMap<IndexKey, BTreeSet<PrimaryKey>>,
}

impl InMemoryIndex {
    pub fn new(descriptor: IndexDescriptor) -> Self {
        Self { descriptor, map: OrderedMap::new() }
    }

    /// Indexes `new_value` under `primary_key`, first retracting
    /// `old_value`'s contribution if this is an update rather than an
    /// insert. Fails with `UniquenessViolation` if a `unique` index would
    /// end up mapping one secondary key to two distinct primary keys; the
    /// index is left unmodified for the keys that would have conflicted,
    /// but any keys already applied before the conflict was found are not
    /// rolled back here — the caller (a `Transaction`) aborts instead, per
    /// spec.
    pub fn put(&mut self, primary_key: &PrimaryKey, new_value: &Value, old_value: Option<&Value>) -> CResult<()> {
        if let Some(old) = old_value {
            self.retract(primary_key, old);
        }
        let new_keys = self.descriptor.key_path.extract_keys(new_value, self.descriptor.multi_entry);
        for key in new_keys {
            if self.descriptor.unique {
                if let Some(existing) = self.map.get(&key) {
                    if existing.iter().any(|pk| pk != primary_key) {
                        return Err(Error::UniquenessViolation(format!(
                            "index {:?}: secondary key already maps to a different primary key",
                            self.descriptor.name
                        )));
                    }
                }
            }
            if let Some(set) = self.map.get(&key).cloned() {
                let mut set = set;
                set.insert(primary_key.clone());
                self.map.insert(key, set);
            } else {
                let mut set = BTreeSet::new();
                set.insert(primary_key.clone());
                self.map.insert(key, set);
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, primary_key: &PrimaryKey, old_value: &Value) {
        self.retract(primary_key, old_value);
    }

    fn retract(&mut self, primary_key: &PrimaryKey, old_value: &Value) {
        let old_keys = self.descriptor.key_path.extract_keys(old_value, self.descriptor.multi_entry);
        for key in old_keys {
            if let Some(mut set) = self.map.get(&key).cloned() {
                set.remove(primary_key);
                if set.is_empty() {
                    self.map.remove(&key);
                } else {
                    self.map.insert(key, set);
                }
            }
        }
    }

    pub fn truncate(&mut self) {
        self.map.clear();
    }

    fn iter_range<'a>(
        &'a self,
        range: Option<&KeyRange<IndexKey>>,
    ) -> Box<dyn DoubleEndedIterator<Item = (&'a IndexKey, &'a BTreeSet<PrimaryKey>)> + 'a> {
        match range {
            None => Box::new(self.map.iter()),
            Some(r) => Box::new(self.map.range(r.as_bounds())),
        }
    }

    /// Primary keys in `range`, ordered by secondary key then primary key.
    pub fn keys(&self, range: Option<&KeyRange<IndexKey>>, limit: Option<usize>) -> Vec<PrimaryKey> {
        let mut out = Vec::new();
        for (_, set) in self.iter_range(range) {
            for pk in set {
                out.push(pk.clone());
                if limit.is_some_and(|l| out.len() >= l) {
                    return out;
                }
            }
        }
        out
    }

    pub fn count(&self, range: Option<&KeyRange<IndexKey>>) -> usize {
        self.iter_range(range).map(|(_, set)| set.len()).sum()
    }

    /// All primary keys sharing the least secondary key in `range`.
    pub fn min_keys(&self, range: Option<&KeyRange<IndexKey>>) -> Vec<PrimaryKey> {
        self.iter_range(range).next().map(|(_, set)| set.iter().cloned().collect()).unwrap_or_default()
    }

    /// All primary keys sharing the greatest secondary key in `range`.
    pub fn max_keys(&self, range: Option<&KeyRange<IndexKey>>) -> Vec<PrimaryKey> {
        self.iter_range(range).next_back().map(|(_, set)| set.iter().cloned().collect()).unwrap_or_default()
    }

    /// Iterates `(secondary key, primary key)` pairs in the requested
    /// direction, stopping when `cb` returns `false`.
    pub fn key_stream(
        &self,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        mut cb: impl FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) {
        let mut iter = self.iter_range(range);
        loop {
            let next = if ascending { iter.next() } else { iter.next_back() };
            let Some((key, set)) = next else { break };
            let mut keep_going = true;
            for pk in set {
                if !cb(key, pk) {
                    keep_going = false;
                    break;
                }
            }
            if !keep_going {
                break;
            }
        }
    }
}

impl crate::index::IndexView for InMemoryIndex {
    fn key_stream(
        &self,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) {
        let mut iter = self.iter_range(range);
        loop {
            let next = if ascending { iter.next() } else { iter.next_back() };
            let Some((key, set)) = next else { break };
            let mut keep_going = true;
            for pk in set {
                if !cb(key, pk) {
                    keep_going = false;
                    break;
                }
            }
            if !keep_going {
                break;
            }
        }
    }
}
