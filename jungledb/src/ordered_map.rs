//! An in-memory sorted map with cursor semantics, backing both the volatile
//! backend and every secondary index.
//!
//! Built on `std::collections::BTreeMap`, which already gives us a
//! self-balancing ordered tree and `O(log n)` range queries; `seek`/`skip(1)`
//! are `O(log n)` through `BTreeMap::range`. `BTreeMap` doesn't expose rank
//! (order-statistics) operations, so `goto(n)`/`keynum()` fall back to
//! `O(n)` iteration — the same trade-off the teacher's own `KeyDir` makes
//! for anything beyond point lookups (see `kv/src/storage/log_cask.rs`,
//! which rebuilds its whole keydir with a linear scan on open).

use std::collections::BTreeMap;

/// Direction to resolve an inexact `seek` to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Near {
    /// Only an exact match is accepted.
    None,
    /// The nearest key less-than-or-equal to the target.
    Le,
    /// The nearest key greater-than-or-equal to the target.
    Ge,
}

#[derive(Clone)]
pub struct OrderedMap<K: Ord + Clone, V: Clone> {
    entries: BTreeMap<K, V>,
    cursor: Option<K>,
}

impl<K: Ord + Clone, V: Clone> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V: Clone> OrderedMap<K, V> {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new(), cursor: None }
    }

    /// Number of keys in the map.
    pub fn length(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts `key => rec`. Returns `false` if `key` was already present
    /// (the value is still replaced, matching a map's usual `insert`
    /// semantics; only the presence check is reported to the caller).
    pub fn insert(&mut self, key: K, rec: V) -> bool {
        self.entries.insert(key, rec).is_none()
    }

    /// Removes `key`. On success the cursor advances to the next key >=
    /// the removed one (or is cleared if none remains).
    pub fn remove(&mut self, key: &K) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        self.cursor = self.entries.range(key.clone()..).next().map(|(k, _)| k.clone());
        true
    }

    /// Sets the cursor to `key`, or its nearest neighbor per `near`.
    /// Returns `false` (cursor unchanged) if no such key exists.
    pub fn seek(&mut self, key: &K, near: Near) -> bool {
        let found = match near {
            Near::None => self.entries.contains_key(key).then(|| key.clone()),
            Near::Ge => self.entries.range(key.clone()..).next().map(|(k, _)| k.clone()),
            Near::Le => self.entries.range(..=key.clone()).next_back().map(|(k, _)| k.clone()),
        };
        match found {
            Some(k) => {
                self.cursor = Some(k);
                true
            }
            None => false,
        }
    }

    pub fn go_top(&mut self) -> bool {
        self.cursor = self.entries.keys().next().cloned();
        self.cursor.is_some()
    }

    pub fn go_bottom(&mut self) -> bool {
        self.cursor = self.entries.keys().next_back().cloned();
        self.cursor.is_some()
    }

    /// Moves the cursor by `n` positions, negative values moving backwards.
    /// Returns `false` (cursor unchanged) if the target would fall outside
    /// the map.
    pub fn skip(&mut self, n: i64) -> bool {
        let Some(idx) = self.keynum() else {
            return if n == 0 { false } else { self.skip_from_edge(n) };
        };
        let target = idx as i64 + n;
        if target < 0 || target as usize >= self.entries.len() {
            return false;
        }
        self.goto(target as usize)
    }

    fn skip_from_edge(&mut self, n: i64) -> bool {
        if n > 0 {
            self.goto((n - 1) as usize)
        } else {
            let len = self.entries.len() as i64;
            let target = len + n;
            if target < 0 {
                false
            } else {
                self.goto(target as usize)
            }
        }
    }

    /// Moves the cursor to the `n`-th key (0-based) in ascending order.
    pub fn goto(&mut self, n: usize) -> bool {
        match self.entries.keys().nth(n) {
            Some(k) => {
                self.cursor = Some(k.clone());
                true
            }
            None => false,
        }
    }

    /// The 0-based index of the current cursor key, or `None` if unset.
    pub fn keynum(&self) -> Option<usize> {
        let cur = self.cursor.as_ref()?;
        self.entries.keys().position(|k| k == cur)
    }

    /// Moves the cursor to the first key `>= v` (or `> v` if `open`).
    pub fn go_to_lower_bound(&mut self, v: &K, open: bool) -> bool {
        let range = if open { self.entries.range(v.clone()..) } else { self.entries.range(v.clone()..) };
        let found = if open {
            range.skip_while(|(k, _)| *k == v).next().map(|(k, _)| k.clone())
        } else {
            self.entries.range(v.clone()..).next().map(|(k, _)| k.clone())
        };
        match found {
            Some(k) => {
                self.cursor = Some(k);
                true
            }
            None => false,
        }
    }

    /// Moves the cursor to the last key `<= v` (or `< v` if `open`).
    pub fn go_to_upper_bound(&mut self, v: &K, open: bool) -> bool {
        let found = if open {
            self.entries.range(..v.clone()).next_back().map(|(k, _)| k.clone())
        } else {
            self.entries.range(..=v.clone()).next_back().map(|(k, _)| k.clone())
        };
        match found {
            Some(k) => {
                self.cursor = Some(k);
                true
            }
            None => false,
        }
    }

    pub fn current_key(&self) -> Option<&K> {
        self.cursor.as_ref()
    }

    pub fn current_record(&self) -> Option<&V> {
        let cur = self.cursor.as_ref()?;
        self.entries.get(cur)
    }

    /// Optional rebalance hook. `BTreeMap` is always balanced, so this is a
    /// no-op; kept so callers written against the cursor contract don't need
    /// to special-case the in-memory backend.
    pub fn pack(&mut self) {}

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    pub fn range<R: std::ops::RangeBounds<K>>(
        &self,
        range: R,
    ) -> impl DoubleEndedIterator<Item = (&K, &V)> {
        self.entries.range(range)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> OrderedMap<i32, &'static str> {
        let mut m = OrderedMap::new();
        for (k, v) in [(1, "a"), (3, "b"), (5, "c"), (7, "d")] {
            m.insert(k, v);
        }
        m
    }

    #[test]
    fn insert_reports_new_vs_replace() {
        let mut m = OrderedMap::new();
        assert!(m.insert(1, "a"));
        assert!(!m.insert(1, "b"));
        assert_eq!(m.get(&1), Some(&"b"));
    }

    #[test]
    fn seek_exact_and_near() {
        let mut m = fixture();
        assert!(m.seek(&5, Near::None));
        assert_eq!(m.current_key(), Some(&5));

        assert!(!m.seek(&4, Near::None));

        assert!(m.seek(&4, Near::Ge));
        assert_eq!(m.current_key(), Some(&5));

        assert!(m.seek(&4, Near::Le));
        assert_eq!(m.current_key(), Some(&3));

        assert!(!m.seek(&100, Near::Ge));
        assert!(!m.seek(&0, Near::Le));
    }

    #[test]
    fn skip_forward_and_backward() {
        let mut m = fixture();
        m.go_top();
        assert_eq!(m.current_key(), Some(&1));
        assert!(m.skip(2));
        assert_eq!(m.current_key(), Some(&5));
        assert!(m.skip(-1));
        assert_eq!(m.current_key(), Some(&3));
        assert!(!m.skip(-10));
        assert!(!m.skip(10));
    }

    #[test]
    fn goto_and_keynum_roundtrip() {
        let mut m = fixture();
        assert!(m.goto(2));
        assert_eq!(m.current_key(), Some(&5));
        assert_eq!(m.keynum(), Some(2));
    }

    #[test]
    fn remove_advances_cursor() {
        let mut m = fixture();
        assert!(m.remove(&3));
        assert_eq!(m.current_key(), Some(&5));
        assert_eq!(m.length(), 3);
        assert!(!m.remove(&3));
    }

    #[test]
    fn bounds_navigate_to_edges() {
        let mut m = fixture();
        assert!(m.go_to_lower_bound(&4, false));
        assert_eq!(m.current_key(), Some(&5));
        assert!(m.go_to_lower_bound(&5, true));
        assert_eq!(m.current_key(), Some(&7));

        assert!(m.go_to_upper_bound(&4, false));
        assert_eq!(m.current_key(), Some(&3));
        assert!(m.go_to_upper_bound(&5, true));
        assert_eq!(m.current_key(), Some(&3));
    }
}
