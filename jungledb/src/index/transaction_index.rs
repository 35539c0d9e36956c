//! Overlays a transaction's in-flight index deltas on top of a parent
//! `IndexView` without materializing the combined set: reads walk the
//! parent's stream, skip any primary key the transaction has touched, and
//! interleave the transaction's own (re-)computed entries in key order.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::index::key_path::{IndexKey, KeyPath};
use crate::index::IndexView;
use crate::key_range::KeyRange;
use crate::query::PrimaryKey;

/// The per-primary-key delta a transaction carries for one index: the value
/// it was put under (`None` if the key was removed in this transaction) and
/// the value it had in the parent view before this transaction touched it
/// (`None` if the key did not exist in the parent, i.e. this is an insert).
pub struct IndexDelta<'a> {
    pub key_path: &'a KeyPath,
    pub multi_entry: bool,
    /// primary key -> (value before this transaction touched it, value after)
    pub touched: &'a BTreeMap<PrimaryKey, (Option<Value>, Option<Value>)>,
    pub truncated: bool,
}

/// A read-only view combining a parent `IndexView` with one transaction's
/// delta. Nested transactions compose by using their own parent transaction
/// as `parent`, so an arbitrarily deep chain streams through each level in
/// turn rather than collapsing into one materialized map.
pub struct TransactionIndex<'a> {
    parent: Box<dyn IndexView + 'a>,
    delta: IndexDelta<'a>,
}

impl<'a> TransactionIndex<'a> {
    pub fn new(parent: impl IndexView + 'a, delta: IndexDelta<'a>) -> Self {
        Self { parent: Box::new(parent), delta }
    }

    fn own_entries(&self, ascending: bool, range: Option<&KeyRange<IndexKey>>) -> Vec<(IndexKey, PrimaryKey)> {
        let mut out = Vec::new();
        if self.delta.truncated {
            // Nothing survives from the parent; only freshly-put keys count.
        }
        for (pk, (_, after)) in self.delta.touched {
            let Some(after) = after else { continue };
            for key in self.delta.key_path.extract_keys(after, self.delta.multi_entry) {
                if range.is_none_or(|r| r.includes(&key)) {
                    out.push((key, pk.clone()));
                }
            }
        }
        out.sort();
        if !ascending {
            out.reverse();
        }
        out
    }

    fn touched_keys(&self) -> BTreeSet<&PrimaryKey> {
        self.delta.touched.keys().collect()
    }
}

impl<'a> IndexView for TransactionIndex<'a> {
    fn key_stream(
        &self,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) {
        let touched = self.touched_keys();
        let own = self.own_entries(ascending, range);
        let mut own_iter = own.into_iter().peekable();

        let mut parent_buf: Vec<(IndexKey, PrimaryKey)> = Vec::new();
        let mut parent_pos = 0usize;
        if !self.delta.truncated {
            self.parent.key_stream(ascending, range, &mut |k, pk| {
                if !touched.contains(pk) {
                    parent_buf.push((k.clone(), pk.clone()));
                }
                true
            });
        }

        // Merge-sort two already-sorted (per `ascending`) sequences.
        let ord_is_before = |a: &IndexKey, b: &IndexKey| if ascending { a < b } else { a > b };
        loop {
            let take_own = match (own_iter.peek(), parent_buf.get(parent_pos)) {
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
                (Some((ok, _)), Some((pk, _))) => ord_is_before(ok, pk) || ok == pk,
            };
            let (key, pk) = if take_own {
                own_iter.next().unwrap()
            } else {
                let v = parent_buf[parent_pos].clone();
                parent_pos += 1;
                v
            };
            if !cb(&key, &pk) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::in_memory_index::{IndexDescriptor, InMemoryIndex};
    use serde_json::json;

    #[test]
    fn overlay_hides_removed_and_shows_new() {
        let mut parent = InMemoryIndex::new(IndexDescriptor::new("idx", KeyPath::single("v"), false, false));
        parent.put(&b"a".to_vec(), &json!({"v": 1}), None).unwrap();
        parent.put(&b"b".to_vec(), &json!({"v": 2}), None).unwrap();

        let key_path = KeyPath::single("v");
        let mut touched = BTreeMap::new();
        touched.insert(b"a".to_vec(), (Some(json!({"v": 1})), None)); // removed in tx
        touched.insert(b"c".to_vec(), (None, Some(json!({"v": 3})))); // inserted in tx

        let delta = IndexDelta { key_path: &key_path, multi_entry: false, touched: &touched, truncated: false };
        let view = TransactionIndex::new(&parent, delta);

        assert_eq!(view.keys(None, None), vec![b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(view.count(None), 2);
    }

    #[test]
    fn truncated_overlay_only_sees_own_entries() {
        let mut parent = InMemoryIndex::new(IndexDescriptor::new("idx", KeyPath::single("v"), false, false));
        parent.put(&b"a".to_vec(), &json!({"v": 1}), None).unwrap();

        let key_path = KeyPath::single("v");
        let mut touched = BTreeMap::new();
        touched.insert(b"z".to_vec(), (None, Some(json!({"v": 9}))));
        let delta = IndexDelta { key_path: &key_path, multi_entry: false, touched: &touched, truncated: true };
        let view = TransactionIndex::new(&parent, delta);

        assert_eq!(view.keys(None, None), vec![b"z".to_vec()]);
    }

    #[test]
    fn min_max_over_combined_view() {
        let mut parent = InMemoryIndex::new(IndexDescriptor::new("idx", KeyPath::single("v"), false, false));
        parent.put(&b"a".to_vec(), &json!({"v": 1}), None).unwrap();
        parent.put(&b"b".to_vec(), &json!({"v": 10}), None).unwrap();

        let key_path = KeyPath::single("v");
        let mut touched = BTreeMap::new();
        touched.insert(b"c".to_vec(), (None, Some(json!({"v": 0}))));
        let delta = IndexDelta { key_path: &key_path, multi_entry: false, touched: &touched, truncated: false };
        let view = TransactionIndex::new(&parent, delta);

        assert_eq!(view.min_keys(None), vec![b"c".to_vec()]);
        assert_eq!(view.max_keys(None), vec![b"b".to_vec()]);
    }
}
