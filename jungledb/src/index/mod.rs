pub mod in_memory_index;
pub mod key_path;
pub mod persistent_index;
pub mod transaction_index;

use crate::index::key_path::IndexKey;
use crate::key_range::KeyRange;
use crate::query::PrimaryKey;

/// Common read contract shared by `InMemoryIndex` and `TransactionIndex`:
/// iterate `(secondary key, primary key)` pairs for a range, in a
/// direction. Every other read operation (`keys`, `count`, `min_keys`,
/// `max_keys`) is defined generically on top of this one primitive, so a
/// `TransactionIndex` only has to know how to stream its own delta plus
/// delegate to its parent's stream — it never has to materialize the
/// parent's full index to answer a query.
pub trait IndexView {
    fn key_stream(
        &self,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    );

    fn keys(&self, range: Option<&KeyRange<IndexKey>>, limit: Option<usize>) -> Vec<PrimaryKey> {
        let mut out = Vec::new();
        self.key_stream(true, range, &mut |_, pk| {
            out.push(pk.clone());
            !limit.is_some_and(|l| out.len() >= l)
        });
        out
    }

    fn count(&self, range: Option<&KeyRange<IndexKey>>) -> usize {
        let mut n = 0usize;
        self.key_stream(true, range, &mut |_, _| {
            n += 1;
            true
        });
        n
    }

    /// All primary keys sharing the index's least secondary key in `range`.
    fn min_keys(&self, range: Option<&KeyRange<IndexKey>>) -> Vec<PrimaryKey> {
        let mut out = Vec::new();
        let mut min_key: Option<IndexKey> = None;
        self.key_stream(true, range, &mut |k, pk| {
            match &min_key {
                None => {
                    min_key = Some(k.clone());
                    out.push(pk.clone());
                }
                Some(m) if k == m => out.push(pk.clone()),
                Some(_) => return false,
            }
            true
        });
        out
    }

    /// All primary keys sharing the index's greatest secondary key in `range`.
    fn max_keys(&self, range: Option<&KeyRange<IndexKey>>) -> Vec<PrimaryKey> {
        let mut out = Vec::new();
        let mut max_key: Option<IndexKey> = None;
        self.key_stream(false, range, &mut |k, pk| {
            match &max_key {
                None => {
                    max_key = Some(k.clone());
                    out.push(pk.clone());
                }
                Some(m) if k == m => out.push(pk.clone()),
                Some(_) => return false,
            }
            true
        });
        out.reverse();
        out
    }
}

impl<'x, T: IndexView + ?Sized> IndexView for &'x T {
    fn key_stream(
        &self,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) {
        (**self).key_stream(ascending, range, cb)
    }
}

impl<T: IndexView + ?Sized> IndexView for Box<T> {
    fn key_stream(
        &self,
        ascending: bool,
        range: Option<&KeyRange<IndexKey>>,
        cb: &mut dyn FnMut(&IndexKey, &PrimaryKey) -> bool,
    ) {
        (**self).key_stream(ascending, range, cb)
    }
}
