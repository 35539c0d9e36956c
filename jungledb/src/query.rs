//! `Query` composes an index name (or the primary key space) with either a
//! `KeyRange` or an equality value.

use crate::index::key_path::IndexKey;
use crate::key_range::KeyRange;

pub type PrimaryKey = Vec<u8>;

#[derive(Clone, Debug)]
pub enum Query {
    /// A scan over the primary key space.
    Primary(KeyRange<PrimaryKey>),
    /// A scan over the named secondary index. Resolving an unknown index
    /// name is a fatal (usage) error, not an empty result.
    Index(String, KeyRange<IndexKey>),
}

impl Query {
    pub fn primary(range: KeyRange<PrimaryKey>) -> Self {
        Query::Primary(range)
    }

    pub fn eq(index: impl Into<String>, v: impl Into<serde_json::Value>) -> Self {
        Query::Index(index.into(), KeyRange::only(IndexKey(v.into())))
    }

    pub fn within(
        index: impl Into<String>,
        lower: impl Into<serde_json::Value>,
        upper: impl Into<serde_json::Value>,
    ) -> Self {
        Query::Index(
            index.into(),
            KeyRange::bound(IndexKey(lower.into()), IndexKey(upper.into()), false, false),
        )
    }

    pub fn range(
        index: impl Into<String>,
        lower: impl Into<serde_json::Value>,
        upper: impl Into<serde_json::Value>,
        lower_open: bool,
        upper_open: bool,
    ) -> Self {
        Query::Index(
            index.into(),
            KeyRange::bound(IndexKey(lower.into()), IndexKey(upper.into()), lower_open, upper_open),
        )
    }

    pub fn index_name(&self) -> Option<&str> {
        match self {
            Query::Primary(_) => None,
            Query::Index(name, _) => Some(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_builds_only_range() {
        let q = Query::eq("testIndex", 123);
        match q {
            Query::Index(name, range) => {
                assert_eq!(name, "testIndex");
                assert!(range.includes(&IndexKey(123.into())));
                assert!(!range.includes(&IndexKey(124.into())));
            }
            _ => panic!("expected index query"),
        }
    }

    #[test]
    fn within_is_closed_both_sides() {
        let q = Query::within("idx", 1, 10);
        match q {
            Query::Index(_, range) => {
                assert!(range.includes_min());
                assert!(range.includes_max());
            }
            _ => panic!("expected index query"),
        }
    }
}
