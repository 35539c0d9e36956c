//! Key paths extract a secondary key from a stored value, and `IndexKey`
//! gives that extracted value (a `serde_json::Value`) the total order the
//! rest of the engine requires.

use serde_json::Value;
use std::cmp::Ordering;

/// A single attribute name, or an ordered sequence of attribute names used
/// to traverse nested records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyPath {
    Single(String),
    Sequence(Vec<String>),
}

impl KeyPath {
    pub fn single(name: impl Into<String>) -> Self {
        KeyPath::Single(name.into())
    }

    pub fn sequence(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        KeyPath::Sequence(names.into_iter().map(Into::into).collect())
    }

    fn components(&self) -> &[String] {
        match self {
            KeyPath::Single(_) => std::slice::from_ref(match self {
                KeyPath::Single(s) => s,
                _ => unreachable!(),
            }),
            KeyPath::Sequence(seq) => seq,
        }
    }

    /// Traverses `value` along this path. Returns `None` ("absent") if any
    /// intermediate attribute is missing — never an error, so that
    /// non-conforming records are simply skipped rather than rejected.
    pub fn extract<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut cur = value;
        for component in self.components() {
            cur = cur.as_object()?.get(component)?;
        }
        Some(cur)
    }

    /// Extracts the secondary key(s) to index for `value`. For a
    /// `multi_entry` index, an array result contributes one key per
    /// element; otherwise the whole extracted value is one key. Returns an
    /// empty vec if the path is absent or the extracted value has no total
    /// order we can index (an object).
    pub fn extract_keys(&self, value: &Value, multi_entry: bool) -> Vec<IndexKey> {
        let Some(found) = self.extract(value) else { return Vec::new() };
        if multi_entry {
            if let Some(arr) = found.as_array() {
                return arr.iter().filter_map(IndexKey::from_value).collect();
            }
        }
        IndexKey::from_value(found).into_iter().collect()
    }
}

/// A totally-ordered wrapper around `serde_json::Value`, used as the key
/// type inside `InMemoryIndex`'s `OrderedMap`. Objects have no natural total
/// order and are treated as non-indexable (callers get `None` from
/// `from_value`, which `KeyPath::extract_keys` treats the same as "absent").
#[derive(Clone, Debug, PartialEq)]
pub struct IndexKey(pub Value);

impl IndexKey {
    pub fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Object(_) => None,
            other => Some(IndexKey(other.clone())),
        }
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders by a fixed type rank first (so that the order is total even
/// across mixed types), then by value within a type.
impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Number(_) => 2,
                Value::String(_) => 3,
                Value::Array(_) => 4,
                Value::Object(_) => 5,
            }
        }
        match (&self.0, &other.0) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                let a: Vec<IndexKey> = a.iter().filter_map(IndexKey::from_value).collect();
                let b: Vec<IndexKey> = b.iter().filter_map(IndexKey::from_value).collect();
                a.cmp(&b)
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_component_path() {
        let path = KeyPath::single("val");
        let v = json!({"val": 123});
        assert_eq!(path.extract(&v), Some(&json!(123)));
    }

    #[test]
    fn nested_path_missing_is_absent() {
        let path = KeyPath::sequence(["a", "b"]);
        assert_eq!(path.extract(&json!({"a": {"b": 1}})), Some(&json!(1)));
        assert_eq!(path.extract(&json!("other")), None);
        assert_eq!(path.extract(&json!({"a": 1})), None);
    }

    #[test]
    fn multi_entry_expands_array() {
        let path = KeyPath::single("tags");
        let v = json!({"tags": ["a", "b", "c"]});
        let keys = path.extract_keys(&v, true);
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn objects_are_not_indexable() {
        assert!(IndexKey::from_value(&json!({"x": 1})).is_none());
    }

    #[test]
    fn total_order_across_types() {
        let mut values = vec![
            IndexKey(json!("b")),
            IndexKey(json!(1)),
            IndexKey(json!(null)),
            IndexKey(json!(true)),
        ];
        values.sort();
        assert_eq!(values[0], IndexKey(json!(null)));
        assert_eq!(values[1], IndexKey(json!(true)));
        assert_eq!(values[2], IndexKey(json!(1)));
        assert_eq!(values[3], IndexKey(json!("b")));
    }
}
