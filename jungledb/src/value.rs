//! Bound alias for types storable as record values.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Anything storable as a record value: cloneable for buffering in
/// transaction overlays, and (de)serializable to `serde_json::Value` so key
/// paths can extract secondary keys from it.
pub trait Value: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static> Value for T {}

/// Converts a value to its `serde_json::Value` representation for key path
/// extraction. Returns `Null` (indexable as an absent-everywhere record)
/// if a value somehow fails to serialize through JSON; this should not
/// happen for any reasonable `V`, but key path extraction must never panic.
pub fn to_json<V: Value>(value: &V) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
