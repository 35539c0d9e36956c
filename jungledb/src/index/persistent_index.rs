//! The contract a persistent backend's secondary-index adapter must satisfy.
//! Consumed by the core engine at flush time; never defined/implemented
//! here, since concrete persistent backends (an LSM tree, a memory-mapped
//! B+Tree) are out of scope (spec.md §1, §6).

use crate::error::CResult;
use crate::index::key_path::IndexKey;
use crate::key_range::KeyRange;
use crate::query::PrimaryKey;

/// What the engine needs from a persistent index implementation in order to
/// maintain it during a flush and answer reads once `InMemoryIndex`'s
/// buffered view has been absorbed into the backend.
pub trait PersistentIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Applies the net effect of a flushed transaction's index deltas.
    fn apply(&mut self, put: &[(PrimaryKey, serde_json::Value)], removed: &[PrimaryKey]) -> CResult<()>;

    fn truncate(&mut self) -> CResult<()>;

    fn keys(&self, range: Option<&KeyRange<IndexKey>>, limit: Option<usize>) -> CResult<Vec<PrimaryKey>>;

    fn count(&self, range: Option<&KeyRange<IndexKey>>) -> CResult<usize>;
}
