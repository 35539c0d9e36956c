//! Error types for the transactional engine.
//!
//! Mirrors the taxonomy a caller needs to drive retry/abort decisions:
//! usage mistakes are immediate and leave state untouched, uniqueness
//! violations and optimistic conflicts are expected outcomes of concurrent
//! access, and backend/schema errors wrap failures from the pluggable
//! persistence layer.

use std::fmt;

/// The result type used throughout the crate.
pub type CResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Invalid argument, operation on a closed/non-open transaction,
    /// unknown index name, or similar caller mistake. Transaction state is
    /// left unchanged.
    Usage(String),

    /// A `put` would create two primary keys for one secondary key in a
    /// `unique` index. The caller's transaction must be aborted.
    UniquenessViolation(String),

    /// `commit()` found that the parent had already advanced. The
    /// transaction moves to `CONFLICTED` with no other side effects.
    OptimisticConflict(String),

    /// A wrapped failure from the persistent backend.
    Backend(String),

    /// A structural operation (create/drop store/index) was attempted
    /// while connected, or otherwise violates schema rules.
    Schema(String),

    /// Catch-all for unexpected internal failures (serialization bugs,
    /// invariant breaks) that don't fit the categories above.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Usage(s) => write!(f, "usage error: {s}"),
            Error::UniquenessViolation(s) => write!(f, "uniqueness violation: {s}"),
            Error::OptimisticConflict(s) => write!(f, "optimistic conflict: {s}"),
            Error::Backend(s) => write!(f, "backend error: {s}"),
            Error::Schema(s) => write!(f, "schema error: {s}"),
            Error::Internal(s) => write!(f, "internal error: {s}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
