//! An embedded transactional key/value storage library with secondary
//! indices. A `JungleDB` owns a set of `ObjectStore`s, each backed by a
//! pluggable `Backend`; reads and writes go through snapshot-isolated,
//! optimistic `Transaction`s that may nest and may commit atomically across
//! stores via a `CombinedTransaction`.

pub mod backend;
pub mod combined_transaction;
pub mod database;
pub mod error;
pub mod index;
pub mod index_handle;
pub mod key_range;
pub mod object_store;
pub mod ordered_map;
pub mod query;
pub mod snapshot;
pub mod synchronizer;
pub mod transaction;
pub mod value;

pub use combined_transaction::CombinedTransaction;
pub use database::JungleDB;
pub use error::{CResult, Error};
pub use index::in_memory_index::IndexDescriptor;
pub use index_handle::IndexHandle;
pub use key_range::KeyRange;
pub use object_store::{ObjectStore, ObjectStoreOptions, UpgradeCondition};
pub use ordered_map::{Near, OrderedMap};
pub use query::{PrimaryKey, Query};
pub use snapshot::Snapshot;
pub use synchronizer::Synchronizer;
pub use transaction::Transaction;
pub use value::Value;
