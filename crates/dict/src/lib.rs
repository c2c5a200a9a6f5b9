//! Chained hash table with incremental rehashing.
//!
//! A [`Dict`] keeps two bucket tables. Growing or shrinking allocates the
//! second table and entries migrate into it a few buckets at a time, either
//! piggybacked on ordinary calls or driven explicitly through
//! [`Dict::rehash`] and [`Dict::rehash_for`], so no single call pays for a
//! full rehash.
//!
//! Key and value behavior (hashing, comparison, duplication, destruction) is
//! supplied by a [`DictType`] descriptor that many dicts can share.
mod config;
mod dict;
mod entry;
mod hash_table;
mod iter;
mod rehash;
mod sample;
mod scan;
mod stats;
mod types;

use thiserror::Error;

pub use config::{
    DictConfig, disable_resize, enable_resize, gen_case_hash_function, gen_hash_function,
    get_hash_seed, set_hash_seed,
};
pub use dict::{AddRaw, Dict, DictEntry};
pub use entry::{Entry, EntryId, Value};
pub use hash_table::INITIAL_SIZE;
pub use iter::{DictIterator, Iter};
pub use scan::BucketMut;
pub use types::{DictType, HeapStrings, NoCaseStrings};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DictError {
    /// `add` on a key that is already present
    #[error("key already exists")]
    KeyExists,

    /// `delete` on a key that is not present
    #[error("key not found")]
    KeyNotFound,

    /// Requested table size cannot hold the current entries,
    /// or is the size the table already has
    #[error("invalid table size {size} for {used} entries")]
    InvalidSize { size: usize, used: usize },

    /// Administrative resize while resizing is disabled.
    ///
    /// The one invalid resize request kept apart from
    /// [`DictError::InvalidSize`]: the same size is accepted once resizing is
    /// enabled again.
    #[error("resizing is disabled")]
    ResizeDisabled,

    /// A new resize was requested before the previous one finished
    #[error("rehash already in progress")]
    RehashInProgress,

    /// The dict changed while an unsafe iterator was open.
    /// Never returned: raised as a panic on iterator release.
    #[error(
        "unsafe iterator fingerprint mismatch (expected {expected:#x}, found {found:#x}): dict mutated during unsafe iteration"
    )]
    IteratorMisuse { expected: u64, found: u64 },
}
