//! rehash-dict: a single-threaded chained hash table that resizes
//! incrementally, with a scan cursor that survives resizes.
//!
//! Internal Design:
//!
//! Summary
//! - `Dict<K, V, D>` keeps two generations of power-of-two bucket arrays.
//!   A resize allocates the new generation and then migrates one bucket at
//!   a time, piggybacked on ordinary operations (`find`, `insert`,
//!   `delete`, `unlink`, `random_entry`, `sample`) or driven explicitly
//!   with `rehash_step` / `rehash_milliseconds`. No single call pays for a
//!   whole-table rehash.
//! - Behavior is parameterized by a `DictType` descriptor: hashing, key
//!   equality, dup/destroy hooks, a growth veto and per-entry metadata.
//!   `HashedKeys` covers ordinary `Hash + Eq` keys.
//!
//! Layout
//! - Entries live in a `slotmap` arena and chain through generational keys;
//!   buckets hold chain heads. Migration relinks entries without moving
//!   them, so `EntryRef` handles stay valid until the entry is deleted.
//! - `tables[0]` is the active generation. While rehashing, `tables[1]` is
//!   the target and `rehash_index()` is the next bucket to migrate; all of
//!   `tables[0]` below it is empty. Inserts go to the target.
//!
//! Iteration
//! - `safe_iter` pauses rehashing for its lifetime and tolerates deleting
//!   the entry it just yielded. `unsafe_iter` fingerprints the table and
//!   panics on release if the structure changed. `iter` borrows the table
//!   and needs neither.
//! - `scan` is stateless: a reverse-binary cursor that reports every entry
//!   present for a whole scan at least once, across any number of resizes.
//!
//! Resize policy
//! - `set_resize_policy` switches all tables between `Enabled`,
//!   `AvoidIfPossible` and `Forbidden`. `DictConfig::resize_policy` pins a
//!   single table instead.
//!
//! Constraints
//! - Single-threaded. Tables are not shared across threads; only the
//!   process-wide policy is atomic.
//! - Unique keys: a duplicate insert fails with the existing entry.
//! - Keys are immutable post-insert; there is no `key_mut`.
//!
//! Logging
//! - Rehash start/finish and refused or failed expansions are reported
//!   through `tracing`. The crate installs no subscriber.

mod config;
mod dict;
mod dict_proptest;
mod dict_type;
mod entry;
mod error;
mod generation;
mod iter;
mod rehash_pause;
mod sample;
mod scan;
mod stats;

// Public surface
pub use config::{resize_policy, set_resize_policy, DictConfig, ResizePolicy};
pub use dict::{Dict, Replaced};
pub use dict_type::{CaseInsensitiveKeys, DictType, HashedKeys};
pub use entry::{EntryRef, UnlinkedEntry, Value};
pub use error::{DictError, RefuseReason};
pub use iter::{DictIterator, Iter};
pub use scan::ScanBucket;
pub use stats::{DictStats, GenerationStats, CHAIN_HISTOGRAM_LEN};
