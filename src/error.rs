//! Error types for the `rehash-dict` crate

use crate::entry::EntryRef;

/// Errors returned by table operations.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum DictError {
    /// Insert of a key that is already present. Carries the existing entry;
    /// the table was not modified.
    #[error("key already exists")]
    AlreadyExists(EntryRef),

    /// Delete (or a handle operation) found no matching live entry.
    #[error("key not found")]
    NotFound,

    /// A resize was not performed. The table keeps working at its current
    /// size; chaining absorbs the extra load.
    #[error("resize refused: {0}")]
    ResizeRefused(RefuseReason),

    /// The bucket array for a `try_expand` could not be allocated.
    ///
    /// Kept apart from `ResizeRefused` so callers can treat memory pressure
    /// differently from policy or sizing refusals.
    #[error("failed to allocate {bytes} bytes for a bucket array")]
    AllocationFailure { bytes: usize },

    /// The table changed structurally while an unsafe iterator was live.
    ///
    /// This is a programmer error. It is raised as a panic when the iterator
    /// is released and must not be caught and continued.
    #[error("unsafe iterator fingerprint mismatch (expected {expected:#018x}, found {found:#018x}): table mutated during unsafe iteration")]
    FingerprintViolation { expected: u64, found: u64 },
}

/// Why a resize was refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum RefuseReason {
    /// An incremental rehash is already in progress.
    #[error("a rehash is already in progress")]
    Rehashing,

    /// The requested size is smaller than the number of stored entries.
    #[error("requested size is below the current occupancy")]
    TooSmall,

    /// The bucket array size or its byte size would overflow.
    #[error("bucket array size overflows")]
    Overflow,

    /// The target size equals the current size.
    #[error("table already has the requested size")]
    SameSize,

    /// The effective resize policy does not allow this resize.
    #[error("resizing is disabled by policy")]
    Policy,
}

impl From<RefuseReason> for DictError {
    fn from(reason: RefuseReason) -> Self {
        DictError::ResizeRefused(reason)
    }
}
