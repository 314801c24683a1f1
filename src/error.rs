//! Error taxonomy (spec.md §7).
//!
//! Only *resource exhaustion* is a recoverable, `Result`-returning failure
//! mode here. Usage errors and consistency violations are fatal by
//! construction (`panic!`/`debug_assert!`); transport and signal failures
//! abort the process from [`crate::signal`]. See `SPEC_FULL.md` §7.

use thiserror::Error;

/// Failures that are surfaced to the caller rather than treated as fatal.
#[derive(Debug, Error)]
pub enum Error {
    /// All cache blocks are pinned; eviction could not free a slot.
    ///
    /// Per spec.md §4.2: "On allocation failure (all blocks pinned),
    /// eviction fails and the caller must retry after releasing
    /// checkouts."
    #[error("cache exhausted: all {pinned} of {capacity} blocks are pinned")]
    CacheExhausted { pinned: usize, capacity: usize },

    /// The home process could not satisfy a global allocation request.
    #[error("out of memory: failed to allocate {nelems} elements of size {elem_size}")]
    OutOfMemory { nelems: u64, elem_size: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
