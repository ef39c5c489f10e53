//! Configuration errors.
//!
//! Only rejected configuration is reported through `Result`. Broken invariants
//! (duplicate keys while rehashing, foreign pointers handed to an allocator,
//! inconsistent metrics) are programmer errors and panic, and running out of
//! memory goes through `std::alloc::handle_alloc_error`.

use thiserror::Error;

/// Error returned by the `try_*` constructors.
#[derive(Error, Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// The load exponent must be greater than 2.
    #[error("load exponent must be greater than 2, got {0}")]
    LoadExponentTooSmall(usize),

    /// The largest generation would need more buckets than a `usize` can count.
    #[error("load exponent {load_exponent} with {generations} generations overflows the bucket count")]
    LoadExponentTooLarge {
        /// Requested load exponent.
        load_exponent: usize,
        /// Number of sizing generations implied by the requested maximum.
        generations: usize,
    },

    /// Not a single item fits in one chunk.
    #[error("item stride {stride} does not fit in a chunk of {chunk_data_size} bytes")]
    ItemTooLarge {
        /// Bytes taken by one slot (header and payload, aligned).
        stride: usize,
        /// Usable bytes in a chunk.
        chunk_data_size: usize,
    },

    /// The item alignment exceeds what a page guarantees.
    #[error("item alignment {align} exceeds the page alignment {page_align}")]
    AlignmentTooLarge {
        /// Requested item alignment.
        align: usize,
        /// Alignment guaranteed for pages.
        page_align: usize,
    },
}
