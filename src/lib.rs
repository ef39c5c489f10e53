//! slabhash: an intrusive hash table with incremental rehashing, and the
//! slab allocator its entries are typically carved from.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a hash table whose resizing cost is spread over the operations,
//!   over entries the caller owns and places, plus O(1) pooled allocation
//!   for those entries.
//! - Layers (table):
//!   - List<A>: intrusive doubly-linked list; entries embed a `Link` and
//!     detach themselves when dropped.
//!   - Bucket<O>: one chain, unique keys.
//!   - Buckets<O>: a generation, a fixed array of lazily created buckets.
//!   - HashTable<O>: a stack of generations driven by a `SizingStrategy`;
//!     every operation drains, from each retiring generation, the one bucket
//!     its hash lands on.
//! - Layers (memory):
//!   - PageSource: fixed-size pages, from `mmap` or the global allocator.
//!   - ChunkAllocator: slots carved from pages; chunks move between
//!     empty/partial/full lists; the oldest empty chunks are released.
//!   - FreeCachePool: LIFO free list over the global allocator.
//!   - Pooled/PoolBox: per-type pools reached through a per-thread registry.
//!
//! Constraints
//! - Single-threaded: nothing here is `Send` or `Sync` but the plain data.
//! - The table never allocates entries; it only links and unlinks them.
//! - Allocation and release are O(1); table operations are O(1) amortized
//!   plus the scan of one chain.
//!
//! Reentrancy policy
//! - `HashOps` callbacks run while the table is mid-operation; debug builds
//!   panic if one of them re-enters the table.
//! - `PoolBox` drops its value before touching the pool, so values may own
//!   boxes of their own type.
//!
//! Failure policy
//! - Rejected configuration: `ConfigError` from the `try_*` constructors.
//! - Broken invariants (duplicates while rehashing, foreign pointers given to
//!   an allocator, inconsistent metrics, destroying a non-empty chunk):
//!   panics.
//! - Out of memory: `std::alloc::handle_alloc_error`.
//!
//! Notes and non-goals
//! - Element counts are best-effort: entries dropped while linked vanish from
//!   their bucket but stay counted.
//! - No background sweep of retiring generations; an untouched retiring
//!   bucket keeps its generation alive.
//! - Pools live as long as their thread, or until their last box is dropped
//!   when that comes later.

mod bucket;
mod buckets;
pub mod chunk;
mod error;
pub mod free_cache;
mod hash_ops;
mod hash_table;
mod hash_table_proptest;
pub mod list;
mod metrics;
pub mod pages;
pub mod pool;
pub mod registry;
mod reentrancy;
mod sizing;
mod sizing_proptest;

// Public surface
pub use chunk::{ChunkAllocator, ChunkConfig, ChunkGeometry, ChunkKey};
pub use error::ConfigError;
pub use free_cache::FreeCachePool;
pub use hash_ops::{hash_bytes, HashOps, HashValue};
pub use hash_table::HashTable;
pub use list::{Adapter, Link, List};
pub use metrics::{Gauge, PoolGeometry, PoolMetrics};
pub use pages::{DefaultPages, HeapPages, PageSource, PAGE_ALIGN};
#[cfg(unix)]
pub use pages::MmapPages;
pub use pool::{Chunked, FreeCache, PoolBox, PoolStrategy, Pooled, RawPool};
pub use registry::{pool_metrics, reports, PoolReport};
pub use sizing::{SizingStrategy, DEFAULT_GENERATIONS, DEFAULT_LOAD_EXPONENT};
