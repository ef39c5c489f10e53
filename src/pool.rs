//! Pooled types and the boxes allocating them from their pool.
//!
//! A type opts into pooling by implementing [`Pooled`], which picks a
//! strategy and its tunables. [`PoolBox`] is then the owning pointer to
//! use instead of `Box`: creating one takes a slot from the pool of its type,
//! dropping one gives the slot back.
//!
//! Pools are created on first use and live as long as the thread, or as
//! long as the last box allocated from them. Being unsynchronized, they are
//! per thread, and boxes cannot change threads.

use crate::chunk::{ChunkAllocator, ChunkConfig, DEFAULT_CHUNK_DATA_SIZE, DEFAULT_MAX_IDLE_CHUNKS};
use crate::free_cache::FreeCachePool;
use crate::metrics::PoolMetrics;
use crate::pages::PageSource;
use crate::registry::{self, PoolHome, PoolOf};
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::ptr::{self, NonNull};

/// Untyped pool of same-sized slots.
pub trait RawPool {
    /// Returns an uninitialized slot.
    fn alloc(&mut self) -> NonNull<u8>;

    /// Returns a slot to the pool.
    ///
    /// #   Safety
    ///
    /// -   `slot` was returned by `alloc` on this pool and is not in use.
    unsafe fn dealloc(&mut self, slot: NonNull<u8>);

    fn metrics(&self) -> PoolMetrics;
}

impl<P: PageSource> RawPool for ChunkAllocator<P> {
    fn alloc(&mut self) -> NonNull<u8> {
        ChunkAllocator::alloc(self)
    }

    unsafe fn dealloc(&mut self, slot: NonNull<u8>) {
        ChunkAllocator::dealloc(self, slot)
    }

    fn metrics(&self) -> PoolMetrics {
        ChunkAllocator::metrics(self)
    }
}

impl RawPool for FreeCachePool {
    fn alloc(&mut self) -> NonNull<u8> {
        FreeCachePool::alloc(self)
    }

    unsafe fn dealloc(&mut self, slot: NonNull<u8>) {
        FreeCachePool::dealloc(self, slot)
    }

    fn metrics(&self) -> PoolMetrics {
        FreeCachePool::metrics(self)
    }
}

/// How the pool of a [`Pooled`] type obtains memory.
pub trait PoolStrategy: 'static {
    type Pool: RawPool + 'static;

    /// Name shown in pool reports.
    const NAME: &'static str;

    /// Builds the pool for `T`.
    fn build<T: Pooled>() -> Self::Pool;
}

/// Slab allocation through a [`ChunkAllocator`].
#[derive(Debug)]
pub enum Chunked {}

impl PoolStrategy for Chunked {
    type Pool = ChunkAllocator;

    const NAME: &'static str = "chunked";

    fn build<T: Pooled>() -> ChunkAllocator {
        ChunkAllocator::for_type::<T>(ChunkConfig {
            chunk_data_size: T::CHUNK_DATA_SIZE,
            max_idle_chunks: T::MAX_IDLE_CHUNKS,
        })
    }
}

/// Unbounded free list in front of the global allocator.
#[derive(Debug)]
pub enum FreeCache {}

impl PoolStrategy for FreeCache {
    type Pool = FreeCachePool;

    const NAME: &'static str = "free_cache";

    fn build<T: Pooled>() -> FreeCachePool {
        FreeCachePool::for_type::<T>()
    }
}

/// A type allocated from a per-type pool through [`PoolBox`].
pub trait Pooled: Sized + 'static {
    type Strategy: PoolStrategy;

    /// Usable bytes per chunk, for chunked pools.
    const CHUNK_DATA_SIZE: usize = DEFAULT_CHUNK_DATA_SIZE;

    /// Empty chunks kept before releasing pages, for chunked pools.
    const MAX_IDLE_CHUNKS: usize = DEFAULT_MAX_IDLE_CHUNKS;
}

/// Owning pointer to a `T` living in the pool of `T`.
///
/// `!Send` and `!Sync`: the slot belongs to the current thread's pool.
/// The box keeps that pool alive, so it may outlive the thread's registry.
pub struct PoolBox<T: Pooled> {
    ptr: NonNull<T>,
    home: NonNull<PoolHome<PoolOf<T>>>,
    _marker: PhantomData<(T, *mut ())>,
}

impl<T: Pooled> PoolBox<T> {
    /// Moves `value` into a slot of the pool of `T`.
    pub fn new(value: T) -> Self {
        let home = registry::home::<T>();
        // Safety: homes handed out by the registry are live.
        let slot = unsafe { home.as_ref() }.alloc().cast::<T>();
        // Safety: the slot is sized and aligned for a `T`, and unused.
        unsafe { slot.as_ptr().write(value) };
        Self {
            ptr: slot,
            home,
            _marker: PhantomData,
        }
    }

    /// Like [`PoolBox::new`], pinned; the value never moves until dropped.
    pub fn pin(value: T) -> Pin<Self> {
        // Safety: the box never moves its value out, but `into_inner`, which
        // a `Pin` only exposes for `T: Unpin`.
        unsafe { Pin::new_unchecked(Self::new(value)) }
    }

    /// Moves the value out, giving the slot back.
    pub fn into_inner(this: Self) -> T {
        let this = mem::ManuallyDrop::new(this);
        // Safety: the value is read once and the slot released right after.
        let value = unsafe { this.ptr.as_ptr().read() };
        this.release();
        value
    }

    /// Address of the value.
    pub fn as_ptr(this: &Self) -> NonNull<T> {
        this.ptr
    }

    fn release(&self) {
        // Safety: the slot came from this home and its value is gone.
        unsafe { PoolHome::release(self.home, self.ptr.cast()) };
    }
}

impl<T: Pooled> Deref for PoolBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the value is initialized until the box goes away.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: Pooled> DerefMut for PoolBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: as for `deref`, and the box is borrowed mutably.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: Pooled> Drop for PoolBox<T> {
    fn drop(&mut self) {
        // Dropped before borrowing the pool: `T` may own boxes of its own type.
        // Safety: the value is initialized and never used again.
        unsafe { ptr::drop_in_place(self.ptr.as_ptr()) };
        self.release();
    }
}

impl<T: Pooled + fmt::Debug> fmt::Debug for PoolBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: Pooled + PartialEq> PartialEq for PoolBox<T> {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}
