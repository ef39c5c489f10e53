//! FreeCachePool: unbounded cache of released items in front of the global
//! allocator.

use crate::metrics::PoolMetrics;
use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;
use std::alloc;

// Released items are threaded through their first bytes.
type FreeNode = Option<NonNull<u8>>;

/// Compile-time check that values of `T` can hold a free-list node.
pub(crate) struct PoolableSize<T>(PhantomData<T>);

impl<T> PoolableSize<T> {
    pub(crate) const OK: () = assert!(
        mem::size_of::<T>() >= mem::size_of::<FreeNode>(),
        "Refusing to pool small objects"
    );
}

/// LIFO cache of released items; misses go to the global allocator.
///
/// Memory handed back is never returned to the system while the pool lives.
/// Items and bytes are tracked as in a chunked pool, chunks stay at zero.
pub struct FreeCachePool {
    layout: Layout,
    head: FreeNode,
    metrics: PoolMetrics,
}

impl FreeCachePool {
    /// Creates a pool for items of `layout`.
    ///
    /// #   Panics
    ///
    /// If an item cannot hold a free-list node.
    pub fn new(layout: Layout) -> Self {
        assert!(
            layout.size() >= mem::size_of::<FreeNode>(),
            "Refusing to pool small objects"
        );
        let layout = match layout.align_to(mem::align_of::<FreeNode>()) {
            Ok(layout) => layout.pad_to_align(),
            Err(_) => unreachable!("pointer alignment is always valid"),
        };
        Self {
            layout,
            head: None,
            metrics: PoolMetrics::default(),
        }
    }

    /// Creates a pool for values of `T`, refusing small types at compile time.
    pub fn for_type<T>() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = PoolableSize::<T>::OK;
        Self::new(Layout::new::<T>())
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.metrics
    }

    /// Returns an uninitialized item, reusing the last released one if any.
    pub fn alloc(&mut self) -> NonNull<u8> {
        match self.head {
            Some(item) => {
                // Safety: cached items hold the next cached item.
                self.head = unsafe { item.as_ptr().cast::<FreeNode>().read() };
                self.metrics.item_transition(false, true, self.layout.size());
                item
            }
            None => {
                // Safety: the layout is at least a pointer wide.
                let ptr = unsafe { alloc::alloc(self.layout) };
                let Some(item) = NonNull::new(ptr) else {
                    alloc::handle_alloc_error(self.layout);
                };
                self.metrics.item_transition(true, true, self.layout.size());
                item
            }
        }
    }

    /// Caches `item` for the next `alloc`.
    ///
    /// #   Safety
    ///
    /// -   `item` was returned by `alloc` on this pool and not deallocated
    ///     since.
    /// -   Whatever lived in the item is dead, it is overwritten.
    pub unsafe fn dealloc(&mut self, item: NonNull<u8>) {
        item.as_ptr().cast::<FreeNode>().write(self.head);
        self.head = Some(item);
        self.metrics.item_transition(false, false, self.layout.size());
    }

    /// Gives every cached item back to the global allocator.
    pub fn purge(&mut self) {
        while let Some(item) = self.head {
            // Safety: cached items hold the next cached item, and came from
            // the global allocator with this layout.
            unsafe {
                self.head = item.as_ptr().cast::<FreeNode>().read();
                alloc::dealloc(item.as_ptr(), self.layout);
            }
            self.metrics.item_transition(true, false, self.layout.size());
        }
    }
}

impl Drop for FreeCachePool {
    fn drop(&mut self) {
        self.purge();
        let live = self.metrics.items.used();
        if live > 0 {
            log::warn!(
                "dropping a free-cache pool with {live} live items of {} bytes",
                self.layout.size()
            );
        }
    }
}

impl fmt::Debug for FreeCachePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeCachePool")
            .field("layout", &self.layout)
            .field("metrics", &self.metrics)
            .finish()
    }
}
