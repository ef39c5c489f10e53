//! ChunkAllocator: slab allocator for items of a single layout.
//!
//! Items are carved from fixed-size pages ("chunks"). Every slot starts with
//! a header followed by the item:
//!
//! - An allocated slot's header holds the key of its chunk, so deallocation
//!   finds the owner in O(1) and can check the pointer really belongs to it.
//! - An idle slot's header threads the chunk's idle list instead.
//!
//! Chunks live in a [`SlotMap`] and sit in exactly one of three lists
//! according to their idle count: empty (all idle), partial, full (none idle).
//! Allocation prefers a partial chunk, then an empty one, then a new one.
//! Once more than `max_idle_chunks` chunks are empty, the one that has been
//! empty the longest is destroyed and its page released.

use crate::error::ConfigError;
use crate::metrics::{PoolGeometry, PoolMetrics};
use crate::pages::{DefaultPages, PageSource, PAGE_ALIGN};
use core::alloc::Layout;
use core::fmt;
use core::mem;
use core::ptr::NonNull;
use slotmap::{new_key_type, Key, KeyData, SlotMap};

new_key_type! {
    /// Key of a chunk within its allocator.
    pub struct ChunkKey;
}

/// Default usable bytes per chunk.
pub const DEFAULT_CHUNK_DATA_SIZE: usize = 16 * 1024;

/// Default number of empty chunks kept around before releasing pages.
pub const DEFAULT_MAX_IDLE_CHUNKS: usize = 4;

/// Tunables of a [`ChunkAllocator`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChunkConfig {
    /// Usable bytes per chunk, i.e. the page size.
    pub chunk_data_size: usize,
    /// Empty chunks kept before the oldest one is released.
    pub max_idle_chunks: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_data_size: DEFAULT_CHUNK_DATA_SIZE,
            max_idle_chunks: DEFAULT_MAX_IDLE_CHUNKS,
        }
    }
}

/// Slot layout within a chunk.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChunkGeometry {
    /// Offset of the item within its slot.
    pub item_offset: usize,
    /// Distance between two slots.
    pub stride: usize,
    pub items_per_chunk: usize,
    pub chunk_data_size: usize,
    /// Page plus chunk bookkeeping.
    pub bytes_per_chunk: usize,
}

// Header of a slot; the owner's key while allocated, the next idle slot
// while idle. Keys are stored in their FFI form, any bit pattern reads back
// as some key.
#[repr(C)]
union SlotHeader {
    key: u64,
    next: Option<NonNull<u8>>,
}

impl ChunkGeometry {
    /// Computes the geometry for items of `layout` in chunks of
    /// `chunk_data_size` bytes.
    pub fn new(layout: Layout, chunk_data_size: usize) -> Result<Self, ConfigError> {
        if layout.align() > PAGE_ALIGN {
            return Err(ConfigError::AlignmentTooLarge {
                align: layout.align(),
                page_align: PAGE_ALIGN,
            });
        }

        let slot_align = layout.align().max(mem::align_of::<SlotHeader>());
        let item_offset = round_up(mem::size_of::<SlotHeader>(), layout.align());
        let stride = round_up(item_offset + layout.size(), slot_align);
        let items_per_chunk = chunk_data_size / stride;
        if items_per_chunk == 0 {
            return Err(ConfigError::ItemTooLarge {
                stride,
                chunk_data_size,
            });
        }

        Ok(Self {
            item_offset,
            stride,
            items_per_chunk,
            chunk_data_size,
            bytes_per_chunk: chunk_data_size + mem::size_of::<Chunk>(),
        })
    }

    fn pool_geometry(&self) -> PoolGeometry {
        PoolGeometry {
            item_size: self.stride,
            items_per_chunk: self.items_per_chunk,
            bytes_per_chunk: self.bytes_per_chunk,
        }
    }
}

fn round_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ChunkState {
    Empty = 0,
    Partial = 1,
    Full = 2,
}

struct Chunk {
    page: NonNull<u8>,
    // Slots handed back, threaded through their headers.
    idle_head: Option<NonNull<u8>>,
    // Slots below `carved` have been handed out at least once.
    carved: usize,
    idle: usize,
    state: ChunkState,
    prev: Option<ChunkKey>,
    next: Option<ChunkKey>,
}

#[derive(Copy, Clone, Debug, Default)]
struct ChunkList {
    head: Option<ChunkKey>,
    tail: Option<ChunkKey>,
    len: usize,
}

/// Slab allocator handing out slots for items of one layout.
///
/// Not thread-safe; `alloc` and `dealloc` are O(1).
pub struct ChunkAllocator<P: PageSource = DefaultPages> {
    geometry: ChunkGeometry,
    config: ChunkConfig,
    pages: P,
    chunks: SlotMap<ChunkKey, Chunk>,
    lists: [ChunkList; 3],
    metrics: PoolMetrics,
}

impl<P: PageSource> ChunkAllocator<P> {
    /// Creates an allocator for items of `layout`.
    ///
    /// #   Panics
    ///
    /// If the configuration is rejected by [`ChunkAllocator::try_new`].
    pub fn new(layout: Layout, config: ChunkConfig) -> Self {
        match Self::try_new(layout, config) {
            Ok(allocator) => allocator,
            Err(e) => panic!("ChunkAllocator: {e}"),
        }
    }

    /// Creates an allocator for items of `layout`, failing when not a single
    /// item fits in a chunk or the items need more than page alignment.
    pub fn try_new(layout: Layout, config: ChunkConfig) -> Result<Self, ConfigError> {
        let geometry = ChunkGeometry::new(layout, config.chunk_data_size)?;
        Ok(Self {
            geometry,
            config,
            pages: P::with_page_size(config.chunk_data_size),
            chunks: SlotMap::with_key(),
            lists: [ChunkList::default(); 3],
            metrics: PoolMetrics::default(),
        })
    }

    /// Creates an allocator for values of `T`.
    pub fn for_type<T>(config: ChunkConfig) -> Self {
        Self::new(Layout::new::<T>(), config)
    }

    pub fn geometry(&self) -> &ChunkGeometry {
        &self.geometry
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.metrics
    }

    /// Number of `(empty, partial, full)` chunks.
    pub fn chunk_counts(&self) -> (usize, usize, usize) {
        (
            self.list(ChunkState::Empty).len,
            self.list(ChunkState::Partial).len,
            self.list(ChunkState::Full).len,
        )
    }

    /// Returns an uninitialized slot for one item.
    pub fn alloc(&mut self) -> NonNull<u8> {
        let (key, new_chunk) = match self
            .list(ChunkState::Partial)
            .head
            .or(self.list(ChunkState::Empty).tail)
        {
            Some(key) => (key, false),
            None => (self.create_chunk(), true),
        };

        let (slot, was_empty) = self.take_slot(key);
        self.metrics
            .allocated(new_chunk, was_empty, &self.geometry.pool_geometry());

        // Safety: the slot lies within a live page and is header-aligned.
        unsafe {
            slot.as_ptr().cast::<SlotHeader>().write(SlotHeader {
                key: key.data().as_ffi(),
            });
            NonNull::new_unchecked(slot.as_ptr().add(self.geometry.item_offset))
        }
    }

    /// Returns the slot of `item` to its chunk.
    ///
    /// #   Panics
    ///
    /// If `item` does not point at an allocated slot of this allocator, as far
    /// as it can tell.
    ///
    /// #   Safety
    ///
    /// -   `item` was returned by `alloc` on this allocator and not deallocated
    ///     since.
    /// -   Whatever lived in the slot is dead, it is overwritten.
    pub unsafe fn dealloc(&mut self, item: NonNull<u8>) {
        let slot = item.as_ptr().wrapping_sub(self.geometry.item_offset);
        let key = self.owner(slot);

        let geometry = self.geometry;
        let Some(chunk) = self.chunks.get_mut(key) else {
            unreachable!("owner was just validated");
        };

        slot.cast::<SlotHeader>().write(SlotHeader {
            next: chunk.idle_head,
        });
        chunk.idle_head = NonNull::new(slot);
        chunk.idle += 1;
        let idle = chunk.idle;

        let chunk_idled = idle == geometry.items_per_chunk;
        if chunk_idled {
            self.move_to(key, ChunkState::Empty);
        } else if idle == 1 {
            self.move_to(key, ChunkState::Partial);
        }

        let mut chunk_freed = false;
        if chunk_idled && self.list(ChunkState::Empty).len > self.config.max_idle_chunks {
            if let Some(oldest) = self.list(ChunkState::Empty).head {
                self.destroy_chunk(oldest);
                chunk_freed = true;
            }
        }

        self.metrics
            .deallocated(chunk_freed, chunk_idled, &geometry.pool_geometry());
    }

    // Validates the header of `slot` and returns the chunk it names.
    fn owner(&self, slot: *mut u8) -> ChunkKey {
        // Safety (read): caller contract of `dealloc`, the slot is allocated.
        let raw = unsafe { slot.cast::<SlotHeader>().read().key };
        let key = ChunkKey::from(KeyData::from_ffi(raw));
        let chunk = match self.chunks.get(key) {
            Some(chunk) => chunk,
            None => panic!("dealloc called with a pointer this allocator does not own"),
        };

        let offset = (slot as usize).wrapping_sub(chunk.page.as_ptr() as usize);
        assert!(
            offset < chunk.carved * self.geometry.stride && offset % self.geometry.stride == 0,
            "dealloc called with a pointer this allocator does not own"
        );
        key
    }

    fn take_slot(&mut self, key: ChunkKey) -> (NonNull<u8>, bool) {
        let geometry = self.geometry;
        let Some(chunk) = self.chunks.get_mut(key) else {
            unreachable!("listed chunk is missing");
        };
        assert!(chunk.idle > 0, "allocating from a full chunk");

        let was_empty = chunk.idle == geometry.items_per_chunk;
        let slot = match chunk.idle_head {
            Some(slot) => {
                // Safety: idle slots hold the next idle slot in their header.
                chunk.idle_head = unsafe { slot.as_ptr().cast::<SlotHeader>().read().next };
                slot
            }
            None => {
                // Safety: `carved < items_per_chunk` since a slot is idle.
                let slot = unsafe { chunk.page.as_ptr().add(chunk.carved * geometry.stride) };
                chunk.carved += 1;
                // Safety: derived from a non-null page pointer.
                unsafe { NonNull::new_unchecked(slot) }
            }
        };
        chunk.idle -= 1;
        let idle = chunk.idle;

        if idle == 0 {
            self.move_to(key, ChunkState::Full);
        } else if was_empty {
            self.move_to(key, ChunkState::Partial);
        }
        (slot, was_empty)
    }

    fn create_chunk(&mut self) -> ChunkKey {
        let page = self.pages.alloc_page();
        let key = self.chunks.insert(Chunk {
            page,
            idle_head: None,
            carved: 0,
            idle: self.geometry.items_per_chunk,
            state: ChunkState::Empty,
            prev: None,
            next: None,
        });
        self.push_back(key, ChunkState::Empty);
        log::debug!(
            "created chunk {key:?} ({} items of {} bytes)",
            self.geometry.items_per_chunk,
            self.geometry.stride
        );
        key
    }

    fn destroy_chunk(&mut self, key: ChunkKey) {
        self.unlink(key);
        let Some(chunk) = self.chunks.remove(key) else {
            unreachable!("destroying a missing chunk");
        };
        assert_eq!(
            chunk.idle, self.geometry.items_per_chunk,
            "destroying a non-empty chunk"
        );
        // Safety: the page came from this source and no item lives in it.
        unsafe { self.pages.free_page(chunk.page) };
        log::debug!("released chunk {key:?}");
    }

    fn list(&self, state: ChunkState) -> &ChunkList {
        &self.lists[state as usize]
    }

    fn move_to(&mut self, key: ChunkKey, state: ChunkState) {
        self.unlink(key);
        self.push_back(key, state);
    }

    fn push_back(&mut self, key: ChunkKey, state: ChunkState) {
        let list = &mut self.lists[state as usize];
        let prev = list.tail.replace(key);
        match prev {
            Some(tail) => self.chunks[tail].next = Some(key),
            None => list.head = Some(key),
        }
        list.len += 1;

        let chunk = &mut self.chunks[key];
        chunk.state = state;
        chunk.prev = prev;
        chunk.next = None;
    }

    fn unlink(&mut self, key: ChunkKey) {
        let chunk = &mut self.chunks[key];
        let (prev, next, state) = (chunk.prev.take(), chunk.next.take(), chunk.state);
        let list = &mut self.lists[state as usize];

        match prev {
            Some(p) => self.chunks[p].next = next,
            None => list.head = next,
        }
        match next {
            Some(n) => self.chunks[n].prev = prev,
            None => list.tail = prev,
        }
        list.len -= 1;
    }
}

impl<P: PageSource> Drop for ChunkAllocator<P> {
    fn drop(&mut self) {
        let live = self.metrics.items.used();
        if live > 0 {
            log::warn!(
                "dropping a chunk allocator with {live} live items of {} bytes",
                self.geometry.stride
            );
        }
        for (_, chunk) in self.chunks.drain() {
            // Safety: the allocator is going away, and with it every slot.
            unsafe { self.pages.free_page(chunk.page) };
        }
    }
}

impl<P: PageSource> fmt::Debug for ChunkAllocator<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkAllocator")
            .field("geometry", &self.geometry)
            .field("chunk_counts", &self.chunk_counts())
            .field("metrics", &self.metrics)
            .finish()
    }
}
