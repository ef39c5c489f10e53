//! Providers of the fixed-size pages chunks are carved from.

use core::ptr::NonNull;
use std::alloc::{self, Layout};

/// Alignment every [`PageSource`] guarantees for the pages it hands out.
pub const PAGE_ALIGN: usize = 4096;

/// Source of fixed-size, [`PAGE_ALIGN`]-aligned memory pages.
///
/// Running out of memory is not reported: implementations abort through
/// [`handle_alloc_error`](std::alloc::handle_alloc_error).
pub trait PageSource {
    /// Creates a source of `page_size`-byte pages. `page_size` is non-zero.
    fn with_page_size(page_size: usize) -> Self
    where
        Self: Sized;

    fn page_size(&self) -> usize;

    /// Returns a fresh page, its contents unspecified.
    fn alloc_page(&mut self) -> NonNull<u8>;

    /// Returns `page` to the source.
    ///
    /// #   Safety
    ///
    /// -   `page` was returned by `alloc_page` on this very source.
    /// -   `page` is not used afterwards.
    unsafe fn free_page(&mut self, page: NonNull<u8>);
}

/// Pages mapped straight from the kernel, one private anonymous mapping each.
#[cfg(unix)]
#[derive(Debug)]
pub struct MmapPages {
    page_size: usize,
}

#[cfg(unix)]
impl PageSource for MmapPages {
    fn with_page_size(page_size: usize) -> Self {
        assert!(page_size > 0, "pages cannot be empty");
        Self { page_size }
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn alloc_page(&mut self) -> NonNull<u8> {
        // Safety: anonymous mapping, no file descriptor or address involved.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                self.page_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        match NonNull::new(ptr.cast::<u8>()) {
            Some(page) if ptr != libc::MAP_FAILED => page,
            _ => alloc::handle_alloc_error(page_layout(self.page_size)),
        }
    }

    unsafe fn free_page(&mut self, page: NonNull<u8>) {
        let result = libc::munmap(page.as_ptr().cast(), self.page_size);
        if result != 0 {
            panic!(
                "munmap of a {} byte page failed: {}",
                self.page_size,
                std::io::Error::last_os_error()
            );
        }
    }
}

/// Pages taken from the global allocator.
#[derive(Debug)]
pub struct HeapPages {
    layout: Layout,
}

impl PageSource for HeapPages {
    fn with_page_size(page_size: usize) -> Self {
        assert!(page_size > 0, "pages cannot be empty");
        Self {
            layout: page_layout(page_size),
        }
    }

    fn page_size(&self) -> usize {
        self.layout.size()
    }

    fn alloc_page(&mut self) -> NonNull<u8> {
        // Safety: the layout has a non-zero size.
        let ptr = unsafe { alloc::alloc(self.layout) };
        match NonNull::new(ptr) {
            Some(page) => page,
            None => alloc::handle_alloc_error(self.layout),
        }
    }

    unsafe fn free_page(&mut self, page: NonNull<u8>) {
        alloc::dealloc(page.as_ptr(), self.layout);
    }
}

/// Page source used by pools: kernel mappings where available.
#[cfg(unix)]
pub type DefaultPages = MmapPages;

/// Page source used by pools: kernel mappings where available.
#[cfg(not(unix))]
pub type DefaultPages = HeapPages;

fn page_layout(page_size: usize) -> Layout {
    match Layout::from_size_align(page_size, PAGE_ALIGN) {
        Ok(layout) => layout,
        Err(_) => panic!("page size {page_size} is too large"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise<P: PageSource>() {
        let mut pages = P::with_page_size(16384);
        assert_eq!(pages.page_size(), 16384);

        let a = pages.alloc_page();
        let b = pages.alloc_page();
        assert_ne!(a, b);
        for page in [a, b] {
            assert_eq!(page.as_ptr() as usize % PAGE_ALIGN, 0);
            // Safety: the whole page is ours.
            unsafe {
                page.as_ptr().write_bytes(0xA5, 16384);
                assert_eq!(*page.as_ptr().add(16383), 0xA5);
            }
        }

        unsafe {
            pages.free_page(a);
            pages.free_page(b);
        }
    }

    #[test]
    fn heap_pages_are_aligned_and_writable() {
        exercise::<HeapPages>();
    }

    #[cfg(unix)]
    #[test]
    fn mmap_pages_are_aligned_and_writable() {
        exercise::<MmapPages>();
    }

    #[test]
    #[should_panic(expected = "pages cannot be empty")]
    fn empty_pages_are_rejected() {
        let _ = HeapPages::with_page_size(0);
    }
}
