//! Debug-only detection of callbacks re-entering a structure.
//!
//! Table operations call back into user code (`HashOps::hash`, `key`,
//! `equal`) while buckets are half drained or a generation is detached from
//! the slot array. Those callbacks must not touch the table again. Debug builds
//! mark the structure busy for the duration of each operation and panic on a
//! nested entry; release builds compile the check away.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

/// Busy flag embedded in a structure; guard entry points with
/// `let _busy = self.reentrancy.enter();`.
#[derive(Debug)]
pub struct Reentrancy {
    #[cfg(debug_assertions)]
    busy: Cell<bool>,
    _single_threaded: PhantomData<*mut ()>,
}

impl Reentrancy {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            busy: Cell::new(false),
            _single_threaded: PhantomData,
        }
    }

    /// Marks the structure busy until the returned guard is dropped.
    #[inline]
    pub fn enter(&self) -> Busy<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.busy.replace(true),
                "re-entered a structure from one of its own callbacks"
            );
            Busy { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            Busy { _owner: PhantomData }
        }
    }

    #[cfg(test)]
    fn is_busy(&self) -> bool {
        #[cfg(debug_assertions)]
        {
            self.busy.get()
        }

        #[cfg(not(debug_assertions))]
        {
            false
        }
    }
}

impl Default for Reentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard returned by [`Reentrancy::enter`].
pub struct Busy<'a> {
    #[cfg(debug_assertions)]
    owner: &'a Reentrancy,
    #[cfg(not(debug_assertions))]
    _owner: PhantomData<&'a Reentrancy>,
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.owner.busy.set(false);
    }
}
