//! Per-thread registry of the pools behind [`PoolBox`](crate::PoolBox).
//!
//! One pool per `(type, strategy)` pair, created on first use. Each pool
//! sits in a heap-allocated `PoolHome` that boxes point to, so that
//! releasing a slot never goes through the registry.
//!
//! When the thread exits, the registry frees every pool without live items.
//! A pool that still has some is orphaned instead: it frees itself when its
//! last slot comes back, for instance from another thread-local's destructor.

use crate::metrics::PoolMetrics;
use crate::pool::{PoolStrategy, Pooled, RawPool};
use core::cell::{Cell, RefCell};
use core::ptr::NonNull;
use hashbrown::HashMap;
use std::any::{self, Any, TypeId};

pub(crate) type PoolOf<T> = <<T as Pooled>::Strategy as PoolStrategy>::Pool;

/// A pool, and whether the registry has let go of it.
pub(crate) struct PoolHome<P> {
    pool: RefCell<P>,
    orphaned: Cell<bool>,
}

impl<P: RawPool + 'static> PoolHome<P> {
    fn create(pool: P, orphaned: bool) -> NonNull<Self> {
        NonNull::from(Box::leak(Box::new(Self {
            pool: RefCell::new(pool),
            orphaned: Cell::new(orphaned),
        })))
    }

    pub(crate) fn alloc(&self) -> NonNull<u8> {
        self.pool.borrow_mut().alloc()
    }

    /// Gives `slot` back, freeing an orphaned pool with its last slot.
    ///
    /// #   Safety
    ///
    /// -   `slot` was allocated from the pool of `home` and is not in use.
    pub(crate) unsafe fn release(home: NonNull<Self>, slot: NonNull<u8>) {
        let last = {
            // A home outlives the slots allocated from it.
            let this = home.as_ref();
            let mut pool = this.pool.borrow_mut();
            pool.dealloc(slot);
            this.orphaned.get() && pool.metrics().items.used() == 0
        };
        if last {
            log::debug!("freeing orphaned {} pool", any::type_name::<P>());
            // Orphaned homes are owned by their slots, and this was the last.
            drop(Box::from_raw(home.as_ptr()));
        }
    }
}

trait RegisteredPool {
    fn metrics(&self) -> PoolMetrics;
    fn orphan(&self);
    fn as_any(&self) -> &dyn Any;
}

impl<P: RawPool + 'static> RegisteredPool for PoolHome<P> {
    fn metrics(&self) -> PoolMetrics {
        self.pool.borrow().metrics()
    }

    fn orphan(&self) {
        self.orphaned.set(true);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Entry {
    name: &'static str,
    strategy: &'static str,
    home: NonNull<dyn RegisteredPool>,
}

impl Entry {
    fn pool(&self) -> &dyn RegisteredPool {
        // Safety: registered homes live until the registry drops.
        unsafe { self.home.as_ref() }
    }
}

#[derive(Default)]
struct Registry {
    entries: HashMap<(TypeId, TypeId), Entry>,
}

impl Drop for Registry {
    fn drop(&mut self) {
        for (_, entry) in self.entries.drain() {
            let live = entry.pool().metrics().items.used();
            if live > 0 {
                log::debug!(
                    "orphaning {} pool for {} with {live} live items",
                    entry.strategy,
                    entry.name
                );
                entry.pool().orphan();
            } else {
                // Safety: the home came from `PoolHome::create` and no slot
                // refers to it any more.
                drop(unsafe { Box::from_raw(entry.home.as_ptr()) });
            }
        }
    }
}

thread_local! {
    static POOLS: RefCell<Registry> = RefCell::new(Registry::default());
}

/// Snapshot of one pool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolReport {
    /// Name of the pooled type.
    pub name: &'static str,
    /// Name of the pool strategy.
    pub strategy: &'static str,
    pub metrics: PoolMetrics,
}

/// Reports on every pool of the current thread, ordered by type name.
///
/// Empty once the thread's registry has been torn down.
pub fn reports() -> Vec<PoolReport> {
    let mut reports: Vec<PoolReport> = POOLS
        .try_with(|pools| {
            pools
                .borrow()
                .entries
                .values()
                .map(|entry| PoolReport {
                    name: entry.name,
                    strategy: entry.strategy,
                    metrics: entry.pool().metrics(),
                })
                .collect()
        })
        .unwrap_or_default();
    reports.sort_by(|a, b| (a.name, a.strategy).cmp(&(b.name, b.strategy)));
    reports
}

/// Metrics of the pool of `T` on the current thread, if it was used.
pub fn pool_metrics<T: Pooled>() -> Option<PoolMetrics> {
    POOLS
        .try_with(|pools| {
            let pools = pools.borrow();
            pools.entries.get(&key::<T>()).map(|entry| entry.pool().metrics())
        })
        .ok()
        .flatten()
}

fn key<T: Pooled>() -> (TypeId, TypeId) {
    (TypeId::of::<T>(), TypeId::of::<T::Strategy>())
}

/// The home of the pool of `T`, creating the pool if needed.
///
/// Once the registry is torn down, every call gets a fresh orphaned pool.
pub(crate) fn home<T: Pooled>() -> NonNull<PoolHome<PoolOf<T>>> {
    let key = key::<T>();
    let registered = POOLS.try_with(|pools| {
        if let Some(entry) = pools.borrow().entries.get(&key) {
            return entry.home;
        }

        // Built outside of any borrow of the registry.
        let home = PoolHome::create(<T::Strategy as PoolStrategy>::build::<T>(), false);
        let entry = Entry {
            name: any::type_name::<T>(),
            strategy: <T::Strategy as PoolStrategy>::NAME,
            home,
        };
        log::debug!("created {} pool for {}", entry.strategy, entry.name);
        pools.borrow_mut().entries.insert(key, entry);
        home as NonNull<dyn RegisteredPool>
    });

    match registered {
        Ok(home) => {
            // Safety: registered homes live until the registry drops.
            let is_home = unsafe { home.as_ref() }
                .as_any()
                .is::<PoolHome<PoolOf<T>>>();
            assert!(is_home, "pool registered under the wrong type");
            home.cast()
        }
        Err(_) => {
            log::debug!(
                "pool registry of this thread is gone, using an orphaned pool for {}",
                any::type_name::<T>()
            );
            PoolHome::create(<T::Strategy as PoolStrategy>::build::<T>(), true)
        }
    }
}
