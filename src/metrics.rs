//! Per-pool usage counters.

/// One counter, split into what exists and what of it is unused.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Gauge {
    pub total: usize,
    pub idle: usize,
}

impl Gauge {
    /// New idle capacity.
    fn add(&mut self, n: usize) {
        self.total += n;
        self.idle += n;
    }

    /// Idle capacity given back.
    fn remove(&mut self, n: usize) {
        self.total -= n;
        self.idle -= n;
    }

    /// Idle capacity put to use.
    fn acquire(&mut self, n: usize) {
        self.idle -= n;
    }

    /// Used capacity becoming idle again.
    fn release(&mut self, n: usize) {
        self.idle += n;
    }

    /// Capacity in use.
    pub fn used(&self) -> usize {
        self.total - self.idle
    }
}

/// Static sizes of a pool, as far as metrics are concerned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PoolGeometry {
    /// Bytes one item takes, bookkeeping included.
    pub item_size: usize,
    /// Items carved from one chunk.
    pub items_per_chunk: usize,
    /// Bytes one chunk takes, bookkeeping included.
    pub bytes_per_chunk: usize,
}

/// Item, chunk and byte counters of one pool.
///
/// Idle chunks are chunks with no item in use; idle items and bytes are
/// carved but unused. `idle <= total` holds for every gauge after each
/// transition, and is checked.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolMetrics {
    pub items: Gauge,
    pub chunks: Gauge,
    pub bytes: Gauge,
}

impl PoolMetrics {
    /// Accounts for one item handed out.
    ///
    /// `new_chunk`: a chunk was created for it. `chunk_de_idled`: it was taken
    /// from an idle chunk, fresh ones included.
    pub fn allocated(&mut self, new_chunk: bool, chunk_de_idled: bool, geometry: &PoolGeometry) {
        self.check_consistency();

        if new_chunk {
            self.items.add(geometry.items_per_chunk);
            self.bytes.add(geometry.bytes_per_chunk);
            self.chunks.add(1);
        }
        if chunk_de_idled {
            self.chunks.acquire(1);
        }
        self.items.acquire(1);
        self.bytes.acquire(geometry.item_size);

        self.check_consistency();
    }

    /// Accounts for one item given back.
    ///
    /// `chunk_idled`: its chunk has no item in use anymore. `chunk_freed`: an
    /// idle chunk was released as a consequence.
    pub fn deallocated(&mut self, chunk_freed: bool, chunk_idled: bool, geometry: &PoolGeometry) {
        self.check_consistency();

        self.items.release(1);
        self.bytes.release(geometry.item_size);
        if chunk_idled {
            self.chunks.release(1);
        }
        if chunk_freed {
            self.items.remove(geometry.items_per_chunk);
            self.bytes.remove(geometry.bytes_per_chunk);
            self.chunks.remove(1);
        }

        self.check_consistency();
    }

    /// Accounts for `bytes` worth of a single item taken from, or given
    /// back to, a pool without chunks.
    pub(crate) fn item_transition(&mut self, grown: bool, acquired: bool, bytes: usize) {
        self.check_consistency();

        match (grown, acquired) {
            (true, true) => {
                self.items.add(1);
                self.bytes.add(bytes);
                self.items.acquire(1);
                self.bytes.acquire(bytes);
            }
            (false, true) => {
                self.items.acquire(1);
                self.bytes.acquire(bytes);
            }
            (false, false) => {
                self.items.release(1);
                self.bytes.release(bytes);
            }
            (true, false) => {
                self.items.remove(1);
                self.bytes.remove(bytes);
            }
        }

        self.check_consistency();
    }

    /// Panics unless every gauge has `idle <= total`.
    pub fn check_consistency(&self) {
        assert!(
            self.items.idle <= self.items.total,
            "pool metrics out of sync: {self:?}"
        );
        assert!(
            self.bytes.idle <= self.bytes.total,
            "pool metrics out of sync: {self:?}"
        );
        assert!(
            self.chunks.idle <= self.chunks.total,
            "pool metrics out of sync: {self:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GEOMETRY: PoolGeometry = PoolGeometry {
        item_size: 64,
        items_per_chunk: 4,
        bytes_per_chunk: 300,
    };

    #[test]
    fn fresh_chunk_then_back_to_idle() {
        let mut m = PoolMetrics::default();
        m.allocated(true, true, &GEOMETRY);
        assert_eq!(m.chunks, Gauge { total: 1, idle: 0 });
        assert_eq!(m.items, Gauge { total: 4, idle: 3 });
        assert_eq!(m.bytes, Gauge { total: 300, idle: 236 });
        assert_eq!(m.items.used(), 1);

        m.deallocated(false, true, &GEOMETRY);
        assert_eq!(m.chunks, Gauge { total: 1, idle: 1 });
        assert_eq!(m.items, Gauge { total: 4, idle: 4 });

        let warm = m;
        m.allocated(false, true, &GEOMETRY);
        m.deallocated(false, true, &GEOMETRY);
        assert_eq!(m, warm);

        m.deallocated_chunk_only();
        assert_eq!(m, PoolMetrics::default());
    }

    impl PoolMetrics {
        // Releases one idle chunk, as an eviction would.
        fn deallocated_chunk_only(&mut self) {
            self.items.remove(GEOMETRY.items_per_chunk);
            self.bytes.remove(GEOMETRY.bytes_per_chunk);
            self.chunks.remove(1);
            self.check_consistency();
        }
    }

    #[test]
    fn item_transitions_balance() {
        let mut m = PoolMetrics::default();
        m.item_transition(true, true, 32);
        assert_eq!(m.items, Gauge { total: 1, idle: 0 });
        m.item_transition(false, false, 32);
        assert_eq!(m.items, Gauge { total: 1, idle: 1 });
        assert_eq!(m.bytes, Gauge { total: 32, idle: 32 });
        m.item_transition(false, true, 32);
        m.item_transition(false, false, 32);
        m.item_transition(true, false, 32);
        assert_eq!(m, PoolMetrics::default());
        assert_eq!(m.chunks, Gauge::default());
    }

    #[test]
    #[should_panic(expected = "pool metrics out of sync")]
    fn inconsistency_is_fatal() {
        let m = PoolMetrics {
            items: Gauge { total: 1, idle: 2 },
            ..PoolMetrics::default()
        };
        m.check_consistency();
    }
}
