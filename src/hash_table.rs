//! HashTable: intrusive open-chaining table with incremental rehashing.
//!
//! The table is a stack of generations, each a [`Buckets`] array sized by the
//! [`SizingStrategy`]. One generation is active and receives all writes; the
//! others are retiring. Every operation first moves the single bucket its hash
//! lands on out of each retiring generation into the active one, then works on
//! the active generation only. A key therefore always sits in the active
//! generation by the time it is looked at, and the cost of resizing is spread
//! over the operations that touch the table afterwards.
//!
//! A retiring bucket that is never touched again keeps its generation alive;
//! there is no background sweep.

use crate::buckets::Buckets;
use crate::hash_ops::{HashOps, HashValue};
use crate::reentrancy::Reentrancy;
use crate::sizing::{SizingStrategy, DEFAULT_LOAD_EXPONENT};
use core::fmt;
use core::pin::Pin;
use core::ptr::NonNull;

/// Intrusive hash table over caller-owned entries.
///
/// Entries embed a [`Link`](crate::list::Link) located by `O` and are handed
/// in pinned. The table never allocates or frees entries, it only links and
/// unlinks them; an entry dropped while linked detaches itself. Lookups return
/// raw pointers: the entry belongs to the caller, who decides how long it
/// lives.
///
/// `len` is best-effort: it counts insertions minus removals, so entries that
/// detached themselves stay counted.
pub struct HashTable<O: HashOps> {
    generations: Generations<O>,
    reentrancy: Reentrancy,
}

// Everything but the reentrancy flag, so that a guard on the flag can be held
// while the generations are mutated.
struct Generations<O: HashOps> {
    sizing: SizingStrategy,
    num_elements: usize,
    slots: Option<Box<[Option<Buckets<O>>]>>,
    current: usize,
}

impl<O: HashOps> HashTable<O> {
    /// Creates a table with the default sizing.
    pub fn new() -> Self {
        Self::with_sizing(SizingStrategy::default())
    }

    /// Creates a table whose largest generation is sized for `max_elements`.
    ///
    /// `max_elements` is a hint: the table accepts more, with longer chains.
    pub fn with_max_elements(max_elements: usize) -> Self {
        Self::with_sizing(SizingStrategy::new(DEFAULT_LOAD_EXPONENT, max_elements))
    }

    pub fn with_sizing(sizing: SizingStrategy) -> Self {
        Self {
            generations: Generations {
                sizing,
                num_elements: 0,
                slots: None,
                current: 0,
            },
            reentrancy: Reentrancy::new(),
        }
    }

    pub fn sizing(&self) -> &SizingStrategy {
        &self.generations.sizing
    }

    /// Number of entries, as far as the table knows.
    pub fn len(&self) -> usize {
        self.generations.num_elements
    }

    pub fn is_empty(&self) -> bool {
        self.generations.num_elements == 0
    }

    /// Index of the active generation.
    pub fn current_generation(&self) -> usize {
        self.generations.current
    }

    /// Number of allocated generations, active one included.
    pub fn live_generations(&self) -> usize {
        self.generations.live().count()
    }

    /// Counts the entries actually linked, walking every bucket.
    pub fn count_linked(&self) -> usize {
        self.generations.live().map(|g| g.count_entries()).sum()
    }

    /// Links `value` unless an entry with the same key is present.
    ///
    /// #   Panics
    ///
    /// If `value` is already linked into a list.
    pub fn insert(&mut self, value: Pin<&O::Value>) -> bool {
        let _busy = self.reentrancy.enter();
        let key = O::key(value.get_ref());
        let hash = O::hash(key);
        let inserted = self.generations.rehash(hash).insert(key, hash, value);
        if inserted {
            self.generations.num_elements += 1;
        }
        inserted
    }

    /// Links `value`, unlinking and returning the entry with the same key.
    ///
    /// Returns `None` when nothing was displaced.
    pub fn set(&mut self, value: Pin<&O::Value>) -> Option<NonNull<O::Value>> {
        let _busy = self.reentrancy.enter();
        let key = O::key(value.get_ref());
        let hash = O::hash(key);
        let old = self.generations.rehash(hash).set(key, hash, value);
        if old.is_none() {
            self.generations.num_elements += 1;
        }
        old
    }

    /// Links `value` in place of the entry with the same key, if there is one.
    ///
    /// Returns the unlinked entry; `None` means the table is unchanged.
    pub fn replace(&mut self, value: Pin<&O::Value>) -> Option<NonNull<O::Value>> {
        let _busy = self.reentrancy.enter();
        let key = O::key(value.get_ref());
        let hash = O::hash(key);
        self.generations.rehash(hash).replace(key, hash, value)
    }

    /// Unlinks and returns the entry for `key`.
    pub fn remove(&mut self, key: &O::Key) -> Option<NonNull<O::Value>> {
        let _busy = self.reentrancy.enter();
        let hash = O::hash(key);
        let old = self.generations.rehash(hash).remove(key, hash);
        if old.is_some() {
            self.generations.num_elements = self.generations.num_elements.saturating_sub(1);
        }
        old
    }

    /// Unlinks and returns the entry with the key of `value`.
    ///
    /// The entry returned may be another one than `value`.
    pub fn remove_value(&mut self, value: &O::Value) -> Option<NonNull<O::Value>> {
        self.remove(O::key(value))
    }

    /// Returns the entry for `key`.
    ///
    /// Takes `&mut self`: lookups advance the incremental rehash too.
    pub fn find(&mut self, key: &O::Key) -> Option<NonNull<O::Value>> {
        let _busy = self.reentrancy.enter();
        let hash = O::hash(key);
        self.generations.rehash(hash).find(key, hash)
    }

    pub fn contains_key(&mut self, key: &O::Key) -> bool {
        self.find(key).is_some()
    }

    /// Drops every generation, unlinking all entries.
    pub fn clear(&mut self) {
        let _busy = self.reentrancy.enter();
        let generations = &mut self.generations;
        if generations.slots.is_some() {
            log::debug!(
                "clearing hash table ({} entries, {} generations)",
                generations.num_elements,
                generations.live().count()
            );
        }
        generations.slots = None;
        generations.current = 0;
        generations.num_elements = 0;
    }
}

impl<O: HashOps> Generations<O> {
    fn live(&self) -> impl Iterator<Item = &Buckets<O>> {
        self.slots.iter().flat_map(|slots| slots.iter().flatten())
    }

    /// Picks the active generation, drains the bucket `hash` lands on out of
    /// every retiring generation, and returns the active generation.
    fn rehash(&mut self, hash: HashValue) -> &mut Buckets<O> {
        self.current = self.sizing.size_index(self.current, self.num_elements);
        let current = self.current;
        let sizing = self.sizing;

        let slots = self
            .slots
            .get_or_insert_with(|| (0..=sizing.max_sizing_index()).map(|_| None).collect());

        let mut active = match slots[current].take() {
            Some(active) => active,
            None => {
                let buckets = sizing.num_buckets(current);
                log::debug!("activating generation {current} with {buckets} buckets");
                Buckets::new(buckets)
            }
        };

        for (index, slot) in slots.iter_mut().enumerate() {
            let Some(retiring) = slot.as_mut() else {
                continue;
            };
            retiring.rehash_into(&mut active, hash);
            if retiring.is_empty() {
                log::debug!(
                    "generation {index} ({} buckets) fully drained",
                    retiring.bucket_count()
                );
                *slot = None;
            }
        }

        slots[current].insert(active)
    }
}

impl<O: HashOps> Default for HashTable<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: HashOps> Drop for HashTable<O> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<O: HashOps> fmt::Debug for HashTable<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTable")
            .field("len", &self.len())
            .field("current_generation", &self.current_generation())
            .field("live_generations", &self.live_generations())
            .finish()
    }
}
