//! The buckets of one sizing generation.

use crate::bucket::Bucket;
use crate::hash_ops::{HashOps, HashValue};
use core::pin::Pin;
use core::ptr::NonNull;

/// How [`Buckets::get_bucket`] treats the slot it lands on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Fetch {
    /// Create the slot array and the bucket on a miss.
    Alloc,
    /// Delete the bucket if it turned out empty, and report a miss.
    Reap,
}

/// Fixed-size array of lazily created buckets.
pub(crate) struct Buckets<O: HashOps> {
    bucket_count: usize,
    slots: Option<Box<[Option<Box<Bucket<O>>>]>>,
    non_null_buckets: usize,
}

impl<O: HashOps> Buckets<O> {
    pub(crate) fn new(bucket_count: usize) -> Self {
        assert!(bucket_count > 0, "a generation needs at least one bucket");
        Self {
            bucket_count,
            slots: None,
            non_null_buckets: 0,
        }
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    #[cfg(test)]
    pub(crate) fn non_null_buckets(&self) -> usize {
        self.non_null_buckets
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.non_null_buckets == 0
    }

    /// Entries currently linked in this generation.
    pub(crate) fn count_entries(&self) -> usize {
        self.slots
            .iter()
            .flat_map(|slots| slots.iter().flatten())
            .map(|b| b.len())
            .sum()
    }

    pub(crate) fn insert(&mut self, key: &O::Key, hash: HashValue, value: Pin<&O::Value>) -> bool {
        match self.get_bucket(hash, Fetch::Alloc) {
            Some(bucket) => bucket.insert(key, value),
            None => unreachable!("allocating fetch returned no bucket"),
        }
    }

    pub(crate) fn set(
        &mut self,
        key: &O::Key,
        hash: HashValue,
        value: Pin<&O::Value>,
    ) -> Option<NonNull<O::Value>> {
        match self.get_bucket(hash, Fetch::Alloc) {
            Some(bucket) => bucket.set(key, value),
            None => unreachable!("allocating fetch returned no bucket"),
        }
    }

    pub(crate) fn replace(
        &mut self,
        key: &O::Key,
        hash: HashValue,
        value: Pin<&O::Value>,
    ) -> Option<NonNull<O::Value>> {
        self.get_bucket(hash, Fetch::Reap)?.replace(key, value)
    }

    pub(crate) fn remove(&mut self, key: &O::Key, hash: HashValue) -> Option<NonNull<O::Value>> {
        self.get_bucket(hash, Fetch::Reap)?.remove(key)
    }

    pub(crate) fn find(&mut self, key: &O::Key, hash: HashValue) -> Option<NonNull<O::Value>> {
        self.get_bucket(hash, Fetch::Reap)?.find(key)
    }

    /// Moves every entry of the bucket `hash` lands on into `that`.
    ///
    /// Entries are re-hashed one by one: `that` has a different bucket count,
    /// so siblings of this bucket spread over several buckets there.
    ///
    /// #   Panics
    ///
    /// If `that` already holds an entry with the key of a moved entry.
    pub(crate) fn rehash_into(&mut self, that: &mut Buckets<O>, hash: HashValue) {
        let index = self.index(hash);
        let Some(bucket) = self.get_bucket(hash, Fetch::Reap) else {
            return;
        };

        let mut moved = 0usize;
        while let Some(value) = bucket.shift() {
            // Safety: the entry was linked an instant ago, so it is alive; the
            // caller pinned it when linking it.
            let value = unsafe { Pin::new_unchecked(value.as_ref()) };
            let key = O::key(value.get_ref());
            let inserted = that.insert(key, O::hash(key), value);
            assert!(inserted, "duplicate entry found while rehashing");
            moved += 1;
        }
        log::trace!(
            "rehashed bucket {index} ({moved} entries) from {} into {} buckets",
            self.bucket_count,
            that.bucket_count
        );

        self.delete_bucket(index);
    }

    /// Returns the bucket for `hash`, handling misses and empties per `fetch`.
    pub(crate) fn get_bucket(&mut self, hash: HashValue, fetch: Fetch) -> Option<&mut Bucket<O>> {
        let index = self.index(hash);

        if self.slots.is_none() {
            if fetch != Fetch::Alloc {
                return None;
            }
            assert_eq!(self.non_null_buckets, 0, "bucket count out of sync");
            self.slots = Some((0..self.bucket_count).map(|_| None).collect());
        }

        // None: no bucket, Some(empty): bucket present.
        let present = self.slot(index).as_ref().map(|b| b.is_empty());
        match (present, fetch) {
            (None, Fetch::Alloc) => {
                *self.slot(index) = Some(Box::new(Bucket::new()));
                self.non_null_buckets += 1;
            }
            (Some(true), Fetch::Reap) => self.delete_bucket(index),
            _ => {}
        }

        self.slot(index).as_deref_mut()
    }

    fn index(&self, hash: HashValue) -> usize {
        hash as usize % self.bucket_count
    }

    fn slot(&mut self, index: usize) -> &mut Option<Box<Bucket<O>>> {
        match self.slots.as_mut() {
            Some(slots) => &mut slots[index],
            None => unreachable!("slot array not allocated"),
        }
    }

    fn delete_bucket(&mut self, index: usize) {
        if let Some(bucket) = self.slot(index).take() {
            drop(bucket);
            self.non_null_buckets -= 1;
        }
    }
}
