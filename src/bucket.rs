//! One hash slot: the chain of entries colliding in it.

use crate::hash_ops::HashOps;
use crate::list::List;
use core::pin::Pin;
use core::ptr::NonNull;

/// Chain of entries sharing a slot within one generation.
///
/// Holds at most one entry per key. Duplicates are reported, never stored.
pub(crate) struct Bucket<O: HashOps> {
    entries: List<O>,
}

impl<O: HashOps> Bucket<O> {
    pub(crate) fn new() -> Self {
        Self {
            entries: List::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Appends `value` unless an entry with an equal key exists.
    pub(crate) fn insert(&mut self, key: &O::Key, value: Pin<&O::Value>) -> bool {
        if self.lookup(key).is_some() {
            return false;
        }
        self.entries.push_back(value);
        true
    }

    /// Appends `value`, detaching and returning the entry it displaces.
    pub(crate) fn set(&mut self, key: &O::Key, value: Pin<&O::Value>) -> Option<NonNull<O::Value>> {
        let old = self.lookup(key);
        if let Some(old) = old {
            Self::unlink(old);
        }
        self.entries.push_back(value);
        old
    }

    /// Swaps in `value` for the entry with an equal key, if any.
    pub(crate) fn replace(
        &mut self,
        key: &O::Key,
        value: Pin<&O::Value>,
    ) -> Option<NonNull<O::Value>> {
        let old = self.lookup(key)?;
        Self::unlink(old);
        self.entries.push_back(value);
        Some(old)
    }

    pub(crate) fn remove(&mut self, key: &O::Key) -> Option<NonNull<O::Value>> {
        let old = self.lookup(key)?;
        Self::unlink(old);
        Some(old)
    }

    pub(crate) fn find(&self, key: &O::Key) -> Option<NonNull<O::Value>> {
        self.lookup(key)
    }

    /// Unlinks the first entry; used to drain the bucket when rehashing.
    pub(crate) fn shift(&mut self) -> Option<NonNull<O::Value>> {
        self.entries.pop_front()
    }

    fn lookup(&self, key: &O::Key) -> Option<NonNull<O::Value>> {
        self.entries.iter().find(|p| {
            // Safety: linked entries are alive, they detach on drop.
            let value = unsafe { p.as_ref() };
            O::equal(key, O::key(value))
        })
    }

    fn unlink(value: NonNull<O::Value>) {
        // Safety: `value` was just found linked in this bucket.
        O::link(unsafe { value.as_ref() }).detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_ops::{hash_bytes, HashValue};
    use crate::list::{Adapter, Link};

    struct Entry {
        key: u32,
        tag: &'static str,
        link: Link<Entry>,
    }

    fn entry(key: u32, tag: &'static str) -> Pin<Box<Entry>> {
        Box::pin(Entry {
            key,
            tag,
            link: Link::new(),
        })
    }

    struct Ops;

    unsafe impl Adapter for Ops {
        type Value = Entry;
        fn link(value: &Entry) -> &Link<Entry> {
            &value.link
        }
    }

    impl HashOps for Ops {
        type Key = u32;
        fn hash(key: &u32) -> HashValue {
            hash_bytes(&key.to_be_bytes(), 0)
        }
        fn key(value: &Entry) -> &u32 {
            &value.key
        }
        fn equal(left: &u32, right: &u32) -> bool {
            left == right
        }
    }

    fn tag(p: Option<NonNull<Entry>>) -> Option<&'static str> {
        p.map(|p| unsafe { p.as_ref() }.tag)
    }

    #[test]
    fn insert_rejects_duplicates_without_mutation() {
        let mut b = Bucket::<Ops>::new();
        let first = entry(1, "first");
        let dup = entry(1, "dup");
        assert!(b.insert(&1, first.as_ref()));
        assert!(!b.insert(&1, dup.as_ref()));
        assert!(!dup.link.is_linked());
        assert_eq!(b.len(), 1);
        assert_eq!(tag(b.find(&1)), Some("first"));
    }

    #[test]
    fn set_reports_displaced_entry() {
        let mut b = Bucket::<Ops>::new();
        let a = entry(7, "a");
        let c = entry(7, "c");
        assert!(b.set(&7, a.as_ref()).is_none());
        assert_eq!(tag(b.set(&7, c.as_ref())), Some("a"));
        assert!(!a.link.is_linked());
        assert_eq!(b.len(), 1);
        assert_eq!(tag(b.find(&7)), Some("c"));
    }

    #[test]
    fn replace_only_touches_existing_keys() {
        let mut b = Bucket::<Ops>::new();
        let a = entry(3, "a");
        let c = entry(3, "c");
        assert!(b.replace(&3, a.as_ref()).is_none());
        assert!(b.is_empty());
        assert!(b.insert(&3, a.as_ref()));
        assert_eq!(tag(b.replace(&3, c.as_ref())), Some("a"));
        assert_eq!(tag(b.find(&3)), Some("c"));
    }

    #[test]
    fn remove_and_shift() {
        let mut b = Bucket::<Ops>::new();
        let items: Vec<_> = (0..3).map(|k| entry(k, "x")).collect();
        for (k, item) in items.iter().enumerate() {
            assert!(b.insert(&(k as u32), item.as_ref()));
        }
        assert!(b.remove(&9).is_none());
        assert!(b.remove(&1).is_some());
        assert!(b.find(&1).is_none());

        let mut drained = Vec::new();
        while let Some(p) = b.shift() {
            drained.push(unsafe { p.as_ref() }.key);
        }
        drained.sort_unstable();
        assert_eq!(drained, vec![0, 2]);
        assert!(b.is_empty());
    }
}
