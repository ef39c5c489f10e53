//! Intrusive doubly-linked list.
//!
//! The links live inside the values themselves: a value embeds a [`Link`] and
//! an [`Adapter`] tells the list where it is. The list never owns its values;
//! it only threads pointers through them.
//!
//! Lifetime coupling:
//! - Values are pushed as `Pin<&T>`. The pin guarantees the value does not
//!   move, and that its destructor runs before its memory is reused.
//! - The destructor of a [`Link`] detaches it, so dropping a linked value
//!   leaves its list one element shorter and otherwise intact.
//! - Dropping a [`List`] unlinks whatever is still in it.
//!
//! Everything here is single-threaded: links and lists are `!Send`/`!Sync`.

use core::cell::Cell;
use core::fmt;
use core::marker::{PhantomData, PhantomPinned};
use core::pin::Pin;
use core::ptr::NonNull;

/// Node embedded in a value that can be linked into a [`List`].
pub struct Link<T> {
    prev: Cell<Option<NonNull<Link<T>>>>,
    next: Cell<Option<NonNull<Link<T>>>>,
    // Value this link was pushed with; recovers the container without offsets.
    value: Cell<Option<NonNull<T>>>,
    anchor: Cell<Option<NonNull<Anchor<T>>>>,
    _pinned: PhantomPinned,
}

impl<T> Link<T> {
    pub const fn new() -> Self {
        Self {
            prev: Cell::new(None),
            next: Cell::new(None),
            value: Cell::new(None),
            anchor: Cell::new(None),
            _pinned: PhantomPinned,
        }
    }

    /// Whether the link currently belongs to a list.
    pub fn is_linked(&self) -> bool {
        self.anchor.get().is_some()
    }

    /// Removes the link from its list in O(1). No-op when not linked.
    pub fn detach(&self) {
        let Some(anchor) = self.anchor.take() else {
            return;
        };
        // Safety:
        // -   A linked link's anchor is alive: lists unlink everything on drop.
        // -   Neighbours are alive: they detach themselves on drop.
        let anchor = unsafe { anchor.as_ref() };
        let prev = self.prev.take();
        let next = self.next.take();

        match prev {
            Some(p) => unsafe { p.as_ref() }.next.set(next),
            None => anchor.head.set(next),
        }
        match next {
            Some(n) => unsafe { n.as_ref() }.prev.set(prev),
            None => anchor.tail.set(prev),
        }

        self.value.set(None);
        let len = anchor.len.get();
        debug_assert!(len > 0, "detached from an empty list");
        anchor.len.set(len - 1);
    }

    fn value_ptr(&self) -> NonNull<T> {
        match self.value.get() {
            Some(v) => v,
            None => unreachable!("linked node without a value"),
        }
    }
}

impl<T> Default for Link<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Link<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// Locates the [`Link`] inside a value.
///
/// #   Safety
///
/// -   `link` must return a reference to a field of `value` (directly or
///     nested), always the same one, so that dropping the value drops the link.
pub unsafe trait Adapter {
    /// Type of the linked values.
    type Value;

    /// Returns the link embedded in `value`.
    fn link(value: &Self::Value) -> &Link<Self::Value>;
}

// Boxed so that links can point at it while the `List` itself moves around.
struct Anchor<T> {
    head: Cell<Option<NonNull<Link<T>>>>,
    tail: Cell<Option<NonNull<Link<T>>>>,
    len: Cell<usize>,
}

/// Intrusive doubly-linked list over values located by `A`.
pub struct List<A: Adapter> {
    anchor: Box<Anchor<A::Value>>,
    _adapter: PhantomData<A>,
}

impl<A: Adapter> List<A> {
    pub fn new() -> Self {
        Self {
            anchor: Box::new(Anchor {
                head: Cell::new(None),
                tail: Cell::new(None),
                len: Cell::new(0),
            }),
            _adapter: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.anchor.len.get()
    }

    pub fn is_empty(&self) -> bool {
        self.anchor.head.get().is_none()
    }

    /// Appends `value`.
    ///
    /// #   Panics
    ///
    /// If the value is already linked into a list.
    pub fn push_back(&mut self, value: Pin<&A::Value>) {
        let link = self.claim(value);
        link.prev.set(self.anchor.tail.get());
        let node = NonNull::from(link);
        match self.anchor.tail.replace(Some(node)) {
            Some(tail) => unsafe { tail.as_ref() }.next.set(Some(node)),
            None => self.anchor.head.set(Some(node)),
        }
    }

    /// Prepends `value`.
    ///
    /// #   Panics
    ///
    /// If the value is already linked into a list.
    pub fn push_front(&mut self, value: Pin<&A::Value>) {
        let link = self.claim(value);
        link.next.set(self.anchor.head.get());
        let node = NonNull::from(link);
        match self.anchor.head.replace(Some(node)) {
            Some(head) => unsafe { head.as_ref() }.prev.set(Some(node)),
            None => self.anchor.tail.set(Some(node)),
        }
    }

    /// Unlinks and returns the first value.
    pub fn pop_front(&mut self) -> Option<NonNull<A::Value>> {
        let head = self.anchor.head.get()?;
        // Safety: linked nodes are alive.
        let link = unsafe { head.as_ref() };
        let value = link.value_ptr();
        link.detach();
        Some(value)
    }

    /// Unlinks and returns the last value.
    pub fn pop_back(&mut self) -> Option<NonNull<A::Value>> {
        let tail = self.anchor.tail.get()?;
        // Safety: linked nodes are alive.
        let link = unsafe { tail.as_ref() };
        let value = link.value_ptr();
        link.detach();
        Some(value)
    }

    pub fn front(&self) -> Option<NonNull<A::Value>> {
        self.anchor
            .head
            .get()
            .map(|n| unsafe { n.as_ref() }.value_ptr())
    }

    pub fn back(&self) -> Option<NonNull<A::Value>> {
        self.anchor
            .tail
            .get()
            .map(|n| unsafe { n.as_ref() }.value_ptr())
    }

    /// Iterates front to back.
    ///
    /// The list must not be modified while iterating; detaching the value just
    /// yielded is fine.
    pub fn iter(&self) -> Iter<'_, A> {
        Iter {
            cursor: self.anchor.head.get(),
            forward: true,
            _list: PhantomData,
        }
    }

    /// Iterates back to front.
    pub fn iter_rev(&self) -> Iter<'_, A> {
        Iter {
            cursor: self.anchor.tail.get(),
            forward: false,
            _list: PhantomData,
        }
    }

    /// Whether `value` is linked into this very list.
    pub fn contains(&self, value: &A::Value) -> bool {
        A::link(value).anchor.get() == Some(self.anchor_ptr())
    }

    /// Unlinks every value, leaving them untouched otherwise.
    pub fn clear(&mut self) {
        while self.pop_front().is_some() {}
    }

    fn anchor_ptr(&self) -> NonNull<Anchor<A::Value>> {
        NonNull::from(&*self.anchor)
    }

    fn claim<'v>(&mut self, value: Pin<&'v A::Value>) -> &'v Link<A::Value> {
        let value: &'v A::Value = value.get_ref();
        let link = A::link(value);
        assert!(!link.is_linked(), "value is already linked into a list");
        link.value.set(Some(NonNull::from(value)));
        link.anchor.set(Some(self.anchor_ptr()));
        link.next.set(None);
        link.prev.set(None);
        self.anchor.len.set(self.anchor.len.get() + 1);
        link
    }
}

impl<A: Adapter> Default for List<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Adapter> Drop for List<A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<A: Adapter> fmt::Debug for List<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List").field("len", &self.len()).finish()
    }
}

/// Iterator over the values of a [`List`].
pub struct Iter<'a, A: Adapter> {
    cursor: Option<NonNull<Link<A::Value>>>,
    forward: bool,
    _list: PhantomData<&'a List<A>>,
}

impl<A: Adapter> Iterator for Iter<'_, A> {
    type Item = NonNull<A::Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cursor?;
        // Safety: linked nodes are alive; the cursor is advanced before the
        // caller gets a chance to detach the yielded value.
        let link = unsafe { node.as_ref() };
        self.cursor = if self.forward {
            link.next.get()
        } else {
            link.prev.get()
        };
        Some(link.value_ptr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        id: u32,
        link: Link<Item>,
    }

    impl Item {
        fn boxed(id: u32) -> Pin<Box<Item>> {
            Box::pin(Item {
                id,
                link: Link::new(),
            })
        }
    }

    struct ByLink;

    unsafe impl Adapter for ByLink {
        type Value = Item;

        fn link(value: &Item) -> &Link<Item> {
            &value.link
        }
    }

    fn ids(list: &List<ByLink>) -> Vec<u32> {
        list.iter().map(|p| unsafe { p.as_ref() }.id).collect()
    }

    fn ids_rev(list: &List<ByLink>) -> Vec<u32> {
        list.iter_rev().map(|p| unsafe { p.as_ref() }.id).collect()
    }

    #[test]
    fn push_and_pop_both_ends() {
        let items: Vec<_> = (0..4).map(Item::boxed).collect();
        let mut list = List::<ByLink>::new();
        list.push_back(items[1].as_ref());
        list.push_back(items[2].as_ref());
        list.push_front(items[0].as_ref());
        list.push_back(items[3].as_ref());
        assert_eq!(list.len(), 4);
        assert_eq!(ids(&list), vec![0, 1, 2, 3]);
        assert_eq!(ids_rev(&list), vec![3, 2, 1, 0]);

        let first = list.pop_front().unwrap();
        assert_eq!(unsafe { first.as_ref() }.id, 0);
        let last = list.pop_back().unwrap();
        assert_eq!(unsafe { last.as_ref() }.id, 3);
        assert!(!items[0].link.is_linked());
        assert_eq!(ids(&list), vec![1, 2]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn dropping_a_linked_value_detaches_it() {
        let mut list = List::<ByLink>::new();
        let a = Item::boxed(1);
        let b = Item::boxed(2);
        let c = Item::boxed(3);
        list.push_back(a.as_ref());
        list.push_back(b.as_ref());
        list.push_back(c.as_ref());

        drop(b);
        assert_eq!(list.len(), 2);
        assert_eq!(ids(&list), vec![1, 3]);
        assert_eq!(ids_rev(&list), vec![3, 1]);

        drop(a);
        drop(c);
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert!(list.front().is_none());
        assert!(list.back().is_none());
    }

    #[test]
    fn dropping_the_list_unlinks_values() {
        let a = Item::boxed(1);
        {
            let mut list = List::<ByLink>::new();
            list.push_back(a.as_ref());
            assert!(list.contains(&a));
        }
        assert!(!a.link.is_linked());
    }

    #[test]
    fn list_can_move_while_populated() {
        let a = Item::boxed(1);
        let mut list = List::<ByLink>::new();
        list.push_back(a.as_ref());
        let mut moved = vec![list];
        let list = moved.pop().unwrap();
        drop(a);
        assert!(list.is_empty());
    }

    #[test]
    fn detaching_while_iterating_is_fine() {
        let items: Vec<_> = (0..5).map(Item::boxed).collect();
        let mut list = List::<ByLink>::new();
        for item in &items {
            list.push_back(item.as_ref());
        }
        for p in list.iter() {
            let item = unsafe { p.as_ref() };
            if item.id % 2 == 0 {
                item.link.detach();
            }
        }
        assert_eq!(ids(&list), vec![1, 3]);
    }

    #[test]
    #[should_panic(expected = "already linked")]
    fn double_push_panics() {
        let a = Item::boxed(1);
        let mut first = List::<ByLink>::new();
        let mut second = List::<ByLink>::new();
        first.push_back(a.as_ref());
        second.push_back(a.as_ref());
    }
}
