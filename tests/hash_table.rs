// HashTable integration suite.
//
// Each test documents what behavior is being verified and which
// invariants are assumed or asserted. The core invariants exercised:
// - Round-trip: insert, find and remove agree on presence.
// - Uniqueness: a duplicate insert fails and links nothing.
// - Incremental rehash: every key stays findable after every operation
//   while the table grows and shrinks through several generations.
// - Intrusive lifetime: an entry dropped while linked leaves the table.
// - Pooled entries: entries allocated through PoolBox can be linked.
use slabhash::{
    hash_bytes, Adapter, Chunked, HashOps, HashTable, HashValue, Link, PoolBox, Pooled,
    SizingStrategy,
};
use std::pin::Pin;
use std::ptr::NonNull;

struct Entry {
    key: i32,
    link: Link<Entry>,
}

fn entry(key: i32) -> Pin<Box<Entry>> {
    Box::pin(Entry {
        key,
        link: Link::new(),
    })
}

fn ptr(e: &Pin<Box<Entry>>) -> NonNull<Entry> {
    NonNull::from(&**e)
}

struct ByKey;

unsafe impl Adapter for ByKey {
    type Value = Entry;
    fn link(value: &Entry) -> &Link<Entry> {
        &value.link
    }
}

impl HashOps for ByKey {
    type Key = i32;
    fn hash(key: &i32) -> HashValue {
        hash_bytes(&key.to_be_bytes(), 0)
    }
    fn key(value: &Entry) -> &i32 {
        &value.key
    }
    fn equal(left: &i32, right: &i32) -> bool {
        left == right
    }
}

// Test: basic round trip.
// Verifies: find after insert, miss after remove, miss on unknown keys.
#[test]
fn insert_find_remove() {
    let mut table = HashTable::<ByKey>::new();
    let e = entry(1);
    assert!(table.insert(e.as_ref()));
    assert_eq!(table.find(&1), Some(ptr(&e)));
    assert_eq!(table.find(&4), None);
    assert_eq!(table.remove(&1), Some(ptr(&e)));
    assert_eq!(table.find(&1), None);
    assert!(!e.link.is_linked());
}

// Test: unique keys.
// Verifies: a second entry with the same key is rejected and stays unlinked;
// the first one is untouched.
#[test]
fn duplicate_insert_rejected() {
    let mut table = HashTable::<ByKey>::new();
    let first = entry(7);
    let second = entry(7);
    assert!(table.insert(first.as_ref()));
    assert!(!table.insert(second.as_ref()));
    assert!(!second.link.is_linked());
    assert_eq!(table.find(&7), Some(ptr(&first)));
    assert_eq!(table.len(), 1);
}

// Test: 513 keys grow the table past three generations, then shrink it.
// Assumes: default sizing (load exponent 3).
// Verifies: after every insert and every remove, each key is found iff it
// is currently inserted, and found at the right entry.
#[test]
fn grow_then_shrink_keeps_keys_findable() {
    const COUNT: usize = 513;
    let mut table = HashTable::<ByKey>::new();
    let mut entries: Vec<Option<Pin<Box<Entry>>>> = (0..COUNT).map(|_| None).collect();

    let check = |table: &mut HashTable<ByKey>, entries: &[Option<Pin<Box<Entry>>>]| {
        for (j, e) in entries.iter().enumerate() {
            assert_eq!(table.find(&(j as i32)), e.as_ref().map(ptr), "key {j}");
        }
    };

    for i in 0..COUNT {
        let e = entry(i as i32);
        assert!(table.insert(e.as_ref()));
        entries[i] = Some(e);
        check(&mut table, &entries);
    }
    assert_eq!(table.len(), COUNT);
    assert!(table.current_generation() >= 2);

    for i in 0..COUNT {
        let e = entries[i].take().unwrap();
        assert_eq!(table.remove(&(i as i32)), Some(ptr(&e)));
        check(&mut table, &entries);
    }
    assert!(table.is_empty());
    assert_eq!(table.current_generation(), 0);
    assert_eq!(table.count_linked(), 0);
}

// Test: lookups alone drain retiring generations.
// Verifies: once every key has been looked up, only the active generation
// remains.
#[test]
fn lookups_finish_the_rehash() {
    let mut table = HashTable::<ByKey>::with_max_elements(10_000);
    let entries: Vec<_> = (0..1000).map(entry).collect();
    for e in &entries {
        assert!(table.insert(e.as_ref()));
    }
    assert_eq!(table.current_generation(), 2);
    for k in 0..1000 {
        assert!(table.contains_key(&k));
    }
    assert_eq!(table.live_generations(), 1);
}

// Test: a capped table keeps accepting entries in its last allowed
// generation, with longer chains.
#[test]
fn capped_table_accepts_more_than_its_hint() {
    let sizing = SizingStrategy::with_max_sizing_index(3, 1).unwrap();
    let mut table = HashTable::<ByKey>::with_sizing(sizing);
    let entries: Vec<_> = (0..200).map(entry).collect();
    for e in &entries {
        assert!(table.insert(e.as_ref()));
    }
    assert_eq!(table.current_generation(), 0);
    for k in 0..200 {
        assert!(table.contains_key(&k));
    }
}

// Test: intrusive self-detach.
// Verifies: dropping a linked entry removes it from lookups without
// disturbing its neighbours, and dropping the table unlinks the rest.
#[test]
fn dropped_entries_leave_the_table() {
    let mut table = HashTable::<ByKey>::new();
    let mut entries: Vec<_> = (0..50).map(entry).collect();
    for e in &entries {
        assert!(table.insert(e.as_ref()));
    }
    let dropped: Vec<_> = entries.drain(10..20).collect();
    drop(dropped);
    for k in 0..50 {
        assert_eq!(table.contains_key(&k), !(10..20).contains(&k), "key {k}");
    }
    assert_eq!(table.count_linked(), 40);

    drop(table);
    assert!(entries.iter().all(|e| !e.link.is_linked()));
}

struct Session {
    name: String,
    hits: u32,
    link: Link<Session>,
}

impl Pooled for Session {
    type Strategy = Chunked;
}

struct ByName;

unsafe impl Adapter for ByName {
    type Value = Session;
    fn link(value: &Session) -> &Link<Session> {
        &value.link
    }
}

impl HashOps for ByName {
    type Key = str;
    fn hash(key: &str) -> HashValue {
        hash_bytes(key.as_bytes(), 0)
    }
    fn key(value: &Session) -> &str {
        &value.name
    }
    fn equal(left: &str, right: &str) -> bool {
        left == right
    }
}

// Test: pooled entries with borrowed string keys.
// Verifies: entries pinned in PoolBoxes link, resolve by &str, and leave
// the table when their box is dropped.
#[test]
fn pooled_sessions() {
    let mut table = HashTable::<ByName>::new();
    let mut sessions: Vec<_> = (0..100)
        .map(|i| {
            PoolBox::pin(Session {
                name: format!("session-{i}"),
                hits: i,
                link: Link::new(),
            })
        })
        .collect();
    for s in &sessions {
        assert!(table.insert(s.as_ref()));
    }

    let found = table.find("session-42").unwrap();
    assert_eq!(unsafe { found.as_ref() }.hits, 42);

    sessions.truncate(50);
    assert!(table.find("session-42").is_some());
    assert!(table.find("session-77").is_none());
    assert_eq!(table.count_linked(), 50);

    let used = slabhash::pool_metrics::<Session>().unwrap().items.used();
    assert_eq!(used, 50);
}
