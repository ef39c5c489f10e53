#![cfg(test)]

// Property tests for HashTable kept inside the crate so the internal
// generation bookkeeping can be checked alongside the public behavior.

use crate::hash_ops::{hash_bytes, HashOps, HashValue};
use crate::hash_table::HashTable;
use crate::list::{Adapter, Link};
use crate::sizing::SizingStrategy;
use core::pin::Pin;
use core::ptr::NonNull;
use proptest::prelude::*;
use std::collections::HashMap;

struct Node {
    key: u16,
    id: u64,
    link: Link<Node>,
}

struct Ops;

unsafe impl Adapter for Ops {
    type Value = Node;
    fn link(value: &Node) -> &Link<Node> {
        &value.link
    }
}

impl HashOps for Ops {
    type Key = u16;
    fn hash(key: &u16) -> HashValue {
        hash_bytes(&key.to_be_bytes(), 0)
    }
    fn key(value: &Node) -> &u16 {
        &value.key
    }
    fn equal(left: &u16, right: &u16) -> bool {
        left == right
    }
}

#[derive(Clone, Debug)]
enum Op {
    Insert(u16),
    Set(u16),
    Replace(u16),
    Remove(u16),
    Find(u16),
    // Drops the linked entry for the key behind the table's back.
    Forget(u16),
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    let key = 0u16..300;
    let op = prop_oneof![
        4 => key.clone().prop_map(Op::Insert),
        1 => key.clone().prop_map(Op::Set),
        1 => key.clone().prop_map(Op::Replace),
        3 => key.clone().prop_map(Op::Remove),
        3 => key.clone().prop_map(Op::Find),
        1 => key.prop_map(Op::Forget),
    ];
    proptest::collection::vec(op, 1..600)
}

fn id_of(p: Option<NonNull<Node>>) -> Option<u64> {
    // Safety: pointers returned by the table point at nodes still owned by
    // the test.
    p.map(|p| unsafe { p.as_ref() }.id)
}

// Property: State-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - Duplicate inserts fail without linking the new entry.
// - `set` returns the displaced entry; `replace` never adds a key.
// - `find`/`remove` agree with the model, through growth and shrinking.
// - Dropped entries vanish from lookups; `len` keeps counting them.
// - After each operation, linked entries equal the model.
proptest! {
    #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine(ops in arb_ops()) {
        let sizing = SizingStrategy::with_max_sizing_index(3, 3).unwrap();
        let mut sut: HashTable<Ops> = HashTable::with_sizing(sizing);
        let mut model: HashMap<u16, u64> = HashMap::new();
        let mut owned: HashMap<u64, Pin<Box<Node>>> = HashMap::new();
        let mut next_id = 0u64;
        let mut forgotten = 0usize;

        let mut fresh = |key: u16| {
            next_id += 1;
            Box::pin(Node { key, id: next_id, link: Link::new() })
        };

        for op in ops {
            match op {
                Op::Insert(k) => {
                    let node = fresh(k);
                    let inserted = sut.insert(node.as_ref());
                    prop_assert_eq!(inserted, !model.contains_key(&k));
                    if inserted {
                        model.insert(k, node.id);
                        owned.insert(node.id, node);
                    } else {
                        prop_assert!(!node.link.is_linked());
                    }
                }
                Op::Set(k) => {
                    let node = fresh(k);
                    let old = id_of(sut.set(node.as_ref()));
                    prop_assert_eq!(old, model.insert(k, node.id));
                    if let Some(old) = old {
                        let old = owned.remove(&old).unwrap();
                        prop_assert!(!old.link.is_linked());
                    }
                    owned.insert(node.id, node);
                }
                Op::Replace(k) => {
                    let node = fresh(k);
                    let old = id_of(sut.replace(node.as_ref()));
                    prop_assert_eq!(old, model.get(&k).copied());
                    if let Some(old) = old {
                        owned.remove(&old);
                        model.insert(k, node.id);
                        owned.insert(node.id, node);
                    } else {
                        prop_assert!(!node.link.is_linked());
                    }
                }
                Op::Remove(k) => {
                    let old = id_of(sut.remove(&k));
                    prop_assert_eq!(old, model.remove(&k));
                    if let Some(old) = old {
                        owned.remove(&old);
                    }
                }
                Op::Find(k) => {
                    prop_assert_eq!(id_of(sut.find(&k)), model.get(&k).copied());
                }
                Op::Forget(k) => {
                    if let Some(id) = model.remove(&k) {
                        owned.remove(&id);
                        forgotten += 1;
                    }
                }
            }

            prop_assert_eq!(sut.count_linked(), model.len());
            prop_assert!(sut.live_generations() >= 1);
            prop_assert!(sut.current_generation() <= sizing.max_sizing_index());
        }

        prop_assert_eq!(sut.len(), model.len() + forgotten);
        for (k, id) in &model {
            prop_assert_eq!(id_of(sut.find(k)), Some(*id));
        }
        sut.clear();
        prop_assert!(owned.values().all(|n| !n.link.is_linked()));
    }
}
