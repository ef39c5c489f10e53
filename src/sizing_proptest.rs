#![cfg(test)]

// Property tests for SizingStrategy: generation choices never decrease as
// the population grows, and one step never grows by more than a generation.

use crate::sizing::SizingStrategy;
use proptest::prelude::*;

// Populations of every magnitude, from empty up to `usize::MAX`.
fn population() -> impl Strategy<Value = usize> {
    (any::<usize>(), 0u32..usize::BITS).prop_map(|(raw, shift)| raw >> shift)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 512, .. ProptestConfig::default() })]
    #[test]
    fn prop_size_index_is_monotonic(
        load_exponent in 3usize..=8,
        max_sizing_index in 0usize..=6,
        current_hint in any::<prop::sample::Index>(),
        a in population(),
        b in population(),
    ) {
        let sizing = SizingStrategy::with_max_sizing_index(load_exponent, max_sizing_index).unwrap();
        let current = current_hint.index(max_sizing_index + 1);
        let (n1, n2) = (a.min(b), a.max(b));

        let i1 = sizing.size_index(current, n1);
        let i2 = sizing.size_index(current, n2);
        prop_assert!(i1 <= i2, "size_index({current}, {n1}) = {i1} > size_index({current}, {n2}) = {i2}");
        prop_assert!(i2 <= current + 1);
        prop_assert!(i2 <= max_sizing_index);
    }

    #[test]
    fn prop_size_index_settles_monotonically(
        load_exponent in 3usize..=6,
        max_sizing_index in 0usize..=5,
        a in 0usize..1 << 20,
        b in 0usize..1 << 20,
    ) {
        let sizing = SizingStrategy::with_max_sizing_index(load_exponent, max_sizing_index).unwrap();
        // Repeated operations at a stable population reach a fixed point.
        let settle = |n: usize| {
            let mut index = 0;
            loop {
                let next = sizing.size_index(index, n);
                if next == index {
                    return index;
                }
                index = next;
            }
        };
        let (n1, n2) = (a.min(b), a.max(b));
        prop_assert!(settle(n1) <= settle(n2));
    }
}
