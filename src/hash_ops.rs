//! The operation bundle coupling a hash table to the caller's entry type.

use crate::list::Adapter;

/// 32-bit hash value used to pick buckets.
pub type HashValue = u32;

/// Static hash operations for an intrusive entry type.
///
/// Together with [`Adapter::link`] (node extraction) this is everything the
/// table knows about the entries: how to hash a key, how to read the key of an
/// entry and how to compare keys. All functions are associated functions, so
/// every call is statically dispatched.
///
/// The functions must not call back into the table operating on them.
pub trait HashOps: Adapter {
    /// Key type, borrowed from the entries.
    type Key: ?Sized;

    /// Hashes a key.
    fn hash(key: &Self::Key) -> HashValue;

    /// Returns the key of an entry. Must be stable while the entry is linked.
    fn key(value: &Self::Value) -> &Self::Key;

    /// Key equality, consistent with `hash`.
    fn equal(left: &Self::Key, right: &Self::Key) -> bool;
}

/// Multiplicative byte hash (`h * 33 + byte`), folding from the last byte to
/// the first and starting from `seed`, so it can be chained over several
/// fields.
///
/// Integers should be hashed in network byte order (`to_be_bytes`) to get the
/// same values on every architecture.
pub fn hash_bytes(bytes: &[u8], seed: HashValue) -> HashValue {
    bytes
        .iter()
        .rev()
        .fold(seed, |h, &b| h.wrapping_mul(33).wrapping_add(HashValue::from(b)))
}
