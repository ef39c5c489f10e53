//! Bucket-count policy of the hash table.
//!
//! The table keeps entries in open chains. Instead of a load factor the policy
//! takes a load exponent `le`, and sizes the table in generations: generation
//! `i` has `2^((i + 1) * le)` buckets and holds up to `2^(le * (i + 1))`
//! entries before the next generation is used. Going back down happens only
//! once the population is below half of what the previous generation holds,
//! so a table hovering around a boundary does not flip-flop.

use crate::error::ConfigError;

/// Default load exponent.
pub const DEFAULT_LOAD_EXPONENT: usize = 3;

/// Default number of sizing generations.
pub const DEFAULT_GENERATIONS: usize = 8;

/// Growth and shrink decisions for the hash table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SizingStrategy {
    load_exponent: usize,
    max_sizing_index: usize,
}

impl SizingStrategy {
    /// Creates a strategy sized for at most `max_elements` entries.
    ///
    /// #   Panics
    ///
    /// If `load_exponent <= 2`, or the largest generation overflows `usize`.
    pub fn new(load_exponent: usize, max_elements: usize) -> Self {
        match Self::try_new(load_exponent, max_elements) {
            Ok(s) => s,
            Err(e) => panic!("SizingStrategy: {e}"),
        }
    }

    /// Creates a strategy sized for at most `max_elements` entries.
    pub fn try_new(load_exponent: usize, max_elements: usize) -> Result<Self, ConfigError> {
        if load_exponent <= 2 {
            return Err(ConfigError::LoadExponentTooSmall(load_exponent));
        }
        Self::with_max_sizing_index(
            load_exponent,
            Self::max_sizing_index_for(load_exponent, max_elements),
        )
    }

    /// Creates a strategy with an explicit largest generation index.
    pub fn with_max_sizing_index(
        load_exponent: usize,
        max_sizing_index: usize,
    ) -> Result<Self, ConfigError> {
        if load_exponent <= 2 {
            return Err(ConfigError::LoadExponentTooSmall(load_exponent));
        }
        let generations = max_sizing_index.saturating_add(1);
        match generations.checked_mul(load_exponent) {
            Some(bits) if bits < usize::BITS as usize => Ok(Self {
                load_exponent,
                max_sizing_index,
            }),
            _ => Err(ConfigError::LoadExponentTooLarge {
                load_exponent,
                generations,
            }),
        }
    }

    pub fn load_exponent(&self) -> usize {
        self.load_exponent
    }

    pub fn max_sizing_index(&self) -> usize {
        self.max_sizing_index
    }

    /// Buckets in generation `size_index`.
    pub fn num_buckets(&self, size_index: usize) -> usize {
        1usize << ((size_index + 1) * self.load_exponent)
    }

    /// Entries generation `size_index` holds without going above the load.
    pub fn max_elements_at(&self, size_index: usize) -> usize {
        1usize << (self.load_exponent * (size_index + 1))
    }

    /// Entries the largest generation holds without going above the load.
    pub fn max_elements(&self) -> usize {
        self.max_elements_at(self.max_sizing_index)
    }

    /// Generation to use for `num_elements` entries, coming from `current`.
    ///
    /// Grows by at most one generation per call, and never into the largest
    /// index. Shrinks as many generations as needed at once.
    pub fn size_index(&self, current: usize, num_elements: usize) -> usize {
        if current + 1 < self.max_sizing_index && num_elements > self.max_elements_at(current) {
            return current + 1;
        }

        let mut index = current;
        while index > 0 && num_elements < self.max_elements_at(index - 1) / 2 {
            index -= 1;
        }
        index
    }

    /// Generation index and bucket count suited to `num_elements` entries,
    /// capped at `max_size_index`.
    pub fn buckets_sizing(
        num_elements: usize,
        load_exponent: usize,
        max_size_index: usize,
    ) -> (usize, usize) {
        let factor = 1usize << load_exponent;
        let mut size_index = 0;
        let mut num_buckets = factor;
        let mut max_elements = num_buckets.saturating_mul(factor);

        while num_elements > max_elements && size_index < max_size_index {
            let Some(next) = max_elements.checked_mul(factor) else {
                break;
            };
            num_buckets = max_elements;
            max_elements = next;
            size_index += 1;
        }

        (size_index, num_buckets)
    }

    /// Largest generation index needed for `max_elements` entries.
    pub fn max_sizing_index_for(load_exponent: usize, max_elements: usize) -> usize {
        Self::buckets_sizing(max_elements, load_exponent, usize::MAX).0
    }
}

impl Default for SizingStrategy {
    fn default() -> Self {
        Self {
            load_exponent: DEFAULT_LOAD_EXPONENT,
            max_sizing_index: DEFAULT_GENERATIONS - 1,
        }
    }
}
