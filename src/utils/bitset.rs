//! Fixed-capacity bit set.
//!
//! Used wherever a pass needs a dense set keyed by small integers: the input
//! slot/component bits of the output dependency gather, visited markers for
//! instructions and blocks, and reachability during CFG cleanup.

use std::fmt;

/// A fixed-capacity set of `usize` indices stored 64 per word.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitSet {
    words: Vec<u64>,
    capacity: usize,
}

impl BitSet {
    /// Creates an empty set able to hold indices `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            capacity,
        }
    }

    /// Number of representable indices.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if no index is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Sets `index`, returning `true` if it was not set before.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the capacity.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(
            index < self.capacity,
            "bit {index} out of range for a set of {} bits",
            self.capacity
        );
        let word = &mut self.words[index / 64];
        let mask = 1u64 << (index % 64);
        let fresh = *word & mask == 0;
        *word |= mask;
        fresh
    }

    /// Clears `index`. Out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) {
        if index < self.capacity {
            self.words[index / 64] &= !(1u64 << (index % 64));
        }
    }

    /// Returns `true` if `index` is set. Out-of-range indices are never set.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < self.capacity && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Number of set indices.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clears every index, keeping the capacity.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Adds every index of `other`. Returns `true` if `self` grew.
    ///
    /// # Panics
    ///
    /// Panics if the capacities differ.
    pub fn union_with(&mut self, other: &Self) -> bool {
        self.zip_words(other, |a, b| a | b)
    }

    /// Keeps only indices also present in `other`. Returns `true` if `self` shrank.
    ///
    /// # Panics
    ///
    /// Panics if the capacities differ.
    pub fn intersect_with(&mut self, other: &Self) -> bool {
        self.zip_words(other, |a, b| a & b)
    }

    /// Removes every index present in `other`. Returns `true` if `self` shrank.
    ///
    /// # Panics
    ///
    /// Panics if the capacities differ.
    pub fn difference_with(&mut self, other: &Self) -> bool {
        self.zip_words(other, |a, b| a & !b)
    }

    /// Returns `true` if the two sets share no index.
    #[must_use]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .all(|(a, b)| a & b == 0)
    }

    /// Iterates over the set indices in ascending order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            words: &self.words,
            word_index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    fn zip_words(&mut self, other: &Self, op: impl Fn(u64, u64) -> u64) -> bool {
        assert_eq!(
            self.capacity, other.capacity,
            "bit set capacity mismatch"
        );
        let mut changed = false;
        for (a, &b) in self.words.iter_mut().zip(&other.words) {
            let next = op(*a, b);
            changed |= next != *a;
            *a = next;
        }
        changed
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a BitSet {
    type Item = usize;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over the indices of a [`BitSet`].
pub struct Iter<'a> {
    words: &'a [u64],
    word_index: usize,
    current: u64,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_index * 64 + bit);
            }
            self.word_index += 1;
            self.current = *self.words.get(self.word_index)?;
        }
    }
}
