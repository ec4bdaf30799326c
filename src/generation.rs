//! Generation: one power-of-two bucket array of chain heads.

use crate::entry::EntryKey;
use std::collections::TryReserveError;
use std::mem::size_of;

/// A bucket holds the head of its collision chain.
pub(crate) type Bucket = Option<EntryKey>;

#[derive(Debug, Default)]
pub(crate) struct Generation {
    pub(crate) buckets: Vec<Bucket>,
    pub(crate) exp: Option<u8>, // None: not allocated
    pub(crate) used: usize,
}

impl Generation {
    pub(crate) const fn unallocated() -> Self {
        Self {
            buckets: Vec::new(),
            exp: None,
            used: 0,
        }
    }

    pub(crate) fn allocate(exp: u8) -> Self {
        Self {
            buckets: vec![None; 1usize << exp],
            exp: Some(exp),
            used: 0,
        }
    }

    /// Like `allocate`, but reports allocation failure instead of aborting.
    pub(crate) fn try_allocate(exp: u8) -> Result<Self, TryReserveError> {
        let size = 1usize << exp;
        let mut buckets = Vec::new();
        buckets.try_reserve_exact(size)?;
        buckets.resize(size, None);
        Ok(Self {
            buckets,
            exp: Some(exp),
            used: 0,
        })
    }

    pub(crate) fn size(&self) -> usize {
        match self.exp {
            Some(e) => 1usize << e,
            None => 0,
        }
    }

    pub(crate) fn mask(&self) -> usize {
        self.size().saturating_sub(1)
    }

    pub(crate) fn is_allocated(&self) -> bool {
        self.exp.is_some()
    }

    #[inline]
    pub(crate) fn head(&self, idx: usize) -> Option<EntryKey> {
        self.buckets.get(idx).copied().flatten()
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::unallocated();
    }

    /// Array address, exponent (-1 when unallocated) and occupancy.
    pub(crate) fn fingerprint_parts(&self) -> [u64; 3] {
        [
            self.buckets.as_ptr() as usize as u64,
            self.exp.map_or(-1i64, i64::from) as u64,
            self.used as u64,
        ]
    }
}

/// Smallest exponent `e >= initial_exp` with `1 << e >= size`.
pub(crate) fn next_exp(size: usize, initial_exp: u8) -> u8 {
    let max = (usize::BITS - 1) as u8;
    if size >= isize::MAX as usize {
        return max;
    }
    let mut e = initial_exp.min(max);
    while (1usize << e) < size {
        e += 1;
    }
    e
}

/// Byte size of a bucket array with `slots` buckets, if it is addressable.
pub(crate) fn bucket_bytes(slots: usize) -> Option<usize> {
    slots
        .checked_mul(size_of::<Bucket>())
        .filter(|&bytes| bytes <= isize::MAX as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_exp_rounds_up_to_power_of_two() {
        assert_eq!(next_exp(0, 2), 2);
        assert_eq!(next_exp(4, 2), 2);
        assert_eq!(next_exp(5, 2), 3);
        assert_eq!(next_exp(1024, 2), 10);
        assert_eq!(next_exp(1025, 2), 11);
        assert_eq!(next_exp(3, 0), 2);
    }

    #[test]
    fn next_exp_saturates_for_huge_sizes() {
        assert_eq!(next_exp(usize::MAX, 2), (usize::BITS - 1) as u8);
        assert_eq!(next_exp(isize::MAX as usize, 2), (usize::BITS - 1) as u8);
    }

    #[test]
    fn bucket_bytes_rejects_overflow() {
        assert_eq!(bucket_bytes(4), Some(4 * size_of::<Bucket>()));
        assert_eq!(bucket_bytes(1usize << (usize::BITS - 1)), None);
    }

    #[test]
    fn unallocated_generation_has_zero_size_and_mask() {
        let g = Generation::unallocated();
        assert_eq!(g.size(), 0);
        assert_eq!(g.mask(), 0);
        assert!(!g.is_allocated());
        assert!(g.head(0).is_none());
        assert_eq!(g.fingerprint_parts()[1], u64::MAX);
    }

    #[test]
    fn allocation_is_empty_and_sized() {
        let g = Generation::allocate(3);
        assert_eq!(g.size(), 8);
        assert_eq!(g.mask(), 7);
        assert_eq!(g.buckets.len(), 8);
        assert!(g.buckets.iter().all(Option::is_none));

        let t = Generation::try_allocate(3).unwrap();
        assert_eq!(t.buckets.len(), 8);
        assert_eq!(t.used, 0);
    }
}
