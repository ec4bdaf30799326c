//! Random entry selection.
//!
//! `random_entry` picks a random non-empty bucket, then a random entry in
//! its chain, so entries in short chains are favored. `fair_random_entry`
//! evens that out by drawing from a contiguous sample of several buckets.
//! `sample` returns up to `count` distinct entries cheaply; it makes no
//! uniformity promise.

use crate::dict::Dict;
use crate::dict_type::DictType;
use crate::entry::{EntryKey, EntryRef};
use rand::Rng;

impl<K, V, D> Dict<K, V, D>
where
    D: DictType<K, V>,
{
    pub fn random_entry(&mut self) -> Option<EntryRef> {
        self.random_entry_with(&mut rand::rng())
    }

    pub fn random_entry_with<R>(&mut self, rng: &mut R) -> Option<EntryRef>
    where
        R: Rng + ?Sized,
    {
        if self.is_empty() {
            return None;
        }
        self.rehash_opportunistic();

        let head = match self.rehash_idx {
            // Buckets of generation 0 below the cursor are known to be empty.
            Some(start) => {
                let s0 = self.tables[0].size();
                let slots = self.slots();
                loop {
                    let h = rng.random_range(start..slots);
                    let head = if h >= s0 {
                        self.tables[1].head(h - s0)
                    } else {
                        self.tables[0].head(h)
                    };
                    if head.is_some() {
                        break head;
                    }
                }
            }
            None => {
                let m0 = self.tables[0].mask();
                loop {
                    let h = rng.random::<u64>() as usize & m0;
                    let head = self.tables[0].head(h);
                    if head.is_some() {
                        break head;
                    }
                }
            }
        };

        let chain = self.chain(head);
        let pick = rng.random_range(0..chain.len());
        chain.get(pick).copied().map(EntryRef::new)
    }

    /// Up to `count` distinct entries gathered from a random position.
    ///
    /// May return fewer than `count` entries, even none, when the walk runs
    /// out of steps in a sparse table.
    pub fn sample(&mut self, count: usize) -> Vec<EntryRef> {
        self.sample_with(count, &mut rand::rng())
    }

    pub fn sample_with<R>(&mut self, count: usize, rng: &mut R) -> Vec<EntryRef>
    where
        R: Rng + ?Sized,
    {
        let count = count.min(self.len());
        let mut out = Vec::with_capacity(count);
        if count == 0 {
            return out;
        }
        let mut max_steps = count.saturating_mul(self.config.sample_steps_factor);

        // Pay for the sample with some rehash work.
        for _ in 0..count {
            if !self.is_rehashing() {
                break;
            }
            self.rehash_opportunistic();
        }

        let tables = if self.is_rehashing() { 2 } else { 1 };
        let mut max_mask = self.tables[0].mask();
        if tables > 1 {
            max_mask = max_mask.max(self.tables[1].mask());
        }
        let mut i = rng.random::<u64>() as usize & max_mask;
        let mut empty_len = 0;

        while out.len() < count && max_steps > 0 {
            max_steps -= 1;
            for j in 0..tables {
                if tables == 2 && j == 0 {
                    if let Some(ridx) = self.rehash_idx {
                        if i < ridx {
                            // Already migrated. Jump ahead once the index
                            // has also passed the end of generation 1.
                            if i >= self.tables[1].size() {
                                i = ridx;
                            } else {
                                continue;
                            }
                        }
                    }
                }
                if i >= self.tables[j].size() {
                    continue;
                }
                let mut cur = self.tables[j].head(i);
                if cur.is_none() {
                    empty_len += 1;
                    if empty_len >= 5 && empty_len > count {
                        i = rng.random::<u64>() as usize & max_mask;
                        empty_len = 0;
                    }
                    continue;
                }
                empty_len = 0;
                while let Some(k) = cur {
                    out.push(EntryRef::new(k));
                    if out.len() == count {
                        return out;
                    }
                    cur = self.entries[k].next;
                }
            }
            i = (i + 1) & max_mask;
        }
        out
    }

    /// A random entry with a distribution closer to uniform than
    /// `random_entry`.
    pub fn fair_random_entry(&mut self) -> Option<EntryRef> {
        self.fair_random_entry_with(&mut rand::rng())
    }

    pub fn fair_random_entry_with<R>(&mut self, rng: &mut R) -> Option<EntryRef>
    where
        R: Rng + ?Sized,
    {
        let batch = self.sample_with(self.config.fair_batch, rng);
        if batch.is_empty() {
            return self.random_entry_with(rng);
        }
        let pick = rng.random_range(0..batch.len());
        batch.get(pick).copied()
    }

    fn chain(&self, head: Option<EntryKey>) -> Vec<EntryKey> {
        let mut out = Vec::new();
        let mut cur = head;
        while let Some(k) = cur {
            out.push(k);
            cur = self.entries[k].next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{DictConfig, ResizePolicy};
    use crate::dict::Dict;
    use crate::dict_type::HashedKeys;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    fn filled(n: u32) -> Dict<u32, u32> {
        let cfg = DictConfig::default().with_resize_policy(ResizePolicy::Enabled);
        let mut d = Dict::with_config(HashedKeys::new(), cfg);
        for k in 0..n {
            d.insert(k, k).unwrap();
        }
        d
    }

    /// Invariant: an empty table yields no random entry and an empty sample.
    #[test]
    fn empty_table_samples_nothing() {
        let mut d: Dict<u32, u32> = Dict::new();
        assert!(d.random_entry().is_none());
        assert!(d.fair_random_entry().is_none());
        assert!(d.sample(10).is_empty());
    }

    /// Invariant: a single entry is always the one returned.
    #[test]
    fn single_entry_is_always_picked() {
        let mut d = filled(1);
        for _ in 0..20 {
            let e = d.random_entry().unwrap();
            assert_eq!(e.key(&d), Some(&0));
            let e = d.fair_random_entry().unwrap();
            assert_eq!(e.key(&d), Some(&0));
        }
    }

    /// Invariant: random entries come from the live set, including mid-rehash.
    #[test]
    fn random_entry_returns_live_entries() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut d = filled(33);
        d.pause_rehashing();
        assert!(d.is_rehashing());
        let mut seen = HashSet::new();
        for _ in 0..2000 {
            let e = d.random_entry_with(&mut rng).unwrap();
            let k = *e.key(&d).unwrap();
            assert!(k < 33);
            seen.insert(k);
        }
        d.resume_rehashing();
        assert!(seen.len() > 25, "only {} distinct keys sampled", seen.len());
    }

    /// Invariant: a sample holds distinct live entries and never more than asked.
    #[test]
    fn sample_is_distinct_and_bounded() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut d = filled(200);
        for count in [1, 5, 50, 500] {
            let s = d.sample_with(count, &mut rng);
            assert!(s.len() <= count.min(200));
            assert!(!s.is_empty());
            let keys: HashSet<u32> = s.iter().map(|e| *e.key(&d).unwrap()).collect();
            assert_eq!(keys.len(), s.len(), "duplicate entries in sample");
        }
    }

    /// Invariant: a dense table fills the whole requested sample.
    #[test]
    fn dense_table_fills_sample() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut d = filled(64);
        while d.rehash_step(100) {}
        let s = d.sample_with(16, &mut rng);
        assert_eq!(s.len(), 16);
    }

    /// Invariant: fair sampling reaches every entry of a small table.
    #[test]
    fn fair_random_entry_covers_table() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut d = filled(20);
        let mut hits: HashMap<u32, usize> = HashMap::new();
        for _ in 0..4000 {
            let e = d.fair_random_entry_with(&mut rng).unwrap();
            *hits.entry(*e.key(&d).unwrap()).or_default() += 1;
        }
        assert_eq!(hits.len(), 20);
    }
}
