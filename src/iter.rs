//! Stateful iterators over a `Dict`.
//!
//! `DictIterator` walks generation 0 bucket by bucket, then generation 1
//! when a rehash is in progress, following each chain in order. It holds the
//! table mutably, and callers reach the table through `dict()` while
//! iterating:
//! - A safe iterator pauses rehashing on its first `next()`, so entries stay
//!   where they are. Deleting the entry just yielded is allowed because the
//!   successor has already been captured. If the caller deletes that
//!   successor instead, the bucket is walked again from its head, skipping
//!   the entries already yielded from it.
//! - An unsafe iterator records a fingerprint of both generations on its
//!   first `next()` and checks it on release. Any structural change in
//!   between (insert, delete, resize, rehash step) is a programmer error and
//!   panics.
//!
//! `Iter` is the plain borrowing iterator for read-only traversal.

use crate::dict::Dict;
use crate::dict_type::DictType;
use crate::entry::{Entry, EntryKey, EntryRef, Value};
use crate::error::DictError;
use crate::generation::Generation;
use slotmap::SlotMap;

pub struct DictIterator<'a, K, V, D>
where
    D: DictType<K, V>,
{
    dict: &'a mut Dict<K, V, D>,
    safe: bool,
    table: usize,
    index: usize, // next bucket to open
    started: bool,
    finished: bool,
    next_entry: Option<EntryKey>,
    yielded: Vec<EntryKey>, // from the open bucket
    fingerprint: u64,
}

impl<'a, K, V, D> DictIterator<'a, K, V, D>
where
    D: DictType<K, V>,
{
    fn new(dict: &'a mut Dict<K, V, D>, safe: bool) -> Self {
        Self {
            dict,
            safe,
            table: 0,
            index: 0,
            started: false,
            finished: false,
            next_entry: None,
            yielded: Vec::new(),
            fingerprint: 0,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    /// The table being iterated, for mutation during iteration.
    pub fn dict(&mut self) -> &mut Dict<K, V, D> {
        &mut *self.dict
    }

    pub fn dict_ref(&self) -> &Dict<K, V, D> {
        &*self.dict
    }

    /// End the iteration now: resume rehashing, or verify the fingerprint.
    pub fn release(self) {
        drop(self);
    }

    fn start(&mut self) {
        self.started = true;
        if self.safe {
            self.dict.pause.pause();
        } else {
            self.fingerprint = self.dict.fingerprint();
        }
    }

    /// First live entry of the open bucket not yet yielded.
    fn rewalk_open_bucket(&self) -> Option<EntryKey> {
        let mut cur = self.dict.tables[self.table].head(self.index.checked_sub(1)?);
        while let Some(k) = cur {
            if !self.yielded.contains(&k) {
                return Some(k);
            }
            cur = self.dict.entries.get(k)?.next;
        }
        None
    }
}

impl<'a, K, V, D> Iterator for DictIterator<'a, K, V, D>
where
    D: DictType<K, V>,
{
    type Item = EntryRef;

    fn next(&mut self) -> Option<EntryRef> {
        if self.finished {
            return None;
        }
        if !self.started {
            self.start();
        }
        loop {
            if let Some(k) = self.next_entry.take() {
                match self.dict.entries.get(k) {
                    Some(e) => {
                        self.next_entry = e.next;
                        self.yielded.push(k);
                        return Some(EntryRef::new(k));
                    }
                    // The caller deleted the captured successor.
                    None => {
                        self.next_entry = self.rewalk_open_bucket();
                        continue;
                    }
                }
            }

            if self.index >= self.dict.tables[self.table].size() {
                if self.table == 0 && self.dict.is_rehashing() {
                    self.table = 1;
                    self.index = 0;
                    continue;
                }
                self.finished = true;
                return None;
            }
            self.next_entry = self.dict.tables[self.table].head(self.index);
            self.yielded.clear();
            self.index += 1;
        }
    }
}

impl<'a, K, V, D> Drop for DictIterator<'a, K, V, D>
where
    D: DictType<K, V>,
{
    fn drop(&mut self) {
        if !self.started {
            return;
        }
        if self.safe {
            self.dict.pause.resume();
            return;
        }
        let found = self.dict.fingerprint();
        if found != self.fingerprint && !std::thread::panicking() {
            panic!(
                "{}",
                DictError::FingerprintViolation {
                    expected: self.fingerprint,
                    found,
                }
            );
        }
    }
}

impl<K, V, D> Dict<K, V, D>
where
    D: DictType<K, V>,
{
    /// Iterator that pauses rehashing and tolerates deleting the yielded entry.
    pub fn safe_iter(&mut self) -> DictIterator<'_, K, V, D> {
        DictIterator::new(self, true)
    }

    /// Iterator that allows no structural change at all; a change is
    /// detected on release and panics.
    pub fn unsafe_iter(&mut self) -> DictIterator<'_, K, V, D> {
        DictIterator::new(self, false)
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tables: &self.tables,
            entries: &self.entries,
            table: 0,
            index: 0,
            next_entry: None,
            remaining: self.len(),
        }
    }

    /// 64-bit mix over the array address, exponent and occupancy of both
    /// generations. Order-sensitive, so swapped generations differ.
    pub(crate) fn fingerprint(&self) -> u64 {
        let [a, b, c] = self.tables[0].fingerprint_parts();
        let [d, e, f] = self.tables[1].fingerprint_parts();
        let mut hash = 0u64;
        for x in [a, b, c, d, e, f] {
            hash = hash.wrapping_add(x);
            hash = (!hash).wrapping_add(hash << 21);
            hash ^= hash >> 24;
            hash = hash.wrapping_add(hash << 3).wrapping_add(hash << 8);
            hash ^= hash >> 14;
            hash = hash.wrapping_add(hash << 2).wrapping_add(hash << 4);
            hash ^= hash >> 28;
            hash = hash.wrapping_add(hash << 31);
        }
        hash
    }
}

/// Borrowing iterator over `(&K, &Value<V>)` in bucket order.
pub struct Iter<'a, K, V> {
    tables: &'a [Generation; 2],
    entries: &'a SlotMap<EntryKey, Entry<K, V>>,
    table: usize,
    index: usize,
    next_entry: Option<EntryKey>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a Value<V>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(k) = self.next_entry {
                let entries = self.entries;
                let e = &entries[k];
                self.next_entry = e.next;
                self.remaining -= 1;
                return Some((&e.key, &e.value));
            }
            if self.remaining == 0 {
                return None;
            }
            if self.index >= self.tables[self.table].size() {
                if self.table == 1 {
                    return None;
                }
                self.table = 1;
                self.index = 0;
                continue;
            }
            self.next_entry = self.tables[self.table].head(self.index);
            self.index += 1;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K, V> ExactSizeIterator for Iter<'a, K, V> {}

impl<'a, K, V, D> IntoIterator for &'a Dict<K, V, D>
where
    D: DictType<K, V>,
{
    type Item = (&'a K, &'a Value<V>);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{DictConfig, ResizePolicy};
    use crate::dict::Dict;
    use crate::dict_type::{DictType, HashedKeys};
    use crate::entry::Value;
    use std::collections::HashSet;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn filled(n: u32) -> Dict<u32, u32> {
        let cfg = DictConfig::default().with_resize_policy(ResizePolicy::Enabled);
        let mut d = Dict::with_config(HashedKeys::new(), cfg);
        for k in 0..n {
            d.insert(k, k * 2).unwrap();
        }
        d
    }

    /// Invariant: a safe iterator yields every key exactly once, even mid-rehash.
    #[test]
    fn safe_iter_visits_each_entry_once() {
        let mut d = filled(5);
        assert!(d.is_rehashing());
        let mut seen = HashSet::new();
        let mut it = d.safe_iter();
        while let Some(e) = it.next() {
            let k = *e.key(it.dict_ref()).unwrap();
            assert!(seen.insert(k), "key {k} yielded twice");
        }
        drop(it);
        assert_eq!(seen, (0..5).collect());
    }

    /// Invariant: rehashing stays paused while a safe iterator is live.
    #[test]
    fn safe_iter_pauses_rehash_until_release() {
        let mut d = filled(5);
        let before = d.generation_used();
        let mut it = d.safe_iter();
        assert!(!it.dict_ref().is_paused(), "pause starts on first next()");
        it.next();
        assert!(it.dict_ref().is_paused());
        for k in 0..5 {
            it.dict().find(&k);
        }
        assert_eq!(it.dict_ref().generation_used(), before);
        it.release();
        assert!(!d.is_paused());
    }

    /// Invariant: deleting the yielded entry during safe iteration keeps the walk intact.
    #[test]
    fn safe_iter_allows_deleting_current() {
        let mut d = filled(40);
        let mut it = d.safe_iter();
        let mut visited = 0;
        while let Some(e) = it.next() {
            let k = *e.key(it.dict_ref()).unwrap();
            visited += 1;
            if k % 2 == 0 {
                it.dict().delete(&k).unwrap();
            }
        }
        drop(it);
        assert_eq!(visited, 40);
        assert_eq!(d.len(), 20);
        assert!(d.iter().all(|(k, _)| k % 2 == 1));
    }

    /// Every key lands in bucket 0.
    struct OneBucket;
    impl DictType<u32, u32> for OneBucket {
        fn hash(&self, _key: &u32) -> u64 {
            0
        }
        fn key_eq(&self, a: &u32, b: &u32) -> bool {
            a == b
        }
    }

    /// Invariant: deleting the not-yet-yielded successor skips only that entry.
    #[test]
    fn safe_iter_survives_deleting_successor() {
        let cfg = DictConfig::default().with_resize_policy(ResizePolicy::Forbidden);
        let mut d: Dict<u32, u32, OneBucket> = Dict::with_config(OneBucket, cfg);
        for k in 0..5 {
            d.insert(k, k).unwrap();
        }
        // Head insertion: the chain reads 4, 3, 2, 1, 0.
        let mut it = d.safe_iter();
        let first = it.next().unwrap();
        assert_eq!(first.key(it.dict_ref()), Some(&4));
        it.dict().delete(&3).unwrap();
        let mut seen = vec![4];
        while let Some(e) = it.next() {
            seen.push(*e.key(it.dict_ref()).unwrap());
        }
        drop(it);
        assert_eq!(seen, vec![4, 2, 1, 0]);
        assert!(!d.is_paused());
    }

    /// Invariant: deleting both the yielded entry and its successor still
    /// reaches the rest of the chain exactly once.
    #[test]
    fn safe_iter_survives_deleting_current_and_successor() {
        let cfg = DictConfig::default().with_resize_policy(ResizePolicy::Forbidden);
        let mut d: Dict<u32, u32, OneBucket> = Dict::with_config(OneBucket, cfg);
        for k in 0..5 {
            d.insert(k, k).unwrap();
        }
        let mut it = d.safe_iter();
        let mut seen = Vec::new();
        while let Some(e) = it.next() {
            let k = *e.key(it.dict_ref()).unwrap();
            seen.push(k);
            if k == 3 {
                it.dict().delete(&3).unwrap();
                it.dict().delete(&2).unwrap();
            }
        }
        drop(it);
        assert_eq!(seen, vec![4, 3, 1, 0]);
        assert_eq!(d.len(), 3);
    }

    /// Invariant: a clean unsafe iteration releases without complaint.
    #[test]
    fn unsafe_iter_without_mutation_is_fine() {
        let mut d = filled(10);
        let mut it = d.unsafe_iter();
        let mut n = 0;
        while let Some(e) = it.next() {
            if let Some(Value::Object(v)) = e.value_mut(it.dict()) {
                *v += 1;
            }
            n += 1;
        }
        it.release();
        assert_eq!(n, 10);
        assert_eq!(d.fetch_value(&3), Some(&Value::Object(7)));
    }

    /// Invariant: a structural change under an unsafe iterator panics on release.
    #[test]
    fn unsafe_iter_detects_mutation() {
        let mut d = filled(10);
        let res = catch_unwind(AssertUnwindSafe(|| {
            let mut it = d.unsafe_iter();
            it.next();
            it.dict().insert(1000, 0).unwrap();
            it.release();
        }));
        let err = res.expect_err("fingerprint mismatch must panic");
        let msg = err
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_default();
        assert!(msg.contains("fingerprint mismatch"), "got: {msg}");
    }

    /// Invariant: an iterator that never started neither pauses nor checks.
    #[test]
    fn unstarted_iterators_release_cleanly() {
        let mut d = filled(3);
        d.safe_iter().release();
        assert!(!d.is_paused());
        let mut it = d.unsafe_iter();
        it.dict().insert(99, 0).unwrap();
        it.release();
        assert_eq!(d.len(), 4);
    }

    /// Invariant: nested safe iterators compose through the pause count.
    #[test]
    fn nested_pauses_through_iterators() {
        let mut d = filled(5);
        d.pause_rehashing();
        {
            let mut it = d.safe_iter();
            it.next();
            assert!(it.dict_ref().is_paused());
        }
        assert!(d.is_paused());
        d.resume_rehashing();
        assert!(!d.is_paused());
    }

    /// Invariant: the borrowing iterator reports an exact length and sees everything.
    #[test]
    fn plain_iter_is_exact() {
        let d = filled(37);
        let it = d.iter();
        assert_eq!(it.len(), 37);
        let mut keys: Vec<u32> = (&d).into_iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..37).collect::<Vec<_>>());
        let empty: Dict<u32, u32> = Dict::new();
        assert_eq!(empty.iter().count(), 0);
    }

    /// Invariant: fingerprints track structure, not values.
    #[test]
    fn fingerprint_ignores_value_writes() {
        let mut d = filled(4);
        let fp = d.fingerprint();
        let e = d.find(&1).unwrap();
        d.set_unsigned(e, 11).unwrap();
        assert_eq!(d.fingerprint(), fp);
        d.delete(&1).unwrap();
        assert_ne!(d.fingerprint(), fp);
    }
}
