//! Dict: two-generation chained hash table with incremental rehashing.
//!
//! `tables[0]` is the active generation. While a resize is in progress
//! `tables[1]` holds the target generation and `rehash_idx` is the next
//! bucket of `tables[0]` to migrate; every bucket below it is empty. New
//! entries go to `tables[1]` during a rehash, and lookups probe both.

use crate::config::{DictConfig, ResizePolicy};
use crate::dict_type::{DictType, HashedKeys};
use crate::entry::{Entry, EntryKey, EntryRef, UnlinkedEntry, Value};
use crate::error::{DictError, RefuseReason};
use crate::generation::{self, Generation};
use crate::rehash_pause::PauseCounter;
use core::hash::Hash;
use slotmap::SlotMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Outcome of `Dict::insert_or_replace`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Replaced {
    Inserted,
    Updated,
}

pub struct Dict<K, V, D = HashedKeys>
where
    D: DictType<K, V>,
{
    pub(crate) dict_type: D,
    pub(crate) config: DictConfig,
    pub(crate) tables: [Generation; 2],
    pub(crate) entries: SlotMap<EntryKey, Entry<K, V>>, // storage; chains link by key
    pub(crate) rehash_idx: Option<usize>,
    pub(crate) pause: PauseCounter,
}

impl<K, V> Dict<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_type(HashedKeys::new())
    }
}

impl<K, V> Default for Dict<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, D> Dict<K, V, D>
where
    D: DictType<K, V>,
{
    pub fn with_type(dict_type: D) -> Self {
        Self::with_config(dict_type, DictConfig::default())
    }

    pub fn with_config(dict_type: D, config: DictConfig) -> Self {
        Self {
            dict_type,
            config,
            tables: [Generation::unallocated(), Generation::unallocated()],
            entries: SlotMap::with_key(),
            rehash_idx: None,
            pause: PauseCounter::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tables[0].used + self.tables[1].used
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bucket count across both generations.
    pub fn slots(&self) -> usize {
        self.tables[0].size() + self.tables[1].size()
    }

    pub fn is_rehashing(&self) -> bool {
        self.rehash_idx.is_some()
    }

    /// Next bucket of the old generation to migrate, while rehashing.
    pub fn rehash_index(&self) -> Option<usize> {
        self.rehash_idx
    }

    pub fn generation_sizes(&self) -> [usize; 2] {
        [self.tables[0].size(), self.tables[1].size()]
    }

    pub fn generation_used(&self) -> [usize; 2] {
        [self.tables[0].used, self.tables[1].used]
    }

    pub fn dict_type(&self) -> &D {
        &self.dict_type
    }

    pub fn config(&self) -> &DictConfig {
        &self.config
    }

    /// Pin this table's resize policy, or follow the process-wide one with `None`.
    pub fn set_resize_policy(&mut self, policy: Option<ResizePolicy>) {
        self.config.resize_policy = policy;
    }

    /// Block rehash steps until a matching `resume_rehashing`.
    pub fn pause_rehashing(&mut self) {
        self.pause.pause();
    }

    pub fn resume_rehashing(&mut self) {
        self.pause.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn get_hash(&self, key: &K) -> u64 {
        self.dict_type.hash(key)
    }

    fn policy(&self) -> ResizePolicy {
        self.config.effective_policy()
    }

    // ---- resizing ----

    fn expand_inner(&mut self, size: usize, try_alloc: bool) -> Result<(), DictError> {
        if self.is_rehashing() {
            return Err(RefuseReason::Rehashing.into());
        }
        if self.tables[0].used > size {
            return Err(RefuseReason::TooSmall.into());
        }

        let exp = generation::next_exp(size, self.config.initial_exp);
        let new_size = 1usize << exp;
        let Some(bytes) = generation::bucket_bytes(new_size).filter(|_| new_size >= size) else {
            warn!(requested = size, "refusing expand: bucket array size overflows");
            return Err(RefuseReason::Overflow.into());
        };
        if Some(exp) == self.tables[0].exp {
            return Err(RefuseReason::SameSize.into());
        }

        let table = if try_alloc {
            Generation::try_allocate(exp).map_err(|_| {
                warn!(bytes, "bucket array allocation failed");
                DictError::AllocationFailure { bytes }
            })?
        } else {
            Generation::allocate(exp)
        };

        // First allocation: nothing to migrate.
        if !self.tables[0].is_allocated() {
            self.tables[0] = table;
            return Ok(());
        }

        debug!(
            from = self.tables[0].size(),
            to = new_size,
            used = self.tables[0].used,
            "starting incremental rehash"
        );
        self.tables[1] = table;
        self.rehash_idx = Some(0);
        Ok(())
    }

    /// Start growing (or shrinking) toward the smallest power of two that
    /// holds `size` buckets. The bucket array is allocated eagerly; entries
    /// migrate incrementally afterwards.
    pub fn expand(&mut self, size: usize) -> Result<(), DictError> {
        self.expand_inner(size, false)
    }

    /// Like `expand`, but a failed allocation returns `AllocationFailure`
    /// instead of aborting the process.
    pub fn try_expand(&mut self, size: usize) -> Result<(), DictError> {
        self.expand_inner(size, true)
    }

    /// Resize to the smallest table that holds every entry (never below the
    /// initial size). Only runs under `ResizePolicy::Enabled`.
    pub fn resize(&mut self) -> Result<(), DictError> {
        if self.policy() != ResizePolicy::Enabled {
            return Err(RefuseReason::Policy.into());
        }
        if self.is_rehashing() {
            return Err(RefuseReason::Rehashing.into());
        }
        let minimal = self.tables[0].used.max(self.config.initial_size());
        self.expand(minimal)
    }

    fn expand_allowed(&self) -> bool {
        let used = self.tables[0].used;
        let next = 1usize << generation::next_exp(used + 1, self.config.initial_exp);
        let more_mem = generation::bucket_bytes(next).unwrap_or(usize::MAX);
        let ratio = used as f64 / self.tables[0].size() as f64;
        self.dict_type.expand_allowed(more_mem, ratio)
    }

    fn expand_if_needed(&mut self) -> Result<(), DictError> {
        if self.is_rehashing() {
            return Ok(());
        }
        if !self.tables[0].is_allocated() {
            return self.expand(self.config.initial_size());
        }
        let used = self.tables[0].used;
        let size = self.tables[0].size();
        let policy = self.policy();
        if (policy == ResizePolicy::Enabled && used >= size)
            || (policy != ResizePolicy::Forbidden && used / size > self.config.force_resize_ratio)
        {
            if !self.expand_allowed() {
                return Ok(());
            }
            return self.expand(used + 1);
        }
        Ok(())
    }

    // ---- rehash engine ----

    /// Migrate up to `n` non-empty buckets to the new generation.
    ///
    /// Returns `true` while migration work remains, and `false` once the
    /// rehash has completed or when there is nothing it may do (not
    /// rehashing, paused, or held back by the resize policy). At most
    /// `10 * n` empty buckets are skipped per call.
    pub fn rehash_step(&mut self, n: usize) -> bool {
        let Some(mut idx) = self.rehash_idx else {
            return false;
        };
        if self.pause.is_paused() {
            return false;
        }
        match self.policy() {
            ResizePolicy::Forbidden => return false,
            ResizePolicy::AvoidIfPossible => {
                // Growth and shrink alike proceed only past the force ratio.
                let (s0, s1) = (self.tables[0].size(), self.tables[1].size());
                if s0.max(s1) / s0.min(s1) < self.config.force_resize_ratio {
                    return false;
                }
            }
            ResizePolicy::Enabled => {}
        }

        let mut empty_visits = n.saturating_mul(10);
        let mask1 = self.tables[1].mask();
        for _ in 0..n {
            if self.tables[0].used == 0 {
                break;
            }
            debug_assert!(idx < self.tables[0].size());
            while self.tables[0].buckets[idx].is_none() {
                idx += 1;
                empty_visits -= 1;
                if empty_visits == 0 {
                    self.rehash_idx = Some(idx);
                    return true;
                }
            }

            let mut cur = self.tables[0].buckets[idx].take();
            while let Some(k) = cur {
                let entry = &mut self.entries[k];
                cur = entry.next;
                let h = self.dict_type.hash(&entry.key) as usize & mask1;
                entry.next = self.tables[1].buckets[h];
                self.tables[1].buckets[h] = Some(k);
                self.tables[0].used -= 1;
                self.tables[1].used += 1;
            }
            idx += 1;
        }
        self.rehash_idx = Some(idx);

        if self.tables[0].used == 0 {
            self.finish_rehash();
            return false;
        }
        true
    }

    fn finish_rehash(&mut self) {
        let promoted = std::mem::replace(&mut self.tables[1], Generation::unallocated());
        debug!(
            size = promoted.size(),
            used = promoted.used,
            "incremental rehash complete"
        );
        self.tables[0] = promoted;
        self.rehash_idx = None;
    }

    /// Rehash in batches of `config.rehash_batch` buckets until done or
    /// until `ms` milliseconds have passed. Returns the number of buckets
    /// requested across batches; 0 while rehashing is paused.
    pub fn rehash_milliseconds(&mut self, ms: u64) -> usize {
        if self.pause.is_paused() {
            return 0;
        }
        let start = Instant::now();
        let budget = Duration::from_millis(ms);
        let batch = self.config.rehash_batch.max(1);
        let mut rehashes = 0;
        while self.rehash_step(batch) {
            rehashes += batch;
            if start.elapsed() > budget {
                break;
            }
        }
        trace!(rehashes, elapsed = ?start.elapsed(), "time-boxed rehash");
        rehashes
    }

    /// The single bucket step every operation pays while a rehash is running.
    #[inline]
    pub(crate) fn rehash_opportunistic(&mut self) {
        if self.rehash_idx.is_some() && !self.pause.is_paused() {
            self.rehash_step(1);
        }
    }

    // ---- lookup ----

    #[inline]
    fn keys_match(&self, query: &K, stored: &K) -> bool {
        core::ptr::eq(query, stored) || self.dict_type.key_eq(query, stored)
    }

    fn lookup(&self, key: &K, hash: u64) -> Option<EntryKey> {
        for table in 0..=1 {
            let idx = hash as usize & self.tables[table].mask();
            let mut cur = self.tables[table].head(idx);
            while let Some(k) = cur {
                let e = &self.entries[k];
                if self.keys_match(key, &e.key) {
                    return Some(k);
                }
                cur = e.next;
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    pub fn find(&mut self, key: &K) -> Option<EntryRef> {
        if self.is_empty() {
            return None;
        }
        self.rehash_opportunistic();
        let hash = self.dict_type.hash(key);
        self.lookup(key, hash).map(EntryRef::new)
    }

    pub fn contains_key(&mut self, key: &K) -> bool {
        self.find(key).is_some()
    }

    pub fn fetch_value(&mut self, key: &K) -> Option<&Value<V>> {
        let e = self.find(key)?;
        self.handle_value(e)
    }

    // ---- insertion ----

    /// Link a new entry for `key` with a zeroed `Value::U64(0)` value and
    /// return it for the caller to fill in.
    ///
    /// A present key yields `Err(AlreadyExists(existing))` and leaves the
    /// table unchanged. A failed resize check is returned as is.
    pub fn insert_raw(&mut self, key: K) -> Result<EntryRef, DictError> {
        self.rehash_opportunistic();
        self.expand_if_needed()?;

        let hash = self.dict_type.hash(&key);
        if let Some(existing) = self.lookup(&key, hash) {
            return Err(DictError::AlreadyExists(EntryRef::new(existing)));
        }

        let table = if self.is_rehashing() { 1 } else { 0 };
        let idx = hash as usize & self.tables[table].mask();
        let metadata = vec![0u8; self.dict_type.entry_metadata_size()].into_boxed_slice();
        let key = self.dict_type.key_dup(key);
        let next = self.tables[table].buckets[idx];
        let k = self.entries.insert(Entry {
            key,
            value: Value::default(),
            next,
            metadata,
        });
        self.tables[table].buckets[idx] = Some(k);
        self.tables[table].used += 1;
        Ok(EntryRef::new(k))
    }

    pub fn insert(&mut self, key: K, val: V) -> Result<EntryRef, DictError> {
        let e = self.insert_raw(key)?;
        let value = Value::Object(self.dict_type.val_dup(val));
        self.entries[e.raw()].value = value;
        Ok(e)
    }

    /// Insert, or overwrite the value of an existing key. The new value is
    /// stored before the old one is destroyed, so values that refer to their
    /// predecessor stay valid during the swap.
    pub fn insert_or_replace(&mut self, key: K, val: V) -> Result<Replaced, DictError> {
        match self.insert_raw(key) {
            Ok(e) => {
                let value = Value::Object(self.dict_type.val_dup(val));
                self.entries[e.raw()].value = value;
                Ok(Replaced::Inserted)
            }
            Err(DictError::AlreadyExists(e)) => {
                let value = Value::Object(self.dict_type.val_dup(val));
                let old = std::mem::replace(&mut self.entries[e.raw()].value, value);
                self.destroy_value(old);
                Ok(Replaced::Updated)
            }
            Err(err) => Err(err),
        }
    }

    /// The entry for `key`, created with a zeroed value if absent.
    pub fn add_or_find(&mut self, key: K) -> Result<EntryRef, DictError> {
        match self.insert_raw(key) {
            Ok(e) | Err(DictError::AlreadyExists(e)) => Ok(e),
            Err(err) => Err(err),
        }
    }

    // ---- removal ----

    fn generic_delete(&mut self, key: &K) -> Option<Entry<K, V>> {
        if self.is_empty() {
            return None;
        }
        self.rehash_opportunistic();
        let hash = self.dict_type.hash(key);

        for table in 0..=1 {
            let idx = hash as usize & self.tables[table].mask();
            let mut prev: Option<EntryKey> = None;
            let mut cur = self.tables[table].head(idx);
            while let Some(k) = cur {
                let (matched, next) = {
                    let e = &self.entries[k];
                    (self.keys_match(key, &e.key), e.next)
                };
                if matched {
                    match prev {
                        Some(p) => self.entries[p].next = next,
                        None => self.tables[table].buckets[idx] = next,
                    }
                    self.tables[table].used -= 1;
                    return self.entries.remove(k);
                }
                prev = cur;
                cur = next;
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    /// Remove and destroy the entry for `key`. A miss is `NotFound` and
    /// changes nothing, however many times it is repeated.
    pub fn delete(&mut self, key: &K) -> Result<(), DictError> {
        let entry = self.generic_delete(key).ok_or(DictError::NotFound)?;
        self.destroy_entry(entry);
        Ok(())
    }

    /// Remove the entry for `key` without destroying it.
    pub fn unlink(&mut self, key: &K) -> Option<UnlinkedEntry<K, V>> {
        self.generic_delete(key).map(UnlinkedEntry::from_entry)
    }

    /// Run the destroy hooks on an entry returned by `unlink`.
    pub fn free_unlinked(&self, entry: UnlinkedEntry<K, V>) {
        let (key, value, _metadata) = entry.into_parts();
        self.dict_type.key_destroy(key);
        self.destroy_value(value);
    }

    fn destroy_value(&self, value: Value<V>) {
        if let Value::Object(v) = value {
            self.dict_type.val_destroy(v);
        }
    }

    fn destroy_entry(&self, entry: Entry<K, V>) {
        self.dict_type.key_destroy(entry.key);
        self.destroy_value(entry.value);
    }

    /// Destroy every entry and release both generations.
    pub fn clear(&mut self) {
        self.clear_with(|_| {});
    }

    /// `clear`, calling `callback` once every 65536 buckets so long teardowns
    /// can yield to other work.
    pub fn clear_with<F>(&mut self, mut callback: F)
    where
        F: FnMut(&Self),
    {
        for table in 0..=1 {
            let size = self.tables[table].size();
            let mut i = 0;
            while i < size && self.tables[table].used > 0 {
                if i & 0xffff == 0 {
                    callback(&*self);
                }
                let mut cur = self.tables[table].buckets[i].take();
                while let Some(k) = cur {
                    let Some(entry) = self.entries.remove(k) else {
                        break;
                    };
                    cur = entry.next;
                    self.tables[table].used -= 1;
                    self.destroy_entry(entry);
                }
                i += 1;
            }
            self.tables[table].reset();
        }
        self.rehash_idx = None;
    }

    // ---- handle access ----

    pub(crate) fn handle_key(&self, h: EntryRef) -> Option<&K> {
        self.entries.get(h.raw()).map(|e| &e.key)
    }

    pub(crate) fn handle_value(&self, h: EntryRef) -> Option<&Value<V>> {
        self.entries.get(h.raw()).map(|e| &e.value)
    }

    pub(crate) fn handle_value_mut(&mut self, h: EntryRef) -> Option<&mut Value<V>> {
        self.entries.get_mut(h.raw()).map(|e| &mut e.value)
    }

    pub(crate) fn handle_metadata(&self, h: EntryRef) -> Option<&[u8]> {
        self.entries.get(h.raw()).map(|e| &e.metadata[..])
    }

    pub(crate) fn handle_metadata_mut(&mut self, h: EntryRef) -> Option<&mut [u8]> {
        self.entries.get_mut(h.raw()).map(|e| &mut e.metadata[..])
    }

    fn replace_value(&mut self, h: EntryRef, value: Value<V>) -> Result<(), DictError> {
        let slot = self
            .entries
            .get_mut(h.raw())
            .map(|e| &mut e.value)
            .ok_or(DictError::NotFound)?;
        let old = std::mem::replace(slot, value);
        self.destroy_value(old);
        Ok(())
    }

    /// Store an object value (through `val_dup`), destroying the previous one.
    pub fn set_value(&mut self, h: EntryRef, val: V) -> Result<(), DictError> {
        if !self.entries.contains_key(h.raw()) {
            return Err(DictError::NotFound);
        }
        let value = Value::Object(self.dict_type.val_dup(val));
        self.replace_value(h, value)
    }

    pub fn set_signed(&mut self, h: EntryRef, v: i64) -> Result<(), DictError> {
        self.replace_value(h, Value::I64(v))
    }

    pub fn set_unsigned(&mut self, h: EntryRef, v: u64) -> Result<(), DictError> {
        self.replace_value(h, Value::U64(v))
    }

    pub fn set_double(&mut self, h: EntryRef, v: f64) -> Result<(), DictError> {
        self.replace_value(h, Value::F64(v))
    }
}

impl<K, V, D> Drop for Dict<K, V, D>
where
    D: DictType<K, V>,
{
    fn drop(&mut self) {
        self.clear();
    }
}
