//! Stateless cursor scan.
//!
//! The cursor is a bucket index whose bits are incremented from the high end
//! (reverse-binary order). Because table sizes are powers of two, the
//! buckets of a table of size `2^n` map onto contiguous runs in any larger
//! table, and a reversed increment visits every run before moving on. A
//! full scan from cursor 0 back to 0 therefore returns every entry that was
//! present for the whole scan at least once, even if the table grows or
//! shrinks between calls. Entries may be returned more than once after a
//! shrink.
//!
//! While a rehash is running both generations are visited: the bucket
//! `v & m_small` of the smaller one, then every bucket of the larger one
//! that expands from it.

use crate::dict::Dict;
use crate::dict_type::DictType;
use crate::entry::{Entry, EntryKey, Value};
use crate::generation::Generation;
use slotmap::SlotMap;

/// One bucket as seen by `scan_with_buckets`, before its entries are emitted.
pub struct ScanBucket<'a, K, V> {
    generation: usize,
    index: usize,
    head: Option<EntryKey>,
    entries: &'a mut SlotMap<EntryKey, Entry<K, V>>,
}

impl<'a, K, V> ScanBucket<'a, K, V> {
    /// 0 for the active generation, 1 for the rehash target.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        let mut n = 0;
        let mut cur = self.head;
        while let Some(k) = cur {
            n += 1;
            cur = self.entries[k].next;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Visit the chain in order with mutable access to each value.
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &mut Value<V>),
    {
        let mut cur = self.head;
        while let Some(k) = cur {
            let e = &mut self.entries[k];
            f(&e.key, &mut e.value);
            cur = e.next;
        }
    }
}

/// Reverse-binary increment of `v` within `mask`: set the bits above the
/// mask so the carry runs off the top, then add one to the reversed value.
#[inline]
fn advance(v: u64, mask: u64) -> u64 {
    let v = v | !mask;
    v.reverse_bits().wrapping_add(1).reverse_bits()
}

impl<K, V, D> Dict<K, V, D>
where
    D: DictType<K, V>,
{
    /// Emit every entry of the cursor's bucket(s) and return the next
    /// cursor. Start from 0; the scan is complete when 0 is returned.
    pub fn scan<F>(&mut self, cursor: u64, on_entry: F) -> u64
    where
        F: FnMut(&K, &Value<V>),
    {
        self.scan_with_buckets(cursor, on_entry, |_| {})
    }

    /// `scan`, also handing each visited bucket to `on_bucket` before its
    /// entries are emitted.
    pub fn scan_with_buckets<F, B>(&mut self, cursor: u64, mut on_entry: F, mut on_bucket: B) -> u64
    where
        F: FnMut(&K, &Value<V>),
        B: FnMut(&mut ScanBucket<'_, K, V>),
    {
        if self.is_empty() {
            return 0;
        }
        let _paused = self.pause.hold();
        let tables = &self.tables;
        let entries = &mut self.entries;

        let mut v = cursor;
        if self.rehash_idx.is_none() {
            let m0 = tables[0].mask() as u64;
            emit_bucket(tables, entries, 0, (v & m0) as usize, &mut on_entry, &mut on_bucket);
            v = advance(v, m0);
        } else {
            let (small, large) = if tables[0].size() > tables[1].size() {
                (1, 0)
            } else {
                (0, 1)
            };
            let m0 = tables[small].mask() as u64;
            let m1 = tables[large].mask() as u64;

            emit_bucket(tables, entries, small, (v & m0) as usize, &mut on_entry, &mut on_bucket);
            // Every bucket of the larger table that expands from `v & m0`.
            loop {
                emit_bucket(tables, entries, large, (v & m1) as usize, &mut on_entry, &mut on_bucket);
                v = advance(v, m1);
                if v & (m0 ^ m1) == 0 {
                    break;
                }
            }
        }
        v
    }
}

fn emit_bucket<K, V, F, B>(
    tables: &[Generation; 2],
    entries: &mut SlotMap<EntryKey, Entry<K, V>>,
    table: usize,
    idx: usize,
    on_entry: &mut F,
    on_bucket: &mut B,
) where
    F: FnMut(&K, &Value<V>),
    B: FnMut(&mut ScanBucket<'_, K, V>),
{
    let head = tables[table].head(idx);
    on_bucket(&mut ScanBucket {
        generation: table,
        index: idx,
        head,
        entries: &mut *entries,
    });
    let mut cur = head;
    while let Some(k) = cur {
        let Some(e) = entries.get(k) else {
            break;
        };
        cur = e.next;
        on_entry(&e.key, &e.value);
    }
}
