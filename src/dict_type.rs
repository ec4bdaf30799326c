//! DictType: the per-table capability descriptor.
//!
//! A descriptor tells a table how to hash, compare, duplicate and destroy
//! its keys and values, whether it may grow, and how many metadata bytes
//! each entry carries. It is supplied once at construction and is never
//! swapped afterwards. Several tables can share one descriptor through the
//! `&T` and `Rc<T>` impls.

use core::hash::{BuildHasher, Hash, Hasher};
use hashbrown::hash_map::DefaultHashBuilder;
use std::rc::Rc;

pub trait DictType<K, V> {
    fn hash(&self, key: &K) -> u64;

    /// Applied to every key as it is linked into the table.
    fn key_dup(&self, key: K) -> K {
        key
    }

    /// Applied to `Value::Object` payloads as they are stored.
    fn val_dup(&self, val: V) -> V {
        val
    }

    /// Key equality. Must agree with `hash`: equal keys hash equally.
    ///
    /// Required because stored keys are owned by the table, so a lookup key
    /// never shares an address with the key it should match.
    fn key_eq(&self, a: &K, b: &K) -> bool;

    fn key_destroy(&self, key: K) {
        drop(key);
    }

    fn val_destroy(&self, val: V) {
        drop(val);
    }

    /// Veto for growth. `more_mem` is the byte size of the bucket array the
    /// table would allocate; `used_ratio` is its current load factor.
    fn expand_allowed(&self, _more_mem: usize, _used_ratio: f64) -> bool {
        true
    }

    /// Bytes of zeroed caller metadata attached to each new entry.
    fn entry_metadata_size(&self) -> usize {
        0
    }
}

impl<K, V, T> DictType<K, V> for &T
where
    T: DictType<K, V> + ?Sized,
{
    fn hash(&self, key: &K) -> u64 {
        (**self).hash(key)
    }
    fn key_dup(&self, key: K) -> K {
        (**self).key_dup(key)
    }
    fn val_dup(&self, val: V) -> V {
        (**self).val_dup(val)
    }
    fn key_eq(&self, a: &K, b: &K) -> bool {
        (**self).key_eq(a, b)
    }
    fn key_destroy(&self, key: K) {
        (**self).key_destroy(key)
    }
    fn val_destroy(&self, val: V) {
        (**self).val_destroy(val)
    }
    fn expand_allowed(&self, more_mem: usize, used_ratio: f64) -> bool {
        (**self).expand_allowed(more_mem, used_ratio)
    }
    fn entry_metadata_size(&self) -> usize {
        (**self).entry_metadata_size()
    }
}

impl<K, V, T> DictType<K, V> for Rc<T>
where
    T: DictType<K, V> + ?Sized,
{
    fn hash(&self, key: &K) -> u64 {
        (**self).hash(key)
    }
    fn key_dup(&self, key: K) -> K {
        (**self).key_dup(key)
    }
    fn val_dup(&self, val: V) -> V {
        (**self).val_dup(val)
    }
    fn key_eq(&self, a: &K, b: &K) -> bool {
        (**self).key_eq(a, b)
    }
    fn key_destroy(&self, key: K) {
        (**self).key_destroy(key)
    }
    fn val_destroy(&self, val: V) {
        (**self).val_destroy(val)
    }
    fn expand_allowed(&self, more_mem: usize, used_ratio: f64) -> bool {
        (**self).expand_allowed(more_mem, used_ratio)
    }
    fn entry_metadata_size(&self) -> usize {
        (**self).entry_metadata_size()
    }
}

/// Descriptor for `K: Hash + Eq` keys hashed with a `BuildHasher`.
#[derive(Clone, Debug, Default)]
pub struct HashedKeys<S = DefaultHashBuilder> {
    hasher: S,
}

impl HashedKeys {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> HashedKeys<S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self { hasher }
    }
}

impl<K, V, S> DictType<K, V> for HashedKeys<S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn hash(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    fn key_eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Descriptor for byte-string keys compared ASCII case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct CaseInsensitiveKeys<S = DefaultHashBuilder> {
    hasher: S,
}

impl CaseInsensitiveKeys {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> CaseInsensitiveKeys<S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self { hasher }
    }
}

impl<K, V, S> DictType<K, V> for CaseInsensitiveKeys<S>
where
    K: AsRef<[u8]>,
    S: BuildHasher,
{
    fn hash(&self, key: &K) -> u64 {
        let mut h = self.hasher.build_hasher();
        let bytes = key.as_ref();
        let mut buf = [0u8; 64];
        for chunk in bytes.chunks(buf.len()) {
            let lowered = &mut buf[..chunk.len()];
            lowered.copy_from_slice(chunk);
            lowered.make_ascii_lowercase();
            h.write(lowered);
        }
        h.write_usize(bytes.len());
        h.finish()
    }

    fn key_eq(&self, a: &K, b: &K) -> bool {
        a.as_ref().eq_ignore_ascii_case(b.as_ref())
    }
}
