//! Entries: tagged values, arena storage, and the `EntryRef` handle.

use crate::dict::Dict;
use crate::dict_type::DictType;
use slotmap::new_key_type;

new_key_type! {
    /// Generational arena key. Chain links and bucket heads hold these.
    pub(crate) struct EntryKey;
}

/// Value stored in an entry. The variant is chosen per entry by the caller.
///
/// Only `Object` payloads go through the descriptor's `val_dup` and
/// `val_destroy` hooks; the numeric variants are plain data.
#[derive(Clone, Debug, PartialEq)]
pub enum Value<V> {
    Object(V),
    I64(i64),
    U64(u64),
    F64(f64),
}

impl<V> Default for Value<V> {
    /// A freshly linked entry carries a zeroed value until the caller sets one.
    fn default() -> Self {
        Value::U64(0)
    }
}

impl<V> Value<V> {
    pub fn as_object(&self) -> Option<&V> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut V> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I64(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U64(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F64(n) => Some(n),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: Value<V>,
    pub(crate) next: Option<EntryKey>, // next entry in the same bucket
    pub(crate) metadata: Box<[u8]>,
}

/// Stable handle to a live entry.
///
/// A handle stays valid across rehashing (entries are re-chained, never
/// moved) and stops resolving once its entry is deleted, even if the arena
/// slot is reused afterwards.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EntryRef(EntryKey);

impl EntryRef {
    pub(crate) fn new(k: EntryKey) -> Self {
        EntryRef(k)
    }
    pub(crate) fn raw(&self) -> EntryKey {
        self.0
    }

    pub fn key<'a, K, V, D>(&self, dict: &'a Dict<K, V, D>) -> Option<&'a K>
    where
        D: DictType<K, V>,
    {
        dict.handle_key(*self)
    }

    pub fn value<'a, K, V, D>(&self, dict: &'a Dict<K, V, D>) -> Option<&'a Value<V>>
    where
        D: DictType<K, V>,
    {
        dict.handle_value(*self)
    }

    pub fn value_mut<'a, K, V, D>(&self, dict: &'a mut Dict<K, V, D>) -> Option<&'a mut Value<V>>
    where
        D: DictType<K, V>,
    {
        dict.handle_value_mut(*self)
    }

    /// Caller-defined metadata bytes, zeroed when the entry was created.
    pub fn metadata<'a, K, V, D>(&self, dict: &'a Dict<K, V, D>) -> Option<&'a [u8]>
    where
        D: DictType<K, V>,
    {
        dict.handle_metadata(*self)
    }

    pub fn metadata_mut<'a, K, V, D>(&self, dict: &'a mut Dict<K, V, D>) -> Option<&'a mut [u8]>
    where
        D: DictType<K, V>,
    {
        dict.handle_metadata_mut(*self)
    }
}

/// An entry removed from the table by `Dict::unlink` but not yet destroyed.
///
/// Hand it back to `Dict::free_unlinked` to run the descriptor's destroy
/// hooks, or take it apart with `into_parts`.
#[derive(Debug)]
pub struct UnlinkedEntry<K, V> {
    key: K,
    value: Value<V>,
    metadata: Box<[u8]>,
}

impl<K, V> UnlinkedEntry<K, V> {
    pub(crate) fn from_entry(e: Entry<K, V>) -> Self {
        Self {
            key: e.key,
            value: e.value,
            metadata: e.metadata,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &Value<V> {
        &self.value
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    pub fn into_parts(self) -> (K, Value<V>, Box<[u8]>) {
        (self.key, self.value, self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_value_is_zeroed_unsigned() {
        let v: Value<String> = Value::default();
        assert_eq!(v, Value::U64(0));
        assert_eq!(v.as_u64(), Some(0));
        assert!(v.as_object().is_none());
    }

    #[test]
    fn accessors_match_variant() {
        let mut v: Value<String> = Value::Object("x".to_string());
        assert_eq!(v.as_object().map(String::as_str), Some("x"));
        v.as_object_mut().unwrap().push('y');
        assert_eq!(v.as_object().map(String::as_str), Some("xy"));
        assert!(v.as_i64().is_none());

        assert_eq!(Value::<()>::I64(-3).as_i64(), Some(-3));
        assert_eq!(Value::<()>::F64(1.5).as_f64(), Some(1.5));
        assert!(Value::<()>::F64(1.5).as_u64().is_none());
    }
}
