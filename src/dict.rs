//! The general hash-table representation an array escalates into

use std::fmt::{self, Debug, Formatter};
use std::iter::FromIterator;

use hashbrown::HashMap;

use crate::key::Key;
use crate::value::Variant;

/// An insertion-ordered hash map of [`Key`] to [`Variant`].
///
/// This is the representation an ordered array escalates into when its
/// workload outgrows linear lookup: elements in a dense vector for ordered
/// iteration, with a hash index over positions for O(1) lookup.
#[derive(Default)]
pub struct DictArray {
    entries: Vec<(Key, Variant)>,
    index: HashMap<Key, usize>,
}

impl DictArray {
    /// Constructs a new empty map. Does not allocate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a new empty map with room for `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        DictArray {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// The number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sets `key` to `value`. Overwriting keeps the key's original position
    /// in iteration order. Returns `true` when the key is new.
    pub fn insert(&mut self, key: Key, value: Variant) -> bool {
        if let Some(&pos) = self.index.get(&key) {
            self.entries[pos].1 = value;
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        true
    }

    /// Looks up a key.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&Variant> {
        let pos = *self.index.get(key)?;
        Some(&self.entries[pos].1)
    }

    /// Returns `true` if the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &Key) -> bool {
        self.index.contains_key(key)
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Variant)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl PartialEq for DictArray {
    /// Order-sensitive, like the array representation it came from.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
    }
}

impl Debug for DictArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl FromIterator<(Key, Variant)> for DictArray {
    fn from_iter<T: IntoIterator<Item = (Key, Variant)>>(iter: T) -> Self {
        let mut dict = DictArray::new();
        dict.extend(iter);
        dict
    }
}

impl Extend<(Key, Variant)> for DictArray {
    fn extend<T: IntoIterator<Item = (Key, Variant)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[mockalloc::test]
    fn insert_preserves_order_on_overwrite() {
        let mut d = DictArray::new();
        assert!(d.insert(Key::Int(3), Variant::Int(0)));
        assert!(d.insert(Key::from("dict-test-k"), Variant::Int(1)));
        assert!(!d.insert(Key::Int(3), Variant::Int(9)));

        let keys: Vec<_> = d.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Key::Int(3), Key::from("dict-test-k")]);
        assert_eq!(*d.get(&Key::Int(3)).unwrap(), Variant::Int(9));
    }

    #[mockalloc::test]
    fn lookup_misses() {
        let mut d = DictArray::new();
        d.insert(Key::Int(1), Variant::Null);
        assert!(d.contains_key(&Key::Int(1)));
        assert!(!d.contains_key(&Key::Int(2)));
        assert_eq!(d.get(&Key::from("dict-test-miss")), None);
    }
}
