//! The ordered array value: container logic and copy-on-write handle

use std::cell::Cell;
use std::fmt::{self, Debug, Formatter};
use std::iter::FromIterator;
use std::rc::Rc;

use tracing::trace;

use crate::dict::DictArray;
use crate::key::Key;
use crate::store::Store;
use crate::string::VString;
use crate::strong_iter::{IterState, Registry, StrongIter};
use crate::value::Variant;

/// The container proper: one store plus the state the store deliberately
/// does not track.
struct ArrayData {
    store: Store,
    len: usize,
    /// The "current element" cursor, shared by the sequential iteration
    /// protocol. Interior mutability because cursor movement is part of
    /// iteration, not a structural edit.
    pos: Cell<Option<usize>>,
    /// The next auto-increment integer key, tracked incrementally.
    next_key: i64,
    iters: Registry,
}

impl ArrayData {
    fn with_capacity(capacity: usize) -> Self {
        ArrayData {
            store: Store::new(capacity),
            len: 0,
            pos: Cell::new(None),
            next_key: 0,
            iters: Registry::default(),
        }
    }

    fn bump_next_key(&mut self) -> i64 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    /// Inserting integer key `k` makes `k + 1` the smallest candidate for
    /// the next auto-key.
    fn note_int_key(&mut self, key: i64) {
        if key >= self.next_key {
            self.next_key = key + 1;
        }
    }

    fn reserve_one(&mut self) {
        if self.len == self.store.capacity() {
            self.store.grow(self.len, self.len + 1, self.len * 2 + 1);
        }
    }

    /// Appends a slot the caller has already reserved room for, pointing
    /// the cursor at it when the container had no current element.
    fn append_no_grow(&mut self, key: Key, value: Variant) {
        debug_assert!(self.len < self.store.capacity());
        if let Key::Int(k) = key {
            self.note_int_key(k);
        }
        // Safety: slot `len` is within capacity and not yet live
        unsafe {
            self.store.write_slot(self.len, key, value);
        }
        if self.pos.get().is_none() {
            self.pos.set(Some(self.len));
        }
        self.len += 1;
    }

    fn set(&mut self, key: Key, value: Variant) {
        if let Key::Int(k) = key {
            self.note_int_key(k);
        }
        if self.store.update(key, value, self.len) {
            // Added a new element, must update length and possibly the cursor.
            if self.pos.get().is_none() {
                self.pos.set(Some(self.len));
            }
            self.len += 1;
        }
    }

    fn set_ref(&mut self, key: Key, value: &mut Variant) {
        if let Some(pos) = self.store.find(&key, self.len) {
            // found, alias in place
            *self.store.value_mut(pos) = value.to_ref();
        } else {
            self.reserve_one();
            self.append_no_grow(key, value.to_ref());
        }
    }

    fn append(&mut self, value: Variant) {
        let key = self.bump_next_key();
        self.reserve_one();
        self.append_no_grow(Key::Int(key), value);
    }

    fn remove(&mut self, key: &Key) {
        let pos = match self.store.find(key, self.len) {
            Some(pos) => pos,
            // Not found, nothing to delete.
            None => return,
        };

        // We are removing something before or at each iterator's position:
        // back its position off to account for the shifting, or park it in
        // the reset state when it sat on the first slot.
        self.iters.for_each_live(|cell| {
            if let IterState::At(p) = cell.state() {
                if pos <= p {
                    cell.set_state(if p == 0 {
                        IterState::Reset
                    } else {
                        IterState::At(p - 1)
                    });
                }
            }
        });

        self.store.erase(pos, self.len);
        self.len -= 1;

        if let Some(cursor) = self.pos.get() {
            if cursor >= pos {
                // Step the cursor to its predecessor in the new order.
                self.pos
                    .set(if cursor == 0 { None } else { Some(cursor - 1) });
            }
        }
        debug_assert!(self.pos.get().map_or(true, |c| c < self.len));
    }

    fn pop(&mut self) -> Variant {
        if self.len == 0 {
            return Variant::Null;
        }
        let last = self.len - 1;
        let value = self.store.value(last).clone();

        // Removing the most recently issued auto-key makes it immediately
        // reusable.
        if let Key::Int(k) = self.store.key(last) {
            if self.next_key == k + 1 {
                self.next_key -= 1;
            }
        }

        self.store.erase(last, self.len);
        self.len -= 1;
        // Popping resets the array's internal cursor.
        self.pos.set(self.first_pos());
        value
    }

    fn dequeue(&mut self) -> Variant {
        // Removing from the front is too disruptive to repair incrementally:
        // every strong iterator is invalidated.
        self.iters.invalidate_all();
        if self.len == 0 {
            return Variant::Null;
        }
        let value = self.store.value(0).clone();
        self.store.erase(0, self.len);
        self.len -= 1;
        self.renumber();
        // Dequeuing resets the array's internal cursor.
        self.pos.set(self.first_pos());
        value
    }

    fn prepend(&mut self, value: Variant) {
        // As with `dequeue`, adding at the front invalidates every strong
        // iterator.
        self.iters.invalidate_all();
        self.store.prepend(value, self.len);
        self.len += 1;
        // Safety: slot 0's key is the hole left by `Store::prepend`
        unsafe {
            self.store.init_key(0, Key::Int(0));
        }
        self.renumber();
        // Prepending resets the array's internal cursor.
        self.pos.set(Some(0));
    }

    /// Reassigns contiguous auto-increment keys to every integer-keyed slot,
    /// in order. The cursor and every live strong iterator are re-resolved
    /// by the key they pointed at, not the position, so their logical
    /// targets survive the churn.
    fn renumber(&mut self) {
        if self.len == 0 {
            self.next_key = 0;
            return;
        }

        // Capture key identities before touching anything. The cursor can
        // sit one past the live range when the caller just shrank the array;
        // such a cursor has no key to capture.
        let cursor_key = self
            .pos
            .get()
            .filter(|&p| p < self.len)
            .map(|p| self.store.key(p).clone());
        let mut iter_keys = Vec::new();
        let store = &self.store;
        self.iters.for_each_live(|cell| {
            if let IterState::At(p) = cell.state() {
                iter_keys.push((Rc::clone(cell), store.key(p).clone()));
            }
        });

        self.next_key = 0;
        for i in 0..self.len {
            if let Key::Int(_) = self.store.key(i) {
                let key = self.bump_next_key();
                self.store.set_key(i, Key::Int(key));
            }
        }

        if let Some(key) = cursor_key {
            self.pos.set(self.store.find(&key, self.len));
        }
        for (cell, key) in iter_keys {
            cell.set_state(match self.store.find(&key, self.len) {
                Some(p) => IterState::At(p),
                None => IterState::Invalid,
            });
        }
    }

    fn merge(&mut self, other: &ArrayData) {
        self.store.grow(self.len, self.len + 1, self.len * 2 + 1);
        for i in 0..other.len {
            match other.store.key(i) {
                Key::Int(_) => {
                    // Integer keys are never merged onto existing ones: the
                    // element is reinserted fresh under the next auto-key.
                    let key = self.bump_next_key();
                    self.reserve_one();
                    self.append_no_grow(Key::Int(key), other.store.value(i).clone());
                }
                Key::Str(s) => {
                    let key = Key::Str(s.clone());
                    if let Some(pos) = self.store.find(&key, self.len) {
                        *self.store.value_mut(pos) = other.store.value(i).clone();
                    } else {
                        self.reserve_one();
                        self.append_no_grow(key, other.store.value(i).clone());
                    }
                }
            }
        }
    }

    fn plus(&mut self, other: &ArrayData) {
        self.store.grow(self.len, self.len + 1, self.len * 2 + 1);
        for i in 0..other.len {
            let key = other.store.key(i);
            if self.store.find(key, self.len).is_some() {
                // Union semantics: existing keys are never overwritten.
                continue;
            }
            self.reserve_one();
            self.append_no_grow(key.clone(), other.store.value(i).clone());
        }
    }

    fn finalize(&mut self) {
        for i in 0..self.len {
            if let Key::Str(s) = self.store.key(i) {
                if !s.is_interned() {
                    let interned = VString::intern(s.as_str());
                    self.store.set_key(i, Key::Str(interned));
                }
            }
            self.store.value_mut(i).finalize();
        }
    }

    fn first_pos(&self) -> Option<usize> {
        if self.len > 0 {
            Some(0)
        } else {
            None
        }
    }

    fn last_pos(&self) -> Option<usize> {
        self.len.checked_sub(1)
    }

    fn next_pos(&self, pos: usize) -> Option<usize> {
        let next = pos + 1;
        if next < self.len {
            Some(next)
        } else {
            None
        }
    }
}

impl Clone for ArrayData {
    /// Copy-on-write duplication: flatten-on-copy values, shared string
    /// keys, one extra slot of headroom when full. Strong iterators stay
    /// attached to the original; the cursor carries over.
    fn clone(&self) -> Self {
        let capacity = self.store.capacity() + (self.len == self.store.capacity()) as usize;
        ArrayData {
            store: Store::duplicate(&self.store, self.len, capacity),
            len: self.len,
            pos: Cell::new(self.pos.get()),
            next_key: self.next_key,
            iters: Registry::default(),
        }
    }
}

impl Drop for ArrayData {
    fn drop(&mut self) {
        // Handles outliving their array see it as invalid, never dangling.
        self.iters.invalidate_all();
        self.store.destroy(self.len);
    }
}

/// An insertion-ordered associative array value with mixed integer/string
/// keys and copy-on-write sharing.
///
/// `Clone` is cheap: it shares the underlying container. A shared container
/// is never mutated in place; the first mutation through any handle works on
/// a private duplicate, leaving every other holder's view unchanged.
///
/// ```
/// use varray::{Key, VArray, Variant};
///
/// let mut a = VArray::new();
/// a.append(Variant::from("x"));
/// a.set(Key::from("k"), Variant::Int(1));
///
/// let b = a.clone();
/// a.remove(&Key::from("k"));
/// assert!(!a.exists(&Key::from("k")));
/// assert!(b.exists(&Key::from("k")));
/// ```
pub struct VArray {
    data: Rc<ArrayData>,
}

impl VArray {
    /// Constructs a new empty array. Does not allocate.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Constructs a new empty array with room for `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        VArray {
            data: Rc::new(ArrayData::with_capacity(capacity)),
        }
    }

    /// Obtains an exclusively owned container, duplicating a shared one
    /// first. Every mutating entry point funnels through here.
    fn data_mut(&mut self) -> &mut ArrayData {
        Rc::make_mut(&mut self.data)
    }

    /// Duplicates the container and moves every registered strong iterator
    /// onto the duplicate, keeping their positions. Plain `Clone` leaves
    /// iterators with the original; this variant is for the caller that is
    /// iterating an array and wants its own mutable copy to keep walking.
    #[must_use]
    pub fn clone_with_iters(&self) -> VArray {
        let data = ArrayData::clone(&self.data);
        self.data.iters.drain_into(&data.iters);
        VArray {
            data: Rc::new(data),
        }
    }

    /// The number of holders sharing this container (including this one).
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.data)
    }

    /// Returns `true` if both handles share one container.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    /// The number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len
    }

    /// Returns `true` if the array is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len == 0
    }

    /// The number of elements the array can hold without reallocating.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.store.capacity()
    }

    /// Looks up a key. A miss is not an error.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&Variant> {
        let pos = self.data.store.find(key, self.data.len)?;
        Some(self.data.store.value(pos))
    }

    /// Returns `true` if the key is present.
    #[must_use]
    pub fn exists(&self, key: &Key) -> bool {
        self.data.store.find(key, self.data.len).is_some()
    }

    /// Returns `true` if the array has exactly the keys `0..len`, in order.
    #[must_use]
    pub fn is_packed(&self) -> bool {
        (0..self.data.len).all(|i| self.data.store.find_int(i as i64, self.data.len) == Some(i))
    }

    /// The key at a position in the current order.
    #[must_use]
    pub fn key_at(&self, pos: usize) -> Option<&Key> {
        if pos < self.data.len {
            Some(self.data.store.key(pos))
        } else {
            None
        }
    }

    /// The value at a position in the current order.
    #[must_use]
    pub fn value_at(&self, pos: usize) -> Option<&Variant> {
        if pos < self.data.len {
            Some(self.data.store.value(pos))
        } else {
            None
        }
    }

    /// First position in iteration order.
    #[must_use]
    pub fn first_pos(&self) -> Option<usize> {
        self.data.first_pos()
    }

    /// Last position in iteration order.
    #[must_use]
    pub fn last_pos(&self) -> Option<usize> {
        self.data.last_pos()
    }

    /// The position after `pos`, if any.
    #[must_use]
    pub fn next_pos(&self, pos: usize) -> Option<usize> {
        self.data.next_pos(pos)
    }

    /// The position before `pos`, if any.
    #[must_use]
    pub fn prev_pos(&self, pos: usize) -> Option<usize> {
        pos.checked_sub(1)
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> Entries<'_> {
        Entries {
            data: &self.data,
            pos: 0,
        }
    }

    /// Sets `key` to `value`, overwriting in place when present.
    pub fn set(&mut self, key: Key, value: Variant) {
        trace!("set {:?} (len={})", key, self.len());
        self.data_mut().set(key, value);
    }

    /// Sets `key` to an alias of `value`: the slot and the caller's value
    /// share one storage cell.
    pub fn set_ref(&mut self, key: Key, value: &mut Variant) {
        trace!("set_ref {:?} (len={})", key, self.len());
        self.data_mut().set_ref(key, value);
    }

    /// Appends `value` under the next auto-increment integer key.
    pub fn append(&mut self, value: Variant) {
        trace!("append (len={})", self.len());
        self.data_mut().append(value);
    }

    /// Appends an alias of `value` under the next auto-increment key; the
    /// new slot and the caller's value share one storage cell.
    pub fn append_ref(&mut self, value: &mut Variant) {
        trace!("append_ref (len={})", self.len());
        let aliased = value.to_ref();
        self.data_mut().append(aliased);
    }

    /// Appends a copy of `value` that preserves its aliasing: a boxed value
    /// stays shared rather than being copied out of its cell.
    pub fn append_with_ref(&mut self, value: &Variant) {
        trace!("append_with_ref (len={})", self.len());
        self.data_mut().append(value.clone());
    }

    /// Removes `key`. Removing an absent key is a no-op. Strong iterators
    /// at or after the removed position are repaired in place.
    pub fn remove(&mut self, key: &Key) {
        trace!("remove {:?} (len={})", key, self.len());
        self.data_mut().remove(key);
    }

    /// Removes and returns the last element, or `Null` when empty. When the
    /// removed key is the most recently issued auto-key, that key becomes
    /// immediately reusable.
    pub fn pop(&mut self) -> Variant {
        trace!("pop (len={})", self.len());
        if self.is_empty() {
            return Variant::Null;
        }
        self.data_mut().pop()
    }

    /// Removes and returns the first element, or `Null` when empty.
    /// Invalidates every strong iterator and renumbers integer keys.
    pub fn dequeue(&mut self) -> Variant {
        trace!("dequeue (len={})", self.len());
        // Even the empty case goes through the copy-on-write gate: the
        // iterator invalidation must hit this handle's private container,
        // never one shared with other holders.
        self.data_mut().dequeue()
    }

    /// Inserts `value` at the front under key 0, renumbering the integer
    /// keys of every following element. Invalidates every strong iterator.
    pub fn prepend(&mut self, value: Variant) {
        trace!("prepend (len={})", self.len());
        self.data_mut().prepend(value);
    }

    /// Appends every element of `other`: integer-keyed elements are
    /// reinserted fresh under this array's auto-keys, string-keyed elements
    /// overwrite. Values keep their aliasing.
    pub fn merge(&mut self, other: &VArray) {
        trace!("merge (len={}, other_len={})", self.len(), other.len());
        let other = Rc::clone(&other.data);
        self.data_mut().merge(&other);
    }

    /// Union with `other`: keys already present are never overwritten;
    /// missing keys are inserted with their original key.
    pub fn plus(&mut self, other: &VArray) {
        trace!("plus (len={}, other_len={})", self.len(), other.len());
        let other = Rc::clone(&other.data);
        self.data_mut().plus(&other);
    }

    /// Interns every string key and deep-finalizes every value, for use
    /// when this array becomes an immutable compile-time constant.
    pub fn finalize_as_constant(&mut self) {
        trace!("finalize_as_constant (len={})", self.len());
        self.data_mut().finalize();
    }

    /// Materializes the elements, in order, into the general hash-table
    /// representation. One-way and never cached.
    #[must_use]
    pub fn escalate(&self) -> DictArray {
        trace!("escalate (len={})", self.len());
        let mut dict = DictArray::with_capacity(self.data.len);
        for i in 0..self.data.len {
            dict.insert(self.data.store.key(i).clone(), self.data.store.value(i).clone());
        }
        dict
    }

    // ---- cursor protocol -------------------------------------------------

    /// The position of the current element, if any.
    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.data.pos.get()
    }

    /// Moves the cursor to the first element.
    pub fn reset_cursor(&self) {
        self.data.pos.set(self.data.first_pos());
    }

    /// The current element under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<(&Key, &Variant)> {
        let pos = self.data.pos.get()?;
        Some((self.data.store.key(pos), self.data.store.value(pos)))
    }

    /// Steps the cursor forward; returns the new current element.
    pub fn cursor_advance(&self) -> Option<(&Key, &Variant)> {
        let next = self.data.pos.get().and_then(|p| self.data.next_pos(p));
        self.data.pos.set(next);
        self.current()
    }

    /// Steps the cursor backward; returns the new current element.
    pub fn cursor_rewind(&self) -> Option<(&Key, &Variant)> {
        let prev = self.data.pos.get().and_then(|p| p.checked_sub(1));
        self.data.pos.set(prev);
        self.current()
    }

    // ---- strong-iterator protocol ----------------------------------------

    /// Creates a strong iterator attached to this array, in the reset state.
    pub fn register_iter(&self) -> StrongIter {
        let it = StrongIter::new();
        self.data.iters.register(it.cell());
        it
    }

    /// Puts an iterator back in the reset state, re-attaching it if a
    /// structural edit had detached it.
    pub fn reset_iter(&self, it: &StrongIter) {
        if !self.data.iters.contains(it.cell()) {
            self.data.iters.register(it.cell());
        }
        it.cell().set_state(IterState::Reset);
    }

    /// Advances a strong iterator: from reset onto the first element, from
    /// an element onto its successor, off the end into the invalid state.
    /// Returns `true` while the iterator is on a live element. An
    /// invalidated iterator stays invalid until [`VArray::reset_iter`].
    ///
    /// The container's own cursor follows the iterator, pointing at the
    /// advanced position's successor.
    pub fn advance_iter(&self, it: &StrongIter) -> bool {
        let from = match it.cell().state() {
            IterState::Invalid => return false,
            IterState::Reset => None,
            IterState::At(p) => Some(p),
        };
        debug_assert!(self.data.iters.contains(it.cell()));
        let next = match from {
            None => self.data.first_pos(),
            Some(p) => self.data.next_pos(p),
        };
        match next {
            None => {
                it.cell().set_state(IterState::Invalid);
                false
            }
            Some(p) => {
                it.cell().set_state(IterState::At(p));
                // The sequential cursor tracks the strong iterator, one
                // element ahead.
                self.data.pos.set(self.data.next_pos(p));
                true
            }
        }
    }
}

impl Clone for VArray {
    fn clone(&self) -> Self {
        VArray {
            data: Rc::clone(&self.data),
        }
    }
}

impl Default for VArray {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for VArray {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
    }
}

impl Debug for VArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl FromIterator<(Key, Variant)> for VArray {
    fn from_iter<T: IntoIterator<Item = (Key, Variant)>>(iter: T) -> Self {
        let mut array = VArray::new();
        for (key, value) in iter {
            array.set(key, value);
        }
        array
    }
}

impl Extend<(Key, Variant)> for VArray {
    fn extend<T: IntoIterator<Item = (Key, Variant)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}

/// Iterator over `(key, value)` pairs in insertion order.
pub struct Entries<'a> {
    data: &'a ArrayData,
    pos: usize,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (&'a Key, &'a Variant);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len {
            return None;
        }
        let item = (self.data.store.key(self.pos), self.data.store.value(self.pos));
        self.pos += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.data.len - self.pos.min(self.data.len);
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for Entries<'a> {}

impl<'a> IntoIterator for &'a VArray {
    type Item = (&'a Key, &'a Variant);
    type IntoIter = Entries<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
