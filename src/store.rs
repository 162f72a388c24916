//! The growable structure-of-arrays backing an array value.
//!
//! A `Store` owns two parallel raw buffers, one of keys and one of values.
//! It records only its capacity: the number of live slots is supplied by the
//! caller on every call, which keeps the container the single owner of that
//! piece of state. Slots in `[len, capacity)` are uninitialized and must
//! never be read.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::cmp;
use std::ptr::{self, NonNull};

use crate::key::Key;
use crate::string::VString;
use crate::value::Variant;

/// Smallest capacity a non-empty store will allocate.
const MIN_CAPACITY: usize = 8;

pub(crate) struct Store {
    keys: NonNull<Key>,
    vals: NonNull<Variant>,
    capacity: usize,
}

impl Store {
    fn buffer_layouts(capacity: usize) -> (Layout, Layout) {
        (
            Layout::array::<Key>(capacity).expect("layout is expected to return a valid value"),
            Layout::array::<Variant>(capacity)
                .expect("layout is expected to return a valid value"),
        )
    }

    fn alloc_buffers(capacity: usize) -> (NonNull<Key>, NonNull<Variant>) {
        if capacity == 0 {
            return (NonNull::dangling(), NonNull::dangling());
        }
        let (key_layout, val_layout) = Self::buffer_layouts(capacity);
        unsafe {
            let keys = alloc(key_layout).cast::<Key>();
            if keys.is_null() {
                handle_alloc_error(key_layout);
            }
            let vals = alloc(val_layout).cast::<Variant>();
            if vals.is_null() {
                handle_alloc_error(val_layout);
            }
            (NonNull::new_unchecked(keys), NonNull::new_unchecked(vals))
        }
    }

    // Safety: the buffers must have been allocated with this capacity, and
    // every live slot must already have been dropped or moved out.
    unsafe fn dealloc_buffers(keys: NonNull<Key>, vals: NonNull<Variant>, capacity: usize) {
        if capacity == 0 {
            return;
        }
        let (key_layout, val_layout) = Self::buffer_layouts(capacity);
        dealloc(keys.as_ptr().cast(), key_layout);
        dealloc(vals.as_ptr().cast(), val_layout);
    }

    /// Constructs a store with the given capacity. A capacity of zero does
    /// not allocate.
    pub(crate) fn new(capacity: usize) -> Self {
        let (keys, vals) = Self::alloc_buffers(capacity);
        Store {
            keys,
            vals,
            capacity,
        }
    }

    /// Duplicating construction for copy-on-write: walks the first `len`
    /// source slots in order, sharing each string key and flattening one
    /// level of aliasing in each value.
    pub(crate) fn duplicate(src: &Store, len: usize, capacity: usize) -> Self {
        debug_assert!(len <= capacity && len <= src.capacity);
        let store = Store::new(capacity);
        unsafe {
            for i in 0..len {
                store.keys.as_ptr().add(i).write(src.key(i).clone());
                store
                    .vals
                    .as_ptr()
                    .add(i)
                    .write(src.value(i).clone_flattened());
            }
        }
        store
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Borrows the key at `pos`. The caller guarantees `pos` is a live slot.
    pub(crate) fn key(&self, pos: usize) -> &Key {
        debug_assert!(pos < self.capacity);
        // Safety: live slots are initialized
        unsafe { &*self.keys.as_ptr().add(pos) }
    }

    /// Borrows the value at `pos`. The caller guarantees `pos` is a live slot.
    pub(crate) fn value(&self, pos: usize) -> &Variant {
        debug_assert!(pos < self.capacity);
        // Safety: live slots are initialized
        unsafe { &*self.vals.as_ptr().add(pos) }
    }

    /// Mutably borrows the value at `pos`. The caller guarantees `pos` is a
    /// live slot.
    pub(crate) fn value_mut(&mut self, pos: usize) -> &mut Variant {
        debug_assert!(pos < self.capacity);
        // Safety: live slots are initialized
        unsafe { &mut *self.vals.as_ptr().add(pos) }
    }

    /// Replaces the key at a live slot, dropping the old key.
    pub(crate) fn set_key(&mut self, pos: usize, key: Key) {
        debug_assert!(pos < self.capacity);
        // Safety: live slots are initialized
        unsafe {
            *self.keys.as_ptr().add(pos) = key;
        }
    }

    /// Writes the key of a slot whose key is not yet live (the hole left by
    /// `prepend`). The old bits are not dropped.
    ///
    /// Safety: the key at `pos` must be uninitialized or moved-from.
    pub(crate) unsafe fn init_key(&mut self, pos: usize, key: Key) {
        debug_assert!(pos < self.capacity);
        self.keys.as_ptr().add(pos).write(key);
    }

    /// Writes a full slot at `pos`.
    ///
    /// Safety: the slot at `pos` must be uninitialized, and `pos < capacity`.
    pub(crate) unsafe fn write_slot(&mut self, pos: usize, key: Key, value: Variant) {
        debug_assert!(pos < self.capacity);
        self.keys.as_ptr().add(pos).write(key);
        self.vals.as_ptr().add(pos).write(value);
    }

    /// Linear scan for an integer key over the first `len` slots. String
    /// slots are skipped.
    pub(crate) fn find_int(&self, key: i64, len: usize) -> Option<usize> {
        debug_assert!(len <= self.capacity);
        // glorious linear find
        for i in 0..len {
            if let Key::Int(k) = self.key(i) {
                if *k == key {
                    return Some(i);
                }
            }
        }
        None
    }

    /// Linear scan for a string key over the first `len` slots. Integer
    /// slots are skipped; comparison short-circuits on pointer identity,
    /// then length, then byte content.
    pub(crate) fn find_str(&self, key: &VString, len: usize) -> Option<usize> {
        debug_assert!(len <= self.capacity);
        let bytes = key.as_bytes();
        // glorious linear find
        for i in 0..len {
            let k = match self.key(i) {
                Key::Str(s) => s,
                Key::Int(_) => continue,
            };
            if k.ptr_eq(key) {
                return Some(i);
            }
            if k.len() != bytes.len() {
                continue;
            }
            if k.as_bytes() == bytes {
                return Some(i);
            }
        }
        None
    }

    pub(crate) fn find(&self, key: &Key, len: usize) -> Option<usize> {
        match key {
            Key::Int(i) => self.find_int(*i, len),
            Key::Str(s) => self.find_str(s, len),
        }
    }

    /// Overwrites the value for `key` in place if present (returns `false`),
    /// otherwise appends a new slot at `len`, growing first when at capacity
    /// (returns `true`).
    pub(crate) fn update(&mut self, key: Key, value: Variant, len: usize) -> bool {
        debug_assert!(len <= self.capacity);
        if let Some(pos) = self.find(&key, len) {
            // found, overwrite
            *self.value_mut(pos) = value;
            return false;
        }
        // not found, insert
        if len == self.capacity {
            self.grow(len, len + 1, len * 2 + 1);
        }
        // Safety: slot `len` is within capacity after growing, and not live
        unsafe {
            self.write_slot(len, key, value);
        }
        true
    }

    /// Replaces the backing buffers with larger ones when `min_cap` exceeds
    /// the current capacity. The first `len` slots are moved bitwise; the
    /// old buffers are freed only after the move completes.
    pub(crate) fn grow(&mut self, len: usize, min_cap: usize, ideal_cap: usize) {
        debug_assert!(ideal_cap >= min_cap && len <= self.capacity);
        if self.capacity >= min_cap {
            return;
        }
        let new_cap = cmp::max(ideal_cap, MIN_CAPACITY);
        let (keys, vals) = Self::alloc_buffers(new_cap);
        unsafe {
            ptr::copy_nonoverlapping(self.keys.as_ptr(), keys.as_ptr(), len);
            ptr::copy_nonoverlapping(self.vals.as_ptr(), vals.as_ptr(), len);
            Self::dealloc_buffers(self.keys, self.vals, self.capacity);
        }
        self.keys = keys;
        self.vals = vals;
        self.capacity = new_cap;
    }

    /// Destroys the slot at `pos` (releasing its string-key reference, if
    /// any) and compacts the tail down by one position.
    pub(crate) fn erase(&mut self, pos: usize, len: usize) {
        debug_assert!(pos < len && len <= self.capacity);
        unsafe {
            ptr::drop_in_place(self.keys.as_ptr().add(pos));
            ptr::drop_in_place(self.vals.as_ptr().add(pos));
            let tail = len - pos - 1;
            ptr::copy(
                self.keys.as_ptr().add(pos + 1),
                self.keys.as_ptr().add(pos),
                tail,
            );
            ptr::copy(
                self.vals.as_ptr().add(pos + 1),
                self.vals.as_ptr().add(pos),
                tail,
            );
        }
    }

    /// Shifts all `len` slots up by one and writes `value` into slot 0.
    /// Slot 0's key is left unset: the caller must assign it with
    /// [`Store::init_key`] and renumber.
    pub(crate) fn prepend(&mut self, value: Variant, len: usize) {
        if len == self.capacity {
            self.grow(len, len + 1, len * 2 + 1);
        }
        debug_assert!(len < self.capacity);
        unsafe {
            ptr::copy(self.keys.as_ptr(), self.keys.as_ptr().add(1), len);
            ptr::copy(self.vals.as_ptr(), self.vals.as_ptr().add(1), len);
            self.vals.as_ptr().write(value);
        }
    }

    /// Releases every key reference and destructs every value, in index
    /// order, then frees the buffers. The store is left empty with zero
    /// capacity.
    pub(crate) fn destroy(&mut self, len: usize) {
        debug_assert!(len <= self.capacity);
        unsafe {
            for i in 0..len {
                ptr::drop_in_place(self.keys.as_ptr().add(i));
                ptr::drop_in_place(self.vals.as_ptr().add(i));
            }
            Self::dealloc_buffers(self.keys, self.vals, self.capacity);
        }
        self.keys = NonNull::dangling();
        self.vals = NonNull::dangling();
        self.capacity = 0;
    }
}
