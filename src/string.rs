//! Functionality relating to the string key type

use hashbrown::HashSet;
use std::alloc::{alloc, dealloc, handle_alloc_error, Layout, LayoutError};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;
use std::ops::Deref;
use std::ptr::{copy_nonoverlapping, NonNull};
use std::sync::atomic::{AtomicU32, Ordering::Relaxed};
use std::sync::{Mutex, MutexGuard, OnceLock};

#[repr(C)]
#[repr(align(4))]
struct Header {
    rc: AtomicU32,
    // We use 32 bits for the length, which is plenty for array keys
    len: u32,
    // Set once at allocation time, before the header is shared
    interned: bool,
}

impl Header {
    fn len(&self) -> usize {
        self.len as usize
    }

    fn str_ptr(this: *const Header) -> *const u8 {
        // Safety: pointers to the end of structs are allowed
        unsafe { this.add(1).cast() }
    }

    fn bytes<'a>(this: *const Header) -> &'a [u8] {
        // Safety: Header `len` must be accurate
        unsafe { std::slice::from_raw_parts(Self::str_ptr(this), (*this).len()) }
    }

    fn str<'a>(this: *const Header) -> &'a str {
        // Safety: UTF-8 enforced on construction
        unsafe { std::str::from_utf8_unchecked(Self::bytes(this)) }
    }
}

static EMPTY_HEADER: Header = Header {
    rc: AtomicU32::new(0),
    len: 0,
    interned: false,
};

struct WeakVString {
    ptr: NonNull<Header>,
}

// Safety: the cache owns no reference; entries are only created and removed
// under the cache mutex, and the refcount itself is atomic.
unsafe impl Send for WeakVString {}

impl PartialEq for WeakVString {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}
impl Eq for WeakVString {}
impl Hash for WeakVString {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (**self).hash(state);
    }
}

impl Deref for WeakVString {
    type Target = str;
    fn deref(&self) -> &str {
        self.borrow()
    }
}

impl Borrow<str> for WeakVString {
    fn borrow(&self) -> &str {
        Header::str(self.ptr.as_ptr())
    }
}

impl WeakVString {
    fn upgrade(&self) -> VString {
        // Safety: called with the cache lock held, so the allocation is live
        unsafe {
            self.ptr.as_ref().rc.fetch_add(1, Relaxed);
        }
        VString { ptr: self.ptr }
    }
}

static STRING_CACHE: OnceLock<Mutex<HashSet<WeakVString>>> = OnceLock::new();

fn cache_lock() -> MutexGuard<'static, HashSet<WeakVString>> {
    STRING_CACHE
        .get_or_init(|| Mutex::new(HashSet::new()))
        .lock()
        .expect("Mutex lock should succeed")
}

/// The `VString` type is an immutable, reference-counted string used for
/// array keys.
///
/// Cloning a `VString` is cheap: it bumps the shared reference count. The
/// backing allocation is released exactly when the count reaches zero.
///
/// A `VString` comes in two flavours. [`VString::new`] allocates a fresh
/// buffer each time, so two calls with equal contents yield distinct
/// allocations that still compare equal. [`VString::intern`] consults a
/// process-wide cache so equal contents share a single allocation and can be
/// compared by pointer; interned strings are evicted from the cache when
/// their last reference is dropped, so the cache never leaks.
pub struct VString {
    ptr: NonNull<Header>,
}

impl VString {
    fn layout(len: usize) -> Result<Layout, LayoutError> {
        Ok(Layout::new::<Header>()
            .extend(Layout::array::<u8>(len)?)?
            .0
            .pad_to_align())
    }

    fn alloc(s: &str, interned: bool) -> NonNull<Header> {
        assert!(s.len() < u32::MAX as usize);
        let layout =
            Self::layout(s.len()).expect("layout is expected to return a valid value");
        unsafe {
            let ptr = alloc(layout).cast::<Header>();
            if ptr.is_null() {
                handle_alloc_error(layout);
            }
            ptr.write(Header {
                rc: AtomicU32::new(0),
                len: s.len() as u32,
                interned,
            });
            copy_nonoverlapping(s.as_ptr(), ptr.add(1).cast::<u8>(), s.len());
            NonNull::new_unchecked(ptr)
        }
    }

    fn dealloc(ptr: NonNull<Header>) {
        unsafe {
            let layout = Self::layout((*ptr.as_ptr()).len())
                .expect("layout is expected to return a valid value");
            dealloc(ptr.as_ptr().cast(), layout);
        }
    }

    /// Returns the empty string. Does not allocate.
    #[must_use]
    pub fn empty() -> Self {
        VString {
            ptr: NonNull::from(&EMPTY_HEADER),
        }
    }

    /// Allocates a fresh, non-interned string with the given contents.
    ///
    /// Distinct calls produce distinct allocations even for equal contents.
    #[must_use]
    pub fn new(s: &str) -> Self {
        if s.is_empty() {
            return Self::empty();
        }
        let ptr = Self::alloc(s, false);
        // Safety: freshly allocated, not yet shared
        unsafe {
            ptr.as_ref().rc.store(1, Relaxed);
        }
        VString { ptr }
    }

    /// Converts a `&str` to a `VString` by interning it in the process-wide
    /// string cache. Equal contents share one allocation.
    #[must_use]
    pub fn intern(s: &str) -> Self {
        if s.is_empty() {
            return Self::empty();
        }
        let mut cache = cache_lock();
        cache
            .get_or_insert_with(s, |s| WeakVString {
                ptr: Self::alloc(s, true),
            })
            .upgrade()
    }

    fn is_static(&self) -> bool {
        std::ptr::eq(self.ptr.as_ptr(), &EMPTY_HEADER)
    }

    fn header(&self) -> &Header {
        // Safety: the pointer is valid for as long as this handle lives
        unsafe { self.ptr.as_ref() }
    }

    /// Returns the length (in bytes) of this string.
    #[must_use]
    pub fn len(&self) -> usize {
        self.header().len()
    }

    /// Returns `true` if this is the empty string "".
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if this string lives in the process-wide intern cache.
    #[must_use]
    pub fn is_interned(&self) -> bool {
        self.is_static() || self.header().interned
    }

    /// Obtains a `&str` from this `VString`. This is a cheap operation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        Header::str(self.ptr.as_ptr())
    }

    /// Obtains a byte slice from this `VString`. This is a cheap operation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        Header::bytes(self.ptr.as_ptr())
    }

    /// Returns `true` if both handles point at the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Clone for VString {
    fn clone(&self) -> Self {
        if !self.is_static() {
            self.header().rc.fetch_add(1, Relaxed);
        }
        VString { ptr: self.ptr }
    }
}

impl Drop for VString {
    fn drop(&mut self) {
        if self.is_static() {
            return;
        }
        let hd = self.header();
        if !hd.interned {
            if hd.rc.fetch_sub(1, Relaxed) == 1 {
                Self::dealloc(self.ptr);
            }
            return;
        }

        // Fast path: while this is provably not the last reference, decrement
        // without taking the cache lock.
        let mut rc = hd.rc.load(Relaxed);
        while rc > 1 {
            match hd.rc.compare_exchange_weak(rc, rc - 1, Relaxed, Relaxed) {
                Ok(_) => return,
                Err(new_rc) => rc = new_rc,
            }
        }

        // Possibly the last reference: the decrement must happen under the
        // cache lock so a concurrent `intern` of the same contents cannot
        // upgrade an entry whose allocation is being freed.
        let mut cache = cache_lock();
        if hd.rc.fetch_sub(1, Relaxed) == 1 {
            let ours = cache
                .get(self.as_str())
                .map_or(false, |entry| entry.ptr == self.ptr);
            if ours {
                cache.remove(self.as_str());
            }
            Self::dealloc(self.ptr);
        }
    }
}

impl Deref for VString {
    type Target = str;
    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for VString {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for VString {
    fn from(other: &str) -> Self {
        Self::new(other)
    }
}

impl From<&String> for VString {
    fn from(other: &String) -> Self {
        Self::new(other.as_str())
    }
}

impl From<String> for VString {
    fn from(other: String) -> Self {
        Self::new(other.as_str())
    }
}

impl From<VString> for String {
    fn from(other: VString) -> Self {
        other.as_str().into()
    }
}

impl PartialEq for VString {
    fn eq(&self, other: &Self) -> bool {
        // Identity first, then content.
        self.ptr_eq(other) || self.as_str() == other.as_str()
    }
}

impl Eq for VString {}

impl PartialEq<str> for VString {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialOrd for VString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Hash for VString {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl Debug for VString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self.as_str(), f)
    }
}

impl Display for VString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self.as_str(), f)
    }
}

impl Default for VString {
    fn default() -> Self {
        Self::empty()
    }
}
