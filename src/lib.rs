//! An insertion-ordered associative array value for a dynamically-typed
//! runtime.
//!
//! The centrepiece is [`VArray`]: an array whose keys are 64-bit integers or
//! refcounted strings ([`Key`]), whose elements are dynamic values
//! ([`Variant`]), and which iterates in insertion order. It provides the
//! semantics a scripting-language array needs and a plain map does not:
//!
//! - auto-increment integer keys for appends, interleaved with explicit
//!   integer and string keys;
//! - cheap `Clone` with copy-on-write: handles share a container until one
//!   of them mutates;
//! - assign-by-reference slots ([`Variant::Ref`]) that survive or are
//!   deliberately flattened across a copy;
//! - a sequential cursor plus "strong" iterator handles ([`StrongIter`])
//!   that are repaired or invalidated across structural edits;
//! - front operations ([`VArray::prepend`], [`VArray::dequeue`]) that
//!   renumber integer keys, and [`VArray::escalate`] into the general
//!   hash-table representation ([`DictArray`]) when linear lookup no longer
//!   fits the workload.
//!
//! ```
//! use varray::{Key, VArray, Variant};
//!
//! let mut a = VArray::new();
//! a.append(Variant::from("first"));
//! a.set(Key::from("name"), Variant::from("second"));
//! a.append(Variant::Int(3));
//!
//! let keys: Vec<_> = a.iter().map(|(k, _)| k.clone()).collect();
//! assert_eq!(keys, vec![Key::Int(0), Key::from("name"), Key::Int(1)]);
//! ```

#[cfg(test)]
#[global_allocator]
static ALLOCATOR: mockalloc::Mockalloc<std::alloc::System> =
    mockalloc::Mockalloc(std::alloc::System);

mod array;
mod dict;
mod error;
mod key;
mod store;
mod string;
mod strong_iter;
mod value;

pub use crate::array::{Entries, VArray};
pub use crate::dict::DictArray;
pub use crate::error::VarrayError;
pub use crate::key::Key;
pub use crate::string::VString;
pub use crate::strong_iter::{IterState, StrongIter};
pub use crate::value::Variant;
