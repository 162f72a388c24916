//! The dynamic value type stored in array slots

use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::array::VArray;
use crate::string::VString;

/// A dynamically-typed value.
///
/// `Clone` is shallow: strings share their refcounted buffer, arrays share
/// their copy-on-write handle, and a [`Variant::Ref`] shares its storage
/// cell (preserving aliasing). Use [`Variant::clone_flattened`] where one
/// level of aliasing must be broken instead.
#[derive(Clone)]
pub enum Variant {
    /// The null value
    Null,
    /// A boolean
    Bool(bool),
    /// A 64-bit integer
    Int(i64),
    /// A double-precision float
    Float(f64),
    /// A shared, immutable string
    Str(VString),
    /// An array value (copy-on-write handle)
    Array(VArray),
    /// A boxed value: two or more slots sharing one storage cell
    Ref(Rc<RefCell<Variant>>),
}

impl Variant {
    /// Returns `true` if this is the null value (reading through a `Ref`).
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Variant::Null => true,
            Variant::Ref(cell) => cell.borrow().is_null(),
            _ => false,
        }
    }

    /// Returns `true` for integer and float values.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        match self {
            Variant::Int(_) | Variant::Float(_) => true,
            Variant::Ref(cell) => cell.borrow().is_numeric(),
            _ => false,
        }
    }

    /// Returns `true` for string values.
    #[must_use]
    pub fn is_string(&self) -> bool {
        match self {
            Variant::Str(_) => true,
            Variant::Ref(cell) => cell.borrow().is_string(),
            _ => false,
        }
    }

    /// Returns the integer form of a numeric value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Bool(b) => Some(*b as i64),
            Variant::Int(i) => Some(*i),
            Variant::Float(f) => Some(*f as i64),
            Variant::Ref(cell) => cell.borrow().as_int(),
            _ => None,
        }
    }

    /// Returns the string, if this is a string value.
    #[must_use]
    pub fn as_vstring(&self) -> Option<VString> {
        match self {
            Variant::Str(s) => Some(s.clone()),
            Variant::Ref(cell) => cell.borrow().as_vstring(),
            _ => None,
        }
    }

    /// Returns the array handle, if this is an array value.
    #[must_use]
    pub fn as_array(&self) -> Option<VArray> {
        match self {
            Variant::Array(a) => Some(a.clone()),
            Variant::Ref(cell) => cell.borrow().as_array(),
            _ => None,
        }
    }

    /// A short name for the value's type, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Null => "null",
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::Float(_) => "float",
            Variant::Str(_) => "string",
            Variant::Array(_) => "array",
            Variant::Ref(_) => "reference",
        }
    }

    /// Copy with one level of aliasing broken: a `Ref` is copied by value
    /// (its current inner value is cloned), while any deeper sharing inside
    /// that value is preserved. All other variants clone as usual.
    #[must_use]
    pub fn clone_flattened(&self) -> Variant {
        match self {
            Variant::Ref(cell) => cell.borrow().clone(),
            other => other.clone(),
        }
    }

    /// Assign-by-reference: boxes `self` in place (if it is not already
    /// boxed) and returns a second handle to the same storage cell, so that
    /// writes through either handle are visible through the other.
    pub fn to_ref(&mut self) -> Variant {
        if let Variant::Ref(cell) = self {
            return Variant::Ref(Rc::clone(cell));
        }
        let cell = Rc::new(RefCell::new(std::mem::replace(self, Variant::Null)));
        *self = Variant::Ref(Rc::clone(&cell));
        Variant::Ref(cell)
    }

    /// Deep constant finalization: interns string contents, finalizes nested
    /// arrays, and collapses references by value. Used when a value becomes
    /// part of an immutable compile-time constant.
    pub fn finalize(&mut self) {
        if let Variant::Ref(cell) = self {
            let inner = cell.borrow().clone();
            *self = inner;
            self.finalize();
            return;
        }
        match self {
            Variant::Str(s) => {
                if !s.is_interned() {
                    *s = VString::intern(s.as_str());
                }
            }
            Variant::Array(a) => a.finalize_as_constant(),
            _ => {}
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Variant::Null
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Ref(a), _) => a.borrow().eq(other),
            (_, Variant::Ref(b)) => self.eq(&b.borrow()),
            (Variant::Null, Variant::Null) => true,
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::Float(a), Variant::Float(b)) => a == b,
            (Variant::Str(a), Variant::Str(b)) => a == b,
            (Variant::Array(a), Variant::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Debug for Variant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => f.write_str("null"),
            Variant::Bool(b) => Debug::fmt(b, f),
            Variant::Int(i) => Debug::fmt(i, f),
            Variant::Float(x) => Debug::fmt(x, f),
            Variant::Str(s) => Debug::fmt(s, f),
            Variant::Array(a) => Debug::fmt(a, f),
            // Diagnostics must not fail or panic on an already-borrowed cell.
            Variant::Ref(cell) => match cell.try_borrow() {
                Ok(v) => write!(f, "&{:?}", v),
                Err(_) => f.write_str("&<in use>"),
            },
        }
    }
}

impl From<bool> for Variant {
    fn from(other: bool) -> Self {
        Variant::Bool(other)
    }
}

impl From<i64> for Variant {
    fn from(other: i64) -> Self {
        Variant::Int(other)
    }
}

impl From<f64> for Variant {
    fn from(other: f64) -> Self {
        Variant::Float(other)
    }
}

impl From<&str> for Variant {
    fn from(other: &str) -> Self {
        Variant::Str(VString::new(other))
    }
}

impl From<VString> for Variant {
    fn from(other: VString) -> Self {
        Variant::Str(other)
    }
}

impl From<VArray> for Variant {
    fn from(other: VArray) -> Self {
        Variant::Array(other)
    }
}
