//! The tagged key type: integer or shared string

use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;

use crate::error::VarrayError;
use crate::string::VString;
use crate::value::Variant;

/// An array key: either an integer or a shared, immutable string.
///
/// String keys are reference counted; cloning a `Key` shares the string
/// rather than copying it, and the string is released when the last holder
/// drops it.
#[derive(Clone)]
pub enum Key {
    /// Integer key
    Int(i64),
    /// String key
    Str(VString),
}

impl Key {
    /// Returns `true` if this is a string key.
    #[must_use]
    pub fn is_str(&self) -> bool {
        matches!(self, Key::Str(_))
    }

    /// Returns the integer key, if this is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(i) => Some(*i),
            Key::Str(_) => None,
        }
    }

    /// Returns the string key, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&VString> {
        match self {
            Key::Int(_) => None,
            Key::Str(s) => Some(s),
        }
    }

    /// Coerces a scalar value to a key, following the usual runtime rules:
    /// integers are used as-is, booleans become 0/1, floats are truncated,
    /// null becomes the empty string, strings are shared. Non-scalar values
    /// are rejected.
    pub fn from_variant(v: &Variant) -> Result<Key, VarrayError> {
        match v {
            Variant::Null => Ok(Key::Str(VString::empty())),
            Variant::Bool(b) => Ok(Key::Int(*b as i64)),
            Variant::Int(i) => Ok(Key::Int(*i)),
            Variant::Float(f) => Ok(Key::Int(*f as i64)),
            Variant::Str(s) => Ok(Key::Str(s.clone())),
            Variant::Ref(cell) => Key::from_variant(&cell.borrow()),
            Variant::Array(_) => Err(VarrayError::BadKey("array")),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Int(a), Key::Int(b)) => a == b,
            (Key::Str(a), Key::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Key::Int(i) => {
                state.write_u8(0);
                i.hash(state);
            }
            Key::Str(s) => {
                state.write_u8(1);
                s.hash(state);
            }
        }
    }
}

impl From<i64> for Key {
    fn from(other: i64) -> Self {
        Key::Int(other)
    }
}

impl From<&str> for Key {
    fn from(other: &str) -> Self {
        Key::Str(VString::new(other))
    }
}

impl From<VString> for Key {
    fn from(other: VString) -> Self {
        Key::Str(other)
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => Debug::fmt(i, f),
            Key::Str(s) => Debug::fmt(s, f),
        }
    }
}
