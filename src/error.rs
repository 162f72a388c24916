//! Error types for the crate

use thiserror::Error;

/// Error type for varray
///
/// Allocation failure is not represented here: the container treats it as
/// fatal and aborts through the global allocation error hook.
#[derive(Error, Debug)]
pub enum VarrayError {
    /// A value could not be coerced to an array key
    #[error("cannot use a value of type {0} as an array key")]
    BadKey(&'static str),
}
