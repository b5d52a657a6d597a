use std::fmt;

use strum::{Display, EnumString};
use thiserror::Error;

/// The fixed enumeration of MOO error codes. Errors are ordinary values: they can be compared,
/// stored in a list, returned from a builtin, or raised and caught with `try`/`except`.
///
/// All non-`E_NONE` errors are truthy, same as any other non-empty/non-zero value.
#[derive(
    Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Error {
    E_NONE,
    E_TYPE,
    E_DIV,
    E_PERM,
    E_PROPNF,
    E_VERBNF,
    E_VARNF,
    E_INVIND,
    E_RECMOVE,
    E_MAXREC,
    E_RANGE,
    E_ARGS,
    E_NACC,
    E_INVARG,
    E_QUOTA,
    E_FLOAT,
    E_FILE,
    E_EXEC,
}

impl Error {
    /// The numeric code the reference server assigns each error, in declaration order. Used by
    /// `toint(err)` and the `<`/`<=` ordering between ERR values (§4.3: "ERR (by numeric code)").
    #[must_use]
    pub fn code(&self) -> i64 {
        *self as i64
    }

    /// The human-readable message the reference server prints for this code, e.g. in tracebacks
    /// and `tostr`. Distinct from the `Display` impl, which prints the bare symbol (`E_PROPNF`).
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Error::E_NONE => "No error",
            Error::E_TYPE => "Type mismatch",
            Error::E_DIV => "Division by zero",
            Error::E_PERM => "Permission denied",
            Error::E_PROPNF => "Property not found",
            Error::E_VERBNF => "Verb not found",
            Error::E_VARNF => "Variable not found",
            Error::E_INVIND => "Invalid indirection",
            Error::E_RECMOVE => "Recursive move",
            Error::E_MAXREC => "Too many verb calls",
            Error::E_RANGE => "Range error",
            Error::E_ARGS => "Incorrect number of arguments",
            Error::E_NACC => "Move refused by destination",
            Error::E_INVARG => "Invalid argument",
            Error::E_QUOTA => "Resource limit exceeded",
            Error::E_FLOAT => "Floating-point arithmetic error",
            Error::E_FILE => "File I/O failed",
            Error::E_EXEC => "Exec call failed",
        }
    }

    #[must_use]
    pub fn from_code(code: i64) -> Option<Error> {
        ALL.iter().find(|e| e.code() == code).copied()
    }
}

const ALL: [Error; 18] = [
    Error::E_NONE,
    Error::E_TYPE,
    Error::E_DIV,
    Error::E_PERM,
    Error::E_PROPNF,
    Error::E_VERBNF,
    Error::E_VARNF,
    Error::E_INVIND,
    Error::E_RECMOVE,
    Error::E_MAXREC,
    Error::E_RANGE,
    Error::E_ARGS,
    Error::E_NACC,
    Error::E_INVARG,
    Error::E_QUOTA,
    Error::E_FLOAT,
    Error::E_FILE,
    Error::E_EXEC,
];

/// A raised MOO-level error, carrying the value bound by `except ... (codes)` handlers: the
/// ToastStunt `{code, message, value, traceback}` 4-tuple (spec.md §4.3: "specify 4-tuple as the
/// canonical form"). `value` is the argument passed to `raise()`, or `None` for errors raised
/// internally by the VM.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub error: Error,
    pub msg: String,
    pub value: Option<crate::Var>,
    /// Formatted traceback lines, innermost frame first, built at the point of the unhandled
    /// propagation (or lazily by `except`'s 4-tuple form).
    pub traceback: Vec<String>,
}

impl Exception {
    #[must_use]
    pub fn from_error(error: Error) -> Self {
        Exception {
            msg: error.message().to_string(),
            error,
            value: None,
            traceback: vec![],
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.msg)
    }
}
