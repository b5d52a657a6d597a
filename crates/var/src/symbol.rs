use std::fmt;

use serde::{Deserialize, Serialize};
use ustr::Ustr;

/// An interned string, used for identifiers, property names, and verb names/aliases: values that
/// are compared and hashed far more often than they're allocated. Cloning a `Symbol` is a pointer
/// copy.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Symbol(Ustr);

impl Symbol {
    #[must_use]
    pub fn mk(s: &str) -> Self {
        Symbol(Ustr::from(s))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol::mk(value)
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Symbol::mk(&value)
    }
}

impl Serialize for Symbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Symbol::mk(&s))
    }
}
