use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// A compact bitset over a `#[repr(u8)]`-ish enum, the way the reference server packs an
/// object's or verb's flags into a single byte. `T` must be convertible to/from a bit position
/// via `into_usize`/`from_usize`; `BitEnum` itself stores nothing but the bits.
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct BitEnum<T> {
    bits: u16,
    phantom: PhantomData<T>,
}

impl<T> Default for BitEnum<T> {
    fn default() -> Self {
        Self {
            bits: 0,
            phantom: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for BitEnum<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BitEnum({:#06b})", self.bits)
    }
}

impl<T> PartialEq for BitEnum<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}
impl<T> Eq for BitEnum<T> {}

impl<T: Into<u8> + Copy> BitEnum<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new_with(flags: &[T]) -> Self {
        let mut b = Self::default();
        for f in flags {
            b.set(*f);
        }
        b
    }

    pub fn set(&mut self, flag: T) -> &mut Self {
        self.bits |= 1 << flag.into();
        self
    }

    pub fn clear(&mut self, flag: T) -> &mut Self {
        self.bits &= !(1 << flag.into());
        self
    }

    #[must_use]
    pub fn contains(&self, flag: T) -> bool {
        self.bits & (1 << flag.into()) != 0
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            bits: self.bits | other.bits,
            phantom: PhantomData,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

/// Object flags (spec.md §3 "Objects" `flags` field). `Recycled` and `Anonymous` are tracked
/// here rather than as separate booleans so the store can treat them uniformly with the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjFlag {
    User = 0,
    Programmer = 1,
    Wizard = 2,
    Read = 3,
    Write = 4,
    Fertile = 5,
    Anonymous = 6,
    Recycled = 7,
}

impl From<ObjFlag> for u8 {
    fn from(value: ObjFlag) -> Self {
        value as u8
    }
}

/// Verb permission bits: `r`/`w`/`x`/`d` (spec.md §3 "Objects" `verbs` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerbFlag {
    Read = 0,
    Write = 1,
    Exec = 2,
    Debug = 3,
}

impl From<VerbFlag> for u8 {
    fn from(value: VerbFlag) -> Self {
        value as u8
    }
}

/// Property permission bits: `r`/`w`/`c` (spec.md §3 "Objects" `properties` field; §4.7
/// "Permission strings restricted to `"", "r", "w", "rw", "rc", "wc", "rwc"`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropFlag {
    Read = 0,
    Write = 1,
    Chown = 2,
}

impl From<PropFlag> for u8 {
    fn from(value: PropFlag) -> Self {
        value as u8
    }
}

/// Parses a permission-string argument (e.g. to `set_property_info`/`set_verb_info`) into the
/// corresponding flag set. Any character outside `rwcxd` is rejected with `None` so callers can
/// raise `E_INVARG` (spec.md §4.7).
pub fn parse_prop_flags(s: &str) -> Option<BitEnum<PropFlag>> {
    let mut b = BitEnum::new();
    for c in s.chars() {
        match c {
            'r' => {
                b.set(PropFlag::Read);
            }
            'w' => {
                b.set(PropFlag::Write);
            }
            'c' => {
                b.set(PropFlag::Chown);
            }
            _ => return None,
        }
    }
    Some(b)
}

pub fn parse_verb_flags(s: &str) -> Option<BitEnum<VerbFlag>> {
    let mut b = BitEnum::new();
    for c in s.chars() {
        match c {
            'r' => {
                b.set(VerbFlag::Read);
            }
            'w' => {
                b.set(VerbFlag::Write);
            }
            'x' => {
                b.set(VerbFlag::Exec);
            }
            'd' => {
                b.set(VerbFlag::Debug);
            }
            _ => return None,
        }
    }
    Some(b)
}

#[must_use]
pub fn unparse_flags<T: Into<u8> + Copy>(b: &BitEnum<T>, letters: &[(T, char)]) -> String {
    letters
        .iter()
        .filter(|(f, _)| b.contains(*f))
        .map(|(_, c)| *c)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prop_flags_roundtrip() {
        let b = parse_prop_flags("rw").unwrap();
        assert!(b.contains(PropFlag::Read));
        assert!(b.contains(PropFlag::Write));
        assert!(!b.contains(PropFlag::Chown));
        assert_eq!(
            unparse_flags(&b, &[(PropFlag::Read, 'r'), (PropFlag::Write, 'w'), (PropFlag::Chown, 'c')]),
            "rw"
        );
    }

    #[test]
    fn rejects_bad_flag_string() {
        assert!(parse_prop_flags("q").is_none());
        assert!(parse_verb_flags("z").is_none());
    }
}
