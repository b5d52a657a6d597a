use std::fmt;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// An object reference: a signed object number. Reserved values carry special meaning to the
/// object store and command parser (spec.md §3 "Objects"):
///
/// - `#-1` (`NOTHING`) is falsy and means "no object".
/// - `#-2` (`AMBIGUOUS_MATCH`) marks a command-parser match that resolved to more than one object.
/// - `#-3` (`FAILED_MATCH`) marks a command-parser match that resolved to none.
/// - `#0` (`SYSTEM_OBJECT`) is the root of `$name` sugar (`$foo` == `#0.foo`).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Encode, Decode, Serialize, Deserialize)]
pub struct Objid(pub i64);

impl Objid {
    pub const NOTHING: Objid = Objid(-1);
    pub const AMBIGUOUS_MATCH: Objid = Objid(-2);
    pub const FAILED_MATCH: Objid = Objid(-3);
    pub const SYSTEM_OBJECT: Objid = Objid(0);

    #[must_use]
    pub fn is_nothing(&self) -> bool {
        *self == Objid::NOTHING
    }

    /// Anonymous objects (created with `create(parent, 1)`) have no stable number and are
    /// represented with ids in a reserved negative range below the match sentinels so that an
    /// `Objid` alone is never mistaken for an addressable object. The store is the arbiter of
    /// whether a given negative id is actually "anonymous" vs. a match sentinel; this predicate
    /// just recognizes the reserved band.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        matches!(
            *self,
            Objid::NOTHING | Objid::AMBIGUOUS_MATCH | Objid::FAILED_MATCH
        )
    }
}

impl fmt::Display for Objid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Debug for Objid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<i64> for Objid {
    fn from(value: i64) -> Self {
        Objid(value)
    }
}
