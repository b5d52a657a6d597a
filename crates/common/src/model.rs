use moor_var::{Error, Objid, Symbol};
use thiserror::Error;

/// Failures from the object store (spec.md §7 "Access errors"/"State"), distinct from the MOO
/// `Error` enum: these are host-level `Result` failures the kernel turns into the matching MOO
/// `Error` at the boundary, not values a MOO program can catch directly.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorldStateError {
    #[error("object not found: {0}")]
    ObjectNotFound(Objid),
    #[error("object {0} already recycled")]
    ObjectRecycled(Objid),
    #[error("property not found: {1} on {0}")]
    PropertyNotFound(Objid, Symbol),
    #[error("property {0} already defined on {1}")]
    DuplicatePropertyDefinition(Symbol, Objid),
    #[error("property permission denied")]
    PropertyPermissionDenied,
    #[error("verb not found: {1} on {0}")]
    VerbNotFound(Objid, Symbol),
    #[error("verb permission denied")]
    VerbPermissionDenied,
    #[error("permission denied")]
    PermissionDenied,
    #[error("recursive move: {0} -> {1} would create a cycle")]
    RecursiveMove(Objid, Objid),
    #[error("chparent would create a cycle: {0} -> {1}")]
    ChparentRecursiveCycle(Objid, Objid),
    #[error("invalid argument")]
    InvalidArgument,
    #[error("object {0} is anonymous and cannot be moved/recycled this way")]
    AnonymousObjectNotSupported(Objid),
}

impl From<WorldStateError> for Error {
    fn from(value: WorldStateError) -> Self {
        match value {
            WorldStateError::ObjectNotFound(_) | WorldStateError::ObjectRecycled(_) => {
                Error::E_INVARG
            }
            WorldStateError::PropertyNotFound(..) => Error::E_PROPNF,
            WorldStateError::DuplicatePropertyDefinition(..) => Error::E_INVARG,
            WorldStateError::PropertyPermissionDenied => Error::E_PERM,
            WorldStateError::VerbNotFound(..) => Error::E_VERBNF,
            WorldStateError::VerbPermissionDenied => Error::E_PERM,
            WorldStateError::PermissionDenied => Error::E_PERM,
            WorldStateError::RecursiveMove(..) => Error::E_RECMOVE,
            WorldStateError::ChparentRecursiveCycle(..) => Error::E_RECMOVE,
            WorldStateError::InvalidArgument => Error::E_INVARG,
            WorldStateError::AnonymousObjectNotSupported(_) => Error::E_INVARG,
        }
    }
}

/// Failures the command parser/dispatcher (spec.md §4.6) can produce before a verb frame is ever
/// pushed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("no command match")]
    NoCommandMatch,
    #[error("permission denied")]
    PermissionDenied,
    #[error("could not parse command")]
    CouldNotParseCommand,
    #[error("database error: {0}")]
    DatabaseError(#[from] WorldStateError),
}

/// Attributes of an object the store may create/mutate, mirroring the teacher's `ObjAttrs`
/// builder: each field is `Some` only when the caller wants to set it.
#[derive(Debug, Clone, Default)]
pub struct ObjAttrs {
    pub name: Option<String>,
    pub owner: Option<Objid>,
    pub parents: Option<Vec<Objid>>,
    pub location: Option<Objid>,
}

impl ObjAttrs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn name(mut self, n: impl Into<String>) -> Self {
        self.name = Some(n.into());
        self
    }
    #[must_use]
    pub fn owner(mut self, o: Objid) -> Self {
        self.owner = Some(o);
        self
    }
    #[must_use]
    pub fn parents(mut self, p: Vec<Objid>) -> Self {
        self.parents = Some(p);
        self
    }
    #[must_use]
    pub fn location(mut self, l: Objid) -> Self {
        self.location = Some(l);
        self
    }
}

/// Who is asking, for permission checks (spec.md §4.7 "All builtins enforce permission
/// policies").
#[derive(Debug, Clone, Copy)]
pub struct Perms {
    pub who: Objid,
    pub wizard: bool,
    pub programmer: bool,
}

impl Perms {
    #[must_use]
    pub fn new(who: Objid, wizard: bool, programmer: bool) -> Self {
        Perms {
            who,
            wizard,
            programmer,
        }
    }

    /// Wizards bypass all ownership checks (GLOSSARY: "wizard bypasses most permission checks").
    pub fn check_is_wizard(&self) -> Result<(), WorldStateError> {
        if self.wizard {
            Ok(())
        } else {
            Err(WorldStateError::PermissionDenied)
        }
    }

    /// Owner-or-wizard: the common case for mutating a property/verb/object.
    pub fn check_owner_or_wizard(&self, owner: Objid) -> Result<(), WorldStateError> {
        if self.wizard || self.who == owner {
            Ok(())
        } else {
            Err(WorldStateError::PermissionDenied)
        }
    }

    pub fn check_programmer(&self) -> Result<(), WorldStateError> {
        if self.wizard || self.programmer {
            Ok(())
        } else {
            Err(WorldStateError::PermissionDenied)
        }
    }
}
