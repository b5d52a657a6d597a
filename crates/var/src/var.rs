use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::objid::Objid;
use crate::waif::Waif;

/// The tagged value a MOO expression ultimately produces (spec.md §3 "Values"). `Var` is a cheap,
/// `Clone`-everywhere handle: scalars are stored inline, `Str`/`List`/`Map`/`Waif` are `Arc`-backed
/// so passing a value through a dozen activation frames never copies the payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Var(Arc<Variant>);

/// 64-bit signed ints, doubles, immutable byte strings, object refs, the fixed error enum,
/// ordered lists, ordered maps, booleans, and waifs — spec.md §3 names exactly these nine.
#[derive(Debug, Serialize, Deserialize)]
pub enum Variant {
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Obj(Objid),
    Err(Error),
    List(Arc<Vec<Var>>),
    /// Ordered key->value pairs, kept sorted by `map_key_cmp` as the single source of truth for
    /// map iteration order (`mapkeys`, `mapvalues`) — see spec.md §9's open question on ERR/FLOAT
    /// key ordering, resolved in DESIGN.md.
    Map(Arc<Vec<(Var, Var)>>),
    Bool(bool),
    Waif(Arc<Waif>),
}

// Two `Var`s are equal iff they hold the same variant AND the same value: cross-type comparisons
// are never equal (spec.md §3 "Equality"). Enum derive gives us exactly that (different variants
// never compare equal), so `Bool(true) != Int(1)` and `Int(0) != Float(0.0)` fall out for free.
impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::Float(a), Variant::Float(b)) => a.to_bits() == b.to_bits(),
            (Variant::Str(a), Variant::Str(b)) => a == b,
            (Variant::Obj(a), Variant::Obj(b)) => a == b,
            (Variant::Err(a), Variant::Err(b)) => a == b,
            (Variant::List(a), Variant::List(b)) => a == b,
            (Variant::Map(a), Variant::Map(b)) => a == b,
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Waif(a), Variant::Waif(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}
impl Eq for Variant {}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Var {}

impl Var {
    #[must_use]
    pub fn variant(&self) -> &Variant {
        &self.0
    }

    #[must_use]
    pub fn new(variant: Variant) -> Self {
        Var(Arc::new(variant))
    }

    /// MOO truthiness (spec.md §3): `0`, `0.0`, `""`, `{}`, `[]`, `false`, and `#-1` are falsy;
    /// everything else — including every error value — is truthy.
    #[must_use]
    pub fn is_true(&self) -> bool {
        match self.variant() {
            Variant::Int(i) => *i != 0,
            Variant::Float(f) => *f != 0.0,
            Variant::Str(s) => !s.is_empty(),
            Variant::Obj(o) => *o != Objid::NOTHING,
            Variant::Err(_) => true,
            Variant::List(l) => !l.is_empty(),
            Variant::Map(m) => !m.is_empty(),
            Variant::Bool(b) => *b,
            Variant::Waif(_) => true,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self.variant() {
            Variant::Int(_) => "INT",
            Variant::Float(_) => "FLOAT",
            Variant::Str(_) => "STR",
            Variant::Obj(_) => "OBJ",
            Variant::Err(_) => "ERR",
            Variant::List(_) => "LIST",
            Variant::Map(_) => "MAP",
            Variant::Bool(_) => "BOOL",
            Variant::Waif(_) => "WAIF",
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self.variant() {
            Variant::Int(i) => Some(*i),
            _ => None,
        }
    }
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self.variant() {
            Variant::Float(f) => Some(*f),
            _ => None,
        }
    }
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self.variant() {
            Variant::Str(s) => Some(s),
            _ => None,
        }
    }
    #[must_use]
    pub fn as_obj(&self) -> Option<Objid> {
        match self.variant() {
            Variant::Obj(o) => Some(*o),
            _ => None,
        }
    }
    #[must_use]
    pub fn as_list(&self) -> Option<&[Var]> {
        match self.variant() {
            Variant::List(l) => Some(l),
            _ => None,
        }
    }
    #[must_use]
    pub fn as_map(&self) -> Option<&[(Var, Var)]> {
        match self.variant() {
            Variant::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Same-type ordering for `< <= > >=` (spec.md §4.3): INT, FLOAT, STR (lexicographic), OBJ
    /// (by id), ERR (by numeric code). Cross-type comparison, and comparison of any other type
    /// (LIST, MAP, BOOL, WAIF), is `E_TYPE`.
    pub fn cmp_moo(&self, other: &Var) -> Result<Ordering, Error> {
        match (self.variant(), other.variant()) {
            (Variant::Int(a), Variant::Int(b)) => Ok(a.cmp(b)),
            (Variant::Float(a), Variant::Float(b)) => {
                a.partial_cmp(b).ok_or(Error::E_FLOAT)
            }
            (Variant::Str(a), Variant::Str(b)) => Ok(a.as_ref().cmp(b.as_ref())),
            (Variant::Obj(a), Variant::Obj(b)) => Ok(a.cmp(b)),
            (Variant::Err(a), Variant::Err(b)) => Ok(a.code().cmp(&b.code())),
            _ => Err(Error::E_TYPE),
        }
    }

    /// Total order used only to keep `Map`'s backing vector sorted. Spec.md §9 resolves the
    /// open question on ERR/FLOAT key ordering: keys sort first by type-rank (INT, OBJ, STR, ERR,
    /// FLOAT) and then by value within a type. This is never exposed as the `<` operator's
    /// behavior — only map iteration order.
    #[must_use]
    pub fn map_key_cmp(a: &Var, b: &Var) -> Ordering {
        fn rank(v: &Var) -> u8 {
            match v.variant() {
                Variant::Int(_) => 0,
                Variant::Obj(_) => 1,
                Variant::Str(_) => 2,
                Variant::Err(_) => 3,
                Variant::Float(_) => 4,
                _ => 5,
            }
        }
        let (ra, rb) = (rank(a), rank(b));
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (a.variant(), b.variant()) {
            (Variant::Int(x), Variant::Int(y)) => x.cmp(y),
            (Variant::Obj(x), Variant::Obj(y)) => x.cmp(y),
            (Variant::Str(x), Variant::Str(y)) => x.as_ref().cmp(y.as_ref()),
            (Variant::Err(x), Variant::Err(y)) => x.code().cmp(&y.code()),
            (Variant::Float(x), Variant::Float(y)) => {
                x.partial_cmp(y).unwrap_or(Ordering::Equal)
            }
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant() {
            Variant::Int(i) => write!(f, "{i}"),
            Variant::Float(v) => write!(f, "{v}"),
            Variant::Str(s) => write!(f, "{s}"),
            Variant::Obj(o) => write!(f, "{o}"),
            Variant::Err(e) => write!(f, "{e}"),
            // Verified oracle behavior (spec.md §9): the display/tostr form of a LIST or MAP is
            // the literal word, not its contents. `toliteral` is the form that recurses.
            Variant::List(_) => write!(f, "{{list}}"),
            Variant::Map(_) => write!(f, "[map]"),
            Variant::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Variant::Waif(_) => write!(f, "*waif*"),
        }
    }
}

// ---- constructors -------------------------------------------------------

#[must_use]
pub fn v_int(i: i64) -> Var {
    Var::new(Variant::Int(i))
}
#[must_use]
pub fn v_float(f: f64) -> Var {
    Var::new(Variant::Float(f))
}
#[must_use]
pub fn v_str(s: &str) -> Var {
    Var::new(Variant::Str(Arc::from(s)))
}
#[must_use]
pub fn v_string(s: String) -> Var {
    Var::new(Variant::Str(Arc::from(s.as_str())))
}
#[must_use]
pub fn v_obj(o: Objid) -> Var {
    Var::new(Variant::Obj(o))
}
#[must_use]
pub fn v_objid(o: impl Into<Objid>) -> Var {
    Var::new(Variant::Obj(o.into()))
}
#[must_use]
pub fn v_err(e: Error) -> Var {
    Var::new(Variant::Err(e))
}
#[must_use]
pub fn v_list(l: Vec<Var>) -> Var {
    Var::new(Variant::List(Arc::new(l)))
}
#[must_use]
pub fn v_list_iter(it: impl IntoIterator<Item = Var>) -> Var {
    v_list(it.into_iter().collect())
}
#[must_use]
pub fn v_bool(b: bool) -> Var {
    Var::new(Variant::Bool(b))
}
#[must_use]
pub fn v_none() -> Var {
    v_obj(Objid::NOTHING)
}
#[must_use]
pub fn v_empty_list() -> Var {
    v_list(vec![])
}

/// Builds a `Map` value, sorting and de-duplicating (last write wins) by `Var::map_key_cmp`.
#[must_use]
pub fn v_map(pairs: Vec<(Var, Var)>) -> Var {
    let mut sorted = pairs;
    sorted.sort_by(|(a, _), (b, _)| Var::map_key_cmp(a, b));
    sorted.dedup_by(|(a, av), (b, bv)| {
        if a == b {
            *bv = av.clone();
            true
        } else {
            false
        }
    });
    Var::new(Variant::Map(Arc::new(sorted)))
}

#[must_use]
pub fn v_waif(w: Waif) -> Var {
    Var::new(Variant::Waif(Arc::new(w)))
}
