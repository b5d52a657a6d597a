//! The value model (spec.md §3 "Values"): a tagged `Var`/`Variant`, the fixed `Error`
//! enumeration, `Objid` object references, interned `Symbol`s, and `Waif`. No dependency on
//! anything else in the workspace — every other crate builds on top of this one.

pub mod error;
pub mod objid;
pub mod symbol;
pub mod var;
pub mod waif;

pub use error::{Error, Exception};
pub use objid::Objid;
pub use symbol::Symbol;
pub use var::{
    v_bool, v_empty_list, v_err, v_float, v_int, v_list, v_list_iter, v_map, v_none, v_obj,
    v_objid, v_str, v_string, v_waif, Var, Variant,
};
pub use waif::Waif;
