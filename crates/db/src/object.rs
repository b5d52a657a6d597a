// Copyright (C) 2024 Ryan Daum <ryan.daum@gmail.com>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The object record and its verb/property tables (spec.md §3 "Objects"). Grounded on the
//! teacher's `moor-values::model::{verbdef, propdef, objects}` shape, collapsed to plain,
//! synchronous, `Clone`-friendly structs since this store is accessed from exactly one thread
//! at a time (spec.md §5: "mutations to the object store are serialized by construction").

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use moor_common::flags::{BitEnum, ObjFlag, PropFlag, VerbFlag};
use moor_common::matching::VerbArgsSpec;
use moor_var::{Objid, Symbol, Var};

/// One verb definition (spec.md §3 "verbs" field): aliases, owner, permissions, argspec, and the
/// verb's source. The compiled `Program` is cached by the kernel, keyed by `uuid`, rather than
/// stored here, so that a verb edit (`set_verb_code`) only needs to invalidate one cache entry
/// (spec.md §4.3 "Verbs are lazily compiled on first execution and cached").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerbDef {
    pub uuid: Uuid,
    /// Space-separated alias patterns, each possibly containing one `*` (spec.md §4.4).
    pub names: Vec<String>,
    pub owner: Objid,
    pub flags: BitEnum<VerbFlag>,
    pub args: VerbArgsSpec,
    /// Source lines, as supplied to `set_verb_code`/`add_verb`. Empty until programmed.
    pub source: Vec<String>,
}

impl VerbDef {
    /// Matching rule (spec.md §4.4 step 2): strip the `*`; `prefix*suffix` matches `name` iff
    /// `name == prefix` or `name == prefix + k` for any prefix `k` of `suffix` (including the
    /// whole suffix); a plain alias with no `*` matches only exact equality. Both the command
    /// parser and explicit `obj:verb()` calls use this same function (verified bug fix).
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.names.iter().any(|alias| alias_matches(alias, name))
    }
}

#[must_use]
pub fn alias_matches(alias: &str, name: &str) -> bool {
    match alias.find('*') {
        None => alias == name,
        Some(star) => {
            let prefix = &alias[..star];
            let suffix = &alias[star + 1..];
            if !name.starts_with(prefix) {
                return false;
            }
            let rest = &name[prefix.len()..];
            rest.is_empty() || suffix.starts_with(rest)
        }
    }
}

/// One property definition (spec.md §3 "properties" field): the schema entry, created on the
/// defining object and propagated to descendants. The *value* for a given object lives in that
/// object's `local_values` map (`PropValueSlot`), not here — `PropDef` only records where the
/// property was declared and who may touch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropDef {
    pub uuid: Uuid,
    pub name: Symbol,
    /// The object on which this property was declared via `add_property` (spec.md §4.7).
    pub definer: Objid,
    pub owner: Objid,
    pub perms: BitEnum<PropFlag>,
}

/// An object's local slot for an inherited property (spec.md §3: "A child's entry may be
/// 'clear' (inherit the ancestor's current value) or overridden").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropValueSlot {
    pub value: Var,
    pub clear: bool,
}

/// The full object record (spec.md §3 "Objects" table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
    pub id: Objid,
    pub name: String,
    pub owner: Objid,
    pub parents: Vec<Objid>,
    pub children: Vec<Objid>,
    pub location: Objid,
    pub contents: Vec<Objid>,
    pub flags: BitEnum<ObjFlag>,
    pub verbs: Vec<VerbDef>,
    pub propdefs: Vec<PropDef>,
    /// Local value slots, keyed by the defining `PropDef`'s uuid. An object holds a slot for
    /// every property in its own `propdefs` plus every ancestor's, so inheritance never needs to
    /// search upward for the *slot* -- only the `PropDef` metadata requires a definer lookup.
    pub local_values: std::collections::HashMap<Uuid, PropValueSlot>,
    pub anonymous: bool,
    pub recycled: bool,
}

impl Object {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.recycled
    }
}
