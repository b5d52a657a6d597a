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

//! The object store (spec.md §3 "Objects", §4 component share "Object store 14%"). A single
//! owned `WorldState` -- spec.md §9's "Global mutable state... encapsulated in two process-wide
//! singletons"; the other being the task manager in `moor-kernel`. Per spec.md §5 ("mutations...
//! serialized by construction... guarded by a lock or single-owner channel") this store has
//! exactly one owner: the scheduler thread. No internal locking is needed because of that, not
//! despite it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use moor_common::flags::{BitEnum, ObjFlag, PropFlag, VerbFlag};
use moor_common::matching::VerbArgsSpec;
use moor_common::model::{ObjAttrs, Perms, WorldStateError};
use moor_var::{Objid, Symbol, Var};

use crate::object::{Object, PropDef, PropValueSlot, VerbDef};

type Result<T> = std::result::Result<T, WorldStateError>;

/// The whole database: every object, plus the bookkeeping needed to hand out fresh ids
/// (spec.md §6 "Persisted state" -- this struct is exactly what a dump/load round-trips).
#[derive(Debug, Serialize, Deserialize)]
pub struct WorldState {
    objects: HashMap<Objid, Object>,
    /// Object numbers freed by `recycle()`, reused before allocating a new high-water number
    /// (spec.md §3 "Create": "allocates the next unused OBJ number (or recycles the first freed
    /// number depending on configuration)"). We always recycle the lowest freed number first.
    free_list: Vec<i64>,
    next_id: i64,
    next_anon_id: i64,
}

impl WorldState {
    #[must_use]
    pub fn new() -> Self {
        WorldState {
            objects: HashMap::new(),
            free_list: Vec::new(),
            next_id: 0,
            next_anon_id: -1000,
        }
    }

    fn get(&self, o: Objid) -> Result<&Object> {
        let obj = self
            .objects
            .get(&o)
            .ok_or(WorldStateError::ObjectNotFound(o))?;
        if obj.recycled {
            return Err(WorldStateError::ObjectRecycled(o));
        }
        Ok(obj)
    }

    fn get_mut(&mut self, o: Objid) -> Result<&mut Object> {
        let obj = self
            .objects
            .get_mut(&o)
            .ok_or(WorldStateError::ObjectNotFound(o))?;
        if obj.recycled {
            return Err(WorldStateError::ObjectRecycled(o));
        }
        Ok(obj)
    }

    #[must_use]
    pub fn valid(&self, o: Objid) -> bool {
        self.objects.get(&o).is_some_and(Object::is_valid)
    }

    #[must_use]
    pub fn max_object(&self) -> Objid {
        Objid(self.next_id - 1)
    }

    #[must_use]
    pub fn players(&self) -> Vec<Objid> {
        self.objects
            .values()
            .filter(|o| o.is_valid() && o.flags.contains(ObjFlag::User))
            .map(|o| o.id)
            .collect()
    }

    #[must_use]
    pub fn all_objects(&self) -> Vec<Objid> {
        let mut ids: Vec<Objid> = self
            .objects
            .values()
            .filter(|o| o.is_valid())
            .map(|o| o.id)
            .collect();
        ids.sort();
        ids
    }

    // ---- lifecycle ---------------------------------------------------------

    /// `create(parent, [owner])` (spec.md §3 "Lifecycle"). `anonymous` objects get ids from a
    /// reserved negative band never handed out to addressable objects.
    pub fn create_object(
        &mut self,
        owner: Objid,
        attrs: ObjAttrs,
        anonymous: bool,
    ) -> Result<Objid> {
        let parents = attrs.parents.unwrap_or_default();
        for p in &parents {
            if !self.valid(*p) {
                return Err(WorldStateError::ObjectNotFound(*p));
            }
        }
        self.check_no_parent_cycle_with_new(&parents)?;

        let id = if anonymous {
            let id = Objid(self.next_anon_id);
            self.next_anon_id -= 1;
            id
        } else if let Some(freed) = self.free_list.pop() {
            Objid(freed)
        } else {
            let id = Objid(self.next_id);
            self.next_id += 1;
            id
        };

        let mut local_values = HashMap::new();
        for parent in &parents {
            self.inherit_propdefs(*parent, &mut local_values)?;
        }

        let obj = Object {
            id,
            name: attrs.name.unwrap_or_default(),
            owner,
            parents: parents.clone(),
            children: vec![],
            location: Objid::NOTHING,
            contents: vec![],
            flags: BitEnum::new(),
            verbs: vec![],
            propdefs: vec![],
            local_values,
            anonymous,
            recycled: false,
        };
        self.objects.insert(id, obj);
        for parent in &parents {
            self.get_mut(*parent)?.children.push(id);
        }
        Ok(id)
    }

    fn inherit_propdefs(
        &self,
        ancestor: Objid,
        out: &mut HashMap<Uuid, PropValueSlot>,
    ) -> Result<()> {
        let obj = self.get(ancestor)?;
        for pd in &obj.propdefs {
            out.entry(pd.uuid).or_insert(PropValueSlot {
                value: moor_var::v_int(0),
                clear: true,
            });
        }
        for p in obj.parents.clone() {
            self.inherit_propdefs(p, out)?;
        }
        Ok(())
    }

    /// `recycle(o)` (spec.md §3 "Lifecycle"): detach from parents, move contents to `#-1`,
    /// invalidate anonymous descendants, mark recycled, free the number for reuse.
    pub fn recycle(&mut self, perms: &Perms, o: Objid) -> Result<()> {
        let obj = self.get(o)?;
        perms.check_owner_or_wizard(obj.owner)?;
        let parents = obj.parents.clone();
        let children = obj.children.clone();
        let contents = obj.contents.clone();
        let anonymous = obj.anonymous;

        for c in contents {
            self.set_location(c, Objid::NOTHING)?;
        }
        for p in &parents {
            if let Ok(parent) = self.get_mut(*p) {
                parent.children.retain(|c| *c != o);
            }
        }
        for c in &children {
            if let Ok(child) = self.get_mut(*c) {
                child.parents.retain(|p| *p != o);
            }
        }
        if let Some(loc) = self.objects.get(&o).map(|obj| obj.location) {
            if loc != Objid::NOTHING {
                if let Ok(l) = self.get_mut(loc) {
                    l.contents.retain(|c| *c != o);
                }
            }
        }

        let descendants = self.transitive_children(o);
        let anon_descendants: Vec<Objid> = descendants
            .into_iter()
            .filter(|d| self.objects.get(d).is_some_and(|dobj| dobj.anonymous))
            .collect();
        for d in anon_descendants {
            if let Some(dobj) = self.objects.get_mut(&d) {
                dobj.recycled = true;
            }
        }

        let obj = self.get_mut(o)?;
        obj.recycled = true;
        obj.parents.clear();
        obj.children.clear();
        obj.contents.clear();
        if !anonymous {
            self.free_list.push(o.0);
        }
        Ok(())
    }

    // ---- naming / ownership / flags ----------------------------------------

    pub fn name_of(&self, o: Objid) -> Result<String> {
        Ok(self.get(o)?.name.clone())
    }

    pub fn set_name(&mut self, perms: &Perms, o: Objid, name: String) -> Result<()> {
        let owner = self.get(o)?.owner;
        perms.check_owner_or_wizard(owner)?;
        self.get_mut(o)?.name = name;
        Ok(())
    }

    pub fn owner_of(&self, o: Objid) -> Result<Objid> {
        Ok(self.get(o)?.owner)
    }

    pub fn flags_of(&self, o: Objid) -> Result<BitEnum<ObjFlag>> {
        Ok(self.get(o)?.flags)
    }

    pub fn set_flags(&mut self, perms: &Perms, o: Objid, flags: BitEnum<ObjFlag>) -> Result<()> {
        let owner = self.get(o)?.owner;
        perms.check_owner_or_wizard(owner)?;
        self.get_mut(o)?.flags = flags;
        Ok(())
    }

    // ---- parentage ----------------------------------------------------------

    pub fn parents_of(&self, o: Objid) -> Result<Vec<Objid>> {
        Ok(self.get(o)?.parents.clone())
    }

    pub fn children_of(&self, o: Objid) -> Result<Vec<Objid>> {
        Ok(self.get(o)?.children.clone())
    }

    /// `chparents(o, new_parents)` (spec.md §3 "Invariants": "Parent chains contain no cycles").
    pub fn chparents(&mut self, perms: &Perms, o: Objid, new_parents: Vec<Objid>) -> Result<()> {
        for p in &new_parents {
            if !self.valid(*p) {
                return Err(WorldStateError::ObjectNotFound(*p));
            }
            if *p == o || self.transitive_children(o).contains(p) {
                return Err(WorldStateError::ChparentRecursiveCycle(o, *p));
            }
        }
        let owner = self.get(o)?.owner;
        perms.check_owner_or_wizard(owner)?;

        let old_parents = self.get(o)?.parents.clone();
        for p in &old_parents {
            if let Ok(parent) = self.get_mut(*p) {
                parent.children.retain(|c| *c != o);
            }
        }
        for p in &new_parents {
            self.get_mut(*p)?.children.push(o);
        }
        self.get_mut(o)?.parents = new_parents;

        // Schema change propagates to descendants; anonymous descendants are invalidated
        // (spec.md §3 "Invariants").
        let mut new_values = HashMap::new();
        let parents = self.get(o)?.parents.clone();
        for p in &parents {
            self.inherit_propdefs(*p, &mut new_values)?;
        }
        let obj = self.get_mut(o)?;
        for pd in obj.propdefs.clone() {
            new_values.entry(pd.uuid).or_insert(PropValueSlot {
                value: moor_var::v_int(0),
                clear: true,
            });
        }
        for (uuid, slot) in obj.local_values.drain() {
            if let Some(existing) = new_values.get_mut(&uuid) {
                *existing = slot;
            }
        }
        obj.local_values = new_values;

        let descendants = self.transitive_children(o);
        let anon_descendants: Vec<Objid> = descendants
            .into_iter()
            .filter(|d| self.objects.get(d).is_some_and(|dobj| dobj.anonymous))
            .collect();
        for d in anon_descendants {
            if let Some(dobj) = self.objects.get_mut(&d) {
                dobj.recycled = true;
            }
        }
        Ok(())
    }

    fn check_no_parent_cycle_with_new(&self, _parents: &[Objid]) -> Result<()> {
        // New objects can't introduce a cycle (they have no children yet); kept as a seam for
        // uniformity with `chparents`.
        Ok(())
    }

    fn transitive_children(&self, o: Objid) -> Vec<Objid> {
        let mut out = Vec::new();
        let mut stack = vec![o];
        while let Some(cur) = stack.pop() {
            if let Some(obj) = self.objects.get(&cur) {
                for c in &obj.children {
                    if !out.contains(c) {
                        out.push(*c);
                        stack.push(*c);
                    }
                }
            }
        }
        out
    }

    #[must_use]
    pub fn ancestors(&self, o: Objid) -> Vec<Objid> {
        let mut out = Vec::new();
        let mut stack = self.objects.get(&o).map(|obj| obj.parents.clone()).unwrap_or_default();
        while let Some(p) = stack.pop() {
            if !out.contains(&p) {
                out.push(p);
                if let Some(obj) = self.objects.get(&p) {
                    stack.extend(obj.parents.clone());
                }
            }
        }
        out
    }

    fn is_ancestor(&self, maybe_ancestor: Objid, o: Objid) -> bool {
        self.ancestors(o).contains(&maybe_ancestor)
    }

    // ---- location / contents --------------------------------------------------

    pub fn location_of(&self, o: Objid) -> Result<Objid> {
        Ok(self.get(o)?.location)
    }

    pub fn contents_of(&self, o: Objid) -> Result<Vec<Objid>> {
        Ok(self.get(o)?.contents.clone())
    }

    /// `move(what, where)` (spec.md §3 "Invariants": "location chains contain no cycles").
    /// Mutates `location` and `contents` atomically (no observable in-between state since the
    /// store has a single owner running one task step at a time).
    pub fn set_location(&mut self, what: Objid, dest: Objid) -> Result<()> {
        if dest != Objid::NOTHING {
            if !self.valid(dest) {
                return Err(WorldStateError::ObjectNotFound(dest));
            }
            let mut cur = dest;
            loop {
                if cur == what {
                    return Err(WorldStateError::RecursiveMove(what, dest));
                }
                match self.objects.get(&cur) {
                    Some(o) if o.location != Objid::NOTHING => cur = o.location,
                    _ => break,
                }
            }
        }
        let old_loc = self.get(what)?.location;
        if old_loc != Objid::NOTHING {
            if let Ok(old) = self.get_mut(old_loc) {
                old.contents.retain(|c| *c != what);
            }
        }
        self.get_mut(what)?.location = dest;
        if dest != Objid::NOTHING {
            self.get_mut(dest)?.contents.push(what);
        }
        Ok(())
    }

    // ---- properties -----------------------------------------------------------

    /// `add_property(definer, name, owner, perms, value)` (spec.md §4.7). Propagates a clear
    /// slot to every current descendant.
    pub fn add_property(
        &mut self,
        perms: &Perms,
        definer: Objid,
        name: &str,
        owner: Objid,
        flags: BitEnum<PropFlag>,
        value: Var,
    ) -> Result<Uuid> {
        let obj_owner = self.get(definer)?.owner;
        perms.check_owner_or_wizard(obj_owner)?;
        if self.find_propdef(definer, name).is_some() {
            return Err(WorldStateError::DuplicatePropertyDefinition(
                Symbol::mk(name),
                definer,
            ));
        }
        let uuid = Uuid::new_v4();
        let pd = PropDef {
            uuid,
            name: Symbol::mk(name),
            definer,
            owner,
            perms: flags,
        };
        self.get_mut(definer)?.propdefs.push(pd);
        self.get_mut(definer)?
            .local_values
            .insert(uuid, PropValueSlot { value, clear: false });
        for d in self.transitive_children(definer) {
            if let Ok(child) = self.get_mut(d) {
                child.local_values.entry(uuid).or_insert(PropValueSlot {
                    value: moor_var::v_int(0),
                    clear: true,
                });
            }
        }
        Ok(uuid)
    }

    fn find_propdef(&self, o: Objid, name: &str) -> Option<(Objid, PropDef)> {
        let obj = self.objects.get(&o)?;
        if let Some(pd) = obj.propdefs.iter().find(|p| p.name.as_str() == name) {
            return Some((o, pd.clone()));
        }
        for p in &obj.parents {
            if let Some(found) = self.find_propdef(*p, name) {
                return Some(found);
            }
        }
        None
    }

    /// Every property name `o` responds to: its own plus every ancestor's (spec.md §3
    /// "Invariants").
    pub fn properties(&self, o: Objid) -> Result<Vec<PropDef>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        let mut stack = vec![o];
        while let Some(cur) = stack.pop() {
            let obj = self.get(cur)?;
            for pd in &obj.propdefs {
                if seen.insert(pd.uuid) {
                    out.push(pd.clone());
                }
            }
            stack.extend(obj.parents.clone());
        }
        Ok(out)
    }

    /// `resolve_property(o, name)` (spec.md §4.7): walk `o`'s local slot (falling back to the
    /// nearest ancestor's value when clear).
    pub fn resolve_property(&self, o: Objid, name: &str) -> Result<(PropDef, Var)> {
        let (definer, pd) = self
            .find_propdef(o, name)
            .ok_or_else(|| WorldStateError::PropertyNotFound(o, Symbol::mk(name)))?;
        let _ = definer;
        let value = self.read_slot(o, pd.uuid)?;
        Ok((pd, value))
    }

    fn read_slot(&self, o: Objid, uuid: Uuid) -> Result<Var> {
        let obj = self.get(o)?;
        if let Some(slot) = obj.local_values.get(&uuid) {
            if !slot.clear {
                return Ok(slot.value.clone());
            }
        }
        for p in obj.parents.clone() {
            if let Ok(v) = self.read_slot(p, uuid) {
                return Ok(v);
            }
        }
        Ok(moor_var::v_int(0))
    }

    pub fn set_property(&mut self, perms: &Perms, o: Objid, name: &str, value: Var) -> Result<()> {
        let (_definer, pd) = self
            .find_propdef(o, name)
            .ok_or_else(|| WorldStateError::PropertyNotFound(o, Symbol::mk(name)))?;
        if !pd.perms.contains(PropFlag::Write) {
            perms.check_owner_or_wizard(pd.owner)?;
        }
        let obj = self.get_mut(o)?;
        obj.local_values.insert(pd.uuid, PropValueSlot { value, clear: false });
        Ok(())
    }

    pub fn clear_property(&mut self, perms: &Perms, o: Objid, name: &str) -> Result<()> {
        let (definer, pd) = self
            .find_propdef(o, name)
            .ok_or_else(|| WorldStateError::PropertyNotFound(o, Symbol::mk(name)))?;
        perms.check_owner_or_wizard(pd.owner)?;
        if definer == o {
            // Clearing on the defining object itself is a no-op per ToastStunt semantics; there
            // is nothing above it to inherit from.
            return Ok(());
        }
        let obj = self.get_mut(o)?;
        if let Some(slot) = obj.local_values.get_mut(&pd.uuid) {
            slot.clear = true;
        }
        Ok(())
    }

    pub fn is_clear_property(&self, o: Objid, name: &str) -> Result<bool> {
        let (_definer, pd) = self
            .find_propdef(o, name)
            .ok_or_else(|| WorldStateError::PropertyNotFound(o, Symbol::mk(name)))?;
        let obj = self.get(o)?;
        Ok(obj.local_values.get(&pd.uuid).is_none_or(|s| s.clear))
    }

    pub fn set_property_info(
        &mut self,
        perms: &Perms,
        o: Objid,
        name: &str,
        new_owner: Option<Objid>,
        new_flags: Option<BitEnum<PropFlag>>,
        new_name: Option<String>,
    ) -> Result<()> {
        let (definer, pd) = self
            .find_propdef(o, name)
            .ok_or_else(|| WorldStateError::PropertyNotFound(o, Symbol::mk(name)))?;
        perms.check_owner_or_wizard(pd.owner)?;
        let definer_obj = self.get_mut(definer)?;
        if let Some(entry) = definer_obj.propdefs.iter_mut().find(|p| p.uuid == pd.uuid) {
            if let Some(owner) = new_owner {
                entry.owner = owner;
            }
            if let Some(flags) = new_flags {
                entry.perms = flags;
            }
            if let Some(name) = new_name {
                entry.name = Symbol::mk(&name);
            }
        }
        Ok(())
    }

    pub fn delete_property(&mut self, perms: &Perms, o: Objid, name: &str) -> Result<()> {
        let (definer, pd) = self
            .find_propdef(o, name)
            .ok_or_else(|| WorldStateError::PropertyNotFound(o, Symbol::mk(name)))?;
        perms.check_owner_or_wizard(pd.owner)?;
        let def_obj = self.get_mut(definer)?;
        def_obj.propdefs.retain(|p| p.uuid != pd.uuid);
        for d in self.transitive_children(definer) {
            if let Ok(child) = self.get_mut(d) {
                child.local_values.remove(&pd.uuid);
            }
        }
        if let Ok(definer_obj) = self.get_mut(definer) {
            definer_obj.local_values.remove(&pd.uuid);
        }
        Ok(())
    }

    // ---- verbs -----------------------------------------------------------------

    pub fn verbs(&self, o: Objid) -> Result<Vec<VerbDef>> {
        Ok(self.get(o)?.verbs.clone())
    }

    pub fn add_verb(
        &mut self,
        perms: &Perms,
        o: Objid,
        names: Vec<String>,
        owner: Objid,
        flags: BitEnum<VerbFlag>,
        args: VerbArgsSpec,
    ) -> Result<Uuid> {
        let obj_owner = self.get(o)?.owner;
        perms.check_owner_or_wizard(obj_owner)?;
        let uuid = Uuid::new_v4();
        self.get_mut(o)?.verbs.push(VerbDef {
            uuid,
            names,
            owner,
            flags,
            args,
            source: vec![],
        });
        Ok(uuid)
    }

    pub fn delete_verb(&mut self, perms: &Perms, o: Objid, uuid: Uuid) -> Result<()> {
        let owner = self.verb_owner(o, uuid)?;
        perms.check_owner_or_wizard(owner)?;
        self.get_mut(o)?.verbs.retain(|v| v.uuid != uuid);
        Ok(())
    }

    fn verb_owner(&self, o: Objid, uuid: Uuid) -> Result<Objid> {
        self.get(o)?
            .verbs
            .iter()
            .find(|v| v.uuid == uuid)
            .map(|v| v.owner)
            .ok_or(WorldStateError::VerbNotFound(o, Symbol::mk("?")))
    }

    pub fn find_verb_by_name(&self, o: Objid, uuid_or_name: &str) -> Result<VerbDef> {
        self.get(o)?
            .verbs
            .iter()
            .find(|v| v.matches_name(uuid_or_name))
            .cloned()
            .ok_or_else(|| WorldStateError::VerbNotFound(o, Symbol::mk(uuid_or_name)))
    }

    pub fn find_verb_by_uuid(&self, o: Objid, uuid: Uuid) -> Result<VerbDef> {
        self.get(o)?
            .verbs
            .iter()
            .find(|v| v.uuid == uuid)
            .cloned()
            .ok_or_else(|| WorldStateError::VerbNotFound(o, Symbol::mk("?")))
    }

    /// Verb lookup & dispatch (spec.md §4.4): walk `receiver` then ancestors depth-first, first
    /// alias match wins.
    pub fn resolve_verb(&self, receiver: Objid, name: &str) -> Result<(Objid, VerbDef)> {
        let obj = self.get(receiver)?;
        if let Some(v) = obj.verbs.iter().find(|v| v.matches_name(name)) {
            return Ok((receiver, v.clone()));
        }
        for p in obj.parents.clone() {
            if let Ok(found) = self.resolve_verb(p, name) {
                return Ok(found);
            }
        }
        Err(WorldStateError::VerbNotFound(receiver, Symbol::mk(name)))
    }

    /// `pass()` (GLOSSARY): resolve starting at the parent of `defining_object`, not `this`.
    pub fn resolve_verb_from(&self, defining_object: Objid, name: &str) -> Result<(Objid, VerbDef)> {
        let obj = self.get(defining_object)?;
        for p in obj.parents.clone() {
            if let Ok(found) = self.resolve_verb(p, name) {
                return Ok(found);
            }
        }
        Err(WorldStateError::VerbNotFound(defining_object, Symbol::mk(name)))
    }

    pub fn set_verb_info(
        &mut self,
        perms: &Perms,
        o: Objid,
        uuid: Uuid,
        new_owner: Option<Objid>,
        new_flags: Option<BitEnum<VerbFlag>>,
        new_names: Option<Vec<String>>,
    ) -> Result<()> {
        let owner = self.verb_owner(o, uuid)?;
        perms.check_owner_or_wizard(owner)?;
        let obj = self.get_mut(o)?;
        if let Some(v) = obj.verbs.iter_mut().find(|v| v.uuid == uuid) {
            if let Some(o) = new_owner {
                v.owner = o;
            }
            if let Some(f) = new_flags {
                v.flags = f;
            }
            if let Some(n) = new_names {
                v.names = n;
            }
        }
        Ok(())
    }

    pub fn set_verb_args(&mut self, perms: &Perms, o: Objid, uuid: Uuid, args: VerbArgsSpec) -> Result<()> {
        let owner = self.verb_owner(o, uuid)?;
        perms.check_owner_or_wizard(owner)?;
        let obj = self.get_mut(o)?;
        if let Some(v) = obj.verbs.iter_mut().find(|v| v.uuid == uuid) {
            v.args = args;
        }
        Ok(())
    }

    pub fn set_verb_code(&mut self, perms: &Perms, o: Objid, uuid: Uuid, source: Vec<String>) -> Result<()> {
        let owner = self.verb_owner(o, uuid)?;
        perms.check_owner_or_wizard(owner)?;
        let obj = self.get_mut(o)?;
        if let Some(v) = obj.verbs.iter_mut().find(|v| v.uuid == uuid) {
            v.source = source;
        }
        Ok(())
    }

    // ---- sizing -----------------------------------------------------------------

    pub fn object_bytes(&self, o: Objid) -> Result<usize> {
        let obj = self.get(o)?;
        let mut n = obj.name.len() + 64;
        for v in &obj.verbs {
            n += v.source.iter().map(String::len).sum::<usize>() + 32;
        }
        n += obj.local_values.len() * 32;
        Ok(n)
    }

    /// Checks whether `maybe_parent` is anywhere in `o`'s ancestor chain -- used by `is_a`-style
    /// builtins and by verb-argspec `this` checks against a prototype.
    #[must_use]
    pub fn isa(&self, o: Objid, maybe_parent: Objid) -> bool {
        o == maybe_parent || self.is_ancestor(maybe_parent, o)
    }
}
