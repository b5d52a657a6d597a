// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! `create recycle parent parents children chparent chparents move max_object players
//! connected_players object_bytes set_player_flag` (spec.md §4.7 "Objects"). `valid`/`is_player`
//! are registered by `types`, not here -- they're listed in the same spec category but already
//! live alongside the rest of the type-predicate builtins.

use std::collections::HashMap;

use moor_common::flags::ObjFlag;
use moor_common::model::ObjAttrs;
use moor_var::{v_bool, v_int, v_list, v_none, v_obj, Error, Objid, Var, Variant};

use crate::vm::PendingBuiltin;

use super::{arg, want_obj, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("create", create);
    fns.insert("recycle", recycle);
    fns.insert("parent", parent);
    fns.insert("parents", parents);
    fns.insert("children", children);
    fns.insert("chparent", chparent);
    fns.insert("chparents", chparents);
    fns.insert("move", move_);
    fns.insert("max_object", max_object);
    fns.insert("players", players);
    fns.insert("connected_players", connected_players);
    fns.insert("object_bytes", object_bytes);
    fns.insert("set_player_flag", set_player_flag);
}

/// `create(parent, [owner])`: `parent` may be a single OBJ or a list of OBJs (multiple
/// inheritance). `create(parent, 1)` requests an anonymous object (spec.md §4.7); any other
/// second argument is an explicit owner, which requires wizard permission unless it names the
/// caller.
fn create(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    if args.is_empty() || args.len() > 2 {
        return BuiltinOutcome::Raise(Error::E_ARGS);
    }
    let parents = match parent_list(&args, 0) {
        Ok(p) => p,
        Err(e) => return BuiltinOutcome::Raise(e),
    };
    for p in &parents {
        if !ctx.world.valid(*p) {
            return BuiltinOutcome::Raise(Error::E_INVARG);
        }
    }
    let caller = ctx.perms.who;
    let (owner, anonymous) = match arg(&args, 1) {
        None => (caller, false),
        Some(v) => match v.variant() {
            Variant::Int(1) => (caller, true),
            Variant::Obj(o) => {
                if *o != caller && !ctx.perms.wizard {
                    return BuiltinOutcome::Raise(Error::E_PERM);
                }
                (*o, false)
            }
            _ => return BuiltinOutcome::Raise(Error::E_TYPE),
        },
    };
    for p in &parents {
        let Ok(pflags) = ctx.world.flags_of(*p) else { return BuiltinOutcome::Raise(Error::E_INVARG) };
        let Ok(powner) = ctx.world.owner_of(*p) else { return BuiltinOutcome::Raise(Error::E_INVARG) };
        if !ctx.perms.wizard && powner != caller && !pflags.contains(ObjFlag::Fertile) {
            return BuiltinOutcome::Raise(Error::E_PERM);
        }
    }
    match ctx.world.create_object(owner, ObjAttrs::new().parents(parents), anonymous) {
        Ok(id) => v_obj(id).into(),
        Err(e) => Error::from(e).into(),
    }
}

/// Fires `:recycle` on the victim, if defined, before actually destroying it (spec.md §3
/// "recycle(obj) ... triggers a :recycle verb if defined"). The hook runs as an ordinary verb
/// call pushed by the stepper; the actual `WorldState::recycle` happens in `resume_pending_builtin`
/// once that frame returns (or immediately, if there was no such verb to call).
fn recycle(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    BuiltinOutcome::CallVerb {
        this: v_obj(o),
        verb_name: "recycle".to_string(),
        args: vec![],
        then: PendingBuiltin::Recycle(o, ctx.perms),
    }
}

fn parent(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.world.parents_of(o) {
        Ok(p) => v_obj(p.first().copied().unwrap_or(Objid::NOTHING)).into(),
        Err(e) => Error::from(e).into(),
    }
}

fn parents(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.world.parents_of(o) {
        Ok(p) => v_list(p.into_iter().map(v_obj).collect()).into(),
        Err(e) => Error::from(e).into(),
    }
}

fn children(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.world.children_of(o) {
        Ok(c) => v_list(c.into_iter().map(v_obj).collect()).into(),
        Err(e) => Error::from(e).into(),
    }
}

fn chparent(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Ok(new_parent) = want_obj(&args, 1) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let parents = if new_parent == Objid::NOTHING { vec![] } else { vec![new_parent] };
    match ctx.world.chparents(&ctx.perms, o, parents) {
        Ok(()) => v_none().into(),
        Err(e) => Error::from(e).into(),
    }
}

fn chparents(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let new_parents = match parent_list(&args, 1) {
        Ok(p) => p,
        Err(e) => return BuiltinOutcome::Raise(e),
    };
    match ctx.world.chparents(&ctx.perms, o, new_parents) {
        Ok(()) => v_none().into(),
        Err(e) => Error::from(e).into(),
    }
}

/// `move(what, where)`: requires ownership of `what` (or wizard). Cycle detection lives in
/// `WorldState::set_location` (spec.md §3 "Invariants": "`location` chains contain no cycles").
fn move_(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(what) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Ok(dest) = want_obj(&args, 1) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    if dest != Objid::NOTHING && !ctx.world.valid(dest) {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    let Ok(owner) = ctx.world.owner_of(what) else { return BuiltinOutcome::Raise(Error::E_INVARG) };
    if ctx.perms.check_owner_or_wizard(owner).is_err() {
        return BuiltinOutcome::Raise(Error::E_PERM);
    }
    match ctx.world.set_location(what, dest) {
        Ok(()) => v_none().into(),
        Err(e) => Error::from(e).into(),
    }
}

fn max_object(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    if !args.is_empty() {
        return BuiltinOutcome::Raise(Error::E_ARGS);
    }
    v_obj(ctx.world.max_object()).into()
}

fn players(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    if !args.is_empty() {
        return BuiltinOutcome::Raise(Error::E_ARGS);
    }
    v_list(ctx.world.players().into_iter().map(v_obj).collect()).into()
}

fn connected_players(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    if !args.is_empty() {
        return BuiltinOutcome::Raise(Error::E_ARGS);
    }
    v_list(ctx.directory.connected_players().into_iter().map(v_obj).collect()).into()
}

fn object_bytes(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.world.object_bytes(o) {
        Ok(n) => v_int(n as i64).into(),
        Err(e) => Error::from(e).into(),
    }
}

/// `set_player_flag(obj, value)`: wizard-only toggle of `ObjFlag::User` (spec.md §4.7). Unlike
/// `set_flags`/`chmod`-style generic flag setters, this one exists specifically so a `:create`
/// verb can promote a freshly-made object to a player without handing it the whole flag word.
fn set_player_flag(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(value) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    if ctx.perms.check_is_wizard().is_err() {
        return BuiltinOutcome::Raise(Error::E_PERM);
    }
    let Ok(mut flags) = ctx.world.flags_of(o) else { return BuiltinOutcome::Raise(Error::E_INVARG) };
    if value.is_true() {
        flags.set(ObjFlag::User);
    } else {
        flags.clear(ObjFlag::User);
    }
    match ctx.world.set_flags(&ctx.perms, o, flags) {
        Ok(()) => v_bool(true).into(),
        Err(e) => Error::from(e).into(),
    }
}

fn parent_list(args: &[Var], i: usize) -> Result<Vec<Objid>, Error> {
    let Some(v) = arg(args, i) else { return Ok(vec![]) };
    if let Some(o) = v.as_obj() {
        return Ok(if o == Objid::NOTHING { vec![] } else { vec![o] });
    }
    if let Some(list) = v.as_list() {
        let mut out = Vec::with_capacity(list.len());
        for item in list {
            out.push(item.as_obj().ok_or(Error::E_TYPE)?);
        }
        return Ok(out);
    }
    Err(Error::E_TYPE)
}
