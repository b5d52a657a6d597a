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

//! `properties property_info set_property_info add_property delete_property is_clear_property
//! clear_property` (spec.md §4.7 "Properties"). Permission strings are restricted to
//! `"", "r", "w", "rw", "rc", "wc", "rwc"`; anything else raises `E_INVARG`.

use std::collections::HashMap;

use moor_common::flags::{parse_prop_flags, unparse_flags, PropFlag};
use moor_var::{v_list, v_none, v_str, v_string, Error, Var};

use super::{arg, want_obj, want_str, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("properties", properties);
    fns.insert("property_info", property_info);
    fns.insert("set_property_info", set_property_info);
    fns.insert("add_property", add_property);
    fns.insert("delete_property", delete_property);
    fns.insert("is_clear_property", is_clear_property);
    fns.insert("clear_property", clear_property);
}

fn properties(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.world.properties(o) {
        Ok(defs) => v_list(defs.into_iter().map(|d| v_str(d.name.as_str())).collect()).into(),
        Err(e) => Error::from(e).into(),
    }
}

/// `property_info(obj, name)` => `{owner, perms-string}`, matching `set_property_info`'s input
/// shape.
fn property_info(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Ok(name) = want_str(&args, 1) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.world.resolve_property(o, name) {
        Ok((def, _)) => v_list(vec![
            moor_var::v_obj(def.owner),
            v_string(unparse_flags(
                &def.perms,
                &[(PropFlag::Read, 'r'), (PropFlag::Write, 'w'), (PropFlag::Chown, 'c')],
            )),
        ])
        .into(),
        Err(e) => Error::from(e).into(),
    }
}

/// `set_property_info(obj, name, {owner, perms-string [, new-name]})`.
fn set_property_info(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Ok(name) = want_str(&args, 1) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(info) = arg(&args, 2).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    if info.len() < 2 || info.len() > 3 {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    let Some(new_owner) = info[0].as_obj() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(perms_str) = info[1].as_str() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(new_flags) = parse_prop_flags(perms_str) else {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    };
    let new_name = match info.get(2) {
        Some(v) => match v.as_str() {
            Some(s) => Some(s.to_string()),
            None => return BuiltinOutcome::Raise(Error::E_TYPE),
        },
        None => None,
    };
    match ctx.world.set_property_info(&ctx.perms, o, name, Some(new_owner), Some(new_flags), new_name) {
        Ok(()) => v_none().into(),
        Err(e) => Error::from(e).into(),
    }
}

/// `add_property(obj, name, value, {owner, perms-string})`.
fn add_property(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Ok(name) = want_str(&args, 1) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(value) = arg(&args, 2) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    let Some(info) = arg(&args, 3).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    if info.len() != 2 {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    let Some(owner) = info[0].as_obj() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(perms_str) = info[1].as_str() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(flags) = parse_prop_flags(perms_str) else {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    };
    match ctx.world.add_property(&ctx.perms, o, name, owner, flags, value.clone()) {
        Ok(_) => v_none().into(),
        Err(e) => Error::from(e).into(),
    }
}

fn delete_property(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Ok(name) = want_str(&args, 1) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.world.delete_property(&ctx.perms, o, name) {
        Ok(()) => v_none().into(),
        Err(e) => Error::from(e).into(),
    }
}

fn is_clear_property(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Ok(name) = want_str(&args, 1) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.world.is_clear_property(o, name) {
        Ok(b) => moor_var::v_bool(b).into(),
        Err(e) => Error::from(e).into(),
    }
}

fn clear_property(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Ok(name) = want_str(&args, 1) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.world.clear_property(&ctx.perms, o, name) {
        Ok(()) => v_none().into(),
        Err(e) => Error::from(e).into(),
    }
}
