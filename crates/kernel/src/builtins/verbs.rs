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

//! `verbs verb_info set_verb_info verb_args set_verb_args verb_code set_verb_code add_verb
//! delete_verb disassemble` (spec.md §4.7 "Verbs").

use std::collections::HashMap;

use moor_common::flags::{parse_verb_flags, unparse_flags, VerbFlag};
use moor_common::matching::{ArgSpec, PrepSpec, Preposition, VerbArgsSpec};
use moor_var::{v_list, v_none, v_obj, v_str, v_string, Error, Var};

use super::{arg, want_obj, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("verbs", verbs);
    fns.insert("verb_info", verb_info);
    fns.insert("set_verb_info", set_verb_info);
    fns.insert("verb_args", verb_args);
    fns.insert("set_verb_args", set_verb_args);
    fns.insert("verb_code", verb_code);
    fns.insert("set_verb_code", set_verb_code);
    fns.insert("add_verb", add_verb);
    fns.insert("delete_verb", delete_verb);
    fns.insert("disassemble", disassemble);
}

fn verbs(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.world.verbs(o) {
        Ok(defs) => v_list(defs.into_iter().map(|d| v_string(d.names.join(" "))).collect()).into(),
        Err(e) => Error::from(e).into(),
    }
}

fn find_verb(ctx: &BuiltinContext, o: moor_var::Objid, spec: &Var) -> Result<moor_db::VerbDef, Error> {
    if let Some(s) = spec.as_str() {
        return ctx.world.find_verb_by_name(o, s).map_err(Error::from);
    }
    Err(Error::E_TYPE)
}

fn verb_info(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(spec) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    match find_verb(ctx, o, spec) {
        Ok(def) => v_list(vec![
            v_obj(def.owner),
            v_string(unparse_flags(
                &def.flags,
                &[(VerbFlag::Read, 'r'), (VerbFlag::Write, 'w'), (VerbFlag::Exec, 'x'), (VerbFlag::Debug, 'd')],
            )),
            v_string(def.names.join(" ")),
        ])
        .into(),
        Err(e) => e.into(),
    }
}

/// `set_verb_info(obj, verb-spec, {owner, perms-string, names})`.
fn set_verb_info(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(spec) = arg(&args, 1).cloned() else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    let Some(info) = arg(&args, 2).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    if info.len() != 3 {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    let Some(new_owner) = info[0].as_obj() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(perms_str) = info[1].as_str() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(new_flags) = parse_verb_flags(perms_str) else {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    };
    let Some(names_str) = info[2].as_str() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let new_names: Vec<String> = names_str.split_whitespace().map(str::to_string).collect();
    let def = match find_verb(ctx, o, &spec) {
        Ok(d) => d,
        Err(e) => return e.into(),
    };
    match ctx.world.set_verb_info(
        &ctx.perms,
        o,
        def.uuid,
        Some(new_owner),
        Some(new_flags),
        Some(new_names),
    ) {
        Ok(()) => v_none().into(),
        Err(e) => Error::from(e).into(),
    }
}

fn verb_args(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(spec) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    match find_verb(ctx, o, spec) {
        Ok(def) => v_list(vec![
            v_str(def.args.dobj.to_str()),
            v_string(prep_spec_to_str(def.args.prep)),
            v_str(def.args.iobj.to_str()),
        ])
        .into(),
        Err(e) => e.into(),
    }
}

/// `set_verb_args(obj, verb-spec, {dobj, prep, iobj})`.
fn set_verb_args(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(spec) = arg(&args, 1).cloned() else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    let Some(triple) = arg(&args, 2).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    if triple.len() != 3 {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    let (Some(dobjstr), Some(prepstr), Some(iobjstr)) =
        (triple[0].as_str(), triple[1].as_str(), triple[2].as_str())
    else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let (Some(dobj), Some(iobj)) = (ArgSpec::parse(dobjstr), ArgSpec::parse(iobjstr)) else {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    };
    let Some(prep) = parse_prep_spec(prepstr) else {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    };
    let def = match find_verb(ctx, o, &spec) {
        Ok(d) => d,
        Err(e) => return e.into(),
    };
    match ctx.world.set_verb_args(&ctx.perms, o, def.uuid, VerbArgsSpec { dobj, prep, iobj }) {
        Ok(()) => v_none().into(),
        Err(e) => Error::from(e).into(),
    }
}

fn verb_code(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(spec) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    match find_verb(ctx, o, spec) {
        Ok(def) => v_list(def.source.into_iter().map(v_string).collect()).into(),
        Err(e) => e.into(),
    }
}

/// `set_verb_code(obj, verb-spec, lines)`: on success returns the empty list (no compile errors),
/// matching the reference server's convention of returning a list of error strings.
fn set_verb_code(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(spec) = arg(&args, 1).cloned() else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    let Some(lines) = arg(&args, 2).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let mut source = Vec::with_capacity(lines.len());
    for line in lines {
        match line.as_str() {
            Some(s) => source.push(s.to_string()),
            None => return BuiltinOutcome::Raise(Error::E_TYPE),
        }
    }
    let def = match find_verb(ctx, o, &spec) {
        Ok(d) => d,
        Err(e) => return e.into(),
    };
    match moor_compiler::compile(&source.join("\n")) {
        Ok(_) => {}
        Err(e) => return v_list(vec![v_string(e.to_string())]).into(),
    }
    match ctx.world.set_verb_code(&ctx.perms, o, def.uuid, source) {
        Ok(()) => {
            ctx.program_cache.invalidate(def.uuid);
            v_list(vec![]).into()
        }
        Err(e) => Error::from(e).into(),
    }
}

/// `add_verb(obj, {owner, perms-string, names} [, args])`.
fn add_verb(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(info) = arg(&args, 1).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    if info.len() != 3 {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    let Some(owner) = info[0].as_obj() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(perms_str) = info[1].as_str() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(flags) = parse_verb_flags(perms_str) else {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    };
    let Some(names_str) = info[2].as_str() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let names: Vec<String> = names_str.split_whitespace().map(str::to_string).collect();
    let verb_args = match arg(&args, 2) {
        None => VerbArgsSpec::this_none_this(),
        Some(v) => {
            let Some(triple) = v.as_list() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
            if triple.len() != 3 {
                return BuiltinOutcome::Raise(Error::E_INVARG);
            }
            let (Some(d), Some(p), Some(i)) = (triple[0].as_str(), triple[1].as_str(), triple[2].as_str())
            else {
                return BuiltinOutcome::Raise(Error::E_TYPE);
            };
            let (Some(dobj), Some(iobj)) = (ArgSpec::parse(d), ArgSpec::parse(i)) else {
                return BuiltinOutcome::Raise(Error::E_INVARG);
            };
            let Some(prep) = parse_prep_spec(p) else {
                return BuiltinOutcome::Raise(Error::E_INVARG);
            };
            VerbArgsSpec { dobj, prep, iobj }
        }
    };
    match ctx.world.add_verb(&ctx.perms, o, names, owner, flags, verb_args) {
        Ok(uuid) => v_string(uuid.to_string()).into(),
        Err(e) => Error::from(e).into(),
    }
}

fn delete_verb(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(spec) = arg(&args, 1).cloned() else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    let def = match find_verb(ctx, o, &spec) {
        Ok(d) => d,
        Err(e) => return e.into(),
    };
    match ctx.world.delete_verb(&ctx.perms, o, def.uuid) {
        Ok(()) => v_none().into(),
        Err(e) => Error::from(e).into(),
    }
}

/// `disassemble(obj, verb-spec)`: compiles (or fetches the cached compile of) the verb and
/// returns its opcode listing, one string per line.
fn disassemble(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(spec) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    let def = match find_verb(ctx, o, spec) {
        Ok(d) => d,
        Err(e) => return e.into(),
    };
    match ctx.program_cache.get_or_compile(def.uuid, &def.source) {
        Ok(program) => v_list(moor_compiler::disassemble(&program).into_iter().map(v_string).collect()).into(),
        Err(e) => v_list(vec![v_string(e.to_string())]).into(),
    }
}

fn parse_prep_spec(s: &str) -> Option<PrepSpec> {
    match s {
        "any" => Some(PrepSpec::Any),
        "none" => Some(PrepSpec::None),
        _ => {
            let words: Vec<&str> = s.split_whitespace().collect();
            match Preposition::find_in(&words) {
                Some((0, end, p)) if end == words.len() => Some(PrepSpec::Specific(p)),
                _ => None,
            }
        }
    }
}

fn prep_spec_to_str(p: PrepSpec) -> String {
    match p {
        PrepSpec::None => "none".to_string(),
        PrepSpec::Any => "any".to_string(),
        PrepSpec::Specific(prep) => prep.canonical().to_string(),
    }
}
