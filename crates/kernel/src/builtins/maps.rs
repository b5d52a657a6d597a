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

//! `mapkeys mapvalues maphaskey mapdelete` (spec.md §4.7 "Maps"). `mapdelete` on a missing key
//! raises `E_RANGE`, a verified reference-server quirk (not `E_INVARG`).

use std::collections::HashMap;

use moor_var::{v_bool, v_list, v_map, Error, Var};

use super::{arg, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("mapkeys", mapkeys);
    fns.insert("mapvalues", mapvalues);
    fns.insert("maphaskey", maphaskey);
    fns.insert("mapdelete", mapdelete);
}

fn mapkeys(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(pairs) = arg(&args, 0).and_then(Var::as_map) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    v_list(pairs.iter().map(|(k, _)| k.clone()).collect()).into()
}

fn mapvalues(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(pairs) = arg(&args, 0).and_then(Var::as_map) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    v_list(pairs.iter().map(|(_, v)| v.clone()).collect()).into()
}

fn maphaskey(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(pairs) = arg(&args, 0).and_then(Var::as_map) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let Some(key) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    v_bool(pairs.iter().any(|(k, _)| k == key)).into()
}

fn mapdelete(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(pairs) = arg(&args, 0).and_then(Var::as_map) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let Some(key) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    match pairs.iter().position(|(k, _)| k == key) {
        Some(pos) => {
            let mut out = pairs.to_vec();
            out.remove(pos);
            v_map(out).into()
        }
        None => BuiltinOutcome::Raise(Error::E_RANGE),
    }
}
