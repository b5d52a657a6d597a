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

//! `listappend listinsert listdelete listset setadd setremove is_member indexof reverse sort
//! slice` (spec.md §4.7 "Lists"). Every builder here re-checks `max_list_value_bytes` against
//! the *result*, the same point the `MakeList`/`RangeSet` opcodes check it (spec.md §4.3
//! "size-limit checks... raise E_QUOTA on overflow").

use std::collections::HashMap;

use moor_var::{v_bool, v_int, v_list, Error, Var};

use crate::config::approx_value_bytes;

use super::{arg, want_int, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("listappend", listappend);
    fns.insert("listinsert", listinsert);
    fns.insert("listdelete", listdelete);
    fns.insert("listset", listset);
    fns.insert("setadd", setadd);
    fns.insert("setremove", setremove);
    fns.insert("is_member", is_member);
    fns.insert("indexof", indexof);
    fns.insert("reverse", reverse);
    fns.insert("sort", sort);
    fns.insert("slice", slice);
}

fn quota_checked(ctx: &BuiltinContext, items: Vec<Var>) -> BuiltinOutcome {
    let v = v_list(items);
    if approx_value_bytes(&v) > ctx.options.max_list_value_bytes {
        return BuiltinOutcome::Raise(Error::E_QUOTA);
    }
    v.into()
}

fn listappend(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(list) = arg(&args, 0).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let Some(value) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    let mut out = list.to_vec();
    match arg(&args, 2) {
        None => out.push(value.clone()),
        Some(pos) => {
            let Some(idx) = pos.as_int() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
            if idx < 0 || idx as usize > out.len() {
                return BuiltinOutcome::Raise(Error::E_RANGE);
            }
            out.insert(idx as usize, value.clone());
        }
    }
    quota_checked(ctx, out)
}

/// `listinsert(list, value, index)`: 1-based; `listinsert(l, v, 1)` prepends.
fn listinsert(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(list) = arg(&args, 0).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let Some(value) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    let mut out = list.to_vec();
    let idx = match arg(&args, 2) {
        Some(v) => match v.as_int() {
            Some(n) => n,
            None => return BuiltinOutcome::Raise(Error::E_TYPE),
        },
        None => 1,
    };
    if idx < 1 || idx as usize > out.len() + 1 {
        return BuiltinOutcome::Raise(Error::E_RANGE);
    }
    out.insert((idx - 1) as usize, value.clone());
    quota_checked(ctx, out)
}

fn listdelete(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(list) = arg(&args, 0).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let Ok(idx) = want_int(&args, 1) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    if idx < 1 || idx as usize > list.len() {
        return BuiltinOutcome::Raise(Error::E_RANGE);
    }
    let mut out = list.to_vec();
    out.remove((idx - 1) as usize);
    quota_checked(ctx, out)
}

fn listset(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(list) = arg(&args, 0).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let Some(value) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    let Ok(idx) = want_int(&args, 2) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    if idx < 1 || idx as usize > list.len() {
        return BuiltinOutcome::Raise(Error::E_RANGE);
    }
    let mut out = list.to_vec();
    out[(idx - 1) as usize] = value.clone();
    quota_checked(ctx, out)
}

/// `setadd(list, value)`: `listappend` unless `value` is already `is_member`.
fn setadd(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(list) = arg(&args, 0).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let Some(value) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    if list.iter().any(|v| v == value) {
        return v_list(list.to_vec()).into();
    }
    let mut out = list.to_vec();
    out.push(value.clone());
    quota_checked(ctx, out)
}

fn setremove(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(list) = arg(&args, 0).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let Some(value) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    match list.iter().position(|v| v == value) {
        Some(pos) => {
            let mut out = list.to_vec();
            out.remove(pos);
            v_list(out).into()
        }
        None => v_list(list.to_vec()).into(),
    }
}

fn is_member(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(value) = arg(&args, 0) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    let Some(list) = arg(&args, 1).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    match list.iter().position(|v| v == value) {
        Some(pos) => v_int(pos as i64 + 1).into(),
        None => v_int(0).into(),
    }
}

fn indexof(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(list) = arg(&args, 0).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let Some(value) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    match list.iter().position(|v| v == value) {
        Some(pos) => v_int(pos as i64 + 1).into(),
        None => v_int(0).into(),
    }
}

fn reverse(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(list) = arg(&args, 0).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let mut out = list.to_vec();
    out.reverse();
    v_list(out).into()
}

/// `sort(list [, keys] [, natural-order] [, reverse])`: stable sort by `cmp_moo`, optionally
/// driven by a parallel `keys` list rather than the elements themselves.
fn sort(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(list) = arg(&args, 0).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let keys: Vec<Var> = match arg(&args, 1) {
        Some(v) => match v.as_list() {
            Some(k) if k.len() == list.len() => k.to_vec(),
            Some(_) => return BuiltinOutcome::Raise(Error::E_INVARG),
            None => return BuiltinOutcome::Raise(Error::E_TYPE),
        },
        None => list.to_vec(),
    };
    let reversed = match arg(&args, 3) {
        Some(v) => v.is_true(),
        None => false,
    };
    let mut indices: Vec<usize> = (0..list.len()).collect();
    indices.sort_by(|&a, &b| {
        let ord = keys[a].cmp_moo(&keys[b]).unwrap_or(std::cmp::Ordering::Equal);
        if reversed {
            ord.reverse()
        } else {
            ord
        }
    });
    v_list(indices.into_iter().map(|i| list[i].clone()).collect()).into()
}

/// `slice(list, index [, default])`: pulls one column out of a list of lists/maps (`index` may be
/// an int position or a map key), the way `$` properties get picked out of a batch query result.
fn slice(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(list) = arg(&args, 0).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let Some(index) = arg(&args, 1) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    let default = arg(&args, 2).cloned();
    let mut out = Vec::with_capacity(list.len());
    for row in list {
        let picked = match (row.as_list(), index.as_int()) {
            (Some(cols), Some(i)) if i >= 1 && (i as usize) <= cols.len() => Some(cols[(i - 1) as usize].clone()),
            _ => match (row.as_map(), index) {
                (Some(pairs), key) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()),
                _ => None,
            },
        };
        match picked.or_else(|| default.clone()) {
            Some(v) => out.push(v),
            None => return BuiltinOutcome::Raise(Error::E_RANGE),
        }
    }
    v_list(out).into()
}
