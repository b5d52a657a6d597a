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

//! `typeof tostr toint tofloat toobj toliteral value_bytes valid is_player` (spec.md §4.7
//! "Types").

use std::collections::HashMap;
use std::fmt::Write as _;

use moor_common::flags::ObjFlag;
use moor_var::{v_bool, v_float, v_int, v_obj, v_str, Objid, Var, Variant};

use crate::config::approx_value_bytes;

use super::{arg, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("typeof", typeof_);
    fns.insert("tostr", tostr);
    fns.insert("toint", toint);
    fns.insert("tofloat", tofloat);
    fns.insert("toobj", toobj);
    fns.insert("toliteral", toliteral);
    fns.insert("value_bytes", value_bytes);
    fns.insert("valid", valid);
    fns.insert("is_player", is_player);
}

/// Type-code ordinals, consistent with the reference server's extension numbering (INT/OBJ/STR/
/// ERR/LIST first, FLOAT/MAP/WAIF/BOOL appended as later extensions).
#[must_use]
fn type_code(v: &Var) -> i64 {
    match v.variant() {
        Variant::Int(_) => 0,
        Variant::Obj(_) => 1,
        Variant::Str(_) => 2,
        Variant::Err(_) => 3,
        Variant::List(_) => 4,
        Variant::Float(_) => 9,
        Variant::Map(_) => 10,
        Variant::Waif(_) => 11,
        Variant::Bool(_) => 12,
    }
}

fn typeof_(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(v) = arg(&args, 0) else { return BuiltinOutcome::Raise(moor_var::Error::E_ARGS) };
    v_int(type_code(v)).into()
}

fn tostr(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let mut out = String::new();
    for a in &args {
        let _ = write!(out, "{a}");
    }
    v_str(&out).into()
}

#[must_use]
fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let mut chars = s.chars().peekable();
    let mut sign = 1i64;
    let mut digits = String::new();
    if let Some(&c) = chars.peek() {
        if c == '-' || c == '+' {
            if c == '-' {
                sign = -1;
            }
            chars.next();
        }
    }
    for c in chars {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            break;
        }
    }
    if digits.is_empty() {
        return 0;
    }
    digits.parse::<i64>().map(|n| n * sign).unwrap_or(0)
}

fn toint(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(v) = arg(&args, 0) else { return BuiltinOutcome::Raise(moor_var::Error::E_ARGS) };
    let n = match v.variant() {
        Variant::Int(i) => *i,
        Variant::Float(f) => *f as i64,
        Variant::Str(s) => parse_leading_int(s),
        Variant::Obj(o) => o.0,
        Variant::Bool(b) => i64::from(*b),
        Variant::Err(e) => e.code(),
        _ => return BuiltinOutcome::Raise(moor_var::Error::E_TYPE),
    };
    v_int(n).into()
}

fn tofloat(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(v) = arg(&args, 0) else { return BuiltinOutcome::Raise(moor_var::Error::E_ARGS) };
    let f = match v.variant() {
        Variant::Int(i) => *i as f64,
        Variant::Float(f) => *f,
        Variant::Str(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Variant::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => return BuiltinOutcome::Raise(moor_var::Error::E_TYPE),
    };
    v_float(f).into()
}

fn toobj(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(v) = arg(&args, 0) else { return BuiltinOutcome::Raise(moor_var::Error::E_ARGS) };
    let n = match v.variant() {
        Variant::Obj(o) => o.0,
        Variant::Int(i) => *i,
        Variant::Float(f) => *f as i64,
        Variant::Str(s) => {
            let s = s.trim().strip_prefix('#').unwrap_or(s.trim());
            parse_leading_int(s)
        }
        _ => return BuiltinOutcome::Raise(moor_var::Error::E_TYPE),
    };
    v_obj(Objid(n)).into()
}

/// A round-trippable literal (spec.md §8 invariant 6: `eval(toliteral(v)) == v`).
#[must_use]
pub fn to_literal(v: &Var) -> String {
    match v.variant() {
        Variant::Int(i) => i.to_string(),
        Variant::Float(f) => {
            if f.fract() == 0.0 && f.is_finite() {
                format!("{f:.1}")
            } else {
                format!("{f}")
            }
        }
        Variant::Str(s) => quote_str(s),
        Variant::Obj(o) => format!("#{}", o.0),
        Variant::Err(e) => e.to_string(),
        Variant::Bool(b) => b.to_string(),
        Variant::List(items) => {
            let parts: Vec<String> = items.iter().map(to_literal).collect();
            format!("{{{}}}", parts.join(", "))
        }
        Variant::Map(pairs) => {
            let parts: Vec<String> = pairs.iter().map(|(k, val)| format!("{} -> {}", to_literal(k), to_literal(val))).collect();
            format!("[{}]", parts.join(", "))
        }
        Variant::Waif(_) => "waif()".to_string(),
    }
}

fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn toliteral(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(v) = arg(&args, 0) else { return BuiltinOutcome::Raise(moor_var::Error::E_ARGS) };
    v_str(&to_literal(v)).into()
}

fn value_bytes(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(v) = arg(&args, 0) else { return BuiltinOutcome::Raise(moor_var::Error::E_ARGS) };
    v_int(approx_value_bytes(v) as i64).into()
}

fn valid(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = super::want_obj(&args, 0) else {
        return BuiltinOutcome::Raise(moor_var::Error::E_TYPE);
    };
    v_bool(ctx.world.valid(o)).into()
}

fn is_player(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(o) = super::want_obj(&args, 0) else {
        return BuiltinOutcome::Raise(moor_var::Error::E_TYPE);
    };
    if !ctx.world.valid(o) {
        return BuiltinOutcome::Raise(moor_var::Error::E_INVARG);
    }
    let Ok(flags) = ctx.world.flags_of(o) else {
        return v_bool(false).into();
    };
    v_bool(flags.contains(ObjFlag::User)).into()
}
