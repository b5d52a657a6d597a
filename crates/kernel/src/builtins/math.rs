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

//! `abs min max random frandom sqrt ceil floor trunc sin cos tan asin acos atan exp log log10
//! log2 sinh cosh tanh cbrt` (spec.md §4.7 "Math"). Bitwise operators are language syntax (`&.`
//! `|.` `^.` `~` `<<` `>>`), not builtins here.

use std::collections::HashMap;

use rand::Rng;

use moor_var::{v_float, v_int, Error, Var, Variant};

use super::{arg, want_float, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("abs", abs);
    fns.insert("min", min);
    fns.insert("max", max);
    fns.insert("random", random);
    fns.insert("frandom", frandom);
    fns.insert("sqrt", t_sqrt);
    fns.insert("ceil", t_ceil);
    fns.insert("floor", t_floor);
    fns.insert("trunc", t_trunc);
    fns.insert("sin", t_sin);
    fns.insert("cos", t_cos);
    fns.insert("tan", t_tan);
    fns.insert("asin", t_asin);
    fns.insert("acos", t_acos);
    fns.insert("atan", t_atan);
    fns.insert("exp", t_exp);
    fns.insert("log", t_log);
    fns.insert("log10", t_log10);
    fns.insert("log2", t_log2);
    fns.insert("sinh", t_sinh);
    fns.insert("cosh", t_cosh);
    fns.insert("tanh", t_tanh);
    fns.insert("cbrt", t_cbrt);
}

fn abs(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(v) = arg(&args, 0) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    match v.variant() {
        Variant::Int(n) => v_int(n.wrapping_abs()).into(),
        Variant::Float(f) => v_float(f.abs()).into(),
        _ => BuiltinOutcome::Raise(Error::E_TYPE),
    }
}

fn min(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    extremum(&args, |a, b| matches!(a.cmp_moo(b), Ok(std::cmp::Ordering::Less)))
}

fn max(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    extremum(&args, |a, b| matches!(a.cmp_moo(b), Ok(std::cmp::Ordering::Greater)))
}

fn extremum(args: &[Var], better: impl Fn(&Var, &Var) -> bool) -> BuiltinOutcome {
    let Some((first, rest)) = args.split_first() else {
        return BuiltinOutcome::Raise(Error::E_ARGS);
    };
    let mut best = first.clone();
    for v in rest {
        if better(v, &best) {
            best = v.clone();
        }
    }
    best.into()
}

fn random(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let mut rng = rand::thread_rng();
    let top = match arg(&args, 0) {
        Some(v) => match v.as_int() {
            Some(n) => n,
            None => return BuiltinOutcome::Raise(Error::E_TYPE),
        },
        None => i64::MAX,
    };
    if top < 1 {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    v_int(rng.gen_range(1..=top)).into()
}

fn frandom(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let mut rng = rand::thread_rng();
    let (lo, hi) = match (arg(&args, 0), arg(&args, 1)) {
        (Some(_), Some(_)) => {
            let lo = match want_float(&args, 0) {
                Ok(v) => v,
                Err(e) => return BuiltinOutcome::Raise(e),
            };
            let hi = match want_float(&args, 1) {
                Ok(v) => v,
                Err(e) => return BuiltinOutcome::Raise(e),
            };
            (lo, hi)
        }
        _ => (0.0, 1.0),
    };
    if lo > hi {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    v_float(rng.gen_range(lo..=hi)).into()
}

/// Each transcendental raises `E_FLOAT` on a non-finite result (spec.md §4.3 "ERR E_FLOAT"),
/// rather than silently producing `nan`/`inf`.
macro_rules! transform_fn {
    ($name:ident, $f:expr) => {
        fn $name(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
            match want_float(&args, 0) {
                Ok(x) => {
                    let y: f64 = $f(x);
                    if y.is_finite() {
                        v_float(y).into()
                    } else {
                        BuiltinOutcome::Raise(Error::E_FLOAT)
                    }
                }
                Err(e) => BuiltinOutcome::Raise(e),
            }
        }
    };
}

transform_fn!(t_sqrt, f64::sqrt);
transform_fn!(t_ceil, f64::ceil);
transform_fn!(t_floor, f64::floor);
transform_fn!(t_trunc, f64::trunc);
transform_fn!(t_sin, f64::sin);
transform_fn!(t_cos, f64::cos);
transform_fn!(t_tan, f64::tan);
transform_fn!(t_asin, f64::asin);
transform_fn!(t_acos, f64::acos);
transform_fn!(t_atan, f64::atan);
transform_fn!(t_exp, f64::exp);
transform_fn!(t_log, f64::ln);
transform_fn!(t_log10, f64::log10);
transform_fn!(t_log2, f64::log2);
transform_fn!(t_sinh, f64::sinh);
transform_fn!(t_cosh, f64::cosh);
transform_fn!(t_tanh, f64::tanh);
transform_fn!(t_cbrt, f64::cbrt);
