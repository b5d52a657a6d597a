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

//! `time ctime idle_seconds connected_seconds` (spec.md §4.7 "Time"). No subsecond precision
//! anywhere here (spec.md Non-goals).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use moor_var::{v_int, v_string, Error, Var};

use super::{arg, want_obj, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("time", time);
    fns.insert("ctime", ctime);
    fns.insert("idle_seconds", idle_seconds);
    fns.insert("connected_seconds", connected_seconds);
}

fn time(_ctx: &mut BuiltinContext, _args: Vec<Var>) -> BuiltinOutcome {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0);
    v_int(secs).into()
}

/// `ctime([time])`: a fixed 24-character local-ish rendering (`"Mon Jan  1 00:00:00 1970"`),
/// matching the reference server's `ctime(3)`-derived format. No timezone conversion.
fn ctime(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let secs = match arg(&args, 0) {
        Some(v) => match v.as_int() {
            Some(n) => n,
            None => return BuiltinOutcome::Raise(Error::E_TYPE),
        },
        None => SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0),
    };
    let Some(dt) = DateTime::<Utc>::from_timestamp(secs, 0) else {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    };
    v_string(dt.format("%a %b %e %H:%M:%S %Y").to_string()).into()
}

fn idle_seconds(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(who) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.directory.idle_seconds(who) {
        Ok(secs) => v_int(secs as i64).into(),
        Err(e) => e.into(),
    }
}

fn connected_seconds(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(who) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.directory.connected_seconds(who) {
        Ok(secs) => v_int(secs as i64).into(),
        Err(e) => e.into(),
    }
}
