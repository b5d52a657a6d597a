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

//! `server_version server_log load_server_options shutdown` (spec.md §4.7 "System", §6 "Server
//! options"). `load_server_options()` reads `#0.server_options`, the well-known property
//! `ServerOptions::load_from_map` rebinds itself from.

use std::collections::HashMap;

use moor_var::{v_none, Error, Objid, Var};

use super::{arg, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("server_version", server_version);
    fns.insert("server_log", server_log);
    fns.insert("load_server_options", load_server_options);
    fns.insert("shutdown", shutdown);
}

fn server_version(_ctx: &mut BuiltinContext, _args: Vec<Var>) -> BuiltinOutcome {
    moor_var::v_str(env!("CARGO_PKG_VERSION")).into()
}

/// `server_log(message [, is-error])`: forwarded to `tracing` rather than stdout, so it
/// interleaves with the rest of the server's structured logging.
fn server_log(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(msg) = arg(&args, 0).and_then(Var::as_str) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let is_error = arg(&args, 1).is_some_and(Var::is_true);
    if is_error {
        tracing::warn!(target: "moor_log", "{msg}");
    } else {
        tracing::info!(target: "moor_log", "{msg}");
    }
    v_none().into()
}

/// Wizard-only. Re-reads `#0.server_options` and rebinds the live `ServerOptions` (spec.md §6).
fn load_server_options(ctx: &mut BuiltinContext, _args: Vec<Var>) -> BuiltinOutcome {
    if ctx.perms.check_is_wizard().is_err() {
        return BuiltinOutcome::Raise(Error::E_PERM);
    }
    match ctx.world.resolve_property(Objid::SYSTEM_OBJECT, "server_options") {
        Ok((_, value)) => {
            if let Some(map) = value.as_map() {
                ctx.options.load_from_map(map);
            }
            v_none().into()
        }
        Err(e) => Error::from(e).into(),
    }
}

/// Wizard-only. Posts a `NarrativeEvent::Shutdown` the connection layer delivers to every
/// connected player before tearing down the listener (spec.md §4.8).
fn shutdown(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    if ctx.perms.check_is_wizard().is_err() {
        return BuiltinOutcome::Raise(Error::E_PERM);
    }
    let msg = arg(&args, 0).and_then(Var::as_str).unwrap_or("shutting down").to_string();
    ctx.directory.shutdown(msg);
    v_none().into()
}
