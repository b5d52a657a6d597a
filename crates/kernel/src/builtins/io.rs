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

//! `notify read boot_player connection_name` (spec.md §4.7 "I/O", §4.8 "Connection model").
//! `open_network_connection`/`listen`/`unlisten`/`listeners` (outbound/secondary listeners) are
//! out of scope -- spec.md §4.8 only specifies one listener per server, brought up from the CLI.

use std::collections::HashMap;

use moor_var::{v_int, v_none, v_string, Error, Var};

use crate::tasks::suspension::WakeCondition;

use super::{arg, want_obj, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("notify", notify);
    fns.insert("read", read);
    fns.insert("boot_player", boot_player);
    fns.insert("connection_name", connection_name);
}

/// The reference server's docs say `notify()` returns none; in practice it returns `1`. Preserved
/// here since code in the wild relies on the return value being truthy.
fn notify(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(player) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(text) = arg(&args, 1).and_then(Var::as_str) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let Ok(owner) = ctx.world.owner_of(player) else { return BuiltinOutcome::Raise(Error::E_INVARG) };
    if ctx.perms.check_owner_or_wizard(owner).is_err() {
        return BuiltinOutcome::Raise(Error::E_PERM);
    }
    ctx.directory.notify(player, text.to_string());
    v_int(1).into()
}

/// `read([player])`: suspends the calling task until a line arrives on the player's connection
/// (spec.md §4.3 "Suspension points").
fn read(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    if let Some(player) = arg(&args, 0) {
        let Some(player) = player.as_obj() else { return BuiltinOutcome::Raise(Error::E_TYPE) };
        if player != ctx.task.player && ctx.perms.check_is_wizard().is_err() {
            return BuiltinOutcome::Raise(Error::E_PERM);
        }
    }
    BuiltinOutcome::Suspend(WakeCondition::Input)
}

/// `boot_player(player)`: the caller must be `player` itself or a wizard.
fn boot_player(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(player) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    if !(ctx.perms.wizard || ctx.perms.who == player) {
        return BuiltinOutcome::Raise(Error::E_PERM);
    }
    ctx.directory.boot_player(player);
    v_none().into()
}

fn connection_name(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(player) = want_obj(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match ctx.directory.connection_name(player) {
        Ok(name) => v_string(name).into(),
        Err(e) => e.into(),
    }
}
