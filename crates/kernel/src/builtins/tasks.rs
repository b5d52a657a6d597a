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

//! `task_id task_local set_task_local callers caller_perms queued_tasks suspend resume kill_task
//! ticks_left seconds_left` (spec.md §4.7 "Tasks").

use std::collections::HashMap;
use std::time::Instant;

use moor_common::tasks::TaskId;
use moor_var::{v_int, v_list, v_none, v_obj, v_str, Error, Var};

use crate::tasks::suspension::WakeCondition;

use super::{arg, want_int, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("task_id", task_id);
    fns.insert("task_local", task_local);
    fns.insert("set_task_local", set_task_local);
    fns.insert("callers", callers);
    fns.insert("caller_perms", caller_perms);
    fns.insert("queued_tasks", queued_tasks);
    fns.insert("suspend", suspend);
    fns.insert("resume", resume);
    fns.insert("kill_task", kill_task);
    fns.insert("ticks_left", ticks_left);
    fns.insert("seconds_left", seconds_left);
}

fn task_id(ctx: &mut BuiltinContext, _args: Vec<Var>) -> BuiltinOutcome {
    v_int(ctx.task.id.0 as i64).into()
}

fn task_local(ctx: &mut BuiltinContext, _args: Vec<Var>) -> BuiltinOutcome {
    ctx.task.task_local.clone().into()
}

fn set_task_local(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(value) = arg(&args, 0) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    ctx.task.task_local = value.clone();
    v_none().into()
}

/// Each caller as a 6-tuple `{this, verb-name, perms, verb-loc, player, line}` (spec.md §4.7),
/// innermost caller first.
fn callers(ctx: &mut BuiltinContext, _args: Vec<Var>) -> BuiltinOutcome {
    v_list(
        ctx.task
            .callers()
            .into_iter()
            .map(|f| {
                v_list(vec![
                    f.this.clone(),
                    v_str(&f.verb_name),
                    v_obj(f.programmer),
                    v_obj(f.verb_loc),
                    v_obj(f.player),
                    v_int(f.line_number as i64),
                ])
            })
            .collect(),
    )
    .into()
}

fn caller_perms(ctx: &mut BuiltinContext, _args: Vec<Var>) -> BuiltinOutcome {
    v_obj(ctx.task.caller_perms()).into()
}

fn queued_tasks(ctx: &mut BuiltinContext, _args: Vec<Var>) -> BuiltinOutcome {
    v_list(ctx.directory.queued_tasks_snapshot(&ctx.perms)).into()
}

/// `suspend([seconds])`: with no argument, suspends indefinitely (only `resume()` wakes it).
fn suspend(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    match arg(&args, 0) {
        None => BuiltinOutcome::Suspend(WakeCondition::Indefinite),
        Some(v) => match v.as_int().or_else(|| v.as_float().map(|f| f as i64)) {
            Some(secs) if secs >= 0 => {
                BuiltinOutcome::Suspend(WakeCondition::Timer { at: Instant::now() + std::time::Duration::from_secs(secs as u64) })
            }
            Some(_) => BuiltinOutcome::Raise(Error::E_INVARG),
            None => BuiltinOutcome::Raise(Error::E_TYPE),
        },
    }
}

fn resume(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(tid) = want_int(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let value = arg(&args, 1).cloned().unwrap_or_else(v_none);
    let tid = TaskId(tid as u64);
    if tid == ctx.task.id {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    match ctx.directory.resume_task(&ctx.perms, tid, value) {
        Ok(()) => v_none().into(),
        Err(e) => e.into(),
    }
}

/// `kill_task(tid)`: killing the running task itself terminates it immediately (the scheduler has
/// already removed it from the task table for the duration of this step, so the normal
/// `TaskDirectory::kill_task` path can't see it).
fn kill_task(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(tid) = want_int(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let tid = TaskId(tid as u64);
    if tid == ctx.task.id {
        if !(ctx.perms.wizard || ctx.task.player == ctx.perms.who) {
            return BuiltinOutcome::Raise(Error::E_PERM);
        }
        return BuiltinOutcome::Kill;
    }
    match ctx.directory.kill_task(&ctx.perms, tid) {
        Ok(()) => v_none().into(),
        Err(e) => e.into(),
    }
}

fn ticks_left(ctx: &mut BuiltinContext, _args: Vec<Var>) -> BuiltinOutcome {
    v_int(ctx.task.ticks_left as i64).into()
}

fn seconds_left(ctx: &mut BuiltinContext, _args: Vec<Var>) -> BuiltinOutcome {
    let remaining = ctx.task.deadline.saturating_duration_since(Instant::now());
    v_int(remaining.as_secs() as i64).into()
}
