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

//! The builtin-function registry (spec.md §4.7 "A name->function table registered at startup").

mod exec_proc;
mod io;
mod lists;
mod maps;
mod math;
mod objects;
mod properties;
mod strings;
mod system;
mod tasks;
mod time;
mod types;
mod verbs;

use std::collections::HashMap;

use moor_common::model::Perms;
use moor_var::{Error, Var};

use moor_db::WorldState;

use crate::config::ServerOptions;
use crate::tasks::{Task, TaskDirectory, WakeCondition};
use crate::vm::{PendingBuiltin, ProgramCache};

/// Everything a builtin needs (spec.md §4.7: "Each builtin receives the current task context and
/// the evaluated argument list"). The current activation frame is *not* included here directly --
/// builtins that need it (`callers()`, `task_local()`) read `task.frames.last()` themselves. The
/// calling frame stays on `task.frames` for the duration of the call (it must, so `callers()`/
/// `caller_perms()` keep seeing it); a builtin just must not re-enter the stepper for this task
/// (spec.md §5 "Reentrancy") -- the one way a builtin may still run verb code is to hand the
/// stepper a `BuiltinOutcome::CallVerb` and let it push the frame itself.
pub struct BuiltinContext<'a> {
    pub world: &'a mut WorldState,
    pub perms: Perms,
    pub task: &'a mut Task,
    pub directory: &'a mut dyn TaskDirectory,
    pub options: &'a mut ServerOptions,
    pub program_cache: &'a mut ProgramCache,
}

/// What a builtin call produces (spec.md §4.7: "returns either a value or an error"; "Builtins
/// that block... mark the task suspended").
pub enum BuiltinOutcome {
    Value(Var),
    Raise(Error),
    RaiseMsg(Error, String),
    Suspend(WakeCondition),
    /// The task kills itself (spec.md §4.7 `kill_task(task_id())`). Distinct from
    /// `TaskDirectory::kill_task`, which can't act on the currently-running task -- it's already
    /// been removed from the scheduler's table for the duration of the step.
    Kill,
    /// Run `this:verb_name(args)` (if defined) and resume `then` once it returns, instead of
    /// pushing the frame by re-entering the stepper directly. If no such verb is defined, the
    /// stepper runs `then` immediately without calling anything (spec.md §3 "triggers a :recycle
    /// verb if defined").
    CallVerb { this: Var, verb_name: String, args: Vec<Var>, then: PendingBuiltin },
}

impl From<Var> for BuiltinOutcome {
    fn from(v: Var) -> Self {
        BuiltinOutcome::Value(v)
    }
}
impl From<Error> for BuiltinOutcome {
    fn from(e: Error) -> Self {
        BuiltinOutcome::Raise(e)
    }
}

pub type BuiltinFn = fn(&mut BuiltinContext, Vec<Var>) -> BuiltinOutcome;

pub struct BuiltinRegistry {
    fns: HashMap<&'static str, BuiltinFn>,
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinRegistry {
    #[must_use]
    pub fn new() -> Self {
        let mut fns: HashMap<&'static str, BuiltinFn> = HashMap::new();
        types::register(&mut fns);
        math::register(&mut fns);
        strings::register(&mut fns);
        lists::register(&mut fns);
        maps::register(&mut fns);
        objects::register(&mut fns);
        properties::register(&mut fns);
        verbs::register(&mut fns);
        tasks::register(&mut fns);
        time::register(&mut fns);
        io::register(&mut fns);
        system::register(&mut fns);
        exec_proc::register(&mut fns);
        BuiltinRegistry { fns }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.fns.get(name).copied()
    }

    #[must_use]
    pub fn is_known(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }
}

// ---- shared argument-coercion helpers, used across every category module -------------------

pub(crate) fn arg(args: &[Var], i: usize) -> Option<&Var> {
    args.get(i)
}

pub(crate) fn want_int(args: &[Var], i: usize) -> Result<i64, Error> {
    arg(args, i).and_then(Var::as_int).ok_or(Error::E_TYPE)
}

pub(crate) fn want_float(args: &[Var], i: usize) -> Result<f64, Error> {
    match arg(args, i).map(moor_var::Var::variant) {
        Some(moor_var::Variant::Float(f)) => Ok(*f),
        Some(moor_var::Variant::Int(n)) => Ok(*n as f64),
        _ => Err(Error::E_TYPE),
    }
}

pub(crate) fn want_str<'a>(args: &'a [Var], i: usize) -> Result<&'a str, Error> {
    arg(args, i).and_then(Var::as_str).ok_or(Error::E_TYPE)
}

pub(crate) fn want_obj(args: &[Var], i: usize) -> Result<moor_var::Objid, Error> {
    arg(args, i).and_then(Var::as_obj).ok_or(Error::E_TYPE)
}

pub(crate) fn want_list<'a>(args: &'a [Var], i: usize) -> Result<&'a [Var], Error> {
    arg(args, i).and_then(Var::as_list).ok_or(Error::E_TYPE)
}
