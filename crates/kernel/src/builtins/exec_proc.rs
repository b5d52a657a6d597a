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
// NOTE: `exec` is marked optional (spec.md §4.7 "Exec"). The spec describes it as suspending the
// task asynchronously until the child process exits, non-resumable, killable. This single
// scheduler thread has no async executor to hand the child off to, so `exec` instead runs the
// child to completion synchronously -- the whole scheduler (not just this task) blocks for the
// duration, same as it already does for any other CPU-bound tick. Wizard-only, since it's an
// arbitrary-process-execution primitive.

use std::collections::HashMap;
use std::process::Command;

use moor_var::{v_int, v_list, v_str, Error, Var};

use super::{arg, want_list, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("exec", exec);
}

/// `exec({cmd, args...})` => `{stdout_lines, stderr_lines, exit_code}` (spec.md §4.7 "Exec").
fn exec(ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    if ctx.perms.check_is_wizard().is_err() {
        return BuiltinOutcome::Raise(Error::E_PERM);
    }
    let Ok(argv) = want_list(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    if argv.is_empty() {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    let mut words = Vec::with_capacity(argv.len());
    for v in argv {
        match v.as_str() {
            Some(s) => words.push(s.to_string()),
            None => return BuiltinOutcome::Raise(Error::E_TYPE),
        }
    }
    let _ = arg(&args, 1);

    let output = match Command::new(&words[0]).args(&words[1..]).output() {
        Ok(o) => o,
        Err(_) => return BuiltinOutcome::Raise(Error::E_INVARG),
    };
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let stdout_lines: Vec<Var> = stdout.lines().map(v_str).collect();
    let stderr_lines: Vec<Var> = stderr.lines().map(v_str).collect();
    let exit_code = output.status.code().unwrap_or(-1);
    v_list(vec![v_list(stdout_lines), v_list(stderr_lines), v_int(exit_code as i64)]).into()
}
