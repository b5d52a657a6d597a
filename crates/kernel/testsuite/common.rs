// Copyright (C) 2024 Ryan Daum <ryan.daum@gmail.com>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Shared harness for the regression suite: a one-object wizard database plus a synchronous
//! `eval()` that runs a snippet to completion the same way `--eval` does on the CLI, without
//! spinning up a scheduler thread.

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use moor_common::flags::{BitEnum, ObjFlag};
use moor_common::model::{ObjAttrs, Perms};
use moor_db::WorldState;
use moor_kernel::tasks::task::{Task, TaskKind};
use moor_kernel::vm::exec::eval_frame;
use moor_kernel::vm::TaskOutcome;
use moor_kernel::Scheduler;
use moor_var::{Exception, Objid, Var};

pub const WIZARD: Objid = Objid::SYSTEM_OBJECT;

/// A `WorldState` behind a mutex, clonable the way the teacher's `db.clone()` test fixture is,
/// so a single database can be threaded through several `assert_eval` calls in one test.
#[derive(Clone)]
pub struct Db(Arc<Mutex<WorldState>>);

pub fn create_db() -> Db {
    let mut world = WorldState::new();
    let sys = world
        .create_object(Objid::SYSTEM_OBJECT, ObjAttrs::new().name("System Object"), false)
        .expect("create #0");
    let perms = Perms::new(sys, true, true);
    world
        .set_flags(&perms, sys, BitEnum::new_with(&[ObjFlag::Wizard, ObjFlag::Programmer]))
        .expect("flag #0 wizard");
    Db(Arc::new(Mutex::new(world)))
}

impl Db {
    pub fn with_world<T>(&self, f: impl FnOnce(&mut WorldState) -> T) -> T {
        let mut world = self.0.lock().unwrap();
        f(&mut world)
    }

    pub fn assert_eval(&self, who: Objid, source: impl AsRef<str>, expected: Var) {
        let got = eval(self, who, source.as_ref()).expect("eval should not raise");
        assert_eq!(got, expected);
    }

    pub fn assert_raises(&self, who: Objid, source: impl AsRef<str>, expected: moor_var::Error) {
        let err = eval(self, who, source.as_ref()).expect_err("eval should raise");
        assert_eq!(err.error, expected);
    }
}

/// Compiles and runs `source` as `who`, to completion, the same path `--eval` and the `;expr`
/// command form use (`TaskKind::Eval` over a fresh, unregistered `Task`).
pub fn eval(db: &Db, who: Objid, source: &str) -> Result<Var, Exception> {
    let (wizard, programmer) = db.with_world(|w| {
        let flags = w.flags_of(who).unwrap_or_default();
        (flags.contains(ObjFlag::Wizard), flags.contains(ObjFlag::Programmer))
    });
    let perms = Perms::new(who, wizard, programmer);

    let mut world = db.0.lock().unwrap();
    let mut scheduler = Scheduler::new(std::mem::replace(&mut *world, WorldState::new()));
    let tid = scheduler.new_task_id();
    let mut task = Task::new(tid, who, TaskKind::Eval, &scheduler.options, false);

    let outcome = match eval_frame(perms, source, &mut scheduler.cache) {
        Ok(frame) => {
            task.frames.push(frame);
            scheduler.run_task_to_completion(task)
        }
        Err(exc) => TaskOutcome::Error(exc),
    };

    *world = std::mem::replace(&mut scheduler.world, WorldState::new());

    match outcome {
        TaskOutcome::Complete(v) => Ok(v),
        TaskOutcome::Error(exc) => Err(exc),
        TaskOutcome::Killed | TaskOutcome::Suspended(_) => {
            Err(Exception::from_error(moor_var::Error::E_EXEC))
        }
    }
}
