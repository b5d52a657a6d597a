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

//! A single task: its call stack plus the bookkeeping the scheduler needs (spec.md §3 "Tasks and
//! Frames"). Tasks are purely in-memory -- only the object store is persisted (spec.md §6
//! "Persisted state" names objects/properties/verbs/config, not in-flight tasks).

use std::time::Instant;

use moor_common::tasks::TaskId;
use moor_var::{v_map, Objid, Var};

use crate::config::ServerOptions;
use crate::vm::Activation;

/// Why a task was created (spec.md §3 "kind ∈ {input, forked, resumed}"; `Eval` covers the
/// `;expr` and `--eval` forms, which behave like an input task whose verb is synthetic; `Hook`
/// covers the server-invoked login/connection callbacks of spec.md §4.8, always server_initiated).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Input,
    Forked,
    Resumed,
    Eval,
    Hook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Queued,
    Running,
    Suspended,
    Completed,
    Killed,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub player: Objid,
    pub kind: TaskKind,
    pub state: TaskState,
    pub start_time: Instant,
    pub queue_time: Instant,
    /// Wall-clock creation time in Unix seconds, for `queued_tasks()` (spec.md §4.5) -- `Instant`
    /// is monotonic but not convertible to a calendar time.
    pub wall_start: i64,

    pub frames: Vec<Activation>,

    /// Remaining bytecode-step budget for the *current* run (spec.md §4.5 "Budgets"):
    /// replenished to the foreground or background default at creation/fork, never mid-run.
    pub ticks_left: u64,
    pub ticks_total: u64,
    pub deadline: Instant,

    /// `task_local()`/`set_task_local()` storage; defaults to an empty map (spec.md §4.7).
    pub task_local: Var,

    /// Set when an `exec()` builtin put this task into its non-resumable suspended state
    /// (spec.md §4.7 "such tasks cannot be resumed, only killed").
    pub exec_suspended: bool,
}

impl Task {
    #[must_use]
    pub fn new(id: TaskId, player: Objid, kind: TaskKind, options: &ServerOptions, is_background: bool) -> Self {
        let now = Instant::now();
        let ticks = if is_background { options.bg_ticks } else { options.fg_ticks };
        let seconds = if is_background { options.bg_seconds } else { options.fg_seconds };
        Task {
            id,
            player,
            kind,
            state: TaskState::Created,
            start_time: now,
            queue_time: now,
            wall_start: chrono::Utc::now().timestamp(),
            frames: Vec::new(),
            ticks_left: ticks,
            ticks_total: ticks,
            deadline: now + std::time::Duration::from_secs(seconds),
            task_local: v_map(vec![]),
            exec_suspended: false,
        }
    }

    #[must_use]
    pub fn current_frame(&self) -> Option<&Activation> {
        self.frames.last()
    }

    /// Non-`server_initiated` frames below the topmost, innermost first (spec.md §4.5
    /// `callers()`).
    #[must_use]
    pub fn callers(&self) -> Vec<&Activation> {
        self.frames
            .iter()
            .rev()
            .skip(1)
            .filter(|f| !f.server_initiated)
            .collect()
    }

    /// `caller_perms()` (spec.md §4.5): the programmer one frame below the current, or `#-1` at
    /// the top level.
    #[must_use]
    pub fn caller_perms(&self) -> Objid {
        if self.frames.len() < 2 {
            return Objid::NOTHING;
        }
        self.frames[self.frames.len() - 2].programmer
    }

    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        self.frames
            .iter()
            .map(|f| f.stack.len() * 16 + f.locals.len() * 16 + f.verb_name.len())
            .sum()
    }
}
