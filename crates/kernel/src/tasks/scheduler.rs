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

//! The cooperative, single-threaded task scheduler (spec.md §4.5): one process-wide singleton
//! owning the object store, the program cache, and every task (spec.md §9 "Global mutable
//! state... encapsulated in two process-wide singletons").

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use moor_common::model::Perms;
use moor_common::tasks::{NarrativeEvent, TaskId};
use moor_var::{v_int, v_list, v_str, Error, Objid, Var};

use moor_db::WorldState;

use crate::builtins::BuiltinRegistry;
use crate::config::{approx_value_bytes, ServerOptions};
use crate::tasks::suspension::{SuspendedTask, WakeCondition};
use crate::tasks::task::{Task, TaskState};
use crate::vm::{run_task, ProgramCache, TaskOutcome};

/// The operations a running task's builtins may perform against the *rest* of the task table --
/// deliberately narrower than `Scheduler` itself, so it can be lent out while the task currently
/// being stepped has already been removed from the map it touches (spec.md §5 "Reentrancy": "a
/// builtin MUST NOT re-enter the stepper for the same task").
pub trait TaskDirectory {
    fn allocate_task_id(&mut self) -> TaskId;
    /// Registers a freshly built task (e.g. a `fork` child) and schedules it per its initial
    /// `state` (`Queued` onto the ready queue, `Suspended` onto the timer heap).
    fn enqueue_new_task(&mut self, task: Task);
    fn queued_tasks_snapshot(&self, perms: &Perms) -> Vec<Var>;
    fn resume_task(&mut self, perms: &Perms, tid: TaskId, value: Var) -> Result<(), Error>;
    fn kill_task(&mut self, perms: &Perms, tid: TaskId) -> Result<(), Error>;
    fn notify(&mut self, player: Objid, text: String);
    fn boot_player(&mut self, player: Objid);
    fn shutdown(&mut self, message: String);
    fn connected_players(&self) -> Vec<Objid>;
    fn connection_name(&self, player: Objid) -> Result<String, Error>;
    fn idle_seconds(&self, player: Objid) -> Result<f64, Error>;
    fn connected_seconds(&self, player: Objid) -> Result<f64, Error>;
}

/// What the connection layer has told the scheduler about one connected player (spec.md §4.8
/// `connection_name`/`idle_seconds`/`connected_seconds`). Updated by `SchedulerClient::connect`/
/// `disconnect`, and on every `submit_input`.
#[derive(Clone)]
struct ConnectionInfo {
    name: String,
    connected_at: i64,
    last_activity: i64,
}

/// A borrow of only the bookkeeping fields of `Scheduler`, disjoint from `world`/`options`/
/// `builtins`/`cache` so it can be lent to the stepper at the same time as those (spec.md §9
/// "Global mutable state... guarded by... single-owner channel" -- here, by the borrow checker).
struct SchedulerDirectory<'a> {
    tasks: &'a mut HashMap<TaskId, Task>,
    suspended: &'a mut HashMap<TaskId, SuspendedTask>,
    ready: &'a mut VecDeque<TaskId>,
    next_task_id: &'a mut u64,
    events: &'a mut Vec<NarrativeEvent>,
    connections: &'a HashMap<Objid, ConnectionInfo>,
}

impl TaskDirectory for SchedulerDirectory<'_> {
    fn allocate_task_id(&mut self) -> TaskId {
        let id = TaskId(*self.next_task_id);
        *self.next_task_id += 1;
        id
    }

    fn enqueue_new_task(&mut self, task: Task) {
        let id = task.id;
        let wake_at = if task.state == TaskState::Suspended {
            Some(task.deadline)
        } else {
            None
        };
        self.tasks.insert(id, task);
        match wake_at {
            Some(at) => {
                self.suspended.insert(id, SuspendedTask { condition: WakeCondition::Timer { at } });
            }
            None => {
                self.tasks.get_mut(&id).unwrap().state = TaskState::Queued;
                self.ready.push_back(id);
            }
        }
    }

    fn queued_tasks_snapshot(&self, perms: &Perms) -> Vec<Var> {
        self.tasks
            .values()
            .filter(|t| perms.wizard || t.player == perms.who)
            .map(task_to_tuple)
            .collect()
    }

    fn resume_task(&mut self, perms: &Perms, tid: TaskId, value: Var) -> Result<(), Error> {
        let task = self.tasks.get_mut(&tid).ok_or(Error::E_INVARG)?;
        if !(perms.wizard || task.player == perms.who) {
            return Err(Error::E_PERM);
        }
        if task.state != TaskState::Suspended || task.exec_suspended {
            return Err(Error::E_INVARG);
        }
        self.suspended.remove(&tid);
        task.state = TaskState::Queued;
        if let Some(frame) = task.frames.last_mut() {
            frame.push(value);
        }
        self.ready.push_back(tid);
        Ok(())
    }

    fn kill_task(&mut self, perms: &Perms, tid: TaskId) -> Result<(), Error> {
        let task = self.tasks.get_mut(&tid).ok_or(Error::E_INVARG)?;
        if !(perms.wizard || task.player == perms.who) {
            return Err(Error::E_PERM);
        }
        task.state = TaskState::Killed;
        self.suspended.remove(&tid);
        self.ready.retain(|t| *t != tid);
        self.tasks.remove(&tid);
        Ok(())
    }

    fn notify(&mut self, player: Objid, text: String) {
        self.events.push(NarrativeEvent::Notify { player, text });
    }

    fn boot_player(&mut self, player: Objid) {
        self.events.push(NarrativeEvent::Disconnect { player });
    }

    fn shutdown(&mut self, message: String) {
        self.events.push(NarrativeEvent::Shutdown { message });
    }

    fn connected_players(&self) -> Vec<Objid> {
        self.connections.keys().copied().collect()
    }

    fn connection_name(&self, player: Objid) -> Result<String, Error> {
        self.connections.get(&player).map(|c| c.name.clone()).ok_or(Error::E_INVARG)
    }

    fn idle_seconds(&self, player: Objid) -> Result<f64, Error> {
        let info = self.connections.get(&player).ok_or(Error::E_INVARG)?;
        Ok((now_secs() - info.last_activity) as f64)
    }

    fn connected_seconds(&self, player: Objid) -> Result<f64, Error> {
        let info = self.connections.get(&player).ok_or(Error::E_INVARG)?;
        Ok((now_secs() - info.connected_at) as f64)
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The `queued_tasks()` 10-tuple (spec.md §4.5, verified field list and positions).
fn task_to_tuple(t: &Task) -> Var {
    let Some(frame) = t.current_frame() else {
        return v_list(vec![
            v_int(t.id.0 as i64),
            v_int(t.wall_start),
            v_int(0),
            v_int(t.ticks_total as i64),
            v_int(Objid::NOTHING.0),
            v_int(Objid::NOTHING.0),
            v_str(""),
            v_int(0),
            v_int(Objid::NOTHING.0),
            v_int(t.approx_bytes() as i64),
        ]);
    };
    v_list(vec![
        v_int(t.id.0 as i64),
        v_int(t.wall_start),
        v_int(0),
        v_int(t.ticks_total as i64),
        v_int(frame.programmer.0),
        v_int(frame.verb_loc.0),
        v_str(&frame.verb_name),
        v_int(frame.line_number as i64),
        frame.this.clone(),
        v_int(t.approx_bytes() as i64),
    ])
}

pub struct Scheduler {
    pub world: WorldState,
    pub options: ServerOptions,
    pub builtins: BuiltinRegistry,
    pub cache: ProgramCache,

    tasks: HashMap<TaskId, Task>,
    suspended: HashMap<TaskId, SuspendedTask>,
    ready: VecDeque<TaskId>,
    next_task_id: u64,
    /// Output the net layer drains after each scheduler turn (spec.md §4.8 "notify() emits a
    /// line").
    pub events: Vec<NarrativeEvent>,
    /// Who's connected, as reported by the net layer's `connect`/`disconnect` calls (spec.md §4.8
    /// `connected_players`/`connection_name`/`idle_seconds`/`connected_seconds`).
    connections: HashMap<Objid, ConnectionInfo>,
}

impl Scheduler {
    #[must_use]
    pub fn new(world: WorldState) -> Self {
        Scheduler {
            world,
            options: ServerOptions::default(),
            builtins: BuiltinRegistry::new(),
            cache: ProgramCache::new(),
            tasks: HashMap::new(),
            suspended: HashMap::new(),
            ready: VecDeque::new(),
            next_task_id: 1,
            events: Vec::new(),
            connections: HashMap::new(),
        }
    }

    /// Records a newly-established connection (spec.md §4.8). Called by the net layer through
    /// `SchedulerClient::connect` as soon as a player logs in. Returns `true` if this player
    /// already had a live connection -- the net layer fires `user_reconnected` rather than
    /// `user_connected` in that case.
    pub fn connection_established(&mut self, player: Objid, name: String) -> bool {
        let now = now_secs();
        let reconnect = self.connections.contains_key(&player);
        self.connections.insert(player, ConnectionInfo { name, connected_at: now, last_activity: now });
        reconnect
    }

    /// Drops connection bookkeeping for a player whose connection has actually closed (spec.md
    /// §4.8). Distinct from `boot_player`, which only *requests* that the net layer close it.
    pub fn connection_closed(&mut self, player: Objid) {
        self.connections.remove(&player);
    }

    /// Bumps last-activity for `idle_seconds()` whenever the player sends a line of input.
    pub fn note_player_activity(&mut self, player: Objid) {
        if let Some(info) = self.connections.get_mut(&player) {
            info.last_activity = now_secs();
        }
    }

    #[must_use]
    pub fn new_task_id(&mut self) -> TaskId {
        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;
        id
    }

    /// Registers a task and puts it straight onto the ready queue (spec.md §4.5
    /// `CreateTask(owner, code, limits)` -> `queued`).
    pub fn submit(&mut self, mut task: Task) -> TaskId {
        let id = task.id;
        task.state = TaskState::Queued;
        self.ready.push_back(id);
        self.tasks.insert(id, task);
        id
    }

    /// Moves any suspended tasks whose timer has elapsed onto the ready queue. Callers (the net
    /// layer's event loop) should call this on a regular tick alongside draining input.
    pub fn wake_due_tasks(&mut self) {
        let now = Instant::now();
        let due: Vec<TaskId> = self
            .suspended
            .iter()
            .filter(|(_, s)| s.wake_at().is_some_and(|at| at <= now))
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            self.suspended.remove(&id);
            if let Some(task) = self.tasks.get_mut(&id) {
                task.state = TaskState::Queued;
                if let Some(frame) = task.frames.last_mut() {
                    frame.push(crate::tasks::suspension::default_resume_value());
                }
            }
            self.ready.push_back(id);
        }
    }

    /// Runs every currently-ready task to its next stopping point (spec.md §4.5 "Scheduler picks
    /// a ready task, sets it `running`, steps it until suspend, completion, error, or tick/time
    /// exhaustion"), draining the ready queue as it was at the start of the call (tasks forked or
    /// resumed during this pass run on the *next* call, so one player's flood of forks can't
    /// starve everyone else within a single pass).
    pub fn run_ready(&mut self) {
        let batch: Vec<TaskId> = self.ready.drain(..).collect();
        for tid in batch {
            self.run_one(tid);
        }
    }

    fn run_one(&mut self, tid: TaskId) {
        let Some(mut task) = self.tasks.remove(&tid) else {
            return;
        };
        if task.state == TaskState::Killed {
            return;
        }
        task.state = TaskState::Running;
        crate::vm::vm_counters::record_task_run();

        let outcome = {
            let mut dir = SchedulerDirectory {
                tasks: &mut self.tasks,
                suspended: &mut self.suspended,
                ready: &mut self.ready,
                next_task_id: &mut self.next_task_id,
                events: &mut self.events,
                connections: &self.connections,
            };
            run_task(&mut task, &mut self.world, &self.builtins, &mut dir, &mut self.options, &mut self.cache)
        };

        match outcome {
            TaskOutcome::Complete(_) | TaskOutcome::Killed => {
                // Dropped: nothing further to track for a finished task.
            }
            TaskOutcome::Error(exc) => {
                self.report_unhandled(&task, &exc);
            }
            TaskOutcome::Suspended(cond) => {
                task.state = TaskState::Suspended;
                if matches!(cond, WakeCondition::External) {
                    task.exec_suspended = true;
                }
                let id = task.id;
                self.suspended.insert(id, SuspendedTask { condition: cond });
                self.tasks.insert(id, task);
            }
        }
    }

    fn report_unhandled(&mut self, task: &Task, exc: &moor_var::Exception) {
        let target = task
            .frames
            .last()
            .map(|f| f.player)
            .filter(|p| *p != Objid::NOTHING)
            .unwrap_or(task.player);
        let mut lines = vec![format!("{}", exc)];
        lines.extend(exc.traceback.iter().cloned());
        for line in lines {
            self.events.push(NarrativeEvent::Notify { player: target, text: line });
        }
    }

    /// Drains accumulated `notify`/`boot_player` events for the connection layer to deliver.
    pub fn drain_events(&mut self) -> Vec<NarrativeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Posts a shutdown signal directly, the same one the `shutdown()` builtin posts, without
    /// going through a task -- used for OS-level shutdown (SIGINT/SIGTERM) rather than an in-world
    /// wizard calling the builtin.
    pub fn request_shutdown(&mut self, message: String) {
        self.events.push(NarrativeEvent::Shutdown { message });
    }

    /// Runs `task` outside the ready queue until it completes, is killed, or suspends. Used by
    /// the `;expr`/`--eval` synchronous path (spec.md §4.6 step 1), which has no later scheduler
    /// pass to resume into.
    pub fn run_task_to_completion(&mut self, mut task: Task) -> TaskOutcome {
        task.state = TaskState::Running;
        crate::vm::vm_counters::record_task_run();
        let mut dir = SchedulerDirectory {
            tasks: &mut self.tasks,
            suspended: &mut self.suspended,
            ready: &mut self.ready,
            next_task_id: &mut self.next_task_id,
            events: &mut self.events,
            connections: &self.connections,
        };
        run_task(&mut task, &mut self.world, &self.builtins, &mut dir, &mut self.options, &mut self.cache)
    }

    /// `resume(tid, v)` (spec.md §4.7), callable from outside a running task's own builtin
    /// context -- used by `SchedulerClient::resume` from the connection layer.
    pub fn resume_task(&mut self, perms: &Perms, tid: TaskId, value: Var) -> Result<(), Error> {
        let task = self.tasks.get_mut(&tid).ok_or(Error::E_INVARG)?;
        if !(perms.wizard || task.player == perms.who) {
            return Err(Error::E_PERM);
        }
        if task.state != TaskState::Suspended || task.exec_suspended {
            return Err(Error::E_INVARG);
        }
        self.suspended.remove(&tid);
        task.state = TaskState::Queued;
        if let Some(frame) = task.frames.last_mut() {
            frame.push(value);
        }
        self.ready.push_back(tid);
        Ok(())
    }

    /// `kill_task(tid)` (spec.md §4.7), callable from outside a running task's own builtin
    /// context.
    pub fn kill_task(&mut self, perms: &Perms, tid: TaskId) -> Result<(), Error> {
        let task = self.tasks.get_mut(&tid).ok_or(Error::E_INVARG)?;
        if !(perms.wizard || task.player == perms.who) {
            return Err(Error::E_PERM);
        }
        task.state = TaskState::Killed;
        self.suspended.remove(&tid);
        self.ready.retain(|t| *t != tid);
        self.tasks.remove(&tid);
        Ok(())
    }

    /// `queued_tasks()` (spec.md §4.5), callable from outside a running task's own builtin
    /// context.
    #[must_use]
    pub fn queued_tasks(&self, perms: &Perms) -> Vec<Var> {
        self.tasks.values().filter(|t| perms.wizard || t.player == perms.who).map(task_to_tuple).collect()
    }

    #[must_use]
    pub fn has_work(&self) -> bool {
        !self.ready.is_empty()
    }

    #[must_use]
    pub fn next_wake(&self) -> Option<Instant> {
        self.suspended.values().filter_map(SuspendedTask::wake_at).min()
    }
}
