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

//! A thread-safe handle onto a `Scheduler` running on its own thread (spec.md §5 "connection I/O
//! lives on the Tokio runtime and talks to the scheduler thread over a channel rather than
//! re-entering the stepper from async code"). `moor-net`'s connection tasks hold a cloned
//! `SchedulerClient`; only the scheduler's own thread ever touches `WorldState` directly.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use moor_common::model::Perms;
use moor_common::tasks::{NarrativeEvent, TaskId};
use moor_var::{Error, Objid, Var};

use moor_db::WorldState;

use crate::tasks::task::{Task, TaskKind};
use crate::tasks::Scheduler;
use crate::vm::exec::hook_frame;

/// One request the scheduler thread's event loop drains between run-ready passes.
enum Request {
    SubmitInput { player: Objid, line: String },
    SubmitEval { perms: Perms, source: String, reply: Sender<Result<Var, moor_var::Exception>> },
    Resume { perms: Perms, tid: TaskId, value: Var, reply: Sender<Result<(), Error>> },
    Kill { perms: Perms, tid: TaskId, reply: Sender<Result<(), Error>> },
    QueuedTasks { perms: Perms, reply: Sender<Vec<Var>> },
    /// Runs `#0:do_login_command(@words)` as a server-initiated task and reports the resulting
    /// player OBJ, if any (spec.md §4.8 "Login handshake").
    DoLoginCommand { words: Vec<String>, reply: Sender<Option<Objid>> },
    /// Fires one of the connection lifecycle hooks (`user_connected`, `user_reconnected`,
    /// `user_disconnected`, `user_client_disconnected`, `user_created`) fire-and-forget -- their
    /// return values aren't consumed by the reference protocol (spec.md §4.8).
    FireHook { receiver: Objid, verb: String, args: Vec<Var> },
    Connect { player: Objid, name: String, reply: Sender<bool> },
    Disconnect { player: Objid },
    RequestShutdown { message: String },
    Shutdown,
}

/// Cloneable front-end to a scheduler running on its own OS thread. Every method either enqueues
/// fire-and-forget work (`submit_input`) or blocks the calling (async) task on a oneshot reply
/// channel for calls that need a result (`eval`, `resume`, `kill`, `queued_tasks`) -- the
/// blocking is bounded by how long the scheduler takes to reach that request in its loop, which
/// for a non-overloaded server is on the order of one tick-budget's worth of stepping.
#[derive(Clone)]
pub struct SchedulerClient {
    requests: Sender<Request>,
    events: Receiver<NarrativeEvent>,
}

/// Runs the scheduler's main loop on the calling thread until `shutdown()` is called or the
/// request channel's last sender is dropped. Spawn this on a dedicated `std::thread` (not a
/// Tokio task -- the stepper is synchronous CPU-bound work, spec.md §5).
pub fn spawn(world: WorldState) -> (SchedulerClient, JoinHandle<WorldState>) {
    let (req_tx, req_rx) = bounded::<Request>(1024);
    let (ev_tx, ev_rx) = bounded::<NarrativeEvent>(4096);
    let handle = std::thread::Builder::new()
        .name("moor-scheduler".into())
        .spawn(move || run(world, req_rx, ev_tx))
        .expect("failed to spawn scheduler thread");
    (SchedulerClient { requests: req_tx, events: ev_rx }, handle)
}

fn run(world: WorldState, requests: Receiver<Request>, events: Sender<NarrativeEvent>) -> WorldState {
    let mut scheduler = Scheduler::new(world);
    loop {
        scheduler.wake_due_tasks();
        scheduler.run_ready();
        for ev in scheduler.drain_events() {
            // A full events channel means no one's listening any more; drop rather than block
            // the stepper on a connection layer that's gone away.
            let _ = events.try_send(ev);
        }

        let timeout = scheduler
            .next_wake()
            .map(|at| at.saturating_duration_since(std::time::Instant::now()))
            .filter(|d| !scheduler.has_work())
            .unwrap_or_else(|| Duration::from_millis(50));

        match requests.recv_timeout(timeout) {
            Ok(Request::Connect { player, name, reply }) => {
                let reconnect = scheduler.connection_established(player, name);
                let _ = reply.send(reconnect);
            }
            Ok(Request::Disconnect { player }) => {
                scheduler.connection_closed(player);
            }
            Ok(Request::RequestShutdown { message }) => {
                scheduler.request_shutdown(message);
                for ev in scheduler.drain_events() {
                    let _ = events.try_send(ev);
                }
            }
            Ok(Request::DoLoginCommand { words, reply }) => {
                let args = words.iter().map(|w| moor_var::v_str(w)).collect();
                let result = match hook_frame(&scheduler.world, Objid::SYSTEM_OBJECT, "do_login_command", args, &mut scheduler.cache) {
                    Ok(frame) => {
                        let tid = scheduler.new_task_id();
                        let mut task = Task::new(tid, Objid::NOTHING, TaskKind::Hook, &scheduler.options, false);
                        task.frames.push(frame);
                        match scheduler.run_task_to_completion(task) {
                            crate::vm::TaskOutcome::Complete(v) => v.as_obj().filter(|&o| scheduler.world.valid(o)),
                            _ => None,
                        }
                    }
                    Err(_) => None,
                };
                for ev in scheduler.drain_events() {
                    let _ = events.try_send(ev);
                }
                let _ = reply.send(result);
            }
            Ok(Request::FireHook { receiver, verb, args }) => {
                if let Ok(frame) = hook_frame(&scheduler.world, receiver, &verb, args, &mut scheduler.cache) {
                    let tid = scheduler.new_task_id();
                    let mut task = Task::new(tid, receiver, TaskKind::Hook, &scheduler.options, false);
                    task.frames.push(frame);
                    scheduler.run_task_to_completion(task);
                    for ev in scheduler.drain_events() {
                        let _ = events.try_send(ev);
                    }
                }
            }
            Ok(Request::SubmitInput { player, line }) => {
                scheduler.note_player_activity(player);
                let tid = scheduler.new_task_id();
                let mut task = Task::new(tid, player, TaskKind::Input, &scheduler.options, false);
                task.frames.push(crate::vm::exec::input_frame(player, &line, &mut scheduler.cache));
                scheduler.submit(task);
            }
            Ok(Request::SubmitEval { perms, source, reply }) => {
                let tid = scheduler.new_task_id();
                let mut task = Task::new(tid, perms.who, TaskKind::Eval, &scheduler.options, false);
                match crate::vm::exec::eval_frame(perms, &source, &mut scheduler.cache) {
                    Ok(frame) => {
                        task.frames.push(frame);
                        let outcome = scheduler.run_task_to_completion(task);
                        for ev in scheduler.drain_events() {
                            let _ = events.try_send(ev);
                        }
                        let result = match outcome {
                            crate::vm::TaskOutcome::Complete(v) => Ok(v),
                            crate::vm::TaskOutcome::Error(exc) => Err(exc),
                            crate::vm::TaskOutcome::Killed | crate::vm::TaskOutcome::Suspended(_) => {
                                Err(moor_var::Exception::from_error(Error::E_EXEC))
                            }
                        };
                        let _ = reply.send(result);
                    }
                    Err(exc) => {
                        let _ = reply.send(Err(exc));
                    }
                }
            }
            Ok(Request::Resume { perms, tid, value, reply }) => {
                let _ = reply.send(resume_via_directory(&mut scheduler, &perms, tid, value));
            }
            Ok(Request::Kill { perms, tid, reply }) => {
                let _ = reply.send(kill_via_directory(&mut scheduler, &perms, tid));
            }
            Ok(Request::QueuedTasks { perms, reply }) => {
                let _ = reply.send(queued_tasks_via_directory(&scheduler, &perms));
            }
            Ok(Request::Shutdown) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                break;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
        }
    }
    scheduler.world
}

// These three helpers reach into `Scheduler`'s private task table the same way `run_one` does,
// through a `SchedulerDirectory` borrow -- but that type is private to `scheduler.rs`, so instead
// we expose the equivalent operations as inherent methods there and just forward to them.
fn resume_via_directory(s: &mut Scheduler, perms: &Perms, tid: TaskId, value: Var) -> Result<(), Error> {
    s.resume_task(perms, tid, value)
}
fn kill_via_directory(s: &mut Scheduler, perms: &Perms, tid: TaskId) -> Result<(), Error> {
    s.kill_task(perms, tid)
}
fn queued_tasks_via_directory(s: &Scheduler, perms: &Perms) -> Vec<Var> {
    s.queued_tasks(perms)
}

impl SchedulerClient {
    /// Fire-and-forget: a line of input from a connected player becomes a new `Input` task next
    /// time the scheduler thread wakes (spec.md §4.6 "CreateTask(owner, code, limits)").
    pub fn submit_input(&self, player: Objid, line: String) {
        let _ = self.requests.send(Request::SubmitInput { player, line });
    }

    /// Blocks until the eval task has run to completion or raised (spec.md §4.6 step 1, `--eval`).
    pub fn eval(&self, perms: Perms, source: String) -> Result<Var, moor_var::Exception> {
        let (reply, rx) = bounded(1);
        if self.requests.send(Request::SubmitEval { perms, source, reply }).is_err() {
            return Err(moor_var::Exception::from_error(Error::E_EXEC));
        }
        rx.recv().unwrap_or_else(|_| Err(moor_var::Exception::from_error(Error::E_EXEC)))
    }

    pub fn resume(&self, perms: Perms, tid: TaskId, value: Var) -> Result<(), Error> {
        let (reply, rx) = bounded(1);
        if self.requests.send(Request::Resume { perms, tid, value, reply }).is_err() {
            return Err(Error::E_EXEC);
        }
        rx.recv().unwrap_or(Err(Error::E_EXEC))
    }

    pub fn kill(&self, perms: Perms, tid: TaskId) -> Result<(), Error> {
        let (reply, rx) = bounded(1);
        if self.requests.send(Request::Kill { perms, tid, reply }).is_err() {
            return Err(Error::E_EXEC);
        }
        rx.recv().unwrap_or(Err(Error::E_EXEC))
    }

    pub fn queued_tasks(&self, perms: Perms) -> Vec<Var> {
        let (reply, rx) = bounded(1);
        if self.requests.send(Request::QueuedTasks { perms, reply }).is_err() {
            return vec![];
        }
        rx.recv().unwrap_or_default()
    }

    /// Records a freshly logged-in connection (spec.md §4.8), called once the net layer has
    /// resolved which player object a new connection belongs to. Returns `true` if this player
    /// already had a live connection elsewhere (a reconnect, not a fresh connect).
    pub fn connect(&self, player: Objid, name: String) -> bool {
        let (reply, rx) = bounded(1);
        if self.requests.send(Request::Connect { player, name, reply }).is_err() {
            return false;
        }
        rx.recv().unwrap_or(false)
    }

    /// Runs `#0:do_login_command(@words)` and blocks for the resulting player OBJ, if the hook
    /// returned a valid one (spec.md §4.8 "Login handshake").
    pub fn do_login_command(&self, words: Vec<String>) -> Option<Objid> {
        let (reply, rx) = bounded(1);
        if self.requests.send(Request::DoLoginCommand { words, reply }).is_err() {
            return None;
        }
        rx.recv().ok().flatten()
    }

    /// Fires a connection lifecycle hook fire-and-forget (spec.md §4.8).
    pub fn fire_hook(&self, receiver: Objid, verb: &str, args: Vec<Var>) {
        let _ = self.requests.send(Request::FireHook { receiver, verb: verb.to_string(), args });
    }

    /// Reports that a connection has actually closed -- as opposed to `boot_player`, which only
    /// *asks* the net layer to close one.
    pub fn disconnect(&self, player: Objid) {
        let _ = self.requests.send(Request::Disconnect { player });
    }

    /// Posts the same `NarrativeEvent::Shutdown` the `shutdown()` builtin posts, for OS-signal
    /// driven shutdown (SIGINT/SIGTERM) rather than an in-world wizard invocation.
    pub fn request_shutdown(&self, message: String) {
        let _ = self.requests.send(Request::RequestShutdown { message });
    }

    /// Non-blocking drain of accumulated `notify`/disconnect events, called from the connection
    /// manager's own event loop (spec.md §4.8 "notify() emits a line to the player's connection").
    pub fn try_recv_event(&self) -> Option<NarrativeEvent> {
        self.events.try_recv().ok()
    }

    /// Blocks until an event is posted. Returns `None` once the scheduler thread has exited and
    /// dropped its event sender -- the connection manager's event-pump thread takes that as its
    /// own exit signal.
    pub fn recv_event_blocking(&self) -> Option<NarrativeEvent> {
        self.events.recv().ok()
    }

    /// Asks the scheduler thread's own request loop to exit (distinct from the `shutdown()`
    /// builtin, which only posts a `NarrativeEvent::Shutdown` for the connection manager to act
    /// on); callers join the thread afterward to reclaim the `WorldState` for a final checkpoint.
    pub fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown);
    }
}
