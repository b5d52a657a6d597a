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

//! The bytecode stepper itself (spec.md §4.3 "Compiler / VM", §4.5 "Scheduler picks a ready task,
//! sets it `running`, steps it until suspend, completion, error, or tick/time exhaustion").
//!
//! `run_task` drains one task's ready budget in a plain loop; everything else here is either a
//! single `Op`'s handling (`step_one`) or a helper shared by several ops (`raise`, `do_verb_call`,
//! index/range access, scatter-assignment).

use std::sync::Arc;
use std::time::Instant;

use moor_common::model::{Perms, WorldStateError};
use moor_compiler::{
    ArgList, CatchCodes, ExceptArm, Name, Names, Op, Program, ScatterLabel,
};
use moor_var::{
    v_bool, v_err, v_float, v_int, v_list, v_map, v_none, v_obj, v_str, Error, Exception, Objid,
    Var, Variant,
};

use moor_db::WorldState;

use crate::builtins::{BuiltinContext, BuiltinOutcome, BuiltinRegistry};
use crate::command;
use crate::config::{approx_value_bytes, ServerOptions};
use crate::tasks::{Task, TaskDirectory, TaskKind, WakeCondition};
use crate::vm::activation::{HandlerFrame, HandlerKind, LoopState, ParkedOutcome, PendingBuiltin};
use crate::vm::program_cache::ProgramCache;
use crate::vm::vm_counters;
use crate::vm::Activation;

/// What running a task to its next stopping point produced (spec.md §4.5).
#[derive(Debug)]
pub enum TaskOutcome {
    Complete(Var),
    Killed,
    Error(Exception),
    Suspended(WakeCondition),
}

/// One step's local control-flow result, internal to the stepper.
enum Step {
    Continue,
    Done(TaskOutcome),
}

/// Builds the initial (sentinel) frame for a freshly submitted line of player input. Real command
/// resolution happens lazily on the task's first step (see `run_task`), once a `&WorldState` is
/// available -- this constructor deliberately takes none, so it can be called from the scheduler
/// client's request-handling thread before a task is even registered.
#[must_use]
pub fn input_frame(player: Objid, line: &str, _cache: &mut ProgramCache) -> Activation {
    let sentinel_program = Arc::new(Program {
        main_vector: vec![Op::ReturnNone],
        literals: vec![],
        var_names: Names::default(),
        line_number_spans: vec![],
        fork_vectors: vec![],
    });
    Activation::new(
        v_obj(player),
        player,
        player,
        Objid::NOTHING,
        "#command#".to_string(),
        Objid::NOTHING,
        vec![v_str(line)],
        true,
        sentinel_program,
    )
}

/// Builds a server-initiated frame calling `verb` on `receiver` with `args` -- the login hooks
/// (`do_login_command`, `user_connected`, `user_reconnected`, `user_disconnected`,
/// `user_client_disconnected`, `user_created`) all go through this (spec.md §4.6 "Server-invoked
/// hooks ... are called with their activation frames marked server_initiated").
pub fn hook_frame(
    world: &WorldState,
    receiver: Objid,
    verb: &str,
    args: Vec<Var>,
    cache: &mut ProgramCache,
) -> Result<Activation, Error> {
    let (defining, vd) = world.resolve_verb(receiver, verb)?;
    let program = cache.get_or_compile(vd.uuid, &vd.source).map_err(|_| Error::E_VERBNF)?;
    Ok(Activation::new(
        v_obj(receiver),
        Objid::NOTHING,
        vd.owner,
        Objid::NOTHING,
        verb.to_string(),
        defining,
        args,
        true,
        program,
    ))
}

/// Builds the frame for a `;expr`/`--eval` task (spec.md §4.6 step 1).
pub fn eval_frame(perms: Perms, source: &str, cache: &mut ProgramCache) -> Result<Activation, Exception> {
    let program = cache.compile_eval(source).map_err(|e| Exception {
        error: Error::E_INVARG,
        msg: e.to_string(),
        value: None,
        traceback: vec![],
    })?;
    Ok(Activation::new(
        v_obj(perms.who),
        perms.who,
        perms.who,
        perms.who,
        "eval".to_string(),
        Objid::NOTHING,
        vec![],
        true,
        program,
    ))
}

/// Runs `task` until it suspends, completes, errors, or is killed (spec.md §4.5). `options` is
/// `&mut` so `load_server_options()` can rebind the live config from within a running task.
pub fn run_task(
    task: &mut Task,
    world: &mut WorldState,
    builtins: &BuiltinRegistry,
    dir: &mut dyn TaskDirectory,
    options: &mut ServerOptions,
    cache: &mut ProgramCache,
) -> TaskOutcome {
    if task.kind == TaskKind::Input && task.frames.len() == 1 {
        let is_sentinel = task.frames[0].verb_name == "#command#" && task.frames[0].pc == 0;
        if is_sentinel {
            let line = task.frames[0].args.first().and_then(Var::as_str).unwrap_or("").to_string();
            match command::dispatch(world, task.player, &line, cache) {
                Ok(frame) => task.frames[0] = frame,
                Err(msg) => {
                    dir.notify(task.player, msg);
                    return TaskOutcome::Complete(v_int(0));
                }
            }
        }
    }

    loop {
        if task.ticks_left == 0 {
            return TaskOutcome::Error(quota_exception(task, "out of ticks"));
        }
        if Instant::now() >= task.deadline {
            return TaskOutcome::Error(quota_exception(task, "out of seconds"));
        }
        task.ticks_left -= 1;
        vm_counters::record_op();

        let Some(op) = task.frames.last().and_then(Activation::current_op).cloned() else {
            match pop_frame_return(task, world, v_int(0)) {
                Step::Continue => continue,
                Step::Done(outcome) => return outcome,
            }
        };

        match step_one(task, world, builtins, dir, options, cache, &op) {
            Step::Continue => {}
            Step::Done(outcome) => return outcome,
        }
    }
}

fn quota_exception(task: &Task, msg: &str) -> Exception {
    let traceback = task.frames.last().map(|f| vec![traceback_line(f)]).unwrap_or_default();
    Exception { error: Error::E_QUOTA, msg: msg.to_string(), value: None, traceback }
}

fn traceback_line(frame: &Activation) -> String {
    format!("#{}:{} (this == #{})", frame.verb_loc.0, frame.verb_name, frame.this.as_obj().map_or(-1, |o| o.0))
}

fn perms_for(task: &Task, world: &WorldState) -> Perms {
    let frame = task.frames.last().expect("perms_for called with no frames");
    let wizard = world
        .flags_of(frame.programmer)
        .is_ok_and(|f| f.contains(moor_common::flags::ObjFlag::Wizard));
    Perms::new(frame.programmer, wizard, true)
}

// ---------------------------------------------------------------------------------------------
// The main per-op dispatcher.
// ---------------------------------------------------------------------------------------------

#[allow(clippy::too_many_arguments, clippy::too_many_lines)]
fn step_one(
    task: &mut Task,
    world: &mut WorldState,
    builtins: &BuiltinRegistry,
    dir: &mut dyn TaskDirectory,
    options: &mut ServerOptions,
    cache: &mut ProgramCache,
    op: &Op,
) -> Step {
    let frame = task.frames.last_mut().expect("step_one called with no frames");
    frame.line_number = frame.program.line_at(frame.pc);

    macro_rules! advance {
        () => {{
            task.frames.last_mut().unwrap().pc += 1;
            Step::Continue
        }};
    }
    macro_rules! raise_here {
        ($err:expr, $msg:expr) => {
            raise(task, $err, $msg.to_string(), None)
        };
    }

    match op {
        Op::Imm(idx) => {
            let v = frame.program.literals[*idx].clone();
            frame.push(v);
            advance!()
        }
        Op::Pop => {
            frame.pop();
            advance!()
        }
        Op::Dup => {
            let v = frame.peek().clone();
            frame.push(v);
            advance!()
        }
        Op::Push(name) => {
            let v = frame.locals[name.0 as usize].clone();
            frame.push(v);
            advance!()
        }
        Op::Put(name) => {
            let v = frame.pop();
            frame.locals[name.0 as usize] = v;
            advance!()
        }

        Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod | Op::Pow | Op::Eq | Op::Ne | Op::Lt
        | Op::Le | Op::Gt | Op::Ge | Op::In | Op::BitAnd | Op::BitOr
        | Op::BitXor | Op::Shl | Op::Shr => {
            let b = frame.pop();
            let a = frame.pop();
            match eval_binop(op, &a, &b, options) {
                Ok(v) => {
                    frame.push(v);
                    advance!()
                }
                Err(e) => raise_here!(e, e.message()),
            }
        }

        Op::Neg => {
            let a = frame.pop();
            match a.variant() {
                Variant::Int(n) => {
                    frame.push(v_int(n.wrapping_neg()));
                    advance!()
                }
                Variant::Float(f) => {
                    frame.push(v_float(-f));
                    advance!()
                }
                _ => raise_here!(Error::E_TYPE, "Type mismatch"),
            }
        }
        Op::Not => {
            let a = frame.pop();
            frame.push(v_bool(!a.is_true()));
            advance!()
        }
        Op::BitNot => {
            let a = frame.pop();
            match a.as_int() {
                Some(n) => {
                    frame.push(v_int(!n));
                    advance!()
                }
                None => raise_here!(Error::E_TYPE, "Type mismatch"),
            }
        }

        Op::MakeList(al) => match collect_args(frame, al) {
            Ok(items) => {
                frame.push(v_list(items));
                advance!()
            }
            Err(()) => raise_here!(Error::E_TYPE, "Invalid splice"),
        },
        Op::MakeRange => {
            let to = frame.pop();
            let from = frame.pop();
            match (from.as_int(), to.as_int()) {
                (Some(lo), Some(hi)) => {
                    let items: Vec<Var> = (lo..=hi).map(v_int).collect();
                    frame.push(v_list(items));
                    advance!()
                }
                _ => raise_here!(Error::E_TYPE, "Type mismatch"),
            }
        }
        Op::MakeMap(n) => {
            let mut pairs = Vec::with_capacity(*n);
            for _ in 0..*n {
                let val = frame.pop();
                let key = frame.pop();
                pairs.push((key, val));
            }
            pairs.reverse();
            frame.push(v_map(pairs));
            advance!()
        }
        Op::MakeError(e) => {
            frame.push(v_err(*e));
            advance!()
        }

        Op::GetPropStatic(idx) => {
            let obj = frame.pop();
            let name = prop_name(frame, *idx);
            do_get_prop(task, world, &obj, &name)
        }
        Op::GetPropDynamic => {
            let name_val = frame.pop();
            let obj = frame.pop();
            let Some(name) = name_val.as_str().map(str::to_string) else {
                return raise_here!(Error::E_TYPE, "Type mismatch");
            };
            do_get_prop(task, world, &obj, &name)
        }
        Op::SetPropStatic(idx) => {
            let obj = frame.pop();
            let value = frame.pop();
            let name = prop_name(frame, *idx);
            do_set_prop(task, world, &obj, &name, value)
        }
        Op::SetPropDynamic => {
            let name_val = frame.pop();
            let obj = frame.pop();
            let value = frame.pop();
            let Some(name) = name_val.as_str().map(str::to_string) else {
                return raise_here!(Error::E_TYPE, "Type mismatch");
            };
            do_set_prop(task, world, &obj, &name, value)
        }

        Op::VerbCallStatic { verb_idx, args } => {
            let name = verb_name_literal(frame, *verb_idx);
            match collect_args(frame, args) {
                Ok(call_args) => {
                    let this = frame.pop();
                    do_verb_call(task, world, options, cache, this, &name, call_args, None)
                }
                Err(()) => raise_here!(Error::E_TYPE, "Invalid splice"),
            }
        }
        Op::VerbCallDynamic { args } => match collect_args(frame, args) {
            Ok(mut call_args) => {
                let name_val = frame.pop();
                let this = frame.pop();
                let Some(name) = name_val.as_str().map(str::to_string) else {
                    return raise_here!(Error::E_TYPE, "Type mismatch");
                };
                call_args.shrink_to_fit();
                do_verb_call(task, world, options, cache, this, &name, call_args, None)
            }
            Err(()) => raise_here!(Error::E_TYPE, "Invalid splice"),
        },
        Op::Pass { args } => match collect_args(frame, args) {
            Ok(call_args) => {
                let this = frame.this.clone();
                let verb_name = frame.verb_name.clone();
                let verb_loc = frame.verb_loc;
                do_verb_call(task, world, options, cache, this, &verb_name, call_args, Some(verb_loc))
            }
            Err(()) => raise_here!(Error::E_TYPE, "Invalid splice"),
        },

        Op::CallBuiltin { name_idx, args } => {
            let name = verb_name_literal(frame, *name_idx);
            match collect_args(frame, args) {
                Ok(call_args) => call_builtin(task, world, builtins, dir, options, cache, &name, call_args),
                Err(()) => raise_here!(Error::E_TYPE, "Invalid splice"),
            }
        }

        Op::Index => {
            let idx = frame.pop();
            let base = frame.pop();
            match index_get(&base, &idx) {
                Ok(v) => {
                    frame.push(v);
                    advance!()
                }
                Err(e) => raise_here!(e, e.message()),
            }
        }
        Op::IndexSet => {
            let idx = frame.pop();
            let base = frame.pop();
            let value = frame.pop();
            match index_set(&base, &idx, value) {
                Ok(v) => {
                    frame.push(v);
                    advance!()
                }
                Err(e) => raise_here!(e, e.message()),
            }
        }
        Op::RangeGet => {
            let hi = frame.pop();
            let lo = frame.pop();
            let base = frame.pop();
            match range_get(&base, &lo, &hi) {
                Ok(v) => {
                    frame.push(v);
                    advance!()
                }
                Err(e) => raise_here!(e, e.message()),
            }
        }
        Op::RangeSet => {
            let hi = frame.pop();
            let lo = frame.pop();
            let base = frame.pop();
            let value = frame.pop();
            match range_set(&base, &lo, &hi, value) {
                Ok(v) => {
                    frame.push(v);
                    advance!()
                }
                Err(e) => raise_here!(e, e.message()),
            }
        }

        Op::PushIndexContext => {
            let v = frame.pop();
            frame.index_context.push(v);
            advance!()
        }
        Op::PopIndexContext => {
            frame.index_context.pop();
            advance!()
        }
        Op::IndexFirst => {
            frame.push(v_int(1));
            advance!()
        }
        Op::IndexLast => {
            let len = frame.index_context.last().map_or(0, length_of);
            frame.push(v_int(len as i64));
            advance!()
        }

        Op::Jump(label) => {
            task.frames.last_mut().unwrap().pc = label.0;
            Step::Continue
        }
        Op::JumpIfFalse(label) => {
            let v = frame.pop();
            if v.is_true() {
                advance!()
            } else {
                task.frames.last_mut().unwrap().pc = label.0;
                Step::Continue
            }
        }
        Op::JumpIfTrue(label) => {
            let v = frame.pop();
            if v.is_true() {
                task.frames.last_mut().unwrap().pc = label.0;
                Step::Continue
            } else {
                advance!()
            }
        }
        Op::JumpIfFalseKeep(label) => {
            let v = frame.peek().clone();
            if v.is_true() {
                frame.pop();
                advance!()
            } else {
                task.frames.last_mut().unwrap().pc = label.0;
                Step::Continue
            }
        }
        Op::JumpIfTrueKeep(label) => {
            let v = frame.peek().clone();
            if v.is_true() {
                task.frames.last_mut().unwrap().pc = label.0;
                Step::Continue
            } else {
                frame.pop();
                advance!()
            }
        }

        Op::ForListBegin { value_name, key_name, exit } => {
            let list_val = frame.pop();
            let Some(items) = list_val.as_list().map(<[Var]>::to_vec) else {
                return raise_here!(Error::E_TYPE, "Type mismatch");
            };
            if items.is_empty() {
                task.frames.last_mut().unwrap().pc = exit.0;
                return Step::Continue;
            }
            let frame = task.frames.last_mut().unwrap();
            frame.locals[value_name.0 as usize] = items[0].clone();
            if let Some(kn) = key_name {
                frame.locals[kn.0 as usize] = v_int(1);
            }
            frame.loop_stack.push(LoopState::List {
                items: Arc::new(items),
                idx: 0,
                value_name: *value_name,
                key_name: *key_name,
            });
            frame.pc += 1;
            Step::Continue
        }
        Op::ForListNext { top, exit } => {
            let frame = task.frames.last_mut().unwrap();
            let Some(LoopState::List { items, idx, value_name, key_name }) = frame.loop_stack.last_mut() else {
                return raise_here!(Error::E_INVARG, "for-loop state mismatch");
            };
            *idx += 1;
            if *idx >= items.len() {
                frame.loop_stack.pop();
                frame.pc = exit.0;
                return Step::Continue;
            }
            let value = items[*idx].clone();
            let vn = *value_name;
            let kn = *key_name;
            let new_idx = *idx;
            frame.locals[vn.0 as usize] = value;
            if let Some(kn) = kn {
                frame.locals[kn.0 as usize] = v_int(new_idx as i64 + 1);
            }
            frame.pc = top.0;
            Step::Continue
        }
        Op::ForRangeBegin { value_name, exit } => {
            let to = frame.pop();
            let from = frame.pop();
            let (Some(lo), Some(hi)) = (from.as_int(), to.as_int()) else {
                return raise_here!(Error::E_TYPE, "Type mismatch");
            };
            if lo > hi {
                task.frames.last_mut().unwrap().pc = exit.0;
                return Step::Continue;
            }
            let frame = task.frames.last_mut().unwrap();
            frame.locals[value_name.0 as usize] = v_int(lo);
            frame.loop_stack.push(LoopState::Range { cur: lo, end: hi, value_name: *value_name });
            frame.pc += 1;
            Step::Continue
        }
        Op::ForRangeNext { top, exit } => {
            let frame = task.frames.last_mut().unwrap();
            let Some(LoopState::Range { cur, end, value_name }) = frame.loop_stack.last_mut() else {
                return raise_here!(Error::E_INVARG, "for-loop state mismatch");
            };
            *cur += 1;
            if *cur > *end {
                frame.loop_stack.pop();
                frame.pc = exit.0;
                return Step::Continue;
            }
            let v = *cur;
            let vn = *value_name;
            frame.locals[vn.0 as usize] = v_int(v);
            frame.pc = top.0;
            Step::Continue
        }

        Op::Return => {
            let value = frame.pop();
            do_return(task, world, value)
        }
        Op::ReturnNone => do_return(task, world, v_int(0)),

        Op::PushTryExcept { arms } => {
            let depth = frame.stack.len();
            frame.handlers.push(HandlerFrame { kind: HandlerKind::TryExcept(arms.clone()), stack_depth: depth });
            advance!()
        }
        Op::PushTryFinally { finally_pc } => {
            let depth = frame.stack.len();
            frame.handlers.push(HandlerFrame { kind: HandlerKind::TryFinally { finally_pc: *finally_pc }, stack_depth: depth });
            advance!()
        }
        Op::PushCatch { codes, handler_pc } => {
            let depth = frame.stack.len();
            frame.handlers.push(HandlerFrame {
                kind: HandlerKind::Catch { codes: codes.clone(), handler_pc: *handler_pc },
                stack_depth: depth,
            });
            advance!()
        }
        Op::PopHandler => {
            let popped = frame.handlers.pop();
            match popped {
                Some(HandlerFrame { kind: HandlerKind::TryFinally { finally_pc }, .. }) => {
                    let frame = task.frames.last_mut().unwrap();
                    frame.parked = None;
                    frame.pc = finally_pc;
                    Step::Continue
                }
                _ => advance!(),
            }
        }
        Op::EndFinally => {
            let parked = task.frames.last_mut().unwrap().parked.take();
            match parked {
                None => advance!(),
                Some(ParkedOutcome::Raise(err, msg, value)) => raise(task, err, msg, value),
                Some(ParkedOutcome::Return(v)) => do_return(task, world, v),
            }
        }

        Op::Scatter(sa) => {
            let list_val = frame.pop();
            let Some(items) = list_val.as_list().map(<[Var]>::to_vec) else {
                return raise_here!(Error::E_TYPE, "Type mismatch");
            };
            do_scatter(task, sa, &items)
        }

        Op::Fork { var, fork_vector } => {
            let fork_args = frame.args.clone();
            let new_task_id = dir.allocate_task_id();
            let child_frame = Activation::new_fork(
                frame.this.clone(),
                frame.player,
                frame.programmer,
                frame.caller,
                frame.verb_name.clone(),
                frame.verb_loc,
                fork_args,
                frame.program.clone(),
                *fork_vector,
                frame.locals.clone(),
            );
            let mut child = Task::new(new_task_id, frame.player, TaskKind::Forked, options, true);
            child.frames.push(child_frame);
            if let Some(vn) = var {
                frame.locals[vn.0 as usize] = v_int(new_task_id.0 as i64);
            }
            dir.enqueue_new_task(child);
            advance!()
        }

        Op::Done => match pop_frame_return(task, world, v_int(0)) {
            Step::Continue => Step::Continue,
            Step::Done(outcome) => Step::Done(outcome),
        },
    }
}

fn prop_name(frame: &Activation, idx: usize) -> String {
    frame.program.literals[idx].as_str().unwrap_or("").to_string()
}
fn verb_name_literal(frame: &Activation, idx: usize) -> String {
    frame.program.literals[idx].as_str().unwrap_or("").to_string()
}

// ---------------------------------------------------------------------------------------------
// Property access.
// ---------------------------------------------------------------------------------------------

fn do_get_prop(task: &mut Task, world: &mut WorldState, obj: &Var, name: &str) -> Step {
    let Some(oid) = obj.as_obj() else {
        return raise(task, Error::E_TYPE, "Type mismatch".to_string(), None);
    };
    let perms = perms_for(task, world);
    match world.resolve_property(oid, name) {
        Ok((propdef, value)) => {
            if !propdef.perms.contains(moor_common::flags::PropFlag::Read)
                && perms.who != propdef.owner
                && !perms.wizard
            {
                return raise(task, Error::E_PERM, "Permission denied".to_string(), None);
            }
            task.frames.last_mut().unwrap().push(value);
            task.frames.last_mut().unwrap().pc += 1;
            Step::Continue
        }
        Err(e) => {
            let msg = ws_err_msg(&e);
            raise(task, e.into(), msg, None)
        }
    }
}

fn do_set_prop(task: &mut Task, world: &mut WorldState, obj: &Var, name: &str, value: Var) -> Step {
    let Some(oid) = obj.as_obj() else {
        return raise(task, Error::E_TYPE, "Type mismatch".to_string(), None);
    };
    let perms = perms_for(task, world);
    match world.set_property(&perms, oid, name, value) {
        Ok(()) => {
            task.frames.last_mut().unwrap().pc += 1;
            Step::Continue
        }
        Err(e) => {
            let msg = ws_err_msg(&e);
            raise(task, e.into(), msg, None)
        }
    }
}

fn ws_err_msg(e: &WorldStateError) -> String {
    Error::from(e.clone()).message().to_string()
}

// ---------------------------------------------------------------------------------------------
// Verb calls, builtins.
// ---------------------------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn do_verb_call(
    task: &mut Task,
    world: &mut WorldState,
    options: &ServerOptions,
    cache: &mut ProgramCache,
    this: Var,
    verb_name: &str,
    call_args: Vec<Var>,
    pass_from: Option<Objid>,
) -> Step {
    let caller_frame = task.frames.last().expect("do_verb_call with no frame");
    let caller_this = caller_frame.this.clone();
    let caller_player = caller_frame.player;
    let caller_programmer = caller_frame.programmer;

    let resolved = if let Some(verb_loc) = pass_from {
        world.resolve_verb_from(verb_loc, verb_name)
    } else {
        let Some(oid) = this.as_obj() else {
            return raise(task, Error::E_TYPE, "Type mismatch".to_string(), None);
        };
        if !world.valid(oid) {
            return raise(task, Error::E_INVIND, "Invalid indirection".to_string(), None);
        }
        world.resolve_verb(oid, verb_name)
    };

    let (receiver, vd) = match resolved {
        Ok(pair) => pair,
        Err(_) => return raise(task, Error::E_VERBNF, "Verb not found".to_string(), None),
    };

    let caller_is_wizard = world
        .flags_of(caller_programmer)
        .is_ok_and(|f| f.contains(moor_common::flags::ObjFlag::Wizard));
    let allowed =
        vd.flags.contains(moor_common::flags::VerbFlag::Exec) || caller_programmer == vd.owner || caller_is_wizard;
    if !allowed {
        return raise(task, Error::E_PERM, "Permission denied".to_string(), None);
    }

    if task.frames.len() >= options.max_stack_depth {
        return raise(task, Error::E_MAXREC, "Too many verb calls".to_string(), None);
    }

    let program = match cache.get_or_compile(vd.uuid, &vd.source) {
        Ok(p) => p,
        Err(e) => return raise(task, Error::E_INVARG, e.to_string(), None),
    };

    let programmer = if vd.flags.contains(moor_common::flags::VerbFlag::Debug) {
        caller_programmer
    } else {
        vd.owner
    };

    let new_frame = Activation::new(
        if pass_from.is_some() { caller_this } else { this },
        caller_player,
        programmer,
        caller_frame.this.as_obj().unwrap_or(Objid::NOTHING),
        verb_name.to_string(),
        receiver,
        call_args,
        false,
        program,
    );
    task.frames.push(new_frame);
    Step::Continue
}

#[allow(clippy::too_many_arguments)]
fn call_builtin(
    task: &mut Task,
    world: &mut WorldState,
    builtins: &BuiltinRegistry,
    dir: &mut dyn TaskDirectory,
    options: &mut ServerOptions,
    cache: &mut ProgramCache,
    name: &str,
    call_args: Vec<Var>,
) -> Step {
    let Some(func) = builtins.get(name) else {
        return raise(task, Error::E_VERBNF, format!("unknown builtin {name}"), None);
    };
    let perms = perms_for(task, world);
    let outcome = {
        let mut ctx = BuiltinContext { world, perms, task, directory: dir, options, program_cache: cache };
        func(&mut ctx, call_args)
    };
    match outcome {
        BuiltinOutcome::Value(v) => {
            let frame = task.frames.last_mut().expect("frame vanished during builtin call");
            frame.push(v);
            frame.pc += 1;
            Step::Continue
        }
        BuiltinOutcome::Raise(e) => {
            let msg = e.message().to_string();
            raise(task, e, msg, None)
        }
        BuiltinOutcome::RaiseMsg(e, msg) => raise(task, e, msg, None),
        BuiltinOutcome::Suspend(cond) => Step::Done(TaskOutcome::Suspended(cond)),
        BuiltinOutcome::Kill => Step::Done(TaskOutcome::Killed),
        BuiltinOutcome::CallVerb { this, verb_name, args, then } => {
            let defined = this.as_obj().is_some_and(|oid| world.valid(oid) && world.resolve_verb(oid, &verb_name).is_ok());
            if !defined {
                return resume_pending_builtin(task, world, then);
            }
            match do_verb_call(task, world, options, cache, this, &verb_name, args, None) {
                Step::Continue => {
                    let len = task.frames.len();
                    debug_assert!(len >= 2, "CallVerb pushed a frame with no caller below it");
                    if len >= 2 {
                        task.frames[len - 2].pending_builtin = Some(then);
                    }
                    Step::Continue
                }
                other => other,
            }
        }
    }
}

// ---------------------------------------------------------------------------------------------
// Return / raise / unwinding.
// ---------------------------------------------------------------------------------------------

fn do_return(task: &mut Task, world: &mut WorldState, value: Var) -> Step {
    let frame = task.frames.last_mut().expect("do_return with no frame");
    let finally_pos = frame.handlers.iter().rposition(|h| matches!(h.kind, HandlerKind::TryFinally { .. }));
    if let Some(pos) = finally_pos {
        let HandlerKind::TryFinally { finally_pc } = frame.handlers[pos].kind else { unreachable!() };
        frame.handlers.truncate(pos);
        frame.stack.truncate(frame.handlers.last().map_or(0, |h| h.stack_depth));
        frame.parked = Some(ParkedOutcome::Return(value));
        frame.pc = finally_pc;
        return Step::Continue;
    }
    pop_frame_return(task, world, value)
}

fn pop_frame_return(task: &mut Task, world: &mut WorldState, value: Var) -> Step {
    task.frames.pop();
    match task.frames.last_mut() {
        Some(caller) => {
            if let Some(pending) = caller.pending_builtin.take() {
                return resume_pending_builtin(task, world, pending);
            }
            let caller = task.frames.last_mut().expect("frame vanished resuming builtin continuation");
            caller.push(value);
            caller.pc += 1;
            Step::Continue
        }
        None => Step::Done(TaskOutcome::Complete(value)),
    }
}

/// Finishes a builtin call that deferred onto a verb frame via `BuiltinOutcome::CallVerb`, now
/// that frame has returned (or was never pushed because no such verb was defined).
fn resume_pending_builtin(task: &mut Task, world: &mut WorldState, pending: PendingBuiltin) -> Step {
    match pending {
        PendingBuiltin::Recycle(victim, perms) => match world.recycle(&perms, victim) {
            Ok(()) => {
                let caller = task.frames.last_mut().expect("frame vanished resuming builtin continuation");
                caller.push(v_none());
                caller.pc += 1;
                Step::Continue
            }
            Err(e) => {
                let msg = ws_err_msg(&e);
                raise(task, e.into(), msg, None)
            }
        },
    }
}

/// Unwinds `task`'s call stack looking for a handler that catches `(error, msg, value)`,
/// appending a traceback line for every frame it passes through (spec.md §4.3 "Exception
/// handling"). Returns `Step::Done(TaskOutcome::Error(...))` if nothing catches it anywhere.
fn raise(task: &mut Task, error: Error, msg: String, value: Option<Var>) -> Step {
    let mut traceback = Vec::new();
    loop {
        let Some(frame) = task.frames.last_mut() else {
            return Step::Done(TaskOutcome::Error(Exception { error, msg, value, traceback }));
        };
        traceback.push(traceback_line(frame));

        let pos = frame.handlers.iter().rposition(|h| handler_catches(&h.kind, error));
        let Some(pos) = pos else {
            task.frames.pop();
            continue;
        };

        let kind = frame.handlers[pos].kind.clone();
        let stack_depth = frame.handlers[pos].stack_depth;
        frame.handlers.truncate(pos);
        frame.stack.truncate(stack_depth);

        match kind {
            HandlerKind::TryExcept(arms) => {
                let arm_idx = arms.iter().position(|a| catch_matches(&a.codes, error)).expect("handler_catches lied");
                let arm: &ExceptArm = &arms[arm_idx];
                if let Some(var) = arm.var {
                    frame.locals[var.0 as usize] = exception_tuple(error, &msg, &value, &traceback);
                }
                frame.pc = arm.handler_pc;
                return Step::Continue;
            }
            HandlerKind::Catch { handler_pc, .. } => {
                frame.push(exception_tuple(error, &msg, &value, &traceback));
                frame.pc = handler_pc;
                return Step::Continue;
            }
            HandlerKind::TryFinally { finally_pc } => {
                frame.parked = Some(ParkedOutcome::Raise(error, msg, value));
                frame.pc = finally_pc;
                return Step::Continue;
            }
        }
    }
}

fn handler_catches(kind: &HandlerKind, error: Error) -> bool {
    match kind {
        HandlerKind::TryExcept(arms) => arms.iter().any(|a| catch_matches(&a.codes, error)),
        HandlerKind::Catch { codes, .. } => catch_matches(codes, error),
        HandlerKind::TryFinally { .. } => true,
    }
}

fn catch_matches(codes: &CatchCodes, error: Error) -> bool {
    match codes {
        CatchCodes::Any => true,
        CatchCodes::Codes(list) => list.contains(&error),
    }
}

fn exception_tuple(error: Error, msg: &str, value: &Option<Var>, traceback: &[String]) -> Var {
    v_list(vec![
        v_err(error),
        v_str(msg),
        value.clone().unwrap_or_else(|| v_int(0)),
        v_list(traceback.iter().map(|s| v_str(s)).collect()),
    ])
}

// ---------------------------------------------------------------------------------------------
// Scatter assignment.
// ---------------------------------------------------------------------------------------------

fn do_scatter(task: &mut Task, sa: &moor_compiler::ScatterArgs, items: &[Var]) -> Step {
    let nrequired = sa.labels.iter().filter(|l| matches!(l, ScatterLabel::Required(_))).count();
    let has_rest = sa.labels.iter().any(|l| matches!(l, ScatterLabel::Rest(_)));
    if items.len() < nrequired || (!has_rest && items.len() > sa.labels.len()) {
        return raise(task, Error::E_ARGS, "Incorrect number of arguments".to_string(), None);
    }

    let noptional = sa.labels.iter().filter(|l| matches!(l, ScatterLabel::Optional(..))).count();
    let nextra = items.len().saturating_sub(nrequired);
    let mut opt_budget = nextra.min(noptional);

    let frame = task.frames.last_mut().unwrap();
    let mut idx = 0usize;
    let mut unfilled_optional_pc: Option<usize> = None;

    for label in &sa.labels {
        match label {
            ScatterLabel::Required(name) => {
                frame.locals[name.0 as usize] = items[idx].clone();
                idx += 1;
            }
            ScatterLabel::Optional(name, default_pc) => {
                if opt_budget > 0 {
                    frame.locals[name.0 as usize] = items[idx].clone();
                    idx += 1;
                    opt_budget -= 1;
                } else if unfilled_optional_pc.is_none() {
                    if let Some(pc) = default_pc {
                        unfilled_optional_pc = Some(pc.0);
                    }
                }
            }
            ScatterLabel::Rest(name) => {
                let rest: Vec<Var> = items[idx..].to_vec();
                frame.locals[name.0 as usize] = v_list(rest);
                idx = items.len();
            }
        }
    }

    frame.pc = unfilled_optional_pc.unwrap_or(sa.done.0);
    Step::Continue
}

// ---------------------------------------------------------------------------------------------
// Shared value-level helpers.
// ---------------------------------------------------------------------------------------------

fn collect_args(frame: &mut Activation, al: &ArgList) -> Result<Vec<Var>, ()> {
    let mut raw = Vec::with_capacity(al.count);
    for _ in 0..al.count {
        raw.push(frame.pop());
    }
    raw.reverse();
    let mut out = Vec::with_capacity(raw.len());
    for (i, v) in raw.into_iter().enumerate() {
        let splice = al.splice_mask.get(i).copied().unwrap_or(false);
        if splice {
            let Some(items) = v.as_list() else { return Err(()) };
            out.extend_from_slice(items);
        } else {
            out.push(v);
        }
    }
    Ok(out)
}

fn length_of(v: &Var) -> usize {
    match v.variant() {
        Variant::Str(s) => s.chars().count(),
        Variant::List(items) => items.len(),
        Variant::Map(pairs) => pairs.len(),
        _ => 0,
    }
}

fn eval_binop(op: &Op, a: &Var, b: &Var, options: &ServerOptions) -> Result<Var, Error> {
    match op {
        Op::Eq => return Ok(v_bool(a == b)),
        Op::Ne => return Ok(v_bool(a != b)),
        Op::Lt => return a.cmp_moo(b).map(|o| v_bool(o.is_lt())),
        Op::Le => return a.cmp_moo(b).map(|o| v_bool(o.is_le())),
        Op::Gt => return a.cmp_moo(b).map(|o| v_bool(o.is_gt())),
        Op::Ge => return a.cmp_moo(b).map(|o| v_bool(o.is_ge())),
        Op::In => {
            if let Some(items) = b.as_list() {
                return Ok(v_int(items.iter().position(|i| i == a).map_or(0, |p| p as i64 + 1)));
            }
            // `in` on a MAP reports "not found" rather than raising, regardless of whether the
            // key is actually present as one of the map's keys.
            if matches!(b.variant(), Variant::Map(_)) {
                return Ok(v_int(0));
            }
            return Err(Error::E_TYPE);
        }
        _ => {}
    }

    match (a.variant(), b.variant()) {
        (Variant::Str(sa), Variant::Str(sb)) if matches!(op, Op::Add) => {
            let combined_len = sa.len() + sb.len();
            if combined_len > options.max_string_concat {
                return Err(Error::E_QUOTA);
            }
            Ok(v_str(&format!("{sa}{sb}")))
        }
        (Variant::Int(ia), Variant::Int(ib)) => int_binop(op, *ia, *ib),
        (Variant::Float(fa), Variant::Float(fb)) => float_binop(op, *fa, *fb),
        (Variant::Int(ia), Variant::Float(fb)) => float_binop(op, *ia as f64, *fb),
        (Variant::Float(fa), Variant::Int(ib)) => float_binop(op, *fa, *ib as f64),
        _ => Err(Error::E_TYPE),
    }
}

fn int_binop(op: &Op, a: i64, b: i64) -> Result<Var, Error> {
    match op {
        Op::Add => Ok(v_int(a.wrapping_add(b))),
        Op::Sub => Ok(v_int(a.wrapping_sub(b))),
        Op::Mul => Ok(v_int(a.wrapping_mul(b))),
        Op::Div => {
            if b == 0 {
                Err(Error::E_DIV)
            } else {
                Ok(v_int(a.wrapping_div(b)))
            }
        }
        Op::Mod => {
            if b == 0 {
                Err(Error::E_DIV)
            } else {
                Ok(v_int(a.wrapping_rem(b)))
            }
        }
        Op::Pow => {
            if b < 0 {
                Err(Error::E_INVARG)
            } else {
                Ok(v_int(a.checked_pow(b as u32).unwrap_or(0)))
            }
        }
        Op::BitAnd => Ok(v_int(a & b)),
        Op::BitOr => Ok(v_int(a | b)),
        Op::BitXor => Ok(v_int(a ^ b)),
        Op::Shl => Ok(v_int(a.wrapping_shl(b as u32))),
        Op::Shr => Ok(v_int(a.wrapping_shr(b as u32))),
        _ => Err(Error::E_TYPE),
    }
}

fn float_binop(op: &Op, a: f64, b: f64) -> Result<Var, Error> {
    match op {
        Op::Add => Ok(v_float(a + b)),
        Op::Sub => Ok(v_float(a - b)),
        Op::Mul => Ok(v_float(a * b)),
        Op::Div => {
            if b == 0.0 {
                Err(Error::E_FLOAT)
            } else {
                Ok(v_float(a / b))
            }
        }
        Op::Mod => {
            if b == 0.0 {
                Err(Error::E_FLOAT)
            } else {
                Ok(v_float(a % b))
            }
        }
        Op::Pow => Ok(v_float(a.powf(b))),
        _ => Err(Error::E_TYPE),
    }
}

// ---------------------------------------------------------------------------------------------
// Index / range access (1-based, `Vec<char>` for Unicode-correct string indexing).
// ---------------------------------------------------------------------------------------------

fn index_get(base: &Var, idx: &Var) -> Result<Var, Error> {
    match base.variant() {
        Variant::Str(s) => {
            let i = idx.as_int().ok_or(Error::E_TYPE)?;
            let chars: Vec<char> = s.chars().collect();
            let pos = usize::try_from(i - 1).map_err(|_| Error::E_RANGE)?;
            chars.get(pos).map(|c| v_str(&c.to_string())).ok_or(Error::E_RANGE)
        }
        Variant::List(items) => {
            let i = idx.as_int().ok_or(Error::E_TYPE)?;
            let pos = usize::try_from(i - 1).map_err(|_| Error::E_RANGE)?;
            items.get(pos).cloned().ok_or(Error::E_RANGE)
        }
        Variant::Map(pairs) => pairs.iter().find(|(k, _)| k == idx).map(|(_, v)| v.clone()).ok_or(Error::E_RANGE),
        _ => Err(Error::E_TYPE),
    }
}

fn index_set(base: &Var, idx: &Var, value: Var) -> Result<Var, Error> {
    match base.variant() {
        Variant::Str(s) => {
            let i = idx.as_int().ok_or(Error::E_TYPE)?;
            let mut chars: Vec<char> = s.chars().collect();
            let pos = usize::try_from(i - 1).map_err(|_| Error::E_RANGE)?;
            if pos >= chars.len() {
                return Err(Error::E_RANGE);
            }
            let repl = value.as_str().ok_or(Error::E_TYPE)?;
            let repl_char = repl.chars().next().ok_or(Error::E_INVARG)?;
            chars[pos] = repl_char;
            Ok(v_str(&chars.into_iter().collect::<String>()))
        }
        Variant::List(items) => {
            let i = idx.as_int().ok_or(Error::E_TYPE)?;
            let mut items = items.as_ref().clone();
            let pos = usize::try_from(i - 1).map_err(|_| Error::E_RANGE)?;
            if pos >= items.len() {
                return Err(Error::E_RANGE);
            }
            items[pos] = value;
            Ok(v_list(items))
        }
        Variant::Map(pairs) => {
            let mut pairs = pairs.as_ref().clone();
            if let Some(slot) = pairs.iter_mut().find(|(k, _)| k == idx) {
                slot.1 = value;
            } else {
                pairs.push((idx.clone(), value));
            }
            Ok(v_map(pairs))
        }
        _ => Err(Error::E_TYPE),
    }
}

fn range_get(base: &Var, lo: &Var, hi: &Var) -> Result<Var, Error> {
    let lo = lo.as_int().ok_or(Error::E_TYPE)?;
    let hi = hi.as_int().ok_or(Error::E_TYPE)?;
    match base.variant() {
        Variant::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            if lo > hi {
                return Ok(v_str(""));
            }
            let (lo_u, hi_u) = clamp_range(lo, hi, chars.len())?;
            Ok(v_str(&chars[lo_u..=hi_u].iter().collect::<String>()))
        }
        Variant::List(items) => {
            if lo > hi {
                return Ok(v_list(vec![]));
            }
            let (lo_u, hi_u) = clamp_range(lo, hi, items.len())?;
            Ok(v_list(items[lo_u..=hi_u].to_vec()))
        }
        _ => Err(Error::E_TYPE),
    }
}

fn range_set(base: &Var, lo: &Var, hi: &Var, value: Var) -> Result<Var, Error> {
    let lo = lo.as_int().ok_or(Error::E_TYPE)?;
    let hi = hi.as_int().ok_or(Error::E_TYPE)?;
    match base.variant() {
        Variant::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let repl: Vec<char> = value.as_str().ok_or(Error::E_TYPE)?.chars().collect();
            let (lo_u, hi_u) = splice_bounds(lo, hi, chars.len())?;
            let mut out: Vec<char> = chars[..lo_u].to_vec();
            out.extend(repl);
            out.extend_from_slice(&chars[hi_u..]);
            Ok(v_str(&out.into_iter().collect::<String>()))
        }
        Variant::List(items) => {
            let repl = value.as_list().ok_or(Error::E_TYPE)?;
            let (lo_u, hi_u) = splice_bounds(lo, hi, items.len())?;
            let mut out: Vec<Var> = items[..lo_u].to_vec();
            out.extend_from_slice(repl);
            out.extend_from_slice(&items[hi_u..]);
            Ok(v_list(out))
        }
        _ => Err(Error::E_TYPE),
    }
}

/// 1-based inclusive bounds clamped into `[0, len)`; `lo > hi` is the caller's job to detect
/// before calling this (it would otherwise underflow).
fn clamp_range(lo: i64, hi: i64, len: usize) -> Result<(usize, usize), Error> {
    if lo < 1 || hi as usize > len {
        return Err(Error::E_RANGE);
    }
    Ok((usize::try_from(lo - 1).map_err(|_| Error::E_RANGE)?, usize::try_from(hi - 1).map_err(|_| Error::E_RANGE)?))
}

/// Splice bounds for range-assignment: `lo > hi` means "pure insert before `lo`", and indices may
/// run one past the end (growing the sequence) per classic MOO range-assignment semantics.
fn splice_bounds(lo: i64, hi: i64, len: usize) -> Result<(usize, usize), Error> {
    if lo < 1 || lo as usize > len + 1 {
        return Err(Error::E_RANGE);
    }
    let lo_u = usize::try_from(lo - 1).map_err(|_| Error::E_RANGE)?;
    if hi < lo - 1 {
        return Ok((lo_u, lo_u));
    }
    if hi as usize > len {
        return Err(Error::E_RANGE);
    }
    let hi_u = usize::try_from(hi).map_err(|_| Error::E_RANGE)?;
    Ok((lo_u, hi_u))
}
