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

//! The per-verb-call activation frame (spec.md §3 "Tasks and Frames"). A `Vec<Activation>` is
//! the entire call stack of a task; it, plus each frame's operand stack/locals/pc, is exactly
//! what a suspend captures as plain data (spec.md §9 "Coroutine-like suspend/resume").

use std::sync::Arc;

use std::sync::Arc as StdArc;

use moor_common::model::Perms;
use moor_compiler::{CatchCodes, Name, Op, Program};
use moor_var::{Error, Objid, Var};

/// State of one in-flight `for` loop, pushed by `ForListBegin`/`ForRangeBegin` and popped by the
/// matching `Next` op once exhausted. A stack (not a single slot) because loop bodies nest.
#[derive(Debug, Clone)]
pub enum LoopState {
    List {
        items: StdArc<Vec<Var>>,
        idx: usize,
        value_name: Name,
        key_name: Option<Name>,
    },
    Range {
        cur: i64,
        end: i64,
        value_name: Name,
    },
}

/// An exception handler or finally block awaiting a raise inside the current frame, innermost
/// last (spec.md §4.3 "Exception handling"). Kept as a stack per-frame because a frame's handler
/// scopes nest lexically within that one verb's bytecode.
#[derive(Debug, Clone)]
pub enum HandlerKind {
    /// `try/except`: one compiled arm per `except` clause.
    TryExcept(Vec<moor_compiler::ExceptArm>),
    /// `try/finally`: runs `finally_pc` on any unwind (raise, return, break/continue out of the
    /// guarded body), then resumes whatever outcome was parked.
    TryFinally { finally_pc: usize },
    /// A catch-expression's single implicit handler.
    Catch { codes: CatchCodes, handler_pc: usize },
}

#[derive(Debug, Clone)]
pub struct HandlerFrame {
    pub kind: HandlerKind,
    /// Operand-stack depth to restore to when this handler fires (everything pushed inside the
    /// guarded region above this point is discarded on unwind).
    pub stack_depth: usize,
}

/// An in-flight unwind reason parked by `PushTryFinally` while its `finally` body runs, and
/// resumed afterward unless the `finally` body itself produces a new one.
#[derive(Debug, Clone)]
pub enum ParkedOutcome {
    Raise(Error, String, Option<Var>),
    Return(Var),
}

/// Work a builtin asked the stepper to finish once a verb frame it pushed on its behalf returns
/// (spec.md §5 "Reentrancy": "push a frame and return control to it" is the one way a builtin may
/// run verb code without re-entering the stepper itself). Carried on the *caller's* frame -- the
/// one that was running the builtin -- and consumed by `pop_frame_return` instead of the ordinary
/// "push the return value, advance pc" handling.
#[derive(Debug, Clone)]
pub enum PendingBuiltin {
    /// `recycle(obj)`'s `:recycle` hook has returned (or there wasn't one); now actually destroy
    /// `obj` under the permissions `recycle()` was originally called with.
    Recycle(Objid, Perms),
}

/// One verb-call frame (spec.md §3 "ActivationFrame" table).
#[derive(Debug, Clone)]
pub struct Activation {
    pub this: Var,
    pub player: Objid,
    /// The permission identity whose rights gate this frame's property/verb access -- the verb
    /// owner, unless the verb is `d` (debug) in which case it's the caller's (spec.md GLOSSARY
    /// "Programmer / Wizard").
    pub programmer: Objid,
    pub caller: Objid,
    pub verb_name: String,
    /// The object that *defines* the verb, not the receiver (spec.md §4.3 "The top frame's
    /// `verb_loc` is the defining object, not the receiver").
    pub verb_loc: Objid,
    pub args: Vec<Var>,
    pub line_number: usize,
    /// Excludes this frame from `callers()` while still including it in tracebacks (spec.md §3,
    /// GLOSSARY "Server-initiated frame").
    pub server_initiated: bool,

    pub program: Arc<Program>,
    /// `None` runs `program.main_vector`; `Some(i)` runs `program.fork_vectors[i]` -- a task
    /// created by `fork (delay) ... endfork` runs its body as an independent instruction stream
    /// within the same compiled `Program` (spec.md §4.5 "fork... creates a new task whose code is
    /// `body`, inheriting the current environment").
    pub fork_vector: Option<usize>,
    pub pc: usize,
    pub stack: Vec<Var>,
    pub locals: Vec<Var>,
    pub handlers: Vec<HandlerFrame>,
    pub parked: Option<ParkedOutcome>,
    /// Stack of values currently in scope for `^`/`$` resolution inside nested `[ ]` brackets
    /// (spec.md §4.3 "String and list indexing is 1-based; `$` within `[...]` is length").
    pub index_context: Vec<Var>,
    /// Stack of in-flight `for` loops, innermost last (nested loops push one entry each).
    pub loop_stack: Vec<LoopState>,
    /// Set by `call_builtin` when `BuiltinOutcome::CallVerb` pushes a frame on this frame's
    /// behalf; consumed by `pop_frame_return` when that pushed frame returns here.
    pub pending_builtin: Option<PendingBuiltin>,
}

impl Activation {
    #[must_use]
    pub fn new(
        this: Var,
        player: Objid,
        programmer: Objid,
        caller: Objid,
        verb_name: String,
        verb_loc: Objid,
        args: Vec<Var>,
        server_initiated: bool,
        program: Arc<Program>,
    ) -> Self {
        let nlocals = program.var_names.len();
        Activation {
            this,
            player,
            programmer,
            caller,
            verb_name,
            verb_loc,
            args,
            line_number: 0,
            server_initiated,
            program,
            fork_vector: None,
            pc: 0,
            stack: Vec::new(),
            locals: vec![moor_var::v_int(0); nlocals],
            handlers: Vec::new(),
            parked: None,
            index_context: Vec::new(),
            loop_stack: Vec::new(),
            pending_builtin: None,
        }
    }

    /// Builds a frame for a forked task's body: same program, same compiled literals/var table
    /// (so locals line up), but stepping `fork_vectors[idx]` and starting from a copy of the
    /// parent's locals (spec.md §4.5 "inheriting the current environment").
    #[must_use]
    pub fn new_fork(
        this: Var,
        player: Objid,
        programmer: Objid,
        caller: Objid,
        verb_name: String,
        verb_loc: Objid,
        args: Vec<Var>,
        program: Arc<Program>,
        fork_vector: usize,
        locals: Vec<Var>,
    ) -> Self {
        Activation {
            this,
            player,
            programmer,
            caller,
            verb_name,
            verb_loc,
            args,
            line_number: 0,
            server_initiated: false,
            program,
            fork_vector: Some(fork_vector),
            pc: 0,
            stack: Vec::new(),
            locals,
            handlers: Vec::new(),
            parked: None,
            index_context: Vec::new(),
            loop_stack: Vec::new(),
            pending_builtin: None,
        }
    }

    fn code(&self) -> &[Op] {
        match self.fork_vector {
            None => &self.program.main_vector,
            Some(idx) => &self.program.fork_vectors[idx],
        }
    }

    pub fn current_op(&self) -> Option<&Op> {
        self.code().get(self.pc)
    }

    pub fn code_len(&self) -> usize {
        self.code().len()
    }

    pub fn push(&mut self, v: Var) {
        self.stack.push(v);
    }

    pub fn pop(&mut self) -> Var {
        self.stack.pop().expect("operand stack underflow")
    }

    pub fn peek(&self) -> &Var {
        self.stack.last().expect("operand stack underflow")
    }
}
