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

//! Compiled-verb cache, keyed by `VerbDef::uuid` (spec.md §4.3 "Verbs are lazily compiled on
//! first execution and cached"). Lives on the scheduler, not the object store, since `WorldState`
//! only holds source text -- a `set_verb_code` call invalidates the one entry affected.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use moor_compiler::{compile, compile_eval, CompileError, Program};

#[derive(Debug, Default)]
pub struct ProgramCache {
    by_verb: HashMap<Uuid, Arc<Program>>,
}

impl ProgramCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(&mut self, uuid: Uuid, source: &[String]) -> Result<Arc<Program>, CompileError> {
        if let Some(p) = self.by_verb.get(&uuid) {
            return Ok(p.clone());
        }
        let joined = source.join("\n");
        let program = Arc::new(compile(&joined)?);
        self.by_verb.insert(uuid, program.clone());
        Ok(program)
    }

    /// Forces recompilation on next use, e.g. after `set_verb_code` (spec.md §4.7 `set_verb_code`).
    pub fn invalidate(&mut self, uuid: Uuid) {
        self.by_verb.remove(&uuid);
    }

    /// One-off compile for an eval block (`;expr`, `--eval`), not cached by uuid since it has none.
    pub fn compile_eval(&self, source: &str) -> Result<Arc<Program>, CompileError> {
        Ok(Arc::new(compile_eval(source)?))
    }
}
