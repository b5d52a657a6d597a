//! Bytecode emitted by `codegen` and executed by `moor-kernel`'s VM stepper (spec.md §4.3: "the
//! implementer may choose a tree-walking interpreter or a stack-bytecode VM"; grounded on the
//! teacher's `vm::opcode::{Op, Program}` shape, per `moor-lib/src/compiler/decompile.rs`).

use moor_var::{Error, Var};
use serde::{Deserialize, Serialize};

/// A local variable slot, resolved at compile time from an identifier to an index into the
/// activation frame's locals vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name(pub u16);

/// The interned variable-name table for a single `Program`, used for pretty-printing
/// (`disassemble()`) and error messages (`E_VARNF`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Names {
    pub names: Vec<String>,
}

impl Names {
    pub fn intern(&mut self, s: &str) -> Name {
        if let Some(pos) = self.names.iter().position(|n| n == s) {
            return Name(pos as u16);
        }
        self.names.push(s.to_string());
        Name((self.names.len() - 1) as u16)
    }

    #[must_use]
    pub fn find(&self, s: &str) -> Option<Name> {
        self.names.iter().position(|n| n == s).map(|p| Name(p as u16))
    }

    #[must_use]
    pub fn name_of(&self, n: Name) -> &str {
        &self.names[n.0 as usize]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A resolved offset into `Program::main_vector` (or a fork vector). Codegen back-patches these
/// once the jump target's real position is known, the way a single-pass assembler would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label(pub usize);

/// What a scatter-assignment target wants done with the next list element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScatterLabel {
    Required(Name),
    /// `?name` or `?name = default`; `default_pc` is where to jump to evaluate the default
    /// expression when the optional slot wasn't filled by the matched list.
    Optional(Name, Option<Label>),
    Rest(Name),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterArgs {
    pub labels: Vec<ScatterLabel>,
    /// Target once every binding (and any default expression) has run.
    pub done: Label,
}

/// How many operand-stack values a verb/builtin call or list/map literal consumes, and which of
/// them are `@expr` splices to be flattened rather than appended as a single element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgList {
    pub count: usize,
    pub splice_mask: Vec<bool>,
}

/// The fixed code-list of a `try/except` arm or catch-expression (spec.md §4.2: "codes is `ANY`
/// or a comma list of `E_*`"). Resolved to concrete codes at compile time, since the grammar
/// only accepts literal error codes here, never arbitrary runtime expressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CatchCodes {
    Any,
    Codes(Vec<Error>),
}

/// One bytecode instruction. A flat enum rather than an object hierarchy (spec.md §9: "Dynamic
/// dispatch -> a tagged value variant plus per-opcode dispatch" applies equally well to the
/// instruction stream).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Op {
    Imm(usize),
    Pop,
    Dup,
    Push(Name),
    Put(Name),

    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Neg,
    Not,
    BitNot,

    MakeList(ArgList),
    MakeRange,
    MakeMap(usize),
    MakeError(Error),

    GetPropStatic(usize),
    GetPropDynamic,
    SetPropStatic(usize),
    SetPropDynamic,

    VerbCallStatic { verb_idx: usize, args: ArgList },
    VerbCallDynamic { args: ArgList },
    Pass { args: ArgList },

    CallBuiltin { name_idx: usize, args: ArgList },

    Index,
    IndexSet,
    RangeGet,
    RangeSet,

    /// Pushes the indexable value atop the "index context" stack, for `^`/`$` resolution while
    /// compiling the bracketed expression; popped by `PopIndexContext`.
    PushIndexContext,
    PopIndexContext,
    /// `^` inside `[ ]`: push `1`.
    IndexFirst,
    /// `$` inside `[ ]`: push `length(top of index-context stack)`.
    IndexLast,

    Jump(Label),
    JumpIfFalse(Label),
    JumpIfTrue(Label),
    /// `&&`/`||`: peeks (does not pop) the condition; jumps without popping when it already
    /// decides the result, otherwise pops and continues into the right-hand operand.
    JumpIfFalseKeep(Label),
    JumpIfTrueKeep(Label),

    ForListBegin { value_name: Name, key_name: Option<Name>, exit: Label },
    ForListNext { top: Label, exit: Label },
    ForRangeBegin { value_name: Name, exit: Label },
    ForRangeNext { top: Label, exit: Label },

    Return,
    ReturnNone,

    /// Pushes an exception-handler frame active for the instructions that follow, until the
    /// matching `PopHandler`. On a raised error, the VM scans the current frame's handler stack
    /// innermost-first; the first `ExceptArm` whose `codes` match wins, binds `var` (to the
    /// ToastStunt 4-tuple) if given, and jumps to `handler_pc`.
    PushTryExcept { arms: Vec<ExceptArm> },
    /// Pushes a `finally` handler: on a raised error (or `return`/unwind) while active, the VM
    /// jumps to `finally_pc` with the in-flight outcome parked, runs the finally body, then
    /// (unless the finally body itself returned/raised/jumped out) resumes the parked outcome.
    PushTryFinally { finally_pc: usize },
    /// Pops the innermost handler frame; emitted at the natural (non-raising) end of a guarded
    /// body, and at the end of a handler/finally block.
    PopHandler,
    /// Marks the end of an inline `finally` block so the VM knows to resume whatever outcome
    /// (if any) was parked when it was entered via unwinding.
    EndFinally,

    /// Catch-expression guard: single implicit handler over the next instructions up to the
    /// matching `PopHandler`, jumping to `handler_pc` (which evaluates the `=> default` or
    /// pushes `0`) on a matching raise.
    PushCatch { codes: CatchCodes, handler_pc: usize },

    Scatter(ScatterArgs),

    Fork { var: Option<Name>, fork_vector: usize },

    Done,
}

/// One `except` arm compiled against a `try` body's handler frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptArm {
    pub codes: CatchCodes,
    pub var: Option<Name>,
    pub handler_pc: usize,
}

/// A compiled verb or eval block (spec.md §4.3 "Compiler / VM"). `main_vector` is the flat
/// instruction stream; `line_number_spans` maps `(pc, line)` pairs in ascending `pc` order,
/// built once at compile time skipping docstring-only statements so runtime never re-derives
/// lines from AST positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub main_vector: Vec<Op>,
    pub literals: Vec<Var>,
    pub var_names: Names,
    pub line_number_spans: Vec<(usize, usize)>,
    /// `fork` statement bodies, compiled as independent instruction streams; `Op::Fork` names
    /// the index of the body to run as a new task.
    pub fork_vectors: Vec<Vec<Op>>,
}

impl Program {
    #[must_use]
    pub fn line_at(&self, pc: usize) -> usize {
        let mut line = 0;
        for (span_pc, span_line) in &self.line_number_spans {
            if *span_pc > pc {
                break;
            }
            line = *span_line;
        }
        line
    }
}
