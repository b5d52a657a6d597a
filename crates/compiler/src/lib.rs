//! MOO source -> AST -> bytecode (spec.md §4.1-§4.3). `compile`/`compile_eval` are the single
//! path both synchronous verb invocation and command dispatch go through, per spec.md §4.3
//! ("Both synchronous verb invocation and command-dispatched invocation MUST go through the
//! same compilation path").

pub mod ast;
pub mod codegen;
pub mod decompile;
pub mod lexer;
pub mod opcode;
pub mod parser;

pub use ast::{BinaryOp, CatchCodes as AstCatchCodes, Expr, ForTarget, Program as AstProgram, Stmt, StmtKind, UnaryOp};
pub use codegen::{compile, compile_eval, CompileError};
pub use decompile::{disassemble, to_literal};
pub use lexer::{lex, LexError, LexedToken, Token};
pub use opcode::{ArgList, CatchCodes, ExceptArm, Label, Name, Names, Op, Program, ScatterArgs, ScatterLabel};
pub use parser::{parse_expression, parse_program, ParseError};
