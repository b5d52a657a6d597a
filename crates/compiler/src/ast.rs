//! The AST the parser produces (spec.md §4.2). The codegen module walks this to produce
//! bytecode; nothing downstream needs the raw token stream again.

use moor_common::matching::PrepSpec;
use moor_var::{Error, Var};

pub type Line = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum BinaryOp {
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
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

/// The code list of a `try/except` handler or a catch-expression: either `ANY` or a fixed set of
/// `E_*` expressions (spec.md §4.2 "codes is `ANY` or a comma list of `E_*`").
#[derive(Debug, Clone, PartialEq)]
pub enum CatchCodes {
    Any,
    Codes(Vec<Expr>),
}

/// One target of a scatter assignment (spec.md §4.2 "scatter assignment"): a required name, an
/// optional name with an optional default, or the single `@rest` catch-all.
#[derive(Debug, Clone, PartialEq)]
pub enum ScatterItem {
    Required(String),
    Optional(String, Option<Expr>),
    Rest(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),
    ObjLit(i64),
    ErrLit(Error),
    BoolLit(bool),
    Id(String),
    /// `$name` sugar for `#0.name` (spec.md §4.2).
    SysProp(String),
    List(Vec<ListItem>),
    /// `{a..b}` list-range literal.
    ListRange(Box<Expr>, Box<Expr>),
    Map(Vec<(Expr, Expr)>),
    Prop {
        obj: Box<Expr>,
        name: PropName,
    },
    VerbCall {
        obj: Box<Expr>,
        verb: PropName,
        args: Vec<ListItem>,
    },
    Index(Box<Expr>, Box<Expr>),
    Range(Box<Expr>, Box<Expr>, Box<Expr>),
    /// First-index (`^`) and last-index (`$`) markers, valid only inside `[ ]`.
    IndexStart,
    IndexEnd,
    Call {
        func: String,
        args: Vec<ListItem>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Scatter(Vec<ScatterItem>, Box<Expr>),
    Catch {
        expr: Box<Expr>,
        codes: CatchCodes,
        except: Option<Box<Expr>>,
    },
    Length,
}

/// Either a statically-known name (`obj.id`, `obj:verb(...)`) or a dynamically computed one
/// (`obj.(expr)`, `obj:(expr)(...)`).
#[derive(Debug, Clone, PartialEq)]
pub enum PropName {
    Literal(String),
    Dynamic(Box<Expr>),
}

/// A list/arg-list element: a plain expression or an `@expr` splice.
#[derive(Debug, Clone, PartialEq)]
pub enum ListItem {
    Normal(Expr),
    Splice(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForTarget {
    /// `for x in (expr)`
    List { var: String, index: Option<String>, expr: Expr },
    /// `for x in [start..end]`
    Range { var: String, start: Expr, end: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CondArm {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptArm {
    pub var: Option<String>,
    pub codes: CatchCodes,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// A bare string-literal expression statement, retained only so codegen can recognize and
    /// skip it for line-mapping purposes (spec.md §4.3 "docstrings"); never executed for effect.
    Docstring(String),
    Cond {
        arms: Vec<CondArm>,
        otherwise: Option<Vec<Stmt>>,
    },
    While {
        label: Option<String>,
        cond: Expr,
        body: Vec<Stmt>,
    },
    ForList {
        label: Option<String>,
        target: ForTarget,
        body: Vec<Stmt>,
    },
    Fork {
        var: Option<String>,
        delay: Expr,
        body: Vec<Stmt>,
    },
    TryExcept {
        body: Vec<Stmt>,
        excepts: Vec<ExceptArm>,
    },
    TryFinally {
        body: Vec<Stmt>,
        finally: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Break {
        label: Option<String>,
    },
    Continue {
        label: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: Line,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// A literal produced purely at parse time that the codegen turns straight into a `Var`
/// constant; kept here so `Expr::IntLit` et al. don't need to reach into `moor_var` directly at
/// every call site.
#[must_use]
pub fn literal_to_var(e: &Expr) -> Option<Var> {
    match e {
        Expr::IntLit(i) => Some(moor_var::v_int(*i)),
        Expr::FloatLit(f) => Some(moor_var::v_float(*f)),
        Expr::StrLit(s) => Some(moor_var::v_str(s)),
        Expr::ObjLit(o) => Some(moor_var::v_objid(*o)),
        Expr::ErrLit(err) => Some(moor_var::v_err(*err)),
        Expr::BoolLit(b) => Some(moor_var::v_bool(*b)),
        _ => None,
    }
}
