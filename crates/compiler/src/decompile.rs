//! Literal printing and opcode disassembly (spec.md §4.7 `toliteral`/`disassemble`). Grounded on
//! the teacher's `moor-lib/src/compiler/decompile.rs`, which reverses bytecode back to a
//! printable form for the same reason: a human (or `eval(toliteral(v))`) needs a textual
//! re-parseable rendering distinct from `Var`'s `Display` impl, which intentionally collapses
//! `LIST`/`MAP` to the bare words `{list}`/`[map]` (spec.md §9).

use moor_var::{Variant, Var};

use crate::opcode::{Names, Op, Program};

/// `toliteral(v)` (spec.md §4.7): unlike `tostr`, this recurses into `LIST`/`MAP` so that
/// `eval(toliteral(v)) == v` round-trips (spec.md §8 invariant 6).
#[must_use]
pub fn to_literal(v: &Var) -> String {
    match v.variant() {
        Variant::Int(i) => i.to_string(),
        Variant::Float(f) => format_float(*f),
        Variant::Str(s) => quote_string(s),
        Variant::Obj(o) => o.to_string(),
        Variant::Err(e) => e.to_string(),
        Variant::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Variant::List(items) => {
            let parts: Vec<String> = items.iter().map(to_literal).collect();
            format!("{{{}}}", parts.join(", "))
        }
        Variant::Map(pairs) => {
            let parts: Vec<String> = pairs
                .iter()
                .map(|(k, val)| format!("{} -> {}", to_literal(k), to_literal(val)))
                .collect();
            format!("[{}]", parts.join(", "))
        }
        Variant::Waif(_) => "*waif*".to_string(),
    }
}

fn format_float(f: f64) -> String {
    if f == f.trunc() && f.is_finite() {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `disassemble(verb)` (spec.md §4.7: "yields an opcode listing, not source"). One line per
/// instruction in `main_vector`, annotated with the source line where known.
#[must_use]
pub fn disassemble(program: &Program) -> Vec<String> {
    let mut lines = Vec::with_capacity(program.main_vector.len());
    for (pc, op) in program.main_vector.iter().enumerate() {
        let src_line = program.line_at(pc);
        lines.push(format!(
            "{pc:>5}: [line {src_line:>4}] {}",
            fmt_op(op, &program.var_names, &program.literals)
        ));
    }
    for (idx, fork) in program.fork_vectors.iter().enumerate() {
        lines.push(format!("-- fork vector {idx} --"));
        for (pc, op) in fork.iter().enumerate() {
            lines.push(format!("{pc:>5}: {}", fmt_op(op, &program.var_names, &program.literals)));
        }
    }
    lines
}

fn fmt_op(op: &Op, names: &Names, literals: &[Var]) -> String {
    match op {
        Op::Imm(idx) => format!("IMM {}", literals.get(*idx).map(to_literal).unwrap_or_default()),
        Op::Push(n) => format!("PUSH {}", names.name_of(*n)),
        Op::Put(n) => format!("PUT {}", names.name_of(*n)),
        other => format!("{other:?}"),
    }
}
