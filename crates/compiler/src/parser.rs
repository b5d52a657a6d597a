//! A hand-written Pratt (operator-precedence) parser (spec.md §4.2). MOO's catch-expression and
//! scatter-assignment forms don't fit a context-free grammar tool cleanly (the brace-delimited
//! scatter pattern is only distinguishable from a list literal by what follows the closing
//! brace), so this parser resolves them with targeted lookahead instead of a grammar generator.

use std::str::FromStr;

use thiserror::Error;

use moor_common::matching::PrepSpec;
use moor_var::Error as MooError;

use crate::ast::*;
use crate::lexer::{lex, Keyword, LexedToken, Punct, Token};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("lex error: {0}")]
    Lex(#[from] crate::lexer::LexError),
    #[error("unexpected token {0:?} at line {1}")]
    Unexpected(Token, usize),
    #[error("expected two adjacent statements to be separated by ';' at line {0}")]
    MissingSemicolon(usize),
    #[error("unknown error literal {0:?} at line {1}")]
    UnknownError(String, usize),
    #[error("invalid scatter target at line {0}")]
    InvalidScatter(usize),
}

pub fn parse_program(src: &str) -> Result<Program, ParseError> {
    let tokens = lex(src)?;
    let mut p = Parser { tokens, pos: 0 };
    let statements = p.parse_statements_until_eof()?;
    Ok(Program { statements })
}

/// Parses a single expression (used by the `;expr` REPL/eval form, spec.md §4.6 step 1).
pub fn parse_expression(src: &str) -> Result<Expr, ParseError> {
    let tokens = lex(src)?;
    let mut p = Parser { tokens, pos: 0 };
    p.parse_expr()
}

struct Parser {
    tokens: Vec<LexedToken>,
    pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum BraceItem {
    Normal(Expr),
    Splice(Expr),
    Optional(String, Option<Expr>),
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if *self.peek() == Token::Punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: Punct) -> Result<(), ParseError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(ParseError::Unexpected(self.peek().clone(), self.peek_line()))
        }
    }

    fn eat_keyword(&mut self, k: Keyword) -> bool {
        if *self.peek() == Token::Keyword(k) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, k: Keyword) -> Result<(), ParseError> {
        if self.eat_keyword(k) {
            Ok(())
        } else {
            Err(ParseError::Unexpected(self.peek().clone(), self.peek_line()))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Token::Ident(s) => Ok(s),
            t => Err(ParseError::Unexpected(t, self.peek_line())),
        }
    }

    /// An optional `label` after a loop-introducing keyword: `while label (cond)`. A bare
    /// identifier in that slot is a label only when directly followed by `(`.
    fn maybe_label(&mut self) -> Option<String> {
        if matches!(self.peek(), Token::Ident(_)) && *self.peek_at(1) == Token::Punct(Punct::LParen)
        {
            if let Token::Ident(s) = self.advance() {
                return Some(s);
            }
        }
        None
    }

    // ---- statements ------------------------------------------------------

    fn parse_statements_until(&mut self, terminators: &[Keyword]) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            if self.at_eof() {
                break;
            }
            if let Token::Keyword(k) = self.peek() {
                if terminators.contains(k) {
                    break;
                }
            }
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_statements_until_eof(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.at_eof() {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek_line();
        let kind = match self.peek() {
            Token::Keyword(Keyword::If) => self.parse_if()?,
            Token::Keyword(Keyword::While) => self.parse_while()?,
            Token::Keyword(Keyword::For) => self.parse_for()?,
            Token::Keyword(Keyword::Fork) => self.parse_fork()?,
            Token::Keyword(Keyword::Try) => self.parse_try()?,
            Token::Keyword(Keyword::Return) => {
                self.advance();
                let expr = if *self.peek() == Token::Punct(Punct::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_semi(line)?;
                StmtKind::Return(expr)
            }
            Token::Keyword(Keyword::Break) => {
                self.advance();
                let label = self.maybe_bare_ident();
                self.expect_semi(line)?;
                StmtKind::Break { label }
            }
            Token::Keyword(Keyword::Continue) => {
                self.advance();
                let label = self.maybe_bare_ident();
                self.expect_semi(line)?;
                StmtKind::Continue { label }
            }
            Token::Str(s) if *self.peek_at(1) == Token::Punct(Punct::Semi) => {
                let s = s.clone();
                self.advance();
                self.expect_semi(line)?;
                StmtKind::Docstring(s)
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect_semi(line)?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { kind, line })
    }

    fn maybe_bare_ident(&mut self) -> Option<String> {
        if let Token::Ident(_) = self.peek() {
            if let Token::Ident(s) = self.advance() {
                return Some(s);
            }
        }
        None
    }

    /// `;` is required after every expression statement, including at EOF (spec.md §4.2, verified
    /// behavior). Two adjacent expression-statements without a separating `;` is a parse error.
    fn expect_semi(&mut self, line: usize) -> Result<(), ParseError> {
        if self.eat_punct(Punct::Semi) {
            Ok(())
        } else {
            Err(ParseError::MissingSemicolon(line))
        }
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_keyword(Keyword::If)?;
        self.expect_punct(Punct::LParen)?;
        let cond = self.parse_expr()?;
        self.expect_punct(Punct::RParen)?;
        let body = self.parse_statements_until(&[Keyword::Elseif, Keyword::Else, Keyword::Endif])?;
        let mut arms = vec![CondArm { cond, body }];
        let mut otherwise = None;
        loop {
            if self.eat_keyword(Keyword::Elseif) {
                self.expect_punct(Punct::LParen)?;
                let cond = self.parse_expr()?;
                self.expect_punct(Punct::RParen)?;
                let body =
                    self.parse_statements_until(&[Keyword::Elseif, Keyword::Else, Keyword::Endif])?;
                arms.push(CondArm { cond, body });
            } else if self.eat_keyword(Keyword::Else) {
                otherwise = Some(self.parse_statements_until(&[Keyword::Endif])?);
                break;
            } else {
                break;
            }
        }
        self.expect_keyword(Keyword::Endif)?;
        Ok(StmtKind::Cond { arms, otherwise })
    }

    fn parse_while(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_keyword(Keyword::While)?;
        let label = self.maybe_label();
        self.expect_punct(Punct::LParen)?;
        let cond = self.parse_expr()?;
        self.expect_punct(Punct::RParen)?;
        let body = self.parse_statements_until(&[Keyword::Endwhile])?;
        self.expect_keyword(Keyword::Endwhile)?;
        Ok(StmtKind::While { label, cond, body })
    }

    fn parse_for(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_keyword(Keyword::For)?;
        let label = self.maybe_label();
        let var = self.expect_ident()?;
        let index = if self.eat_punct(Punct::Comma) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        self.expect_keyword(Keyword::In)?;
        let target = if self.eat_punct(Punct::LParen) {
            let e = self.parse_expr()?;
            self.expect_punct(Punct::RParen)?;
            ForTarget::List { var, index, expr: e }
        } else {
            self.expect_punct(Punct::LBracket)?;
            let start = self.parse_expr()?;
            self.expect_punct(Punct::DotDot)?;
            let end = self.parse_expr()?;
            self.expect_punct(Punct::RBracket)?;
            ForTarget::Range { var, start, end }
        };
        let body = self.parse_statements_until(&[Keyword::Endfor])?;
        self.expect_keyword(Keyword::Endfor)?;
        Ok(StmtKind::ForList { label, target, body })
    }

    fn parse_fork(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_keyword(Keyword::Fork)?;
        let var = self.maybe_bare_ident_before_paren();
        self.expect_punct(Punct::LParen)?;
        let delay = self.parse_expr()?;
        self.expect_punct(Punct::RParen)?;
        let body = self.parse_statements_until(&[Keyword::Endfork])?;
        self.expect_keyword(Keyword::Endfork)?;
        Ok(StmtKind::Fork { var, delay, body })
    }

    fn maybe_bare_ident_before_paren(&mut self) -> Option<String> {
        if matches!(self.peek(), Token::Ident(_)) {
            if let Token::Ident(s) = self.advance() {
                return Some(s);
            }
        }
        None
    }

    fn parse_try(&mut self) -> Result<StmtKind, ParseError> {
        self.expect_keyword(Keyword::Try)?;
        let body = self.parse_statements_until(&[Keyword::Except, Keyword::Finally, Keyword::Endtry])?;
        if *self.peek() == Token::Keyword(Keyword::Except) {
            let mut excepts = Vec::new();
            while self.eat_keyword(Keyword::Except) {
                let var = if matches!(self.peek(), Token::Ident(_))
                    && *self.peek_at(1) == Token::Punct(Punct::LParen)
                {
                    if let Token::Ident(s) = self.advance() {
                        Some(s)
                    } else {
                        None
                    }
                } else {
                    None
                };
                self.expect_punct(Punct::LParen)?;
                let codes = self.parse_catch_codes()?;
                self.expect_punct(Punct::RParen)?;
                let arm_body =
                    self.parse_statements_until(&[Keyword::Except, Keyword::Finally, Keyword::Endtry])?;
                excepts.push(ExceptArm {
                    var,
                    codes,
                    body: arm_body,
                });
            }
            self.expect_keyword(Keyword::Endtry)?;
            Ok(StmtKind::TryExcept { body, excepts })
        } else if self.eat_keyword(Keyword::Finally) {
            let finally = self.parse_statements_until(&[Keyword::Endtry])?;
            self.expect_keyword(Keyword::Endtry)?;
            Ok(StmtKind::TryFinally { body, finally })
        } else {
            self.expect_keyword(Keyword::Endtry)?;
            Ok(StmtKind::TryFinally { body, finally: vec![] })
        }
    }

    fn parse_catch_codes(&mut self) -> Result<CatchCodes, ParseError> {
        if self.eat_keyword(Keyword::Any) {
            return Ok(CatchCodes::Any);
        }
        let mut codes = vec![self.parse_expr()?];
        while self.eat_punct(Punct::Comma) {
            codes.push(self.parse_expr()?);
        }
        Ok(CatchCodes::Codes(codes))
    }

    // ---- expressions: precedence climbing --------------------------------
    // Lowest to highest (spec.md §4.2): assignment, ternary, ||, &&, |., ^., &., comparison,
    // shift, add/sub, mul/div/mod, power (right-assoc), unary, postfix. Catch-expressions and
    // scatter-assignment are delimiter-bounded primary forms, not infix operators, and are
    // resolved in `parse_primary`.

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_ternary()?;
        if *self.peek() == Token::Punct(Punct::Assign) {
            self.advance();
            let value = self.parse_assignment()?;
            return Ok(Expr::Assign {
                target: Box::new(lhs),
                value: Box::new(value),
            });
        }
        Ok(lhs)
    }

    /// `cond ? then | else`, right-associative.
    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_or()?;
        if self.eat_punct(Punct::Question) {
            let then_branch = self.parse_assignment()?;
            self.expect_punct(Punct::Pipe)?;
            let else_branch = self.parse_ternary()?;
            return Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then_branch),
                Box::new(else_branch),
            ));
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat_punct(Punct::OrOr) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_bitor()?;
        while self.eat_punct(Punct::AndAnd) {
            let rhs = self.parse_bitor()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_bitxor()?;
        while self.eat_punct(Punct::BOr) {
            let rhs = self.parse_bitxor()?;
            lhs = Expr::Binary(BinaryOp::BitOr, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_bitand()?;
        while self.eat_punct(Punct::BXor) {
            let rhs = self.parse_bitand()?;
            lhs = Expr::Binary(BinaryOp::BitXor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_cmp()?;
        while self.eat_punct(Punct::BAnd) {
            let rhs = self.parse_cmp()?;
            lhs = Expr::Binary(BinaryOp::BitAnd, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.peek() {
                Token::Punct(Punct::Eq) => BinaryOp::Eq,
                Token::Punct(Punct::Ne) => BinaryOp::Ne,
                Token::Punct(Punct::Lt) => BinaryOp::Lt,
                Token::Punct(Punct::Le) => BinaryOp::Le,
                Token::Punct(Punct::Gt) => BinaryOp::Gt,
                Token::Punct(Punct::Ge) => BinaryOp::Ge,
                Token::Keyword(Keyword::In) => BinaryOp::In,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek() {
                Token::Punct(Punct::Shl) => BinaryOp::Shl,
                Token::Punct(Punct::Shr) => BinaryOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_add()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Token::Punct(Punct::Plus) => BinaryOp::Add,
                Token::Punct(Punct::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_pow()?;
        loop {
            let op = match self.peek() {
                Token::Punct(Punct::Star) => BinaryOp::Mul,
                Token::Punct(Punct::Slash) => BinaryOp::Div,
                Token::Punct(Punct::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_pow()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// Right-associative: `2 ^ 3 ^ 2 == 2 ^ (3 ^ 2) == 512` (spec.md §8 scenario 1).
    fn parse_pow(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_unary()?;
        if self.eat_punct(Punct::Caret) {
            let rhs = self.parse_pow()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Token::Punct(Punct::Minus) => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)))
            }
            Token::Punct(Punct::Bang) => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)))
            }
            Token::Punct(Punct::BNot) => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::BitNot, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::Punct(Punct::Dot) => {
                    self.advance();
                    let name = self.parse_prop_name()?;
                    e = Expr::Prop {
                        obj: Box::new(e),
                        name,
                    };
                }
                Token::Punct(Punct::Colon) => {
                    self.advance();
                    let verb = self.parse_prop_name()?;
                    self.expect_punct(Punct::LParen)?;
                    let args = self.parse_list_items_until(Punct::RParen)?;
                    e = Expr::VerbCall {
                        obj: Box::new(e),
                        verb,
                        args,
                    };
                }
                Token::Punct(Punct::LBracket) => {
                    self.advance();
                    let first = self.parse_expr()?;
                    if self.eat_punct(Punct::DotDot) {
                        let second = self.parse_expr()?;
                        self.expect_punct(Punct::RBracket)?;
                        e = Expr::Range(Box::new(e), Box::new(first), Box::new(second));
                    } else {
                        self.expect_punct(Punct::RBracket)?;
                        e = Expr::Index(Box::new(e), Box::new(first));
                    }
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_prop_name(&mut self) -> Result<PropName, ParseError> {
        if self.eat_punct(Punct::LParen) {
            let e = self.parse_expr()?;
            self.expect_punct(Punct::RParen)?;
            Ok(PropName::Dynamic(Box::new(e)))
        } else {
            Ok(PropName::Literal(self.expect_ident()?))
        }
    }

    fn parse_list_items_until(&mut self, closer: Punct) -> Result<Vec<ListItem>, ParseError> {
        let mut items = Vec::new();
        if self.eat_punct(closer) {
            return Ok(items);
        }
        loop {
            if self.eat_punct(Punct::At) {
                items.push(ListItem::Splice(self.parse_assignment()?));
            } else {
                items.push(ListItem::Normal(self.parse_assignment()?));
            }
            if self.eat_punct(Punct::Comma) {
                continue;
            }
            self.expect_punct(closer)?;
            break;
        }
        Ok(items)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let line = self.peek_line();
        match self.advance() {
            Token::Int(i) => Ok(Expr::IntLit(i)),
            Token::Float(f) => Ok(Expr::FloatLit(f)),
            Token::Str(s) => Ok(Expr::StrLit(s)),
            Token::Obj(o) => Ok(Expr::ObjLit(o)),
            Token::ErrLit(name) => MooError::from_str(&name)
                .map(Expr::ErrLit)
                .map_err(|_| ParseError::UnknownError(name, line)),
            Token::Keyword(Keyword::True) => Ok(Expr::BoolLit(true)),
            Token::Keyword(Keyword::False) => Ok(Expr::BoolLit(false)),
            Token::Punct(Punct::Dollar) => {
                if matches!(self.peek(), Token::Ident(_)) {
                    let name = self.expect_ident()?;
                    Ok(Expr::SysProp(name))
                } else {
                    Ok(Expr::IndexEnd)
                }
            }
            Token::Punct(Punct::Caret) => Ok(Expr::IndexStart),
            Token::Punct(Punct::LParen) => {
                let e = self.parse_expr()?;
                self.expect_punct(Punct::RParen)?;
                Ok(e)
            }
            Token::Punct(Punct::LBrace) => self.parse_brace_expr(),
            Token::Punct(Punct::LBracket) => self.parse_map_expr(),
            Token::Punct(Punct::Backtick) => self.parse_catch_expr_form(),
            Token::Ident(name) => {
                if *self.peek() == Token::Punct(Punct::LParen) {
                    self.advance();
                    let args = self.parse_list_items_until(Punct::RParen)?;
                    Ok(Expr::Call { func: name, args })
                } else {
                    Ok(Expr::Id(name))
                }
            }
            t => Err(ParseError::Unexpected(t, line)),
        }
    }

    /// `` `expr ! codes => default' `` (spec.md §4.2). The inner `expr` parses at full assignment
    /// precedence so `` `x = y ! ANY' `` catches the whole assignment (spec.md §4.2 "Catch
    /// expressions bind at precedence PREC_ASSIGNMENT internally").
    fn parse_catch_expr_form(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_assignment()?;
        self.expect_punct(Punct::Bang)?;
        let codes = self.parse_catch_codes()?;
        let except = if self.eat_punct(Punct::FatArrow) {
            Some(Box::new(self.parse_assignment()?))
        } else {
            None
        };
        self.expect_punct(Punct::Quote)?;
        Ok(Expr::Catch {
            expr: Box::new(expr),
            codes,
            except,
        })
    }

    fn parse_map_expr(&mut self) -> Result<Expr, ParseError> {
        let mut pairs = Vec::new();
        if self.eat_punct(Punct::RBracket) {
            return Ok(Expr::Map(pairs));
        }
        loop {
            let k = self.parse_assignment()?;
            self.expect_punct(Punct::Arrow)?;
            let v = self.parse_assignment()?;
            pairs.push((k, v));
            if self.eat_punct(Punct::Comma) {
                continue;
            }
            self.expect_punct(Punct::RBracket)?;
            break;
        }
        Ok(Expr::Map(pairs))
    }

    /// Parses `{ ... }`, after the opening brace has been consumed: a list literal, a list-range
    /// literal (`{a..b}`), or — if the closing brace is immediately followed by `=` — a scatter
    /// assignment target (spec.md §4.2 "Scatter assignment"). A bare `{...}` can never itself be
    /// an lvalue, so that trailing `=` is an unambiguous signal, not a heuristic.
    fn parse_brace_expr(&mut self) -> Result<Expr, ParseError> {
        let line = self.peek_line();
        if self.eat_punct(Punct::RBrace) {
            return self.finish_brace(vec![], line);
        }
        let mut items = vec![self.parse_brace_item()?];
        if let BraceItem::Normal(first) = &items[0] {
            if self.eat_punct(Punct::DotDot) {
                let second = self.parse_assignment()?;
                self.expect_punct(Punct::RBrace)?;
                return Ok(Expr::ListRange(Box::new(first.clone()), Box::new(second)));
            }
        }
        while self.eat_punct(Punct::Comma) {
            if *self.peek() == Token::Punct(Punct::RBrace) {
                break;
            }
            items.push(self.parse_brace_item()?);
        }
        self.expect_punct(Punct::RBrace)?;
        self.finish_brace(items, line)
    }

    fn finish_brace(&mut self, items: Vec<BraceItem>, line: usize) -> Result<Expr, ParseError> {
        if *self.peek() == Token::Punct(Punct::Assign) {
            self.advance();
            let value = self.parse_assignment()?;
            let mut scatter = Vec::with_capacity(items.len());
            for item in items {
                scatter.push(match item {
                    BraceItem::Normal(Expr::Id(name)) => ScatterItem::Required(name),
                    BraceItem::Splice(Expr::Id(name)) => ScatterItem::Rest(name),
                    BraceItem::Optional(name, default) => ScatterItem::Optional(name, default),
                    _ => return Err(ParseError::InvalidScatter(line)),
                });
            }
            Ok(Expr::Scatter(scatter, Box::new(value)))
        } else {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                list.push(match item {
                    BraceItem::Normal(e) => ListItem::Normal(e),
                    BraceItem::Splice(e) => ListItem::Splice(e),
                    BraceItem::Optional(..) => return Err(ParseError::InvalidScatter(line)),
                });
            }
            Ok(Expr::List(list))
        }
    }

    fn parse_brace_item(&mut self) -> Result<BraceItem, ParseError> {
        if self.eat_punct(Punct::Question) {
            let name = self.expect_ident()?;
            let default = if self.eat_punct(Punct::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            Ok(BraceItem::Optional(name, default))
        } else if self.eat_punct(Punct::At) {
            Ok(BraceItem::Splice(self.parse_assignment()?))
        } else {
            Ok(BraceItem::Normal(self.parse_assignment()?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        parse_program(src).unwrap()
    }

    #[test]
    fn precedence_add_mul() {
        let prog = parse("return 1 + 2 * 3;");
        let StmtKind::Return(Some(e)) = &prog.statements[0].kind else { panic!() };
        assert_eq!(
            *e,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::IntLit(1)),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::IntLit(2)),
                    Box::new(Expr::IntLit(3))
                ))
            )
        );
    }

    #[test]
    fn pow_is_right_assoc() {
        let prog = parse("return 2 ^ 3 ^ 2;");
        let StmtKind::Return(Some(e)) = &prog.statements[0].kind else { panic!() };
        assert_eq!(
            *e,
            Expr::Binary(
                BinaryOp::Pow,
                Box::new(Expr::IntLit(2)),
                Box::new(Expr::Binary(
                    BinaryOp::Pow,
                    Box::new(Expr::IntLit(3)),
                    Box::new(Expr::IntLit(2))
                ))
            )
        );
    }

    #[test]
    fn missing_semicolon_is_rejected() {
        let err = parse_program("x = 1 y = 2;").unwrap_err();
        assert!(matches!(err, ParseError::MissingSemicolon(_)));
    }

    #[test]
    fn scatter_assignment() {
        let prog = parse("{a, ?b, ?c = 5, @rest} = x;");
        let StmtKind::Expr(Expr::Scatter(items, _)) = &prog.statements[0].kind else { panic!() };
        assert_eq!(
            items,
            &vec![
                ScatterItem::Required("a".into()),
                ScatterItem::Optional("b".into(), None),
                ScatterItem::Optional("c".into(), Some(Expr::IntLit(5))),
                ScatterItem::Rest("rest".into()),
            ]
        );
    }

    #[test]
    fn list_literal_vs_scatter() {
        let prog = parse("return {1, 2, 3};");
        let StmtKind::Return(Some(Expr::List(items))) = &prog.statements[0].kind else { panic!() };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn list_range_literal() {
        let prog = parse("return {1..5};");
        let StmtKind::Return(Some(e)) = &prog.statements[0].kind else { panic!() };
        assert_eq!(*e, Expr::ListRange(Box::new(Expr::IntLit(1)), Box::new(Expr::IntLit(5))));
    }

    #[test]
    fn sys_prop_sugar() {
        let prog = parse("return $foo;");
        let StmtKind::Return(Some(Expr::SysProp(name))) = &prog.statements[0].kind else { panic!() };
        assert_eq!(name, "foo");
    }

    #[test]
    fn verb_call_and_prop_access() {
        let prog = parse("return obj:verb(1, 2).prop;");
        let StmtKind::Return(Some(Expr::Prop { obj, name })) = &prog.statements[0].kind else {
            panic!()
        };
        assert_eq!(name, &PropName::Literal("prop".into()));
        assert!(matches!(**obj, Expr::VerbCall { .. }));
    }

    #[test]
    fn range_and_index() {
        let prog = parse("return x[1..$];");
        let StmtKind::Return(Some(Expr::Range(_, lo, hi))) = &prog.statements[0].kind else {
            panic!()
        };
        assert_eq!(**lo, Expr::IntLit(1));
        assert_eq!(**hi, Expr::IndexEnd);
    }

    #[test]
    fn catch_expression_binds_assignment() {
        let prog = parse("return `x = 1 ! ANY => 0';");
        let StmtKind::Return(Some(Expr::Catch { expr, codes, except })) =
            &prog.statements[0].kind
        else {
            panic!()
        };
        assert!(matches!(**expr, Expr::Assign { .. }));
        assert_eq!(*codes, CatchCodes::Any);
        assert!(except.is_some());
    }

    #[test]
    fn in_returns_binary_not_bool() {
        let prog = parse(r#"return "x" in {"a", "b"};"#);
        let StmtKind::Return(Some(e)) = &prog.statements[0].kind else { panic!() };
        assert!(matches!(e, Expr::Binary(BinaryOp::In, _, _)));
    }

    #[test]
    fn ternary_uses_pipe_not_colon() {
        let prog = parse("return x ? 1 | 2;");
        let StmtKind::Return(Some(e)) = &prog.statements[0].kind else { panic!() };
        assert_eq!(
            *e,
            Expr::Ternary(
                Box::new(Expr::Id("x".into())),
                Box::new(Expr::IntLit(1)),
                Box::new(Expr::IntLit(2)),
            )
        );
    }

    #[test]
    fn ternary_is_right_assoc() {
        let prog = parse("return a ? 1 | b ? 2 | 3;");
        let StmtKind::Return(Some(e)) = &prog.statements[0].kind else { panic!() };
        let Expr::Ternary(_, _, else_branch) = e else { panic!() };
        assert!(matches!(**else_branch, Expr::Ternary(..)));
    }
}
