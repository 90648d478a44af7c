// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE, LICENSE.additional and CONTRIBUTING.

use zax_types::{REG_IX, REG_IY};

use crate::{
    expr::{parse_expression, BinaryOp, Expr, ExprContext, UnaryOp},
    skip_space, ParseError,
};

/// A classified operand.
///
/// `Indexed` is the canonical form of `(IX+d)` / `(IY+d)`: the index
/// register plus a displacement expression, no matter how the source
/// spelled the sum. `IndexSum` is the same shape without the outer
/// parentheses; only `LEA`/`PEA` accept it. `HlIncDec` is the GBZ80
/// post-increment/post-decrement form `(HL+)` / `(HL-)`.
#[derive(Debug, PartialEq, Clone)]
pub enum Operand {
    Register(u8),
    IndirectRegister(u8),
    Indexed { reg: u8, disp: Expr },
    IndexSum { reg: u8, disp: Expr },
    Immediate(Expr),
    MemoryAddress(Expr),
    HlIncDec(i8),
}

impl Operand {
    pub fn is_register(&self, code: u8) -> bool {
        matches!(self, Operand::Register(c) if *c == code)
    }
}

/// Whether the outermost parentheses enclose the whole expression up to
/// the following comma. Nested parentheses and quoted characters are
/// skipped.
pub fn is_indirect(s: &str) -> Result<bool, ParseError> {
    let b = s.as_bytes();
    let mut indir = b.first() == Some(&b'(');
    let mut depth = 0i32;
    let mut i = 0;

    while i < b.len() && b[i] != b',' {
        match b[i] {
            b'"' | b'\'' => {
                let quote = b[i];
                i += 1;
                while i < b.len() && b[i] != quote && b[i] != b'\n' {
                    if b[i] == b'\\' && i + 1 < b.len() {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    let mut j = i + 1;
                    while j < b.len() && (b[j] == b' ' || b[j] == b'\t') {
                        j += 1;
                    }
                    if j < b.len() && b[j] != b',' {
                        indir = false;
                    }
                    i = j - 1;
                }
                if depth < 0 {
                    return Err(ParseError::new("mismatched parentheses"));
                }
            }
            _ => {}
        }
        i += 1;
    }

    if depth != 0 {
        return Err(ParseError::new("mismatched parentheses"));
    }
    Ok(indir)
}

enum IndexSplit {
    NotIndexed,
    Indexed(u8, Expr),
    Conflict,
}

/// Find the single positively-signed IX/IY term of an additive chain and
/// rebuild everything else as the displacement. Any other register in the
/// chain makes the operand illegal.
fn split_index_sum(expr: &Expr) -> IndexSplit {
    fn collect(e: &Expr, negate: bool, regs: &mut Vec<(bool, u8)>, terms: &mut Vec<(bool, Expr)>) {
        match e {
            Expr::Binary(BinaryOp::Add, lhs, rhs) => {
                collect(lhs, negate, regs, terms);
                collect(rhs, negate, regs, terms);
            }
            Expr::Binary(BinaryOp::Sub, lhs, rhs) => {
                collect(lhs, negate, regs, terms);
                collect(rhs, !negate, regs, terms);
            }
            Expr::Unary(UnaryOp::Neg, inner) => collect(inner, !negate, regs, terms),
            Expr::Register(code) => regs.push((negate, *code)),
            other => terms.push((negate, other.clone())),
        }
    }

    let mut regs = vec![];
    let mut terms = vec![];
    collect(expr, false, &mut regs, &mut terms);

    if regs.is_empty() {
        return IndexSplit::NotIndexed;
    }
    let (negated, code) = regs[0];
    if regs.len() > 1 || negated || (code != REG_IX && code != REG_IY) {
        return IndexSplit::Conflict;
    }
    if terms.iter().any(|(_, t)| t.contains_register()) {
        return IndexSplit::Conflict;
    }

    let mut iter = terms.into_iter();
    let mut disp = match iter.next() {
        Some((false, e)) => e,
        Some((true, e)) => Expr::Unary(UnaryOp::Neg, Box::new(e)),
        None => return IndexSplit::Indexed(code, Expr::Const(0)),
    };
    for (negate, e) in iter {
        let op = if negate { BinaryOp::Sub } else { BinaryOp::Add };
        disp = Expr::Binary(op, Box::new(disp), Box::new(e));
    }
    IndexSplit::Indexed(code, disp.fold())
}

/// The GBZ80 post-increment/post-decrement operands `(HL+)` and `(HL-)`.
fn parse_hl_incdec(s: &str) -> Option<(i8, &str)> {
    let inner = skip_space(s.strip_prefix('(')?);
    let inner = if inner.len() >= 2 && inner[..2].eq_ignore_ascii_case("hl") {
        skip_space(&inner[2..])
    } else {
        return None;
    };
    let (step, inner) = match inner.as_bytes().first() {
        Some(b'+') => (1i8, skip_space(&inner[1..])),
        Some(b'-') => (-1i8, skip_space(&inner[1..])),
        _ => return None,
    };
    let rest = inner.strip_prefix(')')?;
    Some((step, skip_space(rest)))
}

/// Parse one operand without rewriting indexed sums into canonical form.
/// Used where an index register must not be folded away, e.g. `JP (IX)`.
pub fn parse_operand_not_indexed<'a>(
    s: &'a str,
    ctx: &ExprContext,
) -> Result<(Operand, &'a str), ParseError> {
    parse_operand_common(s, ctx, false)
}

/// Parse one operand, rewriting `±` of an index register into the
/// canonical indexed form.
pub fn parse_operand<'a>(
    s: &'a str,
    ctx: &ExprContext,
) -> Result<(Operand, &'a str), ParseError> {
    parse_operand_common(s, ctx, true)
}

fn parse_operand_common<'a>(
    s: &'a str,
    ctx: &ExprContext,
    unify: bool,
) -> Result<(Operand, &'a str), ParseError> {
    let s = skip_space(s);
    if s.is_empty() || s.starts_with(',') {
        return Err(ParseError::new("missing operand"));
    }

    // SDCC byte/word selection: `<expr` and `>expr` become right shifts
    // so that the data emitter can turn them into byte-select relocations
    let mut shift: Option<i64> = None;
    let mut body = s;
    if ctx.dialect.sdcc_compat {
        if let Some(rest) = s.strip_prefix('<') {
            shift = Some(0);
            body = skip_space(rest);
        } else if let Some(rest) = s.strip_prefix('>') {
            shift = Some(if ctx.dialect.is_adl() { 16 } else { 8 });
            body = skip_space(rest);
        }
    }

    let indirect = if shift.is_none() {
        is_indirect(body)?
    } else {
        false
    };

    if indirect && ctx.dialect.cpu == zax_types::dialect::Cpu::Gbz80 {
        if let Some((step, rest)) = parse_hl_incdec(body) {
            return Ok((Operand::HlIncDec(step), rest));
        }
    }

    let (expr, rest) = parse_expression(body, ctx)?;

    if let Some(amount) = shift {
        let wrapped = Expr::Binary(
            BinaryOp::Shr,
            Box::new(expr),
            Box::new(Expr::Const(amount)),
        )
        .fold();
        return Ok((Operand::Immediate(wrapped), rest));
    }

    let is_sum = matches!(expr, Expr::Binary(BinaryOp::Add | BinaryOp::Sub, _, _));
    let operand = if let Expr::Register(code) = expr {
        if indirect {
            if unify && (code == REG_IX || code == REG_IY) {
                Operand::Indexed {
                    reg: code,
                    disp: Expr::Const(0),
                }
            } else {
                Operand::IndirectRegister(code)
            }
        } else {
            Operand::Register(code)
        }
    } else if unify && is_sum {
        match split_index_sum(&expr) {
            IndexSplit::Indexed(reg, disp) => {
                if indirect {
                    Operand::Indexed { reg, disp }
                } else {
                    Operand::IndexSum { reg, disp }
                }
            }
            IndexSplit::Conflict => return Err(ParseError::new("illegal operand")),
            IndexSplit::NotIndexed => {
                if indirect {
                    Operand::MemoryAddress(expr)
                } else {
                    Operand::Immediate(expr)
                }
            }
        }
    } else if indirect {
        Operand::MemoryAddress(expr)
    } else {
        Operand::Immediate(expr)
    };

    // SDCC `n(reg)`: a constant immediately followed by an indirect
    // operand is re-interpreted as `(reg+n)`
    if ctx.dialect.sdcc_compat && unify {
        if let Operand::Immediate(Expr::Const(n)) = operand {
            if is_indirect(rest).unwrap_or(false) {
                let (inner, rest) = parse_operand_common(rest, ctx, true)?;
                return match inner {
                    Operand::Indexed {
                        reg,
                        disp: Expr::Const(0),
                    } => Ok((
                        Operand::Indexed {
                            reg,
                            disp: Expr::Const(n),
                        },
                        rest,
                    )),
                    _ => Err(ParseError::new("illegal operand")),
                };
            }
        }
    }

    Ok((operand, rest))
}
