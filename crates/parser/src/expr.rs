// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE, LICENSE.additional and CONTRIBUTING.

use zax_types::{
    dialect::{CpuSet, Dialect, Features, Gate},
    R_IX, R_IY, REG_A, REG_AF, REG_B, REG_BC, REG_C, REG_D, REG_DE, REG_E, REG_F, REG_H, REG_HL,
    REG_I, REG_IX, REG_IY, REG_L, REG_MB, REG_R, REG_SP,
};

use crate::{skip_space, ParseError};

/// Everything operand parsing needs from the surrounding assembler: the
/// dialect (register gating, GBZ80/SDCC quirks), the current section
/// offset (the value of `$`), and a view of the already-defined absolute
/// symbols, which fold to constants during parsing the way labels do
/// not.
pub struct ExprContext<'a> {
    pub dialect: &'a Dialect,
    pub here: i64,
    pub constants: Option<&'a dyn Fn(&str) -> Option<i64>>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// An operand expression. Register names parse into `Register` leaves so
/// that classification can recognize `(IX+d)` and reject registers buried
/// inside immediates. `Here` captures the section offset of `$` at parse
/// time.
#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Const(i64),
    Symbol(String),
    Here(i64),
    Register(u8),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn contains_register(&self) -> bool {
        match self {
            Expr::Register(_) => true,
            Expr::Unary(_, e) => e.contains_register(),
            Expr::Binary(_, lhs, rhs) => lhs.contains_register() || rhs.contains_register(),
            _ => false,
        }
    }

    /// Evaluate against a symbol resolver. `None` means the expression is
    /// not resolvable yet (undefined symbol, register leaf, division by
    /// zero) and must stay a relocation.
    pub fn eval(&self, resolve: &dyn Fn(&str) -> Option<i64>) -> Option<i64> {
        match self {
            Expr::Const(v) => Some(*v),
            Expr::Here(v) => Some(*v),
            Expr::Register(_) => None,
            Expr::Symbol(name) => resolve(name),
            Expr::Unary(op, e) => {
                let v = e.eval(resolve)?;
                Some(match op {
                    UnaryOp::Neg => v.wrapping_neg(),
                    UnaryOp::Not => !v,
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(resolve)?;
                let b = rhs.eval(resolve)?;
                eval_binary(*op, a, b)
            }
        }
    }

    /// Constant folding. Additive chains are reassociated so that the
    /// constant part of `IX+5+3` collects into a single term; this is what
    /// lets indexed canonicalization see `register + displacement` no
    /// matter how the source spelled it.
    pub fn fold(self) -> Expr {
        match self {
            Expr::Unary(op, e) => {
                let e = e.fold();
                if let (UnaryOp::Neg, Expr::Const(v)) = (op, &e) {
                    return Expr::Const(v.wrapping_neg());
                }
                if let (UnaryOp::Not, Expr::Const(v)) = (op, &e) {
                    return Expr::Const(!*v);
                }
                Expr::Unary(op, Box::new(e))
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = lhs.fold();
                let rhs = rhs.fold();
                if let (Expr::Const(a), Expr::Const(b)) = (&lhs, &rhs) {
                    if let Some(v) = eval_binary(op, *a, *b) {
                        return Expr::Const(v);
                    }
                }
                let folded = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
                if matches!(op, BinaryOp::Add | BinaryOp::Sub) {
                    reassociate_sum(folded)
                } else {
                    folded
                }
            }
            other => other,
        }
    }
}

fn eval_binary(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinaryOp::Add => Some(a.wrapping_add(b)),
        BinaryOp::Sub => Some(a.wrapping_sub(b)),
        BinaryOp::Mul => Some(a.wrapping_mul(b)),
        BinaryOp::Div => {
            if b == 0 {
                None
            } else {
                Some(a.wrapping_div(b))
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                None
            } else {
                Some(a.wrapping_rem(b))
            }
        }
        BinaryOp::And => Some(a & b),
        BinaryOp::Or => Some(a | b),
        BinaryOp::Xor => Some(a ^ b),
        BinaryOp::Shl => {
            if b < 0 {
                None
            } else if b >= 64 {
                Some(0)
            } else {
                Some(a.wrapping_shl(b as u32))
            }
        }
        BinaryOp::Shr => {
            if b < 0 {
                None
            } else {
                Some(a >> (b as u64).min(63))
            }
        }
    }
}

/// Flatten an additive chain into signed terms, sum the constants and
/// rebuild with the constant last.
fn reassociate_sum(expr: Expr) -> Expr {
    fn collect(expr: Expr, negate: bool, consts: &mut i64, terms: &mut Vec<(bool, Expr)>) {
        match expr {
            Expr::Const(v) => {
                *consts = consts.wrapping_add(if negate { v.wrapping_neg() } else { v });
            }
            Expr::Binary(BinaryOp::Add, lhs, rhs) => {
                collect(*lhs, negate, consts, terms);
                collect(*rhs, negate, consts, terms);
            }
            Expr::Binary(BinaryOp::Sub, lhs, rhs) => {
                collect(*lhs, negate, consts, terms);
                collect(*rhs, !negate, consts, terms);
            }
            Expr::Unary(UnaryOp::Neg, e) => collect(*e, !negate, consts, terms),
            other => terms.push((negate, other)),
        }
    }

    let mut consts = 0i64;
    let mut terms = vec![];
    collect(expr, false, &mut consts, &mut terms);

    let mut iter = terms.into_iter();
    let mut acc = match iter.next() {
        Some((false, e)) => e,
        Some((true, e)) => Expr::Unary(UnaryOp::Neg, Box::new(e)),
        None => return Expr::Const(consts),
    };
    for (negate, e) in iter {
        let op = if negate { BinaryOp::Sub } else { BinaryOp::Add };
        acc = Expr::Binary(op, Box::new(acc), Box::new(e));
    }
    if consts != 0 {
        acc = Expr::Binary(BinaryOp::Add, Box::new(acc), Box::new(Expr::Const(consts)));
    }
    acc
}

const IDX_HALF_GATE: Gate = Gate::class(
    CpuSet::EZ80.union(CpuSet::R800).union(CpuSet::Z80N),
    Features::IDX_HALF,
);

// Register names with their dialect gates. Lookup is case-insensitive; an
// entry whose gate is closed simply does not resolve, so the name falls
// back to an ordinary symbol.
const REGISTER_TABLE: &[(&str, u8, Gate)] = &[
    ("a", REG_A, Gate::ALL),
    ("af", REG_AF, Gate::ALL),
    ("b", REG_B, Gate::ALL),
    ("bc", REG_BC, Gate::ALL),
    ("c", REG_C, Gate::ALL),
    ("d", REG_D, Gate::ALL),
    ("de", REG_DE, Gate::ALL),
    ("e", REG_E, Gate::ALL),
    (
        "f",
        REG_F,
        Gate::class(CpuSet::Z80N.union(CpuSet::R800), Features::IN_F_C),
    ),
    ("h", REG_H, Gate::ALL),
    ("hl", REG_HL, Gate::ALL),
    ("i", REG_I, Gate::cpus(CpuSet::NOT_GBZ80)),
    ("ix", REG_IX, Gate::cpus(CpuSet::NOT_GBZ80)),
    ("ixh", REG_H | R_IX, IDX_HALF_GATE),
    ("ixl", REG_L | R_IX, IDX_HALF_GATE),
    ("iy", REG_IY, Gate::cpus(CpuSet::NOT_GBZ80)),
    ("iyh", REG_H | R_IY, IDX_HALF_GATE),
    ("iyl", REG_L | R_IY, IDX_HALF_GATE),
    ("l", REG_L, Gate::ALL),
    ("mb", REG_MB, Gate::cpus(CpuSet::EZ80)),
    ("r", REG_R, Gate::cpus(CpuSet::NOT_GBZ80)),
    ("sp", REG_SP, Gate::ALL),
];

pub fn lookup_register(name: &str, dialect: &Dialect) -> Option<u8> {
    REGISTER_TABLE
        .iter()
        .find(|(reg_name, _, gate)| name.eq_ignore_ascii_case(reg_name) && dialect.permits(*gate))
        .map(|(_, code, _)| *code)
}

/// Canonical name of a numeric local label: leading zeros dropped, `$`
/// appended.
pub fn numeric_label_name(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    let body = if trimmed.is_empty() { "0" } else { trimmed };
    format!("{}$", body)
}

pub fn is_name_beginner(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '.'
}

pub fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$'
}

/// Parse an expression, returning the tree (already folded) and the rest
/// of the input with trailing whitespace removed.
pub fn parse_expression<'a>(
    s: &'a str,
    ctx: &ExprContext,
) -> Result<(Expr, &'a str), ParseError> {
    let (expr, rest) = parse_bitor(skip_space(s), ctx)?;
    Ok((expr.fold(), skip_space(rest)))
}

fn parse_binary_chain<'a>(
    s: &'a str,
    ctx: &ExprContext,
    ops: &[(&str, BinaryOp)],
    next: fn(&'a str, &ExprContext) -> Result<(Expr, &'a str), ParseError>,
) -> Result<(Expr, &'a str), ParseError> {
    let (mut lhs, mut rest) = next(s, ctx)?;
    'outer: loop {
        let t = skip_space(rest);
        for (text, op) in ops {
            if let Some(tail) = t.strip_prefix(text) {
                let (rhs, tail) = next(skip_space(tail), ctx)?;
                lhs = Expr::Binary(*op, Box::new(lhs), Box::new(rhs));
                rest = tail;
                continue 'outer;
            }
        }
        return Ok((lhs, rest));
    }
}

fn parse_bitor<'a>(s: &'a str, ctx: &ExprContext) -> Result<(Expr, &'a str), ParseError> {
    parse_binary_chain(s, ctx, &[("|", BinaryOp::Or)], parse_bitxor)
}

fn parse_bitxor<'a>(s: &'a str, ctx: &ExprContext) -> Result<(Expr, &'a str), ParseError> {
    parse_binary_chain(s, ctx, &[("^", BinaryOp::Xor)], parse_bitand)
}

fn parse_bitand<'a>(s: &'a str, ctx: &ExprContext) -> Result<(Expr, &'a str), ParseError> {
    parse_binary_chain(s, ctx, &[("&", BinaryOp::And)], parse_shift)
}

fn parse_shift<'a>(s: &'a str, ctx: &ExprContext) -> Result<(Expr, &'a str), ParseError> {
    parse_binary_chain(
        s,
        ctx,
        &[("<<", BinaryOp::Shl), (">>", BinaryOp::Shr)],
        parse_additive,
    )
}

fn parse_additive<'a>(s: &'a str, ctx: &ExprContext) -> Result<(Expr, &'a str), ParseError> {
    parse_binary_chain(
        s,
        ctx,
        &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
        parse_term,
    )
}

fn parse_term<'a>(s: &'a str, ctx: &ExprContext) -> Result<(Expr, &'a str), ParseError> {
    parse_binary_chain(
        s,
        ctx,
        &[
            ("*", BinaryOp::Mul),
            ("/", BinaryOp::Div),
            ("%", BinaryOp::Mod),
        ],
        parse_unary,
    )
}

fn parse_unary<'a>(s: &'a str, ctx: &ExprContext) -> Result<(Expr, &'a str), ParseError> {
    let s = skip_space(s);
    if let Some(rest) = s.strip_prefix('-') {
        let (e, rest) = parse_unary(rest, ctx)?;
        return Ok((Expr::Unary(UnaryOp::Neg, Box::new(e)), rest));
    }
    if let Some(rest) = s.strip_prefix('~') {
        let (e, rest) = parse_unary(rest, ctx)?;
        return Ok((Expr::Unary(UnaryOp::Not, Box::new(e)), rest));
    }
    if let Some(rest) = s.strip_prefix('+') {
        return parse_unary(rest, ctx);
    }
    parse_primary(s, ctx)
}

fn parse_primary<'a>(s: &'a str, ctx: &ExprContext) -> Result<(Expr, &'a str), ParseError> {
    let s = skip_space(s);
    let mut chars = s.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return Err(ParseError::new("missing operand")),
    };

    if first == '(' {
        let (inner, rest) = parse_bitor(&s[1..], ctx)?;
        let rest = skip_space(rest);
        return match rest.strip_prefix(')') {
            Some(rest) => Ok((inner, rest)),
            None => Err(ParseError::new("mismatched parentheses")),
        };
    }

    if first == '$' {
        return Ok((Expr::Here(ctx.here), &s[1..]));
    }

    if first.is_ascii_digit() {
        return parse_number(s);
    }

    if is_name_beginner(first) {
        let len = s
            .find(|c: char| !is_name_char(c))
            .unwrap_or(s.len());
        let name = &s[..len];
        let rest = &s[len..];
        if let Some(code) = lookup_register(name, ctx.dialect) {
            return Ok((Expr::Register(code), rest));
        }
        if let Some(resolve) = ctx.constants {
            if let Some(value) = resolve(name) {
                return Ok((Expr::Const(value), rest));
            }
        }
        return Ok((Expr::Symbol(name.to_owned()), rest));
    }

    Err(ParseError::new("bad expression syntax"))
}

fn parse_number(s: &str) -> Result<(Expr, &str), ParseError> {
    // leading digit run first, so SDCC numeric labels like `00001$`
    // are recognized before radix prefixes
    let digits_len = s
        .find(|c: char| !(c.is_ascii_digit() || c == '_'))
        .unwrap_or(s.len());
    let after = &s[digits_len..];
    if let Some(tail) = after.strip_prefix('$') {
        if !tail.starts_with(is_name_char) {
            // numeric local label; leading zeros are not significant,
            // matching the padded definitions SDCC emits
            return Ok((Expr::Symbol(numeric_label_name(&s[..digits_len])), tail));
        }
    }

    let (radix, body) = if (s.starts_with("0x") || s.starts_with("0X")) && s.len() > 2 {
        (16, &s[2..])
    } else if (s.starts_with("0b") || s.starts_with("0B")) && s.len() > 2 {
        (2, &s[2..])
    } else {
        (10, s)
    };

    let len = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(body.len());
    let mut text = body[..len].to_owned();
    text.retain(|c| c != '_'); // remove underscores

    let value = u64::from_str_radix(&text, radix)
        .map_err(|_| ParseError::new("bad expression syntax"))?;
    Ok((Expr::Const(value as i64), &body[len..]))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use zax_types::dialect::{Cpu, Dialect};

    use super::*;

    fn parse(s: &str) -> Expr {
        let dialect = Dialect::default();
        let ctx = ExprContext {
            dialect: &dialect,
            here: 0x100,
            constants: None,
        };
        parse_expression(s, &ctx).unwrap().0
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse("42"), Expr::Const(42));
        assert_eq!(parse("0x1f"), Expr::Const(0x1f));
        assert_eq!(parse("0b1010"), Expr::Const(10));
        assert_eq!(parse("1_000"), Expr::Const(1000));
    }

    #[test]
    fn test_parse_precedence() {
        assert_eq!(parse("1+2*3"), Expr::Const(7));
        assert_eq!(parse("(1+2)*3"), Expr::Const(9));
        assert_eq!(parse("1|6&3"), Expr::Const(3));
        assert_eq!(parse("0x1234>>8"), Expr::Const(0x12));
        assert_eq!(parse("-3"), Expr::Const(-3));
    }

    #[test]
    fn test_parse_here() {
        assert_eq!(parse("$"), Expr::Here(0x100));
    }

    #[test]
    fn test_parse_here_keeps_additive_shape() {
        // `$` resolves late, so arithmetic around it stays an additive
        // chain rather than folding into a constant
        let e = parse("$+2");
        assert_eq!(
            e,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Here(0x100)),
                Box::new(Expr::Const(2))
            )
        );
    }

    #[test]
    fn test_parse_registers() {
        assert_eq!(parse("a"), Expr::Register(REG_A));
        assert_eq!(parse("HL"), Expr::Register(REG_HL));
        assert_eq!(parse("Ix"), Expr::Register(REG_IX));
    }

    #[test]
    fn test_register_gating() {
        let mut dialect = Dialect::default();
        dialect.cpu = Cpu::Gbz80;
        let ctx = ExprContext {
            dialect: &dialect,
            here: 0,
            constants: None,
        };
        // IX does not exist on the GameBoy Z80, the name parses as a symbol
        let (e, _) = parse_expression("ix", &ctx).unwrap();
        assert_eq!(e, Expr::Symbol("ix".to_owned()));
    }

    #[test]
    fn test_mb_requires_ez80() {
        assert_eq!(parse("mb"), Expr::Symbol("mb".to_owned()));

        let mut dialect = Dialect::default();
        dialect.cpu = Cpu::Ez80;
        let ctx = ExprContext {
            dialect: &dialect,
            here: 0,
            constants: None,
        };
        let (e, _) = parse_expression("mb", &ctx).unwrap();
        assert_eq!(e, Expr::Register(REG_MB));
    }

    #[test]
    fn test_reassociation_collects_constants() {
        assert_eq!(
            parse("ix+5+3"),
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Register(REG_IX)),
                Box::new(Expr::Const(8))
            )
        );
        assert_eq!(
            parse("ix-(-5)"),
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Register(REG_IX)),
                Box::new(Expr::Const(5))
            )
        );
    }

    #[test]
    fn test_numeric_label_reference() {
        assert_eq!(parse("00001$"), Expr::Symbol("1$".to_owned()));
        assert_eq!(parse("42$"), Expr::Symbol("42$".to_owned()));
    }

    #[test]
    fn test_eval_with_symbols() {
        let e = parse("start+2");
        let resolve = |name: &str| if name == "start" { Some(0x40) } else { None };
        assert_eq!(e.eval(&resolve), Some(0x42));
        assert_eq!(parse("undefined").eval(&|_| None), None);
    }

    #[test]
    fn test_contains_register() {
        assert!(parse("hl").contains_register());
        assert!(parse("ix+5").contains_register());
        assert!(!parse("5+3").contains_register());
    }
}
