// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE, LICENSE.additional and CONTRIBUTING.

// The per-mnemonic encoders. Each takes the prefix/opcode pair from the
// dispatch table and the operand tail, validates the operand combination
// against the dialect, writes the opcode bytes and returns the unparsed
// rest of the line.

use zax_parser::{
    expr::{BinaryOp, Expr},
    operand::Operand,
};
use zax_types::{
    dialect::{CpuSet, Features},
    index_prefix, RelocKind, R_ARITH, R_INDEX, R_IX, R_IY, R_STACKABLE, REG_A, REG_AF, REG_B,
    REG_BC, REG_C, REG_D, REG_DE, REG_E, REG_F, REG_H, REG_HL, REG_I, REG_IX, REG_IY, REG_L,
    REG_MB, REG_R, REG_SP,
};

use crate::{fragment::Fixup, table::parse_condition, Assembler};

const EZ80_R800_Z80N: CpuSet = CpuSet::EZ80.union(CpuSet::R800).union(CpuSet::Z80N);
const R800_Z80N: CpuSet = CpuSet::R800.union(CpuSet::Z80N);

const IXH: u8 = REG_H | R_IX;
const IXL: u8 = REG_L | R_IX;
const IYH: u8 = REG_H | R_IY;
const IYL: u8 = REG_L | R_IY;

/// Operand-less mnemonics: one or two opcode bytes.
pub(crate) fn emit_insn<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    if prefix != 0 {
        asm.emit_bytes(&[prefix, opcode]);
    } else {
        asm.emit_bytes(&[opcode]);
    }
    args
}

/// The operand m: r, (HL), (II+d); with no prefix also IXH/IXL/IYH/IYL.
fn emit_mx(asm: &mut Assembler, prefix: u8, opcode: u8, shift: u8, op: &Operand) {
    match op {
        Operand::IndirectRegister(code) => {
            if *code != REG_HL {
                asm.ill_op();
                return;
            }
            let byte = opcode.wrapping_add(6 << shift);
            if prefix != 0 {
                asm.emit_bytes(&[prefix, byte]);
            } else {
                asm.emit_bytes(&[byte]);
            }
        }
        Operand::Register(code) => {
            let mut rnum = *code;
            let mut prefix = prefix;
            if prefix == 0 && rnum & R_INDEX != 0 {
                prefix = index_prefix(rnum);
                if !asm.dialect.is(EZ80_R800_Z80N) {
                    asm.check_feature(Features::IDX_HALF);
                }
                rnum &= !R_INDEX;
            }
            if rnum > 7 {
                asm.ill_op();
                return;
            }
            let byte = opcode.wrapping_add(rnum << shift);
            if prefix != 0 {
                asm.emit_bytes(&[prefix, byte]);
            } else {
                asm.emit_bytes(&[byte]);
            }
        }
        Operand::Indexed { reg, disp } => {
            if asm.dialect.is(CpuSet::GBZ80) {
                asm.ill_op();
                return;
            }
            let ii = index_prefix(*reg);
            let byte = opcode.wrapping_add(6 << shift);
            if prefix != 0 {
                // DD/FD CB d oo
                asm.emit_bytes(&[ii, prefix]);
                asm.emit_byte_expr(disp, RelocKind::Disp8);
                asm.emit_bytes(&[byte]);
            } else {
                asm.emit_bytes(&[ii, byte]);
                asm.emit_byte_expr(disp, RelocKind::Disp8);
            }
        }
        _ => asm.ill_op(),
    }
}

/// m as above, used by BIT where the store-back form is not legal.
fn emit_m<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((op, rest)) = asm.parse_op(args) else {
        return args;
    };
    match op {
        Operand::Register(_)
        | Operand::IndirectRegister(_)
        | Operand::Indexed { .. }
        | Operand::HlIncDec(_) => emit_mx(asm, prefix, opcode, 0, &op),
        _ => asm.ill_op(),
    }
    rest
}

/// m, or the undocumented store-back form `op (II+d),r`.
pub(crate) fn emit_mr<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((op, rest)) = asm.parse_op(args) else {
        return args;
    };
    match op {
        Operand::Indexed { .. } => {
            let mut opcode = opcode;
            let mut rest = rest;
            if let Some(tail) = rest.strip_prefix(',') {
                let Some((reg_op, r2)) = asm.parse_op(tail) else {
                    return rest;
                };
                rest = r2;
                match reg_op {
                    Operand::Register(r) if r < 8 => {
                        opcode = opcode.wrapping_add(r).wrapping_sub(6);
                    }
                    _ => {
                        asm.ill_op();
                        return rest;
                    }
                }
                if !asm.dialect.is(CpuSet::Z80N) {
                    asm.check_feature(Features::ROT_II_LD);
                }
            }
            emit_mx(asm, prefix, opcode, 0, &op);
            rest
        }
        Operand::Register(_) | Operand::IndirectRegister(_) | Operand::HlIncDec(_) => {
            emit_mx(asm, prefix, opcode, 0, &op);
            rest
        }
        _ => {
            asm.ill_op();
            rest
        }
    }
}

fn emit_sx(asm: &mut Assembler, prefix: u8, opcode: u8, op: &Operand) {
    match op {
        Operand::Register(_)
        | Operand::IndirectRegister(_)
        | Operand::Indexed { .. }
        | Operand::HlIncDec(_) => emit_mx(asm, prefix, opcode, 0, op),
        Operand::Immediate(e) => {
            let byte = opcode ^ 0x46;
            if prefix != 0 {
                asm.emit_bytes(&[prefix, byte]);
            } else {
                asm.emit_bytes(&[byte]);
            }
            asm.emit_byte_expr(e, RelocKind::Abs8);
        }
        _ => asm.ill_op(),
    }
}

/// 8-bit arithmetic source: r, (HL), (II+d) or an immediate. A redundant
/// leading `A,` is accepted on the eZ80 and under SDCC compatibility.
pub(crate) fn emit_s<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((mut op, mut rest)) = asm.parse_op(args) else {
        return args;
    };
    if rest.starts_with(',') && op.is_register(REG_A) {
        if !asm.dialect.is(CpuSet::EZ80) && !asm.dialect.sdcc_compat {
            asm.ill_op();
            return rest;
        }
        match asm.parse_op(&rest[1..]) {
            Some((o, r)) => {
                op = o;
                rest = r;
            }
            None => return rest,
        }
    }
    emit_sx(asm, prefix, opcode, &op);
    rest
}

/// SUB is emit_s everywhere except the GBZ80, which requires `SUB A,s`.
pub(crate) fn emit_sub<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    if !asm.dialect.is(CpuSet::GBZ80) {
        return emit_s(asm, prefix, opcode, args);
    }

    let Some((dst, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    if !dst.is_register(REG_A) {
        asm.ill_op();
        return tail;
    }
    let Some((src, rest)) = asm.parse_op(tail) else {
        return tail;
    };
    emit_sx(asm, prefix, opcode, &src);
    rest
}

pub(crate) fn emit_bit<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((bit, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let bn = match bit {
        Operand::Immediate(Expr::Const(v)) if (0..8).contains(&v) => v as u8,
        _ => {
            asm.ill_op();
            return tail;
        }
    };
    let sub_opcode = opcode.wrapping_add(bn << 3);
    if opcode == 0x40 {
        emit_m(asm, prefix, sub_opcode, tail)
    } else {
        emit_mr(asm, prefix, sub_opcode, tail)
    }
}

/// INC/DEC: register pair or 8-bit operand.
pub(crate) fn emit_incdec<'a>(
    asm: &mut Assembler,
    prefix: u8,
    opcode: u8,
    args: &'a str,
) -> &'a str {
    let Some((op, rest)) = asm.parse_op(args) else {
        return args;
    };
    match op {
        Operand::Register(code) if code & R_ARITH != 0 => {
            let byte = prefix.wrapping_add((code & 3) << 4);
            if code & R_INDEX != 0 {
                asm.emit_bytes(&[index_prefix(code), byte]);
            } else {
                asm.emit_bytes(&[byte]);
            }
        }
        Operand::Register(_)
        | Operand::IndirectRegister(_)
        | Operand::Indexed { .. }
        | Operand::HlIncDec(_) => emit_mx(asm, 0, opcode, 3, &op),
        _ => asm.ill_op(),
    }
    rest
}

/// JR/DJNZ: a PC-relative target with a -1 addend so the displacement is
/// taken from the end of the instruction.
pub(crate) fn emit_jr<'a>(asm: &mut Assembler, _prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((op, rest)) = asm.parse_op_no_index(args) else {
        return args;
    };
    match op {
        Operand::Immediate(expr) => {
            asm.emit_bytes(&[opcode]);
            let adjusted = Expr::Binary(
                BinaryOp::Add,
                Box::new(expr),
                Box::new(Expr::Const(-1)),
            )
            .fold();
            asm.emit_byte_expr(&adjusted, RelocKind::PcRel8);
        }
        _ => asm.ill_op(),
    }
    rest
}

pub(crate) fn emit_jrcc<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    if let Some((cc, after)) = parse_condition(args) {
        if let Some(tail) = after.strip_prefix(',') {
            return if cc > 24 {
                asm.error("condition code invalid for jr");
                tail
            } else {
                emit_jr(asm, 0, opcode.wrapping_add(cc), tail)
            };
        }
    }
    emit_jr(asm, 0, prefix, args)
}

pub(crate) fn emit_jp<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((op, rest)) = asm.parse_op_no_index(args) else {
        return args;
    };
    match op {
        Operand::Immediate(expr) => {
            asm.emit_bytes(&[opcode]);
            asm.emit_word(&expr);
        }
        Operand::IndirectRegister(code) if code & !R_INDEX == REG_HL => {
            if code & R_INDEX != 0 {
                asm.emit_bytes(&[index_prefix(code), prefix]);
            } else {
                asm.emit_bytes(&[prefix]);
            }
        }
        Operand::IndirectRegister(REG_C) if asm.dialect.is(CpuSet::Z80N) => {
            asm.emit_bytes(&[0xED, 0x98]);
        }
        _ => asm.ill_op(),
    }
    rest
}

pub(crate) fn emit_call<'a>(
    asm: &mut Assembler,
    _prefix: u8,
    opcode: u8,
    args: &'a str,
) -> &'a str {
    let Some((op, rest)) = asm.parse_op_no_index(args) else {
        return args;
    };
    match op {
        Operand::Immediate(expr) => {
            asm.emit_bytes(&[opcode]);
            asm.emit_word(&expr);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// JP and CALL share the conditional form; an unconditional JP falls
/// back to the absolute/indirect encoder.
pub(crate) fn emit_jpcc<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    if let Some((cc, after)) = parse_condition(args) {
        if let Some(tail) = after.strip_prefix(',') {
            return emit_call(asm, 0, opcode.wrapping_add(cc), tail);
        }
    }
    if prefix == 0xC3 {
        emit_jp(asm, 0xE9, prefix, args)
    } else {
        emit_call(asm, 0, prefix, args)
    }
}

/// EX AF,AF'; EX DE,HL; EX (SP),HL/IX/IY.
pub(crate) fn emit_ex<'a>(asm: &mut Assembler, _prefix: u8, _opcode: u8, args: &'a str) -> &'a str {
    let Some((first, rest)) = asm.parse_op_no_index(args) else {
        return args;
    };
    let rest = rest.trim_start();
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let p = tail.trim_start();

    let mut prefix = 0u8;
    let mut opcode = 0u8;
    let mut out: &str = p;

    match first {
        Operand::Register(REG_AF) => {
            if p.len() >= 2 && p[..2].eq_ignore_ascii_case("af") {
                let mut q = &p[2..];
                if let Some(t) = q.strip_prefix('\'').or_else(|| q.strip_prefix('`')) {
                    q = t;
                }
                opcode = 0x08;
                out = q;
            }
        }
        Operand::Register(REG_DE) => {
            if p.len() >= 2 && p[..2].eq_ignore_ascii_case("hl") {
                opcode = 0xEB;
                out = &p[2..];
            }
        }
        Operand::IndirectRegister(REG_SP) => {
            if let Some((second, r2)) = asm.parse_op(p) {
                if let Operand::Register(code) = second {
                    if code & !R_INDEX == REG_HL {
                        opcode = 0xE3;
                        if code & R_INDEX != 0 {
                            prefix = index_prefix(code);
                        }
                        out = r2;
                    }
                }
            }
        }
        _ => {}
    }

    if opcode != 0 {
        if prefix != 0 {
            asm.emit_bytes(&[prefix, opcode]);
        } else {
            asm.emit_bytes(&[opcode]);
        }
    } else {
        asm.ill_op();
    }
    out
}

/// IN r,(n); IN r,(C); IN F,(C) (also written `IN (C)`); eZ80 IN r,(BC).
pub(crate) fn emit_in<'a>(asm: &mut Assembler, _prefix: u8, _opcode: u8, args: &'a str) -> &'a str {
    let Some((first, rest)) = asm.parse_op(args) else {
        return args;
    };

    let (reg_code, port, rest) = if first == Operand::IndirectRegister(REG_C) {
        (REG_F, Operand::IndirectRegister(REG_C), rest)
    } else {
        let Some(tail) = rest.strip_prefix(',') else {
            asm.error("bad instruction syntax");
            return rest;
        };
        let Some((port, r2)) = asm.parse_op(tail) else {
            return tail;
        };
        let code = match first {
            Operand::Register(c) => c,
            _ => {
                asm.ill_op();
                return r2;
            }
        };
        (code, port, r2)
    };

    if reg_code > 7 && reg_code != REG_F {
        asm.ill_op();
        return rest;
    }

    match port {
        Operand::MemoryAddress(expr) => {
            if reg_code == REG_A {
                asm.emit_bytes(&[0xDB]);
                asm.emit_byte_expr(&expr, RelocKind::Abs8);
            } else {
                asm.ill_op();
            }
        }
        Operand::IndirectRegister(c) if c == REG_C || c == REG_BC => {
            if c == REG_BC && !asm.dialect.is(CpuSet::EZ80) {
                asm.ill_op();
                return rest;
            }
            if reg_code == REG_F && !asm.dialect.is(R800_Z80N) {
                asm.check_feature(Features::IN_F_C);
            }
            asm.emit_bytes(&[0xED, 0x40 | ((reg_code & 7) << 3)]);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// Z180/eZ80 IN0 r,(n).
pub(crate) fn emit_in0<'a>(asm: &mut Assembler, _prefix: u8, _opcode: u8, args: &'a str) -> &'a str {
    let Some((reg, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let Some((port, rest)) = asm.parse_op(tail) else {
        return tail;
    };

    match (reg, port) {
        (Operand::Register(code), Operand::MemoryAddress(expr)) if code <= 7 => {
            asm.emit_bytes(&[0xED, code << 3]);
            asm.emit_byte_expr(&expr, RelocKind::Abs8);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// OUT (n),A; OUT (C),r; OUT (C),0; eZ80 OUT (BC),r.
pub(crate) fn emit_out<'a>(asm: &mut Assembler, _prefix: u8, _opcode: u8, args: &'a str) -> &'a str {
    let Some((port, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let Some((mut reg, rest)) = asm.parse_op(tail) else {
        return tail;
    };

    if matches!(
        port,
        Operand::Immediate(_) | Operand::Register(_) | Operand::IndexSum { .. }
    ) {
        asm.ill_op();
        return rest;
    }

    if reg == Operand::Immediate(Expr::Const(0)) {
        if !asm.dialect.is(CpuSet::Z80N) {
            asm.check_feature(Features::OUT_C_0);
        }
        reg = Operand::Register(6);
    }

    let code = match reg {
        Operand::Register(c) if c <= 7 => c,
        _ => {
            asm.ill_op();
            return rest;
        }
    };

    match port {
        Operand::MemoryAddress(expr) => {
            if code == REG_A {
                asm.emit_bytes(&[0xD3]);
                asm.emit_byte_expr(&expr, RelocKind::Abs8);
            } else {
                asm.ill_op();
            }
        }
        Operand::IndirectRegister(c) if c == REG_C || c == REG_BC => {
            if c == REG_BC && !asm.dialect.is(CpuSet::EZ80) {
                asm.ill_op();
                return rest;
            }
            asm.emit_bytes(&[0xED, 0x41 | (code << 3)]);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// Z180/eZ80 OUT0 (n),r.
pub(crate) fn emit_out0<'a>(
    asm: &mut Assembler,
    _prefix: u8,
    _opcode: u8,
    args: &'a str,
) -> &'a str {
    let Some((port, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let Some((reg, rest)) = asm.parse_op(tail) else {
        return tail;
    };

    match (port, reg) {
        (Operand::MemoryAddress(expr), Operand::Register(code)) if code <= 7 => {
            asm.emit_bytes(&[0xED, 0x01 | (code << 3)]);
            asm.emit_byte_expr(&expr, RelocKind::Abs8);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// IM 0/1/2.
pub(crate) fn emit_im<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((op, rest)) = asm.parse_op(args) else {
        return args;
    };
    match op {
        Operand::Immediate(Expr::Const(v)) if (0..=2).contains(&v) => {
            let mode = if v == 0 { 0u8 } else { (v + 1) as u8 };
            asm.emit_bytes(&[prefix, opcode.wrapping_add(8 * mode)]);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// RST: exactly the eight restart vectors.
pub(crate) fn emit_rst<'a>(asm: &mut Assembler, _prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((op, rest)) = asm.parse_op_no_index(args) else {
        return args;
    };
    let addr = match op {
        Operand::Immediate(Expr::Const(v)) | Operand::MemoryAddress(Expr::Const(v)) => v,
        _ => {
            asm.error("rst needs constant address");
            return rest;
        }
    };
    if addr & !0x38 != 0 {
        asm.ill_op();
        return rest;
    }
    asm.emit_bytes(&[opcode.wrapping_add((addr as u8) & 0x38)]);
    rest
}

pub(crate) fn emit_pop<'a>(asm: &mut Assembler, _prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((op, rest)) = asm.parse_op(args) else {
        return args;
    };
    match op {
        Operand::Register(code) if code & R_STACKABLE != 0 => {
            let byte = opcode.wrapping_add((code & 3) << 4);
            if code & R_INDEX != 0 {
                asm.emit_bytes(&[index_prefix(code), byte]);
            } else {
                asm.emit_bytes(&[byte]);
            }
        }
        _ => asm.ill_op(),
    }
    rest
}

/// PUSH: a stackable pair, or a 16-bit immediate on the Z80N (big-endian
/// in the instruction stream).
pub(crate) fn emit_push<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((op, rest)) = asm.parse_op(args) else {
        return args;
    };
    match op {
        Operand::Register(_) => emit_pop(asm, prefix, opcode, args),
        Operand::Immediate(expr) if asm.dialect.is(CpuSet::Z80N) => {
            asm.emit_bytes(&[0xED, 0x8A]);
            let offset = asm.frag().len();
            asm.emit_bytes(&[0, 0]);
            let fixup = Fixup {
                offset,
                size: 2,
                expr,
                pcrel: false,
                kind: RelocKind::Word16Be,
            };
            asm.frag().add_fixup(fixup);
            rest
        }
        _ => {
            asm.ill_op();
            rest
        }
    }
}

pub(crate) fn emit_retcc<'a>(
    asm: &mut Assembler,
    prefix: u8,
    opcode: u8,
    args: &'a str,
) -> &'a str {
    match parse_condition(args) {
        Some((cc, after)) => {
            asm.emit_bytes(&[opcode.wrapping_add(cc)]);
            after
        }
        None => {
            asm.emit_bytes(&[prefix]);
            args
        }
    }
}

/// ADC/SBC: A,s or HL,rr. The table carries the 8-bit base in `prefix`
/// and the ED-page 16-bit base in `opcode`.
pub(crate) fn emit_adc<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((dst, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let code = match dst {
        Operand::Register(c) => c,
        _ => {
            asm.ill_op();
            return tail;
        }
    };
    match code {
        REG_A => emit_s(asm, 0, prefix, tail),
        REG_HL => {
            let Some((src, rest)) = asm.parse_op(tail) else {
                return tail;
            };
            if let Operand::Register(r) = src {
                if r & (R_ARITH | R_INDEX) == R_ARITH {
                    asm.emit_bytes(&[0xED, opcode.wrapping_add((r & 3) << 4)]);
                    return rest;
                }
            }
            asm.ill_op();
            rest
        }
        _ => {
            asm.ill_op();
            tail
        }
    }
}

/// ADD: A,s; rr,rr; GBZ80 SP,d; Z80N rr,A and rr,nn.
pub(crate) fn emit_add<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((dst, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let lhs = match dst {
        Operand::Register(c) => c,
        _ => {
            asm.ill_op();
            return tail;
        }
    };

    match lhs {
        REG_A => return emit_s(asm, 0, prefix, tail),
        REG_SP => {
            let Some((src, rest)) = asm.parse_op(tail) else {
                return tail;
            };
            match src {
                Operand::Immediate(expr) if asm.dialect.is(CpuSet::GBZ80) => {
                    asm.emit_bytes(&[0xE8]);
                    asm.emit_byte_expr(&expr, RelocKind::Disp8);
                }
                _ => asm.ill_op(),
            }
            return rest;
        }
        REG_BC | REG_DE if !asm.dialect.is(CpuSet::Z80N) => {
            asm.ill_op();
            return tail;
        }
        REG_BC | REG_DE | REG_HL | REG_IX | REG_IY => {}
        _ => {
            asm.ill_op();
            return tail;
        }
    }

    let Some((src, rest)) = asm.parse_op(tail) else {
        return tail;
    };
    match src {
        Operand::Register(rhs)
            if rhs & R_ARITH != 0 && (rhs == lhs || (rhs & !R_INDEX) != REG_HL) =>
        {
            let byte = opcode.wrapping_add((rhs & 3) << 4);
            if lhs & R_INDEX != 0 {
                asm.emit_bytes(&[index_prefix(lhs), byte]);
            } else {
                asm.emit_bytes(&[byte]);
            }
        }
        Operand::Register(REG_A) if lhs & R_INDEX == 0 && asm.dialect.is(CpuSet::Z80N) => {
            asm.emit_bytes(&[0xED, 0x33 - (lhs & 3)]);
        }
        Operand::Immediate(expr) if lhs & R_INDEX == 0 && asm.dialect.is(CpuSet::Z80N) => {
            asm.emit_bytes(&[0xED, 0x36 - (lhs & 3)]);
            asm.emit_word(&expr);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// Z80N barrel shifts: BSLA/BSRA/BSRL/BSRF/BRLC DE,B.
pub(crate) fn emit_bshft<'a>(
    asm: &mut Assembler,
    prefix: u8,
    opcode: u8,
    args: &'a str,
) -> &'a str {
    let Some((r1, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let Some((r2, rest)) = asm.parse_op(tail) else {
        return tail;
    };
    if r1.is_register(REG_DE) && r2.is_register(REG_B) {
        asm.emit_bytes(&[prefix, opcode]);
    } else {
        asm.ill_op();
    }
    rest
}

/// Z180/eZ80 MLT rr; on the Z80N only MLT DE exists.
pub(crate) fn emit_mlt<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((op, rest)) = asm.parse_op(args) else {
        return args;
    };
    match op {
        Operand::Register(code) if code & R_ARITH != 0 => {
            if asm.dialect.is(CpuSet::Z80N) {
                if code != REG_DE {
                    asm.ill_op();
                    return rest;
                }
                asm.emit_bytes(&[0xED, 0x30]);
            } else {
                asm.emit_bytes(&[prefix, opcode | ((code & 3) << 4)]);
            }
        }
        _ => asm.ill_op(),
    }
    rest
}

/// Z80N MUL D,E.
pub(crate) fn emit_mul<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((r1, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let Some((r2, rest)) = asm.parse_op(tail) else {
        return tail;
    };
    if r1.is_register(REG_D) && r2.is_register(REG_E) {
        asm.emit_bytes(&[prefix, opcode]);
    } else {
        asm.ill_op();
    }
    rest
}

/// R800 MULUB A,r.
pub(crate) fn emit_mulub<'a>(
    asm: &mut Assembler,
    prefix: u8,
    opcode: u8,
    args: &'a str,
) -> &'a str {
    let p = args.trim_start();
    let b = p.as_bytes();
    if b.len() < 3 || !b[0].eq_ignore_ascii_case(&b'a') || b[1] != b',' {
        asm.ill_op();
        return p;
    }
    let reg = b[2].to_ascii_lowercase();
    if !(b'b'..=b'e').contains(&reg) {
        asm.ill_op();
        return &p[2..];
    }
    let rest = &p[3..];
    if !rest.trim().is_empty() {
        asm.ill_op();
        return rest;
    }
    asm.emit_bytes(&[prefix, opcode.wrapping_add((reg - b'b') << 3)]);
    rest
}

/// R800 MULUW HL,BC and MULUW HL,SP.
pub(crate) fn emit_muluw<'a>(
    asm: &mut Assembler,
    prefix: u8,
    opcode: u8,
    args: &'a str,
) -> &'a str {
    let p = args.trim_start();
    if p.len() < 3 || !p[..2].eq_ignore_ascii_case("hl") || p.as_bytes()[2] != b',' {
        asm.ill_op();
        return p;
    }
    let Some((op, rest)) = asm.parse_op(&p[3..]) else {
        return &p[3..];
    };
    match op {
        Operand::Register(code) if code == REG_BC || code == REG_SP => {
            asm.emit_bytes(&[prefix, opcode.wrapping_add((code & 3) << 4)]);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// The LEA/PEA operand `ii+d`; under SDCC compatibility also `ii,d`.
fn parse_lea_pea_args<'a>(asm: &mut Assembler, args: &'a str) -> Option<(Operand, &'a str)> {
    let (op, rest) = asm.parse_op(args)?;
    if asm.dialect.sdcc_compat && rest.starts_with(',') {
        if let Operand::Register(code) = op {
            let (off, rest2) = asm.parse_op(&rest[1..])?;
            let disp = match off {
                Operand::Immediate(e) => e,
                _ => {
                    asm.ill_op();
                    return None;
                }
            };
            return Some((Operand::IndexSum { reg: code, disp }, rest2));
        }
    }
    Some((op, rest))
}

/// eZ80 LEA rr,II+d.
pub(crate) fn emit_lea<'a>(asm: &mut Assembler, prefix: u8, _opcode: u8, args: &'a str) -> &'a str {
    let Some((dst, rest)) = asm.parse_op(args) else {
        return args;
    };
    let code = match dst {
        Operand::Register(c) => c,
        _ => {
            asm.ill_op();
            return rest;
        }
    };
    let mut opcode = match code {
        REG_BC | REG_DE | REG_HL => 0x02 | ((code & 3) << 4),
        REG_IX => 0x32,
        REG_IY => 0x33,
        _ => {
            asm.ill_op();
            return rest;
        }
    };

    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let Some((src, rest)) = parse_lea_pea_args(asm, tail) else {
        return tail;
    };
    let (src_reg, disp) = match src {
        Operand::IndexSum { reg, disp } => (reg, disp),
        Operand::Register(c) if c == REG_IX || c == REG_IY => (c, Expr::Const(0)),
        _ => {
            asm.ill_op();
            return rest;
        }
    };

    if src_reg == REG_IX {
        if opcode == 0x33 {
            opcode = 0x55;
        }
    } else if opcode == 0x32 {
        opcode = 0x54;
    } else if opcode != 0x33 {
        opcode |= 0x01;
    }

    asm.emit_bytes(&[prefix, opcode]);
    asm.emit_byte_expr(&disp, RelocKind::Disp8);
    rest
}

/// eZ80 PEA II+d.
pub(crate) fn emit_pea<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((op, rest)) = parse_lea_pea_args(asm, args) else {
        return args;
    };
    match op {
        Operand::IndexSum { reg, disp } if reg & R_INDEX != 0 => {
            let byte = opcode.wrapping_add(if reg == REG_IY { 1 } else { 0 });
            asm.emit_bytes(&[prefix, byte]);
            asm.emit_byte_expr(&disp, RelocKind::Disp8);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// Z80N NEXTREG n,n' and NEXTREG n,A.
pub(crate) fn emit_nextreg<'a>(
    asm: &mut Assembler,
    prefix: u8,
    _opcode: u8,
    args: &'a str,
) -> &'a str {
    let Some((rr, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let Some((nn, rest)) = asm.parse_op(tail) else {
        return tail;
    };

    let reg_expr = match rr {
        Operand::Immediate(e) => e,
        _ => {
            asm.ill_op();
            return rest;
        }
    };
    match nn {
        Operand::Register(REG_A) => {
            asm.emit_bytes(&[prefix, 0x92]);
            asm.emit_byte_expr(&reg_expr, RelocKind::Abs8);
        }
        Operand::Immediate(value) => {
            asm.emit_bytes(&[prefix, 0x91]);
            asm.emit_byte_expr(&reg_expr, RelocKind::Abs8);
            asm.emit_byte_expr(&value, RelocKind::Abs8);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// Z180/eZ80/Z80N TST; a redundant leading `A,` is allowed on the eZ80.
pub(crate) fn emit_tst<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    let Some((mut op, mut rest)) = asm.parse_op(args) else {
        return args;
    };
    if rest.starts_with(',') && op.is_register(REG_A) {
        if !asm.dialect.is(CpuSet::EZ80) {
            asm.ill_op();
            return rest;
        }
        match asm.parse_op(&rest[1..]) {
            Some((o, r)) => {
                op = o;
                rest = r;
            }
            None => return rest,
        }
    }

    match op {
        Operand::Register(code) => {
            if code > 7 {
                asm.ill_op();
            } else {
                asm.emit_bytes(&[prefix, opcode | (code << 3)]);
            }
        }
        Operand::IndirectRegister(REG_HL) => {
            asm.emit_bytes(&[prefix, opcode | (6 << 3)]);
        }
        Operand::Immediate(expr) => {
            if asm.dialect.is(CpuSet::Z80N) {
                asm.emit_bytes(&[0xED, 0x27]);
            } else {
                asm.emit_bytes(&[prefix, opcode | 0x60]);
            }
            asm.emit_byte_expr(&expr, RelocKind::Abs8);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// Prefix + opcode followed by one immediate byte (TEST, TSTIO).
pub(crate) fn emit_insn_n<'a>(
    asm: &mut Assembler,
    prefix: u8,
    opcode: u8,
    args: &'a str,
) -> &'a str {
    let Some((op, rest)) = asm.parse_op(args) else {
        return args;
    };
    match op {
        Operand::Immediate(expr) => {
            asm.emit_bytes(&[prefix, opcode]);
            asm.emit_byte_expr(&expr, RelocKind::Abs8);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// SWAP: GBZ80 nibble swap via the CB page, Z80N SWAPNIB spelling
/// accepts only A.
pub(crate) fn emit_swap<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    if !asm.dialect.is(CpuSet::Z80N) {
        return emit_mr(asm, prefix, opcode, args);
    }
    let Some((op, rest)) = asm.parse_op(args) else {
        return args;
    };
    if op.is_register(REG_A) {
        asm.emit_bytes(&[0xED, 0x23]);
    } else {
        asm.ill_op();
    }
    rest
}

/// LDD/LDI: plain block ops everywhere except the GBZ80, where they are
/// the post-decrement/increment loads through HL.
pub(crate) fn emit_lddldi<'a>(
    asm: &mut Assembler,
    prefix: u8,
    opcode: u8,
    args: &'a str,
) -> &'a str {
    if !asm.dialect.is(CpuSet::GBZ80) {
        return emit_insn(asm, prefix, opcode, args);
    }

    let Some((dst, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let Some((src, rest)) = asm.parse_op(tail) else {
        return tail;
    };

    let base = (opcode & 0x08).wrapping_mul(2).wrapping_add(0x22);
    match (dst, src) {
        (Operand::IndirectRegister(REG_HL), Operand::Register(REG_A)) => {
            asm.emit_bytes(&[base]);
        }
        (Operand::Register(REG_A), Operand::IndirectRegister(REG_HL)) => {
            asm.emit_bytes(&[base | 0x08]);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// GBZ80 LDH: the 0xFF00-page loads.
pub(crate) fn emit_ldh<'a>(asm: &mut Assembler, _prefix: u8, _opcode: u8, args: &'a str) -> &'a str {
    let Some((dst, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let Some((src, rest)) = asm.parse_op(tail) else {
        return tail;
    };

    match (dst, src) {
        (Operand::Register(REG_A), Operand::MemoryAddress(e)) => {
            asm.emit_bytes(&[0xF0]);
            asm.emit_byte_expr(&e, RelocKind::Abs8);
        }
        (Operand::Register(REG_A), Operand::IndirectRegister(REG_C)) => {
            asm.emit_bytes(&[0xF2]);
        }
        (Operand::MemoryAddress(e), Operand::Register(REG_A)) => {
            asm.emit_bytes(&[0xE0]);
            asm.emit_byte_expr(&e, RelocKind::Abs8);
        }
        (Operand::IndirectRegister(REG_C), Operand::Register(REG_A)) => {
            asm.emit_bytes(&[0xE2]);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// GBZ80 LDHL SP,d.
pub(crate) fn emit_ldhl<'a>(
    asm: &mut Assembler,
    _prefix: u8,
    opcode: u8,
    args: &'a str,
) -> &'a str {
    let Some((dst, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let Some((src, rest)) = asm.parse_op(tail) else {
        return tail;
    };

    match (dst, src) {
        (Operand::Register(REG_SP), Operand::Immediate(expr)) => {
            asm.emit_bytes(&[opcode]);
            asm.emit_byte_expr(&expr, RelocKind::Disp8);
        }
        _ => asm.ill_op(),
    }
    rest
}

/// RETI has its own opcode on the GBZ80.
pub(crate) fn emit_reti<'a>(asm: &mut Assembler, prefix: u8, opcode: u8, args: &'a str) -> &'a str {
    if asm.dialect.is(CpuSet::GBZ80) {
        return emit_insn(asm, 0x00, 0xD9, args);
    }
    emit_insn(asm, prefix, opcode, args)
}

/// LD: dispatch by destination form x source form.
pub(crate) fn emit_ld<'a>(asm: &mut Assembler, _prefix: u8, _opcode: u8, args: &'a str) -> &'a str {
    let Some((dst, rest)) = asm.parse_op(args) else {
        return args;
    };
    let Some(tail) = rest.strip_prefix(',') else {
        asm.error("bad instruction syntax");
        return rest;
    };
    let Some((src, rest)) = asm.parse_op(tail) else {
        return tail;
    };

    match &dst {
        Operand::IndirectRegister(_)
        | Operand::Indexed { .. }
        | Operand::MemoryAddress(_)
        | Operand::HlIncDec(_) => emit_ld_mem_dst(asm, &dst, &src),
        Operand::Register(code) => emit_ld_reg_dst(asm, *code, &src),
        _ => asm.ill_op(),
    }
    rest
}

fn emit_ld_mem_dst(asm: &mut Assembler, dst: &Operand, src: &Operand) {
    match src {
        Operand::Register(c) | Operand::IndirectRegister(c) => {
            if *c <= 7 {
                emit_ld_m_r(asm, dst, *c);
            } else {
                emit_ld_m_rr(asm, dst, *c);
            }
        }
        Operand::Immediate(e) | Operand::MemoryAddress(e) => emit_ld_m_n(asm, dst, e),
        _ => asm.ill_op(),
    }
}

/// LD (HL),n and LD (II+d),n.
fn emit_ld_m_n(asm: &mut Assembler, dst: &Operand, src: &Expr) {
    match dst {
        Operand::IndirectRegister(REG_HL) => {
            asm.emit_bytes(&[0x36]);
            asm.emit_byte_expr(src, RelocKind::Abs8);
        }
        Operand::Indexed { reg, disp } => {
            asm.emit_bytes(&[index_prefix(*reg), 0x36]);
            asm.emit_byte_expr(disp, RelocKind::Disp8);
            asm.emit_byte_expr(src, RelocKind::Abs8);
        }
        _ => asm.ill_op(),
    }
}

/// LD (<somewhere>),r for 8-bit r.
fn emit_ld_m_r(asm: &mut Assembler, dst: &Operand, src_code: u8) {
    match dst {
        Operand::HlIncDec(step) => {
            if src_code == REG_A {
                asm.emit_bytes(&[if *step > 0 { 0x22 } else { 0x32 }]);
            } else {
                asm.ill_op();
            }
        }
        Operand::Indexed { reg, disp } => {
            asm.emit_bytes(&[index_prefix(*reg), 0x70 | src_code]);
            asm.emit_byte_expr(disp, RelocKind::Disp8);
        }
        Operand::IndirectRegister(code) => match *code {
            REG_BC | REG_DE => {
                if src_code == REG_A {
                    asm.emit_bytes(&[0x02 | ((*code & 3) << 4)]);
                } else {
                    asm.ill_op();
                }
            }
            REG_HL => asm.emit_bytes(&[0x70 | src_code]),
            _ => asm.ill_op(),
        },
        Operand::MemoryAddress(e) => {
            if src_code == REG_A {
                let opcode = if asm.dialect.is(CpuSet::GBZ80) {
                    0xEA
                } else {
                    0x32
                };
                asm.emit_bytes(&[opcode]);
                asm.emit_word(e);
            } else {
                asm.ill_op();
            }
        }
        _ => asm.ill_op(),
    }
}

/// LD (<somewhere>),rr.
fn emit_ld_m_rr(asm: &mut Assembler, dst: &Operand, src_code: u8) {
    match dst {
        Operand::Indexed { reg, disp } => {
            if !asm.dialect.is(CpuSet::EZ80) {
                asm.ill_op();
                return;
            }
            let prefix = index_prefix(*reg);
            let opcode = match src_code {
                REG_BC => 0x0F,
                REG_DE => 0x1F,
                REG_HL => 0x2F,
                REG_IX => {
                    if prefix != 0xFD {
                        0x3F
                    } else {
                        0x3E
                    }
                }
                REG_IY => {
                    if prefix != 0xFD {
                        0x3E
                    } else {
                        0x3F
                    }
                }
                _ => {
                    asm.ill_op();
                    return;
                }
            };
            asm.emit_bytes(&[prefix, opcode]);
            asm.emit_byte_expr(disp, RelocKind::Disp8);
        }
        Operand::IndirectRegister(REG_HL) => {
            if !asm.dialect.is(CpuSet::EZ80) {
                asm.ill_op();
                return;
            }
            let opcode = match src_code {
                REG_BC => 0x0F,
                REG_DE => 0x1F,
                REG_HL => 0x2F,
                REG_IX => 0x3F,
                REG_IY => 0x3E,
                _ => {
                    asm.ill_op();
                    return;
                }
            };
            asm.emit_bytes(&[0xED, opcode]);
        }
        Operand::MemoryAddress(e) => {
            if asm.dialect.is(CpuSet::GBZ80) {
                if src_code == REG_SP {
                    asm.emit_bytes(&[0x08]);
                    asm.emit_word(e);
                } else {
                    asm.ill_op();
                }
                return;
            }
            let (prefix, opcode) = match src_code {
                REG_BC => (0xED, 0x43),
                REG_DE => (0xED, 0x53),
                REG_HL => (0x00, 0x22),
                REG_IX => (0xDD, 0x22),
                REG_IY => (0xFD, 0x22),
                REG_SP => (0xED, 0x73),
                _ => {
                    asm.ill_op();
                    return;
                }
            };
            if prefix != 0 {
                asm.emit_bytes(&[prefix, opcode]);
            } else {
                asm.emit_bytes(&[opcode]);
            }
            asm.emit_word(e);
        }
        _ => asm.ill_op(),
    }
}

fn emit_ld_reg_dst(asm: &mut Assembler, dst_code: u8, src: &Operand) {
    match src {
        Operand::IndirectRegister(_)
        | Operand::Indexed { .. }
        | Operand::MemoryAddress(_)
        | Operand::HlIncDec(_) => {
            if dst_code <= 7 {
                emit_ld_r_m(asm, dst_code, src);
            } else {
                emit_ld_rr_m(asm, dst_code, src);
            }
        }
        Operand::Register(src_code) => emit_ld_r_r(asm, dst_code, *src_code),
        Operand::Immediate(e) => {
            if dst_code & !R_INDEX <= 7 {
                emit_ld_r_n(asm, dst_code, e);
            } else {
                emit_ld_rr_nn(asm, dst_code, e);
            }
        }
        _ => asm.ill_op(),
    }
}

/// LD r,(<somewhere>) for 8-bit r.
fn emit_ld_r_m(asm: &mut Assembler, dst: u8, src: &Operand) {
    if dst == REG_A {
        if let Operand::IndirectRegister(c) = src {
            if *c == REG_BC {
                asm.emit_bytes(&[0x0A]);
                return;
            }
            if *c == REG_DE {
                asm.emit_bytes(&[0x1A]);
                return;
            }
        }
    }

    match src {
        Operand::HlIncDec(step) => {
            if dst == REG_A {
                asm.emit_bytes(&[if *step > 0 { 0x2A } else { 0x3A }]);
            } else {
                asm.ill_op();
            }
        }
        Operand::IndirectRegister(REG_HL) => {
            asm.emit_bytes(&[0x46 | (dst << 3)]);
        }
        Operand::Indexed { reg, disp } => {
            asm.emit_bytes(&[index_prefix(*reg), 0x46 | (dst << 3)]);
            asm.emit_byte_expr(disp, RelocKind::Disp8);
        }
        Operand::MemoryAddress(e) => {
            if dst == REG_A {
                let opcode = if asm.dialect.is(CpuSet::GBZ80) {
                    0xFA
                } else {
                    0x3A
                };
                asm.emit_bytes(&[opcode]);
                asm.emit_word(e);
            } else {
                asm.ill_op();
            }
        }
        _ => asm.ill_op(),
    }
}

/// LD r,n (including the index register halves).
fn emit_ld_r_n(asm: &mut Assembler, dst_code: u8, src: &Expr) {
    let prefix = match dst_code {
        IXH | IXL => 0xDD,
        IYH | IYL => 0xFD,
        REG_A | REG_B | REG_C | REG_D | REG_E | REG_H | REG_L => 0x00,
        _ => {
            asm.ill_op();
            return;
        }
    };

    if prefix != 0 {
        if asm.dialect.is(CpuSet::GBZ80) {
            asm.ill_op();
            return;
        }
        if !asm.dialect.is(EZ80_R800_Z80N) {
            asm.check_feature(Features::IDX_HALF);
        }
        asm.emit_bytes(&[prefix, 0x06 | ((dst_code & 7) << 3)]);
    } else {
        asm.emit_bytes(&[0x06 | ((dst_code & 7) << 3)]);
    }
    asm.emit_byte_expr(src, RelocKind::Abs8);
}

/// LD r,r' including the special registers and the index halves.
fn emit_ld_r_r(asm: &mut Assembler, dst: u8, src: u8) {
    let mut prefix: u8 = 0;
    let mut opcode: u8 = 0;
    let mut ii_halves = false;

    let special = match dst {
        REG_SP => match src {
            REG_HL => {
                opcode = 0xF9;
                true
            }
            REG_IX | REG_IY => {
                prefix = index_prefix(src);
                opcode = 0xF9;
                true
            }
            _ => false,
        },
        REG_HL => {
            if asm.dialect.is(CpuSet::EZ80) && src == REG_I {
                if !asm.dialect.is_adl() {
                    asm.error("ADL mode instruction");
                }
                prefix = 0xED;
                opcode = 0xD7;
                true
            } else {
                false
            }
        }
        REG_I => {
            if src == REG_HL && asm.dialect.is(CpuSet::EZ80) {
                if !asm.dialect.is_adl() {
                    asm.error("ADL mode instruction");
                }
                prefix = 0xED;
                opcode = 0xC7;
                true
            } else if src == REG_A {
                prefix = 0xED;
                opcode = 0x47;
                true
            } else {
                false
            }
        }
        REG_MB => {
            if asm.dialect.is(CpuSet::EZ80) && src == REG_A {
                if !asm.dialect.is_adl() {
                    asm.error("ADL mode instruction");
                }
                prefix = 0xED;
                opcode = 0x6D;
                true
            } else {
                false
            }
        }
        REG_R => {
            if src == REG_A {
                prefix = 0xED;
                opcode = 0x4F;
                true
            } else {
                false
            }
        }
        REG_A => match src {
            REG_I => {
                prefix = 0xED;
                opcode = 0x57;
                true
            }
            REG_R => {
                prefix = 0xED;
                opcode = 0x5F;
                true
            }
            REG_MB if asm.dialect.is(CpuSet::EZ80) => {
                if !asm.dialect.is_adl() {
                    asm.error("ADL mode instruction");
                }
                prefix = 0xED;
                opcode = 0x6E;
                true
            }
            _ => false,
        },
        _ => false,
    };

    if !special {
        match dst {
            REG_A | REG_B | REG_C | REG_D | REG_E | REG_H | REG_L => prefix = 0,
            IXH | IXL => {
                prefix = 0xDD;
                ii_halves = true;
            }
            IYH | IYL => {
                prefix = 0xFD;
                ii_halves = true;
            }
            _ => {
                asm.ill_op();
                return;
            }
        }

        let ok = match src {
            REG_A | REG_B | REG_C | REG_D | REG_E => true,
            REG_H | REG_L => prefix == 0,
            IXH | IXL => {
                if prefix == 0xFD || dst == REG_H || dst == REG_L {
                    false
                } else {
                    prefix = 0xDD;
                    ii_halves = true;
                    true
                }
            }
            IYH | IYL => {
                if prefix == 0xDD || dst == REG_H || dst == REG_L {
                    false
                } else {
                    prefix = 0xFD;
                    ii_halves = true;
                    true
                }
            }
            _ => false,
        };
        if !ok {
            asm.ill_op();
            return;
        }
        opcode = 0x40 | ((dst & 7) << 3) | (src & 7);
    }

    if asm.dialect.is(CpuSet::GBZ80) && prefix != 0 {
        asm.ill_op();
        return;
    }
    if ii_halves && !asm.dialect.is(EZ80_R800_Z80N) {
        asm.check_feature(Features::IDX_HALF);
    }
    if prefix == 0
        && asm.dialect.is(CpuSet::EZ80)
        && matches!(opcode, 0x40 | 0x49 | 0x52 | 0x5B)
    {
        // the eZ80 dropped these self-moves
        asm.warn("unsupported instruction, assembled as NOP");
        opcode = 0x00;
    }

    if prefix != 0 {
        asm.emit_bytes(&[prefix, opcode]);
    } else {
        asm.emit_bytes(&[opcode]);
    }
}

/// LD rr,(<somewhere>).
fn emit_ld_rr_m(asm: &mut Assembler, dst_code: u8, src: &Operand) {
    if asm.dialect.is(CpuSet::GBZ80) {
        asm.ill_op();
        return;
    }

    match src {
        Operand::Indexed { reg, disp } => {
            if !asm.dialect.is(CpuSet::EZ80) {
                asm.ill_op();
                return;
            }
            let prefix = index_prefix(*reg);
            let opcode = match dst_code {
                REG_BC => 0x07,
                REG_DE => 0x17,
                REG_HL => 0x27,
                REG_IX => {
                    if prefix == 0xDD {
                        0x37
                    } else {
                        0x31
                    }
                }
                REG_IY => {
                    if prefix == 0xDD {
                        0x31
                    } else {
                        0x37
                    }
                }
                _ => {
                    asm.ill_op();
                    return;
                }
            };
            asm.emit_bytes(&[prefix, opcode]);
            asm.emit_byte_expr(disp, RelocKind::Disp8);
        }
        Operand::IndirectRegister(REG_HL) => {
            if !asm.dialect.is(CpuSet::EZ80) {
                asm.ill_op();
                return;
            }
            let opcode = match dst_code {
                REG_BC => 0x07,
                REG_DE => 0x17,
                REG_HL => 0x27,
                REG_IX => 0x37,
                REG_IY => 0x31,
                _ => {
                    asm.ill_op();
                    return;
                }
            };
            asm.emit_bytes(&[0xED, opcode]);
        }
        Operand::MemoryAddress(e) => {
            let (prefix, opcode) = match dst_code {
                REG_BC => (0xED, 0x4B),
                REG_DE => (0xED, 0x5B),
                REG_HL => (0x00, 0x2A),
                REG_SP => (0xED, 0x7B),
                REG_IX => (0xDD, 0x2A),
                REG_IY => (0xFD, 0x2A),
                _ => {
                    asm.ill_op();
                    return;
                }
            };
            if prefix != 0 {
                asm.emit_bytes(&[prefix, opcode]);
            } else {
                asm.emit_bytes(&[opcode]);
            }
            asm.emit_word(e);
        }
        _ => asm.ill_op(),
    }
}

/// LD rr,nn.
fn emit_ld_rr_nn(asm: &mut Assembler, dst_code: u8, src: &Expr) {
    let (prefix, opcode) = match dst_code {
        REG_IX => (0xDD, 0x21),
        REG_IY => (0xFD, 0x21),
        REG_HL => (0x00, 0x21),
        REG_BC | REG_DE | REG_SP => (0x00, 0x01 | ((dst_code & 3) << 4)),
        _ => {
            asm.ill_op();
            return;
        }
    };
    if prefix != 0 {
        if asm.dialect.is(CpuSet::GBZ80) {
            asm.ill_op();
            return;
        }
        asm.emit_bytes(&[prefix, opcode]);
    } else {
        asm.emit_bytes(&[opcode]);
    }
    asm.emit_word(src);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{options::Config, Assembler, Diagnostic, Severity};

    fn asm_line(march: &str, line: &str) -> Assembler {
        let config = Config::parse_args(&[&format!("-march={}", march)]).unwrap();
        let mut asm = Assembler::new(config);
        asm.assemble_line(line);
        asm
    }

    fn bytes(march: &str, line: &str) -> Vec<u8> {
        let asm = asm_line(march, line);
        assert_eq!(asm.diagnostics(), &[] as &[Diagnostic], "line: {}", line);
        asm.current_section_bytes().to_vec()
    }

    fn first_error(march: &str, line: &str) -> String {
        let asm = asm_line(march, line);
        asm.diagnostics()
            .iter()
            .find(|d| d.severity == Severity::Error)
            .map(|d| d.message.clone())
            .unwrap_or_else(|| panic!("no error for: {}", line))
    }

    fn warnings(march: &str, line: &str) -> Vec<String> {
        asm_line(march, line)
            .diagnostics()
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .map(|d| d.message.clone())
            .collect()
    }

    #[test]
    fn test_ld_register_moves() {
        assert_eq!(bytes("z80", "ld a,b"), vec![0x78]);
        assert_eq!(bytes("z80", "ld b,c"), vec![0x41]);
        assert_eq!(bytes("z80", "ld l,(hl)"), vec![0x6E]);
        assert_eq!(bytes("z80", "ld (hl),a"), vec![0x77]);
        assert_eq!(bytes("z80", "ld sp,hl"), vec![0xF9]);
        assert_eq!(bytes("z80", "ld sp,ix"), vec![0xDD, 0xF9]);
        assert_eq!(bytes("z80", "ld a,i"), vec![0xED, 0x57]);
        assert_eq!(bytes("z80", "ld r,a"), vec![0xED, 0x4F]);
    }

    #[test]
    fn test_ld_immediates_and_memory() {
        assert_eq!(bytes("z80", "ld a,0x42"), vec![0x3E, 0x42]);
        assert_eq!(bytes("z80", "ld hl,0x1234"), vec![0x21, 0x34, 0x12]);
        assert_eq!(bytes("z80", "ld ix,0x1234"), vec![0xDD, 0x21, 0x34, 0x12]);
        assert_eq!(bytes("z80", "ld hl,(0x1234)"), vec![0x2A, 0x34, 0x12]);
        assert_eq!(bytes("z80", "ld (0x1234),a"), vec![0x32, 0x34, 0x12]);
        assert_eq!(bytes("z80", "ld (0x1234),sp"), vec![0xED, 0x73, 0x34, 0x12]);
        assert_eq!(bytes("z80", "ld bc,(0x1234)"), vec![0xED, 0x4B, 0x34, 0x12]);
        assert_eq!(bytes("z80", "ld a,(bc)"), vec![0x0A]);
        assert_eq!(bytes("z80", "ld (de),a"), vec![0x12]);
    }

    #[test]
    fn test_ld_indexed() {
        assert_eq!(bytes("z80", "ld a,(ix+3)"), vec![0xDD, 0x7E, 0x03]);
        assert_eq!(bytes("z80", "ld a,(3+ix)"), vec![0xDD, 0x7E, 0x03]);
        assert_eq!(bytes("z80", "ld a,(ix-(-3))"), vec![0xDD, 0x7E, 0x03]);
        assert_eq!(bytes("z80", "ld (iy-2),b"), vec![0xFD, 0x70, 0xFE]);
        assert_eq!(bytes("z80", "ld (ix+3),0x42"), vec![0xDD, 0x36, 0x03, 0x42]);
        assert_eq!(bytes("z80", "ld (hl),0x42"), vec![0x36, 0x42]);
        assert_eq!(bytes("z80", "ld a,(ix)"), vec![0xDD, 0x7E, 0x00]);
    }

    #[test]
    fn test_ld_displacement_range() {
        assert_eq!(bytes("z80", "ld a,(ix+127)"), vec![0xDD, 0x7E, 0x7F]);
        assert_eq!(bytes("z80", "ld a,(ix-128)"), vec![0xDD, 0x7E, 0x80]);
        assert_eq!(
            first_error("z80", "ld a,(ix+128)"),
            "index overflow (+128)"
        );
        assert_eq!(
            first_error("z80", "ld a,(ix-129)"),
            "index overflow (-129)"
        );
    }

    #[test]
    fn test_ld_index_halves() {
        assert_eq!(bytes("z80+xyhl", "ld a,ixh"), vec![0xDD, 0x7C]);
        assert_eq!(bytes("z80+xyhl", "ld iyl,3"), vec![0xFD, 0x2E, 0x03]);
        assert_eq!(bytes("z80+xyhl", "ld ixh,ixl"), vec![0xDD, 0x65]);
        // mixing H/L with an index half is illegal
        assert_eq!(first_error("z80+xyhl", "ld h,ixl"), "illegal operand");
    }

    #[test]
    fn test_ez80_special_loads() {
        assert_eq!(bytes("ez80+adl", "ld hl,i"), vec![0xED, 0xD7]);
        assert_eq!(bytes("ez80+adl", "ld i,hl"), vec![0xED, 0xC7]);
        assert_eq!(bytes("ez80+adl", "ld mb,a"), vec![0xED, 0x6D]);
        assert_eq!(bytes("ez80+adl", "ld a,mb"), vec![0xED, 0x6E]);
        assert_eq!(first_error("ez80", "ld hl,i"), "ADL mode instruction");
    }

    #[test]
    fn test_ez80_self_moves_become_nop() {
        let asm = asm_line("ez80", "ld b,b");
        assert_eq!(
            asm.diagnostics()[0].message,
            "unsupported instruction, assembled as NOP"
        );
        assert_eq!(asm.current_section_bytes(), &[0x00]);
        // ld a,a survives
        assert_eq!(bytes("ez80", "ld a,a"), vec![0x7F]);
    }

    #[test]
    fn test_ez80_ld_rr_indexed() {
        assert_eq!(bytes("ez80", "ld (ix+1),bc"), vec![0xDD, 0x0F, 0x01]);
        assert_eq!(bytes("ez80", "ld bc,(ix+1)"), vec![0xDD, 0x07, 0x01]);
        assert_eq!(bytes("ez80", "ld (hl),de"), vec![0xED, 0x1F]);
        assert_eq!(bytes("ez80", "ld iy,(ix+2)"), vec![0xDD, 0x31, 0x02]);
        assert_eq!(first_error("z80", "ld (ix+1),bc"), "illegal operand");
    }

    #[test]
    fn test_gbz80_loads() {
        assert_eq!(bytes("gbz80", "ld a,(hl+)"), vec![0x2A]);
        assert_eq!(bytes("gbz80", "ld a,(hl-)"), vec![0x3A]);
        assert_eq!(bytes("gbz80", "ld (hl+),a"), vec![0x22]);
        assert_eq!(bytes("gbz80", "ld (hl-),a"), vec![0x32]);
        assert_eq!(bytes("gbz80", "ld (0x1234),sp"), vec![0x08, 0x34, 0x12]);
        assert_eq!(bytes("gbz80", "ld a,(0x1234)"), vec![0xFA, 0x34, 0x12]);
        assert_eq!(bytes("gbz80", "ld (0x1234),a"), vec![0xEA, 0x34, 0x12]);
    }

    #[test]
    fn test_arith_8bit() {
        assert_eq!(bytes("z80", "add a,b"), vec![0x80]);
        assert_eq!(bytes("z80", "adc a,(hl)"), vec![0x8E]);
        assert_eq!(bytes("z80", "sub b"), vec![0x90]);
        assert_eq!(bytes("z80", "sbc a,0x10"), vec![0xDE, 0x10]);
        assert_eq!(bytes("z80", "and b"), vec![0xA0]);
        assert_eq!(bytes("z80", "xor (hl)"), vec![0xAE]);
        assert_eq!(bytes("z80", "or 0x0F"), vec![0xF6, 0x0F]);
        assert_eq!(bytes("z80", "cp (ix+1)"), vec![0xDD, 0xBE, 0x01]);
        assert_eq!(bytes("z80", "and 0xF0"), vec![0xE6, 0xF0]);
    }

    #[test]
    fn test_redundant_a_prefix_gating() {
        // `and a,b` is an eZ80/SDCC spelling
        assert_eq!(first_error("z80", "and a,b"), "illegal operand");
        assert_eq!(bytes("ez80", "and a,b"), vec![0xA0]);
    }

    #[test]
    fn test_gbz80_sub_requires_a() {
        assert_eq!(
            first_error("gbz80", "sub b"),
            "bad instruction syntax"
        );
        assert_eq!(bytes("gbz80", "sub a,b"), vec![0x90]);
    }

    #[test]
    fn test_arith_16bit() {
        assert_eq!(bytes("z80", "add hl,bc"), vec![0x09]);
        assert_eq!(bytes("z80", "add hl,hl"), vec![0x29]);
        assert_eq!(bytes("z80", "add ix,bc"), vec![0xDD, 0x09]);
        assert_eq!(bytes("z80", "add ix,ix"), vec![0xDD, 0x29]);
        assert_eq!(bytes("z80", "adc hl,de"), vec![0xED, 0x5A]);
        assert_eq!(bytes("z80", "sbc hl,bc"), vec![0xED, 0x42]);
        assert_eq!(first_error("z80", "add hl,ix"), "illegal operand");
        assert_eq!(first_error("z80", "add ix,iy"), "illegal operand");
    }

    #[test]
    fn test_z80n_add_forms() {
        assert_eq!(bytes("z80n", "add hl,a"), vec![0xED, 0x31]);
        assert_eq!(bytes("z80n", "add bc,a"), vec![0xED, 0x33]);
        assert_eq!(
            bytes("z80n", "add de,0x8000"),
            vec![0xED, 0x35, 0x00, 0x80]
        );
        assert_eq!(first_error("z80", "add bc,de"), "illegal operand");
    }

    #[test]
    fn test_gbz80_add_sp() {
        assert_eq!(bytes("gbz80", "add sp,4"), vec![0xE8, 0x04]);
        assert_eq!(bytes("gbz80", "add sp,-4"), vec![0xE8, 0xFC]);
        assert_eq!(first_error("z80", "add sp,4"), "illegal operand");
    }

    #[test]
    fn test_inc_dec() {
        assert_eq!(bytes("z80", "inc a"), vec![0x3C]);
        assert_eq!(bytes("z80", "inc (hl)"), vec![0x34]);
        assert_eq!(bytes("z80", "inc bc"), vec![0x03]);
        assert_eq!(bytes("z80", "inc sp"), vec![0x33]);
        assert_eq!(bytes("z80", "inc ix"), vec![0xDD, 0x23]);
        assert_eq!(bytes("z80", "dec iy"), vec![0xFD, 0x2B]);
        assert_eq!(bytes("z80", "dec (ix+1)"), vec![0xDD, 0x35, 0x01]);
        assert_eq!(bytes("z80+xyhl", "inc ixh"), vec![0xDD, 0x24]);
    }

    #[test]
    fn test_rotates_and_shifts() {
        assert_eq!(bytes("z80", "rlc b"), vec![0xCB, 0x00]);
        assert_eq!(bytes("z80", "rl (hl)"), vec![0xCB, 0x16]);
        assert_eq!(bytes("z80", "sra a"), vec![0xCB, 0x2F]);
        assert_eq!(bytes("z80", "srl (ix+1)"), vec![0xDD, 0xCB, 0x01, 0x3E]);
    }

    #[test]
    fn test_rotate_store_back_gating() {
        // undocumented DD CB dd oo with a register store-back
        assert_eq!(
            bytes("z80+xdcb", "rl (ix+1),c"),
            vec![0xDD, 0xCB, 0x01, 0x11]
        );
        assert_eq!(
            warnings("z80", "rl (ix+1),c"),
            vec!["undocumented instruction".to_owned()]
        );
        // the built-in default (no -march) rejects unportable forms
        let mut asm = Assembler::new(Config::default());
        asm.assemble_line("rl (ix+1),c");
        assert_eq!(asm.diagnostics()[0].message, "illegal operand");
    }

    #[test]
    fn test_sli_spellings() {
        assert_eq!(bytes("z80+sli", "sli a"), vec![0xCB, 0x37]);
        assert_eq!(bytes("z80+sli", "sll b"), vec![0xCB, 0x30]);
        assert_eq!(bytes("z80n", "sl1 (hl)"), vec![0xCB, 0x36]);
        assert_eq!(
            first_error("z80", "sli a"),
            "Unknown instruction `sli'"
        );
    }

    #[test]
    fn test_bit_res_set() {
        assert_eq!(bytes("z80", "bit 3,(hl)"), vec![0xCB, 0x5E]);
        assert_eq!(bytes("z80", "bit 7,a"), vec![0xCB, 0x7F]);
        assert_eq!(bytes("z80", "res 0,b"), vec![0xCB, 0x80]);
        assert_eq!(bytes("z80", "set 1,(ix+2)"), vec![0xDD, 0xCB, 0x02, 0xCE]);
        assert_eq!(first_error("z80", "bit 8,a"), "illegal operand");
        assert_eq!(first_error("z80", "bit a,1"), "illegal operand");
    }

    #[test]
    fn test_jumps() {
        assert_eq!(bytes("z80", "jp 0x1234"), vec![0xC3, 0x34, 0x12]);
        assert_eq!(bytes("z80", "jp nz,0x1234"), vec![0xC2, 0x34, 0x12]);
        assert_eq!(bytes("z80", "jp m,0x1234"), vec![0xFA, 0x34, 0x12]);
        assert_eq!(bytes("z80", "jp (hl)"), vec![0xE9]);
        assert_eq!(bytes("z80", "jp (ix)"), vec![0xDD, 0xE9]);
        assert_eq!(bytes("z80n", "jp (c)"), vec![0xED, 0x98]);
        assert_eq!(bytes("z80", "call 0x1234"), vec![0xCD, 0x34, 0x12]);
        assert_eq!(bytes("z80", "call pe,0x1234"), vec![0xEC, 0x34, 0x12]);
        assert_eq!(bytes("z80", "ret"), vec![0xC9]);
        assert_eq!(bytes("z80", "ret z"), vec![0xC8]);
        assert_eq!(bytes("z80", "ret nc"), vec![0xD0]);
    }

    #[test]
    fn test_relative_jumps() {
        let asm = asm_line("z80", "jr $");
        assert_eq!(asm.diagnostics(), &[] as &[Diagnostic]);
        assert_eq!(asm.finish().sections[0].bytes, vec![0x18, 0xFE]);

        let asm = asm_line("z80", "djnz $");
        assert_eq!(asm.finish().sections[0].bytes, vec![0x10, 0xFE]);

        let asm = asm_line("z80", "jr c,$");
        assert_eq!(asm.finish().sections[0].bytes, vec![0x38, 0xFE]);
    }

    #[test]
    fn test_jr_condition_subset() {
        assert_eq!(
            first_error("z80", "jr po,$"),
            "condition code invalid for jr"
        );
        assert_eq!(
            first_error("z80", "jr 0x1000"),
            "cannot make a relative jump to an absolute location"
        );
    }

    #[test]
    fn test_ex_forms() {
        assert_eq!(bytes("z80", "ex af,af'"), vec![0x08]);
        assert_eq!(bytes("z80", "ex de,hl"), vec![0xEB]);
        assert_eq!(bytes("z80", "ex (sp),hl"), vec![0xE3]);
        assert_eq!(bytes("z80", "ex (sp),ix"), vec![0xDD, 0xE3]);
        assert_eq!(bytes("z80", "ex (sp),iy"), vec![0xFD, 0xE3]);
        assert_eq!(first_error("z80", "ex hl,de"), "illegal operand");
    }

    #[test]
    fn test_io() {
        assert_eq!(bytes("z80", "in a,(0xFE)"), vec![0xDB, 0xFE]);
        assert_eq!(bytes("z80", "in b,(c)"), vec![0xED, 0x40]);
        assert_eq!(bytes("z80+infc", "in f,(c)"), vec![0xED, 0x70]);
        assert_eq!(bytes("z80+infc", "in (c)"), vec![0xED, 0x70]);
        // without the class, the implicit-F form only warns
        assert_eq!(
            warnings("z80", "in (c)"),
            vec!["undocumented instruction".to_owned()]
        );
        assert_eq!(bytes("z80", "out (0xFE),a"), vec![0xD3, 0xFE]);
        assert_eq!(bytes("z80", "out (c),d"), vec![0xED, 0x51]);
        assert_eq!(first_error("z80", "in b,(0xFE)"), "illegal operand");
        assert_eq!(bytes("ez80", "in a,(bc)"), vec![0xED, 0x78]);
        assert_eq!(first_error("z80", "in a,(bc)"), "illegal operand");
    }

    #[test]
    fn test_out_c_zero_gating() {
        assert_eq!(
            warnings("z80", "out (c),0"),
            vec!["undocumented instruction".to_owned()]
        );
        assert_eq!(bytes("z80+outc0", "out (c),0"), vec![0xED, 0x71]);
        assert_eq!(bytes("z80n", "out (c),0"), vec![0xED, 0x71]);

        let mut asm = Assembler::new(Config::default());
        asm.assemble_line("out (c),0");
        assert_eq!(asm.diagnostics()[0].message, "illegal operand");
    }

    #[test]
    fn test_in0_out0() {
        assert_eq!(bytes("z180", "in0 b,(5)"), vec![0xED, 0x00, 0x05]);
        assert_eq!(bytes("z180", "in0 e,(5)"), vec![0xED, 0x18, 0x05]);
        assert_eq!(bytes("z180", "out0 (5),b"), vec![0xED, 0x01, 0x05]);
        assert_eq!(
            first_error("z80", "in0 b,(5)"),
            "Unknown instruction `in0'"
        );
    }

    #[test]
    fn test_im() {
        assert_eq!(bytes("z80", "im 0"), vec![0xED, 0x46]);
        assert_eq!(bytes("z80", "im 1"), vec![0xED, 0x56]);
        assert_eq!(bytes("z80", "im 2"), vec![0xED, 0x5E]);
        assert_eq!(first_error("z80", "im 3"), "illegal operand");
    }

    #[test]
    fn test_rst_domain() {
        let vectors = [
            (0x00u8, 0xC7u8),
            (0x08, 0xCF),
            (0x10, 0xD7),
            (0x18, 0xDF),
            (0x20, 0xE7),
            (0x28, 0xEF),
            (0x30, 0xF7),
            (0x38, 0xFF),
        ];
        for (n, opcode) in vectors {
            assert_eq!(bytes("z80", &format!("rst 0x{:02X}", n)), vec![opcode]);
        }
        assert_eq!(first_error("z80", "rst 0x19"), "illegal operand");
        assert_eq!(first_error("z80", "rst 64"), "illegal operand");
    }

    #[test]
    fn test_push_pop() {
        assert_eq!(bytes("z80", "push af"), vec![0xF5]);
        assert_eq!(bytes("z80", "push bc"), vec![0xC5]);
        assert_eq!(bytes("z80", "pop hl"), vec![0xE1]);
        assert_eq!(bytes("z80", "pop ix"), vec![0xDD, 0xE1]);
        assert_eq!(first_error("z80", "push sp"), "illegal operand");
    }

    #[test]
    fn test_z80n_push_immediate() {
        let asm = asm_line("z80n", "push 0x1234");
        assert_eq!(asm.diagnostics(), &[] as &[Diagnostic]);
        // big-endian immediate
        assert_eq!(
            asm.finish().sections[0].bytes,
            vec![0xED, 0x8A, 0x12, 0x34]
        );
        assert_eq!(first_error("z80", "push 0x1234"), "illegal operand");
    }

    #[test]
    fn test_multiplies() {
        assert_eq!(bytes("z180", "mlt de"), vec![0xED, 0x5C]);
        assert_eq!(bytes("z180", "mlt sp"), vec![0xED, 0x7C]);
        assert_eq!(bytes("z80n", "mlt de"), vec![0xED, 0x30]);
        assert_eq!(first_error("z80n", "mlt bc"), "illegal operand");
        assert_eq!(bytes("z80n", "mul d,e"), vec![0xED, 0x30]);
        assert_eq!(first_error("z80n", "mul b,c"), "illegal operand");
        assert_eq!(bytes("r800", "mulub a,c"), vec![0xED, 0xCD]);
        assert_eq!(bytes("r800", "muluw hl,bc"), vec![0xED, 0xC3]);
        assert_eq!(bytes("r800", "muluw hl,sp"), vec![0xED, 0xF3]);
        assert_eq!(first_error("r800", "muluw hl,de"), "illegal operand");
    }

    #[test]
    fn test_lea_pea() {
        assert_eq!(bytes("ez80", "lea bc,ix+5"), vec![0xED, 0x02, 0x05]);
        assert_eq!(bytes("ez80", "lea bc,iy+5"), vec![0xED, 0x03, 0x05]);
        assert_eq!(bytes("ez80", "lea ix,ix+1"), vec![0xED, 0x32, 0x01]);
        assert_eq!(bytes("ez80", "lea iy,ix+1"), vec![0xED, 0x55, 0x01]);
        assert_eq!(bytes("ez80", "lea ix,iy+1"), vec![0xED, 0x54, 0x01]);
        assert_eq!(bytes("ez80", "lea iy,iy+1"), vec![0xED, 0x33, 0x01]);
        assert_eq!(bytes("ez80", "pea ix+2"), vec![0xED, 0x65, 0x02]);
        assert_eq!(bytes("ez80", "pea iy-2"), vec![0xED, 0x66, 0xFE]);
        assert_eq!(first_error("ez80", "pea hl+2"), "illegal operand");
    }

    #[test]
    fn test_z80n_specials() {
        assert_eq!(
            bytes("z80n", "nextreg 0x12,0x34"),
            vec![0xED, 0x91, 0x12, 0x34]
        );
        assert_eq!(bytes("z80n", "nextreg 0x12,a"), vec![0xED, 0x92, 0x12]);
        assert_eq!(bytes("z80n", "bsla de,b"), vec![0xED, 0x28]);
        assert_eq!(bytes("z80n", "brlc de,b"), vec![0xED, 0x2C]);
        assert_eq!(first_error("z80n", "bsla hl,b"), "illegal operand");
        assert_eq!(bytes("z80n", "swapnib"), vec![0xED, 0x23]);
        assert_eq!(bytes("z80n", "swap a"), vec![0xED, 0x23]);
        assert_eq!(bytes("z80n", "mirror"), vec![0xED, 0x24]);
        assert_eq!(bytes("z80n", "pixelad"), vec![0xED, 0x94]);
        assert_eq!(bytes("z80n", "test 5"), vec![0xED, 0x27, 0x05]);
        assert_eq!(bytes("z80n", "ldirx"), vec![0xED, 0xB4]);
    }

    #[test]
    fn test_tst() {
        assert_eq!(bytes("z180", "tst a"), vec![0xED, 0x3C]);
        assert_eq!(bytes("z180", "tst (hl)"), vec![0xED, 0x34]);
        assert_eq!(bytes("z180", "tst 3"), vec![0xED, 0x64, 0x03]);
        assert_eq!(bytes("z80n", "tst 3"), vec![0xED, 0x27, 0x03]);
        assert_eq!(bytes("z180", "tstio 7"), vec![0xED, 0x74, 0x07]);
        // the eZ80 accepts a redundant A,
        assert_eq!(bytes("ez80", "tst a,(hl)"), vec![0xED, 0x34]);
        assert_eq!(first_error("z180", "tst a,(hl)"), "illegal operand");
    }

    #[test]
    fn test_gbz80_specials() {
        assert_eq!(bytes("gbz80", "ldh a,(0x80)"), vec![0xF0, 0x80]);
        assert_eq!(bytes("gbz80", "ldh (0x80),a"), vec![0xE0, 0x80]);
        assert_eq!(bytes("gbz80", "ldh a,(c)"), vec![0xF2]);
        assert_eq!(bytes("gbz80", "ldh (c),a"), vec![0xE2]);
        assert_eq!(bytes("gbz80", "ldhl sp,8"), vec![0xF8, 0x08]);
        assert_eq!(bytes("gbz80", "swap b"), vec![0xCB, 0x30]);
        assert_eq!(bytes("gbz80", "stop"), vec![0x10]);
        assert_eq!(bytes("gbz80", "reti"), vec![0xD9]);
        assert_eq!(bytes("z80", "reti"), vec![0xED, 0x4D]);
    }

    #[test]
    fn test_gbz80_lddldi() {
        assert_eq!(bytes("gbz80", "ldi (hl),a"), vec![0x22]);
        assert_eq!(bytes("gbz80", "ldi a,(hl)"), vec![0x2A]);
        assert_eq!(bytes("gbz80", "ldd (hl),a"), vec![0x32]);
        assert_eq!(bytes("gbz80", "ldd a,(hl)"), vec![0x3A]);
        assert_eq!(bytes("z80", "ldi"), vec![0xED, 0xA0]);
        assert_eq!(bytes("z80", "ldd"), vec![0xED, 0xA8]);
        assert_eq!(first_error("gbz80", "ldi (de),a"), "illegal operand");
    }

    #[test]
    fn test_operandless() {
        assert_eq!(bytes("z80", "nop"), vec![0x00]);
        assert_eq!(bytes("z80", "halt"), vec![0x76]);
        assert_eq!(bytes("z80", "exx"), vec![0xD9]);
        assert_eq!(bytes("z80", "neg"), vec![0xED, 0x44]);
        assert_eq!(bytes("z80", "rld"), vec![0xED, 0x6F]);
        assert_eq!(bytes("z80", "cpir"), vec![0xED, 0xB1]);
        assert_eq!(bytes("z180", "slp"), vec![0xED, 0x76]);
        assert_eq!(bytes("ez80", "stmix"), vec![0xED, 0x7D]);
        assert_eq!(bytes("ez80", "indm"), vec![0xED, 0x8A]);
    }

    #[test]
    fn test_index_half_in_arithmetic() {
        assert_eq!(bytes("z80+xyhl", "and ixl"), vec![0xDD, 0xA5]);
        assert_eq!(bytes("z80+xyhl", "add a,iyh"), vec![0xFD, 0x84]);
        // without the class the name does not resolve as a register and
        // falls back to an ordinary (undefined) symbol
        let asm = asm_line("z80-xyhl", "and ixl");
        assert_eq!(asm.diagnostics(), &[] as &[Diagnostic]);
        assert_eq!(asm.current_section_bytes(), &[0xE6, 0x00]);
        assert_eq!(asm.current_section_fixups().len(), 1);
    }

    #[test]
    fn test_immediate_with_register_is_illegal() {
        assert_eq!(first_error("z80", "ld a,hl+1"), "illegal operand");
        assert_eq!(first_error("z80", "call hl"), "illegal operand");
        assert_eq!(first_error("z80", "and (5)"), "illegal operand");
    }
}
