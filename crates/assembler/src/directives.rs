// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE, LICENSE.additional and CONTRIBUTING.

use zax_parser::{expr::Expr, operand::Operand};
use zax_types::{
    dialect::{Cpu, CpuMode, CpuSet},
    RelocKind,
};

use crate::{float, float::FloatFormat, Assembler};

pub(crate) type DirFn = for<'a> fn(&mut Assembler, &'a str);

// Sorted is not required here; the table is small and scanned linearly.
// Names carry their dots exactly as accepted in source; a dotted token
// also matches an undotted entry (".db" works like "db").
static DIRECTIVE_TABLE: &[(&str, DirFn)] = &[
    (".area", dir_area),
    (".assume", dir_assume),
    (".ez80", dir_ez80),
    (".gbz80", dir_gbz80),
    (".hd64", dir_z180), // undocumented alias of .z180
    (".module", dir_ignore),
    (".optsdcc", dir_ignore),
    (".r800", dir_r800),
    (".set", dir_set),
    (".z180", dir_z180),
    (".z80", dir_z80),
    (".z80n", dir_z80n),
    ("d24", dir_cons3),
    ("d32", dir_cons4),
    ("db", dir_data),
    ("def24", dir_cons3),
    ("def32", dir_cons4),
    ("defb", dir_data),
    ("defm", dir_data),
    ("defs", dir_space),
    ("defw", dir_cons2),
    ("double", dir_double),
    ("ds", dir_space),
    ("dw", dir_cons2),
    ("float", dir_float),
    ("psect", dir_psect),
    ("xdef", dir_xdef),
    ("xref", dir_ignore),
];

pub(crate) fn lookup_directive(token: &str) -> Option<DirFn> {
    let find = |name: &str| {
        DIRECTIVE_TABLE
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
    };
    find(token).or_else(|| token.strip_prefix('.').and_then(find))
}

fn dir_ignore(_asm: &mut Assembler, _args: &str) {}

/// SDCC `.area NAME(attributes)`: the attribute tail is discarded.
fn dir_area(asm: &mut Assembler, args: &str) {
    if !asm.dialect.sdcc_compat {
        asm.error("Invalid directive");
        return;
    }
    let name = args.split('(').next().unwrap_or("").trim();
    if name.is_empty() {
        asm.error("bad expression syntax");
        return;
    }
    asm.switch_section(name);
}

fn dir_psect(asm: &mut Assembler, args: &str) {
    let name = args.split('(').next().unwrap_or("").trim();
    if name.is_empty() {
        asm.error("bad expression syntax");
        return;
    }
    asm.switch_section(name);
}

/// `.assume ADL=n`.
fn dir_assume(asm: &mut Assembler, args: &str) {
    let t = args.trim();
    if t.len() < 3 || !t[..3].eq_ignore_ascii_case("adl") {
        asm.ill_op();
        return;
    }
    let t = t[3..].trim_start();
    let Some(t) = t.strip_prefix('=') else {
        asm.error("assignment expected");
        return;
    };
    match t.trim() {
        "0" => set_cpu_mode(asm, CpuMode::Z80),
        "1" => set_cpu_mode(asm, CpuMode::Adl),
        _ => asm.ill_op(),
    }
}

fn set_cpu_mode(asm: &mut Assembler, mode: CpuMode) {
    if !asm.dialect.is(CpuSet::EZ80) {
        asm.error("CPU mode is unsupported by target");
        return;
    }
    asm.dialect.cpu_mode = mode;
}

/// The SDCC dialect-switch directives replace the CPU and drop back to
/// Z80 mode; the feature accept/reject state is untouched.
fn set_cpu(asm: &mut Assembler, cpu: Cpu) {
    if !asm.dialect.sdcc_compat {
        asm.error("Invalid directive");
        return;
    }
    if asm.dialect.cpu != cpu {
        asm.dialect.cpu = cpu;
        asm.dialect.cpu_mode = CpuMode::Z80;
    }
}

fn dir_z80(asm: &mut Assembler, _args: &str) {
    set_cpu(asm, Cpu::Z80);
}

fn dir_z180(asm: &mut Assembler, _args: &str) {
    set_cpu(asm, Cpu::Z180);
}

fn dir_ez80(asm: &mut Assembler, _args: &str) {
    set_cpu(asm, Cpu::Ez80);
}

fn dir_gbz80(asm: &mut Assembler, _args: &str) {
    set_cpu(asm, Cpu::Gbz80);
}

fn dir_r800(asm: &mut Assembler, _args: &str) {
    set_cpu(asm, Cpu::R800);
}

fn dir_z80n(asm: &mut Assembler, _args: &str) {
    set_cpu(asm, Cpu::Z80n);
}

/// db/defb/defm: strings and byte expressions.
fn dir_data(asm: &mut Assembler, args: &str) {
    let mut p = args.trim_start();
    if p.is_empty() {
        return;
    }
    loop {
        if p.starts_with('"') || p.starts_with('\'') {
            let quote = p.as_bytes()[0] as char;
            match p[1..].find(quote) {
                Some(end) => {
                    let content = p[1..1 + end].to_owned();
                    asm.emit_bytes(content.as_bytes());
                    p = p[2 + end..].trim_start();
                }
                None => {
                    asm.warn("unterminated string");
                    let content = p[1..].to_owned();
                    asm.emit_bytes(content.as_bytes());
                    p = "";
                }
            }
        } else {
            let Some((op, rest)) = asm.parse_op(p) else {
                return;
            };
            p = rest;
            match op {
                Operand::MemoryAddress(e) => {
                    asm.warn("parentheses ignored");
                    asm.emit_byte_expr(&e, RelocKind::Abs8);
                }
                Operand::Immediate(e) => asm.emit_byte_expr(&e, RelocKind::Abs8),
                _ => {
                    asm.ill_op();
                    return;
                }
            }
            p = p.trim_start();
        }
        match p.strip_prefix(',') {
            Some(t) => p = t.trim_start(),
            None => break,
        }
    }
}

/// dw/d24/d32 and friends: fixed-width data with byte/word select
/// rewriting in the emitter.
fn z80_cons(asm: &mut Assembler, args: &str, size: usize) {
    let mut p = args.trim_start();
    if p.is_empty() {
        return;
    }
    loop {
        let Some((op, rest)) = asm.parse_op(p) else {
            return;
        };
        p = rest;
        match op {
            Operand::MemoryAddress(e) => {
                asm.warn("parentheses ignored");
                asm.emit_data_val(&e, size);
            }
            Operand::Immediate(e) => asm.emit_data_val(&e, size),
            _ => {
                asm.ill_op();
                return;
            }
        }
        p = p.trim_start();
        match p.strip_prefix(',') {
            Some(t) => p = t.trim_start(),
            None => break,
        }
    }
}

fn dir_cons2(asm: &mut Assembler, args: &str) {
    z80_cons(asm, args, 2);
}

fn dir_cons3(asm: &mut Assembler, args: &str) {
    z80_cons(asm, args, 3);
}

fn dir_cons4(asm: &mut Assembler, args: &str) {
    z80_cons(asm, args, 4);
}

/// ds/defs: reserve bytes, optionally with a fill value.
fn dir_space(asm: &mut Assembler, args: &str) {
    let Some((count, rest)) = asm.parse_op(args) else {
        return;
    };
    let count = match count {
        Operand::Immediate(Expr::Const(n)) if n >= 0 => n as usize,
        _ => {
            asm.error("bad expression syntax");
            return;
        }
    };
    let mut fill = 0u8;
    if let Some(tail) = rest.trim_start().strip_prefix(',') {
        match asm.parse_op(tail) {
            Some((Operand::Immediate(Expr::Const(v)), _)) => fill = v as u8,
            Some(_) => {
                asm.error("bad expression syntax");
                return;
            }
            None => return,
        }
    }
    let bytes = vec![fill; count];
    asm.emit_bytes(&bytes);
}

/// `.set name, expr`: a redefinable assignment.
fn dir_set(asm: &mut Assembler, args: &str) {
    let t = args.trim_start();
    let name_len = t
        .find(|c: char| !zax_parser::expr::is_name_char(c))
        .unwrap_or(t.len());
    if name_len == 0 {
        asm.error("bad expression syntax");
        return;
    }
    let name = t[..name_len].to_owned();
    let rest = t[name_len..].trim_start();
    let Some(value) = rest.strip_prefix(',') else {
        asm.error("bad expression syntax");
        return;
    };
    asm.handle_assignment(&name, value.trim(), true);
}

/// xdef: export symbols.
fn dir_xdef(asm: &mut Assembler, args: &str) {
    for name in args.split(',') {
        let name = name.trim();
        if !name.is_empty() {
            asm.symbols.mark_global(name);
        }
    }
}

fn emit_float_list(asm: &mut Assembler, args: &str, format: FloatFormat) {
    for part in args.split(',') {
        match float::encode_float(format, part.trim()) {
            Ok(bytes) => asm.emit_bytes(&bytes),
            Err(e) => {
                asm.error(&e.message);
                return;
            }
        }
    }
}

/// `.float`: single precision literals through the `-fp-s` encoder.
fn dir_float(asm: &mut Assembler, args: &str) {
    let format = asm.fp_single.unwrap_or(FloatFormat::Single);
    emit_float_list(asm, args, format);
}

/// `.double`: double precision literals through the `-fp-d` encoder.
fn dir_double(asm: &mut Assembler, args: &str) {
    let format = asm.fp_double.unwrap_or(FloatFormat::Double);
    emit_float_list(asm, args, format);
}
