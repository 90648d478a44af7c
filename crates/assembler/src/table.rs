// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE, LICENSE.additional and CONTRIBUTING.

use zax_types::dialect::{CpuSet, Features, Gate};

use crate::{insn, Assembler};

pub(crate) type EmitFn = for<'a> fn(&mut Assembler, u8, u8, &'a str) -> &'a str;

pub struct InsnEntry {
    pub name: &'static str,
    pub prefix: u8,
    pub opcode: u8,
    pub(crate) emit: EmitFn,
    pub gate: Gate,
}

const ALL: Gate = Gate::ALL;
const NOT_GB: Gate = Gate::cpus(CpuSet::NOT_GBZ80);
const GB: Gate = Gate::cpus(CpuSet::GBZ80);
const EZ80: Gate = Gate::cpus(CpuSet::EZ80);
const Z80N: Gate = Gate::cpus(CpuSet::Z80N);
const R800: Gate = Gate::cpus(CpuSet::R800);
const Z180_EZ80: Gate = Gate::cpus(CpuSet::Z180.union(CpuSet::EZ80));
const MLT_CPUS: Gate = Gate::cpus(CpuSet::Z180.union(CpuSet::EZ80).union(CpuSet::Z80N));
const SLI_GATE: Gate = Gate::class(CpuSet::Z80N, Features::SLI);
const GB_Z80N: Gate = Gate::cpus(CpuSet::GBZ80.union(CpuSet::Z80N));

macro_rules! entry {
    ($name:literal, $prefix:literal, $opcode:literal, $emit:path, $gate:expr) => {
        InsnEntry {
            name: $name,
            prefix: $prefix,
            opcode: $opcode,
            emit: $emit,
            gate: $gate,
        }
    };
}

// Sorted by mnemonic; resolved with a binary search.
pub(crate) static INSTRUCTION_TABLE: &[InsnEntry] = &[
    entry!("adc", 0x88, 0x4A, insn::emit_adc, ALL),
    entry!("add", 0x80, 0x09, insn::emit_add, ALL),
    entry!("and", 0x00, 0xA0, insn::emit_s, ALL),
    entry!("bit", 0xCB, 0x40, insn::emit_bit, ALL),
    entry!("brlc", 0xED, 0x2C, insn::emit_bshft, Z80N),
    entry!("bsla", 0xED, 0x28, insn::emit_bshft, Z80N),
    entry!("bsra", 0xED, 0x29, insn::emit_bshft, Z80N),
    entry!("bsrf", 0xED, 0x2B, insn::emit_bshft, Z80N),
    entry!("bsrl", 0xED, 0x2A, insn::emit_bshft, Z80N),
    entry!("call", 0xCD, 0xC4, insn::emit_jpcc, ALL),
    entry!("ccf", 0x00, 0x3F, insn::emit_insn, ALL),
    entry!("cp", 0x00, 0xB8, insn::emit_s, ALL),
    entry!("cpd", 0xED, 0xA9, insn::emit_insn, NOT_GB),
    entry!("cpdr", 0xED, 0xB9, insn::emit_insn, NOT_GB),
    entry!("cpi", 0xED, 0xA1, insn::emit_insn, NOT_GB),
    entry!("cpir", 0xED, 0xB1, insn::emit_insn, NOT_GB),
    entry!("cpl", 0x00, 0x2F, insn::emit_insn, ALL),
    entry!("daa", 0x00, 0x27, insn::emit_insn, ALL),
    entry!("dec", 0x0B, 0x05, insn::emit_incdec, ALL),
    entry!("di", 0x00, 0xF3, insn::emit_insn, ALL),
    entry!("djnz", 0x00, 0x10, insn::emit_jr, NOT_GB),
    entry!("ei", 0x00, 0xFB, insn::emit_insn, ALL),
    entry!("ex", 0x00, 0x00, insn::emit_ex, NOT_GB),
    entry!("exx", 0x00, 0xD9, insn::emit_insn, NOT_GB),
    entry!("halt", 0x00, 0x76, insn::emit_insn, ALL),
    entry!("im", 0xED, 0x46, insn::emit_im, NOT_GB),
    entry!("in", 0x00, 0x00, insn::emit_in, NOT_GB),
    entry!("in0", 0xED, 0x00, insn::emit_in0, Z180_EZ80),
    entry!("inc", 0x03, 0x04, insn::emit_incdec, ALL),
    entry!("ind", 0xED, 0xAA, insn::emit_insn, NOT_GB),
    entry!("ind2", 0xED, 0x8C, insn::emit_insn, EZ80),
    entry!("ind2r", 0xED, 0x9C, insn::emit_insn, EZ80),
    entry!("indm", 0xED, 0x8A, insn::emit_insn, EZ80),
    entry!("indmr", 0xED, 0x9A, insn::emit_insn, EZ80),
    entry!("indr", 0xED, 0xBA, insn::emit_insn, NOT_GB),
    entry!("indrx", 0xED, 0xCA, insn::emit_insn, EZ80),
    entry!("ini", 0xED, 0xA2, insn::emit_insn, NOT_GB),
    entry!("ini2", 0xED, 0x84, insn::emit_insn, EZ80),
    entry!("ini2r", 0xED, 0x94, insn::emit_insn, EZ80),
    entry!("inim", 0xED, 0x82, insn::emit_insn, EZ80),
    entry!("inimr", 0xED, 0x92, insn::emit_insn, EZ80),
    entry!("inir", 0xED, 0xB2, insn::emit_insn, NOT_GB),
    entry!("inirx", 0xED, 0xC2, insn::emit_insn, EZ80),
    entry!("jp", 0xC3, 0xC2, insn::emit_jpcc, ALL),
    entry!("jr", 0x18, 0x20, insn::emit_jrcc, ALL),
    entry!("ld", 0x00, 0x00, insn::emit_ld, ALL),
    entry!("ldd", 0xED, 0xA8, insn::emit_lddldi, ALL),
    entry!("lddr", 0xED, 0xB8, insn::emit_insn, NOT_GB),
    entry!("lddrx", 0xED, 0xBC, insn::emit_insn, Z80N),
    entry!("lddx", 0xED, 0xAC, insn::emit_insn, Z80N),
    entry!("ldh", 0xE0, 0x00, insn::emit_ldh, GB),
    entry!("ldhl", 0x00, 0xF8, insn::emit_ldhl, GB),
    entry!("ldi", 0xED, 0xA0, insn::emit_lddldi, ALL),
    entry!("ldir", 0xED, 0xB0, insn::emit_insn, NOT_GB),
    entry!("ldirx", 0xED, 0xB4, insn::emit_insn, Z80N),
    entry!("ldix", 0xED, 0xA4, insn::emit_insn, Z80N),
    entry!("ldpirx", 0xED, 0xB7, insn::emit_insn, Z80N),
    entry!("ldws", 0xED, 0xA5, insn::emit_insn, Z80N),
    entry!("lea", 0xED, 0x02, insn::emit_lea, EZ80),
    entry!("mirror", 0xED, 0x24, insn::emit_insn, Z80N),
    entry!("mlt", 0xED, 0x4C, insn::emit_mlt, MLT_CPUS),
    entry!("mul", 0xED, 0x30, insn::emit_mul, Z80N),
    entry!("mulub", 0xED, 0xC5, insn::emit_mulub, R800),
    entry!("muluw", 0xED, 0xC3, insn::emit_muluw, R800),
    entry!("neg", 0xED, 0x44, insn::emit_insn, NOT_GB),
    entry!("nextreg", 0xED, 0x91, insn::emit_nextreg, Z80N),
    entry!("nop", 0x00, 0x00, insn::emit_insn, ALL),
    entry!("or", 0x00, 0xB0, insn::emit_s, ALL),
    entry!("otd2r", 0xED, 0xBC, insn::emit_insn, EZ80),
    entry!("otdm", 0xED, 0x8B, insn::emit_insn, Z180_EZ80),
    entry!("otdmr", 0xED, 0x9B, insn::emit_insn, Z180_EZ80),
    entry!("otdr", 0xED, 0xBB, insn::emit_insn, NOT_GB),
    entry!("otdrx", 0xED, 0xCB, insn::emit_insn, EZ80),
    entry!("oti2r", 0xED, 0xB4, insn::emit_insn, EZ80),
    entry!("otim", 0xED, 0x83, insn::emit_insn, Z180_EZ80),
    entry!("otimr", 0xED, 0x93, insn::emit_insn, Z180_EZ80),
    entry!("otir", 0xED, 0xB3, insn::emit_insn, NOT_GB),
    entry!("otirx", 0xED, 0xC3, insn::emit_insn, EZ80),
    entry!("out", 0x00, 0x00, insn::emit_out, NOT_GB),
    entry!("out0", 0xED, 0x01, insn::emit_out0, Z180_EZ80),
    entry!("outd", 0xED, 0xAB, insn::emit_insn, NOT_GB),
    entry!("outd2", 0xED, 0xAC, insn::emit_insn, EZ80),
    entry!("outi", 0xED, 0xA3, insn::emit_insn, NOT_GB),
    entry!("outi2", 0xED, 0xA4, insn::emit_insn, EZ80),
    entry!("outinb", 0xED, 0x90, insn::emit_insn, Z80N),
    entry!("pea", 0xED, 0x65, insn::emit_pea, EZ80),
    entry!("pixelad", 0xED, 0x94, insn::emit_insn, Z80N),
    entry!("pixeldn", 0xED, 0x93, insn::emit_insn, Z80N),
    entry!("pop", 0x00, 0xC1, insn::emit_pop, ALL),
    entry!("push", 0x00, 0xC5, insn::emit_push, ALL),
    entry!("res", 0xCB, 0x80, insn::emit_bit, ALL),
    entry!("ret", 0xC9, 0xC0, insn::emit_retcc, ALL),
    entry!("reti", 0xED, 0x4D, insn::emit_reti, ALL),
    entry!("retn", 0xED, 0x45, insn::emit_insn, NOT_GB),
    entry!("rl", 0xCB, 0x10, insn::emit_mr, ALL),
    entry!("rla", 0x00, 0x17, insn::emit_insn, ALL),
    entry!("rlc", 0xCB, 0x00, insn::emit_mr, ALL),
    entry!("rlca", 0x00, 0x07, insn::emit_insn, ALL),
    entry!("rld", 0xED, 0x6F, insn::emit_insn, NOT_GB),
    entry!("rr", 0xCB, 0x18, insn::emit_mr, ALL),
    entry!("rra", 0x00, 0x1F, insn::emit_insn, ALL),
    entry!("rrc", 0xCB, 0x08, insn::emit_mr, ALL),
    entry!("rrca", 0x00, 0x0F, insn::emit_insn, ALL),
    entry!("rrd", 0xED, 0x67, insn::emit_insn, NOT_GB),
    entry!("rsmix", 0xED, 0x7E, insn::emit_insn, EZ80),
    entry!("rst", 0x00, 0xC7, insn::emit_rst, ALL),
    entry!("sbc", 0x98, 0x42, insn::emit_adc, ALL),
    entry!("scf", 0x00, 0x37, insn::emit_insn, ALL),
    entry!("set", 0xCB, 0xC0, insn::emit_bit, ALL),
    entry!("setae", 0xED, 0x95, insn::emit_insn, Z80N),
    entry!("sl1", 0xCB, 0x30, insn::emit_mr, SLI_GATE),
    entry!("sla", 0xCB, 0x20, insn::emit_mr, ALL),
    entry!("sli", 0xCB, 0x30, insn::emit_mr, SLI_GATE),
    entry!("sll", 0xCB, 0x30, insn::emit_mr, SLI_GATE),
    entry!("slp", 0xED, 0x76, insn::emit_insn, Z180_EZ80),
    entry!("sra", 0xCB, 0x28, insn::emit_mr, ALL),
    entry!("srl", 0xCB, 0x38, insn::emit_mr, ALL),
    entry!("stmix", 0xED, 0x7D, insn::emit_insn, EZ80),
    entry!("stop", 0x00, 0x10, insn::emit_insn, GB),
    entry!("sub", 0x00, 0x90, insn::emit_sub, ALL),
    entry!("swap", 0xCB, 0x30, insn::emit_swap, GB_Z80N),
    entry!("swapnib", 0xED, 0x23, insn::emit_insn, Z80N),
    entry!("test", 0xED, 0x27, insn::emit_insn_n, Z80N),
    entry!("tst", 0xED, 0x04, insn::emit_tst, MLT_CPUS),
    entry!("tstio", 0xED, 0x74, insn::emit_insn_n, Z180_EZ80),
    entry!("xor", 0x00, 0xA8, insn::emit_s, ALL),
];

pub(crate) fn lookup_instruction(name: &str) -> Option<&'static InsnEntry> {
    INSTRUCTION_TABLE
        .binary_search_by(|entry| entry.name.cmp(name))
        .ok()
        .map(|idx| &INSTRUCTION_TABLE[idx])
}

// Condition codes pre-shifted left by 3 so they OR directly into the
// opcode base. The synonyms come from HiTech zas.
static CONDITION_TABLE: &[(&str, u8)] = &[
    ("age", 6 << 3),
    ("alt", 7 << 3),
    ("c", 3 << 3),
    ("di", 4 << 3),
    ("ei", 5 << 3),
    ("lge", 2 << 3),
    ("llt", 3 << 3),
    ("m", 7 << 3),
    ("nc", 2 << 3),
    ("nz", 0),
    ("p", 6 << 3),
    ("pe", 5 << 3),
    ("po", 4 << 3),
    ("z", 1 << 3),
];

/// Parse a condition code. Accepted only when the alphabetic token is
/// immediately followed by a comma or the end of the operand field.
pub(crate) fn parse_condition(s: &str) -> Option<(u8, &str)> {
    let len = s.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    if len == 0 || len > 7 {
        return None;
    }
    let after = &s[len..];
    if !(after.is_empty() || after.starts_with(',')) {
        return None;
    }
    let name = s[..len].to_ascii_lowercase();
    CONDITION_TABLE
        .binary_search_by(|(cc, _)| (*cc).cmp(name.as_str()))
        .ok()
        .map(|idx| (CONDITION_TABLE[idx].1, after))
}

/// eZ80 mnemonic suffixes with the mode-override byte emitted in ADL and
/// Z80 mode respectively. The per-instruction mode is derived from the
/// byte that was emitted.
pub(crate) static SUFFIX_TABLE: &[(&str, u8, u8)] = &[
    ("il", 0x5B, 0x52),
    ("is", 0x49, 0x40),
    ("l", 0x5B, 0x49),
    ("lil", 0x5B, 0x5B),
    ("lis", 0x49, 0x49),
    ("s", 0x52, 0x40),
    ("sil", 0x52, 0x52),
    ("sis", 0x40, 0x40),
];

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_instruction_table_is_sorted() {
        for pair in INSTRUCTION_TABLE.windows(2) {
            assert!(
                pair[0].name < pair[1].name,
                "table out of order at `{}'",
                pair[1].name
            );
        }
    }

    #[test]
    fn test_condition_lookup() {
        assert_eq!(parse_condition("nz,$"), Some((0, ",$")));
        assert_eq!(parse_condition("Z"), Some((1 << 3, "")));
        assert_eq!(parse_condition("po,addr"), Some((4 << 3, ",addr")));
        // a space terminator is not accepted
        assert_eq!(parse_condition("z extra"), None);
        assert_eq!(parse_condition("hl"), None);
    }

    #[test]
    fn test_condition_synonyms() {
        assert_eq!(parse_condition("age"), Some((6 << 3, "")));
        assert_eq!(parse_condition("llt"), Some((3 << 3, "")));
    }
}
