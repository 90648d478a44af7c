// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE, LICENSE.additional and CONTRIBUTING.

use zax_types::{dialect::Dialect, ElfMach};

// DWARF register numbering, same as GDB uses for these targets.
static DWARF_REGISTERS: &[&str] = &[
    "af", "bc", "de", "hl", "sp", "pc", "ix", "iy", "af'", "bc'", "de'", "hl'", "ir",
];

/// Map a register name to its DWARF number. The shadow registers are
/// accepted with either the quote or the underscore spelling.
pub fn regname_to_dw2regnum(name: &str) -> Option<u32> {
    let normalized = name.to_ascii_lowercase().replace('_', "'");
    DWARF_REGISTERS
        .iter()
        .position(|reg| *reg == normalized)
        .map(|i| i as u32)
}

/// DWARF address size: 3 bytes in eZ80 ADL mode, 2 otherwise.
pub fn dwarf2_addr_size(dialect: &Dialect) -> u32 {
    if dialect.elf_mach() == ElfMach::Ez80Adl {
        3
    } else {
        2
    }
}

/// The initial CFI instruction: CFA is SP+0.
pub fn initial_cfa() -> (u32, i32) {
    let sp = regname_to_dw2regnum("sp").unwrap_or(4);
    (sp, 0)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use zax_types::dialect::{Cpu, CpuMode};

    use super::*;

    #[test]
    fn test_register_numbering() {
        assert_eq!(regname_to_dw2regnum("af"), Some(0));
        assert_eq!(regname_to_dw2regnum("SP"), Some(4));
        assert_eq!(regname_to_dw2regnum("ir"), Some(12));
        assert_eq!(regname_to_dw2regnum("af'"), Some(8));
        assert_eq!(regname_to_dw2regnum("af_"), Some(8));
        assert_eq!(regname_to_dw2regnum("xy"), None);
    }

    #[test]
    fn test_addr_size() {
        let mut dialect = Dialect::default();
        assert_eq!(dwarf2_addr_size(&dialect), 2);
        dialect.cpu = Cpu::Ez80;
        dialect.cpu_mode = CpuMode::Adl;
        assert_eq!(dwarf2_addr_size(&dialect), 3);
    }

    #[test]
    fn test_initial_cfa() {
        assert_eq!(initial_cfa(), (4, 0));
    }
}
