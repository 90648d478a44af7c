// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE, LICENSE.additional and CONTRIBUTING.

use bitflags::bitflags;

use crate::ElfMach;

/// The selected processor. Exactly one is active at any time; optional
/// behavior on top of it is expressed through `Features`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Cpu {
    Z80,
    R800,
    Gbz80,
    Z180,
    Ez80,
    Z80n,
}

bitflags! {
    /// A set of CPUs, used to gate mnemonic and register table entries.
    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    pub struct CpuSet: u8 {
        const Z80 = 1 << 0;
        const R800 = 1 << 1;
        const GBZ80 = 1 << 2;
        const Z180 = 1 << 3;
        const EZ80 = 1 << 4;
        const Z80N = 1 << 5;

        const NOT_GBZ80 = Self::Z80.bits()
            | Self::R800.bits()
            | Self::Z180.bits()
            | Self::EZ80.bits()
            | Self::Z80N.bits();
    }
}

bitflags! {
    /// Optional instruction classes on top of the base CPU.
    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    pub struct Features: u8 {
        /// IXH/IXL/IYH/IYL as 8-bit operands
        const IDX_HALF = 1 << 0;
        /// IN F,(C)
        const IN_F_C = 1 << 1;
        /// OUT (C),0
        const OUT_C_0 = 1 << 2;
        /// the shift known as SLI, SLL or SL1
        const SLI = 1 << 3;
        /// forms like SLA (IX+d),B which also store the result in B
        const ROT_II_LD = 1 << 4;

        const UNDOCUMENTED = Self::IDX_HALF.bits() | Self::IN_F_C.bits();
        const UNPORTABLE =
            Self::OUT_C_0.bits() | Self::SLI.bits() | Self::ROT_II_LD.bits();
    }
}

impl Cpu {
    pub fn as_set(self) -> CpuSet {
        match self {
            Cpu::Z80 => CpuSet::Z80,
            Cpu::R800 => CpuSet::R800,
            Cpu::Gbz80 => CpuSet::GBZ80,
            Cpu::Z180 => CpuSet::Z180,
            Cpu::Ez80 => CpuSet::EZ80,
            Cpu::Z80n => CpuSet::Z80N,
        }
    }
}

/// eZ80 memory model. `Adl` (24-bit addresses and data) is only reachable
/// when the CPU is the eZ80.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CpuMode {
    Z80,
    Adl,
}

/// Per-instruction shadow of the CPU mode. Reset at the start of every
/// instruction and overridden by an eZ80 mnemonic suffix, which also sets
/// `forced`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct InstrMode {
    pub long_data: bool,
    pub long_inst: bool,
    pub forced: bool,
}

impl InstrMode {
    pub fn for_mode(mode: CpuMode) -> InstrMode {
        let long = mode == CpuMode::Adl;
        InstrMode {
            long_data: long,
            long_inst: long,
            forced: false,
        }
    }
}

/// Admissibility gate of a mnemonic or register table entry: the entry is
/// usable when the active CPU is a member, or when one of the listed
/// features is currently accepted.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Gate {
    pub cpus: CpuSet,
    pub features: Features,
}

impl Gate {
    pub const ALL: Gate = Gate {
        cpus: CpuSet::all(),
        features: Features::empty(),
    };

    pub const fn cpus(cpus: CpuSet) -> Gate {
        Gate {
            cpus,
            features: Features::empty(),
        }
    }

    pub const fn class(cpus: CpuSet, features: Features) -> Gate {
        Gate { cpus, features }
    }
}

/// What using a gated feature should do under the current dialect.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FeatureVerdict {
    Accept,
    Warn,
    Reject,
}

/// The complete dialect state: which CPU, which optional classes are
/// silently accepted or hard errors, the eZ80 memory model, and the
/// compatibility switches. Threaded explicitly through the assembler,
/// never global.
#[derive(Debug, PartialEq, Clone)]
pub struct Dialect {
    pub cpu: Cpu,
    pub accept: Features,
    pub reject: Features,
    pub cpu_mode: CpuMode,
    pub sdcc_compat: bool,
    pub colonless_labels: bool,
    pub local_label_prefix: Option<String>,
}

impl Default for Dialect {
    // The built-in default is `z80+xyhl+infc` with the unportable group
    // rejected; an explicit `-march=z80` leaves `reject` empty so the
    // unportable forms only warn.
    fn default() -> Dialect {
        Dialect {
            cpu: Cpu::Z80,
            accept: Features::UNDOCUMENTED,
            reject: Features::UNPORTABLE,
            cpu_mode: CpuMode::Z80,
            sdcc_compat: false,
            colonless_labels: false,
            local_label_prefix: None,
        }
    }
}

impl Dialect {
    pub fn is(&self, set: CpuSet) -> bool {
        set.contains(self.cpu.as_set())
    }

    pub fn is_adl(&self) -> bool {
        self.cpu_mode == CpuMode::Adl
    }

    pub fn permits(&self, gate: Gate) -> bool {
        gate.cpus.contains(self.cpu.as_set()) || self.accept.intersects(gate.features)
    }

    /// Accept / warn / reject decision for an optional instruction class.
    pub fn feature_verdict(&self, features: Features) -> FeatureVerdict {
        if self.accept.contains(features) {
            FeatureVerdict::Accept
        } else if self.reject.intersects(features) {
            FeatureVerdict::Reject
        } else {
            FeatureVerdict::Warn
        }
    }

    pub fn elf_mach(&self) -> ElfMach {
        match self.cpu {
            Cpu::Z80 => ElfMach::Z80,
            Cpu::R800 => ElfMach::R800,
            Cpu::Z180 => ElfMach::Z180,
            Cpu::Gbz80 => ElfMach::Gbz80,
            Cpu::Ez80 => {
                if self.cpu_mode == CpuMode::Adl {
                    ElfMach::Ez80Adl
                } else {
                    ElfMach::Ez80Z80
                }
            }
            Cpu::Z80n => ElfMach::Z80n,
        }
    }
}
