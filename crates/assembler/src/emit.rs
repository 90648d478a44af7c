// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE, LICENSE.additional and CONTRIBUTING.

use zax_parser::expr::{BinaryOp, Expr};
use zax_types::RelocKind;

use crate::{fragment::Fixup, Assembler, Diagnostics};

pub(crate) fn signed_overflow(value: i64, bits: u32) -> bool {
    let max = (1i64 << (bits - 1)) - 1;
    let min = -max - 1;
    value < min || value > max
}

pub(crate) fn unsigned_overflow(value: u64, bits: u32) -> bool {
    if bits >= 64 {
        return false;
    }
    value > (1u64 << bits) - 1
}

pub(crate) fn is_overflow(value: i64, bits: u32) -> bool {
    if value < 0 {
        signed_overflow(value, bits)
    } else {
        unsigned_overflow(value as u64, bits)
    }
}

impl Assembler {
    pub(crate) fn emit_bytes(&mut self, bytes: &[u8]) {
        self.frag().extend(bytes);
    }

    /// Emit one byte from an expression. For the base 8-bit relocation
    /// this is plain data emission; the PC-relative and index
    /// displacement kinds get the signed range treatment.
    pub(crate) fn emit_byte_expr(&mut self, expr: &Expr, kind: RelocKind) {
        if kind == RelocKind::Abs8 {
            self.emit_data_val(expr, 1);
            return;
        }

        if expr.contains_register() {
            self.ill_op();
            return;
        }

        if let Expr::Const(v) = expr {
            let v = *v;
            if kind == RelocKind::PcRel8 {
                self.error("cannot make a relative jump to an absolute location");
            } else if !(-128..128).contains(&v) {
                if kind == RelocKind::Disp8 {
                    self.error(&format!("index overflow ({:+})", v));
                } else {
                    self.error(&format!("offset overflow ({:+})", v));
                }
            }
            self.frag().push(v as u8);
            return;
        }

        let offset = self.frag().len();
        self.frag().push(0);
        let fixup = Fixup {
            offset,
            size: 1,
            expr: expr.clone(),
            pcrel: kind == RelocKind::PcRel8,
            kind,
        };
        self.frag().add_fixup(fixup);
    }

    /// Emit an immediate word: 2 bytes, or 3 in long-instruction mode
    /// (eZ80 ADL or a forcing suffix).
    pub(crate) fn emit_word(&mut self, expr: &Expr) {
        let size = if self.inst_mode.long_inst { 3 } else { 2 };
        self.emit_data_val(expr, size);
    }

    /// Emit a data field of 1/2/3/4/8 bytes. Expressions shaped
    /// `value >> k` or `value & mask` are rewritten into byte/word select
    /// relocations so the linker can take slices of wide addresses.
    pub(crate) fn emit_data_val(&mut self, expr: &Expr, size: usize) {
        if let Expr::Const(v) = expr {
            let v = *v;
            if is_overflow(v, (size * 8) as u32) {
                self.warn(&format!("{}-bit overflow ({:+})", size * 8, v));
            }
            let mut bytes = [0u8; 8];
            for (i, b) in bytes.iter_mut().enumerate().take(size) {
                *b = (v >> (i * 8)) as u8;
            }
            self.emit_bytes(&bytes[..size]);
            return;
        }

        let mut kind = match RelocKind::for_data_size(size) {
            Some(kind) => kind,
            None => {
                self.error(&format!("unsupported BFD relocation size {}", size));
                return;
            }
        };

        if expr.contains_register() {
            self.ill_op();
            return;
        }

        let mut fixup_expr = expr;
        if size <= 2 {
            if let Expr::Binary(op @ (BinaryOp::Shr | BinaryOp::And), inner, rhs) = expr {
                if let Expr::Const(amount) = **rhs {
                    let shift = match op {
                        BinaryOp::And if amount == (1i64 << (size * 8)) - 1 => Some(0),
                        BinaryOp::Shr => Some(amount),
                        _ => None,
                    };
                    match (size, shift) {
                        (1, Some(0)) => {
                            kind = RelocKind::Byte0;
                            fixup_expr = &**inner;
                        }
                        (1, Some(8)) => {
                            kind = RelocKind::Byte1;
                            fixup_expr = &**inner;
                        }
                        (1, Some(16)) => {
                            kind = RelocKind::Byte2;
                            fixup_expr = &**inner;
                        }
                        (1, Some(24)) => {
                            kind = RelocKind::Byte3;
                            fixup_expr = &**inner;
                        }
                        (2, Some(0)) => {
                            kind = RelocKind::Word0;
                            fixup_expr = &**inner;
                        }
                        (2, Some(16)) => {
                            kind = RelocKind::Word1;
                            fixup_expr = &**inner;
                        }
                        (2, Some(8)) => {
                            // split across two byte selects to keep
                            // linker precision
                            let offset = self.frag().len();
                            self.emit_bytes(&[0, 0]);
                            let frag = self.frag();
                            frag.add_fixup(Fixup {
                                offset,
                                size: 1,
                                expr: (**inner).clone(),
                                pcrel: false,
                                kind: RelocKind::Byte1,
                            });
                            frag.add_fixup(Fixup {
                                offset: offset + 1,
                                size: 1,
                                expr: (**inner).clone(),
                                pcrel: false,
                                kind: RelocKind::Byte2,
                            });
                            return;
                        }
                        (2, Some(24)) => {
                            let offset = self.frag().len();
                            self.emit_bytes(&[0, 0]);
                            let fixup = Fixup {
                                offset,
                                size: 1,
                                expr: (**inner).clone(),
                                pcrel: false,
                                kind: RelocKind::Byte3,
                            };
                            self.frag().add_fixup(fixup);
                            return;
                        }
                        _ => {}
                    }
                }
            }
        }

        let offset = self.frag().len();
        let zeros = [0u8; 8];
        self.emit_bytes(&zeros[..size]);
        let fixup = Fixup {
            offset,
            size,
            expr: fixup_expr.clone(),
            pcrel: false,
            kind,
        };
        self.frag().add_fixup(fixup);
    }

    /// Resolve and patch every fixup whose expression evaluates against
    /// the symbol table; keep the others as relocations.
    pub(crate) fn apply_fixups(&mut self) {
        for si in 0..self.sections.len() {
            let fixups = std::mem::take(&mut self.sections[si].frag.fixups);
            let mut remaining = vec![];
            for fx in fixups {
                let value = {
                    let symbols = &self.symbols;
                    fx.expr.eval(&|name| symbols.resolve_in_section(name, si))
                };
                match value {
                    Some(mut v) => {
                        if fx.pcrel {
                            v -= fx.offset as i64;
                        }
                        write_fixup(&mut self.sections[si].frag.bytes, &mut self.diag, &fx, v);
                    }
                    None => remaining.push(fx),
                }
            }
            self.sections[si].frag.fixups = remaining;
        }
    }
}

/// Patch one resolved fixup into the byte stream, with the per-kind
/// range checks of the original.
fn write_fixup(bytes: &mut [u8], diag: &mut Diagnostics, fx: &Fixup, val: i64) {
    let p = fx.offset;
    match fx.kind {
        RelocKind::PcRel8 | RelocKind::Disp8 => {
            if signed_overflow(val, 8) {
                diag.error_always(&format!("8-bit signed offset out of range ({:+})", val));
            }
            bytes[p] = val as u8;
        }
        RelocKind::Abs8 => {
            if is_overflow(val, 8) {
                diag.warn(&format!("8-bit overflow ({:+})", val));
            }
            bytes[p] = val as u8;
        }
        RelocKind::Byte0 => bytes[p] = val as u8,
        RelocKind::Byte1 => bytes[p] = (val >> 8) as u8,
        RelocKind::Byte2 => bytes[p] = (val >> 16) as u8,
        RelocKind::Byte3 => bytes[p] = (val >> 24) as u8,
        RelocKind::Word0 => {
            bytes[p] = val as u8;
            bytes[p + 1] = (val >> 8) as u8;
        }
        RelocKind::Word1 => {
            bytes[p] = (val >> 16) as u8;
            bytes[p + 1] = (val >> 24) as u8;
        }
        RelocKind::Abs16 => {
            if is_overflow(val, 16) {
                diag.warn(&format!("16-bit overflow ({:+})", val));
            }
            bytes[p] = val as u8;
            bytes[p + 1] = (val >> 8) as u8;
        }
        RelocKind::Abs24 => {
            if is_overflow(val, 24) {
                diag.warn(&format!("24-bit overflow ({:+})", val));
            }
            for i in 0..3 {
                bytes[p + i] = (val >> (i * 8)) as u8;
            }
        }
        RelocKind::Abs32 => {
            if is_overflow(val, 32) {
                diag.warn(&format!("32-bit overflow ({:+})", val));
            }
            for i in 0..4 {
                bytes[p + i] = (val >> (i * 8)) as u8;
            }
        }
        RelocKind::Abs64 => {
            for i in 0..8 {
                bytes[p + i] = (val >> (i * 8)) as u8;
            }
        }
        RelocKind::Word16Be => {
            bytes[p] = (val >> 8) as u8;
            bytes[p + 1] = val as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_overflow_checks() {
        assert!(!signed_overflow(127, 8));
        assert!(!signed_overflow(-128, 8));
        assert!(signed_overflow(128, 8));
        assert!(signed_overflow(-129, 8));

        assert!(!unsigned_overflow(255, 8));
        assert!(unsigned_overflow(256, 8));

        // negative values take the signed check, positive the unsigned
        assert!(!is_overflow(255, 8));
        assert!(!is_overflow(-128, 8));
        assert!(is_overflow(-129, 8));
        assert!(is_overflow(256, 8));
    }

    #[test]
    fn test_write_fixup_word16_be() {
        let mut bytes = vec![0u8; 2];
        let mut diag = Diagnostics::default();
        let fx = Fixup {
            offset: 0,
            size: 2,
            expr: Expr::Const(0),
            pcrel: false,
            kind: RelocKind::Word16Be,
        };
        write_fixup(&mut bytes, &mut diag, &fx, 0x1234);
        assert_eq!(bytes, vec![0x12, 0x34]);
    }

    #[test]
    fn test_write_fixup_pcrel_range() {
        let mut bytes = vec![0u8; 1];
        let mut diag = Diagnostics::default();
        let fx = Fixup {
            offset: 0,
            size: 1,
            expr: Expr::Const(0),
            pcrel: true,
            kind: RelocKind::PcRel8,
        };
        write_fixup(&mut bytes, &mut diag, &fx, 200);
        assert_eq!(
            diag.items()[0].message,
            "8-bit signed offset out of range (+200)"
        );
    }
}
