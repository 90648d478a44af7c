// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE, LICENSE.additional and CONTRIBUTING.

pub mod debug;
pub mod directives;
pub mod emit;
pub mod float;
pub mod fragment;
pub mod insn;
pub mod options;
pub mod table;

use zax_parser::{
    expr::ExprContext,
    line::{prescan_line, LineAction},
    operand::{parse_operand, parse_operand_not_indexed, Operand},
};
use zax_types::{
    dialect::{CpuSet, Dialect, FeatureVerdict, Features, InstrMode},
    ElfMach,
};

use crate::{
    directives::lookup_directive,
    float::FloatFormat,
    fragment::{Fixup, Fragment, Section, SymbolTable},
    options::Config,
    table::{lookup_instruction, SUFFIX_TABLE},
};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// The per-line diagnostic sink. The first hard error on a line
/// suppresses the line's remaining errors and the end-of-line junk
/// check; warnings always get through.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    pub(crate) line_error: bool,
}

impl Diagnostics {
    pub(crate) fn start_line(&mut self) {
        self.line_error = false;
    }

    pub(crate) fn error(&mut self, message: &str) {
        if self.line_error {
            return;
        }
        self.items.push(Diagnostic {
            severity: Severity::Error,
            message: message.to_owned(),
        });
        self.line_error = true;
    }

    /// An error that must not be collapsed by the per-line debounce
    /// (used at finalization, outside any line).
    pub(crate) fn error_always(&mut self, message: &str) {
        self.items.push(Diagnostic {
            severity: Severity::Error,
            message: message.to_owned(),
        });
    }

    pub(crate) fn warn(&mut self, message: &str) {
        self.items.push(Diagnostic {
            severity: Severity::Warning,
            message: message.to_owned(),
        });
    }

    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct ObjectSymbol {
    pub name: String,
    pub value: i64,
    pub global: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ObjectSection {
    pub name: String,
    pub bytes: Vec<u8>,
    pub relocs: Vec<Fixup>,
}

/// The result of assembling a translation unit: section contents, the
/// relocations the linker still has to resolve, the surviving symbols
/// and the ELF machine identifier.
#[derive(Debug, PartialEq, Clone)]
pub struct Object {
    pub sections: Vec<ObjectSection>,
    pub symbols: Vec<ObjectSymbol>,
    pub mach: ElfMach,
}

/// The assembler context: dialect, output sections, symbols and the
/// diagnostic sink, threaded explicitly through every encoder.
pub struct Assembler {
    pub dialect: Dialect,
    pub(crate) inst_mode: InstrMode,
    pub(crate) fp_single: Option<FloatFormat>,
    pub(crate) fp_double: Option<FloatFormat>,
    pub(crate) sections: Vec<Section>,
    pub(crate) current_section: usize,
    pub(crate) symbols: SymbolTable,
    pub(crate) diag: Diagnostics,
}

impl Assembler {
    pub fn new(config: Config) -> Assembler {
        let inst_mode = InstrMode::for_mode(config.dialect.cpu_mode);
        Assembler {
            dialect: config.dialect,
            inst_mode,
            fp_single: config.fp_single,
            fp_double: config.fp_double,
            sections: vec![Section::new(".text")],
            current_section: 0,
            symbols: SymbolTable::default(),
            diag: Diagnostics::default(),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diag.items()
    }

    pub fn has_errors(&self) -> bool {
        self.diag.has_errors()
    }

    pub fn current_section_bytes(&self) -> &[u8] {
        &self.sections[self.current_section].frag.bytes
    }

    pub fn current_section_fixups(&self) -> &[Fixup] {
        &self.sections[self.current_section].frag.fixups
    }

    pub(crate) fn frag(&mut self) -> &mut Fragment {
        &mut self.sections[self.current_section].frag
    }

    pub(crate) fn here(&self) -> i64 {
        self.sections[self.current_section].frag.len() as i64
    }

    pub(crate) fn error(&mut self, message: &str) {
        self.diag.error(message);
    }

    pub(crate) fn warn(&mut self, message: &str) {
        self.diag.warn(message);
    }

    pub(crate) fn ill_op(&mut self) {
        self.diag.error("illegal operand");
    }

    /// The class check of the original: silently accept, warn
    /// "undocumented instruction", or report an illegal operand,
    /// depending on the dialect.
    pub(crate) fn check_feature(&mut self, features: Features) {
        match self.dialect.feature_verdict(features) {
            FeatureVerdict::Accept => {}
            FeatureVerdict::Warn => self.warn("undocumented instruction"),
            FeatureVerdict::Reject => self.ill_op(),
        }
    }

    pub(crate) fn parse_op<'a>(&mut self, s: &'a str) -> Option<(Operand, &'a str)> {
        let here = self.here();
        let result = {
            let symbols = &self.symbols;
            let constants = |name: &str| symbols.resolve_absolute(name);
            let ctx = ExprContext {
                dialect: &self.dialect,
                here,
                constants: Some(&constants),
            };
            parse_operand(s, &ctx)
        };
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.error(&e.message);
                None
            }
        }
    }

    pub(crate) fn parse_op_no_index<'a>(&mut self, s: &'a str) -> Option<(Operand, &'a str)> {
        let here = self.here();
        let result = {
            let symbols = &self.symbols;
            let constants = |name: &str| symbols.resolve_absolute(name);
            let ctx = ExprContext {
                dialect: &self.dialect,
                here,
                constants: Some(&constants),
            };
            parse_operand_not_indexed(s, &ctx)
        };
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.error(&e.message);
                None
            }
        }
    }

    pub(crate) fn switch_section(&mut self, name: &str) {
        if let Some(idx) = self.sections.iter().position(|s| s.name == name) {
            self.current_section = idx;
        } else {
            self.sections.push(Section::new(name));
            self.current_section = self.sections.len() - 1;
        }
    }

    pub fn assemble(&mut self, source: &str) {
        for line in source.lines() {
            self.assemble_line(line);
        }
    }

    pub fn assemble_line(&mut self, line: &str) {
        self.diag.start_line();
        let action = match prescan_line(line, &self.dialect) {
            Ok(action) => action,
            Err(e) => {
                self.error(&e.message);
                return;
            }
        };
        match action {
            LineAction::Empty => {}
            LineAction::Assignment {
                name,
                value,
                redefinable,
            } => self.handle_assignment(&name, &value, redefinable),
            LineAction::Statement(text) => self.process_statement(&text),
        }
    }

    pub(crate) fn handle_assignment(&mut self, name: &str, value: &str, redefinable: bool) {
        let here = self.here();
        let parsed = {
            let symbols = &self.symbols;
            let constants = |name: &str| symbols.resolve_absolute(name);
            let ctx = ExprContext {
                dialect: &self.dialect,
                here,
                constants: Some(&constants),
            };
            zax_parser::expr::parse_expression(value, &ctx)
        };
        let expr = match parsed {
            Ok((expr, rest)) if rest.trim().is_empty() => expr,
            Ok(_) => {
                self.error("bad expression syntax");
                return;
            }
            Err(e) => {
                self.error(&e.message);
                return;
            }
        };

        let section = self.current_section;
        let value = {
            let symbols = &self.symbols;
            expr.eval(&|name| symbols.resolve_in_section(name, section))
        };
        let value = match value {
            Some(v) => v,
            None => {
                self.error("bad expression syntax");
                return;
            }
        };

        if redefinable {
            self.symbols.define_variable(name, value);
        } else if let Err(e) = self.symbols.define_constant(name, value) {
            self.error(&e.message);
        }
    }

    fn process_statement(&mut self, text: &str) {
        let mut rest: &str = text;
        let mut saw_label = false;

        loop {
            let t = rest.trim_start();
            match split_colon_label(t) {
                Some((name, after)) => {
                    self.define_label(&name);
                    rest = after;
                    saw_label = true;
                }
                None => break,
            }
        }

        // colonless labels are only recognized in column 0
        if !saw_label
            && self.dialect.colonless_labels
            && std::ptr::eq(rest.as_ptr(), text.as_ptr())
        {
            if let Some((name, after)) = split_leading_name(text) {
                self.define_label(&name);
                rest = after;
            }
        }

        let stmt = rest.trim();
        if stmt.is_empty() {
            return;
        }

        let token_len = stmt
            .find(|c: char| c == ' ' || c == '\t')
            .unwrap_or(stmt.len());
        let token = stmt[..token_len].to_ascii_lowercase();
        if let Some(handler) = lookup_directive(&token) {
            let args = stmt[token_len..].trim();
            handler(self, args);
            return;
        }

        self.assemble_instruction(stmt);
    }

    fn define_label(&mut self, name: &str) {
        let section = self.current_section;
        let offset = self.here();
        if let Err(e) = self.symbols.define_label(name, section, offset) {
            self.error(&e.message);
        }
    }

    /// Assemble one machine instruction: lowercase the mnemonic, resolve
    /// an optional eZ80 suffix, dispatch through the sorted table, then
    /// complain about any trailing junk.
    pub fn assemble_instruction(&mut self, s: &str) {
        self.inst_mode = InstrMode::for_mode(self.dialect.cpu_mode);
        let s = s.trim_start().trim_end();

        let len = s
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(s.len());
        if len > 7 {
            let head: String = s.chars().take(5).collect();
            self.error(&format!("Unknown instruction '{}..'", head));
            return;
        }
        let mnemonic = s[..len].to_ascii_lowercase();
        let mut rest = &s[len..];

        if let Some(c) = rest.chars().next() {
            if c != ' ' && c != '\t' {
                let handled = c == '.'
                    && self.dialect.is(CpuSet::EZ80)
                    && match self.assemble_suffix(rest) {
                        Some(r) => {
                            rest = r;
                            true
                        }
                        None => false,
                    };
                if !handled {
                    self.error("syntax error");
                    return;
                }
            }
        }
        let rest = rest.trim_start();

        match lookup_instruction(&mnemonic) {
            Some(entry) if self.dialect.permits(entry.gate) => {
                let tail = (entry.emit)(self, entry.prefix, entry.opcode, rest);
                let tail = tail.trim_start();
                if !self.diag.line_error && !tail.is_empty() {
                    let c = tail.chars().next().unwrap();
                    self.error(&format!(
                        "junk at end of line, first unrecognized character is `{}'",
                        c
                    ));
                }
            }
            _ => {
                self.frag().push(0);
                self.error(&format!("Unknown instruction `{}'", mnemonic));
            }
        }
    }

    /// An eZ80 instruction suffix (`.SIS`, `.LIL`, ...). Emits the mode
    /// override byte and forces the per-instruction mode, which is
    /// derived from the byte actually emitted.
    fn assemble_suffix<'a>(&mut self, s: &'a str) -> Option<&'a str> {
        let body = s.strip_prefix('.')?;
        let len = body
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .count();
        if len == 0 || len > 3 {
            return None;
        }
        let after = &body[len..];
        if let Some(c) = after.chars().next() {
            if c != ' ' && c != '\t' {
                return None;
            }
        }

        let name = body[..len].to_ascii_lowercase();
        let (_, adl_byte, z80_byte) = SUFFIX_TABLE
            .iter()
            .find(|(suffix, _, _)| *suffix == name)?;
        let byte = if self.dialect.is_adl() {
            *adl_byte
        } else {
            *z80_byte
        };

        self.frag().push(byte);
        self.inst_mode = match byte {
            0x40 => InstrMode {
                long_data: false,
                long_inst: false,
                forced: true,
            },
            0x49 => InstrMode {
                long_data: true,
                long_inst: false,
                forced: true,
            },
            0x52 => InstrMode {
                long_data: false,
                long_inst: true,
                forced: true,
            },
            _ => InstrMode {
                long_data: true,
                long_inst: true,
                forced: true,
            },
        };
        Some(after)
    }

    /// Apply every resolvable fixup and return the object. Unresolved
    /// fixups survive as relocations; symbols matching the local-label
    /// prefix are not exported.
    pub fn finish(mut self) -> Object {
        self.apply_fixups();

        let mach = self.dialect.elf_mach();
        let sections = self
            .sections
            .into_iter()
            .map(|s| ObjectSection {
                name: s.name,
                bytes: s.frag.bytes,
                relocs: s.frag.fixups,
            })
            .collect();

        let local_prefix = self.dialect.local_label_prefix.clone();
        let mut symbols: Vec<ObjectSymbol> = self
            .symbols
            .iter()
            .filter(|(name, _)| match &local_prefix {
                Some(prefix) => !name.starts_with(prefix.as_str()),
                None => true,
            })
            .map(|(name, sym)| ObjectSymbol {
                name: name.clone(),
                value: sym.value,
                global: self.symbols.is_global(name),
            })
            .collect();
        symbols.sort_by(|a, b| a.name.cmp(&b.name));

        Object {
            sections,
            symbols,
            mach,
        }
    }
}

fn split_colon_label(t: &str) -> Option<(String, &str)> {
    let mut len = 0;
    let bytes = t.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    if (bytes[0] as char).is_ascii_digit() {
        // SDCC numeric label, digits then `$`
        while len < bytes.len() && bytes[len].is_ascii_digit() {
            len += 1;
        }
        if len + 1 >= bytes.len() || bytes[len] != b'$' || bytes[len + 1] != b':' {
            return None;
        }
        let name = zax_parser::expr::numeric_label_name(&t[..len]);
        return Some((name, &t[len + 2..]));
    } else if zax_parser::expr::is_name_beginner(bytes[0] as char) {
        while len < bytes.len() && zax_parser::expr::is_name_char(bytes[len] as char) {
            len += 1;
        }
    } else {
        return None;
    }
    if len < bytes.len() && bytes[len] == b':' {
        Some((t[..len].to_owned(), &t[len + 1..]))
    } else {
        None
    }
}

fn split_leading_name(t: &str) -> Option<(String, &str)> {
    let first = t.chars().next()?;
    if !zax_parser::expr::is_name_beginner(first) {
        return None;
    }
    let len = t
        .find(|c: char| !zax_parser::expr::is_name_char(c))
        .unwrap_or(t.len());
    Some((t[..len].to_owned(), &t[len..]))
}
