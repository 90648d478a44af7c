// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE, LICENSE.additional and CONTRIBUTING.

use zax_types::dialect::Dialect;

use crate::{
    expr::{is_name_beginner, is_name_char},
    ParseError,
};

/// What the pre-scan decided about a raw source line.
#[derive(Debug, PartialEq, Clone)]
pub enum LineAction {
    Empty,

    /// `name EQU expr`, `name DEFL expr`, `name = expr`, `name == expr`.
    /// `redefinable` distinguishes DEFL/`=` variables from EQU/`==`
    /// constants.
    Assignment {
        name: String,
        value: String,
        redefinable: bool,
    },

    /// An ordinary statement, with character literals converted and the
    /// SDCC rewrites applied. Leading whitespace is preserved so the
    /// caller can still tell column-0 names from indented ones.
    Statement(String),
}

/// Pre-scan a raw input line before the assembler proper consumes it:
///
/// - `'X'` character literals are replaced by their decimal value
/// - string literals are skipped (honoring backslash escapes), and an
///   unterminated string is an error
/// - comments introduced by `;` are stripped
/// - under SDCC compatibility, `#` immediates are rewritten and numeric
///   labels like `00001$:` get their leading zeros blanked
/// - assignments (`EQU`/`DEFL`/`=`/`==`) are detected and split off
pub fn prescan_line(line: &str, dialect: &Dialect) -> Result<LineAction, ParseError> {
    let b = line.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(b.len());
    let mut i = 0;

    while i < b.len() {
        match b[i] {
            b'\n' => break,
            b';' => break, // comment
            b'\'' => {
                if i + 2 < b.len() && b[i + 1] != b'\'' && b[i + 2] == b'\'' {
                    // character literal: splice in the decimal value
                    out.extend_from_slice(format!("{}", b[i + 1]).as_bytes());
                    i += 3;
                } else if let Some(close) = find_quote_end(b, i) {
                    out.extend_from_slice(&b[i..=close]);
                    i = close + 1;
                } else {
                    // a lone apostrophe (EX AF,AF') passes through
                    out.push(b[i]);
                    i += 1;
                }
            }
            b'"' => match find_quote_end(b, i) {
                Some(close) => {
                    out.extend_from_slice(&b[i..=close]);
                    i = close + 1;
                }
                None => return Err(ParseError::new("-- unterminated string")),
            },
            b'#' if dialect.sdcc_compat => {
                let next = b.get(i + 1).copied().unwrap_or(0);
                if (next == b' ' || next == b'\t')
                    && first_non_space(b, i + 1) == Some(b'(')
                {
                    out.push(b'0');
                    out.push(b'+');
                    i += 2;
                } else {
                    out.push(if next == b'(' { b'+' } else { b' ' });
                    i += 1;
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    if dialect.sdcc_compat {
        blank_numeric_label_zeros(&mut out);
    }

    let text = String::from_utf8_lossy(&out).into_owned();

    if let Some(action) = detect_assignment(&text) {
        return Ok(action);
    }

    if text.trim().is_empty() {
        Ok(LineAction::Empty)
    } else {
        Ok(LineAction::Statement(text))
    }
}

fn find_quote_end(b: &[u8], start: usize) -> Option<usize> {
    let quote = b[start];
    let mut i = start + 1;
    while i < b.len() && b[i] != b'\n' {
        if b[i] == b'\\' && i + 1 < b.len() {
            i += 2;
            continue;
        }
        if b[i] == quote {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn first_non_space(b: &[u8], mut i: usize) -> Option<u8> {
    while i < b.len() && (b[i] == b' ' || b[i] == b'\t') {
        i += 1;
    }
    b.get(i).copied()
}

/// SDCC writes local labels as zero-padded numbers (`00001$:`); the
/// leading zeros are blanked so the remaining digits line up as a label.
fn blank_numeric_label_zeros(out: &mut [u8]) {
    if out.first() != Some(&b'0') {
        return;
    }
    let mut digits = 0;
    while digits < out.len() && out[digits].is_ascii_digit() {
        digits += 1;
    }
    if digits + 1 < out.len() && out[digits] == b'$' && out[digits + 1] == b':' {
        let dollar = digits;
        let mut i = 0;
        while i + 1 < dollar && out[i] == b'0' {
            out[i] = b' ';
            i += 1;
        }
    }
}

fn detect_assignment(text: &str) -> Option<LineAction> {
    let mut chars = text.chars();
    if !chars.next().map(is_name_beginner).unwrap_or(false) {
        return None;
    }

    let name_len = text.find(|c: char| !is_name_char(c)).unwrap_or(text.len());
    let name = &text[..name_len];
    let mut rest = &text[name_len..];

    // a `::` after the label is a declaration qualifier in SDCC output
    if let Some(tail) = rest.strip_prefix("::") {
        rest = tail;
    } else if let Some(tail) = rest.strip_prefix(':') {
        rest = tail;
    }
    let rest = rest.trim_start_matches([' ', '\t']);

    let (len, keyword_len, redefinable) = if rest.starts_with("==") {
        (2, 2, false)
    } else if rest.starts_with('=') {
        (1, 1, true)
    } else {
        let body = rest.strip_prefix('.').unwrap_or(rest);
        let dot = rest.len() - body.len();
        if body.len() >= 3 && body[..3].eq_ignore_ascii_case("equ") {
            (3, dot + 3, false)
        } else if body.len() >= 4 && body[..4].eq_ignore_ascii_case("defl") {
            (4, dot + 4, true)
        } else {
            return None;
        }
    };

    // keywords must end the token: `EQUX` is not an assignment
    if len > 2 {
        let after = rest[keyword_len..].chars().next();
        if after.map(|c| c.is_ascii_alphabetic()).unwrap_or(false) {
            return None;
        }
    }

    Some(LineAction::Assignment {
        name: name.to_owned(),
        value: rest[keyword_len..].trim().to_owned(),
        redefinable,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use zax_types::dialect::Dialect;

    use super::*;

    fn scan(line: &str) -> LineAction {
        prescan_line(line, &Dialect::default()).unwrap()
    }

    fn scan_sdcc(line: &str) -> LineAction {
        let mut dialect = Dialect::default();
        dialect.sdcc_compat = true;
        prescan_line(line, &dialect).unwrap()
    }

    #[test]
    fn test_char_literal_conversion() {
        assert_eq!(
            scan("ld a,'A'"),
            LineAction::Statement("ld a,65".to_owned())
        );
        assert_eq!(
            scan("db 'x'+1"),
            LineAction::Statement("db 120+1".to_owned())
        );
    }

    #[test]
    fn test_af_prime_survives() {
        assert_eq!(
            scan("ex af,af'"),
            LineAction::Statement("ex af,af'".to_owned())
        );
    }

    #[test]
    fn test_comment_stripped() {
        assert_eq!(scan("nop ; does nothing"), LineAction::Statement("nop ".to_owned()));
        assert_eq!(scan("; only a comment"), LineAction::Empty);
    }

    #[test]
    fn test_unterminated_string() {
        let err = prescan_line("defm \"abc", &Dialect::default()).unwrap_err();
        assert_eq!(err.message, "-- unterminated string");
    }

    #[test]
    fn test_string_with_semicolon_kept() {
        assert_eq!(
            scan("defm \"a;b\""),
            LineAction::Statement("defm \"a;b\"".to_owned())
        );
    }

    #[test]
    fn test_equ_and_defl() {
        assert_eq!(
            scan("size EQU 0x100"),
            LineAction::Assignment {
                name: "size".to_owned(),
                value: "0x100".to_owned(),
                redefinable: false,
            }
        );
        assert_eq!(
            scan("count defl 3"),
            LineAction::Assignment {
                name: "count".to_owned(),
                value: "3".to_owned(),
                redefinable: true,
            }
        );
        assert_eq!(
            scan("x = 1"),
            LineAction::Assignment {
                name: "x".to_owned(),
                value: "1".to_owned(),
                redefinable: true,
            }
        );
        assert_eq!(
            scan("x == 1"),
            LineAction::Assignment {
                name: "x".to_owned(),
                value: "1".to_owned(),
                redefinable: false,
            }
        );
    }

    #[test]
    fn test_equ_prefix_is_not_equ() {
        // EQUX is an ordinary statement, not an assignment
        assert_eq!(
            scan("name EQUX 1"),
            LineAction::Statement("name EQUX 1".to_owned())
        );
    }

    #[test]
    fn test_sdcc_hash_immediate() {
        assert_eq!(
            scan_sdcc("ld a,#5"),
            LineAction::Statement("ld a, 5".to_owned())
        );
        assert_eq!(
            scan_sdcc("ld hl,#(base+1)"),
            LineAction::Statement("ld hl,+(base+1)".to_owned())
        );
        assert_eq!(
            scan_sdcc("ld hl,# (base+1)"),
            LineAction::Statement("ld hl,0+(base+1)".to_owned())
        );
    }

    #[test]
    fn test_sdcc_numeric_label() {
        assert_eq!(
            scan_sdcc("00001$:"),
            LineAction::Statement("    1$:".to_owned())
        );
    }
}
