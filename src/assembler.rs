//! Assembly language parser and module emitter.
//!
//! Converts human-readable assembly source into binary module bytes. Uses
//! [`for_each_opcode!`](crate::for_each_opcode) to generate the mnemonic
//! lookup used while tokenizing.
//!
//! # Syntax
//!
//! ```text
//! # a module is exactly one constants section followed by one code section
//! .constants {
//!     hfunc 0 $main       # arity, then an offset or label reference
//!     hint 42             # 64-bit signed integer
//! }
//! .code {
//! main:                   # label: offset of the next byte within .code
//!     pushc 1             # mnemonic, then immediate bytes as integers
//!     print
//!     halt
//! }
//! ```
//!
//! - Tokens are separated by whitespace; `#` starts a comment to end of line
//! - A leading `.` marks a section header, a trailing `:` a label definition,
//!   a leading `$` a label reference
//! - Integer literals accept decimal, `0x` hex, `0b` binary, and `0o` octal

use crate::errors::AsmError;
use crate::for_each_opcode;
use crate::isa::Opcode;
use crate::module::MAGIC;
use crate::value::HType;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = '#';
const SECTION_PREFIX: char = '.';
const LABEL_SUFFIX: char = ':';
const REFERENCE_PREFIX: char = '$';

/// Byte written in place of a not-yet-resolved label reference.
const PLACEHOLDER: u8 = 0xFF;

macro_rules! define_mnemonic_lookup {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $byte:literal, $mnemonic:literal, $imms:literal
        ),* $(,)?
    ) => {
        /// Maps an assembly mnemonic to its opcode.
        fn opcode_from_mnemonic(name: &str) -> Option<Opcode> {
            match name {
                $( $mnemonic => Some(Opcode::$name), )*
                _ => None,
            }
        }
    };
}

for_each_opcode!(define_mnemonic_lookup);

/// One classified token of assembly source.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `.name` section header.
    Section(String),
    LBrace,
    RBrace,
    /// `hint` / `hfunc` type keyword.
    Type(HType),
    /// Integer literal.
    Int(i64),
    /// `name:` label definition.
    Label(String),
    /// Opcode mnemonic.
    Instr(Opcode),
    /// `$name` label reference.
    Ident(String),
    /// End of input; returned on every read past the last token.
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Section(name) => write!(f, "section `.{name}`"),
            TokenKind::LBrace => write!(f, "`{{`"),
            TokenKind::RBrace => write!(f, "`}}`"),
            TokenKind::Type(HType::Int) => write!(f, "`hint`"),
            TokenKind::Type(HType::Func) => write!(f, "`hfunc`"),
            TokenKind::Int(value) => write!(f, "integer {value}"),
            TokenKind::Label(name) => write!(f, "label `{name}:`"),
            TokenKind::Instr(op) => write!(f, "opcode `{}`", op.mnemonic()),
            TokenKind::Ident(name) => write!(f, "reference `${name}`"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// A token together with its 1-based source position.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

struct RawWord<'a> {
    text: &'a str,
    line: usize,
    column: usize,
}

/// Splits source into whitespace-separated words and classifies them on
/// demand. Classification is positional: braces, then a leading `.`, a
/// trailing `:`, a leading `$`, integer literals, and finally the known
/// type keywords and opcode mnemonics.
pub struct Tokenizer<'a> {
    words: std::vec::IntoIter<RawWord<'a>>,
    /// Position reported for `Eof` tokens.
    end: (usize, usize),
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut words = Vec::new();
        let mut lines = 0;
        for (line_no, raw_line) in source.lines().enumerate() {
            lines = line_no + 1;
            let text = raw_line.split(COMMENT_CHAR).next().unwrap_or("");
            let mut start = None;
            for (i, ch) in text.char_indices() {
                if ch.is_whitespace() {
                    if let Some(s) = start.take() {
                        words.push(RawWord {
                            text: &text[s..i],
                            line: line_no + 1,
                            column: s + 1,
                        });
                    }
                } else if start.is_none() {
                    start = Some(i);
                }
            }
            if let Some(s) = start {
                words.push(RawWord {
                    text: &text[s..],
                    line: line_no + 1,
                    column: s + 1,
                });
            }
        }
        Self {
            words: words.into_iter(),
            end: (lines.max(1), 1),
        }
    }

    /// Reads the next token; yields `Eof` once input is exhausted.
    pub fn next_token(&mut self) -> Result<Token, AsmError> {
        match self.words.next() {
            Some(word) => classify(word),
            None => Ok(Token {
                kind: TokenKind::Eof,
                line: self.end.0,
                column: self.end.1,
            }),
        }
    }
}

fn classify(word: RawWord<'_>) -> Result<Token, AsmError> {
    let RawWord { text, line, column } = word;
    let kind = if text == "{" {
        TokenKind::LBrace
    } else if text == "}" {
        TokenKind::RBrace
    } else if let Some(name) = text.strip_prefix(SECTION_PREFIX) {
        // A stray trailing colon on a section word is tolerated.
        TokenKind::Section(name.trim_end_matches(LABEL_SUFFIX).to_string())
    } else if let Some(name) = text.strip_suffix(LABEL_SUFFIX).filter(|n| !n.is_empty()) {
        TokenKind::Label(name.to_string())
    } else if let Some(name) = text.strip_prefix(REFERENCE_PREFIX).filter(|n| !n.is_empty()) {
        TokenKind::Ident(name.to_string())
    } else if let Some(value) = parse_int(text) {
        TokenKind::Int(value)
    } else if let Some(htype) = HType::from_keyword(text) {
        TokenKind::Type(htype)
    } else if let Some(op) = opcode_from_mnemonic(text) {
        TokenKind::Instr(op)
    } else {
        return Err(AsmError::InvalidToken {
            token: text.to_string(),
            line,
            column,
        });
    };
    Ok(Token { kind, line, column })
}

/// Parses a base-agnostic integer literal: decimal, `0x`, `0b`, or `0o`,
/// with an optional leading `-`.
fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = digits.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()?
    } else if let Some(oct) = digits.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}

/// A pending label reference: eight placeholder bytes at `at` waiting for
/// `label` to be defined.
struct Patch {
    at: usize,
    label: String,
    line: usize,
    column: usize,
    resolved: bool,
}

/// Single-pass assembler: emits bytes as tokens arrive and back-patches the
/// constant count and forward label references in place.
pub struct Assembler<'a> {
    tokens: Tokenizer<'a>,
    out: Vec<u8>,
    /// Resolved label definitions, code-segment-relative.
    labels: HashMap<String, u64>,
    patches: Vec<Patch>,
}

impl<'a> Assembler<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            tokens: Tokenizer::new(source),
            out: Vec::new(),
            labels: HashMap::new(),
            patches: Vec::new(),
        }
    }

    /// Assembles the entire source into binary module bytes.
    pub fn read_module(mut self) -> Result<Vec<u8>, AsmError> {
        self.out.extend_from_slice(MAGIC);
        let count_at = self.out.len();
        self.out.push(0);

        self.expect_section("constants", "`.constants` section")?;
        self.expect_lbrace()?;
        let count = self.constant_pool()?;
        self.out[count_at] = count;

        self.expect_section("code", "`.code` section")?;
        self.expect_lbrace()?;
        self.code_section()?;

        let Token { kind, line, column } = self.tokens.next_token()?;
        if kind != TokenKind::Eof {
            return Err(unexpected("end of input", &kind, line, column));
        }

        if let Some(patch) = self.patches.iter().find(|p| !p.resolved) {
            return Err(AsmError::UnresolvedReference {
                label: patch.label.clone(),
                line: patch.line,
                column: patch.column,
            });
        }

        Ok(self.out)
    }

    /// Emits constants until the closing brace, returning how many were seen.
    fn constant_pool(&mut self) -> Result<u8, AsmError> {
        let mut count: usize = 0;
        loop {
            let Token { kind, line, column } = self.tokens.next_token()?;
            match kind {
                TokenKind::RBrace => break,
                TokenKind::Type(HType::Int) => {
                    let (value, _, _) = self.expect_int("integer")?;
                    self.out.push(HType::Int as u8);
                    self.out.extend_from_slice(&value.to_be_bytes());
                }
                TokenKind::Type(HType::Func) => {
                    let arity = self.expect_u8("arity")?;
                    self.out.push(HType::Func as u8);
                    self.out.push(arity);
                    self.offset_or_reference()?;
                }
                other => return Err(unexpected("constant or `}`", &other, line, column)),
            }
            count += 1;
            if count > u8::MAX as usize {
                return Err(AsmError::OutOfRange {
                    what: "constant count",
                    value: count as i64,
                    width: "u8",
                    line,
                    column,
                });
            }
        }
        Ok(count as u8)
    }

    /// Emits the eight-byte offset field of an `hfunc` constant: either an
    /// integer literal, or a `$label` reference patched once defined.
    fn offset_or_reference(&mut self) -> Result<(), AsmError> {
        let Token { kind, line, column } = self.tokens.next_token()?;
        match kind {
            TokenKind::Int(value) => {
                self.out.extend_from_slice(&value.to_be_bytes());
                Ok(())
            }
            TokenKind::Ident(label) => {
                match self.labels.get(&label) {
                    Some(&offset) => self.out.extend_from_slice(&(offset as i64).to_be_bytes()),
                    None => {
                        self.patches.push(Patch {
                            at: self.out.len(),
                            label,
                            line,
                            column,
                            resolved: false,
                        });
                        self.out.extend_from_slice(&[PLACEHOLDER; 8]);
                    }
                }
                Ok(())
            }
            other => Err(unexpected("integer or label reference", &other, line, column)),
        }
    }

    /// Emits code items until the closing brace.
    fn code_section(&mut self) -> Result<(), AsmError> {
        let code_start = self.out.len();
        loop {
            let Token { kind, line, column } = self.tokens.next_token()?;
            match kind {
                TokenKind::RBrace => return Ok(()),
                TokenKind::Label(name) => {
                    let offset = (self.out.len() - code_start) as u64;
                    self.define_label(name, offset, line, column)?;
                }
                TokenKind::Instr(op) => self.out.push(op as u8),
                TokenKind::Int(value) => match u8::try_from(value) {
                    Ok(byte) => self.out.push(byte),
                    Err(_) => {
                        return Err(AsmError::OutOfRange {
                            what: "code immediate",
                            value,
                            width: "u8",
                            line,
                            column,
                        })
                    }
                },
                other => {
                    return Err(unexpected(
                        "label, opcode, integer, or `}`",
                        &other,
                        line,
                        column,
                    ))
                }
            }
        }
    }

    /// Records a label at `offset` and patches every pending reference to it.
    fn define_label(
        &mut self,
        name: String,
        offset: u64,
        line: usize,
        column: usize,
    ) -> Result<(), AsmError> {
        if self.labels.contains_key(&name) {
            return Err(AsmError::DuplicateLabel {
                label: name,
                line,
                column,
            });
        }
        for patch in self.patches.iter_mut() {
            if !patch.resolved && patch.label == name {
                self.out[patch.at..patch.at + 8].copy_from_slice(&(offset as i64).to_be_bytes());
                patch.resolved = true;
            }
        }
        self.labels.insert(name, offset);
        Ok(())
    }

    fn expect_section(&mut self, name: &str, expected: &'static str) -> Result<(), AsmError> {
        let Token { kind, line, column } = self.tokens.next_token()?;
        match kind {
            TokenKind::Section(ref s) if s == name => Ok(()),
            other => Err(unexpected(expected, &other, line, column)),
        }
    }

    fn expect_lbrace(&mut self) -> Result<(), AsmError> {
        let Token { kind, line, column } = self.tokens.next_token()?;
        match kind {
            TokenKind::LBrace => Ok(()),
            other => Err(unexpected("`{`", &other, line, column)),
        }
    }

    fn expect_int(&mut self, expected: &'static str) -> Result<(i64, usize, usize), AsmError> {
        let Token { kind, line, column } = self.tokens.next_token()?;
        match kind {
            TokenKind::Int(value) => Ok((value, line, column)),
            other => Err(unexpected(expected, &other, line, column)),
        }
    }

    fn expect_u8(&mut self, what: &'static str) -> Result<u8, AsmError> {
        let (value, line, column) = self.expect_int("integer")?;
        u8::try_from(value).map_err(|_| AsmError::OutOfRange {
            what,
            value,
            width: "u8",
            line,
            column,
        })
    }
}

fn unexpected(expected: &'static str, found: &TokenKind, line: usize, column: usize) -> AsmError {
    AsmError::UnexpectedToken {
        expected,
        found: found.to_string(),
        line,
        column,
    }
}

/// Assembles a full source string into binary module bytes.
pub fn assemble_source(source: &str) -> Result<Vec<u8>, AsmError> {
    Assembler::new(source).read_module()
}

/// Convenience: assemble directly from a file path.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, AsmError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|e| AsmError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    assemble_source(&source)
}

/// Returns the line/column pair for errors that carry a source location.
fn location(err: &AsmError) -> Option<(usize, usize)> {
    match err {
        AsmError::InvalidToken { line, column, .. }
        | AsmError::UnexpectedToken { line, column, .. }
        | AsmError::OutOfRange { line, column, .. }
        | AsmError::UnresolvedReference { line, column, .. }
        | AsmError::DuplicateLabel { line, column, .. } => Some((*line, *column)),
        AsmError::Io { .. } => None,
    }
}

/// Formats a compiler-style diagnostic for an assembly failure: the message,
/// the source location, and the offending line with a caret under it.
pub fn render_diagnostic(file: &str, source: &str, err: &AsmError) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {err}");

    if let Some((line, column)) = location(err) {
        let _ = writeln!(diag, " --> {file}:{line}:{column}");
        if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
            let line_text = raw_line.trim_end_matches('\r');
            let underline = " ".repeat(column.saturating_sub(1));
            let _ = writeln!(diag, "  |");
            let _ = writeln!(diag, "{line:>4} | {line_text}");
            let _ = writeln!(diag, "  | {underline}^");
        }
    }

    diag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str, n: usize) -> Vec<TokenKind> {
        let mut tokens = Tokenizer::new(source);
        (0..n)
            .map(|_| tokens.next_token().expect("tokenize failed").kind)
            .collect()
    }

    #[test]
    fn tokenize_mixed_forms() {
        let toks = kinds(".constants: { hint } 16 0x10 main: pushc $main", 10);
        assert_eq!(
            toks,
            vec![
                TokenKind::Section("constants".to_string()),
                TokenKind::LBrace,
                TokenKind::Type(HType::Int),
                TokenKind::RBrace,
                TokenKind::Int(16),
                TokenKind::Int(16),
                TokenKind::Label("main".to_string()),
                TokenKind::Instr(Opcode::Pushc),
                TokenKind::Ident("main".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenize_eof_is_sticky() {
        let mut tokens = Tokenizer::new("noop");
        assert_eq!(tokens.next_token().unwrap().kind, TokenKind::Instr(Opcode::Noop));
        for _ in 0..3 {
            assert_eq!(tokens.next_token().unwrap().kind, TokenKind::Eof);
        }
    }

    #[test]
    fn tokenize_unknown_identifier() {
        let mut tokens = Tokenizer::new("popcount");
        assert!(matches!(
            tokens.next_token(),
            Err(AsmError::InvalidToken { ref token, line: 1, column: 1 }) if token == "popcount"
        ));
    }

    #[test]
    fn tokenize_comments_and_radixes() {
        let source = "# full line comment\n0b101 0o17 -3 # trailing comment\n42";
        assert_eq!(
            kinds(source, 4),
            vec![
                TokenKind::Int(5),
                TokenKind::Int(15),
                TokenKind::Int(-3),
                TokenKind::Int(42),
            ]
        );
    }

    #[test]
    fn tokenize_positions() {
        let mut tokens = Tokenizer::new("noop\n  halt");
        let first = tokens.next_token().unwrap();
        assert_eq!((first.line, first.column), (1, 1));
        let second = tokens.next_token().unwrap();
        assert_eq!((second.line, second.column), (2, 3));
    }

    #[test]
    fn parse_int_forms() {
        assert_eq!(parse_int("16"), Some(16));
        assert_eq!(parse_int("0x10"), Some(16));
        assert_eq!(parse_int("0b1000"), Some(8));
        assert_eq!(parse_int("0o20"), Some(16));
        assert_eq!(parse_int("-0x10"), Some(-16));
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("-"), None);
        assert_eq!(parse_int("0xZZ"), None);
    }

    #[test]
    fn assemble_minimal_module() {
        let out = assemble_source(
            ".constants { hfunc 0 $main hint 0x05 } .code { main: noop }",
        )
        .unwrap();
        let mut expected = b"hiss\x02".to_vec();
        expected.extend_from_slice(&[0x02, 0x00]); // hfunc, arity 0
        expected.extend_from_slice(&0i64.to_be_bytes()); // main is at code offset 0
        expected.push(0x01); // hint
        expected.extend_from_slice(&5i64.to_be_bytes());
        expected.push(0x00); // noop
        assert_eq!(out, expected);
    }

    #[test]
    fn assemble_empty_sections() {
        let out = assemble_source(".constants { } .code { }").unwrap();
        assert_eq!(out, b"hiss\x00");
    }

    #[test]
    fn assemble_forward_reference_is_patched() {
        let source = r#"
.constants {
    hfunc 0 $later
}
.code {
    noop
    noop
later:
    halt
}
"#;
        let out = assemble_source(source).unwrap();
        // Offset field sits after magic(4) + count(1) + tag(1) + arity(1).
        let offset = i64::from_be_bytes(out[7..15].try_into().unwrap());
        assert_eq!(offset, 2);
        assert!(!out[7..15].contains(&PLACEHOLDER));
    }

    #[test]
    fn assemble_literal_offset() {
        let out = assemble_source(".constants { hfunc 3 9 } .code { }").unwrap();
        assert_eq!(out[5], 0x02);
        assert_eq!(out[6], 3);
        assert_eq!(i64::from_be_bytes(out[7..15].try_into().unwrap()), 9);
    }

    #[test]
    fn assemble_code_bytes_in_order() {
        let out = assemble_source(".constants { } .code { pushc 2 iadd br 0 3 halt }").unwrap();
        assert_eq!(&out[5..], &[0x11, 0x02, 0x30, 0x23, 0x00, 0x03, 0x20]);
    }

    #[test]
    fn assemble_unresolved_reference() {
        let err = assemble_source(".constants { hfunc 0 $missing } .code { noop }").unwrap_err();
        assert!(matches!(
            err,
            AsmError::UnresolvedReference { ref label, .. } if label == "missing"
        ));
    }

    #[test]
    fn assemble_duplicate_label() {
        let err =
            assemble_source(".constants { } .code { dup: noop dup: halt }").unwrap_err();
        assert!(matches!(
            err,
            AsmError::DuplicateLabel { ref label, .. } if label == "dup"
        ));
    }

    #[test]
    fn assemble_expected_lbrace() {
        let err = assemble_source(".constants } .code { }").unwrap_err();
        assert!(matches!(err, AsmError::UnexpectedToken { expected: "`{`", .. }));
    }

    #[test]
    fn assemble_missing_code_section() {
        let err = assemble_source(".constants { }").unwrap_err();
        assert!(matches!(
            err,
            AsmError::UnexpectedToken { expected: "`.code` section", .. }
        ));
    }

    #[test]
    fn assemble_trailing_tokens() {
        let err = assemble_source(".constants { } .code { } halt").unwrap_err();
        assert!(matches!(
            err,
            AsmError::UnexpectedToken { expected: "end of input", .. }
        ));
    }

    #[test]
    fn assemble_arity_out_of_range() {
        let err = assemble_source(".constants { hfunc 256 0 } .code { }").unwrap_err();
        assert!(matches!(
            err,
            AsmError::OutOfRange { what: "arity", value: 256, .. }
        ));
    }

    #[test]
    fn assemble_immediate_out_of_range() {
        let err = assemble_source(".constants { } .code { pushc 300 }").unwrap_err();
        assert!(matches!(
            err,
            AsmError::OutOfRange { what: "code immediate", value: 300, .. }
        ));
        let err = assemble_source(".constants { } .code { pushc -1 }").unwrap_err();
        assert!(matches!(err, AsmError::OutOfRange { value: -1, .. }));
    }

    #[test]
    fn assemble_hint_full_range() {
        let out =
            assemble_source(".constants { hint -9223372036854775807 } .code { }").unwrap();
        assert_eq!(
            i64::from_be_bytes(out[6..14].try_into().unwrap()),
            -9223372036854775807
        );
    }

    #[test]
    fn assemble_reference_in_code_is_rejected() {
        let err = assemble_source(".constants { } .code { $main }").unwrap_err();
        assert!(matches!(err, AsmError::UnexpectedToken { .. }));
    }

    #[test]
    fn diagnostic_points_at_token() {
        let source = ".constants {\n    hint popcount\n}\n.code { }";
        let err = assemble_source(source).unwrap_err();
        let diag = render_diagnostic("prog.hissa", source, &err);
        assert!(diag.starts_with("error: invalid token `popcount`"));
        assert!(diag.contains(" --> prog.hissa:2:10"));
        assert!(diag.contains("hint popcount"));
        assert!(diag.contains('^'));
    }

    #[test]
    fn diagnostic_without_location() {
        let err = AsmError::Io {
            path: "missing.hissa".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let diag = render_diagnostic("missing.hissa", "", &err);
        assert!(diag.starts_with("error: reading missing.hissa"));
        assert!(!diag.contains("-->"));
    }
}
