//! Error taxonomies for the three pipeline stages.
//!
//! Assembly, loading, and execution fail in different ways and are surfaced
//! as separate enums. No error is retried; the first error aborts its stage
//! and propagates to the caller.

use std::io;
use thiserror::Error;

/// Errors raised while assembling textual source into a binary module.
///
/// Parse-level variants carry the 1-based line and column of the offending
/// token; [`crate::assembler::render_diagnostic`] uses them to point into the
/// source.
#[derive(Debug, Error)]
pub enum AsmError {
    /// Token names neither a section, label, type keyword, opcode, nor integer.
    #[error("invalid token `{token}`")]
    InvalidToken {
        token: String,
        line: usize,
        column: usize,
    },
    /// Grammar violation: the token is valid but not allowed here.
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        line: usize,
        column: usize,
    },
    /// Integer does not fit the byte width its position requires.
    #[error("{what} {value} does not fit in {width}")]
    OutOfRange {
        what: &'static str,
        value: i64,
        width: &'static str,
        line: usize,
        column: usize,
    },
    /// A `$label` reference was never given a definition.
    #[error("unresolved reference to label `{label}`")]
    UnresolvedReference {
        label: String,
        line: usize,
        column: usize,
    },
    /// Label defined more than once.
    #[error("duplicate label `{label}`")]
    DuplicateLabel {
        label: String,
        line: usize,
        column: usize,
    },
    /// Source file could not be read.
    #[error("reading {path}: {source}")]
    Io { path: String, source: io::Error },
}

/// Errors raised while decoding a binary module.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Buffer does not start with the `hiss` magic prefix.
    #[error("missing magic bytes")]
    MissingMagicBytes,
    /// A read would extend past the end of the buffer.
    #[error("unexpected end of module ({needed} more bytes needed)")]
    UnexpectedEof { needed: usize },
    /// Constant carries a tag byte that names no known type.
    #[error("unknown constant type tag {tag:#04x}")]
    UnknownTypeTag { tag: u8 },
}

/// Errors raised by a single machine step.
///
/// Execution cannot resume after any of these.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An instruction popped more values than the stack holds.
    #[error("stack underflow in {instruction}")]
    StackUnderflow { instruction: &'static str },
    /// Operand variant does not match what the instruction consumes.
    #[error("{instruction} expected {expected}, got {actual}")]
    TypeMismatch {
        instruction: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    /// Branch condition was an integer other than 0 or 1.
    #[error("branch condition must be 0 or 1, got {value}")]
    InvalidBool { value: i64 },
    /// Code byte at `offset` names no known opcode.
    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    /// `icmp` immediate names no known comparison.
    #[error("unknown comparison code {code:#04x}")]
    UnknownCmp { code: u8 },
    /// Program counter left the code segment mid-instruction or via a jump.
    #[error("program counter {pc} out of bounds (code length {len})")]
    PcOutOfBounds { pc: i64, len: usize },
    /// `idiv` with a zero divisor.
    #[error("division by zero")]
    DivideByZero,
    /// `pushc` index outside the constant pool.
    #[error("constant index {index} out of bounds ({count} constants)")]
    BadConstant { index: u8, count: usize },
    /// `loadv`/`storev` slot not covered by the value stack.
    #[error("local slot {slot} out of bounds (stack length {len})")]
    BadSlot { slot: usize, len: usize },
    /// The `print` output sink failed.
    #[error("print failed: {0}")]
    Print(#[source] io::Error),
}
