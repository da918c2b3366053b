//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the canonical
//! opcode definitions and invokes a callback macro for code generation. This
//! lets multiple modules generate opcode-related code without duplicating the
//! definitions.
//!
//! This module generates:
//! - The [`Opcode`] enum with byte mappings
//! - `TryFrom<u8>` for decoding opcode bytes
//!
//! See [`assembler`](crate::assembler) for the generated mnemonic lookup used
//! while parsing.
//!
//! # Bytecode Format
//!
//! Every instruction is one opcode byte followed by zero or more single-byte
//! immediates. Branch displacements are two immediates forming a big-endian
//! signed 16-bit value.

use crate::errors::RuntimeError;

/// Invokes a callback macro with the complete opcode definition list.
///
/// Each entry is `Name = byte, "mnemonic", immediate-byte-count`.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            /// noop ; no effect
            Noop = 0x00, "noop", 0,
            /// pushc idx ; push constants[idx]
            Pushc = 0x11, "pushc", 1,
            /// pop ; pop and discard the top of stack
            Pop = 0x12, "pop", 0,
            /// loadv idx ; push the local in slot fp+idx
            Loadv = 0x13, "loadv", 1,
            /// storev idx ; pop into the local in slot fp+idx
            Storev = 0x14, "storev", 1,
            /// halt ; stop execution
            Halt = 0x20, "halt", 0,
            /// call ; pop a function value and enter it
            Call = 0x21, "call", 0,
            /// ret ; pop the current frame and return the top of stack
            Ret = 0x22, "ret", 0,
            /// br hi lo ; pop a boolean, jump by the signed displacement if true
            Br = 0x23, "br", 2,
            /// jmp hi lo ; jump by the signed displacement
            Jmp = 0x24, "jmp", 2,
            /// iadd ; pop x, pop y, push x + y
            Iadd = 0x30, "iadd", 0,
            /// isub ; pop x, pop y, push x - y
            Isub = 0x31, "isub", 0,
            /// imul ; pop x, pop y, push x * y
            Imul = 0x32, "imul", 0,
            /// idiv ; pop x, pop y, push x / y (truncated)
            Idiv = 0x33, "idiv", 0,
            /// iand ; pop x, pop y, push x & y
            Iand = 0x34, "iand", 0,
            /// ior ; pop x, pop y, push x | y
            Ior = 0x35, "ior", 0,
            /// icmp cmp ; pop x, push the result of comparing x against zero
            Icmp = 0x36, "icmp", 1,
            /// print ; peek the top of stack and write it to the output sink
            Print = 0xF0, "print", 0,
        }
    };
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $byte:literal, $mnemonic:literal, $imms:literal
        ),* $(,)?
    ) => {
        /// A single-byte instruction identifier.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $byte,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = RuntimeError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $byte => Ok(Opcode::$name), )*
                    _ => Err(RuntimeError::UnknownOpcode {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Opcode {
            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the number of immediate bytes following the opcode.
            pub const fn immediates(&self) -> usize {
                match self {
                    $( Opcode::$name => $imms, )*
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);

/// Comparison codes carried by the `icmp` immediate.
///
/// Every code compares the popped operand against zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Cmp {
    Eq = 0x00,
    Neq = 0x01,
    Lt = 0x02,
    Leq = 0x03,
    Gt = 0x04,
    Geq = 0x05,
}

impl TryFrom<u8> for Cmp {
    type Error = RuntimeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Cmp::Eq),
            0x01 => Ok(Cmp::Neq),
            0x02 => Ok(Cmp::Lt),
            0x03 => Ok(Cmp::Leq),
            0x04 => Ok(Cmp::Gt),
            0x05 => Ok(Cmp::Geq),
            _ => Err(RuntimeError::UnknownCmp { code: value }),
        }
    }
}

impl Cmp {
    /// Applies the comparison to `x` against zero.
    pub fn eval(self, x: i64) -> bool {
        match self {
            Cmp::Eq => x == 0,
            Cmp::Neq => x != 0,
            Cmp::Lt => x < 0,
            Cmp::Leq => x <= 0,
            Cmp::Gt => x > 0,
            Cmp::Geq => x >= 0,
        }
    }
}
