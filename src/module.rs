//! Binary module representation and decoding.
//!
//! A module is a constant pool plus a code segment, prefixed by magic bytes:
//!
//! ```text
//! module   := "hiss" count:u8 constants:constant{count} code:byte*
//! constant := 0x01 int:i64                ; hint
//!           | 0x02 arity:u8 offset:i64    ; hfunc
//! ```
//!
//! All multi-byte integers are big-endian. The code segment is everything
//! after the last constant; its length is implicit in the buffer length.

use crate::errors::LoadError;
use crate::value::{HType, HValue};

/// Magic bytes identifying a compiled module.
pub const MAGIC: &[u8; 4] = b"hiss";

/// A decoded module. Immutable after loading.
///
/// The code segment aliases the input buffer rather than copying it; offsets
/// inside [`HValue::Func`] constants are relative to its start. By convention
/// `constants[0]` is the entry function, which the machine checks at init.
#[derive(Debug)]
pub struct Module<'a> {
    /// Constant pool referenced by `pushc`, indexed in wire order.
    pub constants: Vec<HValue>,
    /// Raw code segment.
    pub code: &'a [u8],
}

impl<'a> Module<'a> {
    /// Decodes a binary module, validating the magic prefix.
    pub fn read(bytes: &'a [u8]) -> Result<Self, LoadError> {
        let mut input = bytes;
        if input.len() < MAGIC.len() || &input[..MAGIC.len()] != MAGIC {
            return Err(LoadError::MissingMagicBytes);
        }
        input = &input[MAGIC.len()..];

        let count = read_u8(&mut input)?;
        let mut constants = Vec::with_capacity(count as usize);
        for _ in 0..count {
            constants.push(read_constant(&mut input)?);
        }

        Ok(Self {
            constants,
            code: input,
        })
    }
}

fn read_u8(input: &mut &[u8]) -> Result<u8, LoadError> {
    match input.split_first() {
        Some((&first, rest)) => {
            *input = rest;
            Ok(first)
        }
        None => Err(LoadError::UnexpectedEof { needed: 1 }),
    }
}

fn read_i64(input: &mut &[u8]) -> Result<i64, LoadError> {
    if input.len() < 8 {
        return Err(LoadError::UnexpectedEof {
            needed: 8 - input.len(),
        });
    }
    let (bytes, rest) = input.split_at(8);
    *input = rest;
    Ok(i64::from_be_bytes(bytes.try_into().unwrap()))
}

fn read_constant(input: &mut &[u8]) -> Result<HValue, LoadError> {
    match HType::try_from(read_u8(input)?)? {
        HType::Int => Ok(HValue::Int(read_i64(input)?)),
        HType::Func => {
            let arity = read_u8(input)?;
            let offset = read_i64(input)? as u64;
            Ok(HValue::Func { offset, arity })
        }
    }
}
