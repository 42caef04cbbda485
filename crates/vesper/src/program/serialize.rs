//! Binary program format, for caching compiled templates.
//!
//! ```text
//! magic     b"VSPR"
//! version   u16 LE
//! flags     u16 LE     bit 0: opcode name table present
//! wire      u32 LE     IR version the program was compiled from
//! main      u32 LE     constant index of the entry block
//! heap_len  u32 LE
//! heap      heap_len x u32 LE
//! meta_len  u32 LE
//! meta      JSON { constants, symbols, module_name, op_names? }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Constant, ConstantPool, Op, Program, SymbolTable};

pub const MAGIC: [u8; 4] = *b"VSPR";
pub const PROGRAM_FORMAT_VERSION: u16 = 1;
const FLAG_OP_NAMES: u16 = 1;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("not a compiled program (bad magic)")]
    BadMagic,

    #[error("unsupported program format version {0}")]
    UnsupportedVersion(u16),

    #[error("program is truncated")]
    Truncated,

    #[error("unknown opcode {code} at word {offset}")]
    UnknownOpcode { code: u16, offset: usize },

    #[error("malformed instruction at word {offset}")]
    MalformedInstruction { offset: usize },

    #[error("opcode {code} is named `{found}` in the program but `{expected}` here")]
    OpcodeTableMismatch {
        code: u16,
        found: String,
        expected: &'static str,
    },

    #[error("block constant {index} ({start}+{len}) does not cover whole instructions in the heap")]
    BlockOutOfRange { index: u32, start: u32, len: u32 },

    #[error("entry block constant {0} is missing")]
    MissingMain(u32),

    #[error("metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct Metadata {
    constants: ConstantPool,
    symbols: SymbolTable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    module_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    op_names: Option<Vec<(u16, String)>>,
}

impl Program {
    /// Encodes the program. With `op_names`, the output also carries the
    /// opcode name table, checked on load.
    pub fn to_bytes(&self, op_names: bool) -> Result<Vec<u8>, serde_json::Error> {
        let metadata = Metadata {
            constants: self.constants.clone(),
            symbols: self.symbols.clone(),
            module_name: self.module_name.clone(),
            op_names: op_names.then(|| {
                Op::ALL
                    .iter()
                    .map(|op| (op.code(), op.name().to_string()))
                    .collect()
            }),
        };
        let meta = serde_json::to_vec(&metadata)?;

        let mut out = Vec::with_capacity(24 + self.heap.len() * 4 + meta.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&PROGRAM_FORMAT_VERSION.to_le_bytes());
        let flags = if op_names { FLAG_OP_NAMES } else { 0 };
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&self.wire_version.to_le_bytes());
        out.extend_from_slice(&self.main.to_le_bytes());
        out.extend_from_slice(&(self.heap.len() as u32).to_le_bytes());
        for word in &self.heap {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
        out.extend_from_slice(&meta);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Program, DecodeError> {
        let mut reader = Reader { bytes, pos: 0 };
        if reader.take(4)? != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let version = reader.u16()?;
        if version != PROGRAM_FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let _flags = reader.u16()?;
        let wire_version = reader.u32()?;
        let main = reader.u32()?;

        let heap_len = reader.u32()? as usize;
        let mut heap = Vec::with_capacity(heap_len.min(bytes.len() / 4));
        for _ in 0..heap_len {
            heap.push(reader.u32()?);
        }
        let meta_len = reader.u32()? as usize;
        let metadata: Metadata = serde_json::from_slice(reader.take(meta_len)?)?;

        if let Some(names) = &metadata.op_names {
            for (code, found) in names {
                let expected = Op::try_from(*code)
                    .map_err(|code| DecodeError::UnknownOpcode { code, offset: 0 })?
                    .name();
                if found != expected {
                    return Err(DecodeError::OpcodeTableMismatch {
                        code: *code,
                        found: found.clone(),
                        expected,
                    });
                }
            }
        }

        let boundaries = verify_heap(&heap)?;
        verify_blocks(&metadata.constants, &boundaries)?;
        if !matches!(metadata.constants.get(main), Some(Constant::Block(_))) {
            return Err(DecodeError::MissingMain(main));
        }

        Ok(Program {
            heap,
            constants: metadata.constants,
            symbols: metadata.symbols,
            main,
            wire_version,
            module_name: metadata.module_name,
        })
    }
}

/// Every word of the heap must belong to a well-formed instruction. Returns,
/// for each offset up to and including the heap length, whether an
/// instruction starts (or the heap ends) there.
fn verify_heap(heap: &[u32]) -> Result<Vec<bool>, DecodeError> {
    let mut boundaries = vec![false; heap.len() + 1];
    let mut offset = 0;
    while offset < heap.len() {
        boundaries[offset] = true;
        let word = heap[offset];
        let code = (word & 0xFFFF) as u16;
        let op = Op::try_from(code).map_err(|code| DecodeError::UnknownOpcode { code, offset })?;
        let count = (word >> 16) as usize;
        if count != op.arity() || offset + 1 + count > heap.len() {
            return Err(DecodeError::MalformedInstruction { offset });
        }
        offset += 1 + count;
    }
    boundaries[heap.len()] = true;
    Ok(boundaries)
}

/// Every block must start and end on an instruction boundary.
fn verify_blocks(constants: &ConstantPool, boundaries: &[bool]) -> Result<(), DecodeError> {
    for (index, constant) in constants.iter() {
        let Constant::Block(info) = constant else { continue };
        let aligned = info
            .range(boundaries.len() - 1)
            .is_some_and(|range| boundaries[range.start] && boundaries[range.end]);
        if !aligned {
            return Err(DecodeError::BlockOutOfRange { index, start: info.start, len: info.len });
        }
    }
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage() {
        assert!(matches!(Program::from_bytes(b"nope"), Err(DecodeError::BadMagic)));
        assert!(matches!(Program::from_bytes(b"VS"), Err(DecodeError::Truncated)));

        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&9u16.to_le_bytes());
        assert!(matches!(
            Program::from_bytes(&bytes),
            Err(DecodeError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn heap_verification() {
        assert!(verify_heap(&[Op::Return.word()]).is_ok());
        assert!(matches!(
            verify_heap(&[Op::Text.word()]),
            Err(DecodeError::MalformedInstruction { offset: 0 })
        ));
        assert!(matches!(
            verify_heap(&[0xFFFF]),
            Err(DecodeError::UnknownOpcode { code: 0xFFFF, offset: 0 })
        ));
    }
}
