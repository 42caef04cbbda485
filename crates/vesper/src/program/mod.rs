//! Compiled programs.
//!
//! A [`Program`] is a flat heap of instruction words, a constant pool and a
//! symbol table. Blocks are contiguous heap ranges described by `Block`
//! constants; nested blocks are emitted before the block that refers to
//! them, so the main block comes last.

mod constants;
mod disasm;
mod opcode;
pub mod serialize;

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

pub(crate) use constants::ConstantPoolBuilder;
pub use constants::{BlockInfo, Constant, ConstantPool, InvocationLayout, Specifier};
pub use opcode::{Instruction, MAX_OPERANDS, NONE, Op};

/// Names of the scope slots a program uses, and the named arguments it reads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    /// Slot 0 is always `this`.
    pub symbols: Vec<String>,
    pub named_args: Vec<String>,
}

impl SymbolTable {
    pub fn size(&self) -> usize {
        self.symbols.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub(crate) heap: Vec<u32>,
    pub(crate) constants: ConstantPool,
    pub(crate) symbols: SymbolTable,
    pub(crate) main: u32,
    pub(crate) wire_version: u32,
    pub(crate) module_name: Option<String>,
}

impl Program {
    pub fn heap(&self) -> &[u32] {
        &self.heap
    }

    pub fn constants(&self) -> &ConstantPool {
        &self.constants
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Constant index of the entry block.
    pub fn main(&self) -> u32 {
        self.main
    }

    pub fn main_block(&self) -> Result<&BlockInfo> {
        self.constants.block(self.main)
    }

    pub fn wire_version(&self) -> u32 {
        self.wire_version
    }

    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    /// Decodes the instruction at `pc`.
    pub fn decode(&self, pc: usize) -> Result<Instruction> {
        let word = *self
            .heap
            .get(pc)
            .ok_or_else(|| RenderError::invalid(format!("pc {pc} is past the end of the heap")))?;
        let code = (word & 0xFFFF) as u16;
        let op = Op::try_from(code)
            .map_err(|code| RenderError::invalid(format!("unknown opcode {code} at {pc}")))?;
        let count = (word >> 16) as usize;
        if count != op.arity() {
            return Err(RenderError::invalid(format!(
                "{op} at {pc} encodes {count} operands, expected {}",
                op.arity()
            )));
        }

        let mut operands = [0; MAX_OPERANDS];
        for (i, operand) in operands.iter_mut().take(count).enumerate() {
            *operand = *self.heap.get(pc + 1 + i).ok_or_else(|| {
                RenderError::invalid(format!("{op} at {pc} is truncated"))
            })?;
        }
        Ok(Instruction { op, operands, size: 1 + count })
    }

    /// Heap range of the block behind constant `block`.
    pub fn block_range(&self, block: u32) -> Result<Range<usize>> {
        self.constants
            .block(block)?
            .range(self.heap.len())
            .ok_or_else(|| RenderError::invalid(format!("block c{block} lies outside the heap")))
    }

    /// Instructions of the block behind constant `block`, in order.
    pub fn instructions(&self, block: u32) -> Result<Vec<(usize, Instruction)>> {
        let range = self.block_range(block)?;
        let mut pc = range.start;
        let mut out = Vec::new();
        while pc < range.end {
            let instruction = self.decode(pc)?;
            out.push((pc, instruction));
            pc += instruction.size;
        }
        Ok(out)
    }

    /// Every block constant, in heap order.
    pub fn blocks(&self) -> Vec<(u32, &BlockInfo)> {
        let mut blocks: Vec<(u32, &BlockInfo)> = self
            .constants
            .iter()
            .filter_map(|(index, constant)| match constant {
                Constant::Block(info) => Some((index, info)),
                _ => None,
            })
            .collect();
        blocks.sort_by_key(|(_, info)| info.start);
        blocks
    }
}
