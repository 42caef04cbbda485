//! The constant pool.

use std::ops::Range;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};
use crate::wire::Literal;

/// Compile-time handle of a resolved component, helper or modifier. The
/// handle indexes the resolver's definition table; the name is kept for
/// diagnostics and for re-resolution of cached programs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Specifier {
    pub name: String,
    pub handle: u32,
}

/// Location of a compiled block in the heap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub start: u32,
    pub len: u32,
    /// Scope slots bound, in order, to the values the block is invoked with.
    pub parameters: Vec<u32>,
}

impl BlockInfo {
    /// One past the last heap word; `None` when the range overflows.
    pub fn end(&self) -> Option<u32> {
        self.start.checked_add(self.len)
    }

    /// The block's heap range, if it fits in a heap of `heap_len` words.
    pub fn range(&self, heap_len: usize) -> Option<Range<usize>> {
        let end = self.end()? as usize;
        (end <= heap_len).then_some(self.start as usize..end)
    }
}

/// Named-argument and block layout of a component invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvocationLayout {
    pub named: Vec<String>,
    /// Block name and block constant.
    pub blocks: Vec<(String, u32)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Constant {
    String(String),
    Literal(Literal),
    Names(Vec<String>),
    Block(BlockInfo),
    Invocation(InvocationLayout),
    Component(Specifier),
    Helper(Specifier),
    Modifier(Specifier),
}

impl Constant {
    fn kind(&self) -> &'static str {
        match self {
            Constant::String(_) => "string",
            Constant::Literal(_) => "literal",
            Constant::Names(_) => "names",
            Constant::Block(_) => "block",
            Constant::Invocation(_) => "invocation",
            Constant::Component(_) => "component",
            Constant::Helper(_) => "helper",
            Constant::Modifier(_) => "modifier",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstantPool {
    constants: Vec<Constant>,
}

macro_rules! accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self, index: u32) -> Result<&$ty> {
            match self.get(index) {
                Some(Constant::$variant(value)) => Ok(value),
                other => Err(self.mismatch(index, stringify!($name), other)),
            }
        }
    };
}

impl ConstantPool {
    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Constant)> {
        self.constants
            .iter()
            .enumerate()
            .map(|(index, constant)| (index as u32, constant))
    }

    fn mismatch(&self, index: u32, wanted: &str, found: Option<&Constant>) -> RenderError {
        match found {
            Some(constant) => RenderError::invalid(format!(
                "constant {index} is a {}, expected {wanted}",
                constant.kind()
            )),
            None => RenderError::invalid(format!("constant {index} out of range")),
        }
    }

    accessor!(string, String, String);
    accessor!(literal, Literal, Literal);
    accessor!(names, Names, Vec<String>);
    accessor!(block, Block, BlockInfo);
    accessor!(invocation, Invocation, InvocationLayout);
    accessor!(component, Component, Specifier);
    accessor!(helper, Helper, Specifier);
    accessor!(modifier, Modifier, Specifier);

    /// Names constant, where `NONE` stands for an empty list.
    pub fn names_or_empty(&self, index: u32) -> Result<&[String]> {
        if index == super::NONE {
            Ok(&[])
        } else {
            self.names(index).map(Vec::as_slice)
        }
    }
}

/// Interning pool under construction.
#[derive(Debug, Default)]
pub(crate) struct ConstantPoolBuilder {
    constants: Vec<Constant>,
    strings: FxHashMap<String, u32>,
    specifiers: FxHashMap<(u8, u32), u32>,
}

impl ConstantPoolBuilder {
    fn push(&mut self, constant: Constant) -> u32 {
        self.constants.push(constant);
        (self.constants.len() - 1) as u32
    }

    pub fn string(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.strings.get(value) {
            return index;
        }
        let index = self.push(Constant::String(value.to_string()));
        self.strings.insert(value.to_string(), index);
        index
    }

    pub fn literal(&mut self, literal: &Literal) -> u32 {
        self.push(Constant::Literal(literal.clone()))
    }

    /// `NONE` for an empty list.
    pub fn names(&mut self, names: Vec<String>) -> u32 {
        if names.is_empty() {
            return super::NONE;
        }
        self.push(Constant::Names(names))
    }

    pub fn block(&mut self, info: BlockInfo) -> u32 {
        self.push(Constant::Block(info))
    }

    pub fn invocation(&mut self, layout: InvocationLayout) -> u32 {
        self.push(Constant::Invocation(layout))
    }

    pub fn component(&mut self, specifier: Specifier) -> u32 {
        self.specifier(0, specifier, Constant::Component)
    }

    pub fn helper(&mut self, specifier: Specifier) -> u32 {
        self.specifier(1, specifier, Constant::Helper)
    }

    pub fn modifier(&mut self, specifier: Specifier) -> u32 {
        self.specifier(2, specifier, Constant::Modifier)
    }

    fn specifier(&mut self, kind: u8, specifier: Specifier, wrap: fn(Specifier) -> Constant) -> u32 {
        let key = (kind, specifier.handle);
        if let Some(&index) = self.specifiers.get(&key) {
            return index;
        }
        let index = self.push(wrap(specifier));
        self.specifiers.insert(key, index);
        index
    }

    pub fn finish(self) -> ConstantPool {
        ConstantPool { constants: self.constants }
    }
}
