//! The VM instruction set.
//!
//! One enum, one integer mapping. Operands are `u32` words following the
//! opcode word; `NONE` marks an absent optional operand.

use std::fmt;

/// Absent optional operand.
pub const NONE: u32 = u32::MAX;

/// Largest operand count of any opcode.
pub const MAX_OPERANDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Op {
    // Expressions: pop operands, push one reference.
    /// `[literal]`
    PushConstant = 1,
    /// `[slot]`
    GetSymbol = 2,
    /// `[name]`
    GetArg = 3,
    /// `[name]`
    GetProperty = 4,
    /// pops key, object
    GetDynamicProperty = 5,
    /// `[helper, positional, names]`
    CallHelper = 6,
    /// `[positional, names]`, pops the helper name last pushed
    CallDynamicHelper = 7,
    /// `[count]`
    Concat = 8,
    Not = 9,
    /// pops else, then, condition
    IfInline = 10,
    Eq = 11,
    /// `[count]`
    ArrayLiteral = 12,
    /// `[names]`
    HashLiteral = 13,
    /// `[name]`
    HasBlock = 14,
    Pop = 15,
    Dup = 16,

    // Content.
    /// `[string]`
    Text = 32,
    /// `[string]`
    Comment = 33,
    AppendText = 34,
    AppendHtml = 35,

    // Elements.
    /// `[tag, namespace]`
    OpenElement = 40,
    /// `[name, value, namespace]`
    StaticAttr = 41,
    /// `[name, namespace]`
    DynamicAttr = 42,
    /// `[name, namespace]`
    TrustingDynamicAttr = 43,
    /// `[modifier, positional, names]`
    Modifier = 44,
    FlushElement = 45,
    CloseElement = 46,

    // Control flow. Jump targets are offsets from the start of the block.
    /// `[target]`
    Jump = 64,
    /// `[target]`
    JumpUnless = 65,
    /// `[block]`
    EnterTry = 66,
    /// `[block, argc]`
    InvokeBlock = 67,
    /// `[block, else block, key]`
    Each = 68,
    /// `[name, argc]`
    Yield = 69,
    Return = 70,

    // Components.
    /// `[component, positional, invocation]`
    InvokeComponent = 80,
    /// `[positional, invocation]`, pops the component name last pushed
    InvokeDynamicComponent = 81,
}

impl Op {
    pub const ALL: &'static [Op] = &[
        Op::PushConstant,
        Op::GetSymbol,
        Op::GetArg,
        Op::GetProperty,
        Op::GetDynamicProperty,
        Op::CallHelper,
        Op::CallDynamicHelper,
        Op::Concat,
        Op::Not,
        Op::IfInline,
        Op::Eq,
        Op::ArrayLiteral,
        Op::HashLiteral,
        Op::HasBlock,
        Op::Pop,
        Op::Dup,
        Op::Text,
        Op::Comment,
        Op::AppendText,
        Op::AppendHtml,
        Op::OpenElement,
        Op::StaticAttr,
        Op::DynamicAttr,
        Op::TrustingDynamicAttr,
        Op::Modifier,
        Op::FlushElement,
        Op::CloseElement,
        Op::Jump,
        Op::JumpUnless,
        Op::EnterTry,
        Op::InvokeBlock,
        Op::Each,
        Op::Yield,
        Op::Return,
        Op::InvokeComponent,
        Op::InvokeDynamicComponent,
    ];

    pub const fn code(self) -> u16 {
        self as u16
    }

    pub const fn arity(self) -> usize {
        match self {
            Op::GetDynamicProperty
            | Op::Not
            | Op::IfInline
            | Op::Eq
            | Op::Pop
            | Op::Dup
            | Op::AppendText
            | Op::AppendHtml
            | Op::FlushElement
            | Op::CloseElement
            | Op::Return => 0,
            Op::PushConstant
            | Op::GetSymbol
            | Op::GetArg
            | Op::GetProperty
            | Op::Concat
            | Op::ArrayLiteral
            | Op::HashLiteral
            | Op::HasBlock
            | Op::Text
            | Op::Comment
            | Op::Jump
            | Op::JumpUnless
            | Op::EnterTry => 1,
            Op::CallDynamicHelper
            | Op::OpenElement
            | Op::DynamicAttr
            | Op::TrustingDynamicAttr
            | Op::InvokeBlock
            | Op::Yield
            | Op::InvokeDynamicComponent => 2,
            Op::CallHelper | Op::StaticAttr | Op::Modifier | Op::Each | Op::InvokeComponent => 3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Op::PushConstant => "PushConstant",
            Op::GetSymbol => "GetSymbol",
            Op::GetArg => "GetArg",
            Op::GetProperty => "GetProperty",
            Op::GetDynamicProperty => "GetDynamicProperty",
            Op::CallHelper => "CallHelper",
            Op::CallDynamicHelper => "CallDynamicHelper",
            Op::Concat => "Concat",
            Op::Not => "Not",
            Op::IfInline => "IfInline",
            Op::Eq => "Eq",
            Op::ArrayLiteral => "ArrayLiteral",
            Op::HashLiteral => "HashLiteral",
            Op::HasBlock => "HasBlock",
            Op::Pop => "Pop",
            Op::Dup => "Dup",
            Op::Text => "Text",
            Op::Comment => "Comment",
            Op::AppendText => "AppendText",
            Op::AppendHtml => "AppendHtml",
            Op::OpenElement => "OpenElement",
            Op::StaticAttr => "StaticAttr",
            Op::DynamicAttr => "DynamicAttr",
            Op::TrustingDynamicAttr => "TrustingDynamicAttr",
            Op::Modifier => "Modifier",
            Op::FlushElement => "FlushElement",
            Op::CloseElement => "CloseElement",
            Op::Jump => "Jump",
            Op::JumpUnless => "JumpUnless",
            Op::EnterTry => "EnterTry",
            Op::InvokeBlock => "InvokeBlock",
            Op::Each => "Each",
            Op::Yield => "Yield",
            Op::Return => "Return",
            Op::InvokeComponent => "InvokeComponent",
            Op::InvokeDynamicComponent => "InvokeDynamicComponent",
        }
    }

    /// Encodes the opcode word: the code in the low half, the operand count
    /// in the high half.
    pub const fn word(self) -> u32 {
        self as u32 | ((self.arity() as u32) << 16)
    }
}

impl TryFrom<u16> for Op {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Op::ALL
            .iter()
            .copied()
            .find(|op| op.code() == code)
            .ok_or(code)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub operands: [u32; MAX_OPERANDS],
    /// Words the instruction occupies, opcode included.
    pub size: usize,
}

impl Instruction {
    pub fn op1(&self) -> u32 {
        self.operands[0]
    }

    pub fn op2(&self) -> u32 {
        self.operands[1]
    }

    pub fn op3(&self) -> u32 {
        self.operands[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_and_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for &op in Op::ALL {
            assert!(seen.insert(op.code()), "duplicate code for {op}");
            assert_eq!(Op::try_from(op.code()), Ok(op));
            assert!(op.arity() <= MAX_OPERANDS);
        }
        assert_eq!(Op::try_from(0), Err(0));
    }

    #[test]
    fn word_carries_operand_count() {
        let word = Op::CallHelper.word();
        assert_eq!(word & 0xFFFF, Op::CallHelper.code() as u32);
        assert_eq!(word >> 16, 3);
    }
}
