//! Normalized template IR.
//!
//! This is the compiler's input: a block of statements plus a table of nested
//! blocks addressed by index. Every statement and expression kind carries a
//! stable integer tag ([`WireOp`]) and the format version that introduced
//! it; a template may only use kinds its declared version knows.

pub mod build;

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Newest IR format version; templates built here declare it.
pub const WIRE_FORMAT_VERSION: u32 = 2;
/// Oldest IR format version the compiler still reads.
pub const MIN_WIRE_FORMAT_VERSION: u32 = 1;

/// Byte range into the template source the IR was normalized from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spanned<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(node: T) -> Self {
        Self { span: None, node }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedTemplate {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
    pub block: Block,
    /// Nested blocks, referenced by index from block statements.
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl SerializedTemplate {
    pub fn new(block: Block) -> Self {
        Self {
            version: WIRE_FORMAT_VERSION,
            module_name: None,
            block,
            blocks: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Spanned<Statement>>,
    /// Block parameter names, bound in order to the values a block is
    /// invoked with.
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// A nested block passed to a block call or component, by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedBlock {
    pub name: String,
    pub block: u32,
}

pub type Hash = Vec<(String, Expression)>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Statement {
    Text {
        value: String,
    },
    Comment {
        value: String,
    },
    OpenElement {
        tag: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
    },
    CloseElement,
    StaticAttr {
        name: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
    },
    DynamicAttr {
        name: String,
        value: Expression,
        #[serde(default)]
        trusting: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
    },
    Modifier {
        name: String,
        #[serde(default)]
        params: Vec<Expression>,
        #[serde(default)]
        hash: Hash,
    },
    Append {
        value: Expression,
        #[serde(default)]
        trusting: bool,
    },
    Block {
        name: String,
        #[serde(default)]
        params: Vec<Expression>,
        #[serde(default)]
        hash: Hash,
        #[serde(default)]
        blocks: Vec<NamedBlock>,
    },
    /// Angle-bracket component invocation. Argument names include the
    /// leading `@`.
    Component {
        tag: String,
        #[serde(default)]
        args: Hash,
        #[serde(default)]
        blocks: Vec<NamedBlock>,
    },
    Yield {
        #[serde(default = "default_block_name")]
        to: String,
        #[serde(default)]
        params: Vec<Expression>,
    },
}

fn default_block_name() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Expression {
    Literal {
        value: Literal,
    },
    /// A path lookup. `head` is `this`, an `@arg`, a block parameter or a
    /// free name resolved at compile time.
    Get {
        head: String,
        #[serde(default)]
        path: Vec<String>,
    },
    Call {
        name: String,
        #[serde(default)]
        params: Vec<Expression>,
        #[serde(default)]
        hash: Hash,
    },
    /// Concatenation of parts, produced for multi-part attribute values.
    Interpolate {
        parts: Vec<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Literal {
    /// Text of a literal used as a static attribute value; `None` means the
    /// attribute is omitted.
    pub fn attribute_text(&self) -> Option<String> {
        match self {
            Literal::Null | Literal::Bool(false) => None,
            Literal::Bool(true) => Some(String::new()),
            Literal::Number(n) => Some(crate::value::Value::Number(*n).to_display_string()),
            Literal::String(s) => Some(s.clone()),
        }
    }
}

/// Stable integer tags of the IR format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireOp {
    Text = 1,
    Comment = 2,
    OpenElement = 3,
    CloseElement = 4,
    StaticAttr = 5,
    DynamicAttr = 6,
    TrustingDynamicAttr = 7,
    Append = 8,
    TrustingAppend = 9,
    Block = 10,
    Call = 11,
    Modifier = 12,
    Component = 13,
    Yield = 14,

    Literal = 32,
    Get = 33,
    Interpolate = 34,
}

impl TryFrom<u8> for WireOp {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => WireOp::Text,
            2 => WireOp::Comment,
            3 => WireOp::OpenElement,
            4 => WireOp::CloseElement,
            5 => WireOp::StaticAttr,
            6 => WireOp::DynamicAttr,
            7 => WireOp::TrustingDynamicAttr,
            8 => WireOp::Append,
            9 => WireOp::TrustingAppend,
            10 => WireOp::Block,
            11 => WireOp::Call,
            12 => WireOp::Modifier,
            13 => WireOp::Component,
            14 => WireOp::Yield,
            32 => WireOp::Literal,
            33 => WireOp::Get,
            34 => WireOp::Interpolate,
            other => return Err(other),
        })
    }
}

impl WireOp {
    /// Format version that introduced this kind.
    pub fn since(self) -> u32 {
        match self {
            WireOp::Modifier | WireOp::Component | WireOp::Yield => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for WireOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", *self as u8)
    }
}

impl Statement {
    pub fn wire_op(&self) -> WireOp {
        match self {
            Statement::Text { .. } => WireOp::Text,
            Statement::Comment { .. } => WireOp::Comment,
            Statement::OpenElement { .. } => WireOp::OpenElement,
            Statement::CloseElement => WireOp::CloseElement,
            Statement::StaticAttr { .. } => WireOp::StaticAttr,
            Statement::DynamicAttr { trusting: false, .. } => WireOp::DynamicAttr,
            Statement::DynamicAttr { trusting: true, .. } => WireOp::TrustingDynamicAttr,
            Statement::Modifier { .. } => WireOp::Modifier,
            Statement::Append { trusting: false, .. } => WireOp::Append,
            Statement::Append { trusting: true, .. } => WireOp::TrustingAppend,
            Statement::Block { .. } => WireOp::Block,
            Statement::Component { .. } => WireOp::Component,
            Statement::Yield { .. } => WireOp::Yield,
        }
    }
}

impl Expression {
    pub fn wire_op(&self) -> WireOp {
        match self {
            Expression::Literal { .. } => WireOp::Literal,
            Expression::Get { .. } => WireOp::Get,
            Expression::Call { .. } => WireOp::Call,
            Expression::Interpolate { .. } => WireOp::Interpolate,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expression::Literal { .. })
    }
}
