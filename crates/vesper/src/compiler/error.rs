//! Compile errors

use thiserror::Error;

use crate::wire::{Span, WireOp};

/// Compile result type
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors that abort compilation of a template. No partial program is
/// produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("`{name}` is not in scope and is not a helper")]
    UnresolvedReference { name: String, span: Option<Span> },

    #[error("no component named `{name}`")]
    UnresolvedComponent { name: String, span: Option<Span> },

    #[error("no helper named `{name}`")]
    UnresolvedHelper { name: String, span: Option<Span> },

    #[error("no modifier named `{name}`")]
    UnresolvedModifier { name: String, span: Option<Span> },

    #[error("`{name}` takes {expected} block parameter(s), found {found}")]
    BlockParameterArity {
        name: String,
        expected: usize,
        found: usize,
        span: Option<Span>,
    },

    #[error("attribute `{name}` is not inside an opening element")]
    AttributeOutsideElement { name: String, span: Option<Span> },

    #[error("unbalanced element: {message}")]
    UnbalancedElement { message: String, span: Option<Span> },

    #[error("block {index} does not exist or is already being compiled")]
    UnknownBlock { index: u32, span: Option<Span> },

    #[error("invalid arguments to `{name}`: {message}")]
    InvalidArguments {
        name: String,
        message: String,
        span: Option<Span>,
    },

    #[error("unsupported wire format version {found} (expected {expected})")]
    UnsupportedWireVersion { found: u32, expected: u32 },

    #[error("{op} needs wire format version {since}, but the template declares {version}")]
    WireOpTooNew {
        op: WireOp,
        since: u32,
        version: u32,
        span: Option<Span>,
    },

    #[error("`{name}` cannot be used as a block parameter")]
    ReservedName { name: String, span: Option<Span> },
}

impl CompileError {
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::UnresolvedReference { span, .. }
            | CompileError::UnresolvedComponent { span, .. }
            | CompileError::UnresolvedHelper { span, .. }
            | CompileError::UnresolvedModifier { span, .. }
            | CompileError::BlockParameterArity { span, .. }
            | CompileError::AttributeOutsideElement { span, .. }
            | CompileError::UnbalancedElement { span, .. }
            | CompileError::UnknownBlock { span, .. }
            | CompileError::InvalidArguments { span, .. }
            | CompileError::ReservedName { span, .. }
            | CompileError::WireOpTooNew { span, .. } => *span,
            CompileError::UnsupportedWireVersion { .. } => None,
        }
    }
}
