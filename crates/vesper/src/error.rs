//! Render errors

use thiserror::Error;

use crate::compiler::CompileError;

/// Render result type
pub type Result<T> = std::result::Result<T, RenderError>;

/// Errors surfaced by an append or update pass.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no component named `{name}` is registered")]
    UnknownComponent { name: String },

    #[error("no helper named `{name}` is registered")]
    UnknownHelper { name: String },

    #[error("no modifier named `{name}` is registered")]
    UnknownModifier { name: String },

    #[error("failed to compile layout: {0}")]
    Compile(#[from] CompileError),

    #[error(transparent)]
    User(#[from] UserError),

    #[error("reference is not updatable")]
    ReadOnlyReference,

    #[error("invalid program: {0}")]
    InvalidProgram(String),
}

impl RenderError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        RenderError::InvalidProgram(message.into())
    }
}

/// Failure raised by a helper, modifier or component hook. The VM passes it
/// through untouched.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct UserError {
    pub message: String,
}

impl UserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
