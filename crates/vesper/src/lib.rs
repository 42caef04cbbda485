//! Vesper: a template compiler and an incremental-rendering VM.
//!
//! Templates arrive as a [`wire::SerializedTemplate`], are compiled into a
//! [`program::Program`] and rendered by the [`vm`] into any
//! [`vesper_dom::Document`]. Rerenders revisit only output whose inputs
//! changed, as tracked by the [`validator`].

pub mod compiler;
pub mod error;
pub mod program;
pub mod reference;
pub mod runtime;
pub mod validator;
pub mod value;
pub mod vm;
pub mod wire;

pub use compiler::{CompileError, CompileOptions, Compiler};
pub use error::{RenderError, Result, UserError};
pub use program::Program;
pub use reference::Reference;
pub use runtime::{Capabilities, CapturedArgs, Registry};
pub use value::{TrackedObject, Value};
pub use vm::{Environment, PassStats, RenderConfig, RenderResult, render, render_with_args};
pub use vesper_dom;
