//! The rendering VM.
//!
//! An append pass runs a program once against a [`Document`], building the
//! output and a render tree of updating opcodes. Each later
//! [`RenderResult::rerender`] walks that tree, skips everything whose tag
//! still validates, and patches only what changed.

mod append;
mod bounds;
mod counting;
mod elements;
mod scope;
mod sanitize;
mod updating;

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use vesper_dom::{Document, NodeId};

use crate::error::Result;
use crate::program::Program;
use crate::reference::Reference;
use crate::runtime::{CapturedArgs, Owner, RuntimeResolver};

use self::append::{Target, run_block};
use self::counting::CountingDocument;
use self::scope::Scope;
use self::updating::{BlockState, Updater, remove_block};

pub use self::updating::PassStats;

/// Run-time switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Prefix `javascript:` and `vbscript:` URLs in URL attributes with
    /// `unsafe:`. Trusting attributes are never sanitized.
    pub sanitize_urls: bool,
    /// Install modifiers. Off for output that is only serialized.
    pub interactive: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { sanitize_urls: true, interactive: true }
    }
}

/// Everything a render needs besides the program and the document.
pub struct Environment {
    pub(crate) resolver: Rc<dyn RuntimeResolver>,
    pub(crate) config: RenderConfig,
    pub(crate) owner: Owner,
}

impl Environment {
    pub fn new(resolver: Rc<dyn RuntimeResolver>) -> Self {
        Self { resolver, config: RenderConfig::default(), owner: Rc::new(()) }
    }

    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    /// Host object handed to component managers on creation.
    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Rc<dyn RuntimeResolver> {
        &self.resolver
    }
}

/// Renders `program` into `parent`, before `next`, with `this` as the
/// root context.
pub fn render(
    program: Rc<Program>,
    env: Rc<Environment>,
    document: &mut dyn Document,
    parent: NodeId,
    next: Option<NodeId>,
    this: Reference,
) -> Result<RenderResult> {
    render_with_args(program, env, document, parent, next, this, CapturedArgs::default())
}

/// Like [`render`], with named arguments readable as `@name`.
pub fn render_with_args(
    program: Rc<Program>,
    env: Rc<Environment>,
    document: &mut dyn Document,
    parent: NodeId,
    next: Option<NodeId>,
    this: Reference,
    args: CapturedArgs,
) -> Result<RenderResult> {
    let main = program.main();
    let scope = Scope::root(program.symbols().size(), this, Rc::new(args), Vec::new());
    log::debug!("rendering {}", program.module_name().unwrap_or("<anonymous>"));
    let state = run_block(&env, document, program, main, scope, Target::Fresh { parent, next })?;
    Ok(RenderResult { env, state: Some(state) })
}

/// A live render: its output, and the render tree that keeps it current.
pub struct RenderResult {
    env: Rc<Environment>,
    state: Option<BlockState>,
}

impl RenderResult {
    /// Brings the output up to date with every reference it read.
    ///
    /// An error stops the pass where it happened; blocks already patched
    /// stay patched and the failing block is retried on the next pass.
    pub fn rerender(&mut self, document: &mut dyn Document) -> Result<PassStats> {
        debug_assert!(self.state.is_some(), "rerender after destroy");
        let Some(state) = self.state.as_mut() else {
            return Ok(PassStats::default());
        };

        let mut counting = CountingDocument::new(document);
        let (result, mut stats) = {
            let mut updater = Updater::new(&self.env, &mut counting);
            let result = updater.update_all(&mut state.updating);
            (result, updater.stats)
        };
        stats.mutations = counting.mutations;
        log::debug!(
            "rerender: visited {}, revalidated {}, replayed {}, {} mutations",
            stats.visited,
            stats.revalidated,
            stats.replayed,
            stats.mutations
        );
        result.map(|()| stats)
    }

    /// Runs every destructor and removes the output. Later calls do nothing.
    pub fn destroy(&mut self, document: &mut dyn Document) {
        if let Some(state) = self.state.take() {
            remove_block(state, document);
        }
    }

    pub fn first_node(&self) -> Option<NodeId> {
        self.state.as_ref().and_then(|state| state.bounds.first_node())
    }

    pub fn last_node(&self) -> Option<NodeId> {
        self.state.as_ref().and_then(|state| state.bounds.last_node())
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.is_none()
    }
}
