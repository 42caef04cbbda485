use std::rc::Rc;

use crate::error::{RenderError, Result};
use crate::program::Program;
use crate::reference::Reference;
use crate::runtime::CapturedArgs;

/// A block passed by a caller, closed over the caller's scope.
#[derive(Clone)]
pub(crate) struct BlockRef {
    pub program: Rc<Program>,
    pub block: u32,
    pub scope: Rc<Scope>,
}

/// Symbol-indexed references of one invocation. Slot 0 is `this`.
///
/// A scope never changes once built; entering a block derives a new scope
/// with the block's parameter slots bound.
pub(crate) struct Scope {
    slots: Vec<Reference>,
    args: Rc<CapturedArgs>,
    blocks: Rc<Vec<(String, BlockRef)>>,
}

impl Scope {
    pub fn root(size: usize, this: Reference, args: Rc<CapturedArgs>, blocks: Vec<(String, BlockRef)>) -> Rc<Self> {
        let mut slots = vec![Reference::undefined(); size.max(1)];
        slots[0] = this;
        Rc::new(Self { slots, args, blocks: Rc::new(blocks) })
    }

    pub fn get(&self, slot: u32) -> Result<Reference> {
        self.slots
            .get(slot as usize)
            .cloned()
            .ok_or_else(|| RenderError::invalid(format!("scope slot {slot} out of range")))
    }

    pub fn this(&self) -> &Reference {
        &self.slots[0]
    }

    pub fn args(&self) -> &Rc<CapturedArgs> {
        &self.args
    }

    pub fn block(&self, name: &str) -> Option<&BlockRef> {
        self.blocks.iter().find(|(n, _)| n == name).map(|(_, block)| block)
    }

    /// Scope for a block invoked with `values`, bound in order to
    /// `parameters`. Missing values bind to undefined.
    pub fn enter_block(&self, parameters: &[u32], values: Vec<Reference>) -> Result<Rc<Self>> {
        let mut slots = self.slots.clone();
        let mut values = values.into_iter();
        for &slot in parameters {
            let value = values.next().unwrap_or_else(Reference::undefined);
            *slots
                .get_mut(slot as usize)
                .ok_or_else(|| RenderError::invalid(format!("block parameter slot {slot} out of range")))? = value;
        }
        Ok(Rc::new(Self { slots, args: self.args.clone(), blocks: self.blocks.clone() }))
    }
}
