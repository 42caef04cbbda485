use std::rc::Rc;

use super::{ComponentDefinition, HelperDefinition, ModifierDefinition};
use crate::error::Result;
use crate::program::Program;

/// Run-time side of resolution: turns compile-time handles back into
/// definitions, and resolves names that were only known at run time.
pub trait RuntimeResolver {
    fn lookup_component(&self, name: &str, referrer: Option<&str>) -> Option<u32>;
    fn lookup_helper(&self, name: &str, referrer: Option<&str>) -> Option<u32>;

    fn component(&self, handle: u32) -> Option<Rc<ComponentDefinition>>;
    fn helper(&self, handle: u32) -> Option<Rc<HelperDefinition>>;
    fn modifier(&self, handle: u32) -> Option<Rc<ModifierDefinition>>;

    /// Compiled layout of component `handle`, or `None` for a component
    /// without a template.
    fn component_layout(&self, handle: u32) -> Result<Option<Rc<Program>>>;

    /// Compiled layout registered under `name`, for dynamic layouts.
    fn named_layout(&self, name: &str) -> Result<Option<Rc<Program>>>;
}
