//! Name-keyed definition tables implementing both resolver contracts.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::{
    Capabilities, ComponentDefinition, Definition, HelperDefinition, ModifierDefinition,
    RuntimeResolver,
};
use crate::compiler::{CompileOptions, CompileTimeResolver, Compiler};
use crate::error::Result;
use crate::program::{Program, Specifier};
use crate::wire::SerializedTemplate;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("`{name}` declares capabilities {excess:?} that its kind does not support")]
    InvalidCapabilities { name: String, excess: Capabilities },

    #[error("`{name}` is already registered")]
    DuplicateName { name: String },
}

struct Table<T> {
    definitions: Vec<Rc<T>>,
    names: FxHashMap<String, u32>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self { definitions: Vec::new(), names: FxHashMap::default() }
    }
}

impl<T> Table<T> {
    fn insert(&mut self, name: &str, definition: T) -> std::result::Result<u32, RegistryError> {
        if self.names.contains_key(name) {
            return Err(RegistryError::DuplicateName { name: name.to_string() });
        }
        let handle = self.definitions.len() as u32;
        self.definitions.push(Rc::new(definition));
        self.names.insert(name.to_string(), handle);
        Ok(handle)
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        self.names.get(name).copied()
    }

    fn get(&self, handle: u32) -> Option<&Rc<T>> {
        self.definitions.get(handle as usize)
    }
}

/// Components, helpers and modifiers by name. Names are global; the
/// referrer is not consulted.
///
/// Layouts compile on first use against the registry itself and are cached.
#[derive(Default)]
pub struct Registry {
    components: Table<ComponentDefinition>,
    helpers: Table<HelperDefinition>,
    modifiers: Table<ModifierDefinition>,
    layouts: FxHashMap<String, SerializedTemplate>,
    compiled: RefCell<FxHashMap<u32, Rc<Program>>>,
    compiled_named: RefCell<FxHashMap<String, Rc<Program>>>,
    options: CompileOptions,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompileOptions) -> Self {
        Self { options, ..Self::default() }
    }

    pub fn options(&self) -> CompileOptions {
        self.options
    }

    /// Registers any definition after checking its capabilities against
    /// what its kind supports. Returns the new handle.
    pub fn register(&mut self, definition: impl Into<Definition>) -> std::result::Result<u32, RegistryError> {
        let definition = definition.into();
        let excess = definition.capabilities().excess(definition.allowed_capabilities());
        if !excess.is_empty() {
            return Err(RegistryError::InvalidCapabilities {
                name: definition.name().to_string(),
                excess,
            });
        }
        let handle = match definition {
            Definition::Component(component) => {
                let name = component.name.clone();
                self.components.insert(&name, component)?
            }
            Definition::Helper(helper) => {
                let name = helper.name.clone();
                self.helpers.insert(&name, helper)?
            }
            Definition::Modifier(modifier) => {
                let name = modifier.name.clone();
                self.modifiers.insert(&name, modifier)?
            }
        };
        Ok(handle)
    }

    pub fn register_component(&mut self, definition: ComponentDefinition) -> std::result::Result<u32, RegistryError> {
        self.register(definition)
    }

    pub fn register_helper(&mut self, definition: HelperDefinition) -> std::result::Result<u32, RegistryError> {
        self.register(definition)
    }

    pub fn register_modifier(&mut self, definition: ModifierDefinition) -> std::result::Result<u32, RegistryError> {
        self.register(definition)
    }

    /// A layout components can select through `DYNAMIC_LAYOUT`.
    pub fn register_layout(
        &mut self,
        name: impl Into<String>,
        template: SerializedTemplate,
    ) -> std::result::Result<(), RegistryError> {
        let name = name.into();
        if self.layouts.contains_key(&name) {
            return Err(RegistryError::DuplicateName { name });
        }
        self.layouts.insert(name, template);
        Ok(())
    }

    /// Compiles `template` against this registry.
    pub fn compile(&self, template: &SerializedTemplate) -> crate::compiler::Result<Program> {
        Compiler::new(self, self.options).compile(template)
    }
}

impl CompileTimeResolver for Registry {
    fn resolve_component(&self, name: &str, _referrer: Option<&str>) -> Option<Specifier> {
        self.components
            .lookup(name)
            .map(|handle| Specifier { name: name.to_string(), handle })
    }

    fn resolve_helper(&self, name: &str, _referrer: Option<&str>) -> Option<Specifier> {
        self.helpers
            .lookup(name)
            .map(|handle| Specifier { name: name.to_string(), handle })
    }

    fn resolve_modifier(&self, name: &str, _referrer: Option<&str>) -> Option<Specifier> {
        self.modifiers
            .lookup(name)
            .map(|handle| Specifier { name: name.to_string(), handle })
    }

    fn component_capabilities(&self, specifier: &Specifier) -> Capabilities {
        self.components
            .get(specifier.handle)
            .map_or(Capabilities::NONE, |definition| definition.manager.capabilities())
    }

    fn helper_capabilities(&self, specifier: &Specifier) -> Capabilities {
        self.helpers
            .get(specifier.handle)
            .map_or(Capabilities::NONE, |definition| definition.manager.capabilities())
    }
}

impl RuntimeResolver for Registry {
    fn lookup_component(&self, name: &str, _referrer: Option<&str>) -> Option<u32> {
        let handle = self.components.lookup(name);
        if handle.is_none() {
            log::debug!("no component named `{name}`");
        }
        handle
    }

    fn lookup_helper(&self, name: &str, _referrer: Option<&str>) -> Option<u32> {
        let handle = self.helpers.lookup(name);
        if handle.is_none() {
            log::debug!("no helper named `{name}`");
        }
        handle
    }

    fn component(&self, handle: u32) -> Option<Rc<ComponentDefinition>> {
        self.components.get(handle).cloned()
    }

    fn helper(&self, handle: u32) -> Option<Rc<HelperDefinition>> {
        self.helpers.get(handle).cloned()
    }

    fn modifier(&self, handle: u32) -> Option<Rc<ModifierDefinition>> {
        self.modifiers.get(handle).cloned()
    }

    fn component_layout(&self, handle: u32) -> Result<Option<Rc<Program>>> {
        if let Some(program) = self.compiled.borrow().get(&handle) {
            return Ok(Some(program.clone()));
        }
        let Some(definition) = self.components.get(handle) else {
            return Ok(None);
        };
        let Some(template) = &definition.template else {
            return Ok(None);
        };
        log::debug!("compiling layout of `{}`", definition.name);
        let program = Rc::new(self.compile(template)?);
        self.compiled.borrow_mut().insert(handle, program.clone());
        Ok(Some(program))
    }

    fn named_layout(&self, name: &str) -> Result<Option<Rc<Program>>> {
        if let Some(program) = self.compiled_named.borrow().get(name) {
            return Ok(Some(program.clone()));
        }
        let Some(template) = self.layouts.get(name) else {
            return Ok(None);
        };
        log::debug!("compiling layout `{name}`");
        let program = Rc::new(self.compile(template)?);
        self.compiled_named.borrow_mut().insert(name.to_string(), program.clone());
        Ok(Some(program))
    }
}
