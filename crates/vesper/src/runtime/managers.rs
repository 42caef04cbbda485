//! Manager contracts for components, helpers and modifiers.

use std::any::Any;
use std::rc::Rc;

use vesper_dom::{Document, NodeId};

use super::Capabilities;
use crate::error::{Result, UserError};
use crate::reference::Reference;
use crate::value::Value;
use crate::wire::SerializedTemplate;

/// Per-instance state a manager hands back from `create`.
pub type Bucket = Box<dyn Any>;
/// Host object passed to component managers on creation.
pub type Owner = Rc<dyn Any>;
/// Definition-level state shared by every instance of a definition.
pub type DefinitionState = Rc<dyn Any>;

pub fn no_state() -> DefinitionState {
    Rc::new(())
}

/// Arguments captured at an invocation site, as references.
#[derive(Debug, Clone, Default)]
pub struct CapturedArgs {
    pub positional: Vec<Reference>,
    pub named: Vec<(Rc<str>, Reference)>,
}

impl CapturedArgs {
    pub fn new(positional: Vec<Reference>, named: Vec<(Rc<str>, Reference)>) -> Self {
        Self { positional, named }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    pub fn positional(&self, index: usize) -> Option<&Reference> {
        self.positional.get(index)
    }

    pub fn named(&self, name: &str) -> Option<&Reference> {
        self.named
            .iter()
            .find(|(key, _)| &**key == name)
            .map(|(_, reference)| reference)
    }

    /// Value of positional argument `index`; undefined when absent.
    pub fn value(&self, index: usize) -> Result<Value> {
        self.positional(index).map_or(Ok(Value::Undefined), Reference::value)
    }

    pub fn named_value(&self, name: &str) -> Result<Value> {
        self.named(name).map_or(Ok(Value::Undefined), Reference::value)
    }

    pub fn positional_values(&self) -> Result<Vec<Value>> {
        self.positional.iter().map(Reference::value).collect()
    }

    pub fn named_values(&self) -> Result<Vec<(Rc<str>, Value)>> {
        self.named
            .iter()
            .map(|(name, reference)| Ok((name.clone(), reference.value()?)))
            .collect()
    }

    /// Reads every argument, so a surrounding tracking frame sees all of
    /// their tags.
    pub fn read_all(&self) -> Result<()> {
        for reference in self.positional.iter().chain(self.named.iter().map(|(_, r)| r)) {
            reference.value()?;
        }
        Ok(())
    }
}

pub trait ComponentManager {
    fn capabilities(&self) -> Capabilities;

    /// Called with `CREATE_INSTANCE`. `args` is empty unless the manager
    /// also declares `CREATE_ARGS`; `caller` is the invoking scope's `this`.
    fn create(
        &self,
        _owner: &Owner,
        _state: &DefinitionState,
        _args: &CapturedArgs,
        _caller: &Reference,
    ) -> std::result::Result<Bucket, UserError> {
        Ok(Box::new(()))
    }

    /// The layout's `this`.
    fn self_ref(&self, _bucket: &Bucket) -> Reference {
        Reference::undefined()
    }

    /// Called with `UPDATE_HOOK` when an argument changed.
    fn update(&self, _bucket: &Bucket, _args: &CapturedArgs) -> std::result::Result<(), UserError> {
        Ok(())
    }

    /// Called with `DESTRUCTOR` when the component is torn down.
    fn destroy(&self, _bucket: &Bucket) {}

    /// Called with `DYNAMIC_LAYOUT`: the name of a registered layout.
    fn dynamic_layout(&self, _bucket: &Bucket) -> Option<String> {
        None
    }
}

/// Manager for components that are only a template.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateOnlyComponentManager;

impl ComponentManager for TemplateOnlyComponentManager {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }
}

pub trait HelperManager {
    fn capabilities(&self) -> Capabilities;

    fn create(&self, _state: &DefinitionState, _args: &CapturedArgs) -> std::result::Result<Bucket, UserError> {
        Ok(Box::new(()))
    }

    /// Computes the helper's value. Runs inside the tracking frame of the
    /// helper's reference, so every argument read here is a dependency.
    fn value(&self, bucket: &Bucket, args: &CapturedArgs) -> Result<Value>;

    fn destroy(&self, _bucket: &Bucket) {}
}

pub type HelperFn = dyn Fn(&[Value], &[(Rc<str>, Value)]) -> std::result::Result<Value, UserError>;

/// A helper backed by a plain function of its argument values.
pub struct FunctionHelper {
    function: Rc<HelperFn>,
    capabilities: Capabilities,
}

impl FunctionHelper {
    pub fn new(
        function: impl Fn(&[Value], &[(Rc<str>, Value)]) -> std::result::Result<Value, UserError> + 'static,
    ) -> Self {
        Self { function: Rc::new(function), capabilities: Capabilities::NONE }
    }

    /// A helper whose output is HTML.
    pub fn trusted(
        function: impl Fn(&[Value], &[(Rc<str>, Value)]) -> std::result::Result<Value, UserError> + 'static,
    ) -> Self {
        Self { function: Rc::new(function), capabilities: Capabilities::TRUSTED_OUTPUT }
    }
}

impl HelperManager for FunctionHelper {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn value(&self, _bucket: &Bucket, args: &CapturedArgs) -> Result<Value> {
        let positional = args.positional_values()?;
        let named = args.named_values()?;
        Ok((self.function)(&positional, &named)?)
    }
}

pub trait ModifierManager {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    fn create(
        &self,
        _state: &DefinitionState,
        _element: NodeId,
        _args: &CapturedArgs,
    ) -> std::result::Result<Bucket, UserError> {
        Ok(Box::new(()))
    }

    /// Runs once the element is in the document. Arguments read here are
    /// tracked; when any of them changes, `update` runs.
    fn install(
        &self,
        bucket: &mut Bucket,
        document: &mut dyn Document,
        element: NodeId,
        args: &CapturedArgs,
    ) -> Result<()>;

    fn update(
        &self,
        bucket: &mut Bucket,
        document: &mut dyn Document,
        element: NodeId,
        args: &CapturedArgs,
    ) -> Result<()>;

    /// Called with `DESTRUCTOR`, before the element leaves the document.
    fn destroy(&self, _bucket: &mut Bucket, _document: &mut dyn Document, _element: NodeId) {}
}

pub struct ComponentDefinition {
    pub name: String,
    pub manager: Rc<dyn ComponentManager>,
    pub state: DefinitionState,
    /// Layout IR; `None` renders nothing unless the manager picks a
    /// dynamic layout.
    pub template: Option<SerializedTemplate>,
}

impl ComponentDefinition {
    pub fn template_only(name: impl Into<String>, template: SerializedTemplate) -> Self {
        Self {
            name: name.into(),
            manager: Rc::new(TemplateOnlyComponentManager),
            state: no_state(),
            template: Some(template),
        }
    }
}

pub struct HelperDefinition {
    pub name: String,
    pub manager: Rc<dyn HelperManager>,
    pub state: DefinitionState,
}

impl HelperDefinition {
    pub fn new(name: impl Into<String>, manager: impl HelperManager + 'static) -> Self {
        Self { name: name.into(), manager: Rc::new(manager), state: no_state() }
    }
}

pub struct ModifierDefinition {
    pub name: String,
    pub manager: Rc<dyn ModifierManager>,
    pub state: DefinitionState,
}

impl ModifierDefinition {
    pub fn new(name: impl Into<String>, manager: impl ModifierManager + 'static) -> Self {
        Self { name: name.into(), manager: Rc::new(manager), state: no_state() }
    }
}

/// Any registrable definition.
pub enum Definition {
    Component(ComponentDefinition),
    Helper(HelperDefinition),
    Modifier(ModifierDefinition),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Component(definition) => &definition.name,
            Definition::Helper(definition) => &definition.name,
            Definition::Modifier(definition) => &definition.name,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Definition::Component(definition) => definition.manager.capabilities(),
            Definition::Helper(definition) => definition.manager.capabilities(),
            Definition::Modifier(definition) => definition.manager.capabilities(),
        }
    }

    /// Capabilities a manager of this kind may declare.
    pub fn allowed_capabilities(&self) -> Capabilities {
        match self {
            Definition::Component(_) => Capabilities::COMPONENT,
            Definition::Helper(_) => Capabilities::HELPER,
            Definition::Modifier(_) => Capabilities::MODIFIER,
        }
    }
}

impl From<ComponentDefinition> for Definition {
    fn from(definition: ComponentDefinition) -> Self {
        Definition::Component(definition)
    }
}

impl From<HelperDefinition> for Definition {
    fn from(definition: HelperDefinition) -> Self {
        Definition::Helper(definition)
    }
}

impl From<ModifierDefinition> for Definition {
    fn from(definition: ModifierDefinition) -> Self {
        Definition::Modifier(definition)
    }
}
