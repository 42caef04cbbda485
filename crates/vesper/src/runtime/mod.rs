//! Host-facing runtime: capabilities, manager contracts, definitions and the
//! resolver registry.

mod capabilities;
mod managers;
mod registry;
mod resolver;

pub use capabilities::Capabilities;
pub use managers::{
    Bucket, CapturedArgs, ComponentDefinition, ComponentManager, Definition, DefinitionState,
    FunctionHelper, HelperDefinition, HelperFn, HelperManager, ModifierDefinition,
    ModifierManager, Owner, TemplateOnlyComponentManager, no_state,
};
pub use registry::{Registry, RegistryError};
pub use resolver::RuntimeResolver;
