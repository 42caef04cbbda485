use crate::program::Specifier;
use crate::runtime::Capabilities;

/// Name resolution the compiler performs for statically nameable
/// components, helpers and modifiers. `referrer` is the module name of the
/// template being compiled.
pub trait CompileTimeResolver {
    fn resolve_component(&self, name: &str, referrer: Option<&str>) -> Option<Specifier>;
    fn resolve_helper(&self, name: &str, referrer: Option<&str>) -> Option<Specifier>;
    fn resolve_modifier(&self, name: &str, referrer: Option<&str>) -> Option<Specifier>;

    fn component_capabilities(&self, specifier: &Specifier) -> Capabilities;
    fn helper_capabilities(&self, specifier: &Specifier) -> Capabilities;

    fn has_component(&self, name: &str, referrer: Option<&str>) -> bool {
        self.resolve_component(name, referrer).is_some()
    }

    fn has_helper(&self, name: &str, referrer: Option<&str>) -> bool {
        self.resolve_helper(name, referrer).is_some()
    }

    fn has_modifier(&self, name: &str, referrer: Option<&str>) -> bool {
        self.resolve_modifier(name, referrer).is_some()
    }
}

/// Resolves nothing. Templates compiled against it may only use keywords,
/// locals, `this` and `@args`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResolver;

impl CompileTimeResolver for NoResolver {
    fn resolve_component(&self, _name: &str, _referrer: Option<&str>) -> Option<Specifier> {
        None
    }

    fn resolve_helper(&self, _name: &str, _referrer: Option<&str>) -> Option<Specifier> {
        None
    }

    fn resolve_modifier(&self, _name: &str, _referrer: Option<&str>) -> Option<Specifier> {
        None
    }

    fn component_capabilities(&self, _specifier: &Specifier) -> Capabilities {
        Capabilities::NONE
    }

    fn helper_capabilities(&self, _specifier: &Specifier) -> Capabilities {
        Capabilities::NONE
    }
}
