//! Shared harness for the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use vesper::error::UserError;
use vesper::runtime::{
    Bucket, Capabilities, CapturedArgs, DefinitionState, FunctionHelper, HelperDefinition,
    ModifierDefinition, ModifierManager,
};
use vesper::wire::SerializedTemplate;
use vesper::{Environment, PassStats, Reference, Registry, RenderConfig, RenderResult, TrackedObject, Value};
use vesper_dom::{Document, NodeId, SimpleDocument};

/// A rendered template and the document it lives in.
pub struct Harness {
    pub doc: SimpleDocument,
    pub result: RenderResult,
}

impl Harness {
    pub fn html(&self) -> String {
        self.doc.to_html(self.doc.root())
    }

    pub fn rerender(&mut self) -> PassStats {
        self.result.rerender(&mut self.doc).expect("rerender")
    }

    pub fn try_rerender(&mut self) -> vesper::Result<PassStats> {
        self.result.rerender(&mut self.doc)
    }

    pub fn destroy(&mut self) {
        self.result.destroy(&mut self.doc);
    }

    pub fn element(&self, tag: &str) -> NodeId {
        self.doc
            .find_element(self.doc.root(), tag)
            .unwrap_or_else(|| panic!("no <{tag}> in {}", self.html()))
    }

    pub fn elements(&self, tag: &str) -> Vec<NodeId> {
        self.doc.find_all(self.doc.root(), tag)
    }
}

pub fn render(registry: Registry, template: SerializedTemplate, this: Value) -> Harness {
    render_with_config(registry, template, this, RenderConfig::default())
}

pub fn render_with_config(
    registry: Registry,
    template: SerializedTemplate,
    this: Value,
    config: RenderConfig,
) -> Harness {
    let (doc, result) = try_render_with_config(registry, template, this, config);
    Harness { doc, result: result.expect("initial render") }
}

/// Renders into a fresh document, returning the document even on failure.
pub fn try_render(
    registry: Registry,
    template: SerializedTemplate,
    this: Value,
) -> (SimpleDocument, vesper::Result<RenderResult>) {
    try_render_with_config(registry, template, this, RenderConfig::default())
}

fn try_render_with_config(
    registry: Registry,
    template: SerializedTemplate,
    this: Value,
    config: RenderConfig,
) -> (SimpleDocument, vesper::Result<RenderResult>) {
    let program = Rc::new(registry.compile(&template).expect("template compiles"));
    let env = Rc::new(Environment::new(Rc::new(registry)).with_config(config));
    let mut doc = SimpleDocument::new();
    let root = doc.root();
    let result = vesper::render(program, env, &mut doc, root, None, Reference::constant(this));
    (doc, result)
}

/// A tracked object, plus the handle tests use to mutate it.
pub fn object(fields: Vec<(&str, Value)>) -> (Value, Rc<TrackedObject>) {
    let object = TrackedObject::new();
    for (key, value) in fields {
        object.insert_untracked(key, value);
    }
    let value = Value::object(object);
    let handle = value.as_object().expect("object value").clone();
    (value, handle)
}

pub fn list(items: Vec<Value>) -> Value {
    Value::list(items)
}

/// `upper`: first positional argument, uppercased.
pub fn upper_helper() -> HelperDefinition {
    HelperDefinition::new(
        "upper",
        FunctionHelper::new(|positional, _| {
            let text = positional.first().map(Value::to_display_string).unwrap_or_default();
            Ok(Value::from(text.to_uppercase()))
        }),
    )
}

/// `check`: fails when its first argument is truthy, otherwise "ok".
pub fn check_helper() -> HelperDefinition {
    HelperDefinition::new(
        "check",
        FunctionHelper::new(|positional, _| match positional.first() {
            Some(value) if value.is_truthy() => Err(UserError::new("check failed")),
            _ => Ok(Value::from("ok")),
        }),
    )
}

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

/// Modifier recording its lifecycle. Its label is the first positional
/// argument, read at creation.
pub struct Recorder {
    pub log: Log,
}

impl ModifierManager for Recorder {
    fn capabilities(&self) -> Capabilities {
        Capabilities::DESTRUCTOR
    }

    fn create(
        &self,
        _state: &DefinitionState,
        _element: NodeId,
        args: &CapturedArgs,
    ) -> Result<Bucket, UserError> {
        let label = args
            .value(0)
            .map_err(|err| UserError::new(err.to_string()))?
            .to_display_string();
        Ok(Box::new(RefCell::new(label)))
    }

    fn install(
        &self,
        bucket: &mut Bucket,
        document: &mut dyn Document,
        element: NodeId,
        args: &CapturedArgs,
    ) -> vesper::Result<()> {
        let label = args.value(0)?.to_display_string();
        document.set_attribute(element, "data-label", &label, None);
        self.log.borrow_mut().push(format!("install {label}"));
        if let Some(current) = bucket.downcast_ref::<RefCell<String>>() {
            *current.borrow_mut() = label;
        }
        Ok(())
    }

    fn update(
        &self,
        bucket: &mut Bucket,
        document: &mut dyn Document,
        element: NodeId,
        args: &CapturedArgs,
    ) -> vesper::Result<()> {
        let label = args.value(0)?.to_display_string();
        document.set_attribute(element, "data-label", &label, None);
        self.log.borrow_mut().push(format!("update {label}"));
        if let Some(current) = bucket.downcast_ref::<RefCell<String>>() {
            *current.borrow_mut() = label;
        }
        Ok(())
    }

    fn destroy(&self, bucket: &mut Bucket, _document: &mut dyn Document, _element: NodeId) {
        let label = bucket
            .downcast_ref::<RefCell<String>>()
            .map(|label| label.borrow().clone())
            .unwrap_or_default();
        self.log.borrow_mut().push(format!("destroy {label}"));
    }
}

pub fn recorder(log: &Log) -> ModifierDefinition {
    ModifierDefinition::new("track", Recorder { log: log.clone() })
}
