//! The render tree and the update pass over it.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use vesper_dom::{Document, NodeId};

use super::Environment;
use super::append::{Target, attribute_text, run_block};
use super::bounds::{BlockBounds, Edge};
use super::elements::ElementBuilder;
use super::sanitize::{is_url_attribute, sanitize_url};
use super::scope::Scope;
use crate::error::Result;
use crate::program::Program;
use crate::reference::Reference;
use crate::runtime::{Bucket, CapturedArgs, ComponentManager, ModifierManager};
use crate::validator::{CONSTANT, Revision, Tag, track, untrack, validate, value_for_tag};
use crate::value::Value;

pub(crate) type Destructor = Box<dyn FnOnce(&mut dyn Document)>;

/// What a try block was rendered under. If it no longer holds, the block
/// is replayed.
pub(crate) enum Guard {
    Truthy { reference: Reference, expected: bool },
    Equals { reference: Reference, expected: Value },
    /// The last replay failed; never holds, so the next pass replays again.
    Failed,
}

impl Guard {
    fn holds(&self) -> Result<bool> {
        Ok(match self {
            Guard::Truthy { reference, expected } => reference.value()?.is_truthy() == *expected,
            Guard::Equals { reference, expected } => reference.value()? == *expected,
            Guard::Failed => false,
        })
    }
}

/// Render-tree contents collected while a block is being appended.
#[derive(Default)]
pub(crate) struct OpenBlock {
    pub updating: Vec<UpdatingOpcode>,
    pub destructors: Vec<Destructor>,
    pub guards: Vec<Guard>,
}

pub(crate) struct BlockState {
    pub bounds: Rc<BlockBounds>,
    pub updating: Vec<UpdatingOpcode>,
    pub destructors: Vec<Destructor>,
    pub guards: Vec<Guard>,
}

impl BlockState {
    pub fn new(bounds: Rc<BlockBounds>, open: OpenBlock) -> Self {
        Self {
            bounds,
            updating: open.updating,
            destructors: open.destructors,
            guards: open.guards,
        }
    }

    fn empty(bounds: Rc<BlockBounds>) -> Self {
        Self::new(bounds, OpenBlock::default())
    }
}

pub(crate) struct TryBlock {
    pub program: Rc<Program>,
    pub block: u32,
    pub scope: Rc<Scope>,
    pub state: BlockState,
}

pub(crate) struct ListItem {
    pub key: String,
    pub item: Reference,
    pub index: Reference,
    pub state: BlockState,
}

pub(crate) struct ListBlock {
    pub program: Rc<Program>,
    pub item_block: u32,
    pub else_block: Option<u32>,
    pub key: Option<Rc<str>>,
    pub scope: Rc<Scope>,
    pub reference: Reference,
    pub snapshot: Revision,
    pub bounds: Rc<BlockBounds>,
    /// Trailing comment marking the end of the list.
    pub anchor: NodeId,
    pub items: Vec<ListItem>,
    pub otherwise: Option<BlockState>,
}

pub(crate) struct AttributeState {
    pub reference: Reference,
    pub element: NodeId,
    pub name: Rc<str>,
    pub namespace: Option<Rc<str>>,
    pub trusting: bool,
    pub last: Option<String>,
    pub snapshot: Revision,
}

pub(crate) struct ModifierState {
    pub manager: Rc<dyn ModifierManager>,
    pub bucket: Rc<RefCell<Bucket>>,
    pub element: NodeId,
    pub args: Rc<CapturedArgs>,
    pub tag: Tag,
    pub snapshot: Revision,
}

pub(crate) struct ComponentState {
    pub manager: Rc<dyn ComponentManager>,
    pub bucket: Rc<Bucket>,
    pub args: Rc<CapturedArgs>,
    pub tag: Tag,
    pub snapshot: Revision,
}

/// A node of the render tree.
pub(crate) enum UpdatingOpcode {
    Text {
        reference: Reference,
        node: NodeId,
        last: String,
        snapshot: Revision,
    },
    Html {
        reference: Reference,
        bounds: Rc<BlockBounds>,
        last: String,
        snapshot: Revision,
    },
    Attribute(AttributeState),
    Modifier(ModifierState),
    Component(ComponentState),
    Try(TryBlock),
    List(ListBlock),
}

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Updating opcodes looked at.
    pub visited: usize,
    /// Opcodes whose tag no longer validated.
    pub revalidated: usize,
    /// Blocks torn down and appended again.
    pub replayed: usize,
    /// Document mutations performed.
    pub mutations: usize,
}

pub(crate) fn list_values(value: &Value) -> Vec<Value> {
    value.as_list().map(<[Value]>::to_vec).unwrap_or_default()
}

/// Keys list items by `@index`, `@identity` (the default) or a property
/// path. Repeated keys get a numeric suffix so every key is unique.
pub(crate) fn list_keys(values: &[Value], key: Option<&str>) -> Vec<String> {
    let mut seen: FxHashMap<String, usize> = FxHashMap::default();
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let base = match key.unwrap_or("@identity") {
                "@index" => index.to_string(),
                "@identity" => value.identity_key(),
                path => untrack(|| {
                    path.split('.')
                        .fold(value.clone(), |current, segment| current.get_property(segment))
                })
                .identity_key(),
            };
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 { base } else { format!("{base}#{}", *count - 1) }
        })
        .collect()
}

/// Runs destructors for a block and everything nested in it, children
/// before parents and later before earlier. The output stays in place.
pub(crate) fn destroy_state(state: BlockState, document: &mut dyn Document) -> Rc<BlockBounds> {
    teardown(state.updating, state.destructors, document);
    state.bounds
}

pub(crate) fn teardown(updating: Vec<UpdatingOpcode>, destructors: Vec<Destructor>, document: &mut dyn Document) {
    for opcode in updating.into_iter().rev() {
        match opcode {
            UpdatingOpcode::Try(block) => {
                destroy_state(block.state, &mut *document);
            }
            UpdatingOpcode::List(list) => {
                if let Some(otherwise) = list.otherwise {
                    destroy_state(otherwise, &mut *document);
                }
                for item in list.items.into_iter().rev() {
                    destroy_state(item.state, &mut *document);
                }
            }
            _ => {}
        }
    }
    for destructor in destructors.into_iter().rev() {
        destructor(&mut *document);
    }
}

/// Destroys a block and removes its output.
pub(crate) fn remove_block(state: BlockState, document: &mut dyn Document) -> Option<NodeId> {
    let bounds = destroy_state(state, &mut *document);
    bounds.clear(document)
}

enum Slot {
    Retained(ListItem, Value),
    New(String, Value),
}

pub(crate) struct Updater<'a> {
    env: &'a Environment,
    document: &'a mut dyn Document,
    pub stats: PassStats,
}

impl<'a> Updater<'a> {
    pub fn new(env: &'a Environment, document: &'a mut dyn Document) -> Self {
        Self { env, document, stats: PassStats::default() }
    }

    pub fn update_all(&mut self, opcodes: &mut [UpdatingOpcode]) -> Result<()> {
        for opcode in opcodes {
            self.update(opcode)?;
        }
        Ok(())
    }

    fn update(&mut self, opcode: &mut UpdatingOpcode) -> Result<()> {
        self.stats.visited += 1;
        match opcode {
            UpdatingOpcode::Text { reference, node, last, snapshot } => {
                if reference.is_valid(*snapshot) {
                    return Ok(());
                }
                self.stats.revalidated += 1;
                let text = reference.value()?.to_display_string();
                if text != *last {
                    self.document.set_text(*node, &text);
                    *last = text;
                }
                *snapshot = reference.snapshot();
            }
            UpdatingOpcode::Html { reference, bounds, last, snapshot } => {
                if reference.is_valid(*snapshot) {
                    return Ok(());
                }
                self.stats.revalidated += 1;
                let html = reference.value()?.to_display_string();
                if html != *last {
                    let next = bounds.clear(&mut *self.document);
                    let mut builder = ElementBuilder::resume(bounds.clone(), next);
                    builder.append_html(&mut *self.document, &html);
                    builder.end_block(&mut *self.document);
                    *last = html;
                }
                *snapshot = reference.snapshot();
            }
            UpdatingOpcode::Attribute(attribute) => self.update_attribute(attribute)?,
            UpdatingOpcode::Modifier(modifier) => {
                if validate(&modifier.tag, modifier.snapshot) {
                    return Ok(());
                }
                self.stats.revalidated += 1;
                let document = &mut *self.document;
                let (result, tag) = track(|| {
                    let mut bucket = modifier.bucket.borrow_mut();
                    modifier.manager.update(&mut bucket, document, modifier.element, &modifier.args)
                });
                result?;
                modifier.snapshot = value_for_tag(&tag);
                modifier.tag = tag;
            }
            UpdatingOpcode::Component(component) => {
                if validate(&component.tag, component.snapshot) {
                    return Ok(());
                }
                self.stats.revalidated += 1;
                let (result, tag) = track(|| -> Result<()> {
                    component.args.read_all()?;
                    component.manager.update(&component.bucket, &component.args)?;
                    Ok(())
                });
                result?;
                component.snapshot = value_for_tag(&tag);
                component.tag = tag;
            }
            UpdatingOpcode::Try(block) => self.update_try(block)?,
            UpdatingOpcode::List(list) => self.update_list(list)?,
        }
        Ok(())
    }

    fn update_attribute(&mut self, attribute: &mut AttributeState) -> Result<()> {
        if attribute.reference.is_valid(attribute.snapshot) {
            return Ok(());
        }
        self.stats.revalidated += 1;
        let mut value = attribute_text(&attribute.reference.value()?);
        if let Some(text) = &mut value {
            if !attribute.trusting && self.env.config.sanitize_urls && is_url_attribute(&attribute.name) {
                *text = sanitize_url(text).into_owned();
            }
        }
        if value != attribute.last {
            let namespace = attribute.namespace.as_deref();
            match &value {
                Some(text) => self.document.set_attribute(attribute.element, &attribute.name, text, namespace),
                None => self.document.remove_attribute(attribute.element, &attribute.name, namespace),
            }
            attribute.last = value;
        }
        attribute.snapshot = attribute.reference.snapshot();
        Ok(())
    }

    fn update_try(&mut self, block: &mut TryBlock) -> Result<()> {
        let mut holds = true;
        for guard in &block.state.guards {
            if !guard.holds()? {
                holds = false;
                break;
            }
        }
        if holds {
            return self.update_all(&mut block.state.updating);
        }

        self.stats.revalidated += 1;
        self.stats.replayed += 1;
        log::trace!("replaying block c{}", block.block);

        let bounds = block.state.bounds.clone();
        let old = std::mem::replace(&mut block.state, BlockState::empty(bounds.clone()));
        teardown(old.updating, old.destructors, &mut *self.document);
        let next = bounds.clear(&mut *self.document);

        let replay = run_block(
            self.env,
            &mut *self.document,
            block.program.clone(),
            block.block,
            block.scope.clone(),
            Target::Resume { bounds: bounds.clone(), next },
        );
        match replay {
            Ok(state) => {
                block.state = state;
                Ok(())
            }
            Err(err) => {
                let placeholder = self.document.create_comment("");
                self.document.insert_before(bounds.parent(), placeholder, next);
                bounds.did_append(Edge::Node(placeholder));
                block.state.guards = vec![Guard::Failed];
                Err(err)
            }
        }
    }

    fn update_list(&mut self, list: &mut ListBlock) -> Result<()> {
        if list.reference.is_valid(list.snapshot) {
            for item in &mut list.items {
                self.update_all(&mut item.state.updating)?;
            }
            if let Some(otherwise) = &mut list.otherwise {
                self.update_all(&mut otherwise.updating)?;
            }
            return Ok(());
        }

        self.stats.revalidated += 1;
        let values = list_values(&list.reference.value()?);
        list.snapshot = list.reference.snapshot();
        let had_otherwise = list.otherwise.is_some();
        self.reconcile(list, values)?;

        for item in &mut list.items {
            self.update_all(&mut item.state.updating)?;
        }
        // An else block kept by `reconcile` still needs its own pass.
        if had_otherwise {
            if let Some(otherwise) = &mut list.otherwise {
                self.update_all(&mut otherwise.updating)?;
            }
        }
        Ok(())
    }

    /// Keyed reconciliation: reuse items whose key survives, remove the
    /// rest, then walk back to front inserting new items and moving
    /// retained ones in front of their successor.
    fn reconcile(&mut self, list: &mut ListBlock, values: Vec<Value>) -> Result<()> {
        let keys = list_keys(&values, list.key.as_deref());
        let mut old: FxHashMap<String, ListItem> =
            list.items.drain(..).map(|item| (item.key.clone(), item)).collect();

        let mut slots: Vec<Slot> = keys
            .into_iter()
            .zip(values)
            .map(|(key, value)| match old.remove(&key) {
                Some(item) => Slot::Retained(item, value),
                None => Slot::New(key, value),
            })
            .collect();

        let removed = old.len();
        for (_, item) in old {
            remove_block(item.state, &mut *self.document);
        }

        if !slots.is_empty() {
            if let Some(otherwise) = list.otherwise.take() {
                remove_block(otherwise, &mut *self.document);
            }
        }

        let parent = list.bounds.parent();
        let mut next = list.anchor;
        let mut placed: Vec<(ListItem, Option<Value>)> = Vec::with_capacity(slots.len());
        while let Some(slot) = slots.pop() {
            let index = slots.len();
            let item = match slot {
                Slot::Retained(item, value) => {
                    let in_place = item
                        .state
                        .bounds
                        .last_node()
                        .and_then(|last| self.document.next_sibling(last))
                        == Some(next);
                    if !in_place {
                        item.state.bounds.move_before(&mut *self.document, Some(next));
                    }
                    (item, Some(value))
                }
                Slot::New(key, value) => match self.append_item(list, parent, next, key, value, index) {
                    Ok(item) => (item, None),
                    Err(err) => {
                        for slot in slots {
                            if let Slot::Retained(item, _) = slot {
                                remove_block(item.state, &mut *self.document);
                            }
                        }
                        for (item, _) in placed {
                            remove_block(item.state, &mut *self.document);
                        }
                        list.bounds.set_first(Edge::Node(list.anchor));
                        list.snapshot = CONSTANT;
                        return Err(err);
                    }
                },
            };
            if let Some(first) = item.0.state.bounds.first_node() {
                next = first;
            }
            placed.push(item);
        }
        placed.reverse();

        log::trace!("reconciled list: {} items, {removed} removed", placed.len());

        let mut items = Vec::with_capacity(placed.len());
        let mut updates = Vec::new();
        for (index, (item, value)) in placed.into_iter().enumerate() {
            if let Some(value) = value {
                updates.push((item.item.clone(), value, item.index.clone(), index));
            }
            items.push(item);
        }
        list.items = items;

        if list.items.is_empty() && list.otherwise.is_none() {
            if let Some(else_block) = list.else_block {
                let state = run_block(
                    self.env,
                    &mut *self.document,
                    list.program.clone(),
                    else_block,
                    list.scope.clone(),
                    Target::Fresh { parent, next: Some(list.anchor) },
                )?;
                list.otherwise = Some(state);
            }
        }

        let first = match (list.items.first(), &list.otherwise) {
            (Some(item), _) => Edge::Block(item.state.bounds.clone()),
            (None, Some(otherwise)) => Edge::Block(otherwise.bounds.clone()),
            (None, None) => Edge::Node(list.anchor),
        };
        list.bounds.set_first(first);

        for (item, value, index, position) in updates {
            if item.value()? != value {
                item.update(value)?;
            }
            let position = Value::from(position as f64);
            if index.value()? != position {
                index.update(position)?;
            }
        }
        Ok(())
    }

    fn append_item(
        &mut self,
        list: &ListBlock,
        parent: NodeId,
        next: NodeId,
        key: String,
        value: Value,
        index: usize,
    ) -> Result<ListItem> {
        let item = Reference::primitive(value);
        let index = Reference::primitive(index as f64);
        let parameters = list.program.constants().block(list.item_block)?.parameters.clone();
        let scope = list.scope.enter_block(&parameters, vec![item.clone(), index.clone()])?;
        let state = run_block(
            self.env,
            &mut *self.document,
            list.program.clone(),
            list.item_block,
            scope,
            Target::Fresh { parent, next: Some(next) },
        )?;
        Ok(ListItem { key, item, index, state })
    }
}
