//! The append pass: runs bytecode once, building output and the render tree.

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use vesper_dom::{Document, NodeId};

use super::Environment;
use super::bounds::BlockBounds;
use super::elements::ElementBuilder;
use super::sanitize::{is_url_attribute, sanitize_url};
use super::scope::{BlockRef, Scope};
use super::updating::{
    AttributeState, BlockState, ComponentState, Destructor, Guard, ListBlock, ListItem,
    ModifierState, OpenBlock, UpdatingOpcode, destroy_state, list_keys, list_values, teardown,
};
use crate::error::{RenderError, Result};
use crate::program::{Instruction, InvocationLayout, NONE, Op, Program};
use crate::reference::Reference;
use crate::runtime::{
    Bucket, Capabilities, CapturedArgs, ComponentDefinition, HelperDefinition, ModifierDefinition,
};
use crate::validator::{Revision, track, value_for_tag};
use crate::value::{TrackedObject, Value};
use crate::wire::Literal;

/// Frames deeper than this abort the pass; a component that renders itself
/// unconditionally would otherwise never stop.
const MAX_FRAME_DEPTH: usize = 1024;

/// Where a block's output goes.
pub(crate) enum Target {
    Fresh { parent: NodeId, next: Option<NodeId> },
    /// Refill existing bounds, as a replay does.
    Resume { bounds: Rc<BlockBounds>, next: Option<NodeId> },
}

/// Appends `block` of `program` and returns its render-tree state. On
/// failure everything appended so far is destroyed and removed.
pub(crate) fn run_block(
    env: &Environment,
    document: &mut dyn Document,
    program: Rc<Program>,
    block: u32,
    scope: Rc<Scope>,
    target: Target,
) -> Result<BlockState> {
    let elements = match target {
        Target::Fresh { parent, next } => ElementBuilder::new(parent, next),
        Target::Resume { bounds, next } => ElementBuilder::resume(bounds, next),
    };
    let mut vm = Vm {
        env,
        document,
        elements,
        stack: Vec::new(),
        frames: Vec::new(),
        blocks: vec![OpenBlock::default()],
        lists: Vec::new(),
        pending_modifiers: Vec::new(),
    };

    let result = vm.push_frame(program, block, scope, FrameExit::Root).and_then(|()| vm.execute());
    match result {
        Ok(()) => {
            debug_assert!(vm.stack.is_empty(), "operand stack not empty after a block");
            let bounds = vm.elements.end_block(&mut *vm.document);
            let open = vm.blocks.pop().unwrap_or_default();
            Ok(BlockState::new(bounds, open))
        }
        Err(err) => {
            log::debug!("append aborted: {err}");
            vm.abort();
            Err(err)
        }
    }
}

/// Text an attribute renders as; `None` removes the attribute.
pub(crate) fn attribute_text(value: &Value) -> Option<String> {
    match value {
        Value::Undefined | Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some(String::new()),
        other => Some(other.to_display_string()),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::string(s.as_str()),
    }
}

enum FrameExit {
    Root,
    /// Blocks that share the caller's render-tree position: `let`, yields
    /// and component layouts.
    Inline,
    Try { block: u32 },
    ListItem { key: String, item: Reference, index: Reference },
    ListElse,
}

struct Frame {
    program: Rc<Program>,
    start: usize,
    pc: usize,
    end: usize,
    scope: Rc<Scope>,
    exit: FrameExit,
}

/// An `each` whose items are still being appended.
struct ListInProgress {
    program: Rc<Program>,
    item_block: u32,
    else_block: Option<u32>,
    key: Option<Rc<str>>,
    scope: Rc<Scope>,
    reference: Reference,
    snapshot: Revision,
    pending: std::vec::IntoIter<(String, Value)>,
    items: Vec<ListItem>,
    otherwise: Option<BlockState>,
    else_done: bool,
    /// Open blocks below the list when it started.
    depth: usize,
}

struct PendingModifier {
    definition: Rc<ModifierDefinition>,
    element: NodeId,
    args: CapturedArgs,
}

struct Vm<'a> {
    env: &'a Environment,
    document: &'a mut dyn Document,
    elements: ElementBuilder,
    stack: Vec<Reference>,
    frames: Vec<Frame>,
    blocks: Vec<OpenBlock>,
    lists: Vec<ListInProgress>,
    pending_modifiers: Vec<PendingModifier>,
}

impl Vm<'_> {
    fn execute(&mut self) -> Result<()> {
        while let Some(frame) = self.frames.last_mut() {
            if frame.pc >= frame.end {
                return Err(RenderError::invalid(format!(
                    "block at {} ran past its end without returning",
                    frame.start
                )));
            }
            let instruction = frame.program.decode(frame.pc)?;
            frame.pc += instruction.size;
            self.step(instruction)?;
        }
        Ok(())
    }

    fn push_frame(&mut self, program: Rc<Program>, block: u32, scope: Rc<Scope>, exit: FrameExit) -> Result<()> {
        if self.frames.len() >= MAX_FRAME_DEPTH {
            return Err(RenderError::invalid("block nesting is too deep"));
        }
        let Range { start, end } = program.block_range(block)?;
        self.frames.push(Frame { program, start, pc: start, end, scope, exit });
        Ok(())
    }

    fn frame(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| RenderError::invalid("no active frame"))
    }

    fn jump(&mut self, target: u32) -> Result<()> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| RenderError::invalid("no active frame"))?;
        let pc = frame.start + target as usize;
        if pc > frame.end {
            return Err(RenderError::invalid(format!("jump target {target} is outside its block")));
        }
        frame.pc = pc;
        Ok(())
    }

    fn push(&mut self, reference: Reference) {
        self.stack.push(reference);
    }

    fn pop(&mut self) -> Result<Reference> {
        self.stack
            .pop()
            .ok_or_else(|| RenderError::invalid("operand stack underflow"))
    }

    fn pop_n(&mut self, count: usize) -> Result<Vec<Reference>> {
        let len = self.stack.len();
        if count > len {
            return Err(RenderError::invalid("operand stack underflow"));
        }
        Ok(self.stack.split_off(len - count))
    }

    /// Pops named argument values, then positional ones.
    fn pop_args(&mut self, positional: u32, names: &[String]) -> Result<CapturedArgs> {
        let named = self.pop_n(names.len())?;
        let positional = self.pop_n(positional as usize)?;
        let named = names.iter().map(|name| Rc::from(name.as_str())).zip(named).collect();
        Ok(CapturedArgs::new(positional, named))
    }

    fn open_block(&mut self) -> Result<&mut OpenBlock> {
        self.blocks
            .last_mut()
            .ok_or_else(|| RenderError::invalid("no open block"))
    }

    fn push_updating(&mut self, opcode: UpdatingOpcode) -> Result<()> {
        self.open_block()?.updating.push(opcode);
        Ok(())
    }

    fn add_destructor(&mut self, destructor: Destructor) -> Result<()> {
        self.open_block()?.destructors.push(destructor);
        Ok(())
    }

    fn add_guard(&mut self, guard: Guard) -> Result<()> {
        self.open_block()?.guards.push(guard);
        Ok(())
    }

    fn constructing(&self) -> Result<NodeId> {
        self.elements
            .constructing()
            .ok_or_else(|| RenderError::invalid("attribute outside an opening element"))
    }

    fn step(&mut self, instruction: Instruction) -> Result<()> {
        let (program, scope, start) = {
            let frame = self.frame()?;
            (frame.program.clone(), frame.scope.clone(), frame.start)
        };
        let pool = program.constants();
        let [a, b, c] = instruction.operands;

        match instruction.op {
            Op::PushConstant => {
                let value = literal_value(pool.literal(a)?);
                self.push(Reference::constant(value));
            }
            Op::GetSymbol => {
                let reference = scope.get(a)?;
                self.push(reference);
            }
            Op::GetArg => {
                let name = pool.string(a)?;
                let reference = scope.args().named(name).cloned().unwrap_or_else(Reference::undefined);
                self.push(reference);
            }
            Op::GetProperty => {
                let key = pool.string(a)?;
                let parent = self.pop()?;
                self.push(parent.child(key));
            }
            Op::GetDynamicProperty => {
                let key = self.pop()?;
                let object = self.pop()?;
                self.push(Reference::compute(move || {
                    let key = key.value()?.to_display_string();
                    Ok(object.value()?.get_property(&key))
                }));
            }
            Op::CallHelper => {
                let specifier = pool.helper(a)?;
                let definition = self
                    .env
                    .resolver
                    .helper(specifier.handle)
                    .ok_or_else(|| RenderError::UnknownHelper { name: specifier.name.clone() })?;
                let args = self.pop_args(b, pool.names_or_empty(c)?)?;
                let reference = self.call_helper(definition, args)?;
                self.push(reference);
            }
            Op::CallDynamicHelper => {
                let name_ref = self.pop()?;
                let args = Rc::new(self.pop_args(a, pool.names_or_empty(b)?)?);
                let referrer: Option<Rc<str>> = program.module_name().map(Rc::from);
                let resolver = self.env.resolver.clone();

                let name = name_ref.value()?.to_display_string();
                if resolver.lookup_helper(&name, referrer.as_deref()).is_none() {
                    return Err(RenderError::UnknownHelper { name });
                }
                self.push(Reference::compute(move || {
                    let name = name_ref.value()?.to_display_string();
                    let definition = resolver
                        .lookup_helper(&name, referrer.as_deref())
                        .and_then(|handle| resolver.helper(handle))
                        .ok_or_else(|| RenderError::UnknownHelper { name: name.clone() })?;
                    let manager = &definition.manager;
                    let bucket = manager.create(&definition.state, &args)?;
                    let value = manager.value(&bucket, &args);
                    manager.destroy(&bucket);
                    value
                }));
            }
            Op::Concat => {
                let parts = self.pop_n(a as usize)?;
                self.push(Reference::compute(move || {
                    let text = parts
                        .iter()
                        .map(|part| Ok(part.value()?.to_display_string()))
                        .collect::<Result<String>>()?;
                    Ok(Value::from(text))
                }));
            }
            Op::Not => {
                let operand = self.pop()?;
                self.push(Reference::compute(move || Ok(Value::Bool(!operand.value()?.is_truthy()))));
            }
            Op::IfInline => {
                let falsy = self.pop()?;
                let truthy = self.pop()?;
                let condition = self.pop()?;
                self.push(Reference::compute(move || {
                    if condition.value()?.is_truthy() {
                        truthy.value()
                    } else {
                        falsy.value()
                    }
                }));
            }
            Op::Eq => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(Reference::compute(move || Ok(Value::Bool(left.value()? == right.value()?))));
            }
            Op::ArrayLiteral => {
                let items = self.pop_n(a as usize)?;
                self.push(Reference::compute(move || {
                    Ok(Value::list(items.iter().map(Reference::value).collect::<Result<Vec<_>>>()?))
                }));
            }
            Op::HashLiteral => {
                let names = pool.names_or_empty(a)?.to_vec();
                let values = self.pop_n(names.len())?;
                self.push(Reference::compute(move || {
                    let object = TrackedObject::new();
                    for (name, value) in names.iter().zip(&values) {
                        object.insert_untracked(name, value.value()?);
                    }
                    Ok(Value::object(object))
                }));
            }
            Op::HasBlock => {
                let name = pool.string(a)?;
                self.push(Reference::constant(scope.block(name).is_some()));
            }
            Op::Pop => {
                self.pop()?;
            }
            Op::Dup => {
                let top = self
                    .stack
                    .last()
                    .cloned()
                    .ok_or_else(|| RenderError::invalid("operand stack underflow"))?;
                self.push(top);
            }

            Op::Text => {
                let text = pool.string(a)?;
                self.elements.append_text(&mut *self.document, text);
            }
            Op::Comment => {
                let text = pool.string(a)?;
                self.elements.append_comment(&mut *self.document, text);
            }
            Op::AppendText => {
                let reference = self.pop()?;
                let text = reference.value()?.to_display_string();
                let node = self.elements.append_text(&mut *self.document, &text);
                if !reference.is_const() {
                    let snapshot = reference.snapshot();
                    self.push_updating(UpdatingOpcode::Text { reference, node, last: text, snapshot })?;
                }
            }
            Op::AppendHtml => {
                let reference = self.pop()?;
                let html = reference.value()?.to_display_string();
                self.elements.push_block();
                self.elements.append_html(&mut *self.document, &html);
                let bounds = self.elements.end_block(&mut *self.document);
                if !reference.is_const() {
                    let snapshot = reference.snapshot();
                    self.push_updating(UpdatingOpcode::Html { reference, bounds, last: html, snapshot })?;
                }
            }

            Op::OpenElement => {
                let tag = pool.string(a)?;
                let namespace = if b == NONE { None } else { Some(pool.string(b)?.as_str()) };
                self.elements.open_element(&mut *self.document, tag, namespace);
            }
            Op::StaticAttr => {
                let element = self.constructing()?;
                let name = pool.string(a)?;
                let value = pool.string(b)?;
                let namespace = if c == NONE { None } else { Some(pool.string(c)?.as_str()) };
                self.document.set_attribute(element, name, value, namespace);
            }
            Op::DynamicAttr | Op::TrustingDynamicAttr => {
                let trusting = instruction.op == Op::TrustingDynamicAttr;
                let element = self.constructing()?;
                let reference = self.pop()?;
                let name: Rc<str> = Rc::from(pool.string(a)?.as_str());
                let namespace: Option<Rc<str>> = if b == NONE { None } else { Some(Rc::from(pool.string(b)?.as_str())) };

                let mut value = attribute_text(&reference.value()?);
                if let Some(text) = &mut value {
                    if !trusting && self.env.config.sanitize_urls && is_url_attribute(&name) {
                        *text = sanitize_url(text).into_owned();
                    }
                }
                if let Some(text) = &value {
                    self.document.set_attribute(element, &name, text, namespace.as_deref());
                }
                if !reference.is_const() {
                    let snapshot = reference.snapshot();
                    self.push_updating(UpdatingOpcode::Attribute(AttributeState {
                        reference,
                        element,
                        name,
                        namespace,
                        trusting,
                        last: value,
                        snapshot,
                    }))?;
                }
            }
            Op::Modifier => {
                let specifier = pool.modifier(a)?;
                let definition = self
                    .env
                    .resolver
                    .modifier(specifier.handle)
                    .ok_or_else(|| RenderError::UnknownModifier { name: specifier.name.clone() })?;
                let args = self.pop_args(b, pool.names_or_empty(c)?)?;
                let element = self.constructing()?;
                self.pending_modifiers.push(PendingModifier { definition, element, args });
            }
            Op::FlushElement => {
                self.elements.flush_element(&mut *self.document);
                let pending = std::mem::take(&mut self.pending_modifiers);
                if self.env.config.interactive {
                    for modifier in pending {
                        self.install_modifier(modifier)?;
                    }
                }
            }
            Op::CloseElement => self.elements.close_element(),

            Op::Jump => self.jump(a)?,
            Op::JumpUnless => {
                let condition = self.pop()?;
                let truthy = condition.value()?.is_truthy();
                if !condition.is_const() {
                    self.add_guard(Guard::Truthy { reference: condition, expected: truthy })?;
                }
                if !truthy {
                    self.jump(a)?;
                }
            }
            Op::EnterTry => {
                self.elements.push_block();
                self.blocks.push(OpenBlock::default());
                self.push_frame(program, a, scope, FrameExit::Try { block: a })?;
            }
            Op::InvokeBlock => {
                let values = self.pop_n(b as usize)?;
                let parameters = &pool.block(a)?.parameters;
                let scope = scope.enter_block(parameters, values)?;
                self.push_frame(program.clone(), a, scope, FrameExit::Inline)?;
            }
            Op::Each => {
                let reference = self.pop()?;
                let values = list_values(&reference.value()?);
                let key: Option<Rc<str>> = if c == NONE { None } else { Some(Rc::from(pool.string(c)?.as_str())) };
                let keys = list_keys(&values, key.as_deref());
                let snapshot = reference.snapshot();

                self.elements.push_block();
                self.lists.push(ListInProgress {
                    program: program.clone(),
                    item_block: a,
                    else_block: (b != NONE).then_some(b),
                    key,
                    scope,
                    reference,
                    snapshot,
                    pending: keys.into_iter().zip(values).collect::<Vec<_>>().into_iter(),
                    items: Vec::new(),
                    otherwise: None,
                    else_done: false,
                    depth: self.blocks.len(),
                });
                self.advance_list()?;
            }
            Op::Yield => {
                let values = self.pop_n(b as usize)?;
                let name = pool.string(a)?;
                if let Some(BlockRef { program, block, scope }) = scope.block(name).cloned() {
                    let parameters = program.constants().block(block)?.parameters.clone();
                    let scope = scope.enter_block(&parameters, values)?;
                    self.push_frame(program, block, scope, FrameExit::Inline)?;
                }
            }
            Op::Return => self.return_from_frame()?,

            Op::InvokeComponent => {
                let specifier = pool.component(a)?;
                let definition = self
                    .env
                    .resolver
                    .component(specifier.handle)
                    .ok_or_else(|| RenderError::UnknownComponent { name: specifier.name.clone() })?;
                let layout = pool.invocation(c)?;
                let args = self.pop_args(b, &layout.named)?;
                self.invoke_component(definition, specifier.handle, args, layout, &program, &scope)?;
            }
            Op::InvokeDynamicComponent => {
                let name_ref = self.pop()?;
                let layout = pool.invocation(b)?;
                let args = self.pop_args(a, &layout.named)?;
                let value = name_ref.value()?;
                if !name_ref.is_const() {
                    self.add_guard(Guard::Equals { reference: name_ref, expected: value.clone() })?;
                }
                if value.is_nullish() {
                    return Ok(());
                }
                let name = value.to_display_string();
                let resolver = &self.env.resolver;
                let handle = resolver
                    .lookup_component(&name, program.module_name())
                    .ok_or_else(|| RenderError::UnknownComponent { name: name.clone() })?;
                let definition = resolver
                    .component(handle)
                    .ok_or(RenderError::UnknownComponent { name })?;
                self.invoke_component(definition, handle, args, layout, &program, &scope)?;
            }
        }
        Ok(())
    }

    fn return_from_frame(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| RenderError::invalid("return without a frame"))?;
        match frame.exit {
            FrameExit::Root | FrameExit::Inline => Ok(()),
            FrameExit::Try { block } => {
                let bounds = self.elements.end_block(&mut *self.document);
                let open = self.blocks.pop().unwrap_or_default();
                self.push_updating(UpdatingOpcode::Try(super::updating::TryBlock {
                    program: frame.program,
                    block,
                    scope: frame.scope,
                    state: BlockState::new(bounds, open),
                }))
            }
            FrameExit::ListItem { key, item, index } => {
                let bounds = self.elements.end_block(&mut *self.document);
                let open = self.blocks.pop().unwrap_or_default();
                let list = self
                    .lists
                    .last_mut()
                    .ok_or_else(|| RenderError::invalid("list item outside a list"))?;
                list.items.push(ListItem { key, item, index, state: BlockState::new(bounds, open) });
                self.advance_list()
            }
            FrameExit::ListElse => {
                let bounds = self.elements.end_block(&mut *self.document);
                let open = self.blocks.pop().unwrap_or_default();
                let list = self
                    .lists
                    .last_mut()
                    .ok_or_else(|| RenderError::invalid("else block outside a list"))?;
                list.otherwise = Some(BlockState::new(bounds, open));
                self.advance_list()
            }
        }
    }

    /// Starts the next item of the innermost list, its else block, or
    /// finishes the list.
    fn advance_list(&mut self) -> Result<()> {
        let list = self
            .lists
            .last_mut()
            .ok_or_else(|| RenderError::invalid("no list in progress"))?;

        if let Some((key, value)) = list.pending.next() {
            let item = Reference::primitive(value);
            let index = Reference::primitive(list.items.len() as f64);
            let program = list.program.clone();
            let block = list.item_block;
            let parameters = program.constants().block(block)?.parameters.clone();
            let scope = list.scope.enter_block(&parameters, vec![item.clone(), index.clone()])?;

            self.elements.push_block();
            self.blocks.push(OpenBlock::default());
            return self.push_frame(program, block, scope, FrameExit::ListItem { key, item, index });
        }

        if list.items.is_empty() && !list.else_done {
            if let Some(block) = list.else_block {
                list.else_done = true;
                let program = list.program.clone();
                let scope = list.scope.clone();
                self.elements.push_block();
                self.blocks.push(OpenBlock::default());
                return self.push_frame(program, block, scope, FrameExit::ListElse);
            }
        }

        self.finish_list()
    }

    fn finish_list(&mut self) -> Result<()> {
        let list = self
            .lists
            .pop()
            .ok_or_else(|| RenderError::invalid("no list in progress"))?;
        let anchor = self.elements.append_comment(&mut *self.document, "");
        let bounds = self.elements.end_block(&mut *self.document);
        log::trace!("appended list of {} items", list.items.len());
        self.push_updating(UpdatingOpcode::List(ListBlock {
            program: list.program,
            item_block: list.item_block,
            else_block: list.else_block,
            key: list.key,
            scope: list.scope,
            reference: list.reference,
            snapshot: list.snapshot,
            bounds,
            anchor,
            items: list.items,
            otherwise: list.otherwise,
        }))
    }

    fn call_helper(&mut self, definition: Rc<HelperDefinition>, args: CapturedArgs) -> Result<Reference> {
        let manager = definition.manager.clone();
        let bucket = Rc::new(manager.create(&definition.state, &args)?);
        if manager.capabilities().contains(Capabilities::DESTRUCTOR) {
            let (manager, bucket) = (manager.clone(), bucket.clone());
            self.add_destructor(Box::new(move |_: &mut dyn Document| manager.destroy(&bucket)))?;
        }
        let args = Rc::new(args);
        Ok(Reference::compute(move || manager.value(&bucket, &args)))
    }

    fn install_modifier(&mut self, pending: PendingModifier) -> Result<()> {
        let PendingModifier { definition, element, args } = pending;
        let manager = definition.manager.clone();
        let mut bucket = manager.create(&definition.state, element, &args)?;

        let document = &mut *self.document;
        let (result, tag) = track(|| manager.install(&mut bucket, document, element, &args));
        result?;
        let snapshot = value_for_tag(&tag);
        let bucket = Rc::new(RefCell::new(bucket));

        if manager.capabilities().contains(Capabilities::DESTRUCTOR) {
            let (manager, bucket) = (manager.clone(), bucket.clone());
            self.add_destructor(Box::new(move |document: &mut dyn Document| {
                manager.destroy(&mut bucket.borrow_mut(), document, element);
            }))?;
        }
        self.push_updating(UpdatingOpcode::Modifier(ModifierState {
            manager,
            bucket,
            element,
            args: Rc::new(args),
            tag,
            snapshot,
        }))
    }

    fn invoke_component(
        &mut self,
        definition: Rc<ComponentDefinition>,
        handle: u32,
        args: CapturedArgs,
        layout: &InvocationLayout,
        program: &Rc<Program>,
        scope: &Rc<Scope>,
    ) -> Result<()> {
        let manager = definition.manager.clone();
        let capabilities = manager.capabilities();
        log::trace!("invoking component `{}` ({capabilities:?})", definition.name);

        let blocks = layout
            .blocks
            .iter()
            .map(|(name, block)| {
                let block = BlockRef { program: program.clone(), block: *block, scope: scope.clone() };
                (name.clone(), block)
            })
            .collect();
        let args = Rc::new(args);

        let bucket: Rc<Bucket> = if capabilities.contains(Capabilities::CREATE_INSTANCE) {
            let no_args = CapturedArgs::default();
            let create_args = if capabilities.contains(Capabilities::CREATE_ARGS) { &*args } else { &no_args };
            Rc::new(manager.create(&self.env.owner, &definition.state, create_args, scope.this())?)
        } else {
            let unit: Bucket = Box::new(());
            Rc::new(unit)
        };
        let this = if capabilities.contains(Capabilities::CREATE_INSTANCE) {
            manager.self_ref(&bucket)
        } else {
            Reference::undefined()
        };

        if capabilities.contains(Capabilities::UPDATE_HOOK) {
            let (result, tag) = track(|| args.read_all());
            result?;
            let snapshot = value_for_tag(&tag);
            self.push_updating(UpdatingOpcode::Component(ComponentState {
                manager: manager.clone(),
                bucket: bucket.clone(),
                args: args.clone(),
                tag,
                snapshot,
            }))?;
        }
        if capabilities.contains(Capabilities::DESTRUCTOR) {
            let (manager, bucket) = (manager.clone(), bucket.clone());
            self.add_destructor(Box::new(move |_: &mut dyn Document| manager.destroy(&bucket)))?;
        }

        let resolver = &self.env.resolver;
        let layout_program = match capabilities
            .contains(Capabilities::DYNAMIC_LAYOUT)
            .then(|| manager.dynamic_layout(&bucket))
            .flatten()
        {
            Some(name) => Some(
                resolver
                    .named_layout(&name)?
                    .ok_or(RenderError::UnknownComponent { name })?,
            ),
            None => resolver.component_layout(handle)?,
        };
        let Some(layout_program) = layout_program else {
            return Ok(());
        };

        let scope = Scope::root(layout_program.symbols().size(), this, args, blocks);
        let main = layout_program.main();
        self.push_frame(layout_program, main, scope, FrameExit::Inline)
    }

    /// Destroys whatever the failed pass built and removes its output.
    fn abort(&mut self) {
        self.pending_modifiers.clear();
        self.stack.clear();
        self.frames.clear();
        loop {
            let list_is_inner = self
                .lists
                .last()
                .is_some_and(|list| list.depth >= self.blocks.len());
            if list_is_inner {
                if let Some(list) = self.lists.pop() {
                    if let Some(otherwise) = list.otherwise {
                        destroy_state(otherwise, &mut *self.document);
                    }
                    for item in list.items.into_iter().rev() {
                        destroy_state(item.state, &mut *self.document);
                    }
                }
            } else if let Some(open) = self.blocks.pop() {
                teardown(open.updating, open.destructors, &mut *self.document);
            } else {
                break;
            }
        }
        if let Some(bounds) = self.elements.unwind(&mut *self.document) {
            bounds.clear(&mut *self.document);
        }
    }
}
