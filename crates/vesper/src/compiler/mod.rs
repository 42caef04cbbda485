//! Lowers template IR to a [`Program`].
//!
//! Statements lower in document order to fixed opcode sequences; expressions
//! lower with a stack discipline (push operands, then an opcode that pops
//! them and pushes one result). Nested blocks become separate heap ranges
//! addressed by `Block` constants. Conditionals and dynamic component
//! invocations are wrapped in try blocks so the VM can replay them.

mod encoder;
pub mod error;
mod resolver;

use serde::{Deserialize, Serialize};

use crate::program::{
    BlockInfo, ConstantPoolBuilder, InvocationLayout, NONE, Op, Program, Specifier, SymbolTable,
};
use crate::runtime::Capabilities;
use crate::wire::{
    Block, Expression, Hash, Literal, MIN_WIRE_FORMAT_VERSION, NamedBlock, SerializedTemplate, Span,
    Spanned, Statement, WIRE_FORMAT_VERSION, WireOp,
};

use encoder::{Encoder, OpenElementState};
pub use error::{CompileError, Result};
pub use resolver::{CompileTimeResolver, NoResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Keep the opcode name table when the program is serialized.
    pub debug_names: bool,
    /// Reject free names that are neither locals nor helpers. When off, they
    /// fall back to a property of `this`.
    pub strict: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            debug_names: cfg!(debug_assertions),
            strict: true,
        }
    }
}

const EXPRESSION_KEYWORDS: &[&str] = &[
    "concat", "if", "unless", "not", "eq", "get", "array", "hash", "has-block", "helper",
    "component",
];

pub struct Compiler<'r> {
    resolver: &'r dyn CompileTimeResolver,
    options: CompileOptions,
}

impl<'r> Compiler<'r> {
    pub fn new(resolver: &'r dyn CompileTimeResolver, options: CompileOptions) -> Self {
        Self { resolver, options }
    }

    pub fn options(&self) -> CompileOptions {
        self.options
    }

    pub fn compile(&self, template: &SerializedTemplate) -> Result<Program> {
        if !(MIN_WIRE_FORMAT_VERSION..=WIRE_FORMAT_VERSION).contains(&template.version) {
            return Err(CompileError::UnsupportedWireVersion {
                found: template.version,
                expected: WIRE_FORMAT_VERSION,
            });
        }
        let module = template.module_name.as_deref().unwrap_or("<anonymous>");
        log::debug!("compiling {module}: {} nested blocks", template.blocks.len());

        if !template.block.parameters.is_empty() {
            return Err(CompileError::BlockParameterArity {
                name: module.to_string(),
                expected: 0,
                found: template.block.parameters.len(),
                span: None,
            });
        }

        let mut builder = ProgramBuilder {
            resolver: self.resolver,
            options: self.options,
            template,
            heap: Vec::new(),
            constants: ConstantPoolBuilder::default(),
            symbols: vec!["this".to_string()],
            named_args: Vec::new(),
            scopes: Vec::new(),
            active_blocks: Vec::new(),
        };
        let statements = &template.block.statements;
        let main = builder.region(Vec::new(), |b, enc| b.statements(enc, statements))?;

        let program = Program {
            heap: builder.heap,
            constants: builder.constants.finish(),
            symbols: SymbolTable {
                symbols: builder.symbols,
                named_args: builder.named_args,
            },
            main,
            wire_version: template.version,
            module_name: template.module_name.clone(),
        };
        log::debug!(
            "compiled {module}: {} words, {} constants, {} symbols",
            program.heap.len(),
            program.constants.len(),
            program.symbols.size()
        );
        Ok(program)
    }
}

struct ProgramBuilder<'a> {
    resolver: &'a dyn CompileTimeResolver,
    options: CompileOptions,
    template: &'a SerializedTemplate,
    heap: Vec<u32>,
    constants: ConstantPoolBuilder,
    symbols: Vec<String>,
    named_args: Vec<String>,
    /// Lexical scopes of block parameters, innermost last.
    scopes: Vec<Vec<(String, u32)>>,
    /// IR blocks currently being lowered, to reject cyclic references.
    active_blocks: Vec<u32>,
}

fn find_block<'b>(blocks: &'b [NamedBlock], names: &[&str]) -> Option<&'b NamedBlock> {
    blocks.iter().find(|block| names.contains(&block.name.as_str()))
}

impl<'a> ProgramBuilder<'a> {
    fn referrer(&self) -> Option<&'a str> {
        self.template.module_name.as_deref()
    }

    fn optional_string(&mut self, value: &Option<String>) -> u32 {
        match value {
            Some(value) => self.constants.string(value),
            None => NONE,
        }
    }

    /// Compiles `body` into its own heap range and returns its block constant.
    fn region(
        &mut self,
        parameters: Vec<u32>,
        body: impl FnOnce(&mut Self, &mut Encoder) -> Result<()>,
    ) -> Result<u32> {
        let mut encoder = Encoder::new();
        body(self, &mut encoder)?;
        encoder.flush();
        if let Some(open) = encoder.elements.last() {
            return Err(CompileError::UnbalancedElement {
                message: format!("<{}> is never closed", open.tag),
                span: open.span,
            });
        }
        encoder.push(Op::Return, &[]);

        let words = encoder.finish();
        let start = self.heap.len() as u32;
        let len = words.len() as u32;
        self.heap.extend(words);
        Ok(self.constants.block(BlockInfo { start, len, parameters }))
    }

    fn enter_ir_block(&mut self, index: u32, span: Option<Span>) -> Result<&'a Block> {
        let template = self.template;
        let block = template
            .blocks
            .get(index as usize)
            .filter(|_| !self.active_blocks.contains(&index))
            .ok_or(CompileError::UnknownBlock { index, span })?;
        self.active_blocks.push(index);
        Ok(block)
    }

    fn exit_ir_block(&mut self) {
        self.active_blocks.pop();
    }

    fn bind_parameters(&mut self, names: &[String], span: Option<Span>) -> Result<Vec<u32>> {
        let mut frame = Vec::with_capacity(names.len());
        let mut slots = Vec::with_capacity(names.len());
        for name in names {
            if name.is_empty() || name == "this" || name.starts_with('@') {
                return Err(CompileError::ReservedName { name: name.clone(), span });
            }
            let slot = self.symbols.len() as u32;
            self.symbols.push(name.clone());
            frame.push((name.clone(), slot));
            slots.push(slot);
        }
        self.scopes.push(frame);
        Ok(slots)
    }

    fn lookup_local(&self, name: &str) -> Option<u32> {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.iter().rev().find(|(n, _)| n == name).map(|(_, slot)| *slot))
    }

    fn check_arity(
        block: &Block,
        keyword: &str,
        max: usize,
        span: Option<Span>,
    ) -> Result<()> {
        if block.parameters.len() > max {
            return Err(CompileError::BlockParameterArity {
                name: keyword.to_string(),
                expected: max,
                found: block.parameters.len(),
                span,
            });
        }
        Ok(())
    }

    /// Compiles IR block `index` into its own heap range, binding its
    /// parameters to fresh slots.
    fn compile_ir_block(
        &mut self,
        index: u32,
        keyword: &str,
        max_params: Option<usize>,
        span: Option<Span>,
    ) -> Result<u32> {
        let block = self.enter_ir_block(index, span)?;
        if let Some(max) = max_params {
            Self::check_arity(block, keyword, max, span)?;
        }
        let slots = self.bind_parameters(&block.parameters, span)?;
        let handle = self.region(slots, |b, enc| b.statements(enc, &block.statements));
        self.scopes.pop();
        self.exit_ir_block();
        handle
    }

    /// Lowers IR block `index` in place, inside the current encoder.
    fn inline_ir_block(
        &mut self,
        enc: &mut Encoder,
        index: u32,
        keyword: &str,
        span: Option<Span>,
    ) -> Result<()> {
        let block = self.enter_ir_block(index, span)?;
        Self::check_arity(block, keyword, 0, span)?;
        self.scopes.push(Vec::new());

        let depth = enc.elements.len();
        self.statements(enc, &block.statements)?;
        enc.flush();
        if enc.elements.len() != depth {
            return Err(CompileError::UnbalancedElement {
                message: format!("elements opened in a `{keyword}` branch must close in it"),
                span,
            });
        }

        self.scopes.pop();
        self.exit_ir_block();
        Ok(())
    }

    fn statements(&mut self, enc: &mut Encoder, statements: &'a [Spanned<Statement>]) -> Result<()> {
        for statement in statements {
            self.statement(enc, statement)?;
        }
        Ok(())
    }

    /// Rejects kinds the template's declared wire version does not have.
    fn check_wire_op(&self, op: WireOp, span: Option<Span>) -> Result<()> {
        let version = self.template.version;
        if op.since() > version {
            return Err(CompileError::WireOpTooNew { op, since: op.since(), version, span });
        }
        Ok(())
    }

    fn statement(&mut self, enc: &mut Encoder, statement: &'a Spanned<Statement>) -> Result<()> {
        let span = statement.span;
        self.check_wire_op(statement.node.wire_op(), span)?;
        match &statement.node {
            Statement::Text { value } => {
                enc.flush();
                let text = self.constants.string(value);
                enc.push(Op::Text, &[text]);
            }
            Statement::Comment { value } => {
                enc.flush();
                let text = self.constants.string(value);
                enc.push(Op::Comment, &[text]);
            }
            Statement::OpenElement { tag, namespace } => {
                enc.flush();
                let tag_c = self.constants.string(tag);
                let ns = self.optional_string(namespace);
                enc.push(Op::OpenElement, &[tag_c, ns]);
                enc.elements.push(OpenElementState { tag: tag.clone(), flushed: false, span });
            }
            Statement::CloseElement => {
                if enc.elements.is_empty() {
                    return Err(CompileError::UnbalancedElement {
                        message: "close-element without a matching open-element".to_string(),
                        span,
                    });
                }
                enc.flush();
                enc.push(Op::CloseElement, &[]);
                enc.elements.pop();
            }
            Statement::StaticAttr { name, value, namespace } => {
                self.require_open_element(enc, name, span)?;
                self.static_attr(enc, name, value, namespace);
            }
            Statement::DynamicAttr { name, value, trusting, namespace } => {
                self.require_open_element(enc, name, span)?;
                match value {
                    Expression::Literal { value: literal } => {
                        if let Some(text) = literal.attribute_text() {
                            self.static_attr(enc, name, &text, namespace);
                        }
                    }
                    _ => {
                        self.expression(enc, value, span)?;
                        let name_c = self.constants.string(name);
                        let ns = self.optional_string(namespace);
                        let op = if *trusting { Op::TrustingDynamicAttr } else { Op::DynamicAttr };
                        enc.push(op, &[name_c, ns]);
                    }
                }
            }
            Statement::Modifier { name, params, hash } => {
                self.require_open_element(enc, name, span)?;
                let specifier = self
                    .resolver
                    .resolve_modifier(name, self.referrer())
                    .ok_or_else(|| CompileError::UnresolvedModifier { name: name.clone(), span })?;
                let (positional, names) = self.arguments(enc, params, hash, span)?;
                let modifier = self.constants.modifier(specifier);
                enc.push(Op::Modifier, &[modifier, positional, names]);
            }
            Statement::Append { value, trusting } => {
                enc.flush();
                self.append(enc, value, *trusting, span)?;
            }
            Statement::Block { name, params, hash, blocks } => {
                enc.flush();
                self.block_statement(enc, name, params, hash, blocks, span)?;
            }
            Statement::Component { tag, args, blocks } => {
                enc.flush();
                let specifier = self
                    .resolver
                    .resolve_component(tag, self.referrer())
                    .ok_or_else(|| CompileError::UnresolvedComponent { name: tag.clone(), span })?;
                let mut named = Vec::with_capacity(args.len());
                for (name, value) in args {
                    let Some(arg) = name.strip_prefix('@') else {
                        return Err(CompileError::InvalidArguments {
                            name: tag.clone(),
                            message: format!("`{name}` is not an argument; arguments start with `@`"),
                            span,
                        });
                    };
                    named.push((arg.to_string(), value));
                }
                self.invoke_component(enc, specifier, &[], named, blocks, span)?;
            }
            Statement::Yield { to, params } => {
                enc.flush();
                for param in params {
                    self.expression(enc, param, span)?;
                }
                let name = self.constants.string(to);
                enc.push(Op::Yield, &[name, params.len() as u32]);
            }
        }
        Ok(())
    }

    fn require_open_element(&self, enc: &Encoder, name: &str, span: Option<Span>) -> Result<()> {
        if enc.accepts_attributes() {
            Ok(())
        } else {
            Err(CompileError::AttributeOutsideElement { name: name.to_string(), span })
        }
    }

    fn static_attr(&mut self, enc: &mut Encoder, name: &str, value: &str, namespace: &Option<String>) {
        let name_c = self.constants.string(name);
        let value_c = self.constants.string(value);
        let ns = self.optional_string(namespace);
        enc.push(Op::StaticAttr, &[name_c, value_c, ns]);
    }

    fn is_local_head(&self, head: &str) -> bool {
        head == "this" || head.starts_with('@') || self.lookup_local(head).is_some()
    }

    fn append(
        &mut self,
        enc: &mut Encoder,
        value: &'a Expression,
        trusting: bool,
        span: Option<Span>,
    ) -> Result<()> {
        let referrer = self.referrer();
        match value {
            Expression::Get { head, path } if path.is_empty() && !self.is_local_head(head) => {
                if let Some(helper) = self.resolver.resolve_helper(head, referrer) {
                    let trusted = self
                        .resolver
                        .helper_capabilities(&helper)
                        .contains(Capabilities::TRUSTED_OUTPUT);
                    let helper_c = self.constants.helper(helper);
                    enc.push(Op::CallHelper, &[helper_c, 0, NONE]);
                    return self.append_op(enc, trusting || trusted);
                }
                if let Some(component) = self.resolver.resolve_component(head, referrer) {
                    return self.invoke_component(enc, component, &[], Vec::new(), &[], span);
                }
            }
            Expression::Call { name, params, hash } if name == "component" => {
                return self.dynamic_component(enc, params, hash, &[], span);
            }
            Expression::Call { name, params, hash } if !EXPRESSION_KEYWORDS.contains(&name.as_str()) => {
                if let Some(helper) = self.resolver.resolve_helper(name, referrer) {
                    let trusted = self
                        .resolver
                        .helper_capabilities(&helper)
                        .contains(Capabilities::TRUSTED_OUTPUT);
                    self.call_helper(enc, helper, params, hash, span)?;
                    return self.append_op(enc, trusting || trusted);
                }
                if let Some(component) = self.resolver.resolve_component(name, referrer) {
                    let named = hash.iter().map(|(k, v)| (k.clone(), v)).collect();
                    return self.invoke_component(enc, component, params, named, &[], span);
                }
            }
            _ => {}
        }
        self.expression(enc, value, span)?;
        self.append_op(enc, trusting)
    }

    fn append_op(&mut self, enc: &mut Encoder, trusting: bool) -> Result<()> {
        enc.push(if trusting { Op::AppendHtml } else { Op::AppendText }, &[]);
        Ok(())
    }

    fn block_statement(
        &mut self,
        enc: &mut Encoder,
        name: &str,
        params: &'a [Expression],
        hash: &'a Hash,
        blocks: &'a [NamedBlock],
        span: Option<Span>,
    ) -> Result<()> {
        let invalid = |message: &str| CompileError::InvalidArguments {
            name: name.to_string(),
            message: message.to_string(),
            span,
        };
        let default = find_block(blocks, &["default"]);
        let inverse = find_block(blocks, &["else", "inverse"]);

        match name {
            "if" | "unless" => {
                if params.len() != 1 {
                    return Err(invalid("expects exactly one condition"));
                }
                if !hash.is_empty() {
                    return Err(invalid("takes no named arguments"));
                }
                if blocks.iter().any(|b| !["default", "else", "inverse"].contains(&b.name.as_str())) {
                    return Err(invalid("only accepts `default` and `else` blocks"));
                }
                let default = default.ok_or_else(|| invalid("requires a block"))?;
                let (truthy, falsy) = if name == "if" {
                    (Some(default), inverse)
                } else {
                    (inverse, Some(default))
                };

                let condition = &params[0];
                let handle = self.region(Vec::new(), |b, enc| {
                    b.expression(enc, condition, span)?;
                    let otherwise = enc.label();
                    let end = enc.label();
                    enc.jump(Op::JumpUnless, otherwise);
                    if let Some(block) = truthy {
                        b.inline_ir_block(enc, block.block, name, span)?;
                    }
                    enc.jump(Op::Jump, end);
                    enc.mark(otherwise);
                    if let Some(block) = falsy {
                        b.inline_ir_block(enc, block.block, name, span)?;
                    }
                    enc.mark(end);
                    Ok(())
                })?;
                enc.push(Op::EnterTry, &[handle]);
            }
            "let" => {
                if params.is_empty() {
                    return Err(invalid("expects at least one value"));
                }
                if !hash.is_empty() {
                    return Err(invalid("takes no named arguments"));
                }
                let default = default.ok_or_else(|| invalid("requires a block"))?;
                for param in params {
                    self.expression(enc, param, span)?;
                }
                let handle = self.compile_ir_block(default.block, name, Some(params.len()), span)?;
                enc.push(Op::InvokeBlock, &[handle, params.len() as u32]);
            }
            "each" => {
                if params.len() != 1 {
                    return Err(invalid("expects exactly one list"));
                }
                let mut key = NONE;
                for (hash_name, value) in hash {
                    match (hash_name.as_str(), value) {
                        ("key", Expression::Literal { value: Literal::String(k) }) => {
                            key = self.constants.string(k);
                        }
                        ("key", _) => return Err(invalid("`key` must be a string literal")),
                        _ => return Err(invalid("only accepts a `key` named argument")),
                    }
                }
                let default = default.ok_or_else(|| invalid("requires a block"))?;
                self.expression(enc, &params[0], span)?;
                let item = self.compile_ir_block(default.block, name, Some(2), span)?;
                let otherwise = match inverse {
                    Some(block) => self.compile_ir_block(block.block, name, Some(0), span)?,
                    None => NONE,
                };
                enc.push(Op::Each, &[item, otherwise, key]);
            }
            "component" => {
                self.dynamic_component(enc, params, hash, blocks, span)?;
            }
            _ => {
                let specifier = self
                    .resolver
                    .resolve_component(name, self.referrer())
                    .ok_or_else(|| CompileError::UnresolvedComponent { name: name.to_string(), span })?;
                let named = hash.iter().map(|(k, v)| (k.clone(), v)).collect();
                self.invoke_component(enc, specifier, params, named, blocks, span)?;
            }
        }
        Ok(())
    }

    fn compile_blocks(&mut self, blocks: &'a [NamedBlock], span: Option<Span>) -> Result<Vec<(String, u32)>> {
        blocks
            .iter()
            .map(|block| {
                let handle = self.compile_ir_block(block.block, &block.name, None, span)?;
                Ok((block.name.clone(), handle))
            })
            .collect()
    }

    fn invoke_component(
        &mut self,
        enc: &mut Encoder,
        specifier: Specifier,
        positional: &'a [Expression],
        named: Vec<(String, &'a Expression)>,
        blocks: &'a [NamedBlock],
        span: Option<Span>,
    ) -> Result<()> {
        for param in positional {
            self.expression(enc, param, span)?;
        }
        for (_, value) in &named {
            self.expression(enc, value, span)?;
        }
        let blocks = self.compile_blocks(blocks, span)?;
        let layout = self.constants.invocation(InvocationLayout {
            named: named.into_iter().map(|(name, _)| name).collect(),
            blocks,
        });
        let component = self.constants.component(specifier);
        enc.push(Op::InvokeComponent, &[component, positional.len() as u32, layout]);
        Ok(())
    }

    /// `{{component name ...}}`: resolved at run time inside a try block
    /// guarded on the name.
    fn dynamic_component(
        &mut self,
        enc: &mut Encoder,
        params: &'a [Expression],
        hash: &'a Hash,
        blocks: &'a [NamedBlock],
        span: Option<Span>,
    ) -> Result<()> {
        let Some((name, positional)) = params.split_first() else {
            return Err(CompileError::InvalidArguments {
                name: "component".to_string(),
                message: "expects a component name".to_string(),
                span,
            });
        };
        let handle = self.region(Vec::new(), |b, enc| {
            for param in positional {
                b.expression(enc, param, span)?;
            }
            for (_, value) in hash {
                b.expression(enc, value, span)?;
            }
            b.expression(enc, name, span)?;
            let blocks = b.compile_blocks(blocks, span)?;
            let layout = b.constants.invocation(InvocationLayout {
                named: hash.iter().map(|(k, _)| k.clone()).collect(),
                blocks,
            });
            enc.push(Op::InvokeDynamicComponent, &[positional.len() as u32, layout]);
            Ok(())
        })?;
        enc.push(Op::EnterTry, &[handle]);
        Ok(())
    }

    /// Pushes positional then named argument values; returns the positional
    /// count and the names constant.
    fn arguments(
        &mut self,
        enc: &mut Encoder,
        params: &'a [Expression],
        hash: &'a Hash,
        span: Option<Span>,
    ) -> Result<(u32, u32)> {
        for param in params {
            self.expression(enc, param, span)?;
        }
        for (_, value) in hash {
            self.expression(enc, value, span)?;
        }
        let names = self.constants.names(hash.iter().map(|(k, _)| k.clone()).collect());
        Ok((params.len() as u32, names))
    }

    fn call_helper(
        &mut self,
        enc: &mut Encoder,
        helper: Specifier,
        params: &'a [Expression],
        hash: &'a Hash,
        span: Option<Span>,
    ) -> Result<()> {
        let (positional, names) = self.arguments(enc, params, hash, span)?;
        let helper = self.constants.helper(helper);
        enc.push(Op::CallHelper, &[helper, positional, names]);
        Ok(())
    }

    fn expression(&mut self, enc: &mut Encoder, expression: &'a Expression, span: Option<Span>) -> Result<()> {
        self.check_wire_op(expression.wire_op(), span)?;
        match expression {
            Expression::Literal { value } => {
                let literal = self.constants.literal(value);
                enc.push(Op::PushConstant, &[literal]);
            }
            Expression::Get { head, path } => {
                self.head(enc, head, span)?;
                for segment in path {
                    let key = self.constants.string(segment);
                    enc.push(Op::GetProperty, &[key]);
                }
            }
            Expression::Interpolate { parts } => {
                for part in parts {
                    self.expression(enc, part, span)?;
                }
                enc.push(Op::Concat, &[parts.len() as u32]);
            }
            Expression::Call { name, params, hash } => self.call(enc, name, params, hash, span)?,
        }
        Ok(())
    }

    fn head(&mut self, enc: &mut Encoder, head: &str, span: Option<Span>) -> Result<()> {
        if head == "this" {
            enc.push(Op::GetSymbol, &[0]);
        } else if let Some(arg) = head.strip_prefix('@') {
            if arg.is_empty() {
                return Err(CompileError::UnresolvedReference { name: head.to_string(), span });
            }
            if !self.named_args.iter().any(|a| a == arg) {
                self.named_args.push(arg.to_string());
            }
            let name = self.constants.string(arg);
            enc.push(Op::GetArg, &[name]);
        } else if let Some(slot) = self.lookup_local(head) {
            enc.push(Op::GetSymbol, &[slot]);
        } else if let Some(helper) = self.resolver.resolve_helper(head, self.referrer()) {
            let helper = self.constants.helper(helper);
            enc.push(Op::CallHelper, &[helper, 0, NONE]);
        } else if !self.options.strict {
            enc.push(Op::GetSymbol, &[0]);
            let key = self.constants.string(head);
            enc.push(Op::GetProperty, &[key]);
        } else {
            return Err(CompileError::UnresolvedReference { name: head.to_string(), span });
        }
        Ok(())
    }

    fn push_optional(&mut self, enc: &mut Encoder, expression: Option<&'a Expression>, span: Option<Span>) -> Result<()> {
        match expression {
            Some(expression) => self.expression(enc, expression, span),
            None => {
                let literal = self.constants.literal(&Literal::Null);
                enc.push(Op::PushConstant, &[literal]);
                Ok(())
            }
        }
    }

    fn call(
        &mut self,
        enc: &mut Encoder,
        name: &str,
        params: &'a [Expression],
        hash: &'a Hash,
        span: Option<Span>,
    ) -> Result<()> {
        let invalid = |message: &str| CompileError::InvalidArguments {
            name: name.to_string(),
            message: message.to_string(),
            span,
        };
        let is_keyword = EXPRESSION_KEYWORDS.contains(&name);
        if is_keyword && name != "hash" && name != "helper" && !hash.is_empty() {
            return Err(invalid("takes no named arguments"));
        }

        match name {
            "concat" => {
                for param in params {
                    self.expression(enc, param, span)?;
                }
                enc.push(Op::Concat, &[params.len() as u32]);
            }
            "if" | "unless" => {
                if !(2..=3).contains(&params.len()) {
                    return Err(invalid("expects a condition and one or two values"));
                }
                self.expression(enc, &params[0], span)?;
                let (truthy, falsy) = if name == "if" {
                    (params.get(1), params.get(2))
                } else {
                    (params.get(2), params.get(1))
                };
                self.push_optional(enc, truthy, span)?;
                self.push_optional(enc, falsy, span)?;
                enc.push(Op::IfInline, &[]);
            }
            "not" => {
                let [value] = params else { return Err(invalid("expects one value")) };
                self.expression(enc, value, span)?;
                enc.push(Op::Not, &[]);
            }
            "eq" => {
                let [left, right] = params else { return Err(invalid("expects two values")) };
                self.expression(enc, left, span)?;
                self.expression(enc, right, span)?;
                enc.push(Op::Eq, &[]);
            }
            "get" => {
                let [object, key] = params else {
                    return Err(invalid("expects an object and a key"));
                };
                self.expression(enc, object, span)?;
                self.expression(enc, key, span)?;
                enc.push(Op::GetDynamicProperty, &[]);
            }
            "array" => {
                for param in params {
                    self.expression(enc, param, span)?;
                }
                enc.push(Op::ArrayLiteral, &[params.len() as u32]);
            }
            "hash" => {
                if !params.is_empty() {
                    return Err(invalid("takes only named arguments"));
                }
                for (_, value) in hash {
                    self.expression(enc, value, span)?;
                }
                let names = self.constants.names(hash.iter().map(|(k, _)| k.clone()).collect());
                enc.push(Op::HashLiteral, &[names]);
            }
            "has-block" => {
                let block = match params {
                    [] => "default",
                    [Expression::Literal { value: Literal::String(block) }] => block.as_str(),
                    _ => return Err(invalid("expects an optional block name string")),
                };
                let block = self.constants.string(block);
                enc.push(Op::HasBlock, &[block]);
            }
            "helper" => {
                let Some((helper, positional)) = params.split_first() else {
                    return Err(invalid("expects a helper name"));
                };
                for param in positional {
                    self.expression(enc, param, span)?;
                }
                for (_, value) in hash {
                    self.expression(enc, value, span)?;
                }
                self.expression(enc, helper, span)?;
                let names = self.constants.names(hash.iter().map(|(k, _)| k.clone()).collect());
                enc.push(Op::CallDynamicHelper, &[positional.len() as u32, names]);
            }
            "component" => {
                return Err(invalid("can only be used as a statement"));
            }
            _ => {
                let helper = self
                    .resolver
                    .resolve_helper(name, self.referrer())
                    .ok_or_else(|| CompileError::UnresolvedHelper { name: name.to_string(), span })?;
                self.call_helper(enc, helper, params, hash, span)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::build::*;

    fn compile(template: &SerializedTemplate) -> Result<Program> {
        Compiler::new(&NoResolver, CompileOptions::default()).compile(template)
    }

    fn main_ops(program: &Program) -> Vec<Op> {
        program
            .instructions(program.main())
            .unwrap()
            .into_iter()
            .map(|(_, instruction)| instruction.op)
            .collect()
    }

    #[test]
    fn element_with_static_and_dynamic_attributes() {
        let template = TemplateBuilder::new().finish(vec![
            open("a"),
            attr("class", "link"),
            dynamic_attr("href", path("this.url")),
            dynamic_attr("title", string("literal")),
            text("go"),
            close(),
        ]);
        let program = compile(&template).unwrap();
        assert_eq!(
            main_ops(&program),
            vec![
                Op::OpenElement,
                Op::StaticAttr,
                Op::GetSymbol,
                Op::GetProperty,
                Op::DynamicAttr,
                Op::StaticAttr,
                Op::FlushElement,
                Op::Text,
                Op::CloseElement,
                Op::Return,
            ]
        );
    }

    #[test]
    fn interpolated_attribute_is_dynamic() {
        let template = TemplateBuilder::new().finish(vec![
            open("div"),
            dynamic_attr("class", concat(vec![string("a "), path("this.b")])),
            close(),
        ]);
        let ops = main_ops(&compile(&template).unwrap());
        assert!(ops.contains(&Op::Concat));
        assert!(ops.contains(&Op::DynamicAttr));
    }

    #[test]
    fn escaped_and_trusted_appends_use_distinct_ops() {
        let template = TemplateBuilder::new().finish(vec![
            append(path("this.a")),
            trusting_append(path("this.a")),
        ]);
        let ops = main_ops(&compile(&template).unwrap());
        assert!(ops.contains(&Op::AppendText));
        assert!(ops.contains(&Op::AppendHtml));
    }

    #[test]
    fn if_compiles_to_a_try_block() {
        let mut t = TemplateBuilder::new();
        let yes = t.block(&[], vec![text("A")]);
        let no = t.block(&[], vec![text("B")]);
        let template = t.finish(vec![block(
            "if",
            vec![path("this.cond")],
            vec![],
            &[("default", yes), ("else", no)],
        )]);
        let program = compile(&template).unwrap();
        assert_eq!(main_ops(&program), vec![Op::EnterTry, Op::Return]);

        let try_block = program.instructions(program.main()).unwrap()[0].1.op1();
        let ops: Vec<Op> = program
            .instructions(try_block)
            .unwrap()
            .into_iter()
            .map(|(_, i)| i.op)
            .collect();
        assert_eq!(
            ops,
            vec![
                Op::GetSymbol,
                Op::GetProperty,
                Op::JumpUnless,
                Op::Text,
                Op::Jump,
                Op::Text,
                Op::Return,
            ]
        );
    }

    #[test]
    fn block_params_get_distinct_slots() {
        let mut t = TemplateBuilder::new();
        let inner = t.block(&["v"], vec![append(path("v"))]);
        let outer = t.block(&["v"], vec![block("let", vec![string("B")], vec![], &[("default", inner)])]);
        let template = t.finish(vec![block("let", vec![string("A")], vec![], &[("default", outer)])]);
        let program = compile(&template).unwrap();
        assert_eq!(program.symbols().symbols, vec!["this", "v", "v"]);

        let inner_block = program
            .blocks()
            .into_iter()
            .find(|(_, info)| info.parameters == vec![2])
            .map(|(index, _)| index)
            .unwrap();
        let first = program.instructions(inner_block).unwrap()[0].1;
        assert_eq!((first.op, first.op1()), (Op::GetSymbol, 2));
    }

    #[test]
    fn unresolved_names_are_errors_with_spans() {
        let template = TemplateBuilder::new()
            .finish(vec![append(path("missing")).at(Span::new(4, 11))]);
        assert_eq!(
            compile(&template),
            Err(CompileError::UnresolvedReference {
                name: "missing".into(),
                span: Some(Span::new(4, 11)),
            })
        );

        let lenient = Compiler::new(&NoResolver, CompileOptions { strict: false, ..Default::default() })
            .compile(&template)
            .unwrap();
        assert_eq!(main_ops(&lenient), vec![Op::GetSymbol, Op::GetProperty, Op::AppendText, Op::Return]);
    }

    #[test]
    fn attribute_after_content_is_rejected() {
        let template = TemplateBuilder::new().finish(vec![open("p"), text("x"), attr("id", "late"), close()]);
        assert!(matches!(
            compile(&template),
            Err(CompileError::AttributeOutsideElement { name, .. }) if name == "id"
        ));
    }

    #[test]
    fn unbalanced_elements_are_rejected() {
        let unclosed = TemplateBuilder::new().finish(vec![open("p")]);
        assert!(matches!(compile(&unclosed), Err(CompileError::UnbalancedElement { .. })));

        let stray = TemplateBuilder::new().finish(vec![close()]);
        assert!(matches!(compile(&stray), Err(CompileError::UnbalancedElement { .. })));

        let mut t = TemplateBuilder::new();
        let branch = t.block(&[], vec![open("b")]);
        let leaky = t.finish(vec![block("if", vec![boolean(true)], vec![], &[("default", branch)])]);
        assert!(matches!(compile(&leaky), Err(CompileError::UnbalancedElement { .. })));
    }

    #[test]
    fn block_parameter_arity() {
        let mut t = TemplateBuilder::new();
        let body = t.block(&["a", "b"], vec![]);
        let template = t.finish(vec![block("let", vec![string("x")], vec![], &[("default", body)])]);
        assert!(matches!(
            compile(&template),
            Err(CompileError::BlockParameterArity { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn reserved_and_cyclic_blocks() {
        let mut t = TemplateBuilder::new();
        let body = t.block(&["this"], vec![]);
        let template = t.finish(vec![block("let", vec![string("x")], vec![], &[("default", body)])]);
        assert!(matches!(compile(&template), Err(CompileError::ReservedName { .. })));

        let mut t = TemplateBuilder::new();
        let looping = t.block(&[], vec![block("let", vec![string("x")], vec![], &[("default", 0)])]);
        let template = t.finish(vec![block("let", vec![string("x")], vec![], &[("default", looping)])]);
        assert!(matches!(compile(&template), Err(CompileError::UnknownBlock { index: 0, .. })));
    }

    #[test]
    fn statements_newer_than_the_declared_version_are_rejected() {
        let mut template = TemplateBuilder::new().finish(vec![
            open("p"),
            text("x"),
            close(),
            yield_to("default", vec![]).at(Span::new(3, 12)),
        ]);
        template.version = MIN_WIRE_FORMAT_VERSION;
        assert_eq!(
            compile(&template),
            Err(CompileError::WireOpTooNew {
                op: WireOp::Yield,
                since: 2,
                version: 1,
                span: Some(Span::new(3, 12)),
            })
        );

        template.version = WIRE_FORMAT_VERSION;
        assert!(compile(&template).is_ok());
    }

    #[test]
    fn wire_version_is_checked() {
        let mut template = TemplateBuilder::new().finish(vec![]);
        template.version = 99;
        assert_eq!(
            compile(&template),
            Err(CompileError::UnsupportedWireVersion { found: 99, expected: WIRE_FORMAT_VERSION })
        );
    }
}
