//! Shorthand constructors for IR, for hosts that build templates in Rust
//! instead of loading them as JSON.

use super::{
    Block, Expression, Hash, Literal, NamedBlock, SerializedTemplate, Spanned, Statement,
    WIRE_FORMAT_VERSION,
};

pub type Stmt = Spanned<Statement>;

/// Collects nested blocks while the statements referring to them are built.
#[derive(Debug, Default)]
pub struct TemplateBuilder {
    module_name: Option<String>,
    blocks: Vec<Block>,
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = Some(name.into());
        self
    }

    /// Registers a nested block and returns its index.
    pub fn block(&mut self, parameters: &[&str], statements: Vec<Stmt>) -> u32 {
        self.blocks.push(Block {
            statements,
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
        });
        (self.blocks.len() - 1) as u32
    }

    pub fn finish(self, statements: Vec<Stmt>) -> SerializedTemplate {
        SerializedTemplate {
            version: WIRE_FORMAT_VERSION,
            module_name: self.module_name,
            block: Block { statements, parameters: Vec::new() },
            blocks: self.blocks,
        }
    }
}

fn stmt(statement: Statement) -> Stmt {
    Spanned::new(statement)
}

pub fn text(value: &str) -> Stmt {
    stmt(Statement::Text { value: value.to_string() })
}

pub fn comment(value: &str) -> Stmt {
    stmt(Statement::Comment { value: value.to_string() })
}

pub fn open(tag: &str) -> Stmt {
    stmt(Statement::OpenElement { tag: tag.to_string(), namespace: None })
}

pub fn close() -> Stmt {
    stmt(Statement::CloseElement)
}

pub fn attr(name: &str, value: &str) -> Stmt {
    stmt(Statement::StaticAttr {
        name: name.to_string(),
        value: value.to_string(),
        namespace: None,
    })
}

pub fn dynamic_attr(name: &str, value: Expression) -> Stmt {
    stmt(Statement::DynamicAttr {
        name: name.to_string(),
        value,
        trusting: false,
        namespace: None,
    })
}

pub fn trusting_attr(name: &str, value: Expression) -> Stmt {
    stmt(Statement::DynamicAttr {
        name: name.to_string(),
        value,
        trusting: true,
        namespace: None,
    })
}

pub fn modifier(name: &str, params: Vec<Expression>) -> Stmt {
    stmt(Statement::Modifier { name: name.to_string(), params, hash: Vec::new() })
}

pub fn append(value: Expression) -> Stmt {
    stmt(Statement::Append { value, trusting: false })
}

pub fn trusting_append(value: Expression) -> Stmt {
    stmt(Statement::Append { value, trusting: true })
}

/// `{{#name params hash}}` with the given named blocks.
pub fn block(name: &str, params: Vec<Expression>, hash: Hash, blocks: &[(&str, u32)]) -> Stmt {
    stmt(Statement::Block {
        name: name.to_string(),
        params,
        hash,
        blocks: named_blocks(blocks),
    })
}

pub fn component(tag: &str, args: Hash, blocks: &[(&str, u32)]) -> Stmt {
    stmt(Statement::Component {
        tag: tag.to_string(),
        args,
        blocks: named_blocks(blocks),
    })
}

pub fn yield_to(to: &str, params: Vec<Expression>) -> Stmt {
    stmt(Statement::Yield { to: to.to_string(), params })
}

fn named_blocks(blocks: &[(&str, u32)]) -> Vec<NamedBlock> {
    blocks
        .iter()
        .map(|(name, block)| NamedBlock { name: name.to_string(), block: *block })
        .collect()
}

/// Builds a `Get` from a dotted path: `this.user.name`, `@title`, `item.id`.
pub fn path(dotted: &str) -> Expression {
    let mut parts = dotted.split('.');
    let head = parts.next().unwrap_or_default().to_string();
    Expression::Get { head, path: parts.map(str::to_string).collect() }
}

pub fn string(value: &str) -> Expression {
    Expression::Literal { value: Literal::String(value.to_string()) }
}

pub fn number(value: f64) -> Expression {
    Expression::Literal { value: Literal::Number(value) }
}

pub fn boolean(value: bool) -> Expression {
    Expression::Literal { value: Literal::Bool(value) }
}

pub fn null() -> Expression {
    Expression::Literal { value: Literal::Null }
}

pub fn call(name: &str, params: Vec<Expression>) -> Expression {
    Expression::Call { name: name.to_string(), params, hash: Vec::new() }
}

pub fn call_with(name: &str, params: Vec<Expression>, hash: Hash) -> Expression {
    Expression::Call { name: name.to_string(), params, hash }
}

pub fn concat(parts: Vec<Expression>) -> Expression {
    Expression::Interpolate { parts }
}

pub fn hash(pairs: Vec<(&str, Expression)>) -> Hash {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
