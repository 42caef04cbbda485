//! Runtime values and tracked host objects.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::validator::{DirtyableTag, consume_tag};

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    List(Rc<Vec<Value>>),
    Object(Rc<TrackedObject>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Rc::new(items.into_iter().collect()))
    }

    pub fn object(object: TrackedObject) -> Self {
        Value::Object(Rc::new(object))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Truthiness used by `if`, `unless`, `not` and `each`'s else branch.
    /// Empty strings and empty lists are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Text a value renders as. Nullish values render as nothing.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined | Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::List(items) => items
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    /// Property read. Reads from a [`TrackedObject`] consume the property's tag.
    pub fn get_property(&self, key: &str) -> Value {
        match self {
            Value::Object(object) => object.get(key),
            Value::List(items) => match key {
                "length" => Value::Number(items.len() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index).cloned())
                    .unwrap_or_default(),
            },
            Value::String(s) if key == "length" => Value::Number(s.chars().count() as f64),
            _ => Value::Undefined,
        }
    }

    /// Stable identity used to key list items: object identity for objects,
    /// type-tagged content for everything else.
    pub fn identity_key(&self) -> String {
        match self {
            Value::Undefined => "u:".to_string(),
            Value::Null => "n:".to_string(),
            Value::Bool(b) => format!("b:{b}"),
            Value::Number(n) => format!("d:{}", format_number(*n)),
            Value::String(s) => format!("s:{s}"),
            Value::List(items) => format!("l:{:p}", Rc::as_ptr(items)),
            Value::Object(object) => format!("o:{:p}", Rc::as_ptr(object)),
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<TrackedObject>> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Converts JSON into values; objects become [`TrackedObject`]s so that
    /// later writes can be observed.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s.as_str()),
            serde_json::Value::Array(items) => Value::list(items.iter().map(Value::from_json)),
            serde_json::Value::Object(map) => {
                let object = TrackedObject::new();
                for (key, value) in map {
                    object.insert_untracked(key, Value::from_json(value));
                }
                Value::object(object)
            }
        }
    }

    /// Converts back to JSON without consuming any tags.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                serde_json::Value::from(*n as i64)
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(object) => {
                let mut entries = object.entries_untracked();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                serde_json::Value::Object(
                    entries
                        .into_iter()
                        .map(|(key, value)| (key.to_string(), value.to_json()))
                        .collect(),
                )
            }
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else if n.is_nan() {
        "NaN".to_string()
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(object) => write!(f, "Object({:p})", Rc::as_ptr(object)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<TrackedObject> for Value {
    fn from(object: TrackedObject) -> Self {
        Value::object(object)
    }
}

struct Field {
    value: Value,
    tag: DirtyableTag,
}

/// Host object whose properties are individually tracked.
///
/// Reading a property consumes its tag; writing dirties it. Reads of missing
/// properties consume the object's shape tag, which is dirtied whenever a
/// property is added.
#[derive(Default)]
pub struct TrackedObject {
    fields: RefCell<FxHashMap<Rc<str>, Field>>,
    shape: DirtyableTag,
}

impl TrackedObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Value {
        let (value, tag) = match self.fields.borrow().get(key) {
            Some(field) => (field.value.clone(), field.tag.as_tag()),
            None => (Value::Undefined, self.shape.as_tag()),
        };
        consume_tag(&tag);
        value
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let tag = {
            let mut fields = self.fields.borrow_mut();
            match fields.get_mut(key) {
                Some(field) => {
                    field.value = value;
                    field.tag.clone()
                }
                None => {
                    fields.insert(Rc::from(key), Field { value, tag: DirtyableTag::new() });
                    self.shape.clone()
                }
            }
        };
        tag.dirty();
    }

    /// Defined properties, read as a tracked whole: adding a property or
    /// changing any of them invalidates the read.
    pub fn entries(&self) -> Vec<(Rc<str>, Value)> {
        consume_tag(&self.shape.as_tag());
        let fields = self.fields.borrow();
        let mut entries = Vec::with_capacity(fields.len());
        for (key, field) in fields.iter() {
            consume_tag(&field.tag.as_tag());
            if !matches!(field.value, Value::Undefined) {
                entries.push((key.clone(), field.value.clone()));
            }
        }
        entries
    }

    /// Number of stored properties, defined or not.
    pub fn field_count(&self) -> usize {
        self.fields.borrow().len()
    }

    /// Sets a property without dirtying, for building objects before anyone
    /// has read them.
    pub fn insert_untracked(&self, key: &str, value: Value) {
        let mut fields = self.fields.borrow_mut();
        match fields.get_mut(key) {
            Some(field) => field.value = value,
            None => {
                fields.insert(Rc::from(key), Field { value, tag: DirtyableTag::new() });
            }
        }
    }

    pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
        self.insert_untracked(key, value.into());
        self
    }

    pub fn get_untracked(&self, key: &str) -> Value {
        self.fields
            .borrow()
            .get(key)
            .map(|field| field.value.clone())
            .unwrap_or_default()
    }

    pub fn entries_untracked(&self) -> Vec<(Rc<str>, Value)> {
        self.fields
            .borrow()
            .iter()
            .filter(|(_, field)| !matches!(field.value, Value::Undefined))
            .map(|(key, field)| (key.clone(), field.value.clone()))
            .collect()
    }
}

impl fmt::Debug for TrackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries = self.entries_untracked();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        f.debug_map().entries(entries.iter().map(|(k, v)| (k, v))).finish()
    }
}
