//! Memoized, tag-tracked values.
//!
//! A [`Reference`] is what the VM pushes on its stack and binds into scope
//! slots. Compute references re-run their function only when the tag of
//! what they read last time no longer validates; every read also consumes the
//! reference's tag into the enclosing tracking frame, so derived references
//! depend on their inputs transitively.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::error::{RenderError, Result};
use crate::validator::{
    DirtyableTag, Revision, Tag, consume_tag, track, validate, value_for_tag,
};
use crate::value::Value;

pub type ComputeFn = Box<dyn Fn() -> Result<Value>>;
pub type UpdateFn = Box<dyn Fn(Value) -> Result<()>>;

#[derive(Clone)]
pub struct Reference(Rc<RefInner>);

struct RefInner {
    kind: RefKind,
    memo: RefCell<Option<Memo>>,
    children: RefCell<Children>,
}

const MIN_CHILD_PRUNE: usize = 16;

/// Live child references by key. Dead entries are dropped once the map
/// outgrows `prune_at`.
struct Children {
    entries: FxHashMap<Rc<str>, Weak<RefInner>>,
    prune_at: usize,
}

impl Default for Children {
    fn default() -> Self {
        Self { entries: FxHashMap::default(), prune_at: MIN_CHILD_PRUNE }
    }
}

impl Children {
    fn get(&self, key: &str) -> Option<Rc<RefInner>> {
        self.entries.get(key).and_then(Weak::upgrade)
    }

    fn insert(&mut self, key: &str, child: &Rc<RefInner>) {
        self.entries.insert(Rc::from(key), Rc::downgrade(child));
        if self.entries.len() > self.prune_at {
            self.entries.retain(|_, weak| weak.strong_count() > 0);
            self.prune_at = (self.entries.len() * 2).max(MIN_CHILD_PRUNE);
        }
    }
}

enum RefKind {
    Constant(Value),
    Primitive { value: RefCell<Value>, tag: DirtyableTag },
    Compute { compute: ComputeFn, update: Option<UpdateFn> },
}

struct Memo {
    value: Value,
    tag: Tag,
    snapshot: Revision,
}

impl Reference {
    fn from_kind(kind: RefKind) -> Self {
        Self(Rc::new(RefInner {
            kind,
            memo: RefCell::new(None),
            children: RefCell::default(),
        }))
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Self::from_kind(RefKind::Constant(value.into()))
    }

    pub fn undefined() -> Self {
        Self::constant(Value::Undefined)
    }

    /// A settable cell. Setting it dirties its tag.
    pub fn primitive(value: impl Into<Value>) -> Self {
        Self::from_kind(RefKind::Primitive {
            value: RefCell::new(value.into()),
            tag: DirtyableTag::new(),
        })
    }

    pub fn compute(compute: impl Fn() -> Result<Value> + 'static) -> Self {
        Self::from_kind(RefKind::Compute { compute: Box::new(compute), update: None })
    }

    pub fn compute_with_update(
        compute: impl Fn() -> Result<Value> + 'static,
        update: impl Fn(Value) -> Result<()> + 'static,
    ) -> Self {
        Self::from_kind(RefKind::Compute {
            compute: Box::new(compute),
            update: Some(Box::new(update)),
        })
    }

    /// Current value, recomputing only if a dependency changed.
    pub fn value(&self) -> Result<Value> {
        match &self.0.kind {
            RefKind::Constant(value) => Ok(value.clone()),
            RefKind::Primitive { value, tag } => {
                consume_tag(&tag.as_tag());
                Ok(value.borrow().clone())
            }
            RefKind::Compute { compute, .. } => {
                if let Some(memo) = self.0.memo.borrow().as_ref() {
                    if validate(&memo.tag, memo.snapshot) {
                        consume_tag(&memo.tag);
                        return Ok(memo.value.clone());
                    }
                }

                let (result, tag) = track(|| compute());
                let value = result?;
                let snapshot = value_for_tag(&tag);
                consume_tag(&tag);
                *self.0.memo.borrow_mut() = Some(Memo { value: value.clone(), tag, snapshot });
                Ok(value)
            }
        }
    }

    /// The tag of what the last computation read. A compute reference that has
    /// never been read reports the constant tag, so callers read first.
    pub fn tag(&self) -> Tag {
        match &self.0.kind {
            RefKind::Constant(_) => Tag::constant(),
            RefKind::Primitive { tag, .. } => tag.as_tag(),
            RefKind::Compute { .. } => self
                .0
                .memo
                .borrow()
                .as_ref()
                .map(|memo| memo.tag.clone())
                .unwrap_or_default(),
        }
    }

    /// Revision a consumer records after reading this reference.
    pub fn snapshot(&self) -> Revision {
        value_for_tag(&self.tag())
    }

    /// True when the value read at `snapshot` is still current.
    pub fn is_valid(&self, snapshot: Revision) -> bool {
        match &self.0.kind {
            RefKind::Compute { .. } if self.0.memo.borrow().is_none() => false,
            _ => validate(&self.tag(), snapshot),
        }
    }

    /// Constant references, and compute references whose last read consumed
    /// nothing, never change.
    pub fn is_const(&self) -> bool {
        match &self.0.kind {
            RefKind::Constant(_) => true,
            RefKind::Primitive { .. } => false,
            RefKind::Compute { .. } => self
                .0
                .memo
                .borrow()
                .as_ref()
                .is_some_and(|memo| memo.tag.is_constant()),
        }
    }

    pub fn is_updatable(&self) -> bool {
        matches!(
            &self.0.kind,
            RefKind::Primitive { .. } | RefKind::Compute { update: Some(_), .. }
        )
    }

    pub fn update(&self, new_value: impl Into<Value>) -> Result<()> {
        match &self.0.kind {
            RefKind::Primitive { value, tag } => {
                *value.borrow_mut() = new_value.into();
                tag.dirty();
                Ok(())
            }
            RefKind::Compute { update: Some(update), .. } => update(new_value.into()),
            _ => Err(RenderError::ReadOnlyReference),
        }
    }

    /// Reference to `key` of this reference's value. Live child references
    /// are shared, so every consumer of `this.user` reads through one memo.
    pub fn child(&self, key: &str) -> Reference {
        if let Some(child) = self.0.children.borrow().get(key) {
            return Reference(child);
        }

        let child = if let RefKind::Constant(value @ (Value::Undefined | Value::Null)) = &self.0.kind {
            Reference::constant(value.clone())
        } else {
            let parent = self.clone();
            let setter_parent = self.clone();
            let getter_key: Rc<str> = Rc::from(key);
            let setter_key = getter_key.clone();
            Reference::compute_with_update(
                move || Ok(parent.value()?.get_property(&getter_key)),
                move |value| match setter_parent.value()? {
                    Value::Object(object) => {
                        object.set(&setter_key, value);
                        Ok(())
                    }
                    _ => Err(RenderError::ReadOnlyReference),
                },
            )
        };
        self.0.children.borrow_mut().insert(key, &child.0);
        child
    }

    pub fn ptr_eq(&self, other: &Reference) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            RefKind::Constant(value) => write!(f, "ConstRef({value:?})"),
            RefKind::Primitive { value, .. } => write!(f, "PrimitiveRef({:?})", value.borrow()),
            RefKind::Compute { .. } => match self.0.memo.borrow().as_ref() {
                Some(memo) => write!(f, "ComputeRef({:?})", memo.value),
                None => write!(f, "ComputeRef(<unread>)"),
            },
        }
    }
}

pub fn value_for_ref(reference: &Reference) -> Result<Value> {
    reference.value()
}

pub fn child_ref_for(parent: &Reference, key: &str) -> Reference {
    parent.child(key)
}

pub fn is_const_ref(reference: &Reference) -> bool {
    reference.is_const()
}

pub fn update_ref(reference: &Reference, value: impl Into<Value>) -> Result<()> {
    reference.update(value)
}
