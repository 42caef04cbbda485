//! Revision tags.
//!
//! A tag reports the revision at which the state it stands for last changed.
//! Revisions come from a thread-local clock that only moves forward, so a
//! consumer holding a snapshot can answer "did anything change?" by comparing
//! one integer. Combinator tags are pull-based: they re-derive the max of
//! their children lazily, at most once per clock value.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub type Revision = u64;

/// Revision of the constant tag. Never dirty.
pub const CONSTANT: Revision = 0;
/// Revision every fresh dirtyable tag starts at.
pub const INITIAL: Revision = 1;

thread_local! {
    static CURRENT_REVISION: Cell<Revision> = const { Cell::new(INITIAL) };
    static NEXT_TAG_ID: Cell<u64> = const { Cell::new(1) };
    static COMBINATORS: RefCell<CombinatorCache> = RefCell::new(CombinatorCache::default());
}

/// The clock's current value.
pub fn current_revision() -> Revision {
    CURRENT_REVISION.with(Cell::get)
}

fn bump_revision() -> Revision {
    CURRENT_REVISION.with(|clock| {
        let next = clock.get() + 1;
        clock.set(next);
        next
    })
}

fn next_tag_id() -> TagId {
    NEXT_TAG_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        TagId(id)
    })
}

/// Identity of a non-constant tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TagId(u64);

/// Versioned marker for a piece of tracked state.
#[derive(Clone)]
pub struct Tag {
    repr: Repr,
}

#[derive(Clone)]
enum Repr {
    Constant,
    Dirtyable(Rc<DirtyableInner>),
    Combinator(Rc<CombinatorInner>),
}

struct DirtyableInner {
    id: TagId,
    revision: Cell<Revision>,
}

struct CombinatorInner {
    id: TagId,
    children: SmallVec<[Tag; 4]>,
    last_checked: Cell<Revision>,
    last_value: Cell<Revision>,
}

impl Tag {
    /// The tag of state that never changes.
    pub const fn constant() -> Self {
        Self { repr: Repr::Constant }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.repr, Repr::Constant)
    }

    pub fn id(&self) -> Option<TagId> {
        match &self.repr {
            Repr::Constant => None,
            Repr::Dirtyable(inner) => Some(inner.id),
            Repr::Combinator(inner) => Some(inner.id),
        }
    }

    /// Number of direct children of a combinator, zero otherwise.
    pub fn child_count(&self) -> usize {
        match &self.repr {
            Repr::Combinator(inner) => inner.children.len(),
            _ => 0,
        }
    }

    pub fn ptr_eq(&self, other: &Tag) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Constant, Repr::Constant) => true,
            (Repr::Dirtyable(a), Repr::Dirtyable(b)) => Rc::ptr_eq(a, b),
            (Repr::Combinator(a), Repr::Combinator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self::constant()
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Constant => write!(f, "Tag(constant)"),
            Repr::Dirtyable(inner) => {
                write!(f, "Tag(dirtyable #{} @{})", inner.id.0, inner.revision.get())
            }
            Repr::Combinator(inner) => {
                write!(f, "Tag(combinator #{} of {})", inner.id.0, inner.children.len())
            }
        }
    }
}

/// A tag that a setter can dirty directly.
#[derive(Clone)]
pub struct DirtyableTag(Rc<DirtyableInner>);

impl DirtyableTag {
    pub fn new() -> Self {
        Self(Rc::new(DirtyableInner {
            id: next_tag_id(),
            revision: Cell::new(INITIAL),
        }))
    }

    /// Advances the clock and stamps this tag with the new revision.
    /// Consumers notice on their next validation; nothing is pushed.
    pub fn dirty(&self) {
        let revision = bump_revision();
        self.0.revision.set(revision);
    }

    pub fn as_tag(&self) -> Tag {
        Tag { repr: Repr::Dirtyable(self.0.clone()) }
    }
}

impl Default for DirtyableTag {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&DirtyableTag> for Tag {
    fn from(tag: &DirtyableTag) -> Self {
        tag.as_tag()
    }
}

impl fmt::Debug for DirtyableTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_tag().fmt(f)
    }
}

pub fn create_tag() -> DirtyableTag {
    DirtyableTag::new()
}

pub fn dirty(tag: &DirtyableTag) {
    tag.dirty();
}

/// Current revision of `tag`. Combinators re-walk their children only when
/// the clock moved since they were last asked.
pub fn value_for_tag(tag: &Tag) -> Revision {
    match &tag.repr {
        Repr::Constant => CONSTANT,
        Repr::Dirtyable(inner) => inner.revision.get(),
        Repr::Combinator(inner) => {
            let now = current_revision();
            if inner.last_checked.get() == now {
                return inner.last_value.get();
            }
            let value = inner
                .children
                .iter()
                .map(value_for_tag)
                .max()
                .unwrap_or(CONSTANT);
            // a combinator never reports a lower revision than before
            let value = value.max(inner.last_value.get());
            inner.last_value.set(value);
            inner.last_checked.set(now);
            value
        }
    }
}

pub fn validate(tag: &Tag, snapshot: Revision) -> bool {
    value_for_tag(tag) == snapshot
}

/// Combines `tags` into one tag reporting the max of their revisions.
///
/// Constant tags and duplicates are dropped. No children yields the constant
/// tag, one child yields that child, and the same child set always yields the
/// same combinator while it is alive.
pub fn combine<I>(tags: I) -> Tag
where
    I: IntoIterator<Item = Tag>,
{
    let mut children: SmallVec<[Tag; 4]> = SmallVec::new();
    for tag in tags {
        let Some(id) = tag.id() else { continue };
        if children.iter().any(|child| child.id() == Some(id)) {
            continue;
        }
        children.push(tag);
    }

    match children.len() {
        0 => Tag::constant(),
        1 => children.swap_remove(0),
        _ => {
            children.sort_by_key(|child| child.id());
            COMBINATORS.with(|cache| cache.borrow_mut().get_or_create(children))
        }
    }
}

type CombinatorKey = SmallVec<[TagId; 4]>;

struct CombinatorCache {
    entries: FxHashMap<CombinatorKey, Weak<CombinatorInner>>,
    prune_at: usize,
}

impl Default for CombinatorCache {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            prune_at: 256,
        }
    }
}

impl CombinatorCache {
    fn get_or_create(&mut self, children: SmallVec<[Tag; 4]>) -> Tag {
        let key: CombinatorKey = children.iter().filter_map(Tag::id).collect();
        if let Some(inner) = self.entries.get(&key).and_then(Weak::upgrade) {
            return Tag { repr: Repr::Combinator(inner) };
        }

        let inner = Rc::new(CombinatorInner {
            id: next_tag_id(),
            children,
            last_checked: Cell::new(CONSTANT),
            last_value: Cell::new(CONSTANT),
        });
        self.entries.insert(key, Rc::downgrade(&inner));

        if self.entries.len() > self.prune_at {
            self.entries.retain(|_, weak| weak.strong_count() > 0);
            self.prune_at = (self.entries.len() * 2).max(256);
        }
        Tag { repr: Repr::Combinator(inner) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_moves_revision_forward() {
        let tag = create_tag();
        let before = value_for_tag(&tag.as_tag());
        assert!(before >= INITIAL);
        tag.dirty();
        let after = value_for_tag(&tag.as_tag());
        assert!(after > before);
        assert_eq!(after, current_revision());
    }

    #[test]
    fn constant_tag_reports_zero_and_always_validates() {
        let constant = Tag::constant();
        assert_eq!(value_for_tag(&constant), CONSTANT);
        create_tag().dirty();
        assert!(validate(&constant, CONSTANT));
    }

    #[test]
    fn combining_nothing_or_constants_is_constant() {
        assert!(combine([]).is_constant());
        assert!(combine([Tag::constant(), Tag::constant()]).is_constant());
    }

    #[test]
    fn combining_one_tag_returns_it() {
        let tag = create_tag().as_tag();
        let combined = combine([tag.clone(), Tag::constant(), tag.clone()]);
        assert!(combined.ptr_eq(&tag));
    }

    #[test]
    fn same_dependency_set_reuses_combinator() {
        let a = create_tag().as_tag();
        let b = create_tag().as_tag();
        let first = combine([a.clone(), b.clone()]);
        let second = combine([b.clone(), a.clone(), b.clone()]);
        assert!(first.ptr_eq(&second));
        assert_eq!(first.child_count(), 2);
    }

    #[test]
    fn combinator_tracks_max_of_children() {
        let a = create_tag();
        let b = create_tag();
        let combined = combine([a.as_tag(), b.as_tag()]);
        let snapshot = value_for_tag(&combined);

        b.dirty();
        let after_b = value_for_tag(&combined);
        assert!(!validate(&combined, snapshot));
        assert_eq!(after_b, value_for_tag(&b.as_tag()));

        a.dirty();
        assert_eq!(value_for_tag(&combined), value_for_tag(&a.as_tag()));
    }

    #[test]
    fn nested_combinators() {
        let a = create_tag();
        let b = create_tag();
        let c = create_tag();
        let inner = combine([a.as_tag(), b.as_tag()]);
        let outer = combine([inner.clone(), c.as_tag()]);
        let snapshot = value_for_tag(&outer);

        a.dirty();
        assert!(!validate(&outer, snapshot));
        assert_eq!(value_for_tag(&outer), value_for_tag(&a.as_tag()));
    }
}
