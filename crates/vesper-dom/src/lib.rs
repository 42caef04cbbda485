//! Output contract for the Vesper VM.
//!
//! The VM never touches a concrete document. It drives a [`Document`] through
//! node handles, which keeps the render tree independent of whatever the host
//! renders into. [`SimpleDocument`] is an in-memory implementation used by
//! tests and the CLI.

mod document;
mod html;

pub use document::{MutationStats, NodeKind, SimpleDocument};
pub use html::{escape_attribute, escape_text};

/// Generational handle to a node owned by a [`Document`].
///
/// A removed node's slot may be reused; the generation lets the document
/// detect stale handles.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId {
    pub index: u32,
    pub generation: u32,
}

impl NodeId {
    pub const INVALID: Self = Self { index: u32::MAX, generation: 0 };

    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }
}

/// Opaque document builder driven by the VM.
///
/// Handles passed in are always ones this document handed out. Insertion
/// follows DOM `insertBefore` semantics: a `None` reference appends, and
/// inserting an attached node moves it.
pub trait Document {
    fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> NodeId;
    fn create_text(&mut self, text: &str) -> NodeId;
    fn create_comment(&mut self, text: &str) -> NodeId;

    fn set_attribute(&mut self, element: NodeId, name: &str, value: &str, namespace: Option<&str>);
    fn remove_attribute(&mut self, element: NodeId, name: &str, namespace: Option<&str>);
    /// Replaces the character data of a text or comment node.
    fn set_text(&mut self, node: NodeId, text: &str);

    fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>);
    /// Detaches `node` (and its subtree) from `parent`. The handle must not be
    /// used afterwards.
    fn remove_child(&mut self, parent: NodeId, node: NodeId);

    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    fn first_child(&self, node: NodeId) -> Option<NodeId>;

    /// Parses `html` as a fragment and inserts the resulting nodes before
    /// `reference`. Returns the first and last inserted node, or `None` when
    /// the fragment produced no nodes.
    fn insert_html(
        &mut self,
        parent: NodeId,
        reference: Option<NodeId>,
        html: &str,
    ) -> Option<(NodeId, NodeId)>;
}
