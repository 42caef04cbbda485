//! Output ranges owned by blocks.
//!
//! A block's bounds point at its first and last top-level output, which is
//! either a node or a nested block. Edges into nested blocks resolve when
//! asked, so replaying a nested block never leaves the enclosing bounds
//! stale.

use std::cell::RefCell;
use std::rc::Rc;

use vesper_dom::{Document, NodeId};

#[derive(Clone)]
pub(crate) enum Edge {
    Node(NodeId),
    Block(Rc<BlockBounds>),
}

impl Edge {
    fn first_node(&self) -> Option<NodeId> {
        match self {
            Edge::Node(node) => Some(*node),
            Edge::Block(block) => block.first_node(),
        }
    }

    fn last_node(&self) -> Option<NodeId> {
        match self {
            Edge::Node(node) => Some(*node),
            Edge::Block(block) => block.last_node(),
        }
    }
}

pub(crate) struct BlockBounds {
    parent: NodeId,
    first: RefCell<Option<Edge>>,
    last: RefCell<Option<Edge>>,
}

impl BlockBounds {
    pub fn new(parent: NodeId) -> Rc<Self> {
        Rc::new(Self { parent, first: RefCell::new(None), last: RefCell::new(None) })
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub fn first_node(&self) -> Option<NodeId> {
        self.first.borrow().as_ref().and_then(Edge::first_node)
    }

    pub fn last_node(&self) -> Option<NodeId> {
        self.last.borrow().as_ref().and_then(Edge::last_node)
    }

    pub fn is_empty(&self) -> bool {
        self.first.borrow().is_none()
    }

    pub fn set_first(&self, edge: Edge) {
        *self.first.borrow_mut() = Some(edge);
    }

    /// Records `edge` as the latest output, and as the first if nothing came
    /// before it.
    pub fn did_append(&self, edge: Edge) {
        let mut first = self.first.borrow_mut();
        if first.is_none() {
            *first = Some(edge.clone());
        }
        *self.last.borrow_mut() = Some(edge);
    }

    fn reset(&self) {
        *self.first.borrow_mut() = None;
        *self.last.borrow_mut() = None;
    }

    /// Top-level nodes from first to last, in document order.
    pub fn nodes(&self, document: &dyn Document) -> Vec<NodeId> {
        let (Some(first), Some(last)) = (self.first_node(), self.last_node()) else {
            return Vec::new();
        };
        let mut nodes = vec![first];
        let mut node = first;
        while node != last {
            match document.next_sibling(node) {
                Some(next) => {
                    nodes.push(next);
                    node = next;
                }
                None => {
                    debug_assert!(false, "block bounds run past the end of their parent");
                    break;
                }
            }
        }
        nodes
    }

    /// Removes every node in the bounds and returns the node that followed
    /// them. The bounds are left empty.
    pub fn clear(&self, document: &mut dyn Document) -> Option<NodeId> {
        let nodes = self.nodes(document);
        let next = nodes.last().and_then(|&last| document.next_sibling(last));
        for node in nodes {
            document.remove_child(self.parent, node);
        }
        self.reset();
        next
    }

    /// Moves the bounds' nodes, in order, in front of `reference`.
    pub fn move_before(&self, document: &mut dyn Document, reference: Option<NodeId>) {
        for node in self.nodes(document) {
            document.insert_before(self.parent, node, reference);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesper_dom::SimpleDocument;

    #[test]
    fn nested_edges_follow_replays() {
        let mut doc = SimpleDocument::new();
        let root = doc.root();
        let outer = BlockBounds::new(root);
        let inner = BlockBounds::new(root);

        let a = doc.create_text("a");
        doc.insert_before(root, a, None);
        inner.did_append(Edge::Node(a));
        outer.did_append(Edge::Block(inner.clone()));
        let tail = doc.create_text("tail");
        doc.insert_before(root, tail, None);
        outer.did_append(Edge::Node(tail));

        let next = inner.clear(&mut doc);
        assert_eq!(next, Some(tail));
        let b = doc.create_text("b");
        doc.insert_before(root, b, next);
        inner.did_append(Edge::Node(b));

        assert_eq!(outer.first_node(), Some(b));
        assert_eq!(outer.nodes(&doc), vec![b, tail]);
        assert_eq!(doc.to_html(root), "btail");
    }

    #[test]
    fn move_keeps_order() {
        let mut doc = SimpleDocument::new();
        let root = doc.root();
        let block = BlockBounds::new(root);
        let anchor = doc.create_comment("");
        doc.insert_before(root, anchor, None);
        for text in ["x", "y"] {
            let node = doc.create_text(text);
            doc.insert_before(root, node, None);
            block.did_append(Edge::Node(node));
        }
        block.move_before(&mut doc, Some(anchor));
        assert_eq!(doc.to_html(root), "xy<!---->");
    }
}
