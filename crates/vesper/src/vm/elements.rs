//! Insertion cursors and block bounds for one pass.

use std::rc::Rc;

use vesper_dom::{Document, NodeId};

use super::bounds::{BlockBounds, Edge};

#[derive(Clone, Copy)]
struct Cursor {
    parent: NodeId,
    next: Option<NodeId>,
}

enum OpenBounds {
    /// A new block; registered with the enclosing block when it ends.
    Block(Rc<BlockBounds>),
    /// Existing bounds being refilled by a replay.
    Resumed(Rc<BlockBounds>),
    /// Children of an element. Only the element itself is recorded outside.
    Element(Rc<BlockBounds>),
}

impl OpenBounds {
    fn bounds(&self) -> &Rc<BlockBounds> {
        match self {
            OpenBounds::Block(bounds) | OpenBounds::Resumed(bounds) | OpenBounds::Element(bounds) => bounds,
        }
    }
}

pub(crate) struct ElementBuilder {
    cursors: Vec<Cursor>,
    open: Vec<OpenBounds>,
    constructing: Option<NodeId>,
}

impl ElementBuilder {
    /// Builder inserting into `parent` before `next`, with a fresh block.
    pub fn new(parent: NodeId, next: Option<NodeId>) -> Self {
        Self {
            cursors: vec![Cursor { parent, next }],
            open: vec![OpenBounds::Block(BlockBounds::new(parent))],
            constructing: None,
        }
    }

    /// Builder refilling `bounds`, inserting before `next`.
    pub fn resume(bounds: Rc<BlockBounds>, next: Option<NodeId>) -> Self {
        Self {
            cursors: vec![Cursor { parent: bounds.parent(), next }],
            open: vec![OpenBounds::Resumed(bounds)],
            constructing: None,
        }
    }

    fn cursor(&self) -> Cursor {
        self.cursors
            .last()
            .copied()
            .unwrap_or(Cursor { parent: NodeId::INVALID, next: None })
    }

    pub fn parent(&self) -> NodeId {
        self.cursor().parent
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.cursor().next
    }

    pub fn constructing(&self) -> Option<NodeId> {
        self.constructing
    }

    fn did_append(&self, edge: Edge) {
        if let Some(open) = self.open.last() {
            open.bounds().did_append(edge);
        }
    }

    fn insert(&mut self, document: &mut dyn Document, node: NodeId) {
        let cursor = self.cursor();
        document.insert_before(cursor.parent, node, cursor.next);
        self.did_append(Edge::Node(node));
    }

    pub fn append_text(&mut self, document: &mut dyn Document, text: &str) -> NodeId {
        let node = document.create_text(text);
        self.insert(document, node);
        node
    }

    pub fn append_comment(&mut self, document: &mut dyn Document, text: &str) -> NodeId {
        let node = document.create_comment(text);
        self.insert(document, node);
        node
    }

    /// Inserts parsed HTML at the cursor.
    pub fn append_html(&mut self, document: &mut dyn Document, html: &str) {
        let cursor = self.cursor();
        if let Some((first, last)) = document.insert_html(cursor.parent, cursor.next, html) {
            self.did_append(Edge::Node(first));
            self.did_append(Edge::Node(last));
        }
    }

    pub fn open_element(&mut self, document: &mut dyn Document, tag: &str, namespace: Option<&str>) -> NodeId {
        debug_assert!(self.constructing.is_none(), "element opened before the previous one flushed");
        let element = document.create_element(tag, namespace);
        self.constructing = Some(element);
        element
    }

    /// Inserts the element under construction and makes it the cursor.
    pub fn flush_element(&mut self, document: &mut dyn Document) -> Option<NodeId> {
        let element = self.constructing.take()?;
        self.insert(document, element);
        self.cursors.push(Cursor { parent: element, next: None });
        self.open.push(OpenBounds::Element(BlockBounds::new(element)));
        Some(element)
    }

    pub fn close_element(&mut self) {
        debug_assert!(matches!(self.open.last(), Some(OpenBounds::Element(_))));
        self.open.pop();
        self.cursors.pop();
    }

    pub fn push_block(&mut self) -> Rc<BlockBounds> {
        let bounds = BlockBounds::new(self.parent());
        self.open.push(OpenBounds::Block(bounds.clone()));
        bounds
    }

    /// Closes the innermost block. Empty blocks get a comment so they keep a
    /// position in the document.
    pub fn end_block(&mut self, document: &mut dyn Document) -> Rc<BlockBounds> {
        let Some(open) = self.open.pop() else {
            debug_assert!(false, "end_block without an open block");
            return BlockBounds::new(self.parent());
        };
        debug_assert!(!matches!(open, OpenBounds::Element(_)), "block ended inside an element");
        let bounds = open.bounds().clone();
        if bounds.is_empty() {
            let cursor = self.cursor();
            let marker = document.create_comment("");
            document.insert_before(cursor.parent, marker, cursor.next);
            bounds.did_append(Edge::Node(marker));
        }
        if let OpenBounds::Block(_) = open {
            self.did_append(Edge::Block(bounds.clone()));
        }
        bounds
    }

    /// Closes everything still open after a failed pass and returns the
    /// outermost bounds.
    pub fn unwind(&mut self, document: &mut dyn Document) -> Option<Rc<BlockBounds>> {
        self.constructing = None;
        let mut outermost = None;
        while !self.open.is_empty() {
            if matches!(self.open.last(), Some(OpenBounds::Element(_))) {
                self.close_element();
            } else {
                outermost = Some(self.end_block(document));
            }
        }
        outermost
    }
}
