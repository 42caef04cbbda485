use vesper_dom::{Document, NodeId};

/// Forwards to a document and counts the mutations that reach it.
pub(crate) struct CountingDocument<'d> {
    inner: &'d mut dyn Document,
    pub mutations: usize,
}

impl<'d> CountingDocument<'d> {
    pub fn new(inner: &'d mut dyn Document) -> Self {
        Self { inner, mutations: 0 }
    }
}

impl Document for CountingDocument<'_> {
    fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> NodeId {
        self.inner.create_element(tag, namespace)
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.inner.create_text(text)
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        self.inner.create_comment(text)
    }

    fn set_attribute(&mut self, element: NodeId, name: &str, value: &str, namespace: Option<&str>) {
        self.mutations += 1;
        self.inner.set_attribute(element, name, value, namespace);
    }

    fn remove_attribute(&mut self, element: NodeId, name: &str, namespace: Option<&str>) {
        self.mutations += 1;
        self.inner.remove_attribute(element, name, namespace);
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        self.mutations += 1;
        self.inner.set_text(node, text);
    }

    fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) {
        self.mutations += 1;
        self.inner.insert_before(parent, node, reference);
    }

    fn remove_child(&mut self, parent: NodeId, node: NodeId) {
        self.mutations += 1;
        self.inner.remove_child(parent, node);
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.parent(node)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.inner.next_sibling(node)
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.inner.first_child(node)
    }

    fn insert_html(&mut self, parent: NodeId, reference: Option<NodeId>, html: &str) -> Option<(NodeId, NodeId)> {
        self.mutations += 1;
        self.inner.insert_html(parent, reference, html)
    }
}
