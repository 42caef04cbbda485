use crate::html::{Fragment, VOID_ELEMENTS, escape_attribute, escape_text, parse_fragment};
use crate::{Document, NodeId};

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Element {
        tag: String,
        namespace: Option<String>,
        attributes: Vec<Attribute>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub namespace: Option<String>,
    pub value: String,
}

/// Counters of document writes, used to assert that an update pass touched
/// only what it had to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MutationStats {
    pub created: u32,
    pub inserted: u32,
    pub removed: u32,
    pub text_writes: u32,
    pub attribute_writes: u32,
}

impl MutationStats {
    /// Writes to already-built output (creation excluded).
    pub fn total(&self) -> u32 {
        self.inserted + self.removed + self.text_writes + self.attribute_writes
    }
}

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    writes: u32,
}

struct Slot {
    generation: u32,
    node: Option<NodeData>,
}

/// In-memory document backed by a generational arena.
pub struct SimpleDocument {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    root: NodeId,
    stats: MutationStats,
}

impl SimpleDocument {
    pub fn new() -> Self {
        let mut document = Self {
            slots: Vec::with_capacity(64),
            free_list: Vec::new(),
            root: NodeId::INVALID,
            stats: MutationStats::default(),
        };
        document.root = document.alloc(NodeKind::Root);
        document
    }

    /// The fragment root that rendering targets by default.
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let data = NodeData { kind, parent: None, children: Vec::new(), writes: 0 };
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.node = Some(data);
            NodeId { index, generation: slot.generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot { generation: 0, node: Some(data) });
            NodeId { index, generation: 0 }
        }
    }

    fn free_subtree(&mut self, node: NodeId) {
        let mut pending = vec![node];
        while let Some(id) = pending.pop() {
            if !self.is_valid(id) {
                continue;
            }
            let slot = &mut self.slots[id.index as usize];
            if let Some(data) = slot.node.take() {
                pending.extend(data.children);
            }
            slot.generation += 1;
            self.free_list.push(id.index);
        }
    }

    pub fn is_valid(&self, node: NodeId) -> bool {
        self.slots
            .get(node.index as usize)
            .is_some_and(|slot| slot.generation == node.generation && slot.node.is_some())
    }

    fn get(&self, node: NodeId) -> Option<&NodeData> {
        self.slots
            .get(node.index as usize)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, node: NodeId) -> Option<&mut NodeData> {
        self.slots
            .get_mut(node.index as usize)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.get(node).map(|data| &data.kind)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.get(node).map_or(&[], |data| data.children.as_slice())
    }

    pub fn attribute(&self, element: NodeId, name: &str) -> Option<&str> {
        match self.kind(element)? {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|attr| attr.name == name)
                .map(|attr| attr.value.as_str()),
            _ => None,
        }
    }

    /// Number of in-place writes (text or attribute) a node has received.
    pub fn writes(&self, node: NodeId) -> u32 {
        self.get(node).map_or(0, |data| data.writes)
    }

    pub fn stats(&self) -> MutationStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = MutationStats::default();
    }

    /// Live nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    /// First element with the given tag in document order under `from`.
    pub fn find_element(&self, from: NodeId, tag: &str) -> Option<NodeId> {
        self.find_all(from, tag).into_iter().next()
    }

    pub fn find_all(&self, from: NodeId, tag: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut pending: Vec<NodeId> = self.children(from).iter().rev().copied().collect();
        while let Some(id) = pending.pop() {
            if let Some(NodeKind::Element { tag: t, .. }) = self.kind(id) {
                if t == tag {
                    found.push(id);
                }
            }
            pending.extend(self.children(id).iter().rev().copied());
        }
        found
    }

    /// Children of the text and element nodes under `node`, concatenated.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        for &child in self.children(node) {
            match self.kind(child) {
                Some(NodeKind::Text(text)) => out.push_str(text),
                Some(NodeKind::Element { .. }) => self.collect_text(child, out),
                _ => {}
            }
        }
    }

    /// Serializes the children of `node` as HTML. An inspection aid for tests
    /// and the CLI.
    pub fn to_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(node) {
            self.write_html(child, &mut out);
        }
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        let Some(kind) = self.kind(node) else { return };
        match kind {
            NodeKind::Root => {
                for &child in self.children(node) {
                    self.write_html(child, out);
                }
            }
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Element { tag, attributes, .. } => {
                out.push('<');
                out.push_str(tag);
                for attr in attributes {
                    out.push(' ');
                    if let Some(ns) = &attr.namespace {
                        out.push_str(ns);
                        out.push(':');
                    }
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(&attr.value));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for &child in self.children(node) {
                    self.write_html(child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.get(node).and_then(|data| data.parent) else { return };
        if let Some(parent) = self.get_mut(parent) {
            parent.children.retain(|&child| child != node);
        }
        if let Some(data) = self.get_mut(node) {
            data.parent = None;
        }
    }

    fn materialize(&mut self, fragment: Fragment) -> NodeId {
        match fragment {
            Fragment::Text(text) => self.create_text(&text),
            Fragment::Comment(text) => self.create_comment(&text),
            Fragment::Element { tag, attributes, children } => {
                let attributes = attributes
                    .into_iter()
                    .map(|(name, value)| Attribute { name, namespace: None, value })
                    .collect();
                let element = self.alloc(NodeKind::Element { tag, namespace: None, attributes });
                self.stats.created += 1;
                for child in children {
                    let child = self.materialize(child);
                    if let Some(data) = self.get_mut(child) {
                        data.parent = Some(element);
                    }
                    if let Some(data) = self.get_mut(element) {
                        data.children.push(child);
                    }
                }
                element
            }
        }
    }
}

impl Default for SimpleDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl Document for SimpleDocument {
    fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> NodeId {
        self.stats.created += 1;
        self.alloc(NodeKind::Element {
            tag: tag.to_string(),
            namespace: namespace.map(str::to_string),
            attributes: Vec::new(),
        })
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.stats.created += 1;
        self.alloc(NodeKind::Text(text.to_string()))
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        self.stats.created += 1;
        self.alloc(NodeKind::Comment(text.to_string()))
    }

    fn set_attribute(&mut self, element: NodeId, name: &str, value: &str, namespace: Option<&str>) {
        let Some(data) = self.get_mut(element) else {
            log::warn!("set_attribute on stale node {element:?}");
            return;
        };
        let NodeKind::Element { attributes, .. } = &mut data.kind else {
            log::warn!("set_attribute on non-element {element:?}");
            return;
        };
        let namespace = namespace.map(str::to_string);
        match attributes
            .iter_mut()
            .find(|attr| attr.name == name && attr.namespace == namespace)
        {
            Some(attr) => attr.value = value.to_string(),
            None => attributes.push(Attribute {
                name: name.to_string(),
                namespace,
                value: value.to_string(),
            }),
        }
        data.writes += 1;
        self.stats.attribute_writes += 1;
    }

    fn remove_attribute(&mut self, element: NodeId, name: &str, namespace: Option<&str>) {
        let Some(data) = self.get_mut(element) else { return };
        if let NodeKind::Element { attributes, .. } = &mut data.kind {
            attributes.retain(|attr| !(attr.name == name && attr.namespace.as_deref() == namespace));
            data.writes += 1;
            self.stats.attribute_writes += 1;
        }
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        let Some(data) = self.get_mut(node) else {
            log::warn!("set_text on stale node {node:?}");
            return;
        };
        match &mut data.kind {
            NodeKind::Text(current) | NodeKind::Comment(current) => {
                *current = text.to_string();
                data.writes += 1;
                self.stats.text_writes += 1;
            }
            _ => log::warn!("set_text on non-character node {node:?}"),
        }
    }

    fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) {
        if !self.is_valid(parent) || !self.is_valid(node) {
            log::warn!("insert_before with stale handle (parent {parent:?}, node {node:?})");
            return;
        }
        self.detach(node);
        let Some(parent_data) = self.get_mut(parent) else { return };
        let position = reference
            .and_then(|reference| parent_data.children.iter().position(|&c| c == reference))
            .unwrap_or(parent_data.children.len());
        parent_data.children.insert(position, node);
        if let Some(data) = self.get_mut(node) {
            data.parent = Some(parent);
        }
        self.stats.inserted += 1;
    }

    fn remove_child(&mut self, parent: NodeId, node: NodeId) {
        if self.get(node).and_then(|data| data.parent) != Some(parent) {
            log::warn!("remove_child: {node:?} is not a child of {parent:?}");
            return;
        }
        self.detach(node);
        self.free_subtree(node);
        self.stats.removed += 1;
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.get(node).and_then(|data| data.parent)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.get(self.parent(node)?)?;
        let position = parent.children.iter().position(|&c| c == node)?;
        parent.children.get(position + 1).copied()
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.children(node).first().copied()
    }

    fn insert_html(
        &mut self,
        parent: NodeId,
        reference: Option<NodeId>,
        html: &str,
    ) -> Option<(NodeId, NodeId)> {
        let nodes: Vec<NodeId> = parse_fragment(html)
            .into_iter()
            .map(|fragment| self.materialize(fragment))
            .collect();
        for &node in &nodes {
            self.insert_before(parent, node, reference);
        }
        Some((*nodes.first()?, *nodes.last()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_move_and_remove() {
        let mut doc = SimpleDocument::new();
        let root = doc.root();
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        let c = doc.create_text("c");
        doc.insert_before(root, a, None);
        doc.insert_before(root, c, None);
        doc.insert_before(root, b, Some(c));
        assert_eq!(doc.text_content(root), "abc");

        // re-inserting an attached node moves it
        doc.insert_before(root, a, None);
        assert_eq!(doc.text_content(root), "bca");
        assert_eq!(doc.next_sibling(c), Some(a));
        assert_eq!(doc.next_sibling(a), None);

        doc.remove_child(root, c);
        assert_eq!(doc.text_content(root), "ba");
        assert!(!doc.is_valid(c));
    }

    #[test]
    fn freed_slots_are_reused_with_new_generation() {
        let mut doc = SimpleDocument::new();
        let root = doc.root();
        let first = doc.create_comment("x");
        doc.insert_before(root, first, None);
        doc.remove_child(root, first);

        let second = doc.create_comment("y");
        assert_eq!(second.index, first.index);
        assert_ne!(second.generation, first.generation);
        assert!(doc.kind(first).is_none());
    }

    #[test]
    fn removing_an_element_frees_its_subtree() {
        let mut doc = SimpleDocument::new();
        let root = doc.root();
        let div = doc.create_element("div", None);
        let text = doc.create_text("inside");
        doc.insert_before(root, div, None);
        doc.insert_before(div, text, None);
        assert_eq!(doc.node_count(), 3);

        doc.remove_child(root, div);
        assert_eq!(doc.node_count(), 1);
        assert!(!doc.is_valid(text));
    }

    #[test]
    fn serializes_with_escaping() {
        let mut doc = SimpleDocument::new();
        let root = doc.root();
        let a = doc.create_element("a", None);
        doc.set_attribute(a, "title", "\"quoted\"", None);
        let text = doc.create_text("<b>");
        doc.insert_before(root, a, None);
        doc.insert_before(a, text, None);
        let br = doc.create_element("br", None);
        doc.insert_before(root, br, None);

        assert_eq!(doc.to_html(root), r#"<a title="&quot;quoted&quot;">&lt;b&gt;</a><br>"#);
    }

    #[test]
    fn insert_html_builds_elements() {
        let mut doc = SimpleDocument::new();
        let root = doc.root();
        let anchor = doc.create_comment("");
        doc.insert_before(root, anchor, None);

        let (first, last) = doc
            .insert_html(root, Some(anchor), "<script>alert(1)</script>tail")
            .unwrap();
        assert!(matches!(doc.kind(first), Some(NodeKind::Element { tag, .. }) if tag == "script"));
        assert!(matches!(doc.kind(last), Some(NodeKind::Text(t)) if t == "tail"));
        assert_eq!(doc.next_sibling(last), Some(anchor));
        assert!(doc.find_element(root, "script").is_some());

        assert_eq!(doc.insert_html(root, None, ""), None);
    }

    #[test]
    fn counts_writes_per_node() {
        let mut doc = SimpleDocument::new();
        let text = doc.create_text("a");
        let element = doc.create_element("p", None);
        doc.set_text(text, "b");
        doc.set_attribute(element, "id", "x", None);
        doc.remove_attribute(element, "id", None);

        assert_eq!(doc.writes(text), 1);
        assert_eq!(doc.writes(element), 2);
        assert_eq!(doc.stats().text_writes, 1);
        assert_eq!(doc.stats().attribute_writes, 2);
        assert_eq!(doc.attribute(element, "id"), None);
    }
}
