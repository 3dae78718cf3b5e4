use crate::core::{Document, HeadingTag, Node, NodeKey, Point, SelectionState};

/// Opaque handle to a host element (the editable root, a rendered node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// Committed tree and selection. Node handles are only handed out inside
/// [`EditorState::read`].
#[derive(Debug, Clone, PartialEq)]
pub struct EditorState {
    pub(crate) doc: Document,
    pub(crate) selection: SelectionState,
}

impl EditorState {
    pub(crate) fn new(doc: Document, selection: SelectionState) -> Self {
        Self { doc, selection }
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn read<R>(&self, f: impl FnOnce(&ReadContext<'_>) -> R) -> R {
        f(&ReadContext { state: self })
    }
}

/// What listeners and command handlers observe after a commit.
#[derive(Clone, Copy)]
pub struct EditorView<'a> {
    state: &'a EditorState,
    root_element: Option<ElementHandle>,
}

impl<'a> EditorView<'a> {
    pub(crate) fn new(state: &'a EditorState, root_element: Option<ElementHandle>) -> Self {
        Self {
            state,
            root_element,
        }
    }

    pub fn state(&self) -> &'a EditorState {
        self.state
    }

    pub fn root_element(&self) -> Option<ElementHandle> {
        self.root_element
    }

    pub fn read<R>(&self, f: impl FnOnce(&ReadContext<'_>) -> R) -> R {
        self.state.read(f)
    }
}

pub struct ReadContext<'a> {
    state: &'a EditorState,
}

impl<'a> ReadContext<'a> {
    pub fn selection(&self) -> &'a SelectionState {
        &self.state.selection
    }

    pub fn doc(&self) -> &'a Document {
        &self.state.doc
    }

    pub fn root(&self) -> NodeRef<'a> {
        NodeRef {
            doc: &self.state.doc,
            path: Vec::new(),
        }
    }

    pub fn node(&self, key: &NodeKey) -> Option<NodeRef<'a>> {
        self.node_at(key.path())
    }

    pub fn node_at(&self, path: &[usize]) -> Option<NodeRef<'a>> {
        if !path.is_empty() {
            self.state.doc.node(path)?;
        }
        Some(NodeRef {
            doc: &self.state.doc,
            path: path.to_vec(),
        })
    }

    /// The node a selection point lives in.
    pub fn point_node(&self, point: &Point) -> Option<NodeRef<'a>> {
        self.node_at(&point.path)
    }

    /// True when `point` sits at the end of its text run (or after the last
    /// child of its element).
    pub fn is_at_end(&self, point: &Point) -> bool {
        if point.path.is_empty() {
            return point.offset >= self.state.doc.children.len();
        }
        match self.state.doc.node(&point.path) {
            Some(Node::Text(t)) => point.offset >= t.text.len(),
            Some(Node::Element(el)) => point.offset >= el.children.len(),
            None => false,
        }
    }
}

/// Kind of a node, decided once when it is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind<'a> {
    Root,
    Heading { tag: HeadingTag },
    Link { url: &'a str },
    Element { kind: &'a str },
    Text { text: &'a str },
}

/// Borrowed handle into the tree; it cannot outlive the read that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRef<'a> {
    doc: &'a Document,
    path: Vec<usize>,
}

impl<'a> NodeRef<'a> {
    pub fn key(&self) -> NodeKey {
        NodeKey::from_path(self.path.clone())
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn node(&self) -> Option<&'a Node> {
        self.doc.node(&self.path)
    }

    pub fn kind(&self) -> NodeKind<'a> {
        match self.node() {
            None => NodeKind::Root,
            Some(Node::Text(t)) => NodeKind::Text { text: &t.text },
            Some(Node::Element(el)) => {
                if let Some(tag) = el.heading_tag() {
                    NodeKind::Heading { tag }
                } else if let Some(url) = el.url() {
                    NodeKind::Link { url }
                } else {
                    NodeKind::Element { kind: &el.kind }
                }
            }
        }
    }

    pub fn node_type(&self) -> &'a str {
        match self.node() {
            None => "root",
            Some(Node::Text(_)) => "text",
            Some(Node::Element(el)) => &el.kind,
        }
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        let (_, parent) = self.path.split_last()?;
        Some(NodeRef {
            doc: self.doc,
            path: parent.to_vec(),
        })
    }

    /// The ancestor (or self) directly under the root. `None` for the root.
    pub fn top_level_element(&self) -> Option<NodeRef<'a>> {
        let first = *self.path.first()?;
        Some(NodeRef {
            doc: self.doc,
            path: vec![first],
        })
    }

    pub fn text_content(&self) -> String {
        match self.node() {
            Some(node) => node.text_content(),
            None => self.doc.plain_text(),
        }
    }
}
