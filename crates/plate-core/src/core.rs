use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::listener::{
    CLICK_COMMAND, CommandHandler, CommandPriority, ListenerError, ListenerRegistry,
    SELECTION_CHANGE_COMMAND, Subscription, UpdateListener,
};
use crate::ops::{ApplyError, Op, Path, PathError, Transaction};
use crate::plugin::{CommandError, PluginRegistry, QueryError};
use crate::state::{EditorState, EditorView, ElementHandle, ReadContext};

pub type Attrs = BTreeMap<String, serde_json::Value>;
pub type ElementKind = String;

pub const PARAGRAPH_KIND: &str = "paragraph";
pub const HEADING_KIND: &str = "heading";
pub const LINK_KIND: &str = "link";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Document {
    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get(*first)?;
        for &ix in rest {
            node = match node {
                Node::Element(el) => el.children.get(ix)?,
                Node::Text(_) => return None,
            };
        }
        Some(node)
    }

    /// Children of the element at `path`; the empty path addresses the root.
    pub fn children_at(&self, path: &[usize]) -> Option<&[Node]> {
        if path.is_empty() {
            return Some(&self.children);
        }
        match self.node(path)? {
            Node::Element(el) => Some(&el.children),
            Node::Text(_) => None,
        }
    }

    pub fn node_count(&self) -> usize {
        fn count(children: &[Node]) -> usize {
            children
                .iter()
                .map(|node| match node {
                    Node::Element(el) => 1 + count(&el.children),
                    Node::Text(_) => 1,
                })
                .sum()
        }
        count(&self.children)
    }

    pub fn plain_text(&self) -> String {
        self.children
            .iter()
            .map(Node::text_content)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// A single empty paragraph, as created for a fresh editor.
    pub fn is_pristine(&self) -> bool {
        match self.children.as_slice() {
            [Node::Element(el)] => {
                el.kind == PARAGRAPH_KIND
                    && el.children.iter().all(|child| child.text_content().is_empty())
            }
            [] => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode { text: text.into() })
    }

    pub fn element(kind: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element(ElementNode {
            kind: kind.into(),
            attrs: Attrs::default(),
            children,
        })
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::element(PARAGRAPH_KIND, vec![Node::text(text)])
    }

    pub fn heading(tag: HeadingTag, text: impl Into<String>) -> Self {
        let mut attrs = Attrs::default();
        attrs.insert("level".to_string(), Value::from(tag.level()));
        Node::Element(ElementNode {
            kind: HEADING_KIND.to_string(),
            attrs,
            children: vec![Node::text(text)],
        })
    }

    pub fn link(url: impl Into<String>, text: impl Into<String>) -> Self {
        let mut attrs = Attrs::default();
        attrs.insert("url".to_string(), Value::String(url.into()));
        Node::Element(ElementNode {
            kind: LINK_KIND.to_string(),
            attrs,
            children: vec![Node::text(text)],
        })
    }

    pub fn text_content(&self) -> String {
        match self {
            Node::Text(t) => t.text.clone(),
            Node::Element(el) => el.children.iter().map(Node::text_content).collect(),
        }
    }

    pub fn is_inline(&self) -> bool {
        match self {
            Node::Text(_) => true,
            Node::Element(el) => el.kind == LINK_KIND,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl ElementNode {
    pub fn url(&self) -> Option<&str> {
        (self.kind == LINK_KIND)
            .then(|| self.attrs.get("url").and_then(|v| v.as_str()).unwrap_or(""))
    }

    pub fn heading_tag(&self) -> Option<HeadingTag> {
        if self.kind != HEADING_KIND {
            return None;
        }
        let level = self
            .attrs
            .get("level")
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
            .clamp(1, 6);
        HeadingTag::from_level(level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingTag {
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
}

impl HeadingTag {
    pub const ALL: [HeadingTag; 6] = [
        HeadingTag::H1,
        HeadingTag::H2,
        HeadingTag::H3,
        HeadingTag::H4,
        HeadingTag::H5,
        HeadingTag::H6,
    ];

    pub fn level(self) -> u64 {
        match self {
            HeadingTag::H1 => 1,
            HeadingTag::H2 => 2,
            HeadingTag::H3 => 3,
            HeadingTag::H4 => 4,
            HeadingTag::H5 => 5,
            HeadingTag::H6 => 6,
        }
    }

    pub fn from_level(level: u64) -> Option<Self> {
        level
            .checked_sub(1)
            .and_then(|ix| Self::ALL.get(ix as usize).copied())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HeadingTag::H1 => "h1",
            HeadingTag::H2 => "h2",
            HeadingTag::H3 => "h3",
            HeadingTag::H4 => "h4",
            HeadingTag::H5 => "h5",
            HeadingTag::H6 => "h6",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(tag))
    }
}

impl fmt::Display for HeadingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a node in the current tree. Keys are only meaningful for the
/// state they were read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey(Path);

impl NodeKey {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_path(path: impl Into<Path>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("root");
        }
        let parts: Vec<String> = self.0.iter().map(|ix| ix.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

/// A position in the tree. On a text node `offset` is a byte offset; on an
/// element (or the root, with an empty path) it is a child index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }

    fn order_key(&self) -> Vec<usize> {
        let mut key = self.path.clone();
        key.push(self.offset);
        key
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSelection {
    pub anchor: Point,
    pub focus: Point,
}

impl RangeSelection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// True when the focus precedes the anchor in document order.
    pub fn is_backward(&self) -> bool {
        self.focus.order_key() < self.anchor.order_key()
    }

    pub fn ordered(&self) -> (&Point, &Point) {
        if self.is_backward() {
            (&self.focus, &self.anchor)
        } else {
            (&self.anchor, &self.focus)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionState {
    Range(RangeSelection),
    Node { keys: Vec<NodeKey> },
    #[default]
    None,
}

impl SelectionState {
    pub fn as_range(&self) -> Option<&RangeSelection> {
        match self {
            SelectionState::Range(range) => Some(range),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, SelectionState::None)
    }
}

impl From<RangeSelection> for SelectionState {
    fn from(value: RangeSelection) -> Self {
        SelectionState::Range(value)
    }
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: SelectionState,
    pub selection_after: SelectionState,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct EditorConfig {
    #[serde(default)]
    pub max_undo: usize,
    #[serde(default)]
    pub max_normalize_iterations: usize,
}

impl EditorConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        self
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("update listener failed: {0}")]
    Listener(#[from] ListenerError),
}

pub struct Editor {
    state: EditorState,
    registry: PluginRegistry,
    config: EditorConfig,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    listeners: Rc<RefCell<ListenerRegistry>>,
    root_element: Option<ElementHandle>,
}

impl Editor {
    pub fn new(
        doc: Document,
        selection: impl Into<SelectionState>,
        registry: PluginRegistry,
    ) -> Self {
        Self::with_config(doc, selection, registry, EditorConfig::default())
    }

    pub fn with_config(
        doc: Document,
        selection: impl Into<SelectionState>,
        registry: PluginRegistry,
        config: EditorConfig,
    ) -> Self {
        let mut editor = Self {
            state: EditorState::new(doc, selection.into()),
            registry,
            config: config.with_defaults(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            listeners: Rc::new(RefCell::new(ListenerRegistry::default())),
            root_element: None,
        };
        editor.normalize_in_place();
        editor
    }

    pub fn with_core_plugins() -> Self {
        Self::empty(PluginRegistry::core())
    }

    pub fn with_richtext_plugins() -> Self {
        Self::empty(PluginRegistry::richtext())
    }

    fn empty(registry: PluginRegistry) -> Self {
        let doc = Document {
            children: vec![Node::paragraph("")],
        };
        let selection = RangeSelection::collapsed(Point::new(vec![0, 0], 0));
        Self::new(doc, selection, registry)
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn doc(&self) -> &Document {
        self.state.doc()
    }

    pub fn selection(&self) -> &SelectionState {
        self.state.selection()
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn read<R>(&self, f: impl FnOnce(&ReadContext<'_>) -> R) -> R {
        self.state.read(f)
    }

    pub fn view(&self) -> EditorView<'_> {
        EditorView::new(&self.state, self.root_element)
    }

    pub fn root_element(&self) -> Option<ElementHandle> {
        self.root_element
    }

    pub fn set_root_element(&mut self, root_element: Option<ElementHandle>) {
        self.root_element = root_element;
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Runs `f` as the write phase. Either every op applied inside `f`
    /// commits and listeners are notified, or none of them do.
    pub fn update<R>(
        &mut self,
        f: impl FnOnce(&mut UpdateScope<'_>) -> Result<R, UpdateError>,
    ) -> Result<R, UpdateError> {
        let selection_before = self.state.selection.clone();
        let mut scope = UpdateScope {
            state: &mut self.state,
            registry: &self.registry,
            config: &self.config,
            inverse_ops: Vec::new(),
        };
        let result = f(&mut scope);
        let mut inverse_ops = scope.inverse_ops;

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, ops = inverse_ops.len(), "update failed, rolling back");
                self.rollback(inverse_ops, selection_before);
                return Err(err);
            }
        };

        let selection_changed = self.state.selection != selection_before;
        if inverse_ops.is_empty() && !selection_changed {
            return Ok(value);
        }

        if !inverse_ops.is_empty() {
            inverse_ops.reverse();
            debug!(ops = inverse_ops.len(), "update committed");
            self.undo_stack.push(UndoRecord {
                inverse_ops,
                selection_before,
                selection_after: self.state.selection.clone(),
            });
            self.redo_stack.clear();
            if self.undo_stack.len() > self.config.max_undo {
                self.undo_stack.remove(0);
            }
        }

        self.notify()?;
        Ok(value)
    }

    pub fn apply(&mut self, tx: Transaction) -> Result<(), UpdateError> {
        self.update(|scope| Ok(scope.apply(tx)?))
    }

    pub fn set_selection(
        &mut self,
        selection: impl Into<SelectionState>,
    ) -> Result<(), UpdateError> {
        let selection = selection.into();
        let changed = self.update(|scope| {
            let before = scope.selection().clone();
            scope.set_selection(selection);
            Ok(*scope.selection() != before)
        })?;
        if changed {
            self.dispatch_command(SELECTION_CHANGE_COMMAND, Value::Null)?;
        }
        Ok(())
    }

    pub fn click(&mut self) -> Result<(), UpdateError> {
        self.dispatch_command(CLICK_COMMAND, Value::Null).map(|_| ())
    }

    pub fn undo(&mut self) -> Result<bool, UpdateError> {
        let Some(record) = self.undo_stack.pop() else {
            return Ok(false);
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let redo_ops = self.replay(inverse_ops);
        self.state.selection = selection_before.clone();
        self.normalize_in_place();

        self.redo_stack.push(UndoRecord {
            selection_before,
            selection_after,
            inverse_ops: redo_ops,
        });
        self.notify()?;
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool, UpdateError> {
        let Some(record) = self.redo_stack.pop() else {
            return Ok(false);
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let undo_ops = self.replay(inverse_ops);
        self.state.selection = selection_after.clone();
        self.normalize_in_place();

        self.undo_stack.push(UndoRecord {
            selection_before,
            selection_after,
            inverse_ops: undo_ops,
        });
        self.notify()?;
        Ok(true)
    }

    fn replay(&mut self, ops: Vec<Op>) -> Vec<Op> {
        let mut inverse: Vec<Op> = Vec::new();
        for op in ops {
            match apply_op_to(&mut self.state.doc, &mut self.state.selection, op) {
                Ok(inv) => inverse.push(inv),
                Err(err) => {
                    // Stop mutating once the history no longer matches the tree.
                    error!(error = %err, "failed to replay history op");
                    break;
                }
            }
        }
        inverse.reverse();
        inverse
    }

    fn rollback(&mut self, inverse_ops: Vec<Op>, selection_before: SelectionState) {
        for op in inverse_ops.into_iter().rev() {
            if let Err(err) = apply_op_to(&mut self.state.doc, &mut self.state.selection, op) {
                error!(error = %err, "rollback op failed");
                break;
            }
        }
        self.state.selection = selection_before;
    }

    pub fn register_update_listener(
        &self,
        listener: impl Fn(&EditorView<'_>) -> Result<(), ListenerError> + 'static,
    ) -> Subscription {
        let listener: UpdateListener = Rc::new(listener);
        ListenerRegistry::add_update_listener(&self.listeners, listener)
    }

    pub fn register_command(
        &self,
        id: &str,
        priority: CommandPriority,
        handler: impl Fn(&Value, &EditorView<'_>) -> Result<bool, CommandError> + 'static,
    ) -> Subscription {
        let handler: CommandHandler = Rc::new(handler);
        ListenerRegistry::add_command_handler(&self.listeners, id, priority, handler)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Offers `payload` to registered handlers by priority, then falls back to
    /// the plugin command with the same id. Returns whether anything handled it.
    pub fn dispatch_command(&mut self, id: &str, payload: Value) -> Result<bool, UpdateError> {
        let handlers = self.listeners.borrow().command_handlers(id);
        trace!(command = id, handlers = handlers.len(), "dispatch");
        {
            let view = self.view();
            for handler in handlers {
                if handler(&payload, &view)? {
                    return Ok(true);
                }
            }
        }

        let Some(command) = self.registry.command(id) else {
            return Ok(false);
        };
        debug!(command = id, "running plugin command");
        self.update(|scope| (command.handler)(scope, Some(payload)).map_err(UpdateError::from))?;
        Ok(true)
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<(), UpdateError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::new(format!("Unknown command: {id}")).into());
        };
        self.update(|scope| (command.handler)(scope, args).map_err(UpdateError::from))
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::new(format!("Unknown query: {id}")));
        };
        self.state.read(|ctx| (query.handler)(ctx, args))
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value)
            .map_err(|err| QueryError::new(format!("Failed to decode query result: {err}")))
    }

    fn notify(&self) -> Result<(), UpdateError> {
        let listeners = self.listeners.borrow().update_listeners();
        let view = self.view();
        let mut first_error: Option<ListenerError> = None;
        for listener in listeners {
            if let Err(err) = listener(&view) {
                error!(error = %err, "update listener failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn normalize_in_place(&mut self) {
        let mut ops_applied = 0usize;
        for _ in 0..self.config.max_normalize_iterations {
            let ops = self.registry.normalize(&self.state.doc);
            if ops.is_empty() {
                break;
            }
            for op in ops {
                match apply_op_to(&mut self.state.doc, &mut self.state.selection, op) {
                    Ok(_) => ops_applied += 1,
                    Err(err) => {
                        warn!(error = %err, "normalize op failed");
                        return;
                    }
                }
            }
        }
        trace!(ops = ops_applied, "normalized in place");
        self.state.selection = self
            .registry
            .normalize_selection(&self.state.doc, &self.state.selection);
    }
}

/// Write-phase handle passed to [`Editor::update`].
pub struct UpdateScope<'a> {
    state: &'a mut EditorState,
    registry: &'a PluginRegistry,
    config: &'a EditorConfig,
    inverse_ops: Vec<Op>,
}

impl UpdateScope<'_> {
    pub fn doc(&self) -> &Document {
        &self.state.doc
    }

    pub fn selection(&self) -> &SelectionState {
        &self.state.selection
    }

    pub fn registry(&self) -> &PluginRegistry {
        self.registry
    }

    pub fn read<R>(&self, f: impl FnOnce(&ReadContext<'_>) -> R) -> R {
        self.state.read(f)
    }

    pub fn set_selection(&mut self, selection: SelectionState) {
        self.state.selection = self.registry.normalize_selection(&self.state.doc, &selection);
    }

    /// Places a collapsed selection at the end of the root.
    pub fn select_root(&mut self) {
        let end = Point::new(Vec::new(), self.state.doc.children.len());
        self.state.selection = SelectionState::Range(RangeSelection::collapsed(end));
    }

    pub fn apply(&mut self, tx: Transaction) -> Result<(), ApplyError> {
        trace!(ops = tx.ops.len(), "apply transaction");

        for op in tx.ops {
            trace!(op = op.name(), path = ?op.path(), "apply op");
            let inv = apply_op_to(&mut self.state.doc, &mut self.state.selection, op)?;
            self.inverse_ops.push(inv);
        }

        if let Some(sel) = tx.selection_after {
            self.state.selection = SelectionState::Range(sel);
        }

        self.normalize()?;
        self.state.selection = self
            .registry
            .normalize_selection(&self.state.doc, &self.state.selection);
        Ok(())
    }

    /// Inserts `nodes` at the selection. Consecutive inline nodes are wrapped
    /// in a paragraph; a pristine document is replaced by the new blocks.
    pub fn insert_nodes(&mut self, nodes: Vec<Node>) -> Result<(), ApplyError> {
        let blocks = group_into_blocks(nodes);
        if blocks.is_empty() {
            return Ok(());
        }

        let mut ops: Vec<Op> = Vec::new();
        let insert_at = if self.state.doc.is_pristine() {
            for ix in (0..self.state.doc.children.len()).rev() {
                ops.push(Op::RemoveNode { path: vec![ix] });
            }
            0
        } else {
            match &self.state.selection {
                SelectionState::Range(range) => match range.focus.path.first() {
                    None => range.focus.offset.min(self.state.doc.children.len()),
                    Some(&block) => block + 1,
                },
                _ => self.state.doc.children.len(),
            }
        };

        let count = blocks.len();
        for (ix, block) in blocks.into_iter().enumerate() {
            ops.push(Op::InsertNode {
                path: vec![insert_at + ix],
                node: block,
            });
        }

        let last_block = insert_at + count - 1;
        self.apply(Transaction::new(ops))?;
        let end = end_point_of_block(&self.state.doc, last_block)
            .unwrap_or_else(|| Point::new(Vec::new(), self.state.doc.children.len()));
        self.state.selection = SelectionState::Range(RangeSelection::collapsed(end));
        Ok(())
    }

    fn normalize(&mut self) -> Result<(), ApplyError> {
        for _ in 0..self.config.max_normalize_iterations {
            let ops = self.registry.normalize(&self.state.doc);
            if ops.is_empty() {
                return Ok(());
            }
            for op in ops {
                let inv = apply_op_to(&mut self.state.doc, &mut self.state.selection, op)?;
                self.inverse_ops.push(inv);
            }
        }
        Err(ApplyError::NormalizeDidNotConverge)
    }
}

fn group_into_blocks(nodes: Vec<Node>) -> Vec<Node> {
    let mut blocks: Vec<Node> = Vec::new();
    let mut inline_run: Vec<Node> = Vec::new();
    for node in nodes {
        if node.is_inline() {
            inline_run.push(node);
            continue;
        }
        if !inline_run.is_empty() {
            blocks.push(Node::element(PARAGRAPH_KIND, std::mem::take(&mut inline_run)));
        }
        blocks.push(node);
    }
    if !inline_run.is_empty() {
        blocks.push(Node::element(PARAGRAPH_KIND, inline_run));
    }
    blocks
}

fn end_point_of_block(doc: &Document, block: usize) -> Option<Point> {
    fn last_text(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
        for (ix, node) in children.iter().enumerate().rev() {
            path.push(ix);
            match node {
                Node::Text(t) => return Some(Point::new(path.clone(), t.text.len())),
                Node::Element(el) => {
                    if let Some(point) = last_text(&el.children, path) {
                        return Some(point);
                    }
                }
            }
            path.pop();
        }
        None
    }

    let Node::Element(el) = doc.children.get(block)? else {
        return Some(Point::new(vec![block], 0));
    };
    last_text(&el.children, &mut vec![block])
}

pub(crate) fn apply_op_to(
    doc: &mut Document,
    selection: &mut SelectionState,
    op: Op,
) -> Result<Op, ApplyError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let text_node = node_text_mut(doc, &path)?;
            let offset = clamp_to_char_boundary(&text_node.text, offset);
            text_node.text.insert_str(offset, &text);
            if let SelectionState::Range(range) = selection {
                transform_selection_insert_text(range, &path, offset, text.len());
            }
            Ok(Op::RemoveText {
                path,
                range: offset..offset + text.len(),
            })
        }
        Op::RemoveText { path, range } => {
            let text_node = node_text_mut(doc, &path)?;
            let start =
                clamp_to_char_boundary(&text_node.text, range.start.min(text_node.text.len()));
            let end = clamp_to_char_boundary(&text_node.text, range.end.min(text_node.text.len()));
            if start >= end {
                return Ok(Op::InsertText {
                    path,
                    offset: start,
                    text: String::new(),
                });
            }
            let removed = text_node.text[start..end].to_string();
            text_node.text.replace_range(start..end, "");
            if let SelectionState::Range(range) = selection {
                transform_selection_remove_text(range, &path, start..end);
            }
            Ok(Op::InsertText {
                path,
                offset: start,
                text: removed,
            })
        }
        Op::InsertNode { path, node } => {
            insert_node(doc, &path, node)?;
            if let SelectionState::Range(range) = selection {
                transform_selection_insert_node(range, &path);
            }
            Ok(Op::RemoveNode { path })
        }
        Op::RemoveNode { path } => {
            let removed = remove_node(doc, &path)?;
            if let SelectionState::Range(range) = selection {
                transform_selection_remove_node(range, &path, &removed, doc);
            }
            Ok(Op::InsertNode {
                path,
                node: removed,
            })
        }
        Op::SetNodeAttrs { path, patch } => {
            let node = node_mut(doc, &path)?;
            let old = match node {
                Node::Element(el) => patch.apply_to(&mut el.attrs),
                Node::Text(_) => return Err(PathError("Text has no attrs".into()).into()),
            };
            Ok(Op::SetNodeAttrs { path, patch: old })
        }
    }
}

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

fn transform_selection_insert_text(
    selection: &mut RangeSelection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(
    selection: &mut RangeSelection,
    path: &[usize],
    range: std::ops::Range<usize>,
) {
    let removed_len = range.end.saturating_sub(range.start);
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path != path {
            continue;
        }
        if point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset = point.offset.saturating_sub(removed_len);
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_insert_node(selection: &mut RangeSelection, path: &[usize]) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() {
            continue;
        }
        if !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        if point.path[depth] >= index {
            point.path[depth] += 1;
        }
    }
}

fn transform_selection_remove_node(
    selection: &mut RangeSelection,
    path: &[usize],
    removed: &Node,
    doc_after_remove: &Document,
) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };

    let merge_prefix_len = match (removed, index.checked_sub(1)) {
        (Node::Text(removed_text), Some(left_index)) => {
            let mut left_path = parent_path.to_vec();
            left_path.push(left_index);
            match doc_after_remove.node(&left_path) {
                Some(Node::Text(left_text)) if left_text.text.ends_with(&removed_text.text) => {
                    Some(left_text.text.len().saturating_sub(removed_text.text.len()))
                }
                _ => None,
            }
        }
        _ => None,
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() {
            continue;
        }
        if !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        let ix = point.path[depth];
        if ix > index {
            point.path[depth] = ix - 1;
            continue;
        }
        if ix < index {
            continue;
        }

        // Point was inside the removed subtree. Map it to a nearby point.
        if let (Some(prefix), Node::Text(removed_text), Some(left_index)) =
            (merge_prefix_len, removed, index.checked_sub(1))
        {
            point.path.truncate(depth + 1);
            point.path[depth] = left_index;
            point.offset = (prefix + point.offset).min(prefix + removed_text.text.len());
        } else {
            point.path.truncate(depth + 1);
            point.path[depth] = index.saturating_sub(1);
            point.offset = 0;
        }
    }
}

fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, PathError> {
    let Some((&first, rest)) = path.split_first() else {
        return Err(PathError("Empty path".into()));
    };

    let len = doc.children.len();
    let mut node = doc
        .children
        .get_mut(first)
        .ok_or_else(|| PathError(format!("Path out of bounds at depth 0: {first} >= {len}")))?;

    for (depth, &ix) in rest.iter().enumerate() {
        node = match node {
            Node::Element(el) => {
                let len = el.children.len();
                el.children.get_mut(ix).ok_or_else(|| {
                    PathError(format!(
                        "Path out of bounds at depth {}: {ix} >= {len}",
                        depth + 1
                    ))
                })?
            }
            Node::Text(_) => {
                return Err(PathError(format!("Non-container node at depth {depth}")));
            }
        };
    }

    Ok(node)
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, PathError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        Node::Element(_) => Err(PathError("Expected Text node".into())),
    }
}

fn children_mut<'a>(
    doc: &'a mut Document,
    parent_path: &[usize],
) -> Result<&'a mut Vec<Node>, PathError> {
    if parent_path.is_empty() {
        return Ok(&mut doc.children);
    }
    match node_mut(doc, parent_path)? {
        Node::Element(el) => Ok(&mut el.children),
        Node::Text(_) => Err(PathError("Parent is not a container".into())),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty insert path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index > children.len() {
        return Err(PathError(format!(
            "Insert index out of bounds: {index} > {}",
            children.len()
        )));
    }
    children.insert(index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty remove path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index >= children.len() {
        return Err(PathError(format!(
            "Remove index out of bounds: {index} >= {}",
            children.len()
        )));
    }
    Ok(children.remove(index))
}
