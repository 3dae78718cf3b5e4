use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::{
    Document, ElementNode, HEADING_KIND, HeadingTag, LINK_KIND, Node, PARAGRAPH_KIND,
    Point, RangeSelection, SelectionState, TextNode, UpdateScope,
};
use crate::listener::{SET_HEADING_COMMAND, TOGGLE_LINK_COMMAND, UNSET_HEADING_COMMAND};
use crate::ops::{AttrPatch, Op, Path, Transaction};
use crate::state::{NodeKind, ReadContext};

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type CommandFn =
    dyn Fn(&mut UpdateScope<'_>, Option<Value>) -> Result<(), CommandError> + Send + Sync;
pub type QueryFn =
    dyn Fn(&ReadContext<'_>, Option<Value>) -> Result<Value, QueryError> + Send + Sync;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub handler: std::sync::Arc<CommandFn>,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&mut UpdateScope<'_>, Option<Value>) -> Result<(), CommandError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: std::sync::Arc::new(handler),
        }
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: std::sync::Arc<QueryFn>,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&ReadContext<'_>, Option<Value>) -> Result<Value, QueryError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: std::sync::Arc::new(handler),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    None,
    BlockOnly,
    InlineOnly,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: String,
    pub children: ChildConstraint,
}

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op>;
}

pub trait PlatePlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn node_specs(&self) -> Vec<NodeSpec> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    node_specs: HashMap<String, NodeSpec>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn PlatePlugin>>) -> Result<Self, String> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    pub fn core() -> Self {
        let mut registry = Self::default();
        registry.register_builtin(Box::new(CoreParagraphPlugin));
        registry.register_builtin(Box::new(CoreNormalizePlugin));
        registry
    }

    pub fn richtext() -> Self {
        let mut registry = Self::core();
        registry.register_builtin(Box::new(HeadingPlugin));
        registry.register_builtin(Box::new(LinkPlugin));
        registry
    }

    // Built-in plugins use disjoint ids, so registration cannot collide.
    fn register_builtin(&mut self, plugin: Box<dyn PlatePlugin>) {
        if let Err(err) = self.register_plugin(plugin) {
            tracing::error!(error = %err, "built-in plugin rejected");
        }
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn PlatePlugin>) -> Result<(), String> {
        for spec in plugin.node_specs() {
            if self.node_specs.contains_key(&spec.kind) {
                return Err(format!("Duplicate node spec kind: {}", spec.kind));
            }
            self.node_specs.insert(spec.kind.clone(), spec);
        }

        self.normalize_passes.extend(plugin.normalize_passes());

        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(format!("Duplicate command id: {}", cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(format!("Duplicate query id: {}", query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        tracing::trace!(plugin = plugin.id(), "registered plugin");
        Ok(())
    }

    pub fn node_specs(&self) -> &HashMap<String, NodeSpec> {
        &self.node_specs
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    /// Ops of the first pass that still has work. Passes never see each
    /// other's pending ops, so their paths stay valid.
    pub fn normalize(&self, doc: &Document) -> Vec<Op> {
        for pass in &self.normalize_passes {
            let ops = pass.run(doc, self);
            if !ops.is_empty() {
                tracing::trace!(pass = pass.id(), ops = ops.len(), "normalize");
                return ops;
            }
        }
        Vec::new()
    }

    pub fn normalize_selection(
        &self,
        doc: &Document,
        selection: &SelectionState,
    ) -> SelectionState {
        match selection {
            SelectionState::None => SelectionState::None,
            SelectionState::Node { keys } => {
                let keys: Vec<_> = keys
                    .iter()
                    .filter(|key| doc.node(key.path()).is_some())
                    .cloned()
                    .collect();
                if keys.is_empty() {
                    SelectionState::None
                } else {
                    SelectionState::Node { keys }
                }
            }
            SelectionState::Range(range) => {
                let fallback = first_text_point(doc).unwrap_or(Point {
                    path: Vec::new(),
                    offset: 0,
                });

                let anchor = normalize_point(doc, &range.anchor).unwrap_or_else(|| {
                    normalize_point(doc, &range.focus).unwrap_or_else(|| fallback.clone())
                });
                let focus = normalize_point(doc, &range.focus).unwrap_or_else(|| anchor.clone());

                SelectionState::Range(RangeSelection { anchor, focus })
            }
        }
    }

    pub fn is_known_kind(&self, kind: &str) -> bool {
        self.node_specs.contains_key(kind)
    }

    fn children_constraint(&self, kind: &str) -> ChildConstraint {
        self.node_specs
            .get(kind)
            .map(|s| s.children.clone())
            .unwrap_or(ChildConstraint::Any)
    }
}

fn first_text_point(doc: &Document) -> Option<Point> {
    fn walk(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(_) => {
                    let point = Point {
                        path: path.clone(),
                        offset: 0,
                    };
                    path.pop();
                    return Some(point);
                }
                Node::Element(el) => {
                    if let Some(point) = walk(&el.children, path) {
                        path.pop();
                        return Some(point);
                    }
                }
            }
            path.pop();
        }
        None
    }

    walk(&doc.children, &mut Vec::new())
}

/// Keeps points that still resolve (clamping their offset); otherwise walks
/// down the surviving prefix of the path to the nearest text leaf.
fn normalize_point(doc: &Document, point: &Point) -> Option<Point> {
    if point.path.is_empty() {
        return Some(Point {
            path: Vec::new(),
            offset: point.offset.min(doc.children.len()),
        });
    }

    match doc.node(&point.path) {
        Some(Node::Text(t)) => {
            return Some(Point {
                path: point.path.clone(),
                offset: crate::core::clamp_to_char_boundary(&t.text, point.offset),
            });
        }
        Some(Node::Element(el)) => {
            return Some(Point {
                path: point.path.clone(),
                offset: point.offset.min(el.children.len()),
            });
        }
        None => {}
    }

    if doc.children.is_empty() {
        return None;
    }

    fn first_text_descendant(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(_) => {
                    let point = Point {
                        path: path.clone(),
                        offset: 0,
                    };
                    path.pop();
                    return Some(point);
                }
                Node::Element(el) => {
                    if let Some(point) = first_text_descendant(&el.children, path) {
                        path.pop();
                        return Some(point);
                    }
                }
            }
            path.pop();
        }
        None
    }

    let mut resolved_path: Vec<usize> = Vec::new();
    let mut children: &[Node] = &doc.children;

    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        resolved_path.push(ix);
        match &children[ix] {
            Node::Text(t) => {
                return Some(Point {
                    path: resolved_path,
                    offset: point.offset.min(t.text.len()),
                });
            }
            Node::Element(el) => {
                children = &el.children;
            }
        }
    }

    match doc.node(&resolved_path)? {
        Node::Text(t) => Some(Point {
            path: resolved_path,
            offset: point.offset.min(t.text.len()),
        }),
        Node::Element(el) => first_text_descendant(&el.children, &mut resolved_path),
    }
}

struct CoreParagraphPlugin;

impl PlatePlugin for CoreParagraphPlugin {
    fn id(&self) -> &'static str {
        "core.paragraph"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: PARAGRAPH_KIND.to_string(),
            children: ChildConstraint::InlineOnly,
        }]
    }
}

struct CoreNormalizePlugin;

impl PlatePlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureNonEmptyDocument),
            Box::new(WrapInlineRootChildren),
            Box::new(EnsureTextBlocksHaveLeaf),
            Box::new(MergeAdjacentTextLeaves),
        ]
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

/// Text and links directly under the root get wrapped in a paragraph.
struct WrapInlineRootChildren;

impl NormalizePass for WrapInlineRootChildren {
    fn id(&self) -> &'static str {
        "core.wrap_inline_root_children"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        let Some(start) = doc.children.iter().position(Node::is_inline) else {
            return Vec::new();
        };
        let end = doc.children[start..]
            .iter()
            .position(|node| !node.is_inline())
            .map_or(doc.children.len(), |len| start + len);

        let mut ops: Vec<Op> = (start..end)
            .rev()
            .map(|ix| Op::RemoveNode { path: vec![ix] })
            .collect();
        ops.push(Op::InsertNode {
            path: vec![start],
            node: Node::element(PARAGRAPH_KIND, doc.children[start..end].to_vec()),
        });
        ops
    }
}

struct EnsureTextBlocksHaveLeaf;

impl NormalizePass for EnsureTextBlocksHaveLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_text_blocks_have_leaf"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        doc.children
            .iter()
            .enumerate()
            .filter_map(|(ix, node)| match node {
                Node::Element(el)
                    if el.children.is_empty()
                        && registry.children_constraint(&el.kind) != ChildConstraint::BlockOnly =>
                {
                    Some(Op::InsertNode {
                        path: vec![ix, 0],
                        node: Node::text(""),
                    })
                }
                _ => None,
            })
            .collect()
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn merge_children(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            let mut ix = children.len();
            while ix > 0 {
                ix -= 1;
                if !matches!(children[ix], Node::Text(_)) {
                    continue;
                }

                let mut start = ix;
                while start > 0 && matches!(children[start - 1], Node::Text(_)) {
                    start -= 1;
                }
                if start == ix {
                    continue;
                }

                let Some(Node::Text(first)) = children.get(start) else {
                    continue;
                };
                let appended: String = children[start + 1..=ix]
                    .iter()
                    .map(Node::text_content)
                    .collect();

                if !appended.is_empty() {
                    let mut insert_text_path = path.clone();
                    insert_text_path.push(start);
                    ops.push(Op::InsertText {
                        path: insert_text_path,
                        offset: first.text.len(),
                        text: appended,
                    });
                }

                for remove_ix in (start + 1..=ix).rev() {
                    let mut remove_path = path.clone();
                    remove_path.push(remove_ix);
                    ops.push(Op::RemoveNode { path: remove_path });
                }

                ix = start;
            }
        }

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);
                walk(&el.children, path, ops);
                merge_children(&el.children, path, ops);
                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

struct HeadingPlugin;

impl PlatePlugin for HeadingPlugin {
    fn id(&self) -> &'static str {
        "heading"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: HEADING_KIND.to_string(),
            children: ChildConstraint::InlineOnly,
        }]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeHeadingLevels)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new(SET_HEADING_COMMAND, |scope, args| {
                let tag = parse_heading_args(args.as_ref())?;
                let tx = set_heading(scope, tag).map_err(CommandError::new)?;
                if tx.ops.is_empty() {
                    return Ok(());
                }
                scope
                    .apply(tx)
                    .map_err(|e| CommandError::new(format!("Failed to set heading: {e}")))
            }),
            CommandSpec::new(UNSET_HEADING_COMMAND, |scope, _args| {
                let tx = unset_heading(scope).map_err(CommandError::new)?;
                if tx.ops.is_empty() {
                    return Ok(());
                }
                scope
                    .apply(tx)
                    .map_err(|e| CommandError::new(format!("Failed to unset heading: {e}")))
            }),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("block.heading_level", |ctx, _args| {
            Ok(active_heading_level(ctx))
        })]
    }
}

struct NormalizeHeadingLevels;

impl NormalizePass for NormalizeHeadingLevels {
    fn id(&self) -> &'static str {
        "heading.normalize_levels"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        doc.children
            .iter()
            .enumerate()
            .filter_map(|(ix, node)| {
                let Node::Element(el) = node else {
                    return None;
                };
                if el.kind != HEADING_KIND {
                    return None;
                }
                let current = el.attrs.get("level").and_then(|v| v.as_u64());
                let level = current.unwrap_or(1).clamp(1, 6);
                if current == Some(level) {
                    return None;
                }
                Some(Op::SetNodeAttrs {
                    path: vec![ix],
                    patch: AttrPatch::set("level", level),
                })
            })
            .collect()
    }
}

struct LinkPlugin;

impl PlatePlugin for LinkPlugin {
    fn id(&self) -> &'static str {
        "link"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: LINK_KIND.to_string(),
            children: ChildConstraint::InlineOnly,
        }]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(RemoveEmptyLinks)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new(TOGGLE_LINK_COMMAND, |scope, args| {
                let url = parse_link_payload(args.as_ref())?;
                let tx = toggle_link(scope, url).map_err(CommandError::new)?;
                if tx.ops.is_empty() {
                    return Ok(());
                }
                scope
                    .apply(tx)
                    .map_err(|e| CommandError::new(format!("Failed to toggle link: {e}")))
            }),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("link.active_url", |ctx, _args| {
            Ok(active_link_url(ctx))
        })]
    }
}

struct RemoveEmptyLinks;

impl NormalizePass for RemoveEmptyLinks {
    fn id(&self) -> &'static str {
        "link.remove_empty"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        for (block_ix, block) in doc.children.iter().enumerate() {
            let Node::Element(block) = block else {
                continue;
            };
            let empty = block.children.iter().rposition(|child| {
                matches!(child, Node::Element(el) if el.kind == LINK_KIND)
                    && child.text_content().is_empty()
            });
            if let Some(ix) = empty {
                return vec![Op::RemoveNode {
                    path: vec![block_ix, ix],
                }];
            }
        }
        Vec::new()
    }
}

fn parse_heading_args(args: Option<&Value>) -> Result<HeadingTag, CommandError> {
    let args = args.ok_or_else(|| CommandError::new("Missing heading level"))?;
    if let Some(tag) = args.get("tag").and_then(|v| v.as_str()) {
        return HeadingTag::parse(tag)
            .ok_or_else(|| CommandError::new(format!("Unknown heading tag: {tag}")));
    }
    let level = args
        .get("level")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| CommandError::new("Missing heading level"))?;
    HeadingTag::from_level(level)
        .ok_or_else(|| CommandError::new(format!("Heading level out of range: {level}")))
}

/// `null` or `""` removes; a string or `{ "url": .. }` sets. URLs are passed
/// through unvalidated.
fn parse_link_payload(args: Option<&Value>) -> Result<Option<String>, CommandError> {
    let url = match args {
        None | Some(Value::Null) => None,
        Some(Value::String(url)) => Some(url.clone()),
        Some(Value::Object(map)) => match map.get("url") {
            None | Some(Value::Null) => None,
            Some(Value::String(url)) => Some(url.clone()),
            Some(other) => {
                return Err(CommandError::new(format!("Invalid link url: {other}")));
            }
        },
        Some(other) => return Err(CommandError::new(format!("Invalid link payload: {other}"))),
    };
    Ok(url.filter(|url| !url.is_empty()))
}

fn active_heading_level(ctx: &ReadContext<'_>) -> Value {
    let Some(range) = ctx.selection().as_range() else {
        return Value::Null;
    };
    let block = ctx
        .point_node(&range.focus)
        .and_then(|node| node.top_level_element());
    match block.map(|node| node.kind()) {
        Some(NodeKind::Heading { tag }) => Value::from(tag.level()),
        _ => Value::Null,
    }
}

fn active_link_url(ctx: &ReadContext<'_>) -> Value {
    let Some(range) = ctx.selection().as_range() else {
        return Value::Null;
    };
    let Some(node) = ctx.point_node(&range.focus) else {
        return Value::Null;
    };
    let parent_url = node.parent().and_then(|parent| match parent.kind() {
        NodeKind::Link { url } => Some(url),
        _ => None,
    });
    let own_url = match node.kind() {
        NodeKind::Link { url } => Some(url),
        _ => None,
    };
    parent_url
        .or(own_url)
        .map_or(Value::Null, |url| Value::String(url.to_string()))
}

/// Top-level blocks spanned by the selection, in document order.
fn selected_block_range(doc: &Document, range: &RangeSelection) -> Option<(usize, usize)> {
    let (start, end) = range.ordered();
    let (start_block, _) = point_block_offset(doc, start)?;
    let (end_block, _) = point_block_offset(doc, end)?;
    Some((start_block, end_block))
}

fn replace_block(ops: &mut Vec<Op>, block_ix: usize, node: Node) {
    ops.extend(Op::replace_node(vec![block_ix], node));
}

fn set_heading(scope: &UpdateScope<'_>, tag: HeadingTag) -> Result<Transaction, String> {
    let Some(range) = scope.selection().as_range().cloned() else {
        return Err("No range selection".into());
    };
    let doc = scope.doc();
    let (start, end) = selected_block_range(doc, &range).ok_or("No active block")?;

    let mut ops = Vec::new();
    for block_ix in start..=end {
        let Some(Node::Element(el)) = doc.children.get(block_ix) else {
            continue;
        };
        if scope.registry().children_constraint(&el.kind) != ChildConstraint::InlineOnly
            && scope.registry().is_known_kind(&el.kind)
        {
            continue;
        }
        if el.heading_tag() == Some(tag) {
            continue;
        }

        let mut attrs = el.attrs.clone();
        attrs.insert("level".to_string(), Value::from(tag.level()));
        let next = Node::Element(ElementNode {
            kind: HEADING_KIND.to_string(),
            attrs,
            children: el.children.clone(),
        });
        replace_block(&mut ops, block_ix, next);
    }

    Ok(Transaction::new(ops).selection_after(range))
}

fn unset_heading(scope: &UpdateScope<'_>) -> Result<Transaction, String> {
    let Some(range) = scope.selection().as_range().cloned() else {
        return Err("No range selection".into());
    };
    let doc = scope.doc();
    let (start, end) = selected_block_range(doc, &range).ok_or("No active block")?;

    let mut ops = Vec::new();
    for block_ix in start..=end {
        let Some(Node::Element(el)) = doc.children.get(block_ix) else {
            continue;
        };
        if el.kind != HEADING_KIND {
            continue;
        }
        let mut attrs = el.attrs.clone();
        attrs.remove("level");
        let next = Node::Element(ElementNode {
            kind: PARAGRAPH_KIND.to_string(),
            attrs,
            children: el.children.clone(),
        });
        replace_block(&mut ops, block_ix, next);
    }

    Ok(Transaction::new(ops).selection_after(range))
}

#[derive(Debug, Clone, PartialEq)]
struct InlineRun {
    text: String,
    link: Option<String>,
}

struct TextLeaf {
    path: Path,
    start: usize,
    len: usize,
}

fn block_runs(block: &ElementNode) -> Vec<InlineRun> {
    block
        .children
        .iter()
        .map(|child| match child {
            Node::Text(t) => InlineRun {
                text: t.text.clone(),
                link: None,
            },
            Node::Element(el) => InlineRun {
                text: child.text_content(),
                link: el.url().map(str::to_string),
            },
        })
        .collect()
}

fn block_leaves(block_ix: usize, children: &[Node]) -> Vec<TextLeaf> {
    fn walk(children: &[Node], path: &mut Vec<usize>, cursor: &mut usize, out: &mut Vec<TextLeaf>) {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(t) => {
                    out.push(TextLeaf {
                        path: path.clone(),
                        start: *cursor,
                        len: t.text.len(),
                    });
                    *cursor += t.text.len();
                }
                Node::Element(el) => walk(&el.children, path, cursor, out),
            }
            path.pop();
        }
    }

    let mut leaves = Vec::new();
    walk(children, &mut vec![block_ix], &mut 0, &mut leaves);
    leaves
}

/// Maps a point to `(block index, byte offset within the block's text)`.
fn point_block_offset(doc: &Document, point: &Point) -> Option<(usize, usize)> {
    let last_block = doc.children.len().checked_sub(1)?;
    let Some(&block_ix) = point.path.first() else {
        // Element point on the root: before child `offset`.
        if point.offset <= last_block {
            return Some((point.offset, 0));
        }
        let total = doc.children[last_block].text_content().len();
        return Some((last_block, total));
    };

    let Node::Element(block) = doc.children.get(block_ix)? else {
        return Some((block_ix, point.offset));
    };

    let mut point_key = point.path.clone();
    point_key.push(point.offset);

    let mut offset = 0usize;
    for leaf in block_leaves(block_ix, &block.children) {
        if leaf.path == point.path {
            offset += point.offset.min(leaf.len);
            break;
        }
        if leaf.path < point_key {
            offset += leaf.len;
        }
    }
    Some((block_ix, offset))
}

fn point_in_children(
    block_ix: usize,
    children: &[Node],
    offset: usize,
    prefer_next: bool,
) -> Point {
    let leaves = block_leaves(block_ix, children);
    let last = leaves.len().saturating_sub(1);
    for (ix, leaf) in leaves.iter().enumerate() {
        let end = leaf.start + leaf.len;
        let fits = if prefer_next {
            offset < end || (offset == end && ix == last)
        } else {
            offset <= end
        };
        if fits && offset >= leaf.start {
            return Point::new(leaf.path.clone(), offset - leaf.start);
        }
    }
    match leaves.last() {
        Some(leaf) => Point::new(leaf.path.clone(), leaf.len),
        None => Point::new(vec![block_ix], 0),
    }
}

fn apply_link_to_range(
    runs: Vec<InlineRun>,
    range: std::ops::Range<usize>,
    link: &Option<String>,
) -> Vec<InlineRun> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    for run in runs {
        let start = cursor;
        let end = cursor + run.text.len();
        cursor = end;

        let from = range.start.clamp(start, end) - start;
        let to = range.end.clamp(start, end) - start;
        let from = crate::core::clamp_to_char_boundary(&run.text, from);
        let to = crate::core::clamp_to_char_boundary(&run.text, to);
        if from >= to {
            out.push(run);
            continue;
        }

        out.push(InlineRun {
            text: run.text[..from].to_string(),
            link: run.link.clone(),
        });
        out.push(InlineRun {
            text: run.text[from..to].to_string(),
            link: link.clone(),
        });
        out.push(InlineRun {
            text: run.text[to..].to_string(),
            link: run.link,
        });
    }
    out
}

fn rebuild_inline_children(runs: Vec<InlineRun>) -> Vec<Node> {
    let mut merged: Vec<InlineRun> = Vec::new();
    for run in runs {
        if run.text.is_empty() {
            continue;
        }
        match merged.last_mut() {
            Some(prev) if prev.link == run.link => prev.text.push_str(&run.text),
            _ => merged.push(run),
        }
    }

    if merged.is_empty() {
        return vec![Node::Text(TextNode {
            text: String::new(),
        })];
    }

    merged
        .into_iter()
        .map(|run| match run.link {
            Some(url) => Node::link(url, run.text),
            None => Node::text(run.text),
        })
        .collect()
}

fn toggle_link(scope: &UpdateScope<'_>, url: Option<String>) -> Result<Transaction, String> {
    let Some(range) = scope.selection().as_range().cloned() else {
        return Err("No range selection".into());
    };
    let doc = scope.doc();
    let backward = range.is_backward();
    let (start, end) = range.ordered();
    let (start_block, start_offset) = point_block_offset(doc, start).ok_or("No active block")?;
    let (end_block, end_offset) = point_block_offset(doc, end).ok_or("No active block")?;

    let mut rebuilt: Vec<(usize, ElementNode)> = Vec::new();
    if range.is_collapsed() {
        // A caret edits (or removes) the whole link it sits in.
        let Some(Node::Element(block)) = doc.children.get(start_block) else {
            return Ok(Transaction::new(Vec::new()));
        };
        let mut runs = block_runs(block);
        // Runs line up with the block's children; the caret is in a link only
        // when its path goes through one.
        let hit = start
            .path
            .get(1)
            .copied()
            .filter(|&ix| runs.get(ix).is_some_and(|run| run.link.is_some()));
        let Some(ix) = hit else {
            return Ok(Transaction::new(Vec::new()));
        };
        if runs[ix].link == url {
            return Ok(Transaction::new(Vec::new()));
        }
        runs[ix].link = url;
        rebuilt.push((
            start_block,
            ElementNode {
                kind: block.kind.clone(),
                attrs: block.attrs.clone(),
                children: rebuild_inline_children(runs),
            },
        ));
    } else {
        for block_ix in start_block..=end_block {
            let Some(Node::Element(block)) = doc.children.get(block_ix) else {
                continue;
            };
            let runs = block_runs(block);
            let total: usize = runs.iter().map(|run| run.text.len()).sum();
            let from = if block_ix == start_block { start_offset } else { 0 };
            let to = if block_ix == end_block { end_offset } else { total };
            if from >= to {
                continue;
            }
            let children = rebuild_inline_children(apply_link_to_range(runs, from..to, &url));
            if children == block.children {
                continue;
            }
            rebuilt.push((
                block_ix,
                ElementNode {
                    kind: block.kind.clone(),
                    attrs: block.attrs.clone(),
                    children,
                },
            ));
        }
    }

    if rebuilt.is_empty() {
        return Ok(Transaction::new(Vec::new()));
    }

    let children_of = |block_ix: usize| -> Vec<Node> {
        rebuilt
            .iter()
            .find(|(ix, _)| *ix == block_ix)
            .map(|(_, el)| el.children.clone())
            .or_else(|| match doc.children.get(block_ix) {
                Some(Node::Element(el)) => Some(el.children.clone()),
                _ => None,
            })
            .unwrap_or_default()
    };
    let collapsed = range.is_collapsed();
    let new_start = point_in_children(
        start_block,
        &children_of(start_block),
        start_offset,
        !collapsed,
    );
    let new_end = point_in_children(end_block, &children_of(end_block), end_offset, false);
    let selection_after = if backward {
        RangeSelection::new(new_end, new_start)
    } else {
        RangeSelection::new(new_start, new_end)
    };

    let mut ops = Vec::new();
    for (block_ix, el) in rebuilt {
        replace_block(&mut ops, block_ix, Node::Element(el));
    }

    Ok(Transaction::new(ops).selection_after(selection_after))
}
