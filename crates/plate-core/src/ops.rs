use std::ops::Range;

use serde_json::Value;
use thiserror::Error;

use crate::core::{Attrs, Node, RangeSelection};

pub type Path = Vec<usize>;

/// One structural edit. Applying an op yields the op that undoes it.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    InsertText {
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        path: Path,
        node: Node,
    },
    RemoveNode {
        path: Path,
    },
    SetNodeAttrs {
        path: Path,
        patch: AttrPatch,
    },
}

impl Op {
    /// Swaps the node at `path` for `node` as a remove/insert pair.
    pub fn replace_node(path: Path, node: Node) -> [Op; 2] {
        [
            Op::RemoveNode { path: path.clone() },
            Op::InsertNode { path, node },
        ]
    }

    pub fn path(&self) -> &[usize] {
        match self {
            Op::InsertText { path, .. }
            | Op::RemoveText { path, .. }
            | Op::InsertNode { path, .. }
            | Op::RemoveNode { path }
            | Op::SetNodeAttrs { path, .. } => path,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::InsertText { .. } => "insert_text",
            Op::RemoveText { .. } => "remove_text",
            Op::InsertNode { .. } => "insert_node",
            Op::RemoveNode { .. } => "remove_node",
            Op::SetNodeAttrs { .. } => "set_node_attrs",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrPatch {
    pub set: Attrs,
    pub remove: Vec<String>,
}

impl AttrPatch {
    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut set = Attrs::new();
        set.insert(key.into(), value.into());
        Self {
            set,
            remove: Vec::new(),
        }
    }

    /// Writes the patch into `attrs` and returns the patch restoring them.
    pub(crate) fn apply_to(&self, attrs: &mut Attrs) -> AttrPatch {
        let mut undo = AttrPatch::default();
        for (key, value) in &self.set {
            match attrs.insert(key.clone(), value.clone()) {
                Some(prev) => {
                    undo.set.insert(key.clone(), prev);
                }
                None => undo.remove.push(key.clone()),
            }
        }
        for key in &self.remove {
            if let Some(prev) = attrs.remove(key) {
                undo.set.insert(key.clone(), prev);
            }
        }
        undo
    }
}

/// Ops applied together, recorded as one undo step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    pub ops: Vec<Op>,
    /// Replaces the mapped selection once every op has been applied.
    pub selection_after: Option<RangeSelection>,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            selection_after: None,
        }
    }

    pub fn selection_after(mut self, selection_after: RangeSelection) -> Self {
        self.selection_after = Some(selection_after);
        self
    }
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PathError(pub String);

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),
    #[error("normalization did not converge")]
    NormalizeDidNotConverge,
}
