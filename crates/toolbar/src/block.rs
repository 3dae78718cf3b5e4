use std::fmt;

use manos_plate_core::{HeadingTag, NodeKind, NodeRef};
use serde::{Deserialize, Serialize};

use crate::{SelectionSnapshot, ToolbarError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    #[default]
    Paragraph,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
}

impl BlockType {
    pub const ALL: [BlockType; 7] = [
        BlockType::Paragraph,
        BlockType::H1,
        BlockType::H2,
        BlockType::H3,
        BlockType::H4,
        BlockType::H5,
        BlockType::H6,
    ];

    pub fn as_str(self) -> &'static str {
        match self.heading_tag() {
            Some(tag) => tag.as_str(),
            None => "paragraph",
        }
    }

    /// Human readable name, used for button titles.
    pub fn label(self) -> &'static str {
        match self {
            BlockType::Paragraph => "Paragraph",
            BlockType::H1 => "Heading 1",
            BlockType::H2 => "Heading 2",
            BlockType::H3 => "Heading 3",
            BlockType::H4 => "Heading 4",
            BlockType::H5 => "Heading 5",
            BlockType::H6 => "Heading 6",
        }
    }

    pub fn heading_tag(self) -> Option<HeadingTag> {
        match self {
            BlockType::Paragraph => None,
            BlockType::H1 => Some(HeadingTag::H1),
            BlockType::H2 => Some(HeadingTag::H2),
            BlockType::H3 => Some(HeadingTag::H3),
            BlockType::H4 => Some(HeadingTag::H4),
            BlockType::H5 => Some(HeadingTag::H5),
            BlockType::H6 => Some(HeadingTag::H6),
        }
    }

    pub fn from_node_type(node_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|block_type| block_type.as_str() == node_type)
    }
}

impl From<HeadingTag> for BlockType {
    fn from(tag: HeadingTag) -> Self {
        match tag {
            HeadingTag::H1 => BlockType::H1,
            HeadingTag::H2 => BlockType::H2,
            HeadingTag::H3 => BlockType::H3,
            HeadingTag::H4 => BlockType::H4,
            HeadingTag::H5 => BlockType::H5,
            HeadingTag::H6 => BlockType::H6,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The root itself, or the element directly under the root that contains
/// `node`.
pub fn block_ancestor<'a>(node: &NodeRef<'a>) -> Result<NodeRef<'a>, ToolbarError> {
    if node.is_root() {
        return Ok(node.clone());
    }
    let missing = || ToolbarError::Invariant(format!("node {} has no block ancestor", node.key()));
    let block = node.top_level_element().ok_or_else(missing)?;
    match block.kind() {
        NodeKind::Text { .. } | NodeKind::Root => Err(missing()),
        _ => Ok(block),
    }
}

pub fn classify_block(selection: &SelectionSnapshot<'_>) -> Result<BlockType, ToolbarError> {
    let block = block_ancestor(&selection.anchor)?;
    Ok(match block.kind() {
        NodeKind::Heading { tag } => BlockType::from(tag),
        _ => BlockType::from_node_type(block.node_type()).unwrap_or_default(),
    })
}
