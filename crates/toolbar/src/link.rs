use manos_plate_core::{NodeKind, NodeRef};

use crate::SelectionSnapshot;

/// Link state shown by the floating editor. An empty `url` means the
/// selection is not inside a link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkState {
    pub url: String,
    pub edit_mode: bool,
}

impl LinkState {
    pub fn has_link(&self) -> bool {
        !self.url.is_empty()
    }
}

/// Picks one node to stand for the selection. When anchor and focus differ,
/// an endpoint sitting at the very end of its text run is skipped in favour
/// of the other one.
pub fn selected_node<'a>(selection: &SelectionSnapshot<'a>) -> NodeRef<'a> {
    if selection.anchor.key() == selection.focus.key() {
        return selection.anchor.clone();
    }
    let chosen = if selection.is_backward {
        if selection.focus_at_end {
            &selection.anchor
        } else {
            &selection.focus
        }
    } else if selection.anchor_at_end {
        &selection.focus
    } else {
        &selection.anchor
    };
    chosen.clone()
}

/// URL of the link that is `node`'s parent, or `node` itself.
pub fn enclosing_link_url<'a>(node: &NodeRef<'a>) -> Option<&'a str> {
    if let Some(NodeKind::Link { url }) = node.parent().map(|parent| parent.kind()) {
        return Some(url);
    }
    match node.kind() {
        NodeKind::Link { url } => Some(url),
        _ => None,
    }
}

pub fn resolve_link_url(selection: &SelectionSnapshot<'_>) -> String {
    let node = selected_node(selection);
    match enclosing_link_url(&node) {
        Some(url) => url.to_string(),
        None => {
            tracing::trace!(node = %node.key(), "selection is not inside a link");
            String::new()
        }
    }
}
