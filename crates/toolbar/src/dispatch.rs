use manos_plate_core::{Editor, HeadingTag, SET_HEADING_COMMAND, TOGGLE_LINK_COMMAND};
use serde_json::{Value, json};
use tracing::debug;

use crate::{BlockType, ToolbarError};

/// Wraps the selected blocks in a heading. Returns `false` without touching
/// the editor when `current` already is `tag` or there is no range selection.
pub fn format_heading(
    editor: &mut Editor,
    current: BlockType,
    tag: HeadingTag,
) -> Result<bool, ToolbarError> {
    if current == BlockType::from(tag) {
        return Ok(false);
    }
    if editor.selection().as_range().is_none() {
        return Ok(false);
    }
    debug!(%tag, %current, "format heading");
    editor.run_command(SET_HEADING_COMMAND, Some(json!({ "level": tag.level() })))?;
    Ok(true)
}

/// Dispatches `link.toggle` with `url` as-is. An empty string removes links.
pub fn toggle_link(editor: &mut Editor, url: &str) -> Result<bool, ToolbarError> {
    debug!(url, "toggle link");
    Ok(editor.dispatch_command(TOGGLE_LINK_COMMAND, Value::String(url.to_string()))?)
}
