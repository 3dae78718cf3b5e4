//! Selection-aware toolbar and floating link editor for the plate editor.

mod block;
mod config;
mod dispatch;
mod error;
mod geometry;
mod import;
mod link;
mod overlay;
mod selection;
mod surface;
mod toolbar;

pub use block::{BlockType, block_ancestor, classify_block};
pub use config::ToolbarConfig;
pub use dispatch::{format_heading, toggle_link};
pub use error::ToolbarError;
pub use geometry::{OverlayPosition, Rect, ScrollOffset};
pub use import::{HtmlImportBridge, ImportState};
pub use link::{LinkState, enclosing_link_url, resolve_link_url, selected_node};
pub use overlay::{FloatingLinkEditor, OverlayState};
pub use selection::{SelectionSnapshot, read_selection};
pub use surface::{NativeSelection, Surface};
pub use toolbar::{Toolbar, ToolbarAction, ToolbarButton};
