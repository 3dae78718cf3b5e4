use manos_plate_core::ElementHandle;

use crate::{OverlayPosition, Rect, ScrollOffset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeSelection {
    /// Host node holding the selection anchor.
    pub anchor: ElementHandle,
    pub is_collapsed: bool,
}

/// Host environment the floating editor is rendered into.
pub trait Surface {
    fn native_selection(&self) -> Option<NativeSelection>;
    fn contains(&self, root: ElementHandle, node: ElementHandle) -> bool;
    fn first_element_child(&self, element: ElementHandle) -> Option<ElementHandle>;
    fn element_rect(&self, element: ElementHandle) -> Rect;
    /// Bounding rect of the first range of the native selection.
    fn selection_rect(&self) -> Rect;
    fn focused_element_class(&self) -> Option<String>;
    fn scroll_offset(&self) -> ScrollOffset;
    fn overlay_width(&self) -> f32;
    fn place_overlay(&mut self, position: OverlayPosition);
}
