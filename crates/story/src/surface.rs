use manos_plate_core::ElementHandle;
use manos_plate_toolbar::{NativeSelection, OverlayPosition, Rect, ScrollOffset, Surface};

/// Fixed-geometry host used to drive the toolbar without a window.
pub struct HeadlessSurface {
    pub root: ElementHandle,
    pub native: Option<NativeSelection>,
    pub selection_rect: Rect,
    pub scroll: ScrollOffset,
    pub focused_class: Option<String>,
    pub placed: Option<OverlayPosition>,
}

impl HeadlessSurface {
    pub fn new(root: ElementHandle) -> Self {
        Self {
            root,
            native: None,
            selection_rect: Rect::default(),
            scroll: ScrollOffset::default(),
            focused_class: None,
            placed: None,
        }
    }

    pub fn select(&mut self, rect: Rect) {
        self.native = Some(NativeSelection {
            anchor: ElementHandle(self.root.0 + 1),
            is_collapsed: false,
        });
        self.selection_rect = rect;
    }
}

impl Surface for HeadlessSurface {
    fn native_selection(&self) -> Option<NativeSelection> {
        self.native
    }

    fn contains(&self, root: ElementHandle, node: ElementHandle) -> bool {
        root == self.root && node.0 >= root.0
    }

    fn first_element_child(&self, _element: ElementHandle) -> Option<ElementHandle> {
        None
    }

    fn element_rect(&self, _element: ElementHandle) -> Rect {
        self.selection_rect
    }

    fn selection_rect(&self) -> Rect {
        self.selection_rect
    }

    fn focused_element_class(&self) -> Option<String> {
        self.focused_class.clone()
    }

    fn scroll_offset(&self) -> ScrollOffset {
        self.scroll
    }

    fn overlay_width(&self) -> f32 {
        240.0
    }

    fn place_overlay(&mut self, position: OverlayPosition) {
        self.placed = Some(position);
    }
}
