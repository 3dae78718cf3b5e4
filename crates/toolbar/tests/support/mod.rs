#![allow(dead_code)]

use std::collections::HashMap;

use manos_plate_core::ElementHandle;
use manos_plate_toolbar::{NativeSelection, OverlayPosition, Rect, ScrollOffset, Surface};

pub const ROOT: ElementHandle = ElementHandle(1);
pub const INSIDE: ElementHandle = ElementHandle(10);
pub const OUTSIDE: ElementHandle = ElementHandle(99);

/// Scriptable host: tests set the native selection and geometry directly.
#[derive(Default)]
pub struct FakeSurface {
    pub native: Option<NativeSelection>,
    pub range_rect: Rect,
    pub first_children: HashMap<ElementHandle, ElementHandle>,
    pub element_rects: HashMap<ElementHandle, Rect>,
    pub focused_class: Option<String>,
    pub scroll: ScrollOffset,
    pub width: f32,
    pub placements: Vec<OverlayPosition>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self {
            width: 200.0,
            first_children: HashMap::from([(ROOT, INSIDE)]),
            ..Default::default()
        }
    }

    pub fn select(&mut self, anchor: ElementHandle, rect: Rect) {
        self.native = Some(NativeSelection {
            anchor,
            is_collapsed: false,
        });
        self.range_rect = rect;
    }

    pub fn collapse(&mut self) {
        if let Some(native) = &mut self.native {
            native.is_collapsed = true;
        }
    }
}

impl Surface for FakeSurface {
    fn native_selection(&self) -> Option<NativeSelection> {
        self.native
    }

    fn contains(&self, root: ElementHandle, node: ElementHandle) -> bool {
        root == ROOT && node != OUTSIDE
    }

    fn first_element_child(&self, element: ElementHandle) -> Option<ElementHandle> {
        self.first_children.get(&element).copied()
    }

    fn element_rect(&self, element: ElementHandle) -> Rect {
        self.element_rects
            .get(&element)
            .copied()
            .unwrap_or_default()
    }

    fn selection_rect(&self) -> Rect {
        self.range_rect
    }

    fn focused_element_class(&self) -> Option<String> {
        self.focused_class.clone()
    }

    fn scroll_offset(&self) -> ScrollOffset {
        self.scroll
    }

    fn overlay_width(&self) -> f32 {
        self.width
    }

    fn place_overlay(&mut self, position: OverlayPosition) {
        self.placements.push(position);
    }
}
