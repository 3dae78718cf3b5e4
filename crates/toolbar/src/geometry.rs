use serde::{Deserialize, Serialize};

/// Bounding box in viewport coordinates, as reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn center_x(&self) -> f32 {
        self.left + self.width / 2.0
    }
}

/// Page scroll, added to viewport coordinates to get page coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayPosition {
    pub top: f32,
    pub left: f32,
    /// 0 (hidden) or 1 (shown).
    pub opacity: u8,
}

impl OverlayPosition {
    pub fn hidden() -> Self {
        Self::default()
    }

    /// Centers an overlay of `overlay_width` under `rect`. No viewport
    /// clamping: near the page edges the overlay may stick out.
    pub fn below(
        rect: Rect,
        scroll: ScrollOffset,
        overlay_width: f32,
        vertical_offset: f32,
    ) -> Self {
        Self {
            top: rect.bottom() + scroll.y + vertical_offset,
            left: rect.center_x() + scroll.x - overlay_width / 2.0,
            opacity: 1,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.opacity > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_sits_under_the_rect_and_is_centered() {
        let rect = Rect::new(50.0, 100.0, 40.0, 20.0);
        let scroll = ScrollOffset { x: 5.0, y: 300.0 };
        let position = OverlayPosition::below(rect, scroll, 200.0, 10.0);
        assert_eq!(position.top, 100.0 + 20.0 + 300.0 + 10.0);
        assert_eq!(position.left, 50.0 + 5.0 - 100.0 + 20.0);
        assert!(position.is_visible());
    }

    #[test]
    fn overlay_is_not_clamped_to_the_viewport() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let position = OverlayPosition::below(rect, ScrollOffset::default(), 300.0, 10.0);
        assert_eq!(position.left, -145.0);
    }

    #[test]
    fn hidden_has_no_geometry() {
        let hidden = OverlayPosition::hidden();
        assert!(!hidden.is_visible());
        assert_eq!((hidden.top, hidden.left), (0.0, 0.0));
    }
}
