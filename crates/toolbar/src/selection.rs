use manos_plate_core::{NodeRef, ReadContext};

/// Range selection resolved to nodes. Borrowed from the read that produced
/// it, so it cannot be kept across updates.
#[derive(Debug, Clone)]
pub struct SelectionSnapshot<'a> {
    pub anchor: NodeRef<'a>,
    pub focus: NodeRef<'a>,
    pub anchor_at_end: bool,
    pub focus_at_end: bool,
    pub is_backward: bool,
    pub is_collapsed: bool,
}

/// `None` unless the editor holds a range selection whose endpoints resolve.
pub fn read_selection<'a>(ctx: &ReadContext<'a>) -> Option<SelectionSnapshot<'a>> {
    let range = ctx.selection().as_range()?;
    let anchor = ctx.point_node(&range.anchor)?;
    let focus = ctx.point_node(&range.focus)?;
    Some(SelectionSnapshot {
        anchor,
        focus,
        anchor_at_end: ctx.is_at_end(&range.anchor),
        focus_at_end: ctx.is_at_end(&range.focus),
        is_backward: range.is_backward(),
        is_collapsed: range.is_collapsed(),
    })
}
