use std::cell::RefCell;
use std::rc::{Rc, Weak};

use manos_plate_core::{
    CommandPriority, Editor, EditorView, ListenerError, SELECTION_CHANGE_COMMAND, SelectionState,
    Subscription,
};
use tracing::{debug, trace, warn};

use crate::{
    LinkState, OverlayPosition, Surface, ToolbarConfig, ToolbarError, read_selection,
    resolve_link_url,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayState {
    Hidden,
    Anchored(OverlayPosition),
    /// A pointer is down on the overlay. Placement is frozen at `position`
    /// (`None` if it was hidden) until the pointer is released.
    Dragging { position: Option<OverlayPosition> },
}

impl OverlayState {
    pub fn position(&self) -> OverlayPosition {
        match self {
            OverlayState::Anchored(position) => *position,
            OverlayState::Dragging {
                position: Some(position),
            } => *position,
            _ => OverlayPosition::hidden(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.position().is_visible()
    }
}

struct OverlayModel<S> {
    surface: S,
    config: ToolbarConfig,
    state: OverlayState,
    link: LinkState,
    last_selection: Option<SelectionState>,
}

impl<S: Surface> OverlayModel<S> {
    fn evaluate(&mut self, view: &EditorView<'_>) {
        if let Some(url) = view.read(|ctx| read_selection(ctx).map(|sel| resolve_link_url(&sel))) {
            self.link.url = url;
        }

        let selection = view.state().selection();
        let anchored = match (view.root_element(), self.surface.native_selection()) {
            (Some(root), Some(native)) if !selection.is_none() && !native.is_collapsed => {
                self.surface.contains(root, native.anchor).then_some((root, native))
            }
            _ => None,
        };

        if let Some((root, native)) = anchored {
            let rect = if native.anchor == root {
                // Whole document selected: measure the innermost first child.
                let mut inner = root;
                while let Some(child) = self.surface.first_element_child(inner) {
                    inner = child;
                }
                self.surface.element_rect(inner)
            } else {
                self.surface.selection_rect()
            };

            if !matches!(self.state, OverlayState::Dragging { .. }) {
                let position = OverlayPosition::below(
                    rect,
                    self.surface.scroll_offset(),
                    self.surface.overlay_width(),
                    self.config.vertical_offset,
                );
                self.place(OverlayState::Anchored(position));
            }
            self.last_selection = Some(selection.clone());
            return;
        }

        let typing_url = self
            .surface
            .focused_element_class()
            .is_some_and(|class| class == self.config.link_input_class);
        if typing_url {
            return;
        }

        let hidden = match self.state {
            OverlayState::Dragging { .. } => OverlayState::Dragging { position: None },
            _ => OverlayState::Hidden,
        };
        self.place(hidden);
        self.last_selection = None;
        self.link = LinkState::default();
    }

    fn place(&mut self, state: OverlayState) {
        if state != self.state {
            trace!(?state, "overlay transition");
        }
        self.state = state;
        self.surface.place_overlay(state.position());
    }
}

/// Floating panel that follows the selection and shows the link under it.
///
/// Dropping it unregisters its listeners.
pub struct FloatingLinkEditor<S> {
    model: Rc<RefCell<OverlayModel<S>>>,
    _subscription: Subscription,
}

impl<S: Surface + 'static> FloatingLinkEditor<S> {
    pub fn mount(editor: &Editor, surface: S, config: ToolbarConfig) -> Self {
        let model = Rc::new(RefCell::new(OverlayModel {
            surface,
            config,
            state: OverlayState::Hidden,
            link: LinkState::default(),
            last_selection: None,
        }));

        let on_update = {
            let model = Rc::downgrade(&model);
            editor.register_update_listener(move |view| {
                evaluate(&model, view).map_err(ListenerError::from)
            })
        };
        let on_selection_change = {
            let model = Rc::downgrade(&model);
            editor.register_command(
                SELECTION_CHANGE_COMMAND,
                CommandPriority::Low,
                move |_payload, view| {
                    if let Err(err) = evaluate(&model, view) {
                        warn!(error = %err, "overlay refresh skipped");
                    }
                    Ok(false)
                },
            )
        };
        debug!("floating link editor mounted");

        Self {
            model,
            _subscription: Subscription::merge([on_update, on_selection_change]),
        }
    }

    pub fn state(&self) -> OverlayState {
        self.model.borrow().state
    }

    pub fn position(&self) -> OverlayPosition {
        self.model.borrow().state.position()
    }

    pub fn link_state(&self) -> LinkState {
        self.model.borrow().link.clone()
    }

    pub fn last_selection(&self) -> Option<SelectionState> {
        self.model.borrow().last_selection.clone()
    }

    pub fn set_edit_mode(&self, edit_mode: bool) {
        self.model.borrow_mut().link.edit_mode = edit_mode;
    }

    /// Freezes placement while a pointer interaction is in progress.
    pub fn pointer_down(&self) {
        let mut model = self.model.borrow_mut();
        let position = match model.state {
            OverlayState::Anchored(position) => Some(position),
            OverlayState::Dragging { position } => position,
            OverlayState::Hidden => None,
        };
        model.state = OverlayState::Dragging { position };
    }

    /// Ends a drag and places the overlay for the current selection.
    pub fn pointer_up(&self, editor: &Editor) {
        let mut model = self.model.borrow_mut();
        if let OverlayState::Dragging { position } = model.state {
            model.state = position.map_or(OverlayState::Hidden, OverlayState::Anchored);
        }
        model.evaluate(&editor.view());
    }

    /// Re-evaluates placement against the editor's current state.
    pub fn refresh(&self, editor: &Editor) {
        self.model.borrow_mut().evaluate(&editor.view());
    }

    pub fn with_surface<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.model.borrow().surface)
    }

    pub fn with_surface_mut<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.model.borrow_mut().surface)
    }
}

fn evaluate<S: Surface>(
    model: &Weak<RefCell<OverlayModel<S>>>,
    view: &EditorView<'_>,
) -> Result<(), ToolbarError> {
    // Torn down: nothing to position.
    let Some(model) = model.upgrade() else {
        return Ok(());
    };
    let mut model = model.try_borrow_mut().map_err(|_| ToolbarError::Busy)?;
    model.evaluate(view);
    Ok(())
}
