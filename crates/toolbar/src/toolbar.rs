use std::cell::RefCell;
use std::rc::{Rc, Weak};

use manos_plate_core::{
    CLICK_COMMAND, CommandPriority, Editor, EditorView, HeadingTag, ListenerError,
    SELECTION_CHANGE_COMMAND, Subscription, html,
};
use tracing::{debug, trace};

use crate::{
    BlockType, FloatingLinkEditor, Surface, ToolbarConfig, ToolbarError, classify_block,
    enclosing_link_url, format_heading, read_selection, selected_node, toggle_link,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolbarAction {
    Heading(HeadingTag),
    ToggleLink,
    ShowLinkEditor,
}

/// Rendering description of one toolbar button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolbarButton {
    pub label: String,
    pub title: String,
    pub aria_label: String,
    pub role: &'static str,
    pub aria_checked: bool,
    pub action: ToolbarAction,
}

impl ToolbarButton {
    fn checkbox(
        label: impl Into<String>,
        title: &str,
        checked: bool,
        action: ToolbarAction,
    ) -> Self {
        Self {
            label: label.into(),
            title: title.to_string(),
            aria_label: title.to_string(),
            role: "checkbox",
            aria_checked: checked,
            action,
        }
    }
}

struct ToolbarModel {
    block_type: BlockType,
    url: String,
}

pub struct Toolbar {
    config: ToolbarConfig,
    model: Rc<RefCell<ToolbarModel>>,
    _subscription: Subscription,
}

impl Toolbar {
    /// Starts tracking `editor`. Listeners are removed when the toolbar is
    /// dropped.
    pub fn mount(editor: &Editor, config: ToolbarConfig) -> Result<Self, ToolbarError> {
        let model = Rc::new(RefCell::new(ToolbarModel {
            block_type: BlockType::default(),
            url: String::new(),
        }));
        refresh_block_type(&Rc::downgrade(&model), &editor.view())?;

        let on_update = {
            let model = Rc::downgrade(&model);
            editor.register_update_listener(move |view| {
                refresh_block_type(&model, view).map_err(ListenerError::from)
            })
        };
        let link_handlers = [SELECTION_CHANGE_COMMAND, CLICK_COMMAND].map(|command| {
            let model = Rc::downgrade(&model);
            editor.register_command(command, CommandPriority::Low, move |_payload, view| {
                refresh_url(&model, view);
                Ok(false)
            })
        });

        let mut subscriptions = vec![on_update];
        subscriptions.extend(link_handlers);

        Ok(Self {
            config,
            model,
            _subscription: Subscription::merge(subscriptions),
        })
    }

    pub fn config(&self) -> &ToolbarConfig {
        &self.config
    }

    pub fn block_type(&self) -> BlockType {
        self.model.borrow().block_type
    }

    pub fn url(&self) -> String {
        self.model.borrow().url.clone()
    }

    /// Text typed into the URL field.
    pub fn set_url(&self, url: impl Into<String>) {
        self.model.borrow_mut().url = url.into();
    }

    /// Enter in the URL field: applies the typed URL to the selection.
    pub fn submit_url(&self, editor: &mut Editor) -> Result<bool, ToolbarError> {
        let url = self.url();
        toggle_link(editor, &url)
    }

    pub fn format_heading(
        &self,
        editor: &mut Editor,
        tag: HeadingTag,
    ) -> Result<bool, ToolbarError> {
        format_heading(editor, self.block_type(), tag)
    }

    pub fn activate(
        &self,
        editor: &mut Editor,
        action: ToolbarAction,
    ) -> Result<bool, ToolbarError> {
        match action {
            ToolbarAction::Heading(tag) => self.format_heading(editor, tag),
            ToolbarAction::ToggleLink => self.submit_url(editor),
            // Mounting the overlay needs a host surface; see `show_link_editor`.
            ToolbarAction::ShowLinkEditor => Ok(false),
        }
    }

    pub fn buttons(&self) -> Vec<ToolbarButton> {
        let block_type = self.block_type();
        let mut buttons: Vec<ToolbarButton> = self
            .config
            .heading_buttons
            .iter()
            .map(|&tag| {
                let heading = BlockType::from(tag);
                ToolbarButton::checkbox(
                    tag.as_str().to_uppercase(),
                    heading.label(),
                    block_type == heading,
                    ToolbarAction::Heading(tag),
                )
            })
            .collect();
        buttons.push(ToolbarButton::checkbox(
            "LK",
            "Link",
            false,
            ToolbarAction::ToggleLink,
        ));
        buttons.push(ToolbarButton::checkbox(
            "MD",
            "Link editor",
            false,
            ToolbarAction::ShowLinkEditor,
        ));
        buttons
    }

    pub fn show_link_editor<S: Surface + 'static>(
        &self,
        editor: &Editor,
        surface: S,
    ) -> FloatingLinkEditor<S> {
        FloatingLinkEditor::mount(editor, surface, self.config.clone())
    }

    pub fn export_html(&self, editor: &Editor) -> String {
        let html = html::html_from_document(editor.doc());
        debug!(len = html.len(), "exported html");
        html
    }
}

fn refresh_block_type(
    model: &Weak<RefCell<ToolbarModel>>,
    view: &EditorView<'_>,
) -> Result<(), ToolbarError> {
    let Some(model) = model.upgrade() else {
        return Ok(());
    };
    let classified = view.read(|ctx| read_selection(ctx).map(|sel| classify_block(&sel)));
    let Some(block_type) = classified else {
        return Ok(());
    };
    let block_type = block_type?;

    let mut model = model.try_borrow_mut().map_err(|_| ToolbarError::Busy)?;
    if model.block_type != block_type {
        debug!(from = %model.block_type, to = %block_type, "block type changed");
        model.block_type = block_type;
    }
    Ok(())
}

/// Only a selection inside a link overwrites the field, so a typed URL
/// survives moving the caret.
fn refresh_url(model: &Weak<RefCell<ToolbarModel>>, view: &EditorView<'_>) {
    let Some(model) = model.upgrade() else {
        return;
    };
    let url = view.read(|ctx| {
        let selection = read_selection(ctx)?;
        enclosing_link_url(&selected_node(&selection)).map(str::to_string)
    });
    match (url, model.try_borrow_mut()) {
        (Some(url), Ok(mut model)) => model.url = url,
        (None, _) => trace!("not a link node"),
        (Some(_), Err(_)) => trace!("toolbar busy, url not refreshed"),
    }
}
