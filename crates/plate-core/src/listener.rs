use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::Value;
use thiserror::Error;

use crate::plugin::CommandError;
use crate::state::EditorView;

pub const SELECTION_CHANGE_COMMAND: &str = "selection.change";
pub const CLICK_COMMAND: &str = "pointer.click";
pub const TOGGLE_LINK_COMMAND: &str = "link.toggle";
pub const SET_HEADING_COMMAND: &str = "block.set_heading";
pub const UNSET_HEADING_COMMAND: &str = "block.unset_heading";

pub type UpdateListener = Rc<dyn Fn(&EditorView<'_>) -> Result<(), ListenerError>>;
pub type CommandHandler = Rc<dyn Fn(&Value, &EditorView<'_>) -> Result<bool, CommandError>>;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Handlers with a higher priority see a command first. Plugin commands run
/// after every registered handler declined it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandPriority {
    Editor,
    Low,
    Normal,
    High,
    Critical,
}

struct RegisteredHandler {
    id: u64,
    priority: CommandPriority,
    handler: CommandHandler,
}

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    update_listeners: Vec<(u64, UpdateListener)>,
    command_handlers: HashMap<String, Vec<RegisteredHandler>>,
}

impl ListenerRegistry {
    pub(crate) fn add_update_listener(
        this: &Rc<RefCell<Self>>,
        listener: UpdateListener,
    ) -> Subscription {
        let id = {
            let mut registry = this.borrow_mut();
            let id = registry.allocate_id();
            registry.update_listeners.push((id, listener));
            id
        };
        let weak = Rc::downgrade(this);
        Subscription::new(move || {
            if let Some(registry) = Weak::upgrade(&weak) {
                registry
                    .borrow_mut()
                    .update_listeners
                    .retain(|(existing, _)| *existing != id);
            }
        })
    }

    pub(crate) fn add_command_handler(
        this: &Rc<RefCell<Self>>,
        command: &str,
        priority: CommandPriority,
        handler: CommandHandler,
    ) -> Subscription {
        let id = {
            let mut registry = this.borrow_mut();
            let id = registry.allocate_id();
            let handlers = registry
                .command_handlers
                .entry(command.to_string())
                .or_default();
            // Stable: equal priorities keep registration order.
            let at = handlers
                .iter()
                .position(|existing| existing.priority < priority)
                .unwrap_or(handlers.len());
            handlers.insert(
                at,
                RegisteredHandler {
                    id,
                    priority,
                    handler,
                },
            );
            id
        };
        let weak = Rc::downgrade(this);
        let command = command.to_string();
        Subscription::new(move || {
            let Some(registry) = Weak::upgrade(&weak) else {
                return;
            };
            let mut registry = registry.borrow_mut();
            if let Some(handlers) = registry.command_handlers.get_mut(&command) {
                handlers.retain(|existing| existing.id != id);
                if handlers.is_empty() {
                    registry.command_handlers.remove(&command);
                }
            }
        })
    }

    pub(crate) fn update_listeners(&self) -> Vec<UpdateListener> {
        self.update_listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    pub(crate) fn command_handlers(&self, command: &str) -> Vec<CommandHandler> {
        self.command_handlers
            .get(command)
            .map(|handlers| handlers.iter().map(|h| h.handler.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.update_listeners.len()
            + self
                .command_handlers
                .values()
                .map(|handlers| handlers.len())
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Keeps a registration alive. Dropping it unregisters; dropping it after
/// the editor is gone is a no-op.
#[must_use = "dropping a Subscription unregisters it immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Combines several registrations into one guard.
    pub fn merge(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        let subscriptions: Vec<Subscription> = subscriptions.into_iter().collect();
        Self::new(move || drop(subscriptions))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}
