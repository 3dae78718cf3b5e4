use manos_plate_core::{ListenerError, UpdateError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolbarError {
    /// The tree is malformed; the current operation cannot continue.
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error("invalid toolbar config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("toolbar state is already borrowed")]
    Busy,
}

impl From<ToolbarError> for ListenerError {
    fn from(err: ToolbarError) -> Self {
        ListenerError::new(err.to_string())
    }
}
