use manos_plate_core::{Editor, html};
use tracing::{debug, trace};

use crate::ToolbarError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportState {
    Pending(String),
    Imported,
}

/// Inserts an initial HTML fragment into the editor exactly once.
#[derive(Debug, Clone)]
pub struct HtmlImportBridge {
    state: ImportState,
}

impl HtmlImportBridge {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            state: ImportState::Pending(html.into()),
        }
    }

    pub fn state(&self) -> &ImportState {
        &self.state
    }

    pub fn is_imported(&self) -> bool {
        self.state == ImportState::Imported
    }

    /// Imports on the first call, does nothing afterwards. The bridge counts
    /// as imported even if the update fails, so a bad fragment is never
    /// retried.
    pub fn run(&mut self, editor: &mut Editor) -> Result<bool, ToolbarError> {
        let ImportState::Pending(markup) = std::mem::replace(&mut self.state, ImportState::Imported)
        else {
            trace!("html already imported");
            return Ok(false);
        };

        let nodes = html::nodes_from_html(&markup);
        debug!(nodes = nodes.len(), "importing html");
        editor.update(|scope| {
            scope.select_root();
            scope.insert_nodes(nodes)?;
            Ok(())
        })?;
        Ok(true)
    }
}
