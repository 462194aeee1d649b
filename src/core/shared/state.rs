use std::sync::Arc;

use crate::datastore::{Datastore, MemoryDatastore};
use crate::tasks::{TaskEngine, TemplateRenderer};

/// Process-wide state handed to every handler.
pub struct AppState {
    pub task_engine: TaskEngine,
    pub templates: TemplateRenderer,
}

impl AppState {
    pub fn new(store: Arc<dyn Datastore>, templates: TemplateRenderer) -> Self {
        Self {
            task_engine: TaskEngine::new(store),
            templates,
        }
    }

    /// State backed by a fresh in-memory datastore and the embedded templates.
    pub fn in_memory() -> Result<Self, tera::Error> {
        Ok(Self::new(
            Arc::new(MemoryDatastore::new()),
            TemplateRenderer::embedded()?,
        ))
    }
}
