//! HTML rendering for the task pages
use log::info;
use std::path::Path;
use tera::{Context, Tera};

use crate::tasks::error::TaskError;
use crate::tasks::types::{Task, TaskView};

pub const VIEW_TEMPLATE: &str = "view.html";
pub const EDIT_TEMPLATE: &str = "edit.html";
pub const LIST_TEMPLATE: &str = "list.html";

const EMBEDDED: [(&str, &str); 3] = [
    (VIEW_TEMPLATE, include_str!("../../../templates/view.html")),
    (EDIT_TEMPLATE, include_str!("../../../templates/edit.html")),
    (LIST_TEMPLATE, include_str!("../../../templates/list.html")),
];

/// Compiled page templates. Parse errors surface when this is built, not
/// when a page is requested.
#[derive(Debug)]
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    pub fn embedded() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(EMBEDDED.to_vec())?;
        Ok(Self { tera })
    }

    /// Embedded templates, replaced by any same-named file found in `dir`.
    pub fn with_overrides(dir: &Path) -> Result<Self, tera::Error> {
        let mut renderer = Self::embedded()?;
        for (name, _) in EMBEDDED {
            let path = dir.join(name);
            if path.is_file() {
                info!("Loading template override {}", path.display());
                renderer.tera.add_template_file(&path, Some(name))?;
            }
        }
        Ok(renderer)
    }

    pub fn render_view(&self, task: &Task) -> Result<String, TaskError> {
        self.render_task(VIEW_TEMPLATE, task)
    }

    pub fn render_edit(&self, task: &Task) -> Result<String, TaskError> {
        self.render_task(EDIT_TEMPLATE, task)
    }

    pub fn render_list(&self, tasks: &[Task]) -> Result<String, TaskError> {
        let views: Vec<TaskView> = tasks.iter().map(TaskView::from).collect();
        let mut context = Context::new();
        context.insert("tasks", &views);
        Ok(self.tera.render(LIST_TEMPLATE, &context)?)
    }

    fn render_task(&self, template: &str, task: &Task) -> Result<String, TaskError> {
        let mut context = Context::new();
        context.insert("task", &TaskView::from(task));
        Ok(self.tera.render(template, &context)?)
    }
}
