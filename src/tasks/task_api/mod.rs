//! Task API module - contains task management logic
//!
//! This module is split into:
//! - engine: TaskEngine with CRUD operations over the datastore
//! - handlers: HTTP request handlers
//! - html_renderers: template rendering for the task pages
//! - router: `/<verb>/<id>` path matching
//! - utils: Utility functions

pub mod engine;
pub mod handlers;
pub mod html_renderers;
pub mod router;
pub mod utils;

pub use engine::TaskEngine;
pub use handlers::handle_task_request;
pub use html_renderers::TemplateRenderer;
pub use router::{Route, Verb};
