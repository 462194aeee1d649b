pub mod error;
pub mod task_api;
pub mod types;

pub use error::TaskError;
pub use task_api::{handle_task_request, TaskEngine, TemplateRenderer};
pub use types::{Task, TaskForm, TaskRef};
