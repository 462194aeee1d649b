//! Types for the tasks module
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;

use super::error::TaskError;
use crate::datastore::{DatastoreError, Entity, Key};

pub const TASK_KIND: &str = "Task";

const PROP_DESCRIPTION: &str = "description";
const PROP_CREATED: &str = "created";
const PROP_DONE: &str = "done";

/// A task as stored in the datastore. `id` is `None` until the datastore
/// has assigned one.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: Option<i64>,
    pub description: String,
    pub created: DateTime<Utc>,
    pub done: bool,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: None,
            description: description.into(),
            created: Utc::now(),
            done: false,
        }
    }

    pub fn key(&self) -> Key {
        match self.id {
            Some(id) => Key::with_id(TASK_KIND, id),
            None => Key::incomplete(TASK_KIND),
        }
    }

    pub fn to_entity(&self) -> Entity {
        Entity::new(self.key())
            .with(PROP_DESCRIPTION, self.description.as_str())
            .with(PROP_CREATED, self.created)
            .with(PROP_DONE, self.done)
    }

    pub fn from_entity(entity: &Entity) -> Result<Self, DatastoreError> {
        Ok(Self {
            id: entity.key.id,
            description: entity.string(PROP_DESCRIPTION)?.to_string(),
            created: entity.timestamp(PROP_CREATED)?,
            done: entity.boolean(PROP_DONE)?,
        })
    }
}

/// Identifier segment of a task URL.
///
/// `0` names a task that has not been saved yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRef {
    New,
    Existing(i64),
}

impl FromStr for TaskRef {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<i64>() {
            Ok(0) => Ok(Self::New),
            Ok(id) if id > 0 => Ok(Self::Existing(id)),
            _ => Err(TaskError::Validation(format!(
                "'{}' is not a valid task identifier",
                s
            ))),
        }
    }
}

/// Fields submitted by the edit form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskForm {
    pub description: String,
    pub done: bool,
}

impl TaskForm {
    /// Builds the form from url-encoded pairs. Body pairs come first so they
    /// win over the query string; the first value of a field is used.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let first = |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        Self {
            description: first("body").unwrap_or_default().to_string(),
            done: parse_checkbox(first("done")),
        }
    }
}

/// HTML checkboxes submit `on` when ticked and nothing otherwise.
pub fn parse_checkbox(value: Option<&str>) -> bool {
    match value {
        Some(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "on" | "true" | "1" | "yes"
        ),
        None => false,
    }
}

/// Template-facing view of a task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: Option<i64>,
    pub description: String,
    pub created: String,
    pub done: bool,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            description: task.description.clone(),
            created: task.created.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            done: task.done,
        }
    }
}
