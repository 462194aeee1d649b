//! Path routing for the task pages: `/<verb>/<identifier>`
use once_cell::sync::Lazy;
use regex::Regex;

use crate::tasks::error::TaskError;
use crate::tasks::types::TaskRef;

static VALID_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(edit|save|view|list|delete)/([a-zA-Z0-9]+)$").expect("valid route pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    View,
    Edit,
    Save,
    List,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub verb: Verb,
    pub identifier: String,
}

impl Route {
    /// Matches a request path; `None` means the path is not routable.
    pub fn parse(path: &str) -> Option<Self> {
        let captures = VALID_PATH.captures(path)?;
        let verb = match &captures[1] {
            "view" => Verb::View,
            "edit" => Verb::Edit,
            "save" => Verb::Save,
            "list" => Verb::List,
            "delete" => Verb::Delete,
            _ => return None,
        };
        Some(Self {
            verb,
            identifier: captures[2].to_string(),
        })
    }

    pub fn task_ref(&self) -> Result<TaskRef, TaskError> {
        self.identifier.parse()
    }
}
