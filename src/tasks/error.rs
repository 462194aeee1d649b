use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use log::{error, warn};
use std::error::Error as _;

use super::task_api::utils::html_escape;
use crate::datastore::DatastoreError;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Backend unavailable: {0}")]
    TransientBackend(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Render error: {0}")]
    Render(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaskError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::TransientBackend(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Render(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DatastoreError> for TaskError {
    fn from(e: DatastoreError) -> Self {
        match e {
            DatastoreError::NotFound(msg) => Self::NotFound(msg),
            DatastoreError::Conflict(msg) => Self::Conflict(msg),
            DatastoreError::Transient(msg) => Self::TransientBackend(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<tera::Error> for TaskError {
    fn from(e: tera::Error) -> Self {
        // Tera keeps the useful detail in the source chain.
        let mut message = e.to_string();
        let mut source = e.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Render(message)
    }
}

impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("[TASKS] {}", self);
        } else {
            warn!("[TASKS] {}", self);
        }

        let title = status.canonical_reason().unwrap_or("Error");
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
<h1>{code} {title}</h1>
<div class="error">{message}</div>
<p><a href="/list/all">Back to tasks</a></p>
</body>
</html>
"#,
            code = status.as_u16(),
            title = title,
            message = html_escape(&self.to_string()),
        );
        (status, Html(html)).into_response()
    }
}
