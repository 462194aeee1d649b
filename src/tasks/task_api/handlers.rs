//! HTTP handlers for the task pages
use axum::body::Bytes;
use axum::extract::{FromRequest, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use log::debug;
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::tasks::error::TaskError;
use crate::tasks::task_api::router::{Route, Verb};
use crate::tasks::types::{Task, TaskForm, TaskRef};

/// Largest accepted form body; enforced by the router's body limit.
pub const MAX_FORM_BYTES: usize = 64 * 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Entry point for every non-health request: routes the path and runs the
/// matching page handler. Unroutable paths get a 404 without reaching one.
pub async fn handle_task_request(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Response {
    let path = request.uri().path().to_string();
    let Some(route) = Route::parse(&path) else {
        return TaskError::NotFound(format!("no page at {}", path)).into_response();
    };
    debug!("[ROUTER] {} {} -> {:?}", request.method(), path, route.verb);

    let result = match route.verb {
        Verb::View => handle_task_view(&state, &route).await,
        Verb::Edit => handle_task_edit(&state, &route).await,
        Verb::Save => handle_task_save(&state, &route, request).await,
        Verb::List => handle_task_list(&state).await,
        Verb::Delete => handle_task_delete(&state, &route).await,
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

/// Handler for showing a single task
pub async fn handle_task_view(state: &AppState, route: &Route) -> Result<Response, TaskError> {
    let id = match route.task_ref()? {
        TaskRef::Existing(id) => id,
        TaskRef::New => {
            return Err(TaskError::NotFound(
                "task 0 has not been saved".to_string(),
            ))
        }
    };
    let task = state.task_engine.get_task(id).await?;
    Ok(Html(state.templates.render_view(&task)?).into_response())
}

/// Handler for the edit form; `/edit/0` starts a new task
pub async fn handle_task_edit(state: &AppState, route: &Route) -> Result<Response, TaskError> {
    let task = match route.task_ref()? {
        TaskRef::New => Task::new(""),
        TaskRef::Existing(id) => state.task_engine.get_task(id).await?,
    };
    Ok(Html(state.templates.render_edit(&task)?).into_response())
}

/// Handler for form submission; creates on `/save/0`, overwrites otherwise
pub async fn handle_task_save(
    state: &AppState,
    route: &Route,
    request: Request,
) -> Result<Response, TaskError> {
    let task_ref = route.task_ref()?;
    let form = read_task_form(request).await?;

    let id = match task_ref {
        TaskRef::New => {
            let id = state.task_engine.create_task(&form.description).await?;
            if form.done {
                state.task_engine.mark_done(id).await?;
            }
            id
        }
        TaskRef::Existing(id) => {
            state
                .task_engine
                .update_task(id, &form.description, form.done)
                .await?;
            id
        }
    };

    Ok(redirect_found(&format!("/view/{}", id)))
}

/// Handler for listing all tasks; the identifier is ignored
pub async fn handle_task_list(state: &AppState) -> Result<Response, TaskError> {
    let tasks = state.task_engine.list_tasks().await?;
    Ok(Html(state.templates.render_list(&tasks)?).into_response())
}

/// Handler for deletion; renders the remaining tasks afterwards
pub async fn handle_task_delete(state: &AppState, route: &Route) -> Result<Response, TaskError> {
    if let TaskRef::Existing(id) = route.task_ref()? {
        state.task_engine.delete_task(id).await?;
    }
    handle_task_list(state).await
}

/// Collects `body`/`done` from a url-encoded body and the query string.
async fn read_task_form(request: Request) -> Result<TaskForm, TaskError> {
    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
        .unwrap_or(false);
    let query = request.uri().query().map(str::to_owned);

    let mut pairs: Vec<(String, String)> = Vec::new();
    if is_form {
        let bytes = Bytes::from_request(request, &()).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                TaskError::PayloadTooLarge(format!(
                    "form body exceeds {} bytes",
                    MAX_FORM_BYTES
                ))
            } else {
                TaskError::Validation(format!("Unreadable form body: {}", rejection.body_text()))
            }
        })?;
        let body_pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes)
            .map_err(|e| TaskError::Validation(format!("Malformed form body: {}", e)))?;
        pairs.extend(body_pairs);
    }
    if let Some(query) = query {
        let query_pairs: Vec<(String, String)> = serde_urlencoded::from_str(&query)
            .map_err(|e| TaskError::Validation(format!("Malformed query string: {}", e)))?;
        pairs.extend(query_pairs);
    }

    Ok(TaskForm::from_pairs(&pairs))
}

fn redirect_found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
