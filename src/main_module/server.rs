//! HTTP server initialization and routing

use axum::extract::DefaultBodyLimit;
use axum::{routing::get, Router};
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::core::shared::state::AppState;
use crate::tasks::handle_task_request;
use crate::tasks::task_api::handlers::MAX_FORM_BYTES;

use super::{health_check_simple, shutdown_signal};

/// Every path other than the health check goes through the task router,
/// whatever the HTTP method.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check_simple))
        .fallback(handle_task_request)
        .layer(DefaultBodyLimit::max(MAX_FORM_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

pub async fn run_axum_server(app_state: Arc<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Invalid listen address {}:{}: {}", host, port, e),
        )
    })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::create_test_state;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_route() {
        let app = build_router(create_test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_routes_are_method_agnostic() {
        let state = create_test_state();
        for method in [Method::GET, Method::POST, Method::PUT] {
            let response = build_router(state.clone())
                .oneshot(
                    Request::builder()
                        .method(method.clone())
                        .uri("/list/all")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{} /list/all", method);
        }
    }
}
