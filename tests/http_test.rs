#[cfg(test)]
mod task_pages_integration_tests {
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::response::Response;
    use axum::Router;
    use std::sync::Arc;
    use taskboard::core::shared::state::AppState;
    use taskboard::main_module::build_router;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState::in_memory().unwrap());
        (build_router(state.clone()), state)
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn get(app: &Router, uri: &str) -> Response {
        send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_form(app: &Router, uri: &str, form: &str) -> Response {
        send(
            app,
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response) -> String {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (app, state) = app();
        let response = get(&app, "/unknown/1").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        for uri in ["/view/", "/edit/1/2", "/save/a-b", "/"] {
            assert_eq!(get(&app, uri).await.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
        // Nothing was written by the unroutable requests.
        let response = post_form(&app, "/unknown/0", "body=sneaky").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(state.task_engine.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_new_task_redirects_to_view() {
        let (app, state) = app();
        let response = post_form(&app, "/save/0", "body=Buy+eggs&done=on").await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let target = location(&response);
        let id: i64 = target.trim_start_matches("/view/").parse().unwrap();
        let task = state.task_engine.get_task(id).await.unwrap();
        assert_eq!(task.description, "Buy eggs");
        assert!(task.done);

        let page = get(&app, &target).await;
        assert_eq!(page.status(), StatusCode::OK);
        let html = body_text(page).await;
        assert!(html.contains("Buy eggs"));
        assert!(html.contains("<strong>done</strong>"));
    }

    #[tokio::test]
    async fn test_save_without_done_clears_flag() {
        let (app, state) = app();
        let id = state.task_engine.create_task("walk dog").await.unwrap();
        state.task_engine.mark_done(id).await.unwrap();

        let response = post_form(&app, &format!("/save/{}", id), "body=walk+the+dog").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), format!("/view/{}", id));

        let task = state.task_engine.get_task(id).await.unwrap();
        assert_eq!(task.description, "walk the dog");
        assert!(!task.done);
    }

    #[tokio::test]
    async fn test_save_reads_query_string_on_get() {
        let (app, state) = app();
        let response = get(&app, "/save/0?body=from+query&done=on").await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let tasks = state.task_engine.list_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "from query");
        assert!(tasks[0].done);
    }

    #[tokio::test]
    async fn test_oversized_form_is_rejected() {
        let (app, state) = app();
        let form = format!("body={}", "x".repeat(70 * 1024));
        let response = post_form(&app, "/save/0", &form).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(state.task_engine.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_form_content_type_is_case_insensitive() {
        let (app, state) = app();
        let response = send(
            &app,
            Request::builder()
                .method(Method::POST)
                .uri("/save/0")
                .header(
                    header::CONTENT_TYPE,
                    "Application/X-WWW-Form-URLEncoded; charset=UTF-8",
                )
                .body(Body::from("body=shouted&done=ON"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let tasks = state.task_engine.list_tasks().await.unwrap();
        assert_eq!(tasks[0].description, "shouted");
        assert!(tasks[0].done);
    }

    #[tokio::test]
    async fn test_save_missing_task_is_not_found() {
        let (app, _state) = app();
        let response = post_form(&app, "/save/77", "body=ghost").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_view_missing_and_invalid_ids() {
        let (app, _state) = app();
        assert_eq!(get(&app, "/view/12").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(get(&app, "/view/0").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(get(&app, "/view/abc").await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_edit_pages() {
        let (app, state) = app();
        let blank = get(&app, "/edit/0").await;
        assert_eq!(blank.status(), StatusCode::OK);
        assert!(body_text(blank).await.contains(r#"action="/save/0""#));

        let id = state.task_engine.create_task("repaint fence").await.unwrap();
        let filled = get(&app, &format!("/edit/{}", id)).await;
        assert_eq!(filled.status(), StatusCode::OK);
        let html = body_text(filled).await;
        assert!(html.contains(&format!(r#"action="/save/{}""#, id)));
        assert!(html.contains("repaint fence"));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (app, state) = app();
        let first = state.task_engine.create_task("first task").await.unwrap();
        let second = state.task_engine.create_task("second task").await.unwrap();

        let html = body_text(get(&app, "/list/anything").await).await;
        let a = html.find("first task").unwrap();
        let b = html.find("second task").unwrap();
        assert!(a < b);

        let response = get(&app, &format!("/delete/{}", first)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(!html.contains("first task"));
        assert!(html.contains("second task"));

        // Deleting something that is already gone still renders the list.
        let response = get(&app, &format!("/delete/{}", first)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("second task"));

        state.task_engine.delete_task(second).await.unwrap();
        let html = body_text(get(&app, "/delete/0").await).await;
        assert!(html.contains("No tasks yet."));
    }
}
