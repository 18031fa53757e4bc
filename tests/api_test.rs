#[cfg(test)]
mod api_integration_tests {
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use leadpilot::auth::AuthService;
    use leadpilot::core::config::AppConfig;
    use leadpilot::core::shared::state::AppState;
    use leadpilot::crm::recommend::RecommendationEngine;
    use leadpilot::drive::LocalDrive;
    use leadpilot::main_module::build_router;
    use leadpilot::security::password::{Argon2Config, PasswordHasher2};
    use leadpilot::storage::MemoryStore;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct TestApp {
        router: Router,
        _storage: TempDir,
        storage_root: std::path::PathBuf,
    }

    fn test_app() -> TestApp {
        let storage = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.drive.local_root = storage.path().display().to_string();

        let store = Arc::new(MemoryStore::new());
        let hasher = PasswordHasher2::new(&Argon2Config::low_memory()).unwrap();
        let state = Arc::new(AppState {
            crm: store.clone(),
            auth: Arc::new(AuthService::new(store, hasher, 24)),
            drive: Arc::new(LocalDrive::new(storage.path(), config.drive_public_base_url())),
            recommender: RecommendationEngine::rules_only(),
            config,
        });

        TestApp {
            router: build_router(state),
            storage_root: storage.path().to_path_buf(),
            _storage: storage,
        }
    }

    async fn send(
        app: &TestApp,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn sign_up(app: &TestApp, email: &str) -> (String, Uuid) {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({"email": email, "password": "secret123", "full_name": "Test User"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let token = body["token"].as_str().unwrap().to_string();
        let id = body["user"]["id"].as_str().unwrap().parse().unwrap();
        (token, id)
    }

    async fn page(app: &TestApp, uri: &str, cookie: Option<&str>) -> axum::response::Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        app.router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn location(response: &axum::response::Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_health_reports_store() {
        let app = test_app();
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "leadpilot");
        assert_eq!(body["store"], true);
    }

    #[tokio::test]
    async fn test_sign_up_sign_in_and_session() {
        let app = test_app();
        sign_up(&app, "Owner@Example.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/signin",
            None,
            Some(json!({"email": "owner@example.com", "password": "wrong-pass"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/signin",
            None,
            Some(json!({"email": "owner@example.com", "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, profile) = send(&app, Method::GET, "/api/auth/session", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["email"], "owner@example.com");
        assert_eq!(profile["name"], "Test User");

        let (status, _) = send(&app, Method::POST, "/api/auth/signout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, "/api/auth/session", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_conflicts() {
        let app = test_app();
        sign_up(&app, "dup@example.com").await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({"email": "dup@example.com", "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_api_requires_authentication() {
        let app = test_app();
        let (status, _) = send(&app, Method::GET, "/api/leads", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, Method::GET, "/api/tasks", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_lead_lifecycle() {
        let app = test_app();
        let (token, _) = sign_up(&app, "leads@example.com").await;

        let (status, lead) = send(
            &app,
            Method::POST,
            "/api/leads",
            Some(&token),
            Some(json!({"name": "Ada Lovelace"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(lead["status"], "New");
        assert_eq!(lead["source"], "Manual");
        let lead_id = lead["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/leads",
            Some(&token),
            Some(json!({"name": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, updated) = send(
            &app,
            Method::PUT,
            &format!("/api/leads/{lead_id}"),
            Some(&token),
            Some(json!({"status": "Proposal", "email": "ada@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "Proposal");
        assert_eq!(updated["name"], "Ada Lovelace");

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/leads/{lead_id}"),
            Some(&token),
            Some(json!({"status": "Won"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, insight) = send(
            &app,
            Method::GET,
            &format!("/api/leads/{lead_id}/insight"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(insight["source"], "rules");
        assert!(insight["recommendation"].as_str().is_some_and(|s| !s.is_empty()));

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/api/leads/{lead_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, leads) = send(&app, Method::GET, "/api/leads", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(leads.as_array().map(Vec::len), Some(0));

        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/api/leads/{lead_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_incomplete_bodies_are_json_validation_errors() {
        let app = test_app();
        let (token, _) = sign_up(&app, "bodies@example.com").await;

        let (status, body) = send(&app, Method::POST, "/api/leads", Some(&token), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "name is required");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/tasks",
            Some(&token),
            Some(json!({"due_date": "2024-01-01"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "title is required");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/tasks",
            Some(&token),
            Some(json!({"title": "Call", "due_date": "next week"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = send(&app, Method::POST, "/api/auth/signup", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/leads")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_blank_update_clears_contact_fields() {
        let app = test_app();
        let (token, _) = sign_up(&app, "blank@example.com").await;

        let (_, lead) = send(
            &app,
            Method::POST,
            "/api/leads",
            Some(&token),
            Some(json!({"name": "Grace", "email": "grace@example.com", "phone": "555-0100", "notes": "met at expo"})),
        )
        .await;
        let lead_id = lead["id"].as_str().unwrap().to_string();

        let (status, updated) = send(
            &app,
            Method::PUT,
            &format!("/api/leads/{lead_id}"),
            Some(&token),
            Some(json!({"name": "Grace", "email": "", "phone": " ", "notes": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["email"], Value::Null);
        assert_eq!(updated["phone"], Value::Null);
        assert_eq!(updated["notes"], Value::Null);

        let (_, fetched) = send(&app, Method::GET, &format!("/api/leads/{lead_id}"), Some(&token), None).await;
        assert_eq!(fetched["email"], Value::Null);
    }

    #[tokio::test]
    async fn test_leads_are_isolated_per_owner() {
        let app = test_app();
        let (alice, _) = sign_up(&app, "alice@example.com").await;
        let (bob, _) = sign_up(&app, "bob@example.com").await;

        let (_, lead) = send(
            &app,
            Method::POST,
            "/api/leads",
            Some(&alice),
            Some(json!({"name": "Alice's lead"})),
        )
        .await;
        let lead_id = lead["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/api/leads/{lead_id}"),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/api/leads/{lead_id}"),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, leads) = send(&app, Method::GET, "/api/leads", Some(&bob), None).await;
        assert_eq!(leads.as_array().map(Vec::len), Some(0));

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/tasks",
            Some(&bob),
            Some(json!({"title": "Steal lead", "lead_id": lead_id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_task_toggle_updates_pending_count() {
        let app = test_app();
        let (token, _) = sign_up(&app, "tasks@example.com").await;

        let (status, task) = send(
            &app,
            Method::POST,
            "/api/tasks",
            Some(&token),
            Some(json!({"title": "Call back"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(task["status"], "Pending");
        let task_id = task["id"].as_str().unwrap().to_string();

        send(
            &app,
            Method::POST,
            "/api/tasks",
            Some(&token),
            Some(json!({"title": "Send proposal"})),
        )
        .await;

        let (_, list) = send(&app, Method::GET, "/api/tasks", Some(&token), None).await;
        assert_eq!(list["pending_count"], 2);
        assert_eq!(list["tasks"].as_array().map(Vec::len), Some(2));

        let (status, toggled) = send(
            &app,
            Method::POST,
            &format!("/api/tasks/{task_id}/toggle"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(toggled["task"]["status"], "Completed");
        assert_eq!(toggled["pending_count"], 1);

        let (_, toggled) = send(
            &app,
            Method::POST,
            &format!("/api/tasks/{task_id}/toggle"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(toggled["task"]["status"], "Pending");
        assert_eq!(toggled["pending_count"], 2);

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/api/tasks/{task_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, list) = send(&app, Method::GET, "/api/tasks", Some(&token), None).await;
        assert_eq!(list["pending_count"], 1);
    }

    #[tokio::test]
    async fn test_public_capture() {
        let app = test_app();
        let (token, user_id) = sign_up(&app, "capture@example.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/public/capture/{user_id}"),
            None,
            Some(json!({"name": "Web Visitor", "email": "visitor@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "received");

        let (_, leads) = send(&app, Method::GET, "/api/leads", Some(&token), None).await;
        assert_eq!(leads[0]["source"], "Public Form");
        assert_eq!(leads[0]["status"], "New");

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/public/capture/{}", Uuid::new_v4()),
            None,
            Some(json!({"name": "Nobody"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_avatar_upload_is_served_from_storage() {
        let app = test_app();
        let (token, _) = sign_up(&app, "avatar@example.com").await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/user/avatar")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "image/png")
            .body(Body::from(&b"\x89PNG fake"[..]))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let profile: Value = serde_json::from_slice(&bytes).unwrap();

        let url = profile["avatar"].as_str().unwrap();
        let key = url
            .strip_prefix("http://localhost:8080/storage/")
            .unwrap();
        assert!(app.storage_root.join(key).exists());

        let response = page(&app, &format!("/storage/{key}"), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/user/avatar")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_pages_redirect_by_session() {
        let app = test_app();

        let response = page(&app, "/dashboard", None).await;
        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "/login");

        let (token, _) = sign_up(&app, "pages@example.com").await;
        let cookie = format!("lp_session={token}");

        let response = page(&app, "/dashboard", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains(r#"id="pending-count""#));

        let response = page(&app, "/login", Some(&cookie)).await;
        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "/dashboard");

        let response = page(&app, &format!("/leads/{}", Uuid::new_v4()), Some(&cookie)).await;
        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "/leads");

        let response = page(&app, "/leads/not-a-uuid", Some(&cookie)).await;
        assert_eq!(location(&response), "/leads");
    }

    #[tokio::test]
    async fn test_unknown_route_renders_not_found() {
        let app = test_app();
        let response = page(&app, "/definitely/not/here", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("404"));
    }
}
