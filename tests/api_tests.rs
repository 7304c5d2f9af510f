/// HTTP-level tests driving the full router
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use panneaux_server::{server::build_router, AppContext};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    ctx: AppContext,
    _media: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let media = TempDir::new().unwrap();
        let ctx = AppContext::for_tests(media.path().to_path_buf()).await.unwrap();
        Self {
            router: build_router(ctx.clone()),
            ctx,
            _media: media,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, cookie, body)
    }

    async fn json(&self, method: &str, uri: &str, cookie: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let (status, _, body) = self
            .send(builder.body(Body::from(body.to_string())).unwrap())
            .await;
        (status, body)
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let (status, _, body) = self.send(builder.body(Body::empty()).unwrap()).await;
        (status, body)
    }

    /// Sign up and return the session cookie and the new user id
    async fn signup(&self, username: &str, phone: &str) -> (String, String) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/signup")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({
                    "name": format!("{} Kouassi", username),
                    "username": username,
                    "email": format!("{}@example.ci", username),
                    "phone": phone,
                    "password": "secret123",
                    "confirmPassword": "secret123"
                })
                .to_string(),
            ))
            .unwrap();

        let (status, cookie, body) = self.send(request).await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);
        let id = body["user"]["id"].as_str().unwrap().to_string();
        (cookie.expect("session cookie"), id)
    }
}

#[tokio::test]
async fn test_signup_returns_user_without_secrets() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "name": " Awa Koné ",
                "username": "awa",
                "email": "awa@example.ci",
                "phone": "+2250707070707",
                "password": "secret123",
                "confirmPassword": "secret123"
            })
            .to_string(),
        ))
        .unwrap();

    let (status, cookie, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(cookie.unwrap().starts_with("panneaux="));
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["name"], "Awa Koné");
    assert_eq!(body["user"]["phone"], "+2250707070707");

    let user = body["user"].as_object().unwrap();
    assert!(!user.contains_key("password"));
    assert!(!user.contains_key("passwordHash"));
    assert!(!user.contains_key("verificationToken"));

    let expires: DateTime<Utc> = sqlx::query_scalar(
        "SELECT verification_token_expires_at FROM users WHERE username = 'awa'",
    )
    .fetch_one(&app.ctx.db)
    .await
    .unwrap();
    let remaining = expires - Utc::now();
    assert!(remaining > Duration::minutes(29) && remaining <= Duration::minutes(30));
}

#[tokio::test]
async fn test_duplicate_signup_is_rejected() {
    let app = TestApp::new().await;
    app.signup("awa", "+2250707070707").await;

    let (status, body) = app
        .json(
            "POST",
            "/api/v1/auth/signup",
            None,
            json!({
                "name": "Someone Else",
                "username": "other",
                "email": "other@example.ci",
                "phone": "+2250707070707",
                "password": "secret123",
                "confirmPassword": "secret123"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&app.ctx.db)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_session_cookie_resolves_current_user() {
    let app = TestApp::new().await;
    let (cookie, id) = app.signup("awa", "+2250707070707").await;

    let (status, body) = app.get("/api/v1/auth/me", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());

    let (status, body) = app.get("/api/v1/auth/check-auth", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "AuthenticationRequired");
}

#[tokio::test]
async fn test_repeated_connection_request_is_forbidden() {
    let app = TestApp::new().await;
    let (awa, awa_id) = app.signup("awa", "+2250707070707").await;
    let (_, yao_id) = app.signup("yao", "+2250101010101").await;

    let uri = format!("/api/v1/connections/request/{}", yao_id);
    let (status, _) = app.json("POST", &uri, Some(&awa), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.json("POST", &uri, Some(&awa), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let self_uri = format!("/api/v1/connections/request/{}", awa_id);
    let (status, _) = app.json("POST", &self_uri, Some(&awa), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .json("POST", "/api/v1/connections/request/not-a-uuid", Some(&awa), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_third_party_cannot_delete_comment() {
    let app = TestApp::new().await;
    let (author, _) = app.signup("awa", "+2250707070707").await;
    let (commenter, _) = app.signup("yao", "+2250101010101").await;
    let (stranger, _) = app.signup("ama", "+2250505050505").await;

    let (status, post) = app
        .json("POST", "/api/v1/posts", Some(&author), json!({ "content": "Réunion samedi" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = post["id"].as_str().unwrap().to_string();

    let (status, post) = app
        .json(
            "POST",
            &format!("/api/v1/posts/{}/comment", post_id),
            Some(&commenter),
            json!({ "content": "J'y serai" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let comment_id = post["comments"][0]["id"].as_str().unwrap().to_string();

    let uri = format!("/api/v1/posts/{}/comments/{}", post_id, comment_id);
    let (status, _) = app.json("DELETE", &uri, Some(&stranger), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, post) = app.json("DELETE", &uri, Some(&author), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["commentCount"], 0);
}

#[tokio::test]
async fn test_feed_access_rules() {
    let app = TestApp::new().await;
    let (cookie, _) = app.signup("awa", "+2250707070707").await;

    let (status, _) = app.get("/api/v1/posts", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.get("/api/v1/posts?page=1&limit=5", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentPage"], 1);
    assert!(body["posts"].as_array().unwrap().is_empty());

    let (status, body) = app.get("/api/v1/panneau/get", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalPosts"], 0);

    let (status, _) = app
        .json("POST", "/api/v1/panneau/create", Some(&cookie), json!({ "content": "Avis" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_route_and_health() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/v1/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = app.get("/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_mistyped_login_body_is_json_400() {
    let app = TestApp::new().await;

    let (status, body) = app
        .json("POST", "/api/v1/auth/login", None, json!({ "email": 5, "password": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "InvalidRequest");

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/login")
        .body(Body::from(r#"{"email":"awa@example.ci","password":"secret123"}"#))
        .unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_huge_page_number_is_served() {
    let app = TestApp::new().await;

    let (status, body) = app
        .get("/api/v1/panneau/get?page=9223372036854775807", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["panneaux"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_single_post_requires_session() {
    let app = TestApp::new().await;
    let (cookie, _) = app.signup("awa", "+2250707070707").await;

    let (status, post) = app
        .json("POST", "/api/v1/posts", Some(&cookie), json!({ "content": "Atelier CV" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/v1/posts/{}", post["id"].as_str().unwrap());

    let (status, body) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, body) = app.get(&uri, Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "Atelier CV");
}
