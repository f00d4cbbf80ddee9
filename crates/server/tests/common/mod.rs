#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tower::ServiceExt;

use gigboard_server::{
    build_router,
    config::{Config, MarketPolicy},
    db::{
        models::{Job, Priority, Role, User},
        Database,
    },
    services::{
        jobs::{self, NewJob},
        users::{self, NewUser},
    },
    AppState,
};

pub const PASSWORD: &str = "secret123";
pub const JWT_SECRET: &str = "test-secret";

pub fn test_config() -> Config {
    let uploads = std::env::temp_dir().join("gigboard-test-uploads");
    Config {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        upload_path: uploads.to_string_lossy().into_owned(),
        static_path: "./static".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        token_ttl_minutes: 30,
        max_upload_bytes: 1024 * 1024,
        policy: MarketPolicy::default(),
        allow_email_cookie: false,
        admin_email: None,
        admin_password: None,
    }
}

/// The production router on top of the given pool.
pub fn build_test_app(pool: SqlitePool) -> Router {
    build_test_app_with(pool, test_config())
}

pub fn build_test_app_with(pool: SqlitePool, config: Config) -> Router {
    let state = AppState::new(Database::from_pool(pool), config);
    build_router(state)
}

pub async fn create_user(pool: &SqlitePool, email: &str, role: Role) -> User {
    users::register(
        pool,
        NewUser {
            email: email.to_string(),
            password: PASSWORD.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            role,
        },
    )
    .await
    .expect("user registration should succeed")
}

pub async fn create_job(pool: &SqlitePool, client: &User, title: &str) -> Job {
    jobs::create_job(
        pool,
        client,
        NewJob {
            title: title.to_string(),
            description: format!("{title} description"),
            deadline: (Utc::now() + Duration::days(7)).date_naive(),
            priority: Priority::Medium,
            files: Vec::new(),
        },
    )
    .await
    .expect("job creation should succeed")
}

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn get_with_cookie(app: Router, uri: &str, cookie: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// Every `Set-Cookie` value on the response.
pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, json_request(Method::POST, uri, None, body)).await
}

pub async fn post_json_auth(app: Router, uri: &str, token: &str, body: serde_json::Value) -> Response {
    send(app, json_request(Method::POST, uri, Some(token), body)).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Logs in through the API and returns the bearer token.
pub async fn login(app: Router, email: &str) -> String {
    let response = post_json(
        app,
        "/api/auth/login",
        serde_json::json!({ "email": email, "password": PASSWORD }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    body_json(response).await["token"]
        .as_str()
        .expect("login response should carry a token")
        .to_string()
}
