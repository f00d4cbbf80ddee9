//! HTTP-level tests driven through the router with `tower::ServiceExt::oneshot`.

mod common;

use axum::http::StatusCode;
use common::{
    body_json, build_test_app, build_test_app_with, create_job, create_user, get, get_auth,
    get_with_cookie, login, post_json, post_json_auth, set_cookies, test_config, PASSWORD,
};
use gigboard_server::db::models::Role;
use serde_json::json;
use sqlx::SqlitePool;

#[sqlx::test(migrations = "./migrations")]
async fn test_health(pool: SqlitePool) {
    let response = get(build_test_app(pool), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_register_returns_token_and_user(pool: SqlitePool) {
    let response = post_json(
        build_test_app(pool.clone()),
        "/api/auth/register",
        json!({
            "email": "New.User@Example.com",
            "name": "New User",
            "password": "secret123",
            "role": "freelancer"
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("set-cookie").is_some());

    let body = body_json(response).await;
    assert!(body["token"].is_string());
    assert_eq!(body["user"]["email"], "new.user@example.com");
    assert_eq!(body["user"]["role"], "freelancer");
    assert!(body["user"].get("password_hash").is_none());
    assert_eq!(body["user"]["avatar"], "/static/default-avatar.svg");

    let duplicate = post_json(
        build_test_app(pool),
        "/api/auth/register",
        json!({
            "email": "new.user@example.com",
            "name": "Again",
            "password": "secret123",
            "role": "client"
        }),
    )
    .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(duplicate).await["code"], "CONFLICT");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_admin_cannot_self_register(pool: SqlitePool) {
    let response = post_json(
        build_test_app(pool),
        "/api/auth/register",
        json!({
            "email": "root@example.com",
            "name": "Root",
            "password": "secret123",
            "role": "admin"
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_login_with_wrong_password_is_unauthorized(pool: SqlitePool) {
    create_user(&pool, "dev@example.com", Role::Freelancer).await;

    let response = post_json(
        build_test_app(pool),
        "/api/auth/login",
        json!({ "email": "dev@example.com", "password": "wrong-password" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_protected_routes_require_identity(pool: SqlitePool) {
    let response = get(build_test_app(pool.clone()), "/api/auth/me").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = get_auth(build_test_app(pool), "/api/auth/me", "not-a-token").await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_email_cookie_identity_is_opt_in(pool: SqlitePool) {
    create_user(&pool, "dev@example.com", Role::Freelancer).await;
    let credentials = json!({ "email": "dev@example.com", "password": PASSWORD });

    let default_login =
        post_json(build_test_app(pool.clone()), "/api/auth/login", credentials.clone()).await;
    let cookies = set_cookies(&default_login);
    assert!(cookies.iter().any(|c| c.starts_with("access_token=")));
    assert!(!cookies.iter().any(|c| c.starts_with("user_email=")));

    let ignored = get_with_cookie(
        build_test_app(pool.clone()),
        "/api/auth/me",
        "user_email=dev@example.com",
    )
    .await;
    assert_eq!(ignored.status(), StatusCode::UNAUTHORIZED);

    let mut config = test_config();
    config.allow_email_cookie = true;

    let login = post_json(
        build_test_app_with(pool.clone(), config.clone()),
        "/api/auth/login",
        credentials,
    )
    .await;
    assert_eq!(login.status(), StatusCode::OK);
    let email_cookie = set_cookies(&login)
        .into_iter()
        .find(|c| c.starts_with("user_email="))
        .expect("login should set the email cookie");
    let pair = email_cookie.split(';').next().unwrap();
    assert!(pair.starts_with("user_email=dev"));

    let me = get_with_cookie(build_test_app_with(pool, config), "/api/auth/me", pair).await;
    assert_eq!(me.status(), StatusCode::OK);
    assert_eq!(body_json(me).await["email"], "dev@example.com");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_apply_flow_over_http(pool: SqlitePool) {
    let client = create_user(&pool, "client@example.com", Role::Client).await;
    create_user(&pool, "dev@example.com", Role::Freelancer).await;
    let job = create_job(&pool, &client, "Dashboard").await;

    let token = login(build_test_app(pool.clone()), "dev@example.com").await;

    let me = get_auth(build_test_app(pool.clone()), "/api/auth/me", &token).await;
    assert_eq!(me.status(), StatusCode::OK);
    assert_eq!(body_json(me).await["email"], "dev@example.com");

    let uri = format!("/api/jobs/{}/apply", job.id);
    let first = post_json_auth(build_test_app(pool.clone()), &uri, &token, json!({})).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_json(first).await["outcome"], "applied");

    let second = post_json_auth(build_test_app(pool.clone()), &uri, &token, json!({})).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_json(second).await["outcome"], "already_applied");

    let mine = get_auth(build_test_app(pool.clone()), "/api/applications", &token).await;
    let mine = body_json(mine).await;
    assert_eq!(mine.as_array().map(Vec::len), Some(1));
    assert_eq!(mine[0]["job_title"], "Dashboard");
    assert_eq!(mine[0]["status"], "pending");

    let client_token = login(build_test_app(pool.clone()), "client@example.com").await;
    let application_id = mine[0]["id"].as_i64().unwrap();
    let accepted = post_json_auth(
        build_test_app(pool.clone()),
        &format!("/api/applications/{application_id}/accept"),
        &client_token,
        json!({}),
    )
    .await;
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(body_json(accepted).await["status"], "accepted");

    let detail = get_auth(
        build_test_app(pool),
        &format!("/api/jobs/{}", job.id),
        &token,
    )
    .await;
    let detail = body_json(detail).await;
    assert_eq!(detail["status"], "in_progress");
    assert_eq!(detail["my_application_status"], "accepted");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_anonymous_feed_and_missing_job(pool: SqlitePool) {
    let client = create_user(&pool, "client@example.com", Role::Client).await;
    create_job(&pool, &client, "Public gig").await;

    let feed = get(build_test_app(pool.clone()), "/api/jobs").await;
    assert_eq!(feed.status(), StatusCode::OK);
    let feed = body_json(feed).await;
    assert_eq!(feed[0]["title"], "Public gig");
    assert_eq!(feed[0]["creator_name"], "client");

    let missing = get(build_test_app(pool), "/api/jobs/9999").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(missing).await["code"], "NOT_FOUND");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_admin_routes_reject_regular_users(pool: SqlitePool) {
    create_user(&pool, "client@example.com", Role::Client).await;
    let token = login(build_test_app(pool.clone()), "client@example.com").await;

    let response = post_json_auth(
        build_test_app(pool),
        "/api/admin/stats/resync",
        &token,
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
