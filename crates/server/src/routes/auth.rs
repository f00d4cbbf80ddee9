use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::{Role, User},
    error::Result,
    middleware::auth::{AuthUser, ACCESS_TOKEN_COOKIE, EMAIL_COOKIE},
    services::{
        auth::create_token,
        users::{self, NewUser},
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

fn cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Stores the session token, plus the `user_email` cookie when the email fallback is on.
pub(crate) fn session_cookies(
    state: &AppState,
    jar: CookieJar,
    token: String,
    email: &str,
) -> CookieJar {
    let jar = jar.add(cookie(ACCESS_TOKEN_COOKIE, token));
    if state.config.allow_email_cookie {
        jar.add(cookie(EMAIL_COOKIE, email.to_string()))
    } else {
        jar
    }
}

fn issue_session(state: &AppState, jar: CookieJar, user: User) -> Result<(CookieJar, Json<AuthResponse>)> {
    let token = create_token(
        &user.email,
        &state.config.jwt_secret,
        state.config.token_ttl_minutes,
    )?;
    let jar = session_cookies(state, jar, token.clone(), &user.email);
    Ok((jar, Json(AuthResponse { token, user })))
}

async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let user = users::register(
        &state.db.pool,
        NewUser {
            email: body.email,
            password: body.password,
            name: body.name,
            role: body.role,
        },
    )
    .await?;

    issue_session(&state, jar, user)
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let user = users::authenticate(&state.db.pool, &body.email, &body.password).await?;
    tracing::info!(user_id = user.id, "User logged in");
    issue_session(&state, jar, user)
}

async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    let jar = jar
        .remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"))
        .remove(Cookie::build(EMAIL_COOKIE).path("/"));
    (jar, Json(serde_json::json!({ "success": true })))
}

async fn me(user: AuthUser) -> Json<User> {
    Json(user.0)
}
