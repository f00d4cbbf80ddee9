use std::{convert::Infallible, ops::Deref};

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    extract::CookieJar,
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{
    db::models::{Role, User},
    error::{AppError, Result},
    services::{auth, users},
    AppState,
};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const EMAIL_COOKIE: &str = "user_email";

/// The signed-in user. Rejects with 401 when the request carries no valid identity.
#[derive(Clone, Debug)]
pub struct AuthUser(pub User);

/// The signed-in user, if any.
#[derive(Clone, Debug)]
pub struct MaybeUser(pub Option<User>);

impl Deref for AuthUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

impl AuthUser {
    pub fn require_role(&self, role: Role) -> Result<()> {
        if self.0.role != role {
            return Err(AppError::Forbidden(format!(
                "This action is only available to {role} accounts"
            )));
        }
        Ok(())
    }
}

/// Resolves who is calling, in order: bearer token, `access_token` cookie, then the plain
/// email cookie when that fallback is enabled.
pub async fn resolve_identity(
    state: &AppState,
    bearer: Option<&str>,
    jar: &CookieJar,
) -> Result<Option<User>> {
    let cookie_token = jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value());

    for token in [bearer, cookie_token].into_iter().flatten() {
        if let Some(email) = auth::verify_token(token, &state.config.jwt_secret) {
            if let Some(user) = users::find_by_email(&state.db.pool, &email).await? {
                return Ok(Some(user));
            }
        }
    }

    if state.config.allow_email_cookie {
        if let Some(cookie) = jar.get(EMAIL_COOKIE) {
            let email = cookie.value().trim().to_lowercase();
            return users::find_by_email(&state.db.pool, &email).await;
        }
    }

    Ok(None)
}

/// Attaches the caller's identity to the request when one can be resolved. Handlers decide
/// whether it is required through the `AuthUser` and `MaybeUser` extractors.
pub async fn identify(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let bearer = bearer.as_ref().map(|TypedHeader(h)| h.token());

    if let Some(user) = resolve_identity(&state, bearer, &jar).await? {
        request.extensions_mut().insert(AuthUser(user));
    }

    Ok(next.run(request).await)
}

pub async fn require_admin(request: Request, next: Next) -> Result<Response> {
    match request.extensions().get::<AuthUser>() {
        Some(user) if user.is_admin() => Ok(next.run(request).await),
        Some(_) => Err(AppError::Forbidden("Administrators only".to_string())),
        None => Err(AppError::Unauthorized),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthUser>().map(|u| u.0.clone()),
        ))
    }
}
