use axum::{
    extract::{Multipart, Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use crate::{
    db::models::{Role, User},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::{auth::session_cookies, form::MultipartForm},
    services::{
        auth::create_token,
        reviews::{self, ReviewView},
        storage::{is_image, UploadFolder},
        users::{self, ProfileUpdate, UserFilter},
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(my_profile).put(update_profile))
        .route("/profile/avatar", post(upload_avatar))
        .route("/profile/portfolio", post(add_portfolio))
        .route("/profile/portfolio/file", delete(remove_portfolio_file))
        .route("/profile/portfolio/link", delete(remove_portfolio_link))
        .route("/users", get(list_users))
        .route("/users/:email", get(public_profile))
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: User,
    /// Present when the email changed and the session had to be re-issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub user: User,
    pub reviews: Vec<ReviewView>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveFileRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveLinkRequest {
    pub link: String,
}

async fn my_profile(user: AuthUser) -> Json<User> {
    Json(user.0)
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    jar: CookieJar,
    Json(body): Json<ProfileUpdate>,
) -> Result<(CookieJar, Json<ProfileResponse>)> {
    let updated = users::update_profile(&state.db.pool, &user, body).await?;

    // Sessions are keyed by email
    if updated.email != user.email {
        let token = create_token(
            &updated.email,
            &state.config.jwt_secret,
            state.config.token_ttl_minutes,
        )?;
        tracing::info!(user_id = updated.id, "Email changed, session re-issued");
        let jar = session_cookies(&state, jar, token.clone(), &updated.email);
        return Ok((
            jar,
            Json(ProfileResponse {
                user: updated,
                token: Some(token),
            }),
        ));
    }

    Ok((
        jar,
        Json(ProfileResponse {
            user: updated,
            token: None,
        }),
    ))
}

async fn upload_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<User>> {
    let form = MultipartForm::read(multipart).await?;
    let file = form
        .files
        .first()
        .ok_or_else(|| AppError::Validation("No avatar file provided".to_string()))?;

    if !is_image(&file.file_name) {
        return Err(AppError::Validation(
            "Avatar must be a JPG, PNG or GIF image".to_string(),
        ));
    }

    let url = state
        .storage
        .save(UploadFolder::Avatars, &file.file_name, &file.data)
        .await?;

    let update = ProfileUpdate {
        avatar: Some(url),
        ..Default::default()
    };
    let updated = users::update_profile(&state.db.pool, &user, update).await?;

    if let Some(old) = &user.avatar {
        state.storage.delete_all(std::slice::from_ref(old)).await;
    }

    Ok(Json(updated))
}

/// Accepts portfolio files plus `links` fields, one link per field or per line.
async fn add_portfolio(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<User>> {
    let form = MultipartForm::read(multipart).await?;

    let links: Vec<String> = form
        .all("links")
        .iter()
        .flat_map(|value| value.lines())
        .map(str::to_string)
        .collect();

    let mut updated = user.0.clone();
    if !form.files.is_empty() {
        let urls = form.save_files(&state.storage, UploadFolder::Portfolio).await?;
        updated = users::add_portfolio_files(&state.db.pool, &updated, urls).await?;
    }
    if !links.is_empty() {
        updated = users::add_portfolio_links(&state.db.pool, &updated, links).await?;
    }

    Ok(Json(updated))
}

async fn remove_portfolio_file(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<RemoveFileRequest>,
) -> Result<Json<User>> {
    let (updated, removed) = users::remove_portfolio_file(&state.db.pool, &user, &body.url).await?;
    if !removed {
        return Err(AppError::NotFound("File is not in your portfolio".to_string()));
    }

    state.storage.delete(&body.url).await?;
    Ok(Json(updated))
}

async fn remove_portfolio_link(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<RemoveLinkRequest>,
) -> Result<Json<User>> {
    let updated = users::remove_portfolio_link(&state.db.pool, &user, &body.link).await?;
    Ok(Json(updated))
}

async fn list_users(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<User>>> {
    let users = users::list_users(&state.db.pool, &filter).await?;
    Ok(Json(users))
}

async fn public_profile(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(email): Path<String>,
) -> Result<Json<PublicProfile>> {
    let user = users::get_by_email(&state.db.pool, &email.trim().to_lowercase()).await?;
    let reviews = if user.role == Role::Freelancer {
        reviews::reviews_for_freelancer(&state.db.pool, &user.email).await?
    } else {
        Vec::new()
    };
    Ok(Json(PublicProfile { user, reviews }))
}
