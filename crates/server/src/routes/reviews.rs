use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::{
    db::models::Role,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::reviews::{self, ReviewView, ReviewableJob},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(my_reviews))
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ReviewsResponse {
    Received { reviews: Vec<ReviewView> },
    Reviewable { jobs: Vec<ReviewableJob> },
}

async fn my_reviews(State(state): State<AppState>, user: AuthUser) -> Result<Json<ReviewsResponse>> {
    let response = match user.role {
        Role::Freelancer => ReviewsResponse::Received {
            reviews: reviews::reviews_for_freelancer(&state.db.pool, &user.email).await?,
        },
        Role::Client => ReviewsResponse::Reviewable {
            jobs: reviews::reviewable_jobs(&state.db.pool, &user).await?,
        },
        Role::Admin => {
            return Err(AppError::Forbidden(
                "Administrators have no reviews".to_string(),
            ))
        }
    };
    Ok(Json(response))
}
