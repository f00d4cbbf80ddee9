use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::{
    db::models::{Application, Role},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::applications::{self, ApplicationView},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_applications))
        .route("/:id/accept", post(accept))
        .route("/:id/reject", post(reject))
}

/// Freelancers see what they applied to, clients see applications on their jobs.
async fn list_applications(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ApplicationView>>> {
    let applications = match user.role {
        Role::Freelancer => applications::list_for_freelancer(&state.db.pool, &user.email).await?,
        Role::Client => applications::list_for_client(&state.db.pool, &user.email).await?,
        Role::Admin => {
            return Err(AppError::Forbidden(
                "Administrators have no applications".to_string(),
            ))
        }
    };
    Ok(Json(applications))
}

async fn accept(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Application>> {
    let application = applications::accept(&state.db.pool, id, &user, &state.config.policy).await?;
    Ok(Json(application))
}

async fn reject(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Application>> {
    let application = applications::reject(&state.db.pool, id, &user).await?;
    Ok(Json(application))
}
