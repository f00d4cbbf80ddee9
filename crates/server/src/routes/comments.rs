use axum::{
    extract::{Path, State},
    routing::delete,
    Json, Router,
};

use crate::{error::Result, middleware::auth::AuthUser, services::comments, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/:id", delete(delete_comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    comments::delete_comment(&state.db.pool, id, &user).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
