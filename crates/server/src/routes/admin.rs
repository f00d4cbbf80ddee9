use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::{
    error::Result,
    middleware::auth::require_admin,
    services::{
        comments::{self, CommentView},
        stats,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats/resync", post(resync_stats))
        .route("/comments", get(list_comments))
        .route_layer(middleware::from_fn(require_admin))
}

#[derive(Debug, Serialize)]
pub struct ResyncResponse {
    pub updated: usize,
}

async fn resync_stats(State(state): State<AppState>) -> Result<Json<ResyncResponse>> {
    let updated = stats::resync_all(&state.db.pool).await?;
    Ok(Json(ResyncResponse { updated }))
}

async fn list_comments(State(state): State<AppState>) -> Result<Json<Vec<CommentView>>> {
    let comments = comments::list_all(&state.db.pool).await?;
    Ok(Json(comments))
}
