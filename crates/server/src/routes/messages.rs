use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::Message,
    error::Result,
    middleware::auth::AuthUser,
    services::{
        messages::{self, Conversation, NewMessage, PollResult},
        users,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(send_message))
        .route("/conversations", get(list_conversations))
        .route("/unread", get(unread_count))
        .route("/with/:email", get(poll_thread))
        .route("/with/:email/read", post(mark_read))
}

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    pub job_id: Option<i64>,
    #[serde(default)]
    pub last_message_id: i64,
}

#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub marked: u64,
}

async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<NewMessage>,
) -> Result<Json<Message>> {
    let message = messages::send(&state.db.pool, &user, body).await?;
    Ok(Json(message))
}

async fn list_conversations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Conversation>>> {
    let conversations = messages::conversations(&state.db.pool, &user.email).await?;
    Ok(Json(conversations))
}

async fn unread_count(State(state): State<AppState>, user: AuthUser) -> Result<Json<UnreadResponse>> {
    let unread = messages::unread_count(&state.db.pool, &user.email).await?;
    Ok(Json(UnreadResponse { unread }))
}

/// Messages newer than `last_message_id`; the first call with 0 returns the whole thread.
async fn poll_thread(
    State(state): State<AppState>,
    user: AuthUser,
    Path(email): Path<String>,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<PollResult>> {
    let other = users::get_by_email(&state.db.pool, &email.trim().to_lowercase()).await?;
    let result = messages::poll(
        &state.db.pool,
        &user.email,
        &other.email,
        query.job_id,
        query.last_message_id,
    )
    .await?;
    Ok(Json(result))
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(email): Path<String>,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<MarkReadResponse>> {
    let marked = messages::mark_read(
        &state.db.pool,
        &user.email,
        &email.trim().to_lowercase(),
        query.job_id,
    )
    .await?;
    Ok(Json(MarkReadResponse { marked }))
}
