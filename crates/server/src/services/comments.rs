use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    db::models::{serialize_avatar, ProjectComment, User},
    error::{AppError, Result},
    services::jobs,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CommentView {
    pub id: i64,
    pub job_id: i64,
    pub job_title: String,
    pub author_email: String,
    pub author_name: Option<String>,
    #[serde(serialize_with = "serialize_avatar")]
    pub author_avatar: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

const VIEW_SELECT: &str = r#"
    SELECT c.id, c.job_id, j.title AS job_title, c.author_email, u.name AS author_name,
           u.avatar AS author_avatar, c.body, c.created_at
    FROM project_comments c
    JOIN jobs j ON j.id = c.job_id
    JOIN users u ON u.email = c.author_email
"#;

/// Only a job's participants may comment on it.
pub async fn can_comment(pool: &SqlitePool, job_id: i64, email: &str) -> Result<bool> {
    let mut conn = pool.acquire().await?;
    match jobs::find_job(&mut conn, job_id).await? {
        Some(job) => jobs::is_participant(&mut conn, &job, email).await,
        None => Ok(false),
    }
}

pub async fn create_comment(
    pool: &SqlitePool,
    job_id: i64,
    author: &User,
    comment: NewComment,
) -> Result<ProjectComment> {
    let mut conn = pool.acquire().await?;
    let job = jobs::load_job(&mut conn, job_id).await?;

    if !jobs::is_participant(&mut conn, &job, &author.email).await? {
        return Err(AppError::Forbidden(
            "Only the job's participants can comment".to_string(),
        ));
    }

    let body = comment.body.trim();
    if body.is_empty() {
        return Err(AppError::Validation("Comment cannot be empty".to_string()));
    }

    let id = sqlx::query(
        "INSERT INTO project_comments (job_id, author_email, body, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(job.id)
    .bind(&author.email)
    .bind(body)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    let comment = sqlx::query_as::<_, ProjectComment>("SELECT * FROM project_comments WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

    tracing::debug!(comment_id = id, job_id, author = %author.email, "Comment added");
    Ok(comment)
}

pub async fn list_for_job(pool: &SqlitePool, job_id: i64) -> Result<Vec<CommentView>> {
    let query = format!("{VIEW_SELECT} WHERE c.job_id = ? ORDER BY c.id ASC");
    let comments = sqlx::query_as::<_, CommentView>(&query)
        .bind(job_id)
        .fetch_all(pool)
        .await?;
    Ok(comments)
}

/// Every comment on the platform, newest first. Moderation view.
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<CommentView>> {
    let query = format!("{VIEW_SELECT} ORDER BY c.id DESC");
    let comments = sqlx::query_as::<_, CommentView>(&query)
        .fetch_all(pool)
        .await?;
    Ok(comments)
}

pub async fn delete_comment(pool: &SqlitePool, id: i64, actor: &User) -> Result<()> {
    let author: Option<String> =
        sqlx::query_scalar("SELECT author_email FROM project_comments WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    let author = author.ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;
    if !actor.is_admin() && author != actor.email {
        return Err(AppError::Forbidden(
            "Only the author or an admin can delete this comment".to_string(),
        ));
    }

    sqlx::query("DELETE FROM project_comments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    tracing::info!(comment_id = id, by = %actor.email, "Comment deleted");
    Ok(())
}
