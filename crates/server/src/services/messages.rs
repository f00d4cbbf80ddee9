use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    db::models::{serialize_avatar, Message, User},
    error::{AppError, Result},
    services::{jobs, users},
};

pub const MAX_MESSAGE_LEN: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub receiver_email: String,
    pub body: String,
    #[serde(default)]
    pub job_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageView {
    pub id: i64,
    pub sender_email: String,
    pub sender_name: Option<String>,
    #[serde(serialize_with = "serialize_avatar")]
    pub sender_avatar: Option<String>,
    pub receiver_email: String,
    pub job_id: Option<i64>,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollResult {
    pub messages: Vec<MessageView>,
    pub last_message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationKind {
    Direct {
        other_email: String,
        other_name: Option<String>,
        #[serde(serialize_with = "serialize_avatar")]
        other_avatar: Option<String>,
    },
    Project {
        job_id: i64,
        job_title: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    #[serde(flatten)]
    pub kind: ConversationKind,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: i64,
}

#[derive(sqlx::FromRow)]
struct DirectRow {
    other_email: String,
    other_name: Option<String>,
    other_avatar: Option<String>,
    last_message_at: DateTime<Utc>,
    unread_count: i64,
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    job_id: i64,
    job_title: String,
    last_message_at: DateTime<Utc>,
    unread_count: i64,
}

pub async fn send(pool: &SqlitePool, sender: &User, message: NewMessage) -> Result<Message> {
    let receiver_email = message.receiver_email.trim().to_lowercase();
    if receiver_email == sender.email {
        return Err(AppError::Validation(
            "You cannot send a message to yourself".to_string(),
        ));
    }

    let body = message.body.trim();
    if body.is_empty() {
        return Err(AppError::Validation("Message cannot be empty".to_string()));
    }
    if body.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::Validation(format!(
            "Messages are limited to {MAX_MESSAGE_LEN} characters"
        )));
    }

    let receiver = users::find_by_email(pool, &receiver_email)
        .await?
        .ok_or_else(|| AppError::NotFound("Recipient not found".to_string()))?;

    if let Some(job_id) = message.job_id {
        let mut conn = pool.acquire().await?;
        let job = jobs::load_job(&mut conn, job_id).await?;
        let both_participate = jobs::is_participant(&mut conn, &job, &sender.email).await?
            && jobs::is_participant(&mut conn, &job, &receiver.email).await?;
        if !both_participate {
            return Err(AppError::Forbidden(
                "Project chat is limited to the job's participants".to_string(),
            ));
        }
    }

    let id = sqlx::query(
        "INSERT INTO messages (sender_email, receiver_email, job_id, body, is_read, created_at) VALUES (?, ?, ?, ?, 0, ?)",
    )
    .bind(&sender.email)
    .bind(&receiver.email)
    .bind(message.job_id)
    .bind(body)
    .bind(Utc::now())
    .execute(pool)
    .await?
    .last_insert_rowid();

    let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;

    tracing::debug!(message_id = id, job_id = ?message.job_id, "Message sent");
    Ok(message)
}

/// Messages between `me` and `other` in one conversation, oldest first, with ids above `after_id`.
pub async fn thread(
    pool: &SqlitePool,
    me: &str,
    other: &str,
    job_id: Option<i64>,
    after_id: i64,
) -> Result<Vec<MessageView>> {
    let messages = sqlx::query_as::<_, MessageView>(
        r#"
        SELECT m.id, m.sender_email, u.name AS sender_name, u.avatar AS sender_avatar,
               m.receiver_email, m.job_id, m.body, m.is_read, m.created_at
        FROM messages m
        JOIN users u ON u.email = m.sender_email
        WHERE ((m.sender_email = ?1 AND m.receiver_email = ?2)
            OR (m.sender_email = ?2 AND m.receiver_email = ?1))
          AND ((?3 IS NULL AND m.job_id IS NULL) OR m.job_id = ?3)
          AND m.id > ?4
        ORDER BY m.id ASC
        "#,
    )
    .bind(me)
    .bind(other)
    .bind(job_id)
    .bind(after_id)
    .fetch_all(pool)
    .await?;
    Ok(messages)
}

/// Marks messages from `other` to `me` in one conversation as read.
/// Messages `me` sent are left alone.
pub async fn mark_read(pool: &SqlitePool, me: &str, other: &str, job_id: Option<i64>) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE messages SET is_read = 1
        WHERE sender_email = ?1 AND receiver_email = ?2
          AND ((?3 IS NULL AND job_id IS NULL) OR job_id = ?3)
          AND is_read = 0
        "#,
    )
    .bind(other)
    .bind(me)
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Returns messages newer than `last_seen_id` and marks the conversation read when there are any.
pub async fn poll(
    pool: &SqlitePool,
    me: &str,
    other: &str,
    job_id: Option<i64>,
    last_seen_id: i64,
) -> Result<PollResult> {
    let messages = thread(pool, me, other, job_id, last_seen_id).await?;

    if !messages.is_empty() {
        mark_read(pool, me, other, job_id).await?;
    }

    let last_message_id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(id) FROM messages
        WHERE ((sender_email = ?1 AND receiver_email = ?2)
            OR (sender_email = ?2 AND receiver_email = ?1))
          AND ((?3 IS NULL AND job_id IS NULL) OR job_id = ?3)
        "#,
    )
    .bind(me)
    .bind(other)
    .bind(job_id)
    .fetch_one(pool)
    .await?;

    Ok(PollResult {
        messages,
        last_message_id: last_message_id.unwrap_or(0),
    })
}

pub async fn unread_count(pool: &SqlitePool, me: &str) -> Result<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages WHERE receiver_email = ? AND is_read = 0",
    )
    .bind(me)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Direct conversations grouped by the other party and project conversations grouped by
/// job, merged and sorted most recent first.
pub async fn conversations(pool: &SqlitePool, me: &str) -> Result<Vec<Conversation>> {
    let direct = sqlx::query_as::<_, DirectRow>(
        r#"
        SELECT t.other_email, u.name AS other_name, u.avatar AS other_avatar,
               MAX(t.created_at) AS last_message_at, SUM(t.unread) AS unread_count
        FROM (
            SELECT CASE WHEN sender_email = ?1 THEN receiver_email ELSE sender_email END AS other_email,
                   created_at,
                   CASE WHEN receiver_email = ?1 AND is_read = 0 THEN 1 ELSE 0 END AS unread
            FROM messages
            WHERE (sender_email = ?1 OR receiver_email = ?1) AND job_id IS NULL
        ) t
        JOIN users u ON u.email = t.other_email
        GROUP BY t.other_email, u.name, u.avatar
        "#,
    )
    .bind(me)
    .fetch_all(pool)
    .await?;

    let projects = sqlx::query_as::<_, ProjectRow>(
        r#"
        SELECT m.job_id, j.title AS job_title, MAX(m.created_at) AS last_message_at,
               SUM(CASE WHEN m.receiver_email = ?1 AND m.is_read = 0 THEN 1 ELSE 0 END) AS unread_count
        FROM messages m
        JOIN jobs j ON j.id = m.job_id
        WHERE (m.sender_email = ?1 OR m.receiver_email = ?1) AND m.job_id IS NOT NULL
        GROUP BY m.job_id, j.title
        "#,
    )
    .bind(me)
    .fetch_all(pool)
    .await?;

    let mut merged: Vec<Conversation> = direct
        .into_iter()
        .map(|row| Conversation {
            kind: ConversationKind::Direct {
                other_email: row.other_email,
                other_name: row.other_name,
                other_avatar: row.other_avatar,
            },
            last_message_at: row.last_message_at,
            unread_count: row.unread_count,
        })
        .chain(projects.into_iter().map(|row| Conversation {
            kind: ConversationKind::Project {
                job_id: row.job_id,
                job_title: row.job_title,
            },
            last_message_at: row.last_message_at,
            unread_count: row.unread_count,
        }))
        .collect();

    merged.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    Ok(merged)
}

/// The other side of a job's project chat: the creator talks to the accepted freelancer
/// and vice versa.
pub async fn project_chat_partner(pool: &SqlitePool, job_id: i64, me: &User) -> Result<String> {
    let mut conn = pool.acquire().await?;
    let job = jobs::load_job(&mut conn, job_id).await?;

    if job.creator_email == me.email {
        return jobs::accepted_freelancer(&mut conn, job.id)
            .await?
            .ok_or_else(|| {
                AppError::Validation("Nobody has been accepted on this job yet".to_string())
            });
    }

    if jobs::is_participant(&mut conn, &job, &me.email).await? {
        return Ok(job.creator_email);
    }

    Err(AppError::Forbidden(
        "Project chat is limited to the job's participants".to_string(),
    ))
}
