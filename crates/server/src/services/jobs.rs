use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    db::models::{
        encode_list, serialize_avatar, ApplicationStatus, Job, JobStatus, Priority, Role, User,
    },
    error::{AppError, Result},
};

#[derive(Debug, Clone)]
pub struct NewJob {
    pub title: String,
    pub description: String,
    pub deadline: NaiveDate,
    pub priority: Priority,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobUpdate {
    pub title: String,
    pub description: String,
    pub deadline: String,
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Participant {
    pub email: String,
    pub name: Option<String>,
    #[serde(serialize_with = "serialize_avatar")]
    pub avatar: Option<String>,
    pub role: Role,
    pub application_status: Option<ApplicationStatus>,
}

/// Parses a `YYYY-MM-DD` deadline and rejects dates before `today`.
pub fn parse_deadline(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AppError::Validation("Deadline is required".to_string()));
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| AppError::Validation("Invalid deadline format, expected YYYY-MM-DD".to_string()))?;

    if date < today {
        return Err(AppError::Validation("Deadline cannot be in the past".to_string()));
    }

    Ok(date)
}

fn validate_text(title: &str, description: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("Job title is required".to_string()));
    }
    if description.trim().is_empty() {
        return Err(AppError::Validation("Job description is required".to_string()));
    }
    Ok(())
}

pub async fn create_job(pool: &SqlitePool, creator: &User, new_job: NewJob) -> Result<Job> {
    if creator.role != Role::Client {
        return Err(AppError::Forbidden("Only clients can post jobs".to_string()));
    }
    validate_text(&new_job.title, &new_job.description)?;

    let id = sqlx::query(
        "INSERT INTO jobs (title, description, deadline, status, priority, creator_email, files, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new_job.title.trim())
    .bind(new_job.description.trim())
    .bind(new_job.deadline)
    .bind(JobStatus::Open)
    .bind(new_job.priority)
    .bind(&creator.email)
    .bind(encode_list(&new_job.files))
    .bind(Utc::now())
    .execute(pool)
    .await?
    .last_insert_rowid();

    tracing::info!(job_id = id, creator = %creator.email, "Created job");
    get_job(pool, id).await
}

pub async fn find_job(conn: &mut SqliteConnection, id: i64) -> Result<Option<Job>> {
    let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(job)
}

pub async fn get_job(pool: &SqlitePool, id: i64) -> Result<Job> {
    let mut conn = pool.acquire().await?;
    load_job(&mut conn, id).await
}

pub(crate) async fn load_job(conn: &mut SqliteConnection, id: i64) -> Result<Job> {
    find_job(conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))
}

fn ensure_creator(job: &Job, user: &User, action: &str) -> Result<()> {
    if job.creator_email != user.email {
        return Err(AppError::Forbidden(format!(
            "Only the job's creator can {action}"
        )));
    }
    Ok(())
}

/// Edits the descriptive fields of a job. Status is never touched here.
pub async fn update_job(
    pool: &SqlitePool,
    id: i64,
    editor: &User,
    update: JobUpdate,
    today: NaiveDate,
) -> Result<Job> {
    let job = get_job(pool, id).await?;
    ensure_creator(&job, editor, "edit it")?;
    validate_text(&update.title, &update.description)?;
    let deadline = parse_deadline(&update.deadline, today)?;
    let priority = update.priority.unwrap_or(job.priority);

    sqlx::query("UPDATE jobs SET title = ?, description = ?, deadline = ?, priority = ? WHERE id = ?")
        .bind(update.title.trim())
        .bind(update.description.trim())
        .bind(deadline)
        .bind(priority)
        .bind(id)
        .execute(pool)
        .await?;

    get_job(pool, id).await
}

/// Deletes a job together with its applications, reviews, messages and comments.
/// Returns the deleted job so the caller can clean up its attached files.
pub async fn delete_job(pool: &SqlitePool, id: i64, actor: &User) -> Result<Job> {
    let mut tx = pool.begin().await?;
    let job = load_job(&mut tx, id).await?;
    ensure_creator(&job, actor, "delete it")?;

    // Reviews go away with the job, so the affected freelancers need fresh stats
    let reviewed: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT freelancer_email FROM applications WHERE job_id = ? AND status IN ('accepted', 'completed')",
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    for email in &reviewed {
        crate::services::stats::recompute(&mut tx, email).await?;
    }

    tx.commit().await?;
    tracing::info!(job_id = id, "Deleted job");
    Ok(job)
}

pub async fn is_participant(conn: &mut SqliteConnection, job: &Job, email: &str) -> Result<bool> {
    if job.creator_email == email {
        return Ok(true);
    }

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM applications WHERE job_id = ? AND freelancer_email = ? AND status IN ('accepted', 'completed')",
    )
    .bind(job.id)
    .bind(email)
    .fetch_one(conn)
    .await?;

    Ok(count > 0)
}

/// The freelancer currently accepted on, or done with, the job.
pub async fn accepted_freelancer(conn: &mut SqliteConnection, job_id: i64) -> Result<Option<String>> {
    let email = sqlx::query_scalar(
        "SELECT freelancer_email FROM applications WHERE job_id = ? AND status IN ('accepted', 'completed') ORDER BY id LIMIT 1",
    )
    .bind(job_id)
    .fetch_optional(conn)
    .await?;
    Ok(email)
}

/// The job's creator followed by its accepted or completed freelancers.
pub async fn participants(pool: &SqlitePool, job_id: i64) -> Result<Vec<Participant>> {
    let participants = sqlx::query_as::<_, Participant>(
        r#"
        SELECT u.email, u.name, u.avatar, u.role, NULL AS application_status
        FROM jobs j
        JOIN users u ON u.email = j.creator_email
        WHERE j.id = ?1
        UNION ALL
        SELECT u.email, u.name, u.avatar, u.role, a.status AS application_status
        FROM applications a
        JOIN users u ON u.email = a.freelancer_email
        WHERE a.job_id = ?1 AND a.status IN ('accepted', 'completed')
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;
    Ok(participants)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    #[test]
    fn deadline_accepts_today_and_later() {
        assert_eq!(parse_deadline("2026-03-10", today()).unwrap(), today());
        assert!(parse_deadline(" 2027-01-01 ", today()).is_ok());
    }

    #[test]
    fn deadline_rejects_past_empty_and_malformed() {
        assert!(matches!(
            parse_deadline("2026-03-09", today()),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(parse_deadline("", today()), Err(AppError::Validation(_))));
        assert!(matches!(
            parse_deadline("10.03.2026", today()),
            Err(AppError::Validation(_))
        ));
    }
}
