use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    config::{ApplyPolicy, MarketPolicy},
    db::models::{Application, ApplicationStatus, Job, JobStatus, Role, User},
    error::{is_unique_violation, AppError, Result},
    services::{jobs, stats},
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied { application: Application },
    AlreadyApplied,
}

/// An application joined with the job and freelancer details the dashboards show.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApplicationView {
    pub id: i64,
    pub job_id: i64,
    pub job_title: String,
    pub job_status: JobStatus,
    pub creator_email: String,
    pub freelancer_email: String,
    pub freelancer_name: Option<String>,
    pub freelancer_about: Option<String>,
    pub freelancer_skills: Option<String>,
    pub freelancer_rating: f64,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
}

const VIEW_SELECT: &str = r#"
    SELECT a.id, a.job_id, j.title AS job_title, j.status AS job_status, j.creator_email,
           a.freelancer_email, u.name AS freelancer_name, u.about_me AS freelancer_about,
           u.skills AS freelancer_skills, u.rating AS freelancer_rating, a.status, a.created_at
    FROM applications a
    JOIN jobs j ON j.id = a.job_id
    JOIN users u ON u.email = a.freelancer_email
"#;

fn admits_applications(policy: ApplyPolicy, status: JobStatus) -> bool {
    match policy {
        ApplyPolicy::OpenOnly => status == JobStatus::Open,
        ApplyPolicy::AnyUnfinished => status != JobStatus::Done,
    }
}

pub async fn apply(
    pool: &SqlitePool,
    job_id: i64,
    freelancer: &User,
    policy: &MarketPolicy,
) -> Result<ApplyOutcome> {
    if freelancer.role != Role::Freelancer {
        return Err(AppError::Forbidden(
            "Only freelancers can apply to jobs".to_string(),
        ));
    }

    let job = jobs::get_job(pool, job_id).await?;
    if !admits_applications(policy.apply, job.status) {
        return Err(AppError::Validation(
            "This job is not accepting applications".to_string(),
        ));
    }

    // The UNIQUE(job_id, freelancer_email) constraint settles duplicates, including races
    let inserted = sqlx::query(
        "INSERT INTO applications (job_id, freelancer_email, status, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(job_id)
    .bind(&freelancer.email)
    .bind(ApplicationStatus::Pending)
    .bind(Utc::now())
    .execute(pool)
    .await;

    match inserted {
        Ok(result) => {
            let application = get(pool, result.last_insert_rowid()).await?;
            tracing::info!(job_id, freelancer = %freelancer.email, "Application submitted");
            Ok(ApplyOutcome::Applied { application })
        }
        Err(e) if is_unique_violation(&e) => {
            tracing::debug!(job_id, freelancer = %freelancer.email, "Duplicate application ignored");
            Ok(ApplyOutcome::AlreadyApplied)
        }
        Err(e) => Err(e.into()),
    }
}

async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Application> {
    sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Application not found".to_string()))
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Application> {
    let mut conn = pool.acquire().await?;
    find(&mut conn, id).await
}

async fn set_status(conn: &mut SqliteConnection, id: i64, status: ApplicationStatus) -> Result<()> {
    sqlx::query("UPDATE applications SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn set_job_status(conn: &mut SqliteConnection, job_id: i64, status: JobStatus) -> Result<()> {
    sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
        .bind(status)
        .bind(job_id)
        .execute(conn)
        .await?;
    Ok(())
}

fn ensure_owner(job: &Job, actor: &User) -> Result<()> {
    if job.creator_email != actor.email {
        return Err(AppError::Forbidden(
            "Only the job's creator can manage its applications".to_string(),
        ));
    }
    Ok(())
}

/// Accepts an application and moves its job to `in_progress`.
pub async fn accept(
    pool: &SqlitePool,
    application_id: i64,
    actor: &User,
    policy: &MarketPolicy,
) -> Result<Application> {
    let mut tx = pool.begin().await?;

    let application = find(&mut tx, application_id).await?;
    let job = jobs::load_job(&mut tx, application.job_id).await?;
    ensure_owner(&job, actor)?;

    match application.status {
        ApplicationStatus::Accepted => return Ok(application),
        ApplicationStatus::Completed => {
            return Err(AppError::Validation(
                "This application is already completed".to_string(),
            ))
        }
        ApplicationStatus::Pending | ApplicationStatus::Rejected => {}
    }

    if job.status == JobStatus::Done {
        return Err(AppError::Validation("This job is already done".to_string()));
    }

    if policy.single_accepted_application {
        let other: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM applications WHERE job_id = ? AND id <> ? AND status IN ('accepted', 'completed')",
        )
        .bind(job.id)
        .bind(application.id)
        .fetch_one(&mut *tx)
        .await?;

        if other > 0 {
            return Err(AppError::Conflict(
                "Another freelancer has already been accepted for this job".to_string(),
            ));
        }
    }

    set_status(&mut tx, application.id, ApplicationStatus::Accepted).await?;
    set_job_status(&mut tx, job.id, JobStatus::InProgress).await?;
    let application = find(&mut tx, application.id).await?;

    tx.commit().await?;
    tracing::info!(
        application_id = application.id,
        job_id = job.id,
        freelancer = %application.freelancer_email,
        "Application accepted, job in progress"
    );
    Ok(application)
}

/// Rejects a pending application. Accepted or completed ones stay as they are.
pub async fn reject(pool: &SqlitePool, application_id: i64, actor: &User) -> Result<Application> {
    let mut tx = pool.begin().await?;

    let application = find(&mut tx, application_id).await?;
    let job = jobs::load_job(&mut tx, application.job_id).await?;
    ensure_owner(&job, actor)?;

    match application.status {
        ApplicationStatus::Rejected => return Ok(application),
        ApplicationStatus::Pending => {}
        ApplicationStatus::Accepted | ApplicationStatus::Completed => {
            return Err(AppError::Validation(
                "Only pending applications can be rejected".to_string(),
            ))
        }
    }

    set_status(&mut tx, application.id, ApplicationStatus::Rejected).await?;
    let application = find(&mut tx, application.id).await?;
    tx.commit().await?;

    tracing::info!(application_id = application.id, job_id = job.id, "Application rejected");
    Ok(application)
}

/// The accepted freelancer marks the job done; their application becomes `completed`.
pub async fn complete(pool: &SqlitePool, job_id: i64, freelancer: &User) -> Result<Job> {
    let mut tx = pool.begin().await?;

    let job = jobs::load_job(&mut tx, job_id).await?;
    let application = sqlx::query_as::<_, Application>(
        "SELECT * FROM applications WHERE job_id = ? AND freelancer_email = ?",
    )
    .bind(job_id)
    .bind(&freelancer.email)
    .fetch_optional(&mut *tx)
    .await?;

    let application = match application {
        Some(a) if a.status == ApplicationStatus::Accepted => a,
        _ => {
            return Err(AppError::Forbidden(
                "Only the accepted freelancer can complete this job".to_string(),
            ))
        }
    };

    if job.status != JobStatus::InProgress {
        return Err(AppError::Validation("This job is not in progress".to_string()));
    }

    set_job_status(&mut tx, job.id, JobStatus::Done).await?;
    set_status(&mut tx, application.id, ApplicationStatus::Completed).await?;
    stats::recompute(&mut tx, &freelancer.email).await?;
    let job = jobs::load_job(&mut tx, job.id).await?;

    tx.commit().await?;
    tracing::info!(job_id = job.id, freelancer = %freelancer.email, "Job completed");
    Ok(job)
}

pub async fn list_for_job(pool: &SqlitePool, job_id: i64) -> Result<Vec<ApplicationView>> {
    let query = format!("{VIEW_SELECT} WHERE a.job_id = ? ORDER BY a.id DESC");
    let applications = sqlx::query_as::<_, ApplicationView>(&query)
        .bind(job_id)
        .fetch_all(pool)
        .await?;
    Ok(applications)
}

pub async fn list_for_freelancer(pool: &SqlitePool, email: &str) -> Result<Vec<ApplicationView>> {
    let query = format!("{VIEW_SELECT} WHERE a.freelancer_email = ? ORDER BY a.id DESC");
    let applications = sqlx::query_as::<_, ApplicationView>(&query)
        .bind(email)
        .fetch_all(pool)
        .await?;
    Ok(applications)
}

/// Every application on jobs created by `email`.
pub async fn list_for_client(pool: &SqlitePool, email: &str) -> Result<Vec<ApplicationView>> {
    let query = format!("{VIEW_SELECT} WHERE j.creator_email = ? ORDER BY a.id DESC");
    let applications = sqlx::query_as::<_, ApplicationView>(&query)
        .bind(email)
        .fetch_all(pool)
        .await?;
    Ok(applications)
}

pub async fn status_for(
    pool: &SqlitePool,
    job_id: i64,
    freelancer_email: &str,
) -> Result<Option<ApplicationStatus>> {
    let status = sqlx::query_scalar(
        "SELECT status FROM applications WHERE job_id = ? AND freelancer_email = ?",
    )
    .bind(job_id)
    .bind(freelancer_email)
    .fetch_optional(pool)
    .await?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_only_policy_admits_open_jobs_only() {
        assert!(admits_applications(ApplyPolicy::OpenOnly, JobStatus::Open));
        assert!(!admits_applications(ApplyPolicy::OpenOnly, JobStatus::InProgress));
        assert!(!admits_applications(ApplyPolicy::OpenOnly, JobStatus::Done));
    }

    #[test]
    fn permissive_policy_still_refuses_done_jobs() {
        assert!(admits_applications(ApplyPolicy::AnyUnfinished, JobStatus::InProgress));
        assert!(!admits_applications(ApplyPolicy::AnyUnfinished, JobStatus::Done));
    }
}
