use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    db::models::{ApplicationStatus, Job, JobStatus, Review, User},
    error::{is_unique_violation, AppError, Result},
    services::{
        jobs,
        stats::{self, FreelancerStats},
    },
};

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;
pub const MAX_COMMENT_LEN: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewCreated {
    pub review: Review,
    pub stats: FreelancerStats,
}

/// A review as shown on a freelancer's profile.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReviewView {
    pub id: i64,
    pub job_id: i64,
    pub job_title: String,
    pub client_email: String,
    pub client_name: Option<String>,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One of a client's finished jobs, with whether its freelancer has been reviewed.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewableJob {
    pub job: Job,
    pub freelancer_email: Option<String>,
    pub has_review: bool,
}

fn validate(review: &NewReview) -> Result<Option<String>> {
    if !(MIN_RATING..=MAX_RATING).contains(&review.rating) {
        return Err(AppError::Validation(format!(
            "Rating must be between {MIN_RATING} and {MAX_RATING}"
        )));
    }

    let comment = review
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    if comment
        .as_deref()
        .is_some_and(|c| c.chars().count() > MAX_COMMENT_LEN)
    {
        return Err(AppError::Validation(format!(
            "Review comment is limited to {MAX_COMMENT_LEN} characters"
        )));
    }

    Ok(comment)
}

/// Records a client's review of a freelancer on a job and refreshes the freelancer's stats.
///
/// The client must own the job and the freelancer must hold an accepted or completed
/// application on it. One review per (job, freelancer, client).
pub async fn create_review(
    pool: &SqlitePool,
    job_id: i64,
    freelancer_email: &str,
    client: &User,
    review: NewReview,
) -> Result<ReviewCreated> {
    let comment = validate(&review)?;

    let mut tx = pool.begin().await?;
    let job = jobs::load_job(&mut tx, job_id).await?;

    if job.creator_email != client.email {
        return Err(AppError::Forbidden(
            "Only the job's creator can leave a review".to_string(),
        ));
    }

    let status: Option<ApplicationStatus> = sqlx::query_scalar(
        "SELECT status FROM applications WHERE job_id = ? AND freelancer_email = ?",
    )
    .bind(job_id)
    .bind(freelancer_email)
    .fetch_optional(&mut *tx)
    .await?;

    if !status.is_some_and(ApplicationStatus::is_participating) {
        return Err(AppError::Validation(
            "There is no accepted freelancer to review".to_string(),
        ));
    }

    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reviews WHERE job_id = ? AND freelancer_email = ? AND client_email = ?",
    )
    .bind(job_id)
    .bind(freelancer_email)
    .bind(&client.email)
    .fetch_one(&mut *tx)
    .await?;

    if existing > 0 {
        return Err(AppError::Conflict("Review already submitted".to_string()));
    }

    let id = sqlx::query(
        "INSERT INTO reviews (job_id, freelancer_email, client_email, rating, comment, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(job_id)
    .bind(freelancer_email)
    .bind(&client.email)
    .bind(review.rating)
    .bind(comment)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Review already submitted".to_string())
        } else {
            e.into()
        }
    })?
    .last_insert_rowid();

    let stats = stats::recompute(&mut tx, freelancer_email).await?;

    let review = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!(
        job_id,
        freelancer = %freelancer_email,
        rating = review.rating,
        new_rating = stats.rating,
        "Review created"
    );

    Ok(ReviewCreated { review, stats })
}

/// Review on behalf of the job's creator, targeting the freelancer accepted on the job.
pub async fn review_accepted_freelancer(
    pool: &SqlitePool,
    job_id: i64,
    client: &User,
    review: NewReview,
) -> Result<ReviewCreated> {
    let freelancer = {
        let mut conn = pool.acquire().await?;
        jobs::accepted_freelancer(&mut conn, job_id).await?
    };

    match freelancer {
        Some(email) => create_review(pool, job_id, &email, client, review).await,
        None => {
            // Surface NotFound for a missing job before the "nobody to review" error
            jobs::get_job(pool, job_id).await?;
            Err(AppError::Validation(
                "There is no accepted freelancer to review".to_string(),
            ))
        }
    }
}

pub async fn reviews_for_freelancer(pool: &SqlitePool, email: &str) -> Result<Vec<ReviewView>> {
    let reviews = sqlx::query_as::<_, ReviewView>(
        r#"
        SELECT r.id, r.job_id, j.title AS job_title, r.client_email, u.name AS client_name,
               r.rating, r.comment, r.created_at
        FROM reviews r
        JOIN jobs j ON j.id = r.job_id
        JOIN users u ON u.email = r.client_email
        WHERE r.freelancer_email = ?
        ORDER BY r.created_at DESC, r.id DESC
        "#,
    )
    .bind(email)
    .fetch_all(pool)
    .await?;
    Ok(reviews)
}

pub async fn reviews_for_job(pool: &SqlitePool, job_id: i64) -> Result<Vec<Review>> {
    let reviews = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE job_id = ? ORDER BY id")
        .bind(job_id)
        .fetch_all(pool)
        .await?;
    Ok(reviews)
}

pub async fn has_reviewed(
    pool: &SqlitePool,
    job_id: i64,
    client_email: &str,
    freelancer_email: &str,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reviews WHERE job_id = ? AND client_email = ? AND freelancer_email = ?",
    )
    .bind(job_id)
    .bind(client_email)
    .bind(freelancer_email)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// The client's finished jobs, each with its freelancer and review state.
pub async fn reviewable_jobs(pool: &SqlitePool, client: &User) -> Result<Vec<ReviewableJob>> {
    let done = sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs WHERE creator_email = ? AND status = ? ORDER BY id DESC",
    )
    .bind(&client.email)
    .bind(JobStatus::Done)
    .fetch_all(pool)
    .await?;

    let mut conn = pool.acquire().await?;
    let mut out = Vec::with_capacity(done.len());
    for job in done {
        let freelancer_email = jobs::accepted_freelancer(&mut conn, job.id).await?;
        let has_review = match &freelancer_email {
            Some(email) => {
                let count: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM reviews WHERE job_id = ? AND client_email = ? AND freelancer_email = ?",
                )
                .bind(job.id)
                .bind(&client.email)
                .bind(email)
                .fetch_one(&mut *conn)
                .await?;
                count > 0
            }
            None => false,
        };
        out.push(ReviewableJob {
            job,
            freelancer_email,
            has_review,
        });
    }

    Ok(out)
}
