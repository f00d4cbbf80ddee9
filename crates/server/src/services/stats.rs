use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FreelancerStats {
    pub rating: f64,
    pub completed_projects: i64,
}

/// Mean rating rounded to one decimal place, 0.0 when there is nothing to average.
/// Ties round to even, so 3.25 becomes 3.2.
pub fn rounded_rating(average: Option<f64>) -> f64 {
    match average {
        Some(avg) => (avg * 10.0).round_ties_even() / 10.0,
        None => 0.0,
    }
}

/// Recomputes the cached `rating` and `completed_projects` columns from reviews and
/// applications. Safe to call any number of times.
pub async fn recompute(conn: &mut SqliteConnection, freelancer_email: &str) -> Result<FreelancerStats> {
    let average: Option<f64> =
        sqlx::query_scalar("SELECT AVG(rating) FROM reviews WHERE freelancer_email = ?")
            .bind(freelancer_email)
            .fetch_one(&mut *conn)
            .await?;

    let completed_projects: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(DISTINCT j.id)
        FROM jobs j
        JOIN applications a ON a.job_id = j.id
        WHERE a.freelancer_email = ? AND a.status = 'completed' AND j.status = 'done'
        "#,
    )
    .bind(freelancer_email)
    .fetch_one(&mut *conn)
    .await?;

    let stats = FreelancerStats {
        rating: rounded_rating(average),
        completed_projects,
    };

    sqlx::query("UPDATE users SET rating = ?, completed_projects = ? WHERE email = ?")
        .bind(stats.rating)
        .bind(stats.completed_projects)
        .bind(freelancer_email)
        .execute(&mut *conn)
        .await?;

    tracing::debug!(
        freelancer = %freelancer_email,
        rating = stats.rating,
        completed_projects = stats.completed_projects,
        "Recomputed freelancer stats"
    );

    Ok(stats)
}

pub async fn recompute_one(pool: &SqlitePool, freelancer_email: &str) -> Result<FreelancerStats> {
    let mut conn = pool.acquire().await?;
    recompute(&mut conn, freelancer_email).await
}

/// Re-syncs every freelancer's cached statistics. Returns how many were updated.
pub async fn resync_all(pool: &SqlitePool) -> Result<usize> {
    let mut tx = pool.begin().await?;

    let emails: Vec<String> =
        sqlx::query_scalar("SELECT email FROM users WHERE role = 'freelancer' ORDER BY id")
            .fetch_all(&mut *tx)
            .await?;

    for email in &emails {
        recompute(&mut tx, email).await?;
    }

    tx.commit().await?;
    tracing::info!(count = emails.len(), "Re-synced freelancer stats");
    Ok(emails.len())
}
