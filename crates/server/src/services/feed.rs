use serde::Serialize;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};

use crate::{
    db::models::{ApplicationStatus, Job, JobStatus, Role, User},
    error::Result,
    services::jobs::{self, Participant},
};

/// Who is looking at the feed.
#[derive(Debug, Clone, Copy)]
pub struct Viewer<'a> {
    pub email: &'a str,
    pub role: Role,
}

/// The facts about a job that decide whether a viewer sees it.
#[derive(Debug, Clone, Copy)]
pub struct JobFacts<'a> {
    pub creator_email: &'a str,
    pub status: JobStatus,
    pub has_accepted: bool,
    pub viewer_applied: bool,
}

/// Anonymous visitors only see open jobs nobody has been accepted on. Signed-in users also
/// see their own jobs and jobs already under way or finished, and freelancers keep seeing
/// jobs they applied to.
pub fn is_visible(job: &JobFacts<'_>, viewer: Option<Viewer<'_>>) -> bool {
    let Some(viewer) = viewer else {
        return job.status == JobStatus::Open && !job.has_accepted;
    };

    if job.creator_email == viewer.email
        || matches!(job.status, JobStatus::InProgress | JobStatus::Done)
        || !job.has_accepted
    {
        return true;
    }

    viewer.role == Role::Freelancer && job.viewer_applied
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    #[serde(flatten)]
    pub job: Job,
    pub creator_name: Option<String>,
    pub application_count: i64,
    pub participants: Vec<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_application_status: Option<ApplicationStatus>,
}

struct FeedRow {
    job: Job,
    creator_name: Option<String>,
    application_count: i64,
    has_accepted: bool,
    my_status: Option<ApplicationStatus>,
}

impl<'r> FromRow<'r, SqliteRow> for FeedRow {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            job: Job::from_row(row)?,
            creator_name: row.try_get("creator_name")?,
            application_count: row.try_get("application_count")?,
            has_accepted: row.try_get("has_accepted")?,
            my_status: row.try_get("my_status")?,
        })
    }
}

/// The home feed: jobs the viewer is allowed to see, newest first, optionally narrowed to
/// one status.
pub async fn feed(
    pool: &SqlitePool,
    viewer: Option<&User>,
    status: Option<JobStatus>,
) -> Result<Vec<JobSummary>> {
    let freelancer_email = viewer
        .filter(|u| u.role == Role::Freelancer)
        .map(|u| u.email.as_str());

    let rows = sqlx::query_as::<_, FeedRow>(
        r#"
        SELECT j.*, u.name AS creator_name,
               (SELECT COUNT(*) FROM applications a WHERE a.job_id = j.id) AS application_count,
               EXISTS (SELECT 1 FROM applications a WHERE a.job_id = j.id AND a.status = 'accepted') AS has_accepted,
               (SELECT a.status FROM applications a WHERE a.job_id = j.id AND a.freelancer_email = ?1) AS my_status
        FROM jobs j
        JOIN users u ON u.email = j.creator_email
        WHERE ?2 IS NULL OR j.status = ?2
        ORDER BY j.id DESC
        "#,
    )
    .bind(freelancer_email)
    .bind(status)
    .fetch_all(pool)
    .await?;

    let viewer = viewer.map(|u| Viewer {
        email: &u.email,
        role: u.role,
    });

    let mut summaries = Vec::new();
    for row in rows {
        let facts = JobFacts {
            creator_email: &row.job.creator_email,
            status: row.job.status,
            has_accepted: row.has_accepted,
            viewer_applied: row.my_status.is_some(),
        };
        if !is_visible(&facts, viewer) {
            continue;
        }

        let participants = jobs::participants(pool, row.job.id).await?;
        summaries.push(JobSummary {
            job: row.job,
            creator_name: row.creator_name,
            application_count: row.application_count,
            participants,
            my_application_status: row.my_status,
        });
    }

    tracing::debug!(
        count = summaries.len(),
        authenticated = viewer.is_some(),
        "Built job feed"
    );
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus, has_accepted: bool, viewer_applied: bool) -> JobFacts<'static> {
        JobFacts {
            creator_email: "owner@example.com",
            status,
            has_accepted,
            viewer_applied,
        }
    }

    fn freelancer() -> Option<Viewer<'static>> {
        Some(Viewer {
            email: "dev@example.com",
            role: Role::Freelancer,
        })
    }

    fn client(email: &'static str) -> Option<Viewer<'static>> {
        Some(Viewer {
            email,
            role: Role::Client,
        })
    }

    #[test]
    fn anonymous_sees_only_open_unclaimed_jobs() {
        assert!(is_visible(&job(JobStatus::Open, false, false), None));
        assert!(!is_visible(&job(JobStatus::Open, true, false), None));
        assert!(!is_visible(&job(JobStatus::InProgress, true, false), None));
        assert!(!is_visible(&job(JobStatus::Done, false, false), None));
    }

    #[test]
    fn creator_always_sees_own_job() {
        let owner = client("owner@example.com");
        assert!(is_visible(&job(JobStatus::Open, true, false), owner));
    }

    #[test]
    fn signed_in_users_see_jobs_under_way() {
        assert!(is_visible(&job(JobStatus::InProgress, true, false), freelancer()));
        assert!(is_visible(&job(JobStatus::Done, true, false), client("other@example.com")));
        assert!(is_visible(&job(JobStatus::Open, false, false), client("other@example.com")));
    }

    #[test]
    fn open_job_with_accepted_freelancer_is_hidden_unless_applied() {
        // Reachable when the accepted status is set on a job still marked open
        assert!(!is_visible(&job(JobStatus::Open, true, false), freelancer()));
        assert!(is_visible(&job(JobStatus::Open, true, true), freelancer()));
        assert!(!is_visible(&job(JobStatus::Open, true, false), client("other@example.com")));
    }
}
