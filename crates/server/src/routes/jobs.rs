use axum::{
    extract::{Multipart, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    db::models::{ApplicationStatus, Job, JobStatus, Priority, ProjectComment, Review, Role},
    error::{AppError, Result},
    middleware::auth::{AuthUser, MaybeUser},
    routes::form::MultipartForm,
    services::{
        applications::{self, ApplicationView, ApplyOutcome},
        comments::{self, CommentView, NewComment},
        feed::{self, JobSummary},
        jobs::{self, JobUpdate, NewJob, Participant},
        messages::{self, PollResult},
        reviews::{self, NewReview, ReviewCreated},
        storage::UploadFolder,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(create_job))
        .route("/:id", get(get_job).put(update_job).delete(delete_job))
        .route("/:id/apply", post(apply))
        .route("/:id/complete", post(complete))
        .route("/:id/applications", get(list_applications))
        .route("/:id/participants", get(list_participants))
        .route("/:id/comments", get(list_comments).post(create_comment))
        .route("/:id/reviews", get(list_reviews).post(create_review))
        .route("/:id/chat", get(project_chat))
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub status: Option<JobStatus>,
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: Job,
    pub participants: Vec<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_application_status: Option<ApplicationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
    /// Defaults to the freelancer accepted on the job.
    #[serde(default)]
    pub freelancer_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    #[serde(default)]
    pub last_message_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ProjectChat {
    pub job_id: i64,
    pub partner_email: String,
    #[serde(flatten)]
    pub poll: PollResult,
}

async fn list_jobs(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<JobSummary>>> {
    let jobs = feed::feed(&state.db.pool, viewer.as_ref(), query.status).await?;
    Ok(Json(jobs))
}

async fn create_job(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<Job>> {
    user.require_role(Role::Client)?;
    let form = MultipartForm::read(multipart).await?;

    let deadline = jobs::parse_deadline(form.require("deadline")?, Utc::now().date_naive())?;
    let priority = match form.text("priority").map(str::trim) {
        None | Some("") => Priority::default(),
        Some(raw) => raw.parse().map_err(AppError::Validation)?,
    };
    let title = form.require("title")?.to_string();
    let description = form.require("description")?.to_string();

    let files = form.save_files(&state.storage, UploadFolder::Projects).await?;
    let new_job = NewJob {
        title,
        description,
        deadline,
        priority,
        files: files.clone(),
    };

    match jobs::create_job(&state.db.pool, &user, new_job).await {
        Ok(job) => Ok(Json(job)),
        Err(e) => {
            state.storage.delete_all(&files).await;
            Err(e)
        }
    }
}

async fn get_job(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<JobDetail>> {
    let job = jobs::get_job(&state.db.pool, id).await?;
    let participants = jobs::participants(&state.db.pool, id).await?;

    let my_application_status = match viewer {
        Some(user) if user.role == Role::Freelancer => {
            applications::status_for(&state.db.pool, id, &user.email).await?
        }
        _ => None,
    };

    Ok(Json(JobDetail {
        job,
        participants,
        my_application_status,
    }))
}

async fn update_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<JobUpdate>,
) -> Result<Json<Job>> {
    let job = jobs::update_job(&state.db.pool, id, &user, body, Utc::now().date_naive()).await?;
    Ok(Json(job))
}

async fn delete_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let job = jobs::delete_job(&state.db.pool, id, &user).await?;
    state.storage.delete_all(&job.files).await;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn apply(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApplyOutcome>> {
    let outcome = applications::apply(&state.db.pool, id, &user, &state.config.policy).await?;
    Ok(Json(outcome))
}

async fn complete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Job>> {
    let job = applications::complete(&state.db.pool, id, &user).await?;
    Ok(Json(job))
}

async fn list_applications(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ApplicationView>>> {
    let job = jobs::get_job(&state.db.pool, id).await?;
    if job.creator_email != user.email && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the job's creator can see its applications".to_string(),
        ));
    }

    let applications = applications::list_for_job(&state.db.pool, id).await?;
    Ok(Json(applications))
}

async fn list_participants(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Participant>>> {
    jobs::get_job(&state.db.pool, id).await?;
    let participants = jobs::participants(&state.db.pool, id).await?;
    Ok(Json(participants))
}

async fn list_comments(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<CommentView>>> {
    jobs::get_job(&state.db.pool, id).await?;
    if !user.is_admin() && !comments::can_comment(&state.db.pool, id, &user.email).await? {
        return Err(AppError::Forbidden(
            "Only the job's participants can read its comments".to_string(),
        ));
    }

    let comments = comments::list_for_job(&state.db.pool, id).await?;
    Ok(Json(comments))
}

async fn create_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<NewComment>,
) -> Result<Json<ProjectComment>> {
    let comment = comments::create_comment(&state.db.pool, id, &user, body).await?;
    Ok(Json(comment))
}

async fn list_reviews(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Review>>> {
    jobs::get_job(&state.db.pool, id).await?;
    let reviews = reviews::reviews_for_job(&state.db.pool, id).await?;
    Ok(Json(reviews))
}

async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<ReviewCreated>> {
    let review = NewReview {
        rating: body.rating,
        comment: body.comment,
    };

    let created = match body.freelancer_email {
        Some(email) => {
            let email = email.trim().to_lowercase();
            reviews::create_review(&state.db.pool, id, &email, &user, review).await?
        }
        None => reviews::review_accepted_freelancer(&state.db.pool, id, &user, review).await?,
    };

    Ok(Json(created))
}

async fn project_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Query(query): Query<ChatQuery>,
) -> Result<Json<ProjectChat>> {
    let partner_email = messages::project_chat_partner(&state.db.pool, id, &user).await?;
    let poll = messages::poll(
        &state.db.pool,
        &user.email,
        &partner_email,
        Some(id),
        query.last_message_id,
    )
    .await?;

    Ok(Json(ProjectChat {
        job_id: id,
        partner_email,
        poll,
    }))
}
