use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

pub const DEFAULT_AVATAR: &str = "/static/default-avatar.svg";

/// Serializes an optional avatar URL, falling back to [`DEFAULT_AVATAR`].
pub fn serialize_avatar<S>(avatar: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(avatar.as_deref().unwrap_or(DEFAULT_AVATAR))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    Client,
    Freelancer,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl ApplicationStatus {
    /// Accepted and completed freelancers are the ones taking part in a job.
    pub fn is_participating(self) -> bool {
        matches!(self, Self::Accepted | Self::Completed)
    }
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("Unknown {}: {other}", stringify!($ty).to_lowercase())),
                }
            }
        }
    };
}

text_enum!(Role { Client => "client", Freelancer => "freelancer", Admin => "admin" });
text_enum!(JobStatus { Open => "open", InProgress => "in_progress", Done => "done" });
text_enum!(Priority { Low => "low", Medium => "medium", High => "high" });
text_enum!(ApplicationStatus {
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
    Completed => "completed",
});

/// JSON-array columns are stored as TEXT.
pub fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub name: Option<String>,
    #[serde(serialize_with = "serialize_avatar")]
    pub avatar: Option<String>,
    pub about_me: Option<String>,
    pub activity: Option<String>,
    pub skills: Option<String>,
    pub phone: Option<String>,
    pub telegram: Option<String>,
    pub rating: f64,
    pub completed_projects: i64,
    pub portfolio_files: Vec<String>,
    pub portfolio_links: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let files: String = row.try_get("portfolio_files")?;
        let links: String = row.try_get("portfolio_links")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role: row.try_get("role")?,
            name: row.try_get("name")?,
            avatar: row.try_get("avatar")?,
            about_me: row.try_get("about_me")?,
            activity: row.try_get("activity")?,
            skills: row.try_get("skills")?,
            phone: row.try_get("phone")?,
            telegram: row.try_get("telegram")?,
            rating: row.try_get("rating")?,
            completed_projects: row.try_get("completed_projects")?,
            portfolio_files: decode_list(&files),
            portfolio_links: decode_list(&links),
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub deadline: NaiveDate,
    pub status: JobStatus,
    pub priority: Priority,
    pub creator_email: String,
    pub files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Job {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let files: String = row.try_get("files")?;
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            deadline: row.try_get("deadline")?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            creator_email: row.try_get("creator_email")?,
            files: decode_list(&files),
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Application {
    pub id: i64,
    pub job_id: i64,
    pub freelancer_email: String,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Review {
    pub id: i64,
    pub job_id: i64,
    pub freelancer_email: String,
    pub client_email: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub sender_email: String,
    pub receiver_email: String,
    pub job_id: Option<i64>,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProjectComment {
    pub id: i64,
    pub job_id: i64,
    pub author_email: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_use_snake_case_text() {
        assert_eq!(JobStatus::InProgress.as_str(), "in_progress");
        assert_eq!("in_progress".parse::<JobStatus>(), Ok(JobStatus::InProgress));
        assert_eq!("high".parse::<Priority>(), Ok(Priority::High));
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(
            serde_json::to_string(&ApplicationStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn participating_statuses() {
        assert!(ApplicationStatus::Accepted.is_participating());
        assert!(ApplicationStatus::Completed.is_participating());
        assert!(!ApplicationStatus::Pending.is_participating());
        assert!(!ApplicationStatus::Rejected.is_participating());
    }

    #[test]
    fn missing_avatar_serializes_as_default() {
        let mut user = User {
            id: 1,
            email: "ann@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: Role::Client,
            name: None,
            avatar: None,
            about_me: None,
            activity: None,
            skills: None,
            phone: None,
            telegram: None,
            rating: 0.0,
            completed_projects: 0,
            portfolio_files: Vec::new(),
            portfolio_links: Vec::new(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["avatar"], DEFAULT_AVATAR);
        assert!(json.get("password_hash").is_none());

        user.avatar = Some("/uploads/avatars/a.png".to_string());
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["avatar"], "/uploads/avatars/a.png");
    }

    #[test]
    fn malformed_list_columns_decode_empty() {
        assert_eq!(decode_list("not json"), Vec::<String>::new());
        let urls = vec!["/uploads/projects/a.pdf".to_string()];
        assert_eq!(decode_list(&encode_list(&urls)), urls);
    }
}
