use chrono::Utc;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    db::models::{encode_list, Role, User},
    error::{AppError, Result},
    services::auth::{hash_password, verify_password},
};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 100;

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
}

/// Fields a user may change on their own profile. `None` leaves the column untouched.
///
/// Derived statistics (`rating`, `completed_projects`) are not editable.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub about_me: Option<String>,
    pub activity: Option<String>,
    pub skills: Option<String>,
    pub phone: Option<String>,
    pub telegram: Option<String>,
    pub email: Option<String>,
    #[serde(skip)]
    pub avatar: Option<String>,
}

impl ProfileUpdate {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.about_me.is_none()
            && self.activity.is_none()
            && self.skills.is_none()
            && self.phone.is_none()
            && self.telegram.is_none()
            && self.email.is_none()
            && self.avatar.is_none()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub min_rating: Option<f64>,
}

pub fn validate_email(email: &str) -> Result<()> {
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.starts_with('.')
            && domain
                .rsplit_once('.')
                .is_some_and(|(host, tld)| !host.is_empty() && tld.len() >= 2)
            && !email.chars().any(char::is_whitespace)
    });

    if valid {
        Ok(())
    } else {
        Err(AppError::Validation("Invalid email address".to_string()))
    }
}

fn validate_password(password: &str) -> Result<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AppError::Validation("Password is too long".to_string()));
    }
    Ok(())
}

pub async fn register(pool: &SqlitePool, new_user: NewUser) -> Result<User> {
    let email = new_user.email.trim().to_lowercase();
    validate_email(&email)?;
    validate_password(&new_user.password)?;

    if new_user.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if new_user.role == Role::Admin {
        return Err(AppError::Forbidden(
            "Administrator accounts cannot be registered".to_string(),
        ));
    }

    if find_by_email(pool, &email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let password_hash = hash_password(&new_user.password)?;
    insert(pool, &email, &password_hash, new_user.role, new_user.name.trim()).await
}

async fn insert(
    pool: &SqlitePool,
    email: &str,
    password_hash: &str,
    role: Role,
    name: &str,
) -> Result<User> {
    let id = sqlx::query(
        "INSERT INTO users (email, password_hash, role, name, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .bind(name)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(|e| {
        if crate::error::is_unique_violation(&e) {
            AppError::Conflict("Email already registered".to_string())
        } else {
            e.into()
        }
    })?
    .last_insert_rowid();

    tracing::info!(user_id = id, email = %email, role = %role, "Registered user");
    get_by_id(pool, id).await
}

pub async fn authenticate(pool: &SqlitePool, email: &str, password: &str) -> Result<User> {
    let user = find_by_email(pool, &email.trim().to_lowercase())
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    Ok(user)
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn get_by_email(pool: &SqlitePool, email: &str) -> Result<User> {
    find_by_email(pool, email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn update_profile(pool: &SqlitePool, user: &User, update: ProfileUpdate) -> Result<User> {
    if update.is_empty() {
        return Ok(user.clone());
    }

    let new_email = match update.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() && !email.eq_ignore_ascii_case(&user.email) => {
            let email = email.to_lowercase();
            validate_email(&email)?;
            if find_by_email(pool, &email).await?.is_some() {
                return Err(AppError::Conflict(
                    "This email is already used by another account".to_string(),
                ));
            }
            Some(email)
        }
        _ => None,
    };

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE users SET ");
    let mut fields = query.separated(", ");
    let text_fields = [
        ("name", update.name),
        ("about_me", update.about_me),
        ("activity", update.activity),
        ("skills", update.skills),
        ("phone", update.phone),
        ("telegram", update.telegram),
        ("avatar", update.avatar),
        ("email", new_email),
    ];

    let mut touched = 0;
    for (column, value) in text_fields {
        if let Some(value) = value {
            fields.push(column).push_unseparated(" = ").push_bind_unseparated(value);
            touched += 1;
        }
    }

    if touched == 0 {
        return Ok(user.clone());
    }

    query.push(" WHERE id = ").push_bind(user.id);
    query.build().execute(pool).await.map_err(|e| {
        if crate::error::is_unique_violation(&e) {
            AppError::Conflict("This email is already used by another account".to_string())
        } else {
            e.into()
        }
    })?;

    get_by_id(pool, user.id).await
}

/// Merges new entries into an ordered, de-duplicated list.
pub fn merge_unique(existing: &[String], additions: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(existing.len());
    for item in existing
        .iter()
        .cloned()
        .chain(additions)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    {
        if !merged.contains(&item) {
            merged.push(item);
        }
    }
    merged
}

async fn store_portfolio(
    pool: &SqlitePool,
    user_id: i64,
    files: &[String],
    links: &[String],
) -> Result<User> {
    sqlx::query("UPDATE users SET portfolio_files = ?, portfolio_links = ? WHERE id = ?")
        .bind(encode_list(files))
        .bind(encode_list(links))
        .bind(user_id)
        .execute(pool)
        .await?;
    get_by_id(pool, user_id).await
}

pub async fn add_portfolio_files(pool: &SqlitePool, user: &User, urls: Vec<String>) -> Result<User> {
    let files = merge_unique(&user.portfolio_files, urls);
    store_portfolio(pool, user.id, &files, &user.portfolio_links).await
}

pub async fn add_portfolio_links(pool: &SqlitePool, user: &User, links: Vec<String>) -> Result<User> {
    let links = merge_unique(&user.portfolio_links, links);
    store_portfolio(pool, user.id, &user.portfolio_files, &links).await
}

/// Drops a file from the portfolio. Returns the updated user and whether the file was listed.
pub async fn remove_portfolio_file(pool: &SqlitePool, user: &User, url: &str) -> Result<(User, bool)> {
    let before = user.portfolio_files.len();
    let files: Vec<String> = user
        .portfolio_files
        .iter()
        .filter(|f| f.as_str() != url)
        .cloned()
        .collect();
    let removed = files.len() != before;
    let user = store_portfolio(pool, user.id, &files, &user.portfolio_links).await?;
    Ok((user, removed))
}

pub async fn remove_portfolio_link(pool: &SqlitePool, user: &User, link: &str) -> Result<User> {
    let link = link.trim();
    let links: Vec<String> = user
        .portfolio_links
        .iter()
        .filter(|l| l.as_str() != link)
        .cloned()
        .collect();
    store_portfolio(pool, user.id, &user.portfolio_files, &links).await
}

pub async fn list_users(pool: &SqlitePool, filter: &UserFilter) -> Result<Vec<User>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM users WHERE 1 = 1");

    if let Some(role) = filter.role {
        query.push(" AND role = ").push_bind(role);
    }
    if let Some(min_rating) = filter.min_rating {
        query.push(" AND rating >= ").push_bind(min_rating);
    }
    query.push(" ORDER BY rating DESC, completed_projects DESC, id ASC");

    let users = query.build_query_as::<User>().fetch_all(pool).await?;
    Ok(users)
}

/// Creates the configured administrator account if it does not exist yet.
pub async fn ensure_admin(pool: &SqlitePool, email: &str, password: &str) -> Result<()> {
    let email = email.trim().to_lowercase();
    if find_by_email(pool, &email).await?.is_some() {
        tracing::debug!(email = %email, "Administrator already exists");
        return Ok(());
    }

    let password_hash = hash_password(password)?;
    insert(pool, &email, &password_hash, Role::Admin, "Administrator").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(validate_email("ann@example.com").is_ok());
        assert!(validate_email("a.b+c@mail.example.org").is_ok());
        assert!(validate_email("ann").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ann@example").is_err());
        assert!(validate_email("ann@example.c").is_err());
        assert!(validate_email("an n@example.com").is_err());
    }

    #[test]
    fn password_length_bounds() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
        assert!(validate_password(&"x".repeat(101)).is_err());
    }

    #[test]
    fn merge_keeps_order_and_drops_duplicates() {
        let existing = vec!["https://a.dev".to_string(), "https://b.dev".to_string()];
        let merged = merge_unique(
            &existing,
            vec![
                " https://b.dev ".to_string(),
                "".to_string(),
                "https://c.dev".to_string(),
            ],
        );
        assert_eq!(merged, vec!["https://a.dev", "https://b.dev", "https://c.dev"]);
    }
}
