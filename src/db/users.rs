use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{User, UserSession};
use crate::error::AppError;

use super::{new_id, not_found};

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: &str) -> Result<User, AppError> {
    info!("Fetching user by ID");
    sqlx::query_as::<_, User>(
        "SELECT id, email, display_name, preferred_unit, created_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| not_found("User", id))
}

/// Users are normally provisioned by the auth service; this exists for
/// seeding and tests.
#[instrument(skip(pool))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    email: &str,
    display_name: &str,
) -> Result<String, AppError> {
    info!("Creating user");
    let id = new_id();

    sqlx::query("INSERT INTO users (id, email, display_name, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(email)
        .bind(display_name)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(|e| match AppError::from(e) {
            err if err.is_unique_violation() => {
                AppError::Validation(format!("User with email {} already exists", email))
            }
            err => err,
        })?;

    Ok(id)
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: &str,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let result = sqlx::query(
        "INSERT INTO user_sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(token)
    .bind(Utc::now())
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    sqlx::query_as::<_, UserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Authentication("Invalid session token".to_string()))
}
