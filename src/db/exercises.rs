use chrono::Utc;
use serde::Deserialize;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};
use validator::Validate;

use crate::error::AppError;
use crate::models::Exercise;

use super::{ensure_owner, new_id, not_found};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewExercise {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "muscle_group must be 1-100 characters"))]
    pub muscle_group: String,
    pub equipment: Option<String>,
    pub notes: Option<String>,
}

#[instrument(skip(pool, exercise))]
pub async fn create_exercise(
    pool: &Pool<Sqlite>,
    user_id: &str,
    exercise: &NewExercise,
) -> Result<Exercise, AppError> {
    info!("Creating custom exercise");
    exercise.validate()?;

    let created = Exercise {
        id: new_id(),
        user_id: Some(user_id.to_string()),
        name: exercise.name.trim().to_string(),
        muscle_group: exercise.muscle_group.trim().to_string(),
        equipment: exercise.equipment.clone(),
        is_custom: true,
        notes: exercise.notes.clone(),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO exercises (id, user_id, name, muscle_group, equipment, is_custom, notes, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&created.id)
    .bind(&created.user_id)
    .bind(&created.name)
    .bind(&created.muscle_group)
    .bind(&created.equipment)
    .bind(created.is_custom)
    .bind(&created.notes)
    .bind(created.created_at)
    .execute(pool)
    .await?;

    Ok(created)
}

/// Library exercises (no owner) plus the caller's custom ones.
#[instrument(skip(pool))]
pub async fn list_exercises(pool: &Pool<Sqlite>, user_id: &str) -> Result<Vec<Exercise>, AppError> {
    info!("Listing exercises");
    let rows = sqlx::query_as::<_, Exercise>(
        "SELECT id, user_id, name, muscle_group, equipment, is_custom, notes, created_at
         FROM exercises
         WHERE user_id IS NULL OR user_id = ?
         ORDER BY name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// An exercise is usable when it is a library exercise or the caller's own.
#[instrument(skip(conn))]
pub async fn ensure_exercise_visible(
    conn: &mut SqliteConnection,
    exercise_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    let owner: Option<Option<String>> =
        sqlx::query_scalar("SELECT user_id FROM exercises WHERE id = ?")
            .bind(exercise_id)
            .fetch_optional(&mut *conn)
            .await?;

    match owner {
        None => Err(not_found("Exercise", exercise_id)),
        Some(None) => Ok(()),
        Some(Some(owner_id)) => ensure_owner("Exercise", exercise_id, &owner_id, user_id),
    }
}
