//! Weekly max-weight aggregate per (user, exercise, year_week).
//!
//! The stored row is a cache of `MAX(weight)` over the user's working sets for
//! that exercise in sessions tagged with that year-week. It is maintained
//! incrementally and only ever moves up; `recompute_max_weight` and
//! `rebuild_progress` derive it from the sets directly.

use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{debug, info, instrument};

use crate::error::AppError;
use crate::models::ExerciseProgress;

use super::new_id;

const PROGRESS_COLUMNS: &str = "id, user_id, exercise_id, year_week, max_weight, \
    warmup_weight_range, warmup_sets_done, created_at";

/// Folds one working-set weight into the weekly maximum.
///
/// A single upsert so that two callers racing to create the same row end up
/// with one row holding the larger weight. Replaying the same or a smaller
/// weight leaves the row untouched.
#[instrument(skip(conn))]
pub async fn record_working_set(
    conn: &mut SqliteConnection,
    user_id: &str,
    exercise_id: &str,
    year_week: &str,
    weight: f64,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "INSERT INTO exercise_progress (id, user_id, exercise_id, year_week, max_weight, created_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (user_id, exercise_id, year_week) DO UPDATE
            SET max_weight = excluded.max_weight
            WHERE excluded.max_weight > exercise_progress.max_weight",
    )
    .bind(new_id())
    .bind(user_id)
    .bind(exercise_id)
    .bind(year_week)
    .bind(weight)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    debug!(
        rows_affected = result.rows_affected(),
        "Recorded working set against weekly progress"
    );

    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_exercise_progress(
    pool: &Pool<Sqlite>,
    user_id: &str,
    exercise_id: &str,
) -> Result<Vec<ExerciseProgress>, AppError> {
    info!("Fetching exercise progress history");
    let rows = sqlx::query_as::<_, ExerciseProgress>(&format!(
        "SELECT {} FROM exercise_progress
         WHERE user_id = ? AND exercise_id = ?
         ORDER BY year_week",
        PROGRESS_COLUMNS
    ))
    .bind(user_id)
    .bind(exercise_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_progress(
    pool: &Pool<Sqlite>,
    user_id: &str,
    exercise_id: &str,
    year_week: &str,
) -> Result<Option<ExerciseProgress>, AppError> {
    let row = sqlx::query_as::<_, ExerciseProgress>(&format!(
        "SELECT {} FROM exercise_progress
         WHERE user_id = ? AND exercise_id = ? AND year_week = ?",
        PROGRESS_COLUMNS
    ))
    .bind(user_id)
    .bind(exercise_id)
    .bind(year_week)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Derives the weekly maximum straight from the logged sets, ignoring the
/// stored aggregate. `None` when no working set qualifies.
#[instrument(skip(pool))]
pub async fn recompute_max_weight(
    pool: &Pool<Sqlite>,
    user_id: &str,
    exercise_id: &str,
    year_week: &str,
) -> Result<Option<f64>, AppError> {
    let max_weight: Option<f64> = sqlx::query_scalar(
        "SELECT MAX(ws.weight)
         FROM workout_sets ws
         JOIN workout_sessions s ON s.id = ws.session_id
         WHERE s.user_id = ? AND ws.exercise_id = ? AND s.year_week = ?
           AND ws.set_type = 'working'",
    )
    .bind(user_id)
    .bind(exercise_id)
    .bind(year_week)
    .fetch_one(pool)
    .await?;

    Ok(max_weight)
}

#[derive(sqlx::FromRow)]
struct DerivedProgress {
    exercise_id: String,
    year_week: String,
    max_weight: f64,
}

/// Re-derives every weekly row for a user from the sets and folds the result
/// into the stored aggregate. Returns how many (exercise, week) keys were seen.
#[instrument(skip(pool))]
pub async fn rebuild_progress(pool: &Pool<Sqlite>, user_id: &str) -> Result<usize, AppError> {
    info!("Rebuilding exercise progress from logged sets");
    let mut tx = pool.begin().await?;

    let derived = sqlx::query_as::<_, DerivedProgress>(
        "SELECT ws.exercise_id AS exercise_id, s.year_week AS year_week, MAX(ws.weight) AS max_weight
         FROM workout_sets ws
         JOIN workout_sessions s ON s.id = ws.session_id
         WHERE s.user_id = ? AND s.year_week IS NOT NULL AND ws.set_type = 'working'
         GROUP BY ws.exercise_id, s.year_week",
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?;

    for row in &derived {
        record_working_set(&mut tx, user_id, &row.exercise_id, &row.year_week, row.max_weight)
            .await?;
    }

    tx.commit().await?;

    info!(keys = derived.len(), "Exercise progress rebuilt");
    Ok(derived.len())
}
