use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};
use validator::Validate;

use crate::error::AppError;
use crate::models::{SessionDetail, SetType, WeekType, WorkoutSession, WorkoutSet};
use crate::validation::validate_year_week;

use super::{
    advance_program, ensure_exercise_visible, ensure_owner, ensure_template_owned, new_id,
    not_found, record_working_set,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    pub id: Option<String>,
    pub template_id: Option<String>,
    pub program_id: Option<String>,
    pub year_week: Option<String>,
    pub week_type: WeekType,
    pub notes: Option<String>,
}

/// Both fields are optional; a missing field is left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionUpdate {
    pub finished_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewSet {
    pub exercise_id: String,
    pub set_type: SetType,
    #[validate(range(min = 1, message = "set_number must be >= 1"))]
    pub set_number: i64,
    #[validate(range(min = 0, message = "reps must be >= 0"))]
    pub reps: i64,
    #[validate(range(min = 0.0, message = "weight must be >= 0"))]
    pub weight: f64,
    #[validate(range(min = 1.0, max = 10.0, message = "RPE must be between 1 and 10"))]
    pub rpe: Option<f64>,
    #[validate(length(max = 1000, message = "notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SetUpdate {
    #[validate(range(min = 0, message = "reps must be >= 0"))]
    pub reps: Option<i64>,
    #[validate(range(min = 0.0, message = "weight must be >= 0"))]
    pub weight: Option<f64>,
    #[validate(range(min = 1.0, max = 10.0, message = "RPE must be between 1 and 10"))]
    pub rpe: Option<f64>,
    #[validate(length(max = 1000, message = "notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

pub(crate) const SESSION_COLUMNS: &str = "id, user_id, template_id, program_id, year_week, \
    week_type, started_at, finished_at, notes, synced";

pub(crate) const SET_COLUMNS: &str = "id, session_id, exercise_id, set_type, set_number, reps, \
    weight, rpe, notes, created_at";

pub(crate) async fn fetch_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> Result<Option<WorkoutSession>, AppError> {
    let row = sqlx::query_as::<_, WorkoutSession>(&format!(
        "SELECT {} FROM workout_sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(session_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

pub(crate) async fn fetch_set(
    conn: &mut SqliteConnection,
    set_id: &str,
) -> Result<Option<WorkoutSet>, AppError> {
    let row = sqlx::query_as::<_, WorkoutSet>(&format!(
        "SELECT {} FROM workout_sets WHERE id = ?",
        SET_COLUMNS
    ))
    .bind(set_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

async fn get_owned_session(
    conn: &mut SqliteConnection,
    session_id: &str,
    user_id: &str,
) -> Result<WorkoutSession, AppError> {
    let session = fetch_session(conn, session_id)
        .await?
        .ok_or_else(|| not_found("Session", session_id))?;
    ensure_owner("Session", session_id, &session.user_id, user_id)?;
    Ok(session)
}

/// Follows set -> session -> user to resolve ownership.
async fn get_owned_set(
    conn: &mut SqliteConnection,
    set_id: &str,
    user_id: &str,
) -> Result<WorkoutSet, AppError> {
    let set = fetch_set(conn, set_id)
        .await?
        .ok_or_else(|| not_found("Set", set_id))?;
    get_owned_session(conn, &set.session_id, user_id)
        .await
        .map_err(|err| match err {
            AppError::Forbidden(_) => {
                AppError::Forbidden(format!("Set {} belongs to another user", set_id))
            }
            other => other,
        })?;
    Ok(set)
}

pub(crate) async fn ensure_program_owned(
    conn: &mut SqliteConnection,
    program_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    let owner: Option<String> = sqlx::query_scalar("SELECT user_id FROM programs WHERE id = ?")
        .bind(program_id)
        .fetch_optional(&mut *conn)
        .await?;

    match owner {
        None => Err(not_found("Program", program_id)),
        Some(owner_id) => ensure_owner("Program", program_id, &owner_id, user_id),
    }
}

/// Feeds a set into the weekly aggregate when it qualifies: a working set on
/// a session tagged with a year-week. Progress is attributed to the session
/// owner.
pub(crate) async fn record_set_progress(
    conn: &mut SqliteConnection,
    set: &WorkoutSet,
) -> Result<bool, AppError> {
    if !set.set_type.counts_toward_progress() {
        return Ok(false);
    }

    let session = fetch_session(conn, &set.session_id)
        .await?
        .ok_or_else(|| not_found("Session", &set.session_id))?;

    let Some(year_week) = session.year_week.as_deref() else {
        return Ok(false);
    };

    record_working_set(conn, &session.user_id, &set.exercise_id, year_week, set.weight).await?;
    Ok(true)
}

#[instrument(skip(pool, session))]
pub async fn create_session(
    pool: &Pool<Sqlite>,
    user_id: &str,
    session: &NewSession,
) -> Result<WorkoutSession, AppError> {
    info!("Creating workout session");

    if let Some(year_week) = session.year_week.as_deref() {
        validate_year_week(year_week)?;
    }

    let mut conn = pool.acquire().await?;
    if let Some(template_id) = session.template_id.as_deref() {
        ensure_template_owned(&mut conn, template_id, user_id).await?;
    }
    if let Some(program_id) = session.program_id.as_deref() {
        ensure_program_owned(&mut conn, program_id, user_id).await?;
    }

    let created = WorkoutSession {
        id: session.id.clone().unwrap_or_else(new_id),
        user_id: user_id.to_string(),
        template_id: session.template_id.clone(),
        program_id: session.program_id.clone(),
        year_week: session.year_week.clone(),
        week_type: session.week_type,
        started_at: Utc::now(),
        finished_at: None,
        notes: session.notes.clone(),
        synced: true,
    };

    sqlx::query(&format!(
        "INSERT INTO workout_sessions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        SESSION_COLUMNS
    ))
    .bind(&created.id)
    .bind(&created.user_id)
    .bind(&created.template_id)
    .bind(&created.program_id)
    .bind(&created.year_week)
    .bind(created.week_type)
    .bind(created.started_at)
    .bind(created.finished_at)
    .bind(&created.notes)
    .bind(created.synced)
    .execute(&mut *conn)
    .await
    .map_err(|e| match AppError::from(e) {
        err if err.is_unique_violation() => {
            AppError::Validation(format!("Session with id {} already exists", created.id))
        }
        err => err,
    })?;

    Ok(created)
}

#[instrument(skip(pool))]
pub async fn list_sessions(
    pool: &Pool<Sqlite>,
    user_id: &str,
    year_week: Option<&str>,
    week_type: Option<WeekType>,
) -> Result<Vec<WorkoutSession>, AppError> {
    info!("Listing workout sessions");
    let rows = sqlx::query_as::<_, WorkoutSession>(&format!(
        "SELECT {} FROM workout_sessions
         WHERE user_id = ?
           AND (? IS NULL OR year_week = ?)
           AND (? IS NULL OR week_type = ?)
         ORDER BY started_at DESC",
        SESSION_COLUMNS
    ))
    .bind(user_id)
    .bind(year_week)
    .bind(year_week)
    .bind(week_type)
    .bind(week_type)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_session_detail(
    pool: &Pool<Sqlite>,
    session_id: &str,
    user_id: &str,
) -> Result<SessionDetail, AppError> {
    info!("Fetching workout session");
    let mut conn = pool.acquire().await?;
    let session = get_owned_session(&mut conn, session_id, user_id).await?;

    let sets = sqlx::query_as::<_, WorkoutSet>(&format!(
        "SELECT {} FROM workout_sets WHERE session_id = ? ORDER BY created_at, set_number",
        SET_COLUMNS
    ))
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(SessionDetail { session, sets })
}

/// Applies `finished_at` and/or `notes`. The first transition of
/// `finished_at` from null advances the linked program's rotation in the
/// same transaction; later writes only overwrite the timestamp.
#[instrument(skip(pool, update))]
pub async fn finish_session(
    pool: &Pool<Sqlite>,
    session_id: &str,
    user_id: &str,
    update: &SessionUpdate,
) -> Result<WorkoutSession, AppError> {
    info!("Updating workout session");
    {
        let mut conn = pool.acquire().await?;
        get_owned_session(&mut conn, session_id, user_id).await?;
    }

    let mut tx = pool.begin().await?;

    if let Some(finished_at) = update.finished_at {
        sqlx::query("UPDATE workout_sessions SET finished_at = ? WHERE id = ?")
            .bind(finished_at)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        // Claimed at most once per session; clearing finished_at never resets it.
        let first_finish = sqlx::query(
            "UPDATE workout_sessions SET first_finished_at = ?
             WHERE id = ? AND first_finished_at IS NULL",
        )
        .bind(finished_at)
        .bind(session_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if first_finish {
            let program_id: Option<String> = sqlx::query_scalar(
                "SELECT s.program_id FROM workout_sessions s
                 JOIN programs p ON p.id = s.program_id
                 WHERE s.id = ? AND p.user_id = s.user_id",
            )
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(program_id) = program_id {
                advance_program(&mut tx, &program_id, Utc::now()).await?;
            }
        }
    }

    if let Some(notes) = update.notes.as_deref() {
        sqlx::query("UPDATE workout_sessions SET notes = ? WHERE id = ?")
            .bind(notes)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
    }

    let session = fetch_session(&mut tx, session_id)
        .await?
        .ok_or_else(|| not_found("Session", session_id))?;
    tx.commit().await?;

    info!(finished = session.is_finished(), "Workout session updated");
    Ok(session)
}

/// Inserts a set and, when it qualifies, folds its weight into the weekly
/// progress row inside the same transaction.
#[instrument(skip(pool, set), fields(exercise_id = %set.exercise_id, set_type = %set.set_type))]
pub async fn log_set(
    pool: &Pool<Sqlite>,
    session_id: &str,
    user_id: &str,
    set: &NewSet,
) -> Result<WorkoutSet, AppError> {
    info!("Logging set");
    set.validate()?;

    {
        let mut conn = pool.acquire().await?;
        get_owned_session(&mut conn, session_id, user_id).await?;
        ensure_exercise_visible(&mut conn, &set.exercise_id, user_id).await?;
    }

    let created = WorkoutSet {
        id: new_id(),
        session_id: session_id.to_string(),
        exercise_id: set.exercise_id.clone(),
        set_type: set.set_type,
        set_number: set.set_number,
        reps: set.reps,
        weight: set.weight,
        rpe: set.rpe,
        notes: set.notes.clone(),
        created_at: Utc::now(),
    };

    let mut tx = pool.begin().await?;
    insert_set(&mut tx, &created).await?;
    let recorded = record_set_progress(&mut tx, &created).await?;
    tx.commit().await?;

    info!(set_id = %created.id, progress_recorded = recorded, "Set logged");
    Ok(created)
}

pub(crate) async fn insert_set(
    conn: &mut SqliteConnection,
    set: &WorkoutSet,
) -> Result<(), AppError> {
    sqlx::query(&format!(
        "INSERT INTO workout_sets ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        SET_COLUMNS
    ))
    .bind(&set.id)
    .bind(&set.session_id)
    .bind(&set.exercise_id)
    .bind(set.set_type)
    .bind(set.set_number)
    .bind(set.reps)
    .bind(set.weight)
    .bind(set.rpe)
    .bind(&set.notes)
    .bind(set.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Edits a set in place. An edited working set is folded into the weekly
/// maximum again, which can raise it but never lower it.
#[instrument(skip(pool, update))]
pub async fn update_set(
    pool: &Pool<Sqlite>,
    set_id: &str,
    user_id: &str,
    update: &SetUpdate,
) -> Result<WorkoutSet, AppError> {
    info!("Updating set");
    update.validate()?;

    {
        let mut conn = pool.acquire().await?;
        get_owned_set(&mut conn, set_id, user_id).await?;
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE workout_sets
         SET reps = COALESCE(?, reps),
             weight = COALESCE(?, weight),
             rpe = COALESCE(?, rpe),
             notes = COALESCE(?, notes)
         WHERE id = ?",
    )
    .bind(update.reps)
    .bind(update.weight)
    .bind(update.rpe)
    .bind(&update.notes)
    .bind(set_id)
    .execute(&mut *tx)
    .await?;

    let updated = fetch_set(&mut tx, set_id)
        .await?
        .ok_or_else(|| not_found("Set", set_id))?;
    record_set_progress(&mut tx, &updated).await?;
    tx.commit().await?;

    Ok(updated)
}

/// Removes a set. The weekly maximum is left as it was; `rebuild_progress`
/// is the path for re-deriving it.
#[instrument(skip(pool))]
pub async fn delete_set(pool: &Pool<Sqlite>, set_id: &str, user_id: &str) -> Result<(), AppError> {
    info!("Deleting set");
    let mut conn = pool.acquire().await?;
    get_owned_set(&mut conn, set_id, user_id).await?;

    sqlx::query("DELETE FROM workout_sets WHERE id = ?")
        .bind(set_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
