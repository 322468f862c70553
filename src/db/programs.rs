use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::error::AppError;
use crate::models::{DbProgram, Program, Routine, TodayWorkout};
use crate::rotation::RotationState;

use super::{ensure_owner, ensure_template_owned, get_template_exercises, new_id, not_found};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewRoutine {
    pub id: Option<String>,
    pub template_id: String,
    #[serde(default)]
    pub order: i64,
}

/// Routines are rotated in the order they appear in `routines`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProgram {
    pub id: Option<String>,
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(range(min = 1, message = "deload_every_n_weeks must be >= 1"))]
    pub deload_every_n_weeks: i64,
    #[serde(default)]
    #[validate(nested)]
    pub routines: Vec<NewRoutine>,
}

const PROGRAM_COLUMNS: &str = "id, user_id, name, deload_every_n_weeks, is_active, started_at, \
    current_routine_index, weeks_completed, last_workout_at, created_at";

const ROUTINE_SELECT: &str = r#"SELECT r.id, r.program_id, r.template_id, t.name AS template_name,
        r.position, r."order"
    FROM program_routines r
    JOIN workout_templates t ON t.id = r.template_id"#;

async fn fetch_db_program(
    conn: &mut SqliteConnection,
    program_id: &str,
) -> Result<Option<DbProgram>, AppError> {
    let row = sqlx::query_as::<_, DbProgram>(&format!(
        "SELECT {} FROM programs WHERE id = ?",
        PROGRAM_COLUMNS
    ))
    .bind(program_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

async fn fetch_routines(
    conn: &mut SqliteConnection,
    program_id: &str,
) -> Result<Vec<Routine>, AppError> {
    let rows = sqlx::query_as::<_, Routine>(&format!(
        "{} WHERE r.program_id = ? ORDER BY r.position",
        ROUTINE_SELECT
    ))
    .bind(program_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

async fn count_routines(conn: &mut SqliteConnection, program_id: &str) -> Result<usize, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM program_routines WHERE program_id = ?")
        .bind(program_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(count as usize)
}

pub async fn load_program(
    conn: &mut SqliteConnection,
    program_id: &str,
) -> Result<Program, AppError> {
    let db_program = fetch_db_program(conn, program_id)
        .await?
        .ok_or_else(|| not_found("Program", program_id))?;
    let routines = fetch_routines(conn, program_id).await?;

    Ok(Program::from_parts(db_program, routines))
}

async fn load_owned_program(
    conn: &mut SqliteConnection,
    program_id: &str,
    user_id: &str,
) -> Result<Program, AppError> {
    let program = load_program(conn, program_id).await?;
    ensure_owner("Program", program_id, &program.user_id, user_id)?;
    Ok(program)
}

#[instrument(skip(pool))]
pub async fn get_program(
    pool: &Pool<Sqlite>,
    program_id: &str,
    user_id: &str,
) -> Result<Program, AppError> {
    info!("Fetching program");
    let mut conn = pool.acquire().await?;
    load_owned_program(&mut conn, program_id, user_id).await
}

#[instrument(skip(pool))]
pub async fn list_programs(pool: &Pool<Sqlite>, user_id: &str) -> Result<Vec<Program>, AppError> {
    info!("Listing programs");
    let mut conn = pool.acquire().await?;

    let programs = sqlx::query_as::<_, DbProgram>(&format!(
        "SELECT {} FROM programs WHERE user_id = ? ORDER BY created_at DESC",
        PROGRAM_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let routines = sqlx::query_as::<_, Routine>(&format!(
        "{} JOIN programs p ON p.id = r.program_id WHERE p.user_id = ? ORDER BY r.position",
        ROUTINE_SELECT
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_program: HashMap<String, Vec<Routine>> = HashMap::new();
    for routine in routines {
        by_program
            .entry(routine.program_id.clone())
            .or_default()
            .push(routine);
    }

    Ok(programs
        .into_iter()
        .map(|p| {
            let routines = by_program.remove(&p.id).unwrap_or_default();
            Program::from_parts(p, routines)
        })
        .collect())
}

async fn insert_routines(
    conn: &mut SqliteConnection,
    program_id: &str,
    user_id: &str,
    routines: &[NewRoutine],
) -> Result<(), AppError> {
    for (position, routine) in routines.iter().enumerate() {
        ensure_template_owned(conn, &routine.template_id, user_id).await?;

        let id = routine.id.clone().unwrap_or_else(new_id);
        sqlx::query(
            r#"INSERT INTO program_routines (id, program_id, template_id, position, "order")
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(program_id)
        .bind(&routine.template_id)
        .bind(position as i64)
        .bind(routine.order)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[instrument(skip(pool, program), fields(name = %program.name))]
pub async fn create_program(
    pool: &Pool<Sqlite>,
    user_id: &str,
    program: &NewProgram,
) -> Result<Program, AppError> {
    info!("Creating program");
    program.validate()?;

    let id = program.id.clone().unwrap_or_else(new_id);
    let fresh = RotationState::start(program.deload_every_n_weeks);

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO programs (id, user_id, name, deload_every_n_weeks, is_active,
            current_routine_index, weeks_completed, created_at)
         VALUES (?, ?, ?, ?, FALSE, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(program.name.trim())
    .bind(fresh.deload_every_n_weeks)
    .bind(fresh.current_routine_index)
    .bind(fresh.weeks_completed)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .map_err(|e| match AppError::from(e) {
        err if err.is_unique_violation() => {
            AppError::Validation(format!("Program with id {} already exists", id))
        }
        err => err,
    })?;

    insert_routines(&mut tx, &id, user_id, &program.routines).await?;

    let created = load_program(&mut tx, &id).await?;
    tx.commit().await?;

    Ok(created)
}

/// Replaces name, cadence and the routine list. Rotation counters are kept,
/// with the routine index wrapped into the new list length.
#[instrument(skip(pool, program), fields(name = %program.name))]
pub async fn update_program(
    pool: &Pool<Sqlite>,
    program_id: &str,
    user_id: &str,
    program: &NewProgram,
) -> Result<Program, AppError> {
    info!("Updating program");
    program.validate()?;

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE programs SET name = ?, deload_every_n_weeks = ? WHERE id = ? AND user_id = ?",
    )
    .bind(program.name.trim())
    .bind(program.deload_every_n_weeks)
    .bind(program_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        // Resolve NotFound vs Forbidden.
        load_owned_program(&mut tx, program_id, user_id).await?;
    }

    sqlx::query("DELETE FROM program_routines WHERE program_id = ?")
        .bind(program_id)
        .execute(&mut *tx)
        .await?;

    insert_routines(&mut tx, program_id, user_id, &program.routines).await?;

    let current = load_program(&mut tx, program_id).await?;
    let clamped = current.rotation().clamp_to(current.routines.len());
    if clamped.current_routine_index != current.current_routine_index {
        sqlx::query("UPDATE programs SET current_routine_index = ? WHERE id = ?")
            .bind(clamped.current_routine_index)
            .bind(program_id)
            .execute(&mut *tx)
            .await?;
    }

    let updated = load_program(&mut tx, program_id).await?;
    tx.commit().await?;

    Ok(updated)
}

#[instrument(skip(pool))]
pub async fn delete_program(
    pool: &Pool<Sqlite>,
    program_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    info!("Deleting program");
    let mut conn = pool.acquire().await?;
    load_owned_program(&mut conn, program_id, user_id).await?;

    sqlx::query("DELETE FROM programs WHERE id = ?")
        .bind(program_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Makes `program_id` the caller's only active program and restarts its
/// rotation from the first routine of week one.
#[instrument(skip(pool))]
pub async fn activate_program(
    pool: &Pool<Sqlite>,
    program_id: &str,
    user_id: &str,
) -> Result<Program, AppError> {
    info!("Activating program");
    let mut tx = pool.begin().await?;

    // Write first so the transaction holds the write lock before anything is
    // read; concurrent activations for the same user then run one at a time.
    sqlx::query("UPDATE programs SET is_active = FALSE WHERE user_id = ? AND id != ?")
        .bind(user_id)
        .bind(program_id)
        .execute(&mut *tx)
        .await?;

    let program = load_owned_program(&mut tx, program_id, user_id).await?;
    if program.routines.is_empty() {
        return Err(AppError::InvalidState(format!(
            "Program {} has no routines and cannot be activated",
            program_id
        )));
    }

    let fresh = RotationState::start(program.deload_every_n_weeks);
    sqlx::query(
        "UPDATE programs
         SET is_active = TRUE, started_at = ?, current_routine_index = ?,
             weeks_completed = ?, last_workout_at = NULL
         WHERE id = ?",
    )
    .bind(Utc::now())
    .bind(fresh.current_routine_index)
    .bind(fresh.weeks_completed)
    .bind(program_id)
    .execute(&mut *tx)
    .await?;

    let activated = load_program(&mut tx, program_id).await?;
    tx.commit().await?;

    info!(program_id = %program_id, "Program activated");
    Ok(activated)
}

/// Clears the active flag only; rotation counters stay where they were.
#[instrument(skip(pool))]
pub async fn deactivate_program(
    pool: &Pool<Sqlite>,
    program_id: &str,
    user_id: &str,
) -> Result<Program, AppError> {
    info!("Deactivating program");
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE programs SET is_active = FALSE WHERE id = ? AND user_id = ?")
        .bind(program_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let program = load_owned_program(&mut tx, program_id, user_id).await?;
    tx.commit().await?;

    Ok(program)
}

/// Moves the rotation one routine forward. Must run inside the transaction
/// that marks the session finished, after that write, so the program row is
/// read and written while the transaction already holds the write lock.
///
/// Returns `None` when nothing moved: the program is gone or has no routines.
#[instrument(skip(conn))]
pub async fn advance_program(
    conn: &mut SqliteConnection,
    program_id: &str,
    at: DateTime<Utc>,
) -> Result<Option<RotationState>, AppError> {
    let Some(program) = fetch_db_program(conn, program_id).await? else {
        warn!("Program linked to finished session no longer exists");
        return Ok(None);
    };

    let routine_count = count_routines(conn, program_id).await?;
    let current = RotationState {
        current_routine_index: program.current_routine_index,
        weeks_completed: program.weeks_completed,
        deload_every_n_weeks: program.deload_every_n_weeks,
    };

    let Some(next) = current.advance(routine_count) else {
        info!("Program has no routines, rotation not advanced");
        return Ok(None);
    };

    sqlx::query(
        "UPDATE programs
         SET current_routine_index = ?, weeks_completed = ?, last_workout_at = ?
         WHERE id = ?",
    )
    .bind(next.current_routine_index)
    .bind(next.weeks_completed)
    .bind(at)
    .bind(program_id)
    .execute(&mut *conn)
    .await?;

    info!(
        current_routine_index = next.current_routine_index,
        weeks_completed = next.weeks_completed,
        "Program rotation advanced"
    );

    Ok(Some(next))
}

#[instrument(skip(pool))]
pub async fn get_active_program(pool: &Pool<Sqlite>, user_id: &str) -> Result<Program, AppError> {
    let mut conn = pool.acquire().await?;

    let program_id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM programs WHERE user_id = ? AND is_active = TRUE
         ORDER BY started_at DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    let program_id =
        program_id.ok_or_else(|| AppError::NotFound("No active program found".to_string()))?;

    load_program(&mut conn, &program_id).await
}

/// Derives the workout that is due from the active program's state. Read-only.
#[instrument(skip(pool))]
pub async fn get_today(pool: &Pool<Sqlite>, user_id: &str) -> Result<TodayWorkout, AppError> {
    info!("Deriving today's workout");
    let program = get_active_program(pool, user_id).await?;

    let rotation = program.rotation();
    let slots = rotation.slots(program.routines.len())?;

    let current_routine = program
        .routines
        .get(slots.current)
        .cloned()
        .ok_or_else(|| AppError::Internal("Rotation slot out of range".to_string()))?;
    let next_routine_name = program
        .routines
        .get(slots.next)
        .map(|r| r.template_name.clone())
        .ok_or_else(|| AppError::Internal("Rotation slot out of range".to_string()))?;

    let week_type = rotation.week_type();
    let mut conn = pool.acquire().await?;
    let template_exercises =
        get_template_exercises(&mut conn, &current_routine.template_id, week_type).await?;

    Ok(TodayWorkout {
        template_name: current_routine.template_name.clone(),
        current_routine,
        template_exercises,
        week_type,
        week_number: rotation.week_number(),
        is_deload: rotation.is_deload(),
        next_routine_name,
        program,
    })
}
