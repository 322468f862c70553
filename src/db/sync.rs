//! Batch reconciliation of sessions and sets recorded offline.
//!
//! Every item is applied inside its own savepoint, so a failing item is rolled
//! back and reported while the rest of the batch commits. Sessions are applied
//! before sets so a set can reference a session from the same batch. Rotation
//! state is never touched here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, Pool, Sqlite, SqliteConnection};
use thiserror::Error;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::error::AppError;
use crate::models::{SetType, WeekType, WorkoutSet};
use crate::validation::validate_year_week;

use super::sessions::{SESSION_COLUMNS, ensure_program_owned, fetch_set, insert_set};
use super::{ensure_template_owned, not_found, record_set_progress};

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSession {
    pub id: String,
    pub template_id: Option<String>,
    pub program_id: Option<String>,
    pub year_week: Option<String>,
    pub week_type: WeekType,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SyncSet {
    pub id: String,
    pub session_id: String,
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
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncBatch {
    #[serde(default)]
    pub sessions: Vec<SyncSession>,
    #[serde(default)]
    pub sets: Vec<SyncSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub synced_sessions: Vec<String>,
    pub synced_sets: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SyncItemError {
    #[error("Session {id}: {source}")]
    Session { id: String, source: AppError },

    #[error("Set {id}: {source}")]
    Set { id: String, source: AppError },
}

/// Upserts every session, then every set, and reports per-item outcomes.
/// Only a failure to open or commit the surrounding transaction is returned
/// as an error; item failures end up in `SyncReport::errors`.
#[instrument(skip(pool, batch), fields(sessions = batch.sessions.len(), sets = batch.sets.len()))]
pub async fn sync_batch(
    pool: &Pool<Sqlite>,
    user_id: &str,
    batch: &SyncBatch,
) -> Result<SyncReport, AppError> {
    info!("Syncing offline batch");
    let mut report = SyncReport::default();
    let mut tx = pool.begin().await?;

    for session in &batch.sessions {
        match sync_session(&mut tx, user_id, session).await {
            Ok(()) => report.synced_sessions.push(session.id.clone()),
            Err(source) => {
                let err = SyncItemError::Session {
                    id: session.id.clone(),
                    source,
                };
                warn!(error = %err, "Session sync failed");
                report.errors.push(err.to_string());
            }
        }
    }

    for set in &batch.sets {
        match sync_set(&mut tx, set).await {
            Ok(()) => report.synced_sets.push(set.id.clone()),
            Err(source) => {
                let err = SyncItemError::Set {
                    id: set.id.clone(),
                    source,
                };
                warn!(error = %err, "Set sync failed");
                report.errors.push(err.to_string());
            }
        }
    }

    tx.commit().await?;

    info!(
        synced_sessions = report.synced_sessions.len(),
        synced_sets = report.synced_sets.len(),
        errors = report.errors.len(),
        "Offline batch synced"
    );

    Ok(report)
}

async fn sync_session(
    conn: &mut SqliteConnection,
    user_id: &str,
    session: &SyncSession,
) -> Result<(), AppError> {
    let mut savepoint = conn.begin().await?;
    match upsert_session(&mut savepoint, user_id, session).await {
        Ok(()) => {
            savepoint.commit().await?;
            Ok(())
        }
        Err(err) => {
            savepoint.rollback().await?;
            Err(err)
        }
    }
}

async fn sync_set(conn: &mut SqliteConnection, set: &SyncSet) -> Result<(), AppError> {
    let mut savepoint = conn.begin().await?;
    match upsert_set(&mut savepoint, set).await {
        Ok(()) => {
            savepoint.commit().await?;
            Ok(())
        }
        Err(err) => {
            savepoint.rollback().await?;
            Err(err)
        }
    }
}

/// Last write wins: an existing session owned by the caller has every mutable
/// field overwritten. `first_finished_at` is only ever filled in, so a synced
/// finish counts as the session's first finish and never re-arms rotation.
async fn upsert_session(
    conn: &mut SqliteConnection,
    user_id: &str,
    session: &SyncSession,
) -> Result<(), AppError> {
    if let Some(year_week) = session.year_week.as_deref() {
        validate_year_week(year_week)?;
    }

    let overwritten = sqlx::query(
        "UPDATE workout_sessions
         SET template_id = ?, program_id = ?, year_week = ?, week_type = ?,
             started_at = ?, finished_at = ?, notes = ?, synced = TRUE,
             first_finished_at = COALESCE(first_finished_at, ?)
         WHERE id = ? AND user_id = ?",
    )
    .bind(&session.template_id)
    .bind(&session.program_id)
    .bind(&session.year_week)
    .bind(session.week_type)
    .bind(session.started_at)
    .bind(session.finished_at)
    .bind(&session.notes)
    .bind(session.finished_at)
    .bind(&session.id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?
    .rows_affected()
        > 0;

    if !overwritten {
        let owner: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM workout_sessions WHERE id = ?")
                .bind(&session.id)
                .fetch_optional(&mut *conn)
                .await?;

        if owner.is_some() {
            return Err(AppError::Forbidden(format!(
                "Session {} belongs to another user",
                session.id
            )));
        }

        sqlx::query(&format!(
            "INSERT INTO workout_sessions ({}, first_finished_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, TRUE, ?)",
            SESSION_COLUMNS
        ))
        .bind(&session.id)
        .bind(user_id)
        .bind(&session.template_id)
        .bind(&session.program_id)
        .bind(&session.year_week)
        .bind(session.week_type)
        .bind(session.started_at)
        .bind(session.finished_at)
        .bind(&session.notes)
        .bind(session.finished_at)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(template_id) = session.template_id.as_deref() {
        ensure_template_owned(conn, template_id, user_id).await?;
    }
    if let Some(program_id) = session.program_id.as_deref() {
        ensure_program_owned(conn, program_id, user_id).await?;
    }

    Ok(())
}

/// Sets carry no owner of their own; they are matched by identity and keep
/// the parent session they were first stored under.
async fn upsert_set(conn: &mut SqliteConnection, set: &SyncSet) -> Result<(), AppError> {
    set.validate()?;

    let overwritten = sqlx::query(
        "UPDATE workout_sets
         SET exercise_id = ?, set_type = ?, set_number = ?, reps = ?, weight = ?,
             rpe = ?, notes = ?
         WHERE id = ?",
    )
    .bind(&set.exercise_id)
    .bind(set.set_type)
    .bind(set.set_number)
    .bind(set.reps)
    .bind(set.weight)
    .bind(set.rpe)
    .bind(&set.notes)
    .bind(&set.id)
    .execute(&mut *conn)
    .await?
    .rows_affected()
        > 0;

    if !overwritten {
        let parent_exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM workout_sessions WHERE id = ?")
                .bind(&set.session_id)
                .fetch_optional(&mut *conn)
                .await?;

        if parent_exists.is_none() {
            return Err(not_found("Session", &set.session_id));
        }

        let created = WorkoutSet {
            id: set.id.clone(),
            session_id: set.session_id.clone(),
            exercise_id: set.exercise_id.clone(),
            set_type: set.set_type,
            set_number: set.set_number,
            reps: set.reps,
            weight: set.weight,
            rpe: set.rpe,
            notes: set.notes.clone(),
            created_at: set.created_at.unwrap_or_else(Utc::now),
        };
        insert_set(conn, &created).await?;
    }

    let stored = fetch_set(conn, &set.id)
        .await?
        .ok_or_else(|| not_found("Set", &set.id))?;
    record_set_progress(conn, &stored).await?;

    Ok(())
}
