use chrono::Utc;
use serde::Deserialize;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};
use validator::{Validate, ValidationError};

use crate::error::AppError;
use crate::models::{Template, TemplateDetail, TemplateExercise, WeekType};
use crate::validation::check_min_max;

use super::{ensure_exercise_visible, ensure_owner, new_id, not_found};

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_prescription_ranges"))]
pub struct NewTemplateExercise {
    pub exercise_id: String,
    pub week_type: WeekType,
    #[validate(range(min = 0, message = "order must be >= 0"))]
    pub order: i64,
    #[validate(range(min = 1, message = "working_sets must be >= 1"))]
    pub working_sets: i64,
    #[validate(range(min = 1, message = "min_reps must be >= 1"))]
    pub min_reps: i64,
    #[validate(range(min = 1, message = "max_reps must be >= 1"))]
    pub max_reps: i64,
    #[validate(range(min = 1.0, max = 10.0, message = "RPE must be between 1 and 10"))]
    pub early_set_rpe_min: f64,
    #[validate(range(min = 1.0, max = 10.0, message = "RPE must be between 1 and 10"))]
    pub early_set_rpe_max: f64,
    #[validate(range(min = 1.0, max = 10.0, message = "RPE must be between 1 and 10"))]
    pub last_set_rpe_min: f64,
    #[validate(range(min = 1.0, max = 10.0, message = "RPE must be between 1 and 10"))]
    pub last_set_rpe_max: f64,
    #[validate(length(min = 1, max = 50, message = "rest_period must be 1-50 characters"))]
    pub rest_period: String,
    pub intensity_technique: Option<String>,
    #[validate(range(min = 0, message = "min_warmup_sets must be >= 0"))]
    pub min_warmup_sets: i64,
    #[validate(range(min = 0, message = "max_warmup_sets must be >= 0"))]
    pub max_warmup_sets: i64,
}

fn validate_prescription_ranges(exercise: &NewTemplateExercise) -> Result<(), ValidationError> {
    check_min_max(
        exercise.min_reps,
        exercise.max_reps,
        "rep_range",
        "min_reps must be <= max_reps",
    )?;
    check_min_max(
        exercise.early_set_rpe_min,
        exercise.early_set_rpe_max,
        "early_rpe_range",
        "early_set_rpe_min must be <= early_set_rpe_max",
    )?;
    check_min_max(
        exercise.last_set_rpe_min,
        exercise.last_set_rpe_max,
        "last_rpe_range",
        "last_set_rpe_min must be <= last_set_rpe_max",
    )?;
    check_min_max(
        exercise.min_warmup_sets,
        exercise.max_warmup_sets,
        "warmup_range",
        "min_warmup_sets must be <= max_warmup_sets",
    )
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewTemplate {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(nested)]
    pub template_exercises: Vec<NewTemplateExercise>,
}

const TEMPLATE_EXERCISE_COLUMNS: &str = r#"id, template_id, exercise_id, week_type, "order", working_sets,
    min_reps, max_reps, early_set_rpe_min, early_set_rpe_max, last_set_rpe_min, last_set_rpe_max,
    rest_period, intensity_technique, min_warmup_sets, max_warmup_sets"#;

#[instrument(skip(pool, template), fields(name = %template.name))]
pub async fn create_template(
    pool: &Pool<Sqlite>,
    user_id: &str,
    template: &NewTemplate,
) -> Result<TemplateDetail, AppError> {
    info!("Creating template");
    template.validate()?;

    let created = Template {
        id: new_id(),
        user_id: user_id.to_string(),
        name: template.name.trim().to_string(),
        created_at: Utc::now(),
    };

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO workout_templates (id, user_id, name, created_at) VALUES (?, ?, ?, ?)")
        .bind(&created.id)
        .bind(&created.user_id)
        .bind(&created.name)
        .bind(created.created_at)
        .execute(&mut *tx)
        .await?;

    let mut template_exercises = Vec::with_capacity(template.template_exercises.len());
    for exercise in &template.template_exercises {
        ensure_exercise_visible(&mut tx, &exercise.exercise_id, user_id).await?;

        let row = TemplateExercise {
            id: new_id(),
            template_id: created.id.clone(),
            exercise_id: exercise.exercise_id.clone(),
            week_type: exercise.week_type,
            order: exercise.order,
            working_sets: exercise.working_sets,
            min_reps: exercise.min_reps,
            max_reps: exercise.max_reps,
            early_set_rpe_min: exercise.early_set_rpe_min,
            early_set_rpe_max: exercise.early_set_rpe_max,
            last_set_rpe_min: exercise.last_set_rpe_min,
            last_set_rpe_max: exercise.last_set_rpe_max,
            rest_period: exercise.rest_period.clone(),
            intensity_technique: exercise.intensity_technique.clone(),
            min_warmup_sets: exercise.min_warmup_sets,
            max_warmup_sets: exercise.max_warmup_sets,
        };

        sqlx::query(&format!(
            "INSERT INTO template_exercises ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            TEMPLATE_EXERCISE_COLUMNS
        ))
        .bind(&row.id)
        .bind(&row.template_id)
        .bind(&row.exercise_id)
        .bind(row.week_type)
        .bind(row.order)
        .bind(row.working_sets)
        .bind(row.min_reps)
        .bind(row.max_reps)
        .bind(row.early_set_rpe_min)
        .bind(row.early_set_rpe_max)
        .bind(row.last_set_rpe_min)
        .bind(row.last_set_rpe_max)
        .bind(&row.rest_period)
        .bind(&row.intensity_technique)
        .bind(row.min_warmup_sets)
        .bind(row.max_warmup_sets)
        .execute(&mut *tx)
        .await?;

        template_exercises.push(row);
    }

    tx.commit().await?;

    template_exercises.sort_by_key(|te| (te.week_type.as_str(), te.order));

    Ok(TemplateDetail {
        template: created,
        template_exercises,
    })
}

#[instrument(skip(pool))]
pub async fn list_templates(pool: &Pool<Sqlite>, user_id: &str) -> Result<Vec<Template>, AppError> {
    info!("Listing templates");
    let rows = sqlx::query_as::<_, Template>(
        "SELECT id, user_id, name, created_at FROM workout_templates
         WHERE user_id = ?
         ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_template_detail(
    pool: &Pool<Sqlite>,
    template_id: &str,
    user_id: &str,
) -> Result<TemplateDetail, AppError> {
    info!("Fetching template detail");
    let mut conn = pool.acquire().await?;
    ensure_template_owned(&mut conn, template_id, user_id).await?;

    let template = sqlx::query_as::<_, Template>(
        "SELECT id, user_id, name, created_at FROM workout_templates WHERE id = ?",
    )
    .bind(template_id)
    .fetch_one(&mut *conn)
    .await?;

    let template_exercises = sqlx::query_as::<_, TemplateExercise>(&format!(
        r#"SELECT {} FROM template_exercises WHERE template_id = ? ORDER BY week_type, "order""#,
        TEMPLATE_EXERCISE_COLUMNS
    ))
    .bind(template_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(TemplateDetail {
        template,
        template_exercises,
    })
}

/// The prescriptions that apply for one week type, in exercise order.
#[instrument(skip(conn))]
pub async fn get_template_exercises(
    conn: &mut SqliteConnection,
    template_id: &str,
    week_type: WeekType,
) -> Result<Vec<TemplateExercise>, AppError> {
    let rows = sqlx::query_as::<_, TemplateExercise>(&format!(
        r#"SELECT {} FROM template_exercises WHERE template_id = ? AND week_type = ? ORDER BY "order""#,
        TEMPLATE_EXERCISE_COLUMNS
    ))
    .bind(template_id)
    .bind(week_type)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

#[instrument(skip(conn))]
pub async fn ensure_template_owned(
    conn: &mut SqliteConnection,
    template_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    let owner: Option<String> =
        sqlx::query_scalar("SELECT user_id FROM workout_templates WHERE id = ?")
            .bind(template_id)
            .fetch_optional(&mut *conn)
            .await?;

    match owner {
        None => Err(not_found("Template", template_id)),
        Some(owner_id) => ensure_owner("Template", template_id, &owner_id, user_id),
    }
}
