use rocket::State;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Serialize;
use sqlx::{Pool, Sqlite};

use crate::auth::User;
use crate::db::{get_exercise_progress, get_progress, rebuild_progress, recompute_max_weight};
use crate::models::ExerciseProgress;
use crate::validation::{AppErrorExt, ValidationResponse, validate_year_week};

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    pub rebuilt: usize,
}

#[get("/progress/exercise/<exercise_id>")]
pub async fn api_get_exercise_progress(
    exercise_id: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ExerciseProgress>>, Custom<Json<ValidationResponse>>> {
    let progress = get_exercise_progress(db, &user.id, exercise_id)
        .await
        .validate_custom()?;
    Ok(Json(progress))
}

/// Stored weekly maximum next to the value re-derived from the sets.
#[derive(Debug, Serialize)]
pub struct WeekProgressResponse {
    pub stored: Option<ExerciseProgress>,
    pub derived_max_weight: Option<f64>,
}

#[get("/progress/exercise/<exercise_id>/<year_week>")]
pub async fn api_get_week_progress(
    exercise_id: &str,
    year_week: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<WeekProgressResponse>, Custom<Json<ValidationResponse>>> {
    validate_year_week(year_week).validate_custom()?;

    let stored = get_progress(db, &user.id, exercise_id, year_week)
        .await
        .validate_custom()?;
    let derived_max_weight = recompute_max_weight(db, &user.id, exercise_id, year_week)
        .await
        .validate_custom()?;

    Ok(Json(WeekProgressResponse {
        stored,
        derived_max_weight,
    }))
}

#[post("/progress/rebuild")]
pub async fn api_rebuild_progress(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<RebuildResponse>, Custom<Json<ValidationResponse>>> {
    let rebuilt = rebuild_progress(db, &user.id).await.validate_custom()?;
    Ok(Json(RebuildResponse { rebuilt }))
}
