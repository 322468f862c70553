use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::User;
use crate::db::{
    NewSession, NewSet, SessionUpdate, SetUpdate, create_session, delete_set, finish_session,
    get_session_detail, list_sessions, log_set, update_set,
};
use crate::error::AppError;
use crate::models::{SessionDetail, WeekType, WorkoutSession, WorkoutSet};
use crate::validation::{AppErrorExt, JsonValidateExt, ToValidationResponse, ValidationResponse};

#[get("/sessions?<year_week>&<week_type>")]
pub async fn api_list_sessions(
    year_week: Option<&str>,
    week_type: Option<&str>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<WorkoutSession>>, Custom<Json<ValidationResponse>>> {
    let week_type = week_type
        .map(str::parse::<WeekType>)
        .transpose()
        .validate_custom()?;

    let sessions = list_sessions(db, &user.id, year_week, week_type)
        .await
        .validate_custom()?;

    Ok(Json(sessions))
}

#[post("/sessions", data = "<session>")]
pub async fn api_create_session(
    session: Json<NewSession>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<WorkoutSession>, Custom<Json<ValidationResponse>>> {
    let created = create_session(db, &user.id, &session)
        .await
        .validate_custom()?;
    Ok(Json(created))
}

#[get("/sessions/<id>")]
pub async fn api_get_session(
    id: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SessionDetail>, Custom<Json<ValidationResponse>>> {
    let detail = get_session_detail(db, id, &user.id)
        .await
        .validate_custom()?;
    Ok(Json(detail))
}

#[put("/sessions/<id>", data = "<update>")]
pub async fn api_finish_session(
    id: &str,
    update: Json<SessionUpdate>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<WorkoutSession>, Custom<Json<ValidationResponse>>> {
    if update.finished_at.is_none() && update.notes.is_none() {
        return Err(
            AppError::Validation("Nothing to update".to_string()).to_validation_response(),
        );
    }

    let session = finish_session(db, id, &user.id, &update)
        .await
        .validate_custom()?;
    Ok(Json(session))
}

#[post("/sessions/<id>/sets", data = "<set>")]
pub async fn api_log_set(
    id: &str,
    set: Json<NewSet>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<WorkoutSet>, Custom<Json<ValidationResponse>>> {
    let validated = set.validate_custom()?;

    let created = log_set(db, id, &user.id, &validated)
        .await
        .validate_custom()?;
    Ok(Json(created))
}

#[put("/sessions/sets/<id>", data = "<update>")]
pub async fn api_update_set(
    id: &str,
    update: Json<SetUpdate>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<WorkoutSet>, Custom<Json<ValidationResponse>>> {
    let validated = update.validate_custom()?;

    let updated = update_set(db, id, &user.id, &validated)
        .await
        .validate_custom()?;
    Ok(Json(updated))
}

#[delete("/sessions/sets/<id>")]
pub async fn api_delete_set(
    id: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    delete_set(db, id, &user.id).await.validate_custom()?;
    Ok(Status::NoContent)
}
