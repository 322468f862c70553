use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::User;
use crate::db::{
    NewProgram, activate_program, create_program, deactivate_program, delete_program, get_program,
    get_today, list_programs, update_program,
};
use crate::models::{Program, TodayWorkout};
use crate::validation::{AppErrorExt, JsonValidateExt, ValidationResponse};

#[get("/programs")]
pub async fn api_list_programs(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Program>>, Custom<Json<ValidationResponse>>> {
    let programs = list_programs(db, &user.id).await.validate_custom()?;
    Ok(Json(programs))
}

#[post("/programs", data = "<program>")]
pub async fn api_create_program(
    program: Json<NewProgram>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Program>, Custom<Json<ValidationResponse>>> {
    let validated = program.validate_custom()?;

    let created = create_program(db, &user.id, &validated)
        .await
        .validate_custom()?;

    Ok(Json(created))
}

#[get("/programs/today")]
pub async fn api_get_today(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<TodayWorkout>, Custom<Json<ValidationResponse>>> {
    let today = get_today(db, &user.id).await.validate_custom()?;
    Ok(Json(today))
}

#[get("/programs/<id>")]
pub async fn api_get_program(
    id: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Program>, Custom<Json<ValidationResponse>>> {
    let program = get_program(db, id, &user.id).await.validate_custom()?;
    Ok(Json(program))
}

#[put("/programs/<id>", data = "<program>")]
pub async fn api_update_program(
    id: &str,
    program: Json<NewProgram>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Program>, Custom<Json<ValidationResponse>>> {
    let validated = program.validate_custom()?;

    let updated = update_program(db, id, &user.id, &validated)
        .await
        .validate_custom()?;

    Ok(Json(updated))
}

#[delete("/programs/<id>")]
pub async fn api_delete_program(
    id: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    delete_program(db, id, &user.id).await.validate_custom()?;
    Ok(Status::NoContent)
}

#[post("/programs/<id>/activate")]
pub async fn api_activate_program(
    id: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Program>, Custom<Json<ValidationResponse>>> {
    let program = activate_program(db, id, &user.id).await.validate_custom()?;
    Ok(Json(program))
}

#[post("/programs/<id>/deactivate")]
pub async fn api_deactivate_program(
    id: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Program>, Custom<Json<ValidationResponse>>> {
    let program = deactivate_program(db, id, &user.id)
        .await
        .validate_custom()?;
    Ok(Json(program))
}
