use rocket::State;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::User;
use crate::db::{NewExercise, create_exercise, list_exercises};
use crate::models::Exercise;
use crate::validation::{AppErrorExt, JsonValidateExt, ValidationResponse};

#[get("/exercises")]
pub async fn api_list_exercises(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Exercise>>, Custom<Json<ValidationResponse>>> {
    let exercises = list_exercises(db, &user.id).await.validate_custom()?;
    Ok(Json(exercises))
}

#[post("/exercises", data = "<exercise>")]
pub async fn api_create_exercise(
    exercise: Json<NewExercise>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Exercise>, Custom<Json<ValidationResponse>>> {
    let validated = exercise.validate_custom()?;

    let created = create_exercise(db, &user.id, &validated)
        .await
        .validate_custom()?;

    Ok(Json(created))
}
