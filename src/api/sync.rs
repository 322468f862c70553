use rocket::State;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::User;
use crate::db::{SyncBatch, SyncReport, sync_batch};
use crate::validation::{AppErrorExt, ValidationResponse};

/// Item failures are reported in the body; the response is still 200.
#[post("/sync", data = "<batch>")]
pub async fn api_sync(
    batch: Json<SyncBatch>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SyncReport>, Custom<Json<ValidationResponse>>> {
    let report = sync_batch(db, &user.id, &batch).await.validate_custom()?;
    Ok(Json(report))
}
