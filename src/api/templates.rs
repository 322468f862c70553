use rocket::State;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::User;
use crate::db::{NewTemplate, create_template, get_template_detail, list_templates};
use crate::models::{Template, TemplateDetail};
use crate::validation::{AppErrorExt, JsonValidateExt, ValidationResponse};

#[get("/templates")]
pub async fn api_list_templates(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Template>>, Custom<Json<ValidationResponse>>> {
    let templates = list_templates(db, &user.id).await.validate_custom()?;
    Ok(Json(templates))
}

#[post("/templates", data = "<template>")]
pub async fn api_create_template(
    template: Json<NewTemplate>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<TemplateDetail>, Custom<Json<ValidationResponse>>> {
    let validated = template.validate_custom()?;

    let created = create_template(db, &user.id, &validated)
        .await
        .validate_custom()?;

    Ok(Json(created))
}

#[get("/templates/<id>")]
pub async fn api_get_template(
    id: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<TemplateDetail>, Custom<Json<ValidationResponse>>> {
    let detail = get_template_detail(db, id, &user.id)
        .await
        .validate_custom()?;
    Ok(Json(detail))
}
