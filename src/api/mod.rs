mod exercises;
mod programs;
mod progress;
mod sessions;
mod sync;
mod templates;

pub use exercises::*;
pub use programs::*;
pub use progress::*;
pub use sessions::*;
pub use sync::*;
pub use templates::*;

use rocket::Route;

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

/// Every route served under `/api`.
pub fn routes() -> Vec<Route> {
    routes![
        health,
        api_list_exercises,
        api_create_exercise,
        api_list_templates,
        api_create_template,
        api_get_template,
        api_list_programs,
        api_create_program,
        api_get_today,
        api_get_program,
        api_update_program,
        api_delete_program,
        api_activate_program,
        api_deactivate_program,
        api_list_sessions,
        api_create_session,
        api_get_session,
        api_finish_session,
        api_log_set,
        api_update_set,
        api_delete_set,
        api_get_exercise_progress,
        api_get_week_progress,
        api_rebuild_progress,
        api_sync,
    ]
}
