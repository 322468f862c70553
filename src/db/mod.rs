pub mod exercises;
pub mod programs;
pub mod progress;
pub mod sessions;
pub mod sync;
pub mod templates;
pub mod users;

pub use exercises::*;
pub use programs::*;
pub use progress::*;
pub use sessions::*;
pub use sync::*;
pub use templates::*;
pub use users::*;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::env::AppConfig;
use crate::error::AppError;

pub async fn connect(config: &AppConfig) -> Result<Pool<Sqlite>, AppError> {
    info!(
        max_connections = config.database_max_connections,
        busy_timeout_ms = config.database_busy_timeout_ms,
        "Connecting to SQLite database"
    );

    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(config.database_busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Migrations completed successfully");
    Ok(())
}

/// Existence and ownership check shared by every owner-scoped entity.
/// A row owned by someone else is `Forbidden`, never `NotFound`.
pub(crate) fn ensure_owner(
    kind: &str,
    id: &str,
    owner_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    if owner_id != user_id {
        return Err(AppError::Forbidden(format!(
            "{} {} belongs to another user",
            kind, id
        )));
    }
    Ok(())
}

pub(crate) fn not_found(kind: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{} with id {} not found", kind, id))
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
