#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod rotation;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use auth::unauthorized_api;
use env::AppConfig;
use error::AppError;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use telemetry::{TelemetryFairing, init_tracing, shutdown_telemetry};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("{0}")]
    Rocket(#[from] rocket::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    env::load_environment()?;
    let config = AppConfig::from_env()?;
    init_tracing(&config)?;

    let pool = db::connect(&config).await?;
    db::run_migrations(&pool).await?;

    init_rocket(pool).await.launch().await?;
    Ok(())
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting workout tracker");

    rocket::build()
        .manage(pool)
        .mount("/api", api::routes())
        .register("/api", catchers![unauthorized_api])
        .attach(TelemetryFairing)
        .attach(AdHoc::on_shutdown("Telemetry shutdown", |_| {
            Box::pin(async { shutdown_telemetry() })
        }))
}
