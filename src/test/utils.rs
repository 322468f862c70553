use std::collections::HashMap;
use std::sync::Once;

use chrono::{Duration, Utc};
use rocket::http::Header;
use rocket::local::asynchronous::Client;
use sqlx::{Pool, Sqlite};
use tempfile::TempDir;

use crate::db::{
    NewExercise, NewProgram, NewRoutine, NewTemplate, NewTemplateExercise, connect,
    create_exercise, create_program, create_template, create_user, create_user_session,
    run_migrations,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::init_rocket;
use crate::models::WeekType;

static INIT: Once = Once::new();

struct TestUser {
    email: String,
    display_name: String,
}

struct TestExercise {
    name: String,
    muscle_group: String,
    owner_email: Option<String>,
}

struct TestTemplate {
    owner_email: String,
    name: String,
    exercise_names: Vec<String>,
}

struct TestProgram {
    owner_email: String,
    name: String,
    deload_every_n_weeks: i64,
    template_names: Vec<String>,
}

#[derive(Default)]
pub struct TestDbBuilder {
    users: Vec<TestUser>,
    exercises: Vec<TestExercise>,
    templates: Vec<TestTemplate>,
    programs: Vec<TestProgram>,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, email: &str) -> Self {
        self.users.push(TestUser {
            email: email.to_string(),
            display_name: email.split('@').next().unwrap_or(email).to_string(),
        });
        self
    }

    /// Library exercise with no owner, visible to everyone.
    pub fn exercise(mut self, name: &str, muscle_group: &str) -> Self {
        self.exercises.push(TestExercise {
            name: name.to_string(),
            muscle_group: muscle_group.to_string(),
            owner_email: None,
        });
        self
    }

    pub fn custom_exercise(mut self, owner_email: &str, name: &str, muscle_group: &str) -> Self {
        self.exercises.push(TestExercise {
            name: name.to_string(),
            muscle_group: muscle_group.to_string(),
            owner_email: Some(owner_email.to_string()),
        });
        self
    }

    /// Each listed exercise gets a normal and a deload prescription.
    pub fn template(mut self, owner_email: &str, name: &str, exercise_names: &[&str]) -> Self {
        self.templates.push(TestTemplate {
            owner_email: owner_email.to_string(),
            name: name.to_string(),
            exercise_names: exercise_names.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn program(
        mut self,
        owner_email: &str,
        name: &str,
        deload_every_n_weeks: i64,
        template_names: &[&str],
    ) -> Self {
        self.programs.push(TestProgram {
            owner_email: owner_email.to_string(),
            name: name.to_string(),
            deload_every_n_weeks,
            template_names: template_names.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .parse_filters("debug")
                .is_test(true)
                .try_init();
        });

        let dir = TempDir::new().map_err(|e| AppError::Internal(e.to_string()))?;
        let config = AppConfig {
            database_url: format!("sqlite://{}", dir.path().join("test.db").display()),
            database_max_connections: 5,
            database_busy_timeout_ms: 5000,
            deployment_environment: "test".to_string(),
            otlp_endpoint: None,
            otlp_api_key_header: None,
            otlp_api_key: None,
        };

        let pool = connect(&config).await?;
        run_migrations(&pool).await?;

        let mut user_id_map = HashMap::new();
        let mut token_map = HashMap::new();
        for user in &self.users {
            let user_id = create_user(&pool, &user.email, &user.display_name).await?;
            let token = format!("token-{}", uuid::Uuid::new_v4());
            create_user_session(&pool, &user_id, &token, Utc::now() + Duration::hours(1)).await?;

            user_id_map.insert(user.email.clone(), user_id);
            token_map.insert(user.email.clone(), token);
        }

        let mut exercise_id_map = HashMap::new();
        for exercise in &self.exercises {
            let id = match &exercise.owner_email {
                Some(owner) => {
                    create_exercise(
                        &pool,
                        &user_id_map[owner],
                        &NewExercise {
                            name: exercise.name.clone(),
                            muscle_group: exercise.muscle_group.clone(),
                            equipment: None,
                            notes: None,
                        },
                    )
                    .await?
                    .id
                }
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    sqlx::query(
                        "INSERT INTO exercises (id, user_id, name, muscle_group, is_custom, created_at)
                         VALUES (?, NULL, ?, ?, FALSE, ?)",
                    )
                    .bind(&id)
                    .bind(&exercise.name)
                    .bind(&exercise.muscle_group)
                    .bind(Utc::now())
                    .execute(&pool)
                    .await?;
                    id
                }
            };
            exercise_id_map.insert(exercise.name.clone(), id);
        }

        let mut template_id_map = HashMap::new();
        for template in &self.templates {
            let mut template_exercises = Vec::new();
            for (order, name) in template.exercise_names.iter().enumerate() {
                for week_type in [WeekType::Normal, WeekType::Deload] {
                    template_exercises.push(prescription(
                        &exercise_id_map[name],
                        week_type,
                        order as i64,
                    ));
                }
            }

            let created = create_template(
                &pool,
                &user_id_map[&template.owner_email],
                &NewTemplate {
                    name: template.name.clone(),
                    template_exercises,
                },
            )
            .await?;
            template_id_map.insert(template.name.clone(), created.template.id);
        }

        let mut program_id_map = HashMap::new();
        for program in &self.programs {
            let routines = program
                .template_names
                .iter()
                .enumerate()
                .map(|(order, name)| NewRoutine {
                    id: None,
                    template_id: template_id_map[name].clone(),
                    order: order as i64,
                })
                .collect();

            let created = create_program(
                &pool,
                &user_id_map[&program.owner_email],
                &NewProgram {
                    id: None,
                    name: program.name.clone(),
                    deload_every_n_weeks: program.deload_every_n_weeks,
                    routines,
                },
            )
            .await?;
            program_id_map.insert(program.name.clone(), created.id);
        }

        Ok(TestDb {
            _dir: dir,
            pool,
            user_id_map,
            token_map,
            exercise_id_map,
            template_id_map,
            program_id_map,
        })
    }
}

/// A deload prescription is the normal one with one working set less.
pub fn prescription(exercise_id: &str, week_type: WeekType, order: i64) -> NewTemplateExercise {
    let working_sets = match week_type {
        WeekType::Normal => 3,
        WeekType::Deload => 2,
    };

    NewTemplateExercise {
        exercise_id: exercise_id.to_string(),
        week_type,
        order,
        working_sets,
        min_reps: 6,
        max_reps: 10,
        early_set_rpe_min: 7.0,
        early_set_rpe_max: 8.0,
        last_set_rpe_min: 8.0,
        last_set_rpe_max: 9.0,
        rest_period: "2-3 min".to_string(),
        intensity_technique: None,
        min_warmup_sets: 1,
        max_warmup_sets: 2,
    }
}

pub struct TestDb {
    _dir: TempDir,
    pub pool: Pool<Sqlite>,
    pub user_id_map: HashMap<String, String>,
    pub token_map: HashMap<String, String>,
    pub exercise_id_map: HashMap<String, String>,
    pub template_id_map: HashMap<String, String>,
    pub program_id_map: HashMap<String, String>,
}

impl TestDb {
    pub fn user_id(&self, email: &str) -> String {
        self.user_id_map[email].clone()
    }

    pub fn exercise_id(&self, name: &str) -> String {
        self.exercise_id_map[name].clone()
    }

    pub fn template_id(&self, name: &str) -> String {
        self.template_id_map[name].clone()
    }

    pub fn program_id(&self, name: &str) -> String {
        self.program_id_map[name].clone()
    }

    pub fn auth_header(&self, email: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", self.token_map[email]))
    }
}

/// Two users, a small library and one upper/lower program for `lifter`.
pub async fn create_standard_test_db() -> TestDb {
    TestDbBuilder::new()
        .user("lifter@example.com")
        .user("other@example.com")
        .exercise("Bench Press", "chest")
        .exercise("Squat", "legs")
        .exercise("Row", "back")
        .custom_exercise("other@example.com", "Secret Curl", "arms")
        .template("lifter@example.com", "Upper", &["Bench Press", "Row"])
        .template("lifter@example.com", "Lower", &["Squat"])
        .template("other@example.com", "Other Upper", &["Bench Press"])
        .program("lifter@example.com", "Upper/Lower", 2, &["Upper", "Lower"])
        .program("lifter@example.com", "Upper Only", 4, &["Upper"])
        .program("other@example.com", "Other Program", 3, &["Other Upper"])
        .build()
        .await
        .expect("Failed to build test database")
}

pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
    let rocket = init_rocket(test_db.pool.clone()).await;
    let client = Client::tracked(rocket)
        .await
        .expect("valid rocket instance");
    (client, test_db)
}
