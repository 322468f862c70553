use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::rotation::RotationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum WeekType {
    Normal,
    Deload,
}

impl WeekType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeekType::Normal => "normal",
            WeekType::Deload => "deload",
        }
    }
}

impl fmt::Display for WeekType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeekType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(WeekType::Normal),
            "deload" => Ok(WeekType::Deload),
            _ => Err(AppError::Validation(format!("Unknown week type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SetType {
    Warmup,
    Working,
}

impl SetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetType::Warmup => "warmup",
            SetType::Working => "working",
        }
    }

    /// Only working sets feed the weekly progress aggregate.
    pub fn counts_toward_progress(&self) -> bool {
        matches!(self, SetType::Working)
    }
}

impl fmt::Display for SetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Exercise {
    pub id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub muscle_group: String,
    pub equipment: Option<String>,
    pub is_custom: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Template {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TemplateExercise {
    pub id: String,
    pub template_id: String,
    pub exercise_id: String,
    pub week_type: WeekType,
    pub order: i64,
    pub working_sets: i64,
    pub min_reps: i64,
    pub max_reps: i64,
    pub early_set_rpe_min: f64,
    pub early_set_rpe_max: f64,
    pub last_set_rpe_min: f64,
    pub last_set_rpe_max: f64,
    pub rest_period: String,
    pub intensity_technique: Option<String>,
    pub min_warmup_sets: i64,
    pub max_warmup_sets: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDetail {
    #[serde(flatten)]
    pub template: Template,
    pub template_exercises: Vec<TemplateExercise>,
}

/// A program's reference to a template. `position` is the rotation slot,
/// `order` is only used when listing routines back to the client.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Routine {
    pub id: String,
    pub program_id: String,
    pub template_id: String,
    pub template_name: String,
    pub position: i64,
    pub order: i64,
}

#[derive(sqlx::FromRow, Clone, Debug)]
pub struct DbProgram {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub deload_every_n_weeks: i64,
    pub is_active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub current_routine_index: i64,
    pub weeks_completed: i64,
    pub last_workout_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub deload_every_n_weeks: i64,
    pub is_active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub current_routine_index: i64,
    pub weeks_completed: i64,
    pub last_workout_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub routine_count: usize,
    /// Routines in rotation order.
    pub routines: Vec<Routine>,
    /// Routine ids sorted by `order`, then rotation slot. Listing only.
    pub display_order: Vec<String>,
}

impl Program {
    pub fn from_parts(db: DbProgram, mut routines: Vec<Routine>) -> Self {
        routines.sort_by_key(|r| r.position);

        let mut display: Vec<&Routine> = routines.iter().collect();
        display.sort_by_key(|r| (r.order, r.position));
        let display_order = display.into_iter().map(|r| r.id.clone()).collect();

        Self {
            id: db.id,
            user_id: db.user_id,
            name: db.name,
            deload_every_n_weeks: db.deload_every_n_weeks,
            is_active: db.is_active,
            started_at: db.started_at,
            current_routine_index: db.current_routine_index,
            weeks_completed: db.weeks_completed,
            last_workout_at: db.last_workout_at,
            created_at: db.created_at,
            routine_count: routines.len(),
            routines,
            display_order,
        }
    }

    pub fn rotation(&self) -> RotationState {
        RotationState {
            current_routine_index: self.current_routine_index,
            weeks_completed: self.weeks_completed,
            deload_every_n_weeks: self.deload_every_n_weeks,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkoutSession {
    pub id: String,
    pub user_id: String,
    pub template_id: Option<String>,
    pub program_id: Option<String>,
    pub year_week: Option<String>,
    pub week_type: WeekType,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub synced: bool,
}

impl WorkoutSession {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkoutSet {
    pub id: String,
    pub session_id: String,
    pub exercise_id: String,
    pub set_type: SetType,
    pub set_number: i64,
    pub reps: i64,
    pub weight: f64,
    pub rpe: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: WorkoutSession,
    pub sets: Vec<WorkoutSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExerciseProgress {
    pub id: String,
    pub user_id: String,
    pub exercise_id: String,
    pub year_week: String,
    pub max_weight: f64,
    pub warmup_weight_range: Option<String>,
    pub warmup_sets_done: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Everything the client needs to render the workout that is due next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodayWorkout {
    pub program: Program,
    pub current_routine: Routine,
    pub template_name: String,
    pub template_exercises: Vec<TemplateExercise>,
    pub week_type: WeekType,
    pub week_number: i64,
    pub is_deload: bool,
    pub next_routine_name: String,
}
