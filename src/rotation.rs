//! Program rotation: which routine is due, whether this rotation-week is a
//! deload, and how the counters move when a program-linked session finishes.
//!
//! A rotation "week" is one full pass through the program's routine list, not
//! a calendar week.

use serde::Serialize;

use crate::error::AppError;
use crate::models::WeekType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RotationState {
    pub current_routine_index: i64,
    pub weeks_completed: i64,
    pub deload_every_n_weeks: i64,
}

/// Rotation slots resolved against a concrete routine count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSlots {
    pub current: usize,
    pub next: usize,
}

impl RotationState {
    /// A fresh or freshly activated program.
    pub fn start(deload_every_n_weeks: i64) -> Self {
        Self {
            current_routine_index: 0,
            weeks_completed: 0,
            deload_every_n_weeks,
        }
    }

    pub fn is_deload(&self) -> bool {
        if self.deload_every_n_weeks < 1 {
            return false;
        }

        self.weeks_completed.rem_euclid(self.deload_every_n_weeks) == self.deload_every_n_weeks - 1
    }

    pub fn week_type(&self) -> WeekType {
        if self.is_deload() {
            WeekType::Deload
        } else {
            WeekType::Normal
        }
    }

    /// 1-based week shown to the user.
    pub fn week_number(&self) -> i64 {
        self.weeks_completed + 1
    }

    pub fn slots(&self, routine_count: usize) -> Result<RotationSlots, AppError> {
        if routine_count == 0 {
            return Err(AppError::InvalidState(
                "Active program has no routines".to_string(),
            ));
        }

        let count = routine_count as i64;
        let current = self.current_routine_index.rem_euclid(count);
        let next = (current + 1).rem_euclid(count);

        Ok(RotationSlots {
            current: current as usize,
            next: next as usize,
        })
    }

    /// State after one program-linked session is finished. Returns `None` when
    /// the program has no routines, in which case nothing moves.
    pub fn advance(&self, routine_count: usize) -> Option<RotationState> {
        if routine_count == 0 {
            return None;
        }

        let mut next = *self;
        next.current_routine_index += 1;

        if next.current_routine_index >= routine_count as i64 {
            next.current_routine_index = 0;
            next.weeks_completed += 1;
        }

        Some(next)
    }

    /// Wraps the routine index back into range after the routine list changed
    /// size.
    pub fn clamp_to(&self, routine_count: usize) -> RotationState {
        let mut clamped = *self;
        clamped.current_routine_index = if routine_count == 0 {
            0
        } else {
            self.current_routine_index.rem_euclid(routine_count as i64)
        };
        clamped
    }
}
