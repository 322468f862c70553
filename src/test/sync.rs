#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rocket::tokio;

    use crate::db::{
        NewSession, SessionUpdate, SyncBatch, SyncSession, SyncSet, activate_program,
        create_session, finish_session, get_exercise_progress, get_program, get_progress,
        get_session_detail, sync_batch,
    };
    use crate::error::AppError;
    use crate::models::{SetType, WeekType};
    use crate::test::utils::{TestDb, create_standard_test_db};

    const LIFTER: &str = "lifter@example.com";
    const OTHER: &str = "other@example.com";
    const WEEK: &str = "2025-27";

    fn offline_session(id: &str) -> SyncSession {
        SyncSession {
            id: id.to_string(),
            template_id: None,
            program_id: None,
            year_week: Some(WEEK.to_string()),
            week_type: WeekType::Normal,
            started_at: Utc::now() - Duration::hours(1),
            finished_at: Some(Utc::now()),
            notes: None,
        }
    }

    fn offline_set(id: &str, session_id: &str, exercise_id: &str, weight: f64) -> SyncSet {
        SyncSet {
            id: id.to_string(),
            session_id: session_id.to_string(),
            exercise_id: exercise_id.to_string(),
            set_type: SetType::Working,
            set_number: 1,
            reps: 5,
            weight,
            rpe: None,
            notes: None,
            created_at: None,
        }
    }

    async fn set_count(test_db: &TestDb) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM workout_sets")
            .fetch_one(&test_db.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sync_inserts_sessions_then_sets() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(LIFTER);
        let bench = test_db.exercise_id("Bench Press");

        let mut warmup = offline_set("set-0", "offline-1", &bench, 40.0);
        warmup.set_type = SetType::Warmup;

        let batch = SyncBatch {
            sets: vec![warmup, offline_set("set-1", "offline-1", &bench, 100.0)],
            sessions: vec![offline_session("offline-1")],
        };

        let report = sync_batch(&test_db.pool, &user_id, &batch).await.unwrap();
        assert_eq!(report.synced_sessions, vec!["offline-1"]);
        assert_eq!(report.synced_sets, vec!["set-0", "set-1"]);
        assert!(report.errors.is_empty(), "{:?}", report.errors);

        let detail = get_session_detail(&test_db.pool, "offline-1", &user_id)
            .await
            .unwrap();
        assert!(detail.session.synced);
        assert_eq!(detail.session.user_id, user_id);
        assert_eq!(detail.sets.len(), 2);

        let row = get_progress(&test_db.pool, &user_id, &bench, WEEK)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.max_weight, 100.0);
    }

    #[tokio::test]
    async fn test_sync_reports_foreign_sessions_and_overwrites_own() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(LIFTER);

        let foreign = create_session(
            &test_db.pool,
            &test_db.user_id(OTHER),
            &NewSession {
                id: Some("shared-id".to_string()),
                template_id: None,
                program_id: None,
                year_week: None,
                week_type: WeekType::Normal,
                notes: Some("not yours".to_string()),
            },
        )
        .await
        .unwrap();

        sync_batch(
            &test_db.pool,
            &user_id,
            &SyncBatch {
                sessions: vec![offline_session("mine")],
                sets: vec![],
            },
        )
        .await
        .unwrap();

        let mut edited = offline_session("mine");
        edited.notes = Some("edited on phone".to_string());
        edited.week_type = WeekType::Deload;
        edited.year_week = None;
        edited.finished_at = None;

        let report = sync_batch(
            &test_db.pool,
            &user_id,
            &SyncBatch {
                sessions: vec![offline_session(&foreign.id), edited],
                sets: vec![],
            },
        )
        .await
        .unwrap();

        assert_eq!(report.synced_sessions, vec!["mine"]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Session shared-id: "));

        let mine = get_session_detail(&test_db.pool, "mine", &user_id)
            .await
            .unwrap()
            .session;
        assert_eq!(mine.notes.as_deref(), Some("edited on phone"));
        assert_eq!(mine.week_type, WeekType::Deload);
        assert_eq!(mine.year_week, None);
        assert_eq!(mine.finished_at, None);

        let untouched = get_session_detail(&test_db.pool, "shared-id", &test_db.user_id(OTHER))
            .await
            .unwrap()
            .session;
        assert_eq!(untouched.notes.as_deref(), Some("not yours"));
        assert_eq!(untouched.year_week, None);
    }

    #[tokio::test]
    async fn test_sync_isolates_failing_items() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(LIFTER);
        let bench = test_db.exercise_id("Bench Press");

        let mut bad_week = offline_session("bad-week");
        bad_week.year_week = Some("week 27".to_string());

        let mut foreign_program = offline_session("foreign-program");
        foreign_program.program_id = Some(test_db.program_id("Other Program"));

        let mut bad_rpe = offline_set("bad-rpe", "good", &bench, 60.0);
        bad_rpe.rpe = Some(12.0);

        let batch = SyncBatch {
            sessions: vec![bad_week, foreign_program, offline_session("good")],
            sets: vec![
                offline_set("orphan", "never-synced", &bench, 60.0),
                offline_set("unknown-exercise", "good", "no-such-exercise", 60.0),
                bad_rpe,
                offline_set("fine", "good", &bench, 60.0),
            ],
        };

        let report = sync_batch(&test_db.pool, &user_id, &batch).await.unwrap();
        assert_eq!(report.synced_sessions, vec!["good"]);
        assert_eq!(report.synced_sets, vec!["fine"]);
        assert_eq!(report.errors.len(), 5, "{:?}", report.errors);

        for prefix in [
            "Session bad-week: ",
            "Session foreign-program: ",
            "Set orphan: ",
            "Set unknown-exercise: ",
            "Set bad-rpe: ",
        ] {
            assert!(
                report.errors.iter().any(|e| e.starts_with(prefix)),
                "missing error for {}: {:?}",
                prefix,
                report.errors
            );
        }

        assert!(matches!(
            get_session_detail(&test_db.pool, "foreign-program", &user_id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(set_count(&test_db).await, 1);
    }

    #[tokio::test]
    async fn test_sync_replay_is_idempotent() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(LIFTER);
        let squat = test_db.exercise_id("Squat");

        let batch = SyncBatch {
            sessions: vec![offline_session("replayed")],
            sets: vec![
                offline_set("squat-1", "replayed", &squat, 140.0),
                offline_set("squat-2", "replayed", &squat, 150.0),
            ],
        };

        let first = sync_batch(&test_db.pool, &user_id, &batch).await.unwrap();
        let second = sync_batch(&test_db.pool, &user_id, &batch).await.unwrap();
        assert_eq!(first, second);
        assert!(second.errors.is_empty());

        assert_eq!(set_count(&test_db).await, 2);
        let history = get_exercise_progress(&test_db.pool, &user_id, &squat)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].max_weight, 150.0);
    }

    #[tokio::test]
    async fn test_sync_set_overwrite_is_last_write_wins_but_progress_is_monotonic() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(LIFTER);
        let bench = test_db.exercise_id("Bench Press");

        sync_batch(
            &test_db.pool,
            &user_id,
            &SyncBatch {
                sessions: vec![offline_session("s1"), offline_session("s2")],
                sets: vec![offline_set("edited", "s1", &bench, 90.0)],
            },
        )
        .await
        .unwrap();

        // A later edit lowers the weight and names another session; the set
        // stays where it was first stored.
        let report = sync_batch(
            &test_db.pool,
            &user_id,
            &SyncBatch {
                sessions: vec![],
                sets: vec![offline_set("edited", "s2", &bench, 75.0)],
            },
        )
        .await
        .unwrap();
        assert_eq!(report.synced_sets, vec!["edited"]);

        let s1 = get_session_detail(&test_db.pool, "s1", &user_id)
            .await
            .unwrap();
        assert_eq!(s1.sets.len(), 1);
        assert_eq!(s1.sets[0].weight, 75.0);

        let row = get_progress(&test_db.pool, &user_id, &bench, WEEK)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.max_weight, 90.0);
    }

    #[tokio::test]
    async fn test_sync_never_advances_rotation() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(LIFTER);
        let program_id = test_db.program_id("Upper/Lower");

        activate_program(&test_db.pool, &program_id, &user_id)
            .await
            .unwrap();

        let mut finished = offline_session("program-session");
        finished.program_id = Some(program_id.clone());
        finished.template_id = Some(test_db.template_id("Upper"));

        let report = sync_batch(
            &test_db.pool,
            &user_id,
            &SyncBatch {
                sessions: vec![finished],
                sets: vec![],
            },
        )
        .await
        .unwrap();
        assert_eq!(report.synced_sessions, vec!["program-session"]);

        let program = get_program(&test_db.pool, &program_id, &user_id)
            .await
            .unwrap();
        assert_eq!(program.current_routine_index, 0);
        assert_eq!(program.weeks_completed, 0);
        assert!(program.last_workout_at.is_none());
    }

    #[tokio::test]
    async fn test_reopened_session_does_not_advance_rotation_twice() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(LIFTER);
        let program_id = test_db.program_id("Upper/Lower");

        activate_program(&test_db.pool, &program_id, &user_id)
            .await
            .unwrap();

        let session = create_session(
            &test_db.pool,
            &user_id,
            &NewSession {
                id: None,
                template_id: None,
                program_id: Some(program_id.clone()),
                year_week: Some(WEEK.to_string()),
                week_type: WeekType::Normal,
                notes: None,
            },
        )
        .await
        .unwrap();

        let finish = SessionUpdate {
            finished_at: Some(Utc::now()),
            notes: None,
        };
        finish_session(&test_db.pool, &session.id, &user_id, &finish)
            .await
            .unwrap();

        // A stale offline copy clears finished_at again.
        let mut stale = offline_session(&session.id);
        stale.program_id = Some(program_id.clone());
        stale.finished_at = None;
        let report = sync_batch(
            &test_db.pool,
            &user_id,
            &SyncBatch {
                sessions: vec![stale],
                sets: vec![],
            },
        )
        .await
        .unwrap();
        assert_eq!(report.synced_sessions, vec![session.id.clone()]);

        let reopened = get_session_detail(&test_db.pool, &session.id, &user_id)
            .await
            .unwrap()
            .session;
        assert!(!reopened.is_finished());

        let refinished = finish_session(&test_db.pool, &session.id, &user_id, &finish)
            .await
            .unwrap();
        assert!(refinished.is_finished());

        let program = get_program(&test_db.pool, &program_id, &user_id)
            .await
            .unwrap();
        assert_eq!(program.current_routine_index, 1);
        assert_eq!(program.weeks_completed, 0);
    }

    #[tokio::test]
    async fn test_live_finish_after_synced_finish_does_not_advance() {
        let test_db = create_standard_test_db().await;
        let user_id = test_db.user_id(LIFTER);
        let program_id = test_db.program_id("Upper/Lower");

        activate_program(&test_db.pool, &program_id, &user_id)
            .await
            .unwrap();

        let mut finished = offline_session("finished-offline");
        finished.program_id = Some(program_id.clone());
        sync_batch(
            &test_db.pool,
            &user_id,
            &SyncBatch {
                sessions: vec![finished],
                sets: vec![],
            },
        )
        .await
        .unwrap();

        finish_session(
            &test_db.pool,
            "finished-offline",
            &user_id,
            &SessionUpdate {
                finished_at: Some(Utc::now()),
                notes: Some("edited".to_string()),
            },
        )
        .await
        .unwrap();

        let program = get_program(&test_db.pool, &program_id, &user_id)
            .await
            .unwrap();
        assert_eq!(program.current_routine_index, 0);
        assert_eq!(program.weeks_completed, 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let test_db = create_standard_test_db().await;
        let report = sync_batch(&test_db.pool, &test_db.user_id(LIFTER), &SyncBatch::default())
            .await
            .unwrap();
        assert!(report.synced_sessions.is_empty());
        assert!(report.synced_sets.is_empty());
        assert!(report.errors.is_empty());
    }
}
