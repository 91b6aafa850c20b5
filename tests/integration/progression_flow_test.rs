//! Integration tests for progression, setback and recovery over a course of sessions.

use chrono::{DateTime, Duration, Utc};
use mobility_cds::alerts::{AlertPriority, AlertType};
use mobility_cds::goals::{active_goal, GoalManager, GoalMetric, TherapyGoal};
use mobility_cds::progression::{
    ExerciseSession, ProgressionEngine, ProgressionOutcome, ProgressionParameter,
    ProgressionService, SetbackSeverity, SetbackType,
};
use mobility_cds::storage::{AlertStore, Database, PersonalizationStore};
use tempfile::TempDir;
use uuid::Uuid;

fn session(patient_id: Uuid, at: DateTime<Utc>, power: f64) -> ExerciseSession {
    ExerciseSession::new(patient_id, at, 15.0, power, 45.0, 3.0)
}

/// Test the full progress, setback and recovery course.
#[test]
fn test_progress_setback_and_recover() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("cds.db")).unwrap();
    let patient_id = Uuid::new_v4();

    let goals = GoalManager::new(db.connection());
    goals
        .create(&TherapyGoal::new(patient_id, GoalMetric::Duration, 15.0))
        .unwrap();
    goals
        .create(&TherapyGoal::new(patient_id, GoalMetric::Power, 30.0))
        .unwrap();
    goals
        .create(&TherapyGoal::new(patient_id, GoalMetric::Resistance, 3.0))
        .unwrap();

    let service = ProgressionService::new(db.connection(), ProgressionEngine::default());
    let base = Utc::now() - Duration::days(30);

    // Three successful sessions in a day
    let mut last = ProgressionOutcome::NoAction;
    for hours in [0, 12, 24] {
        last = service.process_completed_session(&session(
            patient_id,
            base + Duration::hours(hours),
            31.0,
        ));
    }
    let ProgressionOutcome::Progressed(decision) = last else {
        panic!("expected progression, got {:?}", last);
    };
    assert_eq!(decision.parameter, ProgressionParameter::Resistance);
    assert_eq!(decision.proposed_value, Some(3.5));

    let profiles = PersonalizationStore::new(db.connection());
    assert_eq!(profiles.get(patient_id).unwrap().unwrap().current_progression_level, 2);

    // Nine days without a session
    let setback_at = base + Duration::days(10);
    let outcome = service.process_completed_session(&session(patient_id, setback_at, 27.0));
    let ProgressionOutcome::SetbackEntered(check) = outcome else {
        panic!("expected setback, got {:?}", outcome);
    };
    assert_eq!(check.setback_type, Some(SetbackType::AdherenceDrop));
    assert_eq!(check.severity, Some(SetbackSeverity::Major));

    let profile = profiles.get(patient_id).unwrap().unwrap();
    assert!(profile.in_setback_recovery);
    assert_eq!(profile.current_progression_level, 1);

    let reduced = goals.get_active(patient_id).unwrap();
    let power = active_goal(&reduced, GoalMetric::Power).unwrap();
    assert!((power.target_value - 18.75).abs() < 1e-9);

    // Recovery needs three days
    for day in [1, 2] {
        let outcome = service.process_completed_session(&session(
            patient_id,
            setback_at + Duration::days(day),
            27.0,
        ));
        assert!(
            matches!(outcome, ProgressionOutcome::RecoveryContinuing(ref c) if !c.complete),
            "day {}: {:?}",
            day,
            outcome
        );
    }

    let outcome = service.process_completed_session(&session(
        patient_id,
        setback_at + Duration::days(3),
        27.0,
    ));
    let ProgressionOutcome::RecoveryCompleted(check) = outcome else {
        panic!("expected recovery, got {:?}", outcome);
    };
    assert_eq!(check.days_in_recovery, 3);
    assert_eq!(check.required_power, Some(30.0 * 0.85));

    // Targets restored, level kept
    let restored = goals.get_active(patient_id).unwrap();
    assert_eq!(active_goal(&restored, GoalMetric::Power).unwrap().target_value, 30.0);
    assert_eq!(
        active_goal(&restored, GoalMetric::Resistance).unwrap().target_value,
        3.5
    );
    let profile = profiles.get(patient_id).unwrap().unwrap();
    assert!(!profile.in_setback_recovery);
    assert_eq!(profile.current_progression_level, 1);

    let alerts = AlertStore::new(db.connection()).for_patient(patient_id).unwrap();
    let kinds: Vec<(AlertType, AlertPriority)> =
        alerts.iter().map(|a| (a.alert_type, a.priority)).collect();
    assert!(kinds.contains(&(AlertType::Progression, AlertPriority::Low)));
    assert!(kinds.contains(&(AlertType::Setback, AlertPriority::High)));
    assert!(kinds.contains(&(AlertType::RecoveryComplete, AlertPriority::Medium)));
}

/// Test flat sessions raise a plateau instead of progressing.
#[test]
fn test_plateau_blocks_progression() {
    let db = Database::open_in_memory().unwrap();
    let patient_id = Uuid::new_v4();
    GoalManager::new(db.connection())
        .create(&TherapyGoal::new(patient_id, GoalMetric::Duration, 20.0))
        .unwrap();

    let service = ProgressionService::new(db.connection(), ProgressionEngine::default());
    let base = Utc::now() - Duration::days(3);

    let mut last = ProgressionOutcome::NoAction;
    for i in 0..6 {
        // 15 of 20 minutes: never successful, never progressing
        last = service.process_completed_session(&session(
            patient_id,
            base + Duration::hours(8 * i),
            30.0,
        ));
    }

    let ProgressionOutcome::Plateau(check) = last else {
        panic!("expected plateau, got {:?}", last);
    };
    assert!(check.power_trend.abs() < 0.05);

    let alerts = AlertStore::new(db.connection()).for_patient(patient_id).unwrap();
    assert_eq!(alerts[0].alert_type, AlertType::Plateau);
    assert_eq!(alerts[0].priority, AlertPriority::Medium);
}
