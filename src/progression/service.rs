//! Completed-session processing with persistence.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;

use super::engine::ProgressionEngine;
use super::types::{
    ExerciseSession, ProgressionDecision, ProgressionError, ProgressionOutcome,
    ProgressionParameter, SetbackCheck, SetbackSeverity,
};
use crate::alerts::{Alert, AlertPriority, AlertType};
use crate::goals::{active_goal, GoalManager, GoalMetric};
use crate::patient::PersonalizationProfile;
use crate::storage::{immediate_transaction, AlertStore, PersonalizationStore, SessionStore};

/// Sessions loaded for evaluation.
const HISTORY_LIMIT: usize = 30;

/// Runs the progression rules once per completed session.
pub struct ProgressionService<'a> {
    conn: &'a Connection,
    engine: ProgressionEngine,
}

impl<'a> ProgressionService<'a> {
    pub fn new(conn: &'a Connection, engine: ProgressionEngine) -> Self {
        Self { conn, engine }
    }

    pub fn engine(&self) -> &ProgressionEngine {
        &self.engine
    }

    /// Record a completed session and apply setback, recovery or progression.
    ///
    /// Reads and writes happen in one IMMEDIATE transaction, so a second
    /// session completing for the same patient waits rather than
    /// interleaving. Any failure rolls back, is logged, and yields
    /// [`ProgressionOutcome::NoAction`].
    pub fn process_completed_session(&self, session: &ExerciseSession) -> ProgressionOutcome {
        match self.try_process(session) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    patient_id = %session.patient_id,
                    session_id = %session.id,
                    error = %e,
                    "Progression evaluation failed"
                );
                ProgressionOutcome::NoAction
            }
        }
    }

    fn try_process(&self, session: &ExerciseSession) -> Result<ProgressionOutcome, ProgressionError> {
        if !session.is_valid() {
            return Err(ProgressionError::InvalidSession(session.id));
        }

        let tx = immediate_transaction(self.conn)?;
        let patient_id = session.patient_id;
        let now = session.started_at;

        let sessions = SessionStore::new(&tx);
        let profiles = PersonalizationStore::new(&tx);
        let goal_manager = GoalManager::new(&tx);
        let alerts = AlertStore::new(&tx);

        sessions.insert(session)?;
        let history = sessions.recent_for_patient(patient_id, HISTORY_LIMIT)?;
        let mut profile = profiles.get_or_create(patient_id)?;
        let goals = goal_manager.get_active(patient_id)?;

        for (metric, observed) in [
            (GoalMetric::Duration, session.duration_min),
            (GoalMetric::Power, session.avg_power),
            (GoalMetric::Resistance, session.resistance),
        ] {
            if let Some(goal) = active_goal(&goals, metric) {
                goal_manager.update_progress(goal.id, observed)?;
            }
        }

        profile.record_session(self.engine.session_successful(session, &goals), now);

        let outcome = if profile.in_setback_recovery {
            let check = self
                .engine
                .check_recovery_completion(&profile, &history, &goals, now);

            if check.complete {
                profile.complete_recovery(now);
                let restored = goal_manager.restore_after_recovery(patient_id)?;
                alerts.insert(
                    &Alert::new(
                        patient_id,
                        AlertType::RecoveryComplete,
                        AlertPriority::Medium,
                        format!(
                            "Setback recovery complete after {} days; {} goal target(s) restored",
                            check.days_in_recovery, restored
                        ),
                    )
                    .with_metadata(json!({
                        "days_in_recovery": check.days_in_recovery,
                        "sessions_since_setback": check.sessions_since_setback,
                        "avg_power": check.avg_power,
                        "required_power": check.required_power,
                    }))
                    .at(now),
                )?;
                tracing::info!(patient_id = %patient_id, "Setback recovery complete");
                ProgressionOutcome::RecoveryCompleted(check)
            } else {
                ProgressionOutcome::RecoveryContinuing(check)
            }
        } else {
            let setback = self.engine.check_setback(&history, now);
            if setback.detected {
                self.enter_setback(&setback, &mut profile, &goal_manager, &alerts, now)?;
                ProgressionOutcome::SetbackEntered(setback)
            } else {
                let in_window = self.engine.sessions_in_window(&history, now).len();
                if in_window < self.engine.settings().required_sessions {
                    ProgressionOutcome::InsufficientData {
                        sessions_in_window: in_window,
                    }
                } else if let Some(plateau) =
                    self.engine.detect_plateau(&history).filter(|p| p.detected)
                {
                    alerts.insert(
                        &Alert::new(
                            patient_id,
                            AlertType::Plateau,
                            AlertPriority::Medium,
                            "Power and duration have plateaued; consider reviewing the prescription",
                        )
                        .with_metadata(json!({
                            "power_trend": plateau.power_trend,
                            "duration_trend": plateau.duration_trend,
                        }))
                        .at(now),
                    )?;
                    ProgressionOutcome::Plateau(plateau)
                } else {
                    let decision = self.engine.evaluate_progression(
                        &history,
                        &goals,
                        profile.last_progression_date,
                        now,
                    );
                    if decision.should_progress {
                        self.apply_progression(&decision, &mut profile, &goal_manager, &alerts, now)?;
                        ProgressionOutcome::Progressed(decision)
                    } else {
                        ProgressionOutcome::Maintained(decision)
                    }
                }
            }
        };

        profiles.save(&profile)?;
        tx.commit()?;

        Ok(outcome)
    }

    fn enter_setback(
        &self,
        setback: &SetbackCheck,
        profile: &mut PersonalizationProfile,
        goal_manager: &GoalManager<'_>,
        alerts: &AlertStore<'_>,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressionError> {
        let severity = setback.severity.unwrap_or(SetbackSeverity::Moderate);
        let reduction = self.engine.settings().setback_goal_reduction * severity.multiplier();

        profile.enter_setback(now);
        let reduced = goal_manager.reduce_for_setback(profile.patient_id, reduction)?;

        let major = severity == SetbackSeverity::Major;
        let priority = if major {
            AlertPriority::High
        } else {
            AlertPriority::Medium
        };

        let mut alert = Alert::new(
            profile.patient_id,
            AlertType::Setback,
            priority,
            format!(
                "{} setback: {}. Goals reduced by {:.1}%",
                severity,
                setback.message,
                reduction * 100.0
            ),
        )
        .with_metadata(json!({
            "setback_type": setback.setback_type,
            "severity": severity,
            "metric": setback.metric,
            "goal_reduction": reduction,
            "goals_reduced": reduced.len(),
            "progression_level": profile.current_progression_level,
            "clinician_consult": major,
        }))
        .at(now);
        if major {
            alert = alert.with_action_required();
        }
        alerts.insert(&alert)?;

        tracing::info!(
            patient_id = %profile.patient_id,
            setback_type = ?setback.setback_type,
            severity = %severity,
            "Entered setback recovery"
        );
        Ok(())
    }

    fn apply_progression(
        &self,
        decision: &ProgressionDecision,
        profile: &mut PersonalizationProfile,
        goal_manager: &GoalManager<'_>,
        alerts: &AlertStore<'_>,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressionError> {
        let metric = match decision.parameter {
            ProgressionParameter::Resistance => Some(GoalMetric::Resistance),
            ProgressionParameter::Duration => Some(GoalMetric::Duration),
            ProgressionParameter::Maintain => None,
        };

        if let (Some(metric), Some(proposed)) = (metric, decision.proposed_value) {
            let goals = goal_manager.get_active(profile.patient_id)?;
            match active_goal(&goals, metric) {
                Some(goal) => goal_manager.update_target(goal.id, proposed)?,
                None => tracing::debug!(
                    patient_id = %profile.patient_id,
                    metric = %metric,
                    "No active goal to update for progression"
                ),
            }
        }

        profile.apply_progression(now);

        alerts.insert(
            &Alert::new(
                profile.patient_id,
                AlertType::Progression,
                AlertPriority::Low,
                decision.reason.clone(),
            )
            .with_metadata(json!({
                "parameter": decision.parameter,
                "current_value": decision.current_value,
                "proposed_value": decision.proposed_value,
                "confidence": decision.confidence,
                "progression_level": profile.current_progression_level,
            }))
            .at(now),
        )?;

        tracing::info!(
            patient_id = %profile.patient_id,
            parameter = %decision.parameter,
            level = profile.current_progression_level,
            "Progression applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::TherapyGoal;
    use crate::storage::Database;
    use chrono::Duration;
    use uuid::Uuid;

    fn seed_goals(db: &Database, patient_id: Uuid) {
        let manager = GoalManager::new(db.connection());
        manager
            .create(&TherapyGoal::new(patient_id, GoalMetric::Duration, 15.0))
            .unwrap();
        manager
            .create(&TherapyGoal::new(patient_id, GoalMetric::Power, 30.0))
            .unwrap();
        manager
            .create(&TherapyGoal::new(patient_id, GoalMetric::Resistance, 3.0))
            .unwrap();
    }

    #[test]
    fn test_insufficient_data_then_progression() {
        let db = Database::open_in_memory().unwrap();
        let service = ProgressionService::new(db.connection(), ProgressionEngine::default());
        let patient_id = Uuid::new_v4();
        seed_goals(&db, patient_id);
        let start = Utc::now() - Duration::days(2);

        let mut outcomes = Vec::new();
        for i in 0..3 {
            let session = ExerciseSession::new(
                patient_id,
                start + Duration::hours(12 * i),
                15.0,
                31.0,
                45.0,
                3.0,
            );
            outcomes.push(service.process_completed_session(&session));
        }

        assert!(matches!(
            outcomes[0],
            ProgressionOutcome::InsufficientData { sessions_in_window: 1 }
        ));
        assert!(matches!(&outcomes[2], ProgressionOutcome::Progressed(d)
            if d.parameter == ProgressionParameter::Resistance));

        let goals = GoalManager::new(db.connection()).get_active(patient_id).unwrap();
        assert_eq!(active_goal(&goals, GoalMetric::Resistance).unwrap().target_value, 3.5);

        let profile = PersonalizationStore::new(db.connection())
            .get(patient_id)
            .unwrap()
            .unwrap();
        assert_eq!(profile.current_progression_level, 2);
        assert_eq!(profile.consecutive_successful_sessions, 0);

        let alerts = AlertStore::new(db.connection()).for_patient(patient_id).unwrap();
        assert!(alerts
            .iter()
            .any(|a| a.alert_type == AlertType::Progression && a.priority == AlertPriority::Low));
    }

    #[test]
    fn test_progression_needs_fresh_sessions() {
        let db = Database::open_in_memory().unwrap();
        let service = ProgressionService::new(db.connection(), ProgressionEngine::default());
        let patient_id = Uuid::new_v4();
        seed_goals(&db, patient_id);
        let start = Utc::now() - Duration::days(2);

        let progressed: Vec<bool> = (0..5)
            .map(|i| {
                let session = ExerciseSession::new(
                    patient_id,
                    start + Duration::hours(6 * i),
                    15.0,
                    31.0,
                    45.0,
                    3.0,
                );
                matches!(
                    service.process_completed_session(&session),
                    ProgressionOutcome::Progressed(_)
                )
            })
            .collect();
        assert_eq!(progressed, vec![false, false, true, false, false]);

        let profile = PersonalizationStore::new(db.connection())
            .get(patient_id)
            .unwrap()
            .unwrap();
        assert_eq!(profile.current_progression_level, 2);
        assert_eq!(profile.consecutive_successful_sessions, 2);

        let goals = GoalManager::new(db.connection()).get_active(patient_id).unwrap();
        assert_eq!(active_goal(&goals, GoalMetric::Resistance).unwrap().target_value, 3.5);
    }

    #[test]
    fn test_adherence_gap_enters_setback() {
        let db = Database::open_in_memory().unwrap();
        let service = ProgressionService::new(db.connection(), ProgressionEngine::default());
        let patient_id = Uuid::new_v4();
        seed_goals(&db, patient_id);
        let now = Utc::now();

        let old = ExerciseSession::new(patient_id, now - Duration::days(8), 15.0, 30.0, 45.0, 3.0);
        service.process_completed_session(&old);

        let today = ExerciseSession::new(patient_id, now, 12.0, 28.0, 45.0, 3.0);
        let outcome = service.process_completed_session(&today);

        let ProgressionOutcome::SetbackEntered(check) = outcome else {
            panic!("expected setback, got {:?}", outcome);
        };
        assert_eq!(check.severity, Some(SetbackSeverity::Major));

        let goals = GoalManager::new(db.connection()).get_active(patient_id).unwrap();
        let power = active_goal(&goals, GoalMetric::Power).unwrap();
        // 25 % × 1.5
        assert!((power.target_value - 30.0 * 0.625).abs() < 1e-9);
        assert_eq!(power.pre_setback_target, Some(30.0));

        let alerts = AlertStore::new(db.connection()).for_patient(patient_id).unwrap();
        let setback = alerts
            .iter()
            .find(|a| a.alert_type == AlertType::Setback)
            .unwrap();
        assert_eq!(setback.priority, AlertPriority::High);
        assert!(setback.action_required);
        assert_eq!(setback.metadata["clinician_consult"], true);
    }

    #[test]
    fn test_invalid_session_is_no_action_and_not_stored() {
        let db = Database::open_in_memory().unwrap();
        let service = ProgressionService::new(db.connection(), ProgressionEngine::default());
        let patient_id = Uuid::new_v4();

        let session = ExerciseSession::new(patient_id, Utc::now(), f64::NAN, 30.0, 45.0, 3.0);
        assert_eq!(service.process_completed_session(&session), ProgressionOutcome::NoAction);

        let stored = SessionStore::new(db.connection())
            .recent_for_patient(patient_id, 10)
            .unwrap();
        assert!(stored.is_empty());
    }

    #[test]
    fn test_duplicate_session_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let service = ProgressionService::new(db.connection(), ProgressionEngine::default());
        let patient_id = Uuid::new_v4();

        let session = ExerciseSession::new(patient_id, Utc::now(), 15.0, 30.0, 45.0, 3.0);
        service.process_completed_session(&session);
        assert_eq!(service.process_completed_session(&session), ProgressionOutcome::NoAction);
    }
}
