//! Storage-backed protocol matching and assignment.
//!
//! Every operation here surfaces misses and failures as `None`, `false` or
//! an empty list. Expected misses log at `debug`, malformed protocol data
//! and database failures at `error`.

use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use super::matcher::ProtocolMatcher;
use super::state::AssignmentState;
use super::types::{
    ClinicalProtocol, MatchContext, PatientProtocolAssignment, ProtocolCriteria, ProtocolError,
    ProtocolMatch,
};
use crate::alerts::{Alert, AlertPriority, AlertType};
use crate::storage::{immediate_transaction, AlertStore, ProtocolStore, SessionStore};

pub struct ProtocolService<'a> {
    conn: &'a Connection,
    matcher: ProtocolMatcher,
}

impl<'a> ProtocolService<'a> {
    pub fn new(conn: &'a Connection, matcher: ProtocolMatcher) -> Self {
        Self { conn, matcher }
    }

    pub fn matcher(&self) -> &ProtocolMatcher {
        &self.matcher
    }

    /// Ranked matches over every active protocol.
    pub fn find_matches(&self, ctx: &MatchContext<'_>) -> Vec<ProtocolMatch> {
        match self.load_candidates() {
            Ok(candidates) => self.matcher.rank(&candidates, ctx),
            Err(e) => {
                tracing::error!(error = %e, "Failed to load protocols for matching");
                Vec::new()
            }
        }
    }

    /// Assign a protocol, discontinuing any active assignment.
    pub fn assign(
        &self,
        patient_id: Uuid,
        protocol_id: Uuid,
        start_phase: usize,
    ) -> Option<PatientProtocolAssignment> {
        let store = ProtocolStore::new(self.conn);

        let result = store.get_protocol(protocol_id).and_then(|protocol| {
            store
                .assign(patient_id, protocol.id, start_phase, protocol.phases.len())
                .map(|assignment| (protocol, assignment))
        });

        match result {
            Ok((protocol, assignment)) => {
                tracing::info!(
                    patient_id = %patient_id,
                    protocol = %protocol.name,
                    state = %assignment.state,
                    "Protocol assigned"
                );
                self.raise(
                    Alert::new(
                        patient_id,
                        AlertType::ProtocolAssigned,
                        AlertPriority::Low,
                        format!("Assigned to {} at phase {}", protocol.name, start_phase + 1),
                    )
                    .with_metadata(json!({
                        "protocol_id": protocol.id,
                        "assignment_id": assignment.id,
                        "phase": start_phase,
                    })),
                );
                Some(assignment)
            }
            Err(e) => {
                self.log_failure(&e, patient_id, "assign protocol");
                None
            }
        }
    }

    /// Assign the best match if it reaches the auto-assignment score.
    pub fn auto_assign(
        &self,
        patient_id: Uuid,
        ctx: &MatchContext<'_>,
    ) -> Option<(ProtocolMatch, PatientProtocolAssignment)> {
        let threshold = self.matcher.settings().auto_assign_score;
        let Some(best) = self
            .find_matches(ctx)
            .into_iter()
            .find(|m| m.score >= threshold)
        else {
            tracing::debug!(
                patient_id = %patient_id,
                threshold,
                "No protocol reached the auto-assignment score"
            );
            return None;
        };

        let assignment = self.assign(patient_id, best.protocol_id, best.suggested_start_phase)?;
        Some((best, assignment))
    }

    /// Advance the patient's active assignment if the phase is complete.
    ///
    /// Returns `true` when the assignment moved forward, including into
    /// `Completed` after the final phase.
    pub fn check_and_advance(&self, patient_id: Uuid) -> bool {
        match self.try_advance(patient_id) {
            Ok(advanced) => advanced,
            Err(e) => {
                self.log_failure(&e, patient_id, "advance protocol phase");
                false
            }
        }
    }

    /// Discontinue the patient's active assignment.
    pub fn discontinue(&self, patient_id: Uuid) -> bool {
        let store = ProtocolStore::new(self.conn);
        let result = store
            .active_assignment(patient_id)
            .and_then(|found| found.ok_or(ProtocolError::NoActiveAssignment(patient_id)))
            .and_then(|mut assignment| {
                assignment.state = assignment.state.discontinue()?;
                store.update_assignment(&assignment)
            });

        match result {
            Ok(updated) => {
                if updated {
                    tracing::info!(patient_id = %patient_id, "Protocol assignment discontinued");
                }
                updated
            }
            Err(e) => {
                self.log_failure(&e, patient_id, "discontinue protocol");
                false
            }
        }
    }

    pub fn active_assignment(&self, patient_id: Uuid) -> Option<PatientProtocolAssignment> {
        match ProtocolStore::new(self.conn).active_assignment(patient_id) {
            Ok(found) => found,
            Err(e) => {
                self.log_failure(&e, patient_id, "load active assignment");
                None
            }
        }
    }

    fn load_candidates(
        &self,
    ) -> Result<Vec<(ClinicalProtocol, Option<ProtocolCriteria>)>, ProtocolError> {
        let store = ProtocolStore::new(self.conn);
        store
            .list_active()?
            .into_iter()
            .map(|protocol| {
                let criteria = store.criteria_for(protocol.id)?;
                Ok((protocol, criteria))
            })
            .collect()
    }

    fn try_advance(&self, patient_id: Uuid) -> Result<bool, ProtocolError> {
        let tx = immediate_transaction(self.conn)?;
        let store = ProtocolStore::new(&tx);

        let mut assignment = store
            .active_assignment(patient_id)?
            .ok_or(ProtocolError::NoActiveAssignment(patient_id))?;
        let protocol = store.get_protocol(assignment.protocol_id)?;
        let sessions = SessionStore::new(&tx).sessions_since(patient_id, assignment.phase_started_at())?;

        let check = self
            .matcher
            .check_phase_progression(&assignment, &protocol, &sessions);
        if !check.ready {
            tracing::debug!(
                patient_id = %patient_id,
                sessions = check.sessions_counted,
                avg_duration = ?check.avg_duration_min,
                required = check.required_duration_min,
                "Phase not ready to advance"
            );
            return Ok(false);
        }

        let from = assignment.state;
        let now = Utc::now();
        assignment.state = from.advance(protocol.phases.len())?;
        assignment.progression_date = Some(now);
        if !store.update_assignment(&assignment)? {
            return Ok(false);
        }

        let message = match assignment.state {
            AssignmentState::Active { phase } => {
                format!("{} advanced to phase {}", protocol.name, phase + 1)
            }
            _ => format!("{} completed", protocol.name),
        };
        AlertStore::new(&tx).insert(
            &Alert::new(
                patient_id,
                AlertType::ProtocolAdvanced,
                AlertPriority::Medium,
                message,
            )
            .with_metadata(json!({
                "protocol_id": protocol.id,
                "assignment_id": assignment.id,
                "from": from.to_string(),
                "to": assignment.state.to_string(),
                "avg_duration_min": check.avg_duration_min,
                "sessions_counted": check.sessions_counted,
            }))
            .at(now),
        )?;

        tx.commit()?;

        tracing::info!(
            patient_id = %patient_id,
            from = %from,
            to = %assignment.state,
            "Protocol phase advanced"
        );
        Ok(true)
    }

    fn raise(&self, alert: Alert) {
        if let Err(e) = AlertStore::new(self.conn).insert(&alert) {
            tracing::error!(
                patient_id = %alert.patient_id,
                alert_type = %alert.alert_type,
                error = %e,
                "Failed to write alert"
            );
        }
    }

    fn log_failure(&self, error: &ProtocolError, patient_id: Uuid, action: &str) {
        if error.is_not_found() {
            tracing::debug!(patient_id = %patient_id, error = %error, "Could not {}", action);
        } else {
            tracing::error!(patient_id = %patient_id, error = %error, "Failed to {}", action);
        }
    }
}
