//! Storage-backed fatigue monitoring.
//!
//! Wraps [`FatigueDetector`]. The first detection in a session, and any
//! later one of higher severity, writes a fatigue event and raises an alert
//! in one transaction. Only the first folds its onset into the patient's
//! personalization row; repeats of an episode already reported are not
//! written.

use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use super::detector::FatigueDetector;
use super::session::{FatigueSession, SessionSummary};
use super::types::{FatigueDetection, FatigueError, FatigueEvent, FatigueSeverity, MetricSample};
use crate::alerts::{Alert, AlertPriority, AlertType};
use crate::storage::{immediate_transaction, AlertStore, FatigueStore, PersonalizationStore};

/// Result of processing one live sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorResult {
    pub detection: FatigueDetection,
    /// Id of the persisted event, when one was written. A detection that
    /// repeats an already reported severity writes nothing.
    pub event_id: Option<Uuid>,
    /// A detection happened but could not be written
    pub persist_failed: bool,
}

/// Fatigue monitor with persistence.
pub struct FatigueMonitor<'a> {
    conn: &'a Connection,
    detector: FatigueDetector,
}

impl<'a> FatigueMonitor<'a> {
    pub fn new(conn: &'a Connection, detector: FatigueDetector) -> Self {
        Self { conn, detector }
    }

    pub fn detector(&self) -> &FatigueDetector {
        &self.detector
    }

    /// Open a session with thresholds personalized from the stored profile.
    ///
    /// A failed profile read falls back to default thresholds.
    pub fn open_session(&self, session_id: Uuid, patient_id: Uuid) -> FatigueSession {
        let profile = match PersonalizationStore::new(self.conn).get(patient_id) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(
                    patient_id = %patient_id,
                    error = %e,
                    "Could not load personalization, using default thresholds"
                );
                None
            }
        };
        self.detector
            .open_session(session_id, patient_id, profile.as_ref())
    }

    /// Ingest a sample and persist any detection.
    pub fn process_sample(&self, session: &mut FatigueSession, sample: MetricSample) -> MonitorResult {
        let detection = self.detector.ingest(session, sample);

        let Some(event) =
            FatigueEvent::from_detection(session.patient_id(), session.session_id(), &detection)
        else {
            return MonitorResult {
                detection,
                event_id: None,
                persist_failed: false,
            };
        };

        if !session.is_escalation(event.severity) {
            return MonitorResult {
                detection,
                event_id: None,
                persist_failed: false,
            };
        }

        let onset = session.reported_severity().is_none();
        match self.persist(&event, &detection, onset) {
            Ok(()) => {
                session.mark_reported(event.severity);
                MonitorResult {
                    detection,
                    event_id: Some(event.id),
                    persist_failed: false,
                }
            }
            Err(e) => {
                tracing::error!(
                    session_id = %event.session_id,
                    patient_id = %event.patient_id,
                    severity = %event.severity,
                    error = %e,
                    "Failed to persist fatigue event"
                );
                MonitorResult {
                    detection,
                    event_id: None,
                    persist_failed: true,
                }
            }
        }
    }

    /// Close the session and release its buffer.
    pub fn close_session(&self, session: FatigueSession) -> SessionSummary {
        self.detector.close_session(session)
    }

    fn persist(
        &self,
        event: &FatigueEvent,
        detection: &FatigueDetection,
        onset: bool,
    ) -> Result<(), FatigueError> {
        let tx = immediate_transaction(self.conn)
            .map_err(|e| FatigueError::DatabaseError(e.to_string()))?;

        FatigueStore::new(&tx)
            .insert_event(event)
            .map_err(|e| FatigueError::DatabaseError(e.to_string()))?;

        if onset {
            let profiles = PersonalizationStore::new(&tx);
            let mut profile = profiles
                .get_or_create(event.patient_id)
                .map_err(|e| FatigueError::DatabaseError(e.to_string()))?;
            profile.record_fatigue(
                event.elapsed_minutes,
                event.trigger_metrics.power_decline,
                event.detected_at,
            );
            profiles
                .save(&profile)
                .map_err(|e| FatigueError::DatabaseError(e.to_string()))?;
        }

        AlertStore::new(&tx)
            .insert(&fatigue_alert(event, detection))
            .map_err(|e| FatigueError::DatabaseError(e.to_string()))?;

        tx.commit()?;
        Ok(())
    }
}

fn fatigue_alert(event: &FatigueEvent, detection: &FatigueDetection) -> Alert {
    let priority = match event.severity {
        FatigueSeverity::Severe => AlertPriority::High,
        FatigueSeverity::Moderate => AlertPriority::Medium,
        FatigueSeverity::Mild => AlertPriority::Low,
    };

    let alert = Alert::new(event.patient_id, AlertType::Fatigue, priority, &detection.message)
        .with_metadata(json!({
            "session_id": event.session_id,
            "fatigue_event_id": event.id,
            "fatigue_type": event.fatigue_type,
            "severity": event.severity,
            "action": event.action_taken,
            "resistance_reduction": event.resistance_reduction,
            "elapsed_minutes": event.elapsed_minutes,
            "markers": event.trigger_metrics,
        }))
        .at(event.detected_at);

    if event.severity == FatigueSeverity::Severe {
        alert.with_action_required()
    } else {
        alert
    }
}
