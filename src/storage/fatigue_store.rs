//! Fatigue event storage (append-only).

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::fatigue::{FatigueAction, FatigueEvent, FatigueSeverity, FatigueType};
use crate::storage::database::{column_json, column_timestamp, column_uuid, DatabaseError};

const EVENT_COLUMNS: &str = "id, patient_id, session_id, detected_at, fatigue_type, severity,
    trigger_metrics_json, action_taken, resistance_reduction, elapsed_minutes";

/// Store for persisted fatigue detections.
pub struct FatigueStore<'a> {
    conn: &'a Connection,
}

impl<'a> FatigueStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert_event(&self, event: &FatigueEvent) -> Result<(), DatabaseError> {
        let metrics = serde_json::to_string(&event.trigger_metrics)?;

        self.conn.execute(
            &format!(
                "INSERT INTO fatigue_events ({EVENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                event.id.to_string(),
                event.patient_id.to_string(),
                event.session_id.to_string(),
                event.detected_at.to_rfc3339(),
                event.fatigue_type.as_str(),
                event.severity.as_str(),
                metrics,
                event.action_taken.as_str(),
                event.resistance_reduction,
                event.elapsed_minutes,
            ],
        )?;

        Ok(())
    }

    /// Events for one session, in detection order.
    pub fn events_for_session(&self, session_id: Uuid) -> Result<Vec<FatigueEvent>, DatabaseError> {
        self.query(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM fatigue_events
                 WHERE session_id = ?1 ORDER BY detected_at ASC"
            ),
            session_id,
        )
    }

    /// Events for a patient across sessions, most recent first.
    pub fn events_for_patient(&self, patient_id: Uuid) -> Result<Vec<FatigueEvent>, DatabaseError> {
        self.query(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM fatigue_events
                 WHERE patient_id = ?1 ORDER BY detected_at DESC"
            ),
            patient_id,
        )
    }

    fn query(&self, sql: &str, id: Uuid) -> Result<Vec<FatigueEvent>, DatabaseError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![id.to_string()], parse_event_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
    }
}

fn parse_event_row(row: &rusqlite::Row) -> rusqlite::Result<FatigueEvent> {
    let type_str: String = row.get(4)?;
    let severity_str: String = row.get(5)?;
    let action_str: String = row.get(7)?;

    Ok(FatigueEvent {
        id: column_uuid(row, 0)?,
        patient_id: column_uuid(row, 1)?,
        session_id: column_uuid(row, 2)?,
        detected_at: column_timestamp(row, 3)?,
        fatigue_type: FatigueType::parse(&type_str).unwrap_or(FatigueType::PowerDecline),
        severity: FatigueSeverity::parse(&severity_str).unwrap_or(FatigueSeverity::Mild),
        trigger_metrics: column_json(row, 6)?,
        action_taken: FatigueAction::parse(&action_str).unwrap_or(FatigueAction::Informational),
        resistance_reduction: row.get(8)?,
        elapsed_minutes: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fatigue::FatigueMarkers;
    use crate::storage::Database;
    use chrono::{Duration, Utc};

    fn event(patient_id: Uuid, session_id: Uuid, minutes: i64) -> FatigueEvent {
        FatigueEvent {
            id: Uuid::new_v4(),
            patient_id,
            session_id,
            detected_at: Utc::now() + Duration::minutes(minutes),
            fatigue_type: FatigueType::PowerDecline,
            severity: FatigueSeverity::Moderate,
            trigger_metrics: FatigueMarkers {
                power_decline: 0.22,
                samples_in_window: 13,
                ..Default::default()
            },
            action_taken: FatigueAction::ReduceResistance,
            resistance_reduction: Some(1.1),
            elapsed_minutes: minutes as f64,
        }
    }

    #[test]
    fn test_events_by_session_and_patient() {
        let db = Database::open_in_memory().unwrap();
        let store = FatigueStore::new(db.connection());
        let patient_id = Uuid::new_v4();
        let session_a = Uuid::new_v4();
        let session_b = Uuid::new_v4();

        store.insert_event(&event(patient_id, session_a, 5)).unwrap();
        store.insert_event(&event(patient_id, session_a, 8)).unwrap();
        store.insert_event(&event(patient_id, session_b, 30)).unwrap();

        let for_a = store.events_for_session(session_a).unwrap();
        assert_eq!(for_a.len(), 2);
        assert!(for_a[0].detected_at < for_a[1].detected_at);
        assert_eq!(for_a[0].trigger_metrics.power_decline, 0.22);
        assert_eq!(for_a[0].action_taken, FatigueAction::ReduceResistance);

        let for_patient = store.events_for_patient(patient_id).unwrap();
        assert_eq!(for_patient.len(), 3);
        assert_eq!(for_patient[0].session_id, session_b);
    }
}
