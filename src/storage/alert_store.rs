//! Alert storage.

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::alerts::{Alert, AlertPriority, AlertType};
use crate::storage::database::{column_json, column_timestamp, column_uuid, DatabaseError};

/// Store for care-team alerts.
pub struct AlertStore<'a> {
    conn: &'a Connection,
}

impl<'a> AlertStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, alert: &Alert) -> Result<(), DatabaseError> {
        let metadata = serde_json::to_string(&alert.metadata)?;

        self.conn.execute(
            "INSERT INTO alerts
             (id, patient_id, alert_type, priority, message, action_required, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                alert.id.to_string(),
                alert.patient_id.to_string(),
                alert.alert_type.as_str(),
                alert.priority.as_str(),
                alert.message,
                alert.action_required,
                metadata,
                alert.created_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Alerts for a patient, most recent first.
    pub fn for_patient(&self, patient_id: Uuid) -> Result<Vec<Alert>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, patient_id, alert_type, priority, message, action_required, metadata, created_at
             FROM alerts
             WHERE patient_id = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![patient_id.to_string()], parse_alert_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
    }
}

fn parse_alert_row(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
    let type_str: String = row.get(2)?;
    let priority_str: String = row.get(3)?;

    Ok(Alert {
        id: column_uuid(row, 0)?,
        patient_id: column_uuid(row, 1)?,
        alert_type: AlertType::parse(&type_str).unwrap_or(AlertType::Fatigue),
        priority: AlertPriority::parse(&priority_str).unwrap_or(AlertPriority::High),
        message: row.get(4)?,
        action_required: row.get(5)?,
        metadata: column_json(row, 6)?,
        created_at: column_timestamp(row, 7)?,
    })
}
