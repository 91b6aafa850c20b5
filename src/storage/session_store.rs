//! Completed exercise session storage.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::fatigue::MetricSample;
use crate::progression::ExerciseSession;
use crate::storage::database::{column_timestamp, column_uuid, DatabaseError};

const SESSION_COLUMNS: &str =
    "id, patient_id, started_at, duration_min, avg_power, avg_rpm, resistance, samples_json";

/// Store for completed sessions.
pub struct SessionStore<'a> {
    conn: &'a Connection,
}

impl<'a> SessionStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, session: &ExerciseSession) -> Result<(), DatabaseError> {
        let samples = if session.samples.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&session.samples)?)
        };

        self.conn.execute(
            &format!(
                "INSERT INTO exercise_sessions ({SESSION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                session.id.to_string(),
                session.patient_id.to_string(),
                session.started_at.to_rfc3339(),
                session.duration_min,
                session.avg_power,
                session.avg_rpm,
                session.resistance,
                samples,
            ],
        )?;

        Ok(())
    }

    /// The patient's latest `limit` sessions, oldest first.
    pub fn recent_for_patient(
        &self,
        patient_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ExerciseSession>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM (
                SELECT * FROM exercise_sessions
                WHERE patient_id = ?1
                ORDER BY started_at DESC LIMIT ?2
             ) ORDER BY started_at ASC"
        ))?;

        let rows = stmt.query_map(params![patient_id.to_string(), limit as i64], parse_session_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
    }

    /// Sessions started at or after `since`, oldest first.
    pub fn sessions_since(
        &self,
        patient_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExerciseSession>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM exercise_sessions
             WHERE patient_id = ?1 AND started_at >= ?2
             ORDER BY started_at ASC"
        ))?;

        let rows = stmt.query_map(
            params![patient_id.to_string(), since.to_rfc3339()],
            parse_session_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
    }
}

fn parse_session_row(row: &rusqlite::Row) -> rusqlite::Result<ExerciseSession> {
    let samples_json: Option<String> = row.get(7)?;
    let samples: Vec<MetricSample> = match samples_json {
        Some(json) => serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?,
        None => Vec::new(),
    };

    Ok(ExerciseSession {
        id: column_uuid(row, 0)?,
        patient_id: column_uuid(row, 1)?,
        started_at: column_timestamp(row, 2)?,
        duration_min: row.get(3)?,
        avg_power: row.get(4)?,
        avg_rpm: row.get(5)?,
        resistance: row.get(6)?,
        samples,
    })
}
