//! Patient profile and risk assessment storage.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::patient::PatientProfile;
use crate::risk::RiskAssessment;
use crate::storage::database::{column_json, DatabaseError};

/// Store for raw patient profiles.
pub struct PatientStore<'a> {
    conn: &'a Connection,
}

impl<'a> PatientStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace a patient profile.
    pub fn upsert(&self, profile: &PatientProfile) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let json = serde_json::to_string(profile)?;

        self.conn.execute(
            "INSERT INTO patients (id, profile_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(id) DO UPDATE SET
                profile_json = excluded.profile_json,
                updated_at = excluded.updated_at",
            params![profile.id.to_string(), json, now],
        )?;

        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Option<PatientProfile>, DatabaseError> {
        self.conn
            .query_row(
                "SELECT profile_json FROM patients WHERE id = ?1",
                params![id.to_string()],
                |row| column_json(row, 0),
            )
            .optional()
            .map_err(DatabaseError::from)
    }
}

/// Append-only store for risk assessments.
pub struct AssessmentStore<'a> {
    conn: &'a Connection,
}

impl<'a> AssessmentStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, assessment: &RiskAssessment) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(assessment)?;

        self.conn.execute(
            "INSERT INTO risk_assessments (id, patient_id, assessed_at, highest_level, assessment_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                assessment.id.to_string(),
                assessment.patient_id.to_string(),
                assessment.assessed_at.to_rfc3339(),
                assessment.highest_level().as_str(),
                json,
            ],
        )?;

        Ok(())
    }

    /// Most recent assessment for a patient.
    pub fn latest(&self, patient_id: Uuid) -> Result<Option<RiskAssessment>, DatabaseError> {
        self.conn
            .query_row(
                "SELECT assessment_json FROM risk_assessments
                 WHERE patient_id = ?1
                 ORDER BY assessed_at DESC LIMIT 1",
                params![patient_id.to_string()],
                |row| column_json(row, 0),
            )
            .optional()
            .map_err(DatabaseError::from)
    }

    /// All assessments for a patient, oldest first.
    pub fn history(&self, patient_id: Uuid) -> Result<Vec<RiskAssessment>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT assessment_json FROM risk_assessments
             WHERE patient_id = ?1
             ORDER BY assessed_at ASC",
        )?;

        let rows = stmt.query_map(params![patient_id.to_string()], |row| column_json(row, 0))?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
    }
}
