//! Clinical protocol and assignment storage.
//!
//! `assign` is the only write path that creates an active assignment. It
//! discontinues the previous one and inserts the new row inside one
//! IMMEDIATE transaction, and the partial unique index on
//! `patient_protocol_assignments(patient_id) WHERE status = 'active'`
//! rejects any second active row that slips past it.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::protocols::{
    AssignmentState, ClinicalProtocol, PatientProtocolAssignment, ProtocolCriteria, ProtocolError,
    ProtocolPhase,
};
use crate::storage::database::{
    column_opt_timestamp, column_timestamp, column_uuid, immediate_transaction,
};

const ASSIGNMENT_COLUMNS: &str =
    "id, patient_id, protocol_id, status, current_phase, assigned_at, progression_date";

/// Store for protocols, matching criteria and assignments.
pub struct ProtocolStore<'a> {
    conn: &'a Connection,
}

impl<'a> ProtocolStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ========== Protocols ==========

    pub fn insert_protocol(&self, protocol: &ClinicalProtocol) -> Result<(), ProtocolError> {
        self.conn.execute(
            "INSERT INTO clinical_protocols
             (id, name, indication, contraindications_json, diagnosis_codes_json,
              phases_json, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                protocol.id.to_string(),
                protocol.name,
                protocol.indication,
                json_column(protocol.id, &protocol.contraindications)?,
                json_column(protocol.id, &protocol.diagnosis_codes)?,
                json_column(protocol.id, &protocol.phases)?,
                protocol.is_active,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Load a protocol.
    ///
    /// A missing row is `NotFound`. A row whose JSON columns do not parse,
    /// or that has no phases, is `Malformed`.
    pub fn get_protocol(&self, id: Uuid) -> Result<ClinicalProtocol, ProtocolError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, indication, contraindications_json, diagnosis_codes_json,
                        phases_json, is_active
                 FROM clinical_protocols WHERE id = ?1",
                params![id.to_string()],
                read_protocol_row,
            )
            .optional()?;

        match row {
            Some(raw) => raw.into_protocol(),
            None => Err(ProtocolError::NotFound(id)),
        }
    }

    /// All active protocols, skipping malformed rows.
    ///
    /// Malformed rows are logged and left out so one bad protocol does not
    /// hide the others from matching.
    pub fn list_active(&self) -> Result<Vec<ClinicalProtocol>, ProtocolError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, indication, contraindications_json, diagnosis_codes_json,
                    phases_json, is_active
             FROM clinical_protocols WHERE is_active = 1
             ORDER BY name ASC",
        )?;

        let rows = stmt.query_map([], read_protocol_row)?;

        let mut protocols = Vec::new();
        for row in rows {
            match row?.into_protocol() {
                Ok(protocol) => protocols.push(protocol),
                Err(e) => tracing::error!("Skipping protocol: {}", e),
            }
        }

        Ok(protocols)
    }

    // ========== Criteria ==========

    pub fn save_criteria(
        &self,
        protocol_id: Uuid,
        criteria: &ProtocolCriteria,
    ) -> Result<(), ProtocolError> {
        let required = json_column(protocol_id, &criteria.required_mobility)?;
        let excluded = json_column(protocol_id, &criteria.excluded_mobility)?;

        self.conn.execute(
            "INSERT INTO protocol_criteria
             (protocol_id, min_age, max_age, required_mobility_json, excluded_mobility_json,
              max_fall_risk, min_deconditioning_risk)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(protocol_id) DO UPDATE SET
                min_age = excluded.min_age,
                max_age = excluded.max_age,
                required_mobility_json = excluded.required_mobility_json,
                excluded_mobility_json = excluded.excluded_mobility_json,
                max_fall_risk = excluded.max_fall_risk,
                min_deconditioning_risk = excluded.min_deconditioning_risk",
            params![
                protocol_id.to_string(),
                criteria.min_age,
                criteria.max_age,
                required,
                excluded,
                criteria.max_fall_risk,
                criteria.min_deconditioning_risk,
            ],
        )?;

        Ok(())
    }

    /// Matching criteria for a protocol; `None` when the protocol has none.
    pub fn criteria_for(&self, protocol_id: Uuid) -> Result<Option<ProtocolCriteria>, ProtocolError> {
        let row = self
            .conn
            .query_row(
                "SELECT min_age, max_age, required_mobility_json, excluded_mobility_json,
                        max_fall_risk, min_deconditioning_risk
                 FROM protocol_criteria WHERE protocol_id = ?1",
                params![protocol_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, Option<u32>>(0)?,
                        row.get::<_, Option<u32>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                        row.get::<_, Option<f64>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((min_age, max_age, required, excluded, max_fall, min_decon)) = row else {
            return Ok(None);
        };

        let malformed = |e: serde_json::Error| ProtocolError::Malformed {
            id: protocol_id,
            reason: format!("criteria: {}", e),
        };

        Ok(Some(ProtocolCriteria {
            min_age,
            max_age,
            required_mobility: serde_json::from_str(&required).map_err(malformed)?,
            excluded_mobility: serde_json::from_str(&excluded).map_err(malformed)?,
            max_fall_risk: max_fall,
            min_deconditioning_risk: min_decon,
        }))
    }

    // ========== Assignments ==========

    /// Atomically discontinue any active assignment and insert a new one.
    pub fn assign(
        &self,
        patient_id: Uuid,
        protocol_id: Uuid,
        start_phase: usize,
        phase_count: usize,
    ) -> Result<PatientProtocolAssignment, ProtocolError> {
        let state = AssignmentState::start(start_phase, phase_count)?;
        let assignment = PatientProtocolAssignment::new(patient_id, protocol_id, state);
        let now = assignment.assigned_at.to_rfc3339();

        let tx = immediate_transaction(self.conn)?;

        let discontinued = tx.execute(
            "UPDATE patient_protocol_assignments
             SET status = ?1, updated_at = ?2
             WHERE patient_id = ?3 AND status = 'active'",
            params![
                AssignmentState::Discontinued.as_str(),
                now,
                patient_id.to_string()
            ],
        )?;

        tx.execute(
            &format!(
                "INSERT INTO patient_protocol_assignments ({ASSIGNMENT_COLUMNS}, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?6)"
            ),
            params![
                assignment.id.to_string(),
                patient_id.to_string(),
                protocol_id.to_string(),
                state.as_str(),
                state.phase().map(|p| p as i64),
                now,
            ],
        )?;

        tx.commit()?;

        if discontinued > 0 {
            tracing::info!(
                "Discontinued {} prior assignment(s) for patient {}",
                discontinued,
                patient_id
            );
        }

        Ok(assignment)
    }

    /// The patient's active assignment, if any.
    pub fn active_assignment(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<PatientProtocolAssignment>, ProtocolError> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ASSIGNMENT_COLUMNS} FROM patient_protocol_assignments
                     WHERE patient_id = ?1 AND status = 'active'"
                ),
                params![patient_id.to_string()],
                parse_assignment_row,
            )
            .optional()
            .map_err(ProtocolError::from)
    }

    /// Every assignment for a patient, oldest first.
    pub fn assignments_for(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<PatientProtocolAssignment>, ProtocolError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM patient_protocol_assignments
             WHERE patient_id = ?1 ORDER BY assigned_at ASC"
        ))?;

        let rows = stmt.query_map(params![patient_id.to_string()], parse_assignment_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(ProtocolError::from)
    }

    /// Persist a state change for an existing assignment.
    pub fn update_assignment(
        &self,
        assignment: &PatientProtocolAssignment,
    ) -> Result<bool, ProtocolError> {
        let updated = self.conn.execute(
            "UPDATE patient_protocol_assignments
             SET status = ?1, current_phase = ?2, progression_date = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                assignment.state.as_str(),
                assignment.state.phase().map(|p| p as i64),
                assignment.progression_date.map(|d| d.to_rfc3339()),
                Utc::now().to_rfc3339(),
                assignment.id.to_string(),
            ],
        )?;

        Ok(updated > 0)
    }
}

fn json_column<T: Serialize>(id: Uuid, value: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(value).map_err(|e| ProtocolError::Malformed {
        id,
        reason: e.to_string(),
    })
}

/// Protocol row before its JSON columns are validated.
struct RawProtocolRow {
    id: Uuid,
    name: String,
    indication: String,
    contraindications: String,
    diagnosis_codes: String,
    phases: String,
    is_active: bool,
}

impl RawProtocolRow {
    fn into_protocol(self) -> Result<ClinicalProtocol, ProtocolError> {
        let id = self.id;
        let malformed = |column: &str, e: serde_json::Error| ProtocolError::Malformed {
            id,
            reason: format!("{}: {}", column, e),
        };

        let phases: Vec<ProtocolPhase> =
            serde_json::from_str(&self.phases).map_err(|e| malformed("phases", e))?;
        if phases.is_empty() {
            return Err(ProtocolError::Malformed {
                id,
                reason: "empty phase list".to_string(),
            });
        }

        Ok(ClinicalProtocol {
            id,
            name: self.name,
            indication: self.indication,
            contraindications: serde_json::from_str(&self.contraindications)
                .map_err(|e| malformed("contraindications", e))?,
            diagnosis_codes: serde_json::from_str(&self.diagnosis_codes)
                .map_err(|e| malformed("diagnosis_codes", e))?,
            phases,
            is_active: self.is_active,
        })
    }
}

fn read_protocol_row(row: &rusqlite::Row) -> rusqlite::Result<RawProtocolRow> {
    Ok(RawProtocolRow {
        id: column_uuid(row, 0)?,
        name: row.get(1)?,
        indication: row.get(2)?,
        contraindications: row.get(3)?,
        diagnosis_codes: row.get(4)?,
        phases: row.get(5)?,
        is_active: row.get(6)?,
    })
}

fn parse_assignment_row(row: &rusqlite::Row) -> rusqlite::Result<PatientProtocolAssignment> {
    let status: String = row.get(3)?;
    let phase: Option<i64> = row.get(4)?;
    let state = AssignmentState::from_parts(&status, phase.map(|p| p.max(0) as usize))
        .ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("invalid assignment state {status:?}/{phase:?}").into(),
            )
        })?;
    let progression_date: Option<DateTime<Utc>> = column_opt_timestamp(row, 6)?;

    Ok(PatientProtocolAssignment {
        id: column_uuid(row, 0)?,
        patient_id: column_uuid(row, 1)?,
        protocol_id: column_uuid(row, 2)?,
        state,
        assigned_at: column_timestamp(row, 5)?,
        progression_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::MobilityCategory;
    use crate::storage::Database;

    fn sample_protocol(name: &str, phases: usize) -> ClinicalProtocol {
        ClinicalProtocol {
            id: Uuid::new_v4(),
            name: name.to_string(),
            indication: "post-operative hip fracture rehabilitation".to_string(),
            contraindications: vec!["unstable angina".to_string()],
            diagnosis_codes: vec!["S72.0".to_string()],
            phases: (0..phases)
                .map(|i| ProtocolPhase {
                    phase: i as u32 + 1,
                    frequency: "2x daily".to_string(),
                    target_duration_min: 10.0 + 5.0 * i as f64,
                    resistance: 2.0,
                    rpm: 40.0,
                    goals: vec![],
                    progression_criteria: vec![],
                    monitoring_params: vec![],
                    stop_criteria: vec![],
                })
                .collect(),
            is_active: true,
        }
    }

    #[test]
    fn test_protocol_round_trip_and_not_found() {
        let db = Database::open_in_memory().unwrap();
        let store = ProtocolStore::new(db.connection());
        let protocol = sample_protocol("Hip fracture", 3);
        store.insert_protocol(&protocol).unwrap();

        assert_eq!(store.get_protocol(protocol.id).unwrap(), protocol);
        assert!(matches!(
            store.get_protocol(Uuid::new_v4()),
            Err(ProtocolError::NotFound(_))
        ));
    }

    #[test]
    fn test_malformed_protocol_is_distinguished() {
        let db = Database::open_in_memory().unwrap();
        let store = ProtocolStore::new(db.connection());
        let good = sample_protocol("Good", 2);
        store.insert_protocol(&good).unwrap();

        let bad_id = Uuid::new_v4();
        db.connection()
            .execute(
                "INSERT INTO clinical_protocols (id, name, indication, phases_json, created_at)
                 VALUES (?1, 'Bad', 'x', '{not json', '2024-01-01T00:00:00Z')",
                params![bad_id.to_string()],
            )
            .unwrap();

        let empty = sample_protocol("Empty", 0);
        store.insert_protocol(&empty).unwrap();

        assert!(matches!(
            store.get_protocol(bad_id),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            store.get_protocol(empty.id),
            Err(ProtocolError::Malformed { .. })
        ));

        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, good.id);
    }

    #[test]
    fn test_criteria() {
        let db = Database::open_in_memory().unwrap();
        let store = ProtocolStore::new(db.connection());
        let protocol = sample_protocol("Hip fracture", 2);
        store.insert_protocol(&protocol).unwrap();

        assert!(store.criteria_for(protocol.id).unwrap().is_none());

        let criteria = ProtocolCriteria {
            min_age: Some(50),
            max_age: Some(95),
            required_mobility: vec![MobilityCategory::Walker, MobilityCategory::Assisted],
            excluded_mobility: vec![MobilityCategory::Bedbound],
            max_fall_risk: Some(0.4),
            min_deconditioning_risk: None,
        };
        store.save_criteria(protocol.id, &criteria).unwrap();
        assert_eq!(store.criteria_for(protocol.id).unwrap(), Some(criteria));
    }

    #[test]
    fn test_second_assignment_discontinues_first() {
        let db = Database::open_in_memory().unwrap();
        let store = ProtocolStore::new(db.connection());
        let first = sample_protocol("First", 3);
        let second = sample_protocol("Second", 2);
        store.insert_protocol(&first).unwrap();
        store.insert_protocol(&second).unwrap();
        let patient_id = Uuid::new_v4();

        store.assign(patient_id, first.id, 0, 3).unwrap();
        let current = store.assign(patient_id, second.id, 1, 2).unwrap();

        let all = store.assignments_for(patient_id).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.iter().filter(|a| a.state.is_active()).count(), 1);
        assert_eq!(all[0].state, AssignmentState::Discontinued);

        let active = store.active_assignment(patient_id).unwrap().unwrap();
        assert_eq!(active.id, current.id);
        assert_eq!(active.state, AssignmentState::Active { phase: 1 });
    }

    #[test]
    fn test_index_rejects_second_active_row() {
        let db = Database::open_in_memory().unwrap();
        let store = ProtocolStore::new(db.connection());
        let protocol = sample_protocol("Only", 1);
        store.insert_protocol(&protocol).unwrap();
        let patient_id = Uuid::new_v4();
        store.assign(patient_id, protocol.id, 0, 1).unwrap();

        let result = db.connection().execute(
            "INSERT INTO patient_protocol_assignments
             (id, patient_id, protocol_id, status, current_phase, assigned_at, updated_at)
             VALUES (?1, ?2, ?3, 'active', 0, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            params![
                Uuid::new_v4().to_string(),
                patient_id.to_string(),
                protocol.id.to_string()
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_assign_rejects_bad_phase() {
        let db = Database::open_in_memory().unwrap();
        let store = ProtocolStore::new(db.connection());
        let protocol = sample_protocol("Two", 2);
        store.insert_protocol(&protocol).unwrap();

        assert!(matches!(
            store.assign(Uuid::new_v4(), protocol.id, 5, 2),
            Err(ProtocolError::Transition(_))
        ));
    }

    #[test]
    fn test_update_assignment() {
        let db = Database::open_in_memory().unwrap();
        let store = ProtocolStore::new(db.connection());
        let protocol = sample_protocol("Two", 2);
        store.insert_protocol(&protocol).unwrap();
        let patient_id = Uuid::new_v4();

        let mut assignment = store.assign(patient_id, protocol.id, 0, 2).unwrap();
        assignment.state = assignment.state.advance(2).unwrap();
        assignment.progression_date = Some(Utc::now());
        assert!(store.update_assignment(&assignment).unwrap());

        let loaded = store.active_assignment(patient_id).unwrap().unwrap();
        assert_eq!(loaded.state.phase(), Some(1));
        assert!(loaded.progression_date.is_some());
    }
}
