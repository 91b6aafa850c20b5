//! Personalization profile storage.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::patient::PersonalizationProfile;
use crate::storage::database::{column_opt_timestamp, column_timestamp, column_uuid, DatabaseError};

const PROFILE_COLUMNS: &str = "patient_id, current_progression_level, days_at_current_level,
    consecutive_successful_sessions, in_setback_recovery, setback_start_date, pre_setback_level,
    avg_fatigue_onset_minutes, fatigue_decay_rate, level_started_at, last_progression_date,
    updated_at";

/// Store for per-patient personalization rows.
pub struct PersonalizationStore<'a> {
    conn: &'a Connection,
}

impl<'a> PersonalizationStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, patient_id: Uuid) -> Result<Option<PersonalizationProfile>, DatabaseError> {
        self.conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM personalization_profiles WHERE patient_id = ?1"),
                params![patient_id.to_string()],
                parse_profile_row,
            )
            .optional()
            .map_err(DatabaseError::from)
    }

    /// Load the profile, creating a level-1 row if the patient has none.
    pub fn get_or_create(&self, patient_id: Uuid) -> Result<PersonalizationProfile, DatabaseError> {
        if let Some(profile) = self.get(patient_id)? {
            return Ok(profile);
        }

        let profile = PersonalizationProfile::new(patient_id);
        self.save(&profile)?;
        tracing::debug!("Created personalization profile for patient {}", patient_id);
        Ok(profile)
    }

    /// Insert or update the profile row.
    pub fn save(&self, profile: &PersonalizationProfile) -> Result<(), DatabaseError> {
        self.conn.execute(
            &format!(
                "INSERT INTO personalization_profiles ({PROFILE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(patient_id) DO UPDATE SET
                    current_progression_level = excluded.current_progression_level,
                    days_at_current_level = excluded.days_at_current_level,
                    consecutive_successful_sessions = excluded.consecutive_successful_sessions,
                    in_setback_recovery = excluded.in_setback_recovery,
                    setback_start_date = excluded.setback_start_date,
                    pre_setback_level = excluded.pre_setback_level,
                    avg_fatigue_onset_minutes = excluded.avg_fatigue_onset_minutes,
                    fatigue_decay_rate = excluded.fatigue_decay_rate,
                    level_started_at = excluded.level_started_at,
                    last_progression_date = excluded.last_progression_date,
                    updated_at = excluded.updated_at"
            ),
            params![
                profile.patient_id.to_string(),
                profile.current_progression_level.max(1),
                profile.days_at_current_level,
                profile.consecutive_successful_sessions,
                profile.in_setback_recovery,
                profile.setback_start_date.map(|d| d.to_rfc3339()),
                profile.pre_setback_level,
                profile.avg_fatigue_onset_minutes,
                profile.fatigue_decay_rate,
                profile.level_started_at.to_rfc3339(),
                profile.last_progression_date.map(|d| d.to_rfc3339()),
                profile.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }
}

fn parse_profile_row(row: &rusqlite::Row) -> rusqlite::Result<PersonalizationProfile> {
    Ok(PersonalizationProfile {
        patient_id: column_uuid(row, 0)?,
        current_progression_level: row.get(1)?,
        days_at_current_level: row.get(2)?,
        consecutive_successful_sessions: row.get(3)?,
        in_setback_recovery: row.get(4)?,
        setback_start_date: column_opt_timestamp(row, 5)?,
        pre_setback_level: row.get(6)?,
        avg_fatigue_onset_minutes: row.get(7)?,
        fatigue_decay_rate: row.get(8)?,
        level_started_at: column_timestamp(row, 9)?,
        last_progression_date: column_opt_timestamp(row, 10)?,
        updated_at: column_timestamp(row, 11)?,
    })
}
