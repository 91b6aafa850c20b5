//! Therapy goal management.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::types::{GoalMetric, GoalStatus, TherapyGoal};
use crate::storage::database::{column_timestamp, column_uuid};

/// Manager for therapy goals.
pub struct GoalManager<'a> {
    conn: &'a Connection,
}

const GOAL_COLUMNS: &str = "id, patient_id, metric, target_value, current_value,
                            pre_setback_target, status, created_at, updated_at";

impl<'a> GoalManager<'a> {
    /// Create a new goal manager with a database connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new therapy goal.
    pub fn create(&self, goal: &TherapyGoal) -> Result<(), GoalError> {
        if !goal.target_value.is_finite() || goal.target_value < 0.0 {
            return Err(GoalError::ValidationError(format!(
                "Invalid {} target: {}",
                goal.metric, goal.target_value
            )));
        }

        self.conn.execute(
            "INSERT INTO therapy_goals
             (id, patient_id, metric, target_value, current_value,
              pre_setback_target, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                goal.id.to_string(),
                goal.patient_id.to_string(),
                goal.metric.as_str(),
                goal.target_value,
                goal.current_value,
                goal.pre_setback_target,
                goal.status.as_str(),
                goal.created_at.to_rfc3339(),
                goal.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Get a goal by ID.
    pub fn get(&self, id: Uuid) -> Result<Option<TherapyGoal>, GoalError> {
        self.conn
            .query_row(
                &format!("SELECT {GOAL_COLUMNS} FROM therapy_goals WHERE id = ?1"),
                params![id.to_string()],
                parse_goal_row,
            )
            .optional()
            .map_err(GoalError::from)
    }

    /// Get all goals for a patient.
    pub fn get_for_patient(&self, patient_id: Uuid) -> Result<Vec<TherapyGoal>, GoalError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {GOAL_COLUMNS} FROM therapy_goals
             WHERE patient_id = ?1
             ORDER BY created_at ASC"
        ))?;

        let rows = stmt.query_map(params![patient_id.to_string()], parse_goal_row)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(GoalError::from)
    }

    /// Get active goals for a patient.
    pub fn get_active(&self, patient_id: Uuid) -> Result<Vec<TherapyGoal>, GoalError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {GOAL_COLUMNS} FROM therapy_goals
             WHERE patient_id = ?1 AND status = 'active'
             ORDER BY created_at ASC"
        ))?;

        let rows = stmt.query_map(params![patient_id.to_string()], parse_goal_row)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(GoalError::from)
    }

    /// Set a new target value.
    pub fn update_target(&self, id: Uuid, target_value: f64) -> Result<(), GoalError> {
        let updated = self.conn.execute(
            "UPDATE therapy_goals SET target_value = ?1, updated_at = ?2 WHERE id = ?3",
            params![target_value, Utc::now().to_rfc3339(), id.to_string()],
        )?;
        if updated == 0 {
            return Err(GoalError::NotFound(id));
        }
        Ok(())
    }

    /// Update the latest observed value.
    pub fn update_progress(&self, id: Uuid, current_value: f64) -> Result<(), GoalError> {
        self.conn.execute(
            "UPDATE therapy_goals SET current_value = ?1, updated_at = ?2 WHERE id = ?3",
            params![current_value, Utc::now().to_rfc3339(), id.to_string()],
        )?;

        Ok(())
    }

    /// Update goal status.
    pub fn update_status(&self, id: Uuid, status: GoalStatus) -> Result<(), GoalError> {
        self.conn.execute(
            "UPDATE therapy_goals SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id.to_string()],
        )?;

        Ok(())
    }

    /// Reduce every active target by `fraction`, remembering the original.
    ///
    /// A goal already reduced keeps its first `pre_setback_target`, so
    /// repeated reductions still restore to the pre-setback value.
    pub fn reduce_for_setback(
        &self,
        patient_id: Uuid,
        fraction: f64,
    ) -> Result<Vec<TherapyGoal>, GoalError> {
        let fraction = fraction.clamp(0.0, 1.0);
        let now = Utc::now();
        let mut reduced = Vec::new();

        for mut goal in self.get_active(patient_id)? {
            let original = goal.pre_setback_target.unwrap_or(goal.target_value);
            goal.pre_setback_target = Some(original);
            goal.target_value *= 1.0 - fraction;
            goal.updated_at = now;

            self.conn.execute(
                "UPDATE therapy_goals
                 SET target_value = ?1, pre_setback_target = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![
                    goal.target_value,
                    goal.pre_setback_target,
                    now.to_rfc3339(),
                    goal.id.to_string()
                ],
            )?;
            reduced.push(goal);
        }

        Ok(reduced)
    }

    /// Restore targets reduced by [`Self::reduce_for_setback`].
    pub fn restore_after_recovery(&self, patient_id: Uuid) -> Result<usize, GoalError> {
        let restored = self.conn.execute(
            "UPDATE therapy_goals
             SET target_value = pre_setback_target, pre_setback_target = NULL, updated_at = ?1
             WHERE patient_id = ?2 AND status = 'active' AND pre_setback_target IS NOT NULL",
            params![Utc::now().to_rfc3339(), patient_id.to_string()],
        )?;

        Ok(restored)
    }

    /// Delete a goal.
    pub fn delete(&self, id: Uuid) -> Result<bool, GoalError> {
        let deleted = self.conn.execute(
            "DELETE FROM therapy_goals WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(deleted > 0)
    }
}

/// Parse a database row into a TherapyGoal.
fn parse_goal_row(row: &rusqlite::Row) -> rusqlite::Result<TherapyGoal> {
    let metric_str: String = row.get(2)?;
    let metric = GoalMetric::parse(&metric_str)
        .ok_or_else(|| invalid_text(2, format!("invalid goal metric {metric_str:?}")))?;
    let status_str: String = row.get(6)?;
    let status = GoalStatus::parse(&status_str)
        .ok_or_else(|| invalid_text(6, format!("invalid goal status {status_str:?}")))?;

    Ok(TherapyGoal {
        id: column_uuid(row, 0)?,
        patient_id: column_uuid(row, 1)?,
        metric,
        target_value: row.get(3)?,
        current_value: row.get(4)?,
        pre_setback_target: row.get(5)?,
        status,
        created_at: column_timestamp(row, 7)?,
        updated_at: column_timestamp(row, 8)?,
    })
}

fn invalid_text(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}

/// Goal management errors.
#[derive(Debug, thiserror::Error)]
pub enum GoalError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Goal not found: {0}")]
    NotFound(Uuid),
}
