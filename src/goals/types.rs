//! Therapy goal type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A measurable therapy target for a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapyGoal {
    /// Unique identifier
    pub id: Uuid,
    /// Patient who owns this goal
    pub patient_id: Uuid,
    /// What the target measures
    pub metric: GoalMetric,
    /// Target value in the metric's unit
    pub target_value: f64,
    /// Latest observed value
    pub current_value: Option<f64>,
    /// Target before a setback reduction, restored on recovery
    pub pre_setback_target: Option<f64>,
    /// Current status
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TherapyGoal {
    /// Create a new active goal.
    pub fn new(patient_id: Uuid, metric: GoalMetric, target_value: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            metric,
            target_value,
            current_value: None,
            pre_setback_target: None,
            status: GoalStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fraction of the target reached by `observed` (1.0 = met).
    pub fn achievement(&self, observed: f64) -> f64 {
        if self.target_value <= 0.0 {
            return 1.0;
        }
        observed / self.target_value
    }

    /// Whether the target is currently reduced for setback recovery.
    pub fn is_reduced(&self) -> bool {
        self.pre_setback_target.is_some()
    }
}

/// Metric a goal targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalMetric {
    /// Average session power in watts
    Power,
    /// Session duration in minutes
    Duration,
    /// Ergometer resistance level
    Resistance,
}

impl GoalMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalMetric::Power => "power",
            GoalMetric::Duration => "duration",
            GoalMetric::Resistance => "resistance",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "power" => Some(GoalMetric::Power),
            "duration" => Some(GoalMetric::Duration),
            "resistance" => Some(GoalMetric::Resistance),
            _ => None,
        }
    }

    /// Unit label.
    pub fn unit(&self) -> &'static str {
        match self {
            GoalMetric::Power => "W",
            GoalMetric::Duration => "min",
            GoalMetric::Resistance => "level",
        }
    }
}

impl std::fmt::Display for GoalMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a therapy goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    /// Goal is active and being tracked
    Active,
    /// Goal has been achieved
    Completed,
    /// Goal was abandoned
    Abandoned,
    /// Goal is temporarily on hold
    OnHold,
}

impl GoalStatus {
    /// Whether the goal is still being actively tracked.
    pub fn is_active(&self) -> bool {
        matches!(self, GoalStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Abandoned => "abandoned",
            GoalStatus::OnHold => "on_hold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(GoalStatus::Active),
            "completed" => Some(GoalStatus::Completed),
            "abandoned" => Some(GoalStatus::Abandoned),
            "on_hold" => Some(GoalStatus::OnHold),
            _ => None,
        }
    }

    /// Get display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            GoalStatus::Active => "Active",
            GoalStatus::Completed => "Completed",
            GoalStatus::Abandoned => "Abandoned",
            GoalStatus::OnHold => "On Hold",
        }
    }
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Find the active goal for a metric.
pub fn active_goal(goals: &[TherapyGoal], metric: GoalMetric) -> Option<&TherapyGoal> {
    goals
        .iter()
        .find(|g| g.metric == metric && g.status.is_active())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_creation() {
        let goal = TherapyGoal::new(Uuid::new_v4(), GoalMetric::Power, 40.0);
        assert!(goal.status.is_active());
        assert!(!goal.is_reduced());
        assert_eq!(goal.achievement(44.0), 1.1);
    }

    #[test]
    fn test_zero_target_counts_as_met() {
        let goal = TherapyGoal::new(Uuid::new_v4(), GoalMetric::Duration, 0.0);
        assert_eq!(goal.achievement(3.0), 1.0);
    }

    #[test]
    fn test_active_goal_lookup() {
        let patient = Uuid::new_v4();
        let mut done = TherapyGoal::new(patient, GoalMetric::Power, 30.0);
        done.status = GoalStatus::Completed;
        let active = TherapyGoal::new(patient, GoalMetric::Power, 35.0);
        let goals = vec![done, active];

        assert_eq!(active_goal(&goals, GoalMetric::Power).map(|g| g.target_value), Some(35.0));
        assert!(active_goal(&goals, GoalMetric::Duration).is_none());
    }

    #[test]
    fn test_status_parse() {
        for status in [
            GoalStatus::Active,
            GoalStatus::Completed,
            GoalStatus::Abandoned,
            GoalStatus::OnHold,
        ] {
            assert_eq!(GoalStatus::parse(status.as_str()), Some(status));
        }
    }
}
