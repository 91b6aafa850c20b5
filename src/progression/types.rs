//! Progressive overload and setback types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::fatigue::MetricSample;
use crate::goals::GoalError;
use crate::storage::DatabaseError;

/// Error types for progression processing.
#[derive(Debug, Error)]
pub enum ProgressionError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Goal error: {0}")]
    GoalError(String),

    #[error("Session {0} has no valid duration")]
    InvalidSession(Uuid),
}

impl From<rusqlite::Error> for ProgressionError {
    fn from(err: rusqlite::Error) -> Self {
        ProgressionError::DatabaseError(err.to_string())
    }
}

impl From<DatabaseError> for ProgressionError {
    fn from(err: DatabaseError) -> Self {
        ProgressionError::DatabaseError(err.to_string())
    }
}

impl From<GoalError> for ProgressionError {
    fn from(err: GoalError) -> Self {
        ProgressionError::GoalError(err.to_string())
    }
}

/// A completed exercise session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSession {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Minutes pedalled
    pub duration_min: f64,
    /// Average power in watts
    pub avg_power: f64,
    pub avg_rpm: f64,
    pub resistance: f64,
    /// Optional per-sample time series
    #[serde(default)]
    pub samples: Vec<MetricSample>,
}

impl ExerciseSession {
    pub fn new(
        patient_id: Uuid,
        started_at: DateTime<Utc>,
        duration_min: f64,
        avg_power: f64,
        avg_rpm: f64,
        resistance: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            started_at,
            duration_min,
            avg_power,
            avg_rpm,
            resistance,
            samples: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.duration_min.is_finite()
            && self.duration_min >= 0.0
            && self.avg_power.is_finite()
            && self.avg_rpm.is_finite()
            && self.resistance.is_finite()
    }
}

/// Kind of setback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetbackType {
    PerformanceDecline,
    AdherenceDrop,
    BilateralImbalance,
}

impl SetbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetbackType::PerformanceDecline => "performance_decline",
            SetbackType::AdherenceDrop => "adherence_drop",
            SetbackType::BilateralImbalance => "bilateral_imbalance",
        }
    }
}

impl std::fmt::Display for SetbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Setback severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetbackSeverity {
    Minor,
    Moderate,
    Major,
}

impl SetbackSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetbackSeverity::Minor => "minor",
            SetbackSeverity::Moderate => "moderate",
            SetbackSeverity::Major => "major",
        }
    }

    /// Multiplier applied to the base goal reduction.
    pub fn multiplier(&self) -> f64 {
        match self {
            SetbackSeverity::Minor => 0.5,
            SetbackSeverity::Moderate => 1.0,
            SetbackSeverity::Major => 1.5,
        }
    }

    /// Map a 0-based tier index (minor, moderate, major).
    pub(crate) fn from_tier(tier: usize) -> Self {
        match tier {
            0 => SetbackSeverity::Minor,
            1 => SetbackSeverity::Moderate,
            _ => SetbackSeverity::Major,
        }
    }
}

impl std::fmt::Display for SetbackSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a setback check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetbackCheck {
    pub detected: bool,
    pub setback_type: Option<SetbackType>,
    pub severity: Option<SetbackSeverity>,
    pub message: String,
    /// Decline fraction or days since the last session
    pub metric: Option<f64>,
}

impl SetbackCheck {
    pub fn none() -> Self {
        Self {
            detected: false,
            setback_type: None,
            severity: None,
            message: String::new(),
            metric: None,
        }
    }

    pub fn detected(
        setback_type: SetbackType,
        severity: SetbackSeverity,
        metric: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            detected: true,
            setback_type: Some(setback_type),
            severity: Some(severity),
            message: message.into(),
            metric: Some(metric),
        }
    }
}

/// Which prescription parameter a progression changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionParameter {
    Resistance,
    Duration,
    Maintain,
}

impl ProgressionParameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressionParameter::Resistance => "resistance",
            ProgressionParameter::Duration => "duration",
            ProgressionParameter::Maintain => "maintain",
        }
    }
}

impl std::fmt::Display for ProgressionParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progression proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionDecision {
    pub should_progress: bool,
    pub parameter: ProgressionParameter,
    pub current_value: Option<f64>,
    pub proposed_value: Option<f64>,
    /// Blend of session count, duration and power achievement, in `[0, 1]`
    pub confidence: f64,
    pub reason: String,
}

impl ProgressionDecision {
    pub fn maintain(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            should_progress: false,
            parameter: ProgressionParameter::Maintain,
            current_value: None,
            proposed_value: None,
            confidence,
            reason: reason.into(),
        }
    }
}

/// Plateau check result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateauCheck {
    pub detected: bool,
    /// Relative slope of power per session
    pub power_trend: f64,
    /// Relative slope of duration per session
    pub duration_trend: f64,
}

/// Recovery-completion check result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryCheck {
    pub complete: bool,
    pub days_in_recovery: i64,
    pub sessions_since_setback: usize,
    pub avg_power: Option<f64>,
    pub required_power: Option<f64>,
}

/// What one completed-session evaluation did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProgressionOutcome {
    SetbackEntered(SetbackCheck),
    RecoveryContinuing(RecoveryCheck),
    RecoveryCompleted(RecoveryCheck),
    Plateau(PlateauCheck),
    Progressed(ProgressionDecision),
    Maintained(ProgressionDecision),
    InsufficientData { sessions_in_window: usize },
    NoAction,
}
