//! Fatigue detection types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::storage::config::FatigueSettings;

/// Error types for fatigue monitoring.
#[derive(Debug, Error)]
pub enum FatigueError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<rusqlite::Error> for FatigueError {
    fn from(err: rusqlite::Error) -> Self {
        FatigueError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for FatigueError {
    fn from(err: serde_json::Error) -> Self {
        FatigueError::SerializationError(err.to_string())
    }
}

/// One live sample from the ergometer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    /// Power in watts
    pub power: f64,
    /// Cadence in revolutions per minute
    pub rpm: f64,
    /// Left pedal force, if the device reports it
    #[serde(default)]
    pub left_force: Option<f64>,
    /// Right pedal force, if the device reports it
    #[serde(default)]
    pub right_force: Option<f64>,
}

impl MetricSample {
    pub fn new(timestamp: DateTime<Utc>, power: f64, rpm: f64) -> Self {
        Self {
            timestamp,
            power,
            rpm,
            left_force: None,
            right_force: None,
        }
    }

    pub fn with_forces(mut self, left: f64, right: f64) -> Self {
        self.left_force = Some(left);
        self.right_force = Some(right);
        self
    }

    /// `|L − R| / max(L, R)`, when both sides are reported and non-zero.
    pub fn asymmetry(&self) -> Option<f64> {
        let (left, right) = (self.left_force?, self.right_force?);
        let max = left.max(right);
        if max <= 0.0 {
            return None;
        }
        Some((left - right).abs() / max)
    }

    /// Whether every reported value is a finite number.
    pub fn is_valid(&self) -> bool {
        self.power.is_finite()
            && self.rpm.is_finite()
            && self.left_force.map_or(true, f64::is_finite)
            && self.right_force.map_or(true, f64::is_finite)
    }
}

/// Dominant fatigue pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatigueType {
    BilateralLoss,
    CadenceIrregular,
    ForceDegradation,
    PowerDecline,
}

impl FatigueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FatigueType::BilateralLoss => "bilateral_loss",
            FatigueType::CadenceIrregular => "cadence_irregular",
            FatigueType::ForceDegradation => "force_degradation",
            FatigueType::PowerDecline => "power_decline",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bilateral_loss" => Some(FatigueType::BilateralLoss),
            "cadence_irregular" => Some(FatigueType::CadenceIrregular),
            "force_degradation" => Some(FatigueType::ForceDegradation),
            "power_decline" => Some(FatigueType::PowerDecline),
            _ => None,
        }
    }

    /// Get display label.
    pub fn label(&self) -> &'static str {
        match self {
            FatigueType::BilateralLoss => "Loss of bilateral symmetry",
            FatigueType::CadenceIrregular => "Irregular cadence",
            FatigueType::ForceDegradation => "Force pattern degradation",
            FatigueType::PowerDecline => "Power decline",
        }
    }
}

impl std::fmt::Display for FatigueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of detected fatigue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatigueSeverity {
    Mild,
    Moderate,
    Severe,
}

impl FatigueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FatigueSeverity::Mild => "mild",
            FatigueSeverity::Moderate => "moderate",
            FatigueSeverity::Severe => "severe",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "mild" => Some(FatigueSeverity::Mild),
            "moderate" => Some(FatigueSeverity::Moderate),
            "severe" => Some(FatigueSeverity::Severe),
            _ => None,
        }
    }
}

impl std::fmt::Display for FatigueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recommended response to a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatigueAction {
    None,
    Informational,
    ReduceResistance,
    EndSession,
}

impl FatigueAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FatigueAction::None => "none",
            FatigueAction::Informational => "informational",
            FatigueAction::ReduceResistance => "reduce_resistance",
            FatigueAction::EndSession => "end_session",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(FatigueAction::None),
            "informational" => Some(FatigueAction::Informational),
            "reduce_resistance" => Some(FatigueAction::ReduceResistance),
            "end_session" => Some(FatigueAction::EndSession),
            _ => None,
        }
    }
}

impl std::fmt::Display for FatigueAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Marker values computed over the trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FatigueMarkers {
    /// Fractional drop from first- to last-quartile mean power, floored at 0
    pub power_decline: f64,
    pub cadence_cv: f64,
    /// Change in mean asymmetry, when enough bilateral samples exist
    pub asymmetry_change: Option<f64>,
    pub power_cv: f64,
    pub force_degradation: bool,
    pub samples_in_window: usize,
}

/// Marker thresholds, possibly personalized for a patient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FatigueThresholds {
    pub power_decline_mild: f64,
    pub power_decline_moderate: f64,
    pub power_decline_severe: f64,
    pub cadence_cv: f64,
    pub asymmetry_change: f64,
    pub power_cv: f64,
}

impl FatigueThresholds {
    pub fn from_settings(settings: &FatigueSettings) -> Self {
        Self {
            power_decline_mild: settings.power_decline_mild,
            power_decline_moderate: settings.power_decline_moderate,
            power_decline_severe: settings.power_decline_severe,
            cadence_cv: settings.cadence_cv,
            asymmetry_change: settings.asymmetry_change,
            power_cv: settings.power_cv,
        }
    }

    /// Scale the decline, cadence and asymmetry thresholds by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            power_decline_mild: self.power_decline_mild * factor,
            power_decline_moderate: self.power_decline_moderate * factor,
            power_decline_severe: self.power_decline_severe * factor,
            cadence_cv: self.cadence_cv * factor,
            asymmetry_change: self.asymmetry_change * factor,
            power_cv: self.power_cv,
        }
    }
}

impl Default for FatigueThresholds {
    fn default() -> Self {
        Self::from_settings(&FatigueSettings::default())
    }
}

/// Result of analysing one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueDetection {
    pub detected: bool,
    pub fatigue_type: Option<FatigueType>,
    pub severity: Option<FatigueSeverity>,
    pub markers: FatigueMarkers,
    /// Triggered markers (0-4)
    pub marker_count: u8,
    pub action: FatigueAction,
    /// Suggested resistance reduction in levels
    pub resistance_reduction: Option<f64>,
    pub message: String,
    /// Minutes since the session's first sample
    pub elapsed_minutes: f64,
    pub detected_at: Option<DateTime<Utc>>,
}

impl FatigueDetection {
    /// A "nothing to do" result.
    pub fn none() -> Self {
        Self {
            detected: false,
            fatigue_type: None,
            severity: None,
            markers: FatigueMarkers::default(),
            marker_count: 0,
            action: FatigueAction::None,
            resistance_reduction: None,
            message: String::new(),
            elapsed_minutes: 0.0,
            detected_at: None,
        }
    }

    pub fn with_markers(markers: FatigueMarkers) -> Self {
        Self {
            markers,
            ..Self::none()
        }
    }
}

/// Persisted record of a detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueEvent {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub session_id: Uuid,
    pub detected_at: DateTime<Utc>,
    pub fatigue_type: FatigueType,
    pub severity: FatigueSeverity,
    pub trigger_metrics: FatigueMarkers,
    pub action_taken: FatigueAction,
    pub resistance_reduction: Option<f64>,
    pub elapsed_minutes: f64,
}

impl FatigueEvent {
    /// Build an event from a positive detection.
    pub fn from_detection(
        patient_id: Uuid,
        session_id: Uuid,
        detection: &FatigueDetection,
    ) -> Option<Self> {
        if !detection.detected {
            return None;
        }
        Some(Self {
            id: Uuid::new_v4(),
            patient_id,
            session_id,
            detected_at: detection.detected_at.unwrap_or_else(Utc::now),
            fatigue_type: detection.fatigue_type?,
            severity: detection.severity?,
            trigger_metrics: detection.markers,
            action_taken: detection.action,
            resistance_reduction: detection.resistance_reduction,
            elapsed_minutes: detection.elapsed_minutes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asymmetry() {
        let sample = MetricSample::new(Utc::now(), 40.0, 50.0).with_forces(80.0, 100.0);
        assert!((sample.asymmetry().unwrap() - 0.2).abs() < 1e-12);

        let one_sided = MetricSample {
            left_force: Some(10.0),
            ..MetricSample::new(Utc::now(), 40.0, 50.0)
        };
        assert!(one_sided.asymmetry().is_none());

        let zero = MetricSample::new(Utc::now(), 0.0, 0.0).with_forces(0.0, 0.0);
        assert!(zero.asymmetry().is_none());
    }

    #[test]
    fn test_invalid_sample() {
        let sample = MetricSample::new(Utc::now(), f64::NAN, 50.0);
        assert!(!sample.is_valid());
    }

    #[test]
    fn test_thresholds_scaling_keeps_power_cv() {
        let scaled = FatigueThresholds::default().scaled(0.9);
        assert!((scaled.power_decline_mild - 0.09).abs() < 1e-12);
        assert_eq!(scaled.power_cv, 0.35);
    }

    #[test]
    fn test_event_requires_detection() {
        let none = FatigueDetection::none();
        assert!(FatigueEvent::from_detection(Uuid::new_v4(), Uuid::new_v4(), &none).is_none());
    }
}
