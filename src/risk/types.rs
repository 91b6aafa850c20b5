//! Risk assessment data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::prescription::{AdjustedPrescription, PrescriptionBaseline};

/// Probability ceiling for every outcome.
pub const MAX_PROBABILITY: f64 = 0.95;

/// Adverse outcomes scored by the risk model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskOutcome {
    Deconditioning,
    Vte,
    Falls,
    PressureInjury,
}

impl RiskOutcome {
    pub const ALL: [RiskOutcome; 4] = [
        RiskOutcome::Deconditioning,
        RiskOutcome::Vte,
        RiskOutcome::Falls,
        RiskOutcome::PressureInjury,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskOutcome::Deconditioning => "deconditioning",
            RiskOutcome::Vte => "vte",
            RiskOutcome::Falls => "falls",
            RiskOutcome::PressureInjury => "pressure_injury",
        }
    }

    /// Get display label.
    pub fn label(&self) -> &'static str {
        match self {
            RiskOutcome::Deconditioning => "Deconditioning",
            RiskOutcome::Vte => "Venous Thromboembolism",
            RiskOutcome::Falls => "Falls",
            RiskOutcome::PressureInjury => "Pressure Injury",
        }
    }
}

impl std::fmt::Display for RiskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome-specific risk band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(RiskLevel::Low),
            "moderate" => Some(RiskLevel::Moderate),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Probability cut points for one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Probability at or above which risk is moderate
    pub moderate: f64,
    /// Probability at or above which risk is high
    pub high: f64,
}

impl RiskThresholds {
    pub fn classify(&self, probability: f64) -> RiskLevel {
        if probability >= self.high {
            RiskLevel::High
        } else if probability >= self.moderate {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }
}

/// Scored result for one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRisk {
    pub outcome: RiskOutcome,
    /// Probability in `[0, 0.95]`
    pub probability: f64,
    /// Odds relative to the same patient with independent mobility and
    /// fewer than three immobile days
    pub odds_ratio_vs_reference: f64,
    pub risk_level: RiskLevel,
    /// Factor names added to the score, in evaluation order
    pub contributing_factors: Vec<String>,
    /// Log-odds score including the intercept
    pub log_odds: f64,
}

impl OutcomeRisk {
    pub fn has_factor(&self, name: &str) -> bool {
        self.contributing_factors.iter().any(|f| f == name)
    }
}

/// Immutable risk assessment for one patient at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub assessed_at: DateTime<Utc>,
    pub deconditioning: OutcomeRisk,
    pub vte: OutcomeRisk,
    pub falls: OutcomeRisk,
    pub pressure_injury: OutcomeRisk,
    pub baseline: PrescriptionBaseline,
    pub prescription: AdjustedPrescription,
}

impl RiskAssessment {
    /// Result for a single outcome.
    pub fn outcome(&self, outcome: RiskOutcome) -> &OutcomeRisk {
        match outcome {
            RiskOutcome::Deconditioning => &self.deconditioning,
            RiskOutcome::Vte => &self.vte,
            RiskOutcome::Falls => &self.falls,
            RiskOutcome::PressureInjury => &self.pressure_injury,
        }
    }

    /// All four outcomes in [`RiskOutcome::ALL`] order.
    pub fn outcomes(&self) -> [&OutcomeRisk; 4] {
        [
            &self.deconditioning,
            &self.vte,
            &self.falls,
            &self.pressure_injury,
        ]
    }

    /// Highest band across the four outcomes.
    pub fn highest_level(&self) -> RiskLevel {
        self.outcomes()
            .iter()
            .map(|o| o.risk_level)
            .max()
            .unwrap_or(RiskLevel::Low)
    }
}
