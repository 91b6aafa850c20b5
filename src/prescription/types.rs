//! Prescription data types.

use serde::{Deserialize, Serialize};

use super::profiles::DiagnosisCategory;
use crate::patient::{LevelOfCare, MedicationClass, MobilityCategory};

/// Ergometer constant in `power = K × resistance × rpm`.
pub const POWER_CONSTANT_K: f64 = 0.2;

/// Final bounds applied after all adjustments.
pub const DURATION_RANGE_MIN: (u32, u32) = (5, 30);
pub const RESISTANCE_RANGE: (u8, u8) = (1, 6);
pub const BASELINE_RESISTANCE_RANGE: (u8, u8) = (1, 9);
pub const RPM_RANGE: (u32, u32) = (15, 60);
pub const POWER_RANGE_WATTS: (f64, f64) = (20.0, 70.0);

/// Energy a prescription delivers per day (`watts × minutes × sessions`).
pub fn daily_energy(watts: f64, duration_min: u32, sessions_per_day: u32) -> f64 {
    watts * duration_min as f64 * sessions_per_day as f64
}

/// Resistance level that yields `watts` at `rpm`, scaled by a category
/// preference and rounded into `range`.
pub fn resistance_for(watts: f64, rpm: u32, multiplier: f64, range: (u8, u8)) -> u8 {
    if rpm == 0 {
        return range.0;
    }
    let raw = watts / (POWER_CONSTANT_K * rpm as f64) * multiplier;
    raw.round().clamp(range.0 as f64, range.1 as f64) as u8
}

/// Values fed into the baseline estimate, kept for audit and testing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineTrace {
    /// Watts per kilogram after all multipliers and caps
    pub used_wkg: Option<f64>,
    /// Body-mass index, if computable
    pub bmi: Option<f64>,
    pub age: Option<u32>,
    pub level_of_care: LevelOfCare,
    pub mobility: MobilityCategory,
    /// Watts before the safety margin and clamp
    pub raw_watts: f64,
}

/// Baseline exercise prescription before diagnosis/medication adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionBaseline {
    pub watt_goal: f64,
    pub duration_min_per_session: u32,
    pub sessions_per_day: u32,
    /// Ergometer resistance level (1-9)
    pub resistance_level: u8,
    pub rpm: u32,
    pub total_daily_energy: f64,
    pub rationale: Vec<String>,
    pub monitoring_params: Vec<String>,
    pub stop_criteria: Vec<String>,
    pub trace: BaselineTrace,
}

impl PrescriptionBaseline {
    /// Recompute the conserved energy from the current parameters.
    pub fn energy(&self) -> f64 {
        daily_energy(self.watt_goal, self.duration_min_per_session, self.sessions_per_day)
    }
}

/// Parameters after one adjustment pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassSnapshot {
    pub watts: f64,
    pub duration_min: u32,
    pub rpm: u32,
    pub resistance_level: u8,
    pub energy: f64,
}

/// Energy bookkeeping across the adjustment passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentTrace {
    pub baseline_energy: f64,
    pub diagnosis_pass: PassSnapshot,
    pub medication_pass: PassSnapshot,
    /// False when the final clamp moved energy away from the baseline
    pub energy_preserved: bool,
}

/// Prescription after diagnosis and medication adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedPrescription {
    pub watt_goal: f64,
    pub duration_min_per_session: u32,
    pub sessions_per_day: u32,
    /// Ergometer resistance level (1-6 after adjustment)
    pub resistance_level: u8,
    pub rpm: u32,
    pub total_daily_energy: f64,
    pub diagnosis_category: DiagnosisCategory,
    pub medication_classes: Vec<MedicationClass>,
    pub rationale: Vec<String>,
    pub monitoring_params: Vec<String>,
    pub stop_criteria: Vec<String>,
    pub trace: AdjustmentTrace,
}
