//! Baseline prescription estimator.
//!
//! Seeds a watts-per-kilogram target from the mobility band, scales it for
//! care setting, age and sex, caps it for extreme BMI, applies the safety
//! margin and clamps to the ergometer's usable range. Duration and session
//! count come from a fixed (level of care, mobility) table.

use super::types::{
    daily_energy, resistance_for, BaselineTrace, PrescriptionBaseline, BASELINE_RESISTANCE_RANGE,
};
use crate::patient::{AgeBand, LevelOfCare, MobilityCategory, PatientFeatureFlags, Sex};

/// Multiplier applied after all adjustments.
pub const SAFETY_MARGIN: f64 = 1.4;
/// Output watt clamp.
pub const BASELINE_WATT_RANGE: (f64, f64) = (25.0, 70.0);

/// Target W/kg band `(low, high)` per mobility category.
pub fn wkg_band(mobility: MobilityCategory) -> (f64, f64) {
    match mobility {
        MobilityCategory::Independent => (0.40, 0.50),
        MobilityCategory::Walker => (0.32, 0.40),
        MobilityCategory::Assisted => (0.26, 0.34),
        MobilityCategory::Chair => (0.20, 0.28),
        MobilityCategory::Bedbound => (0.14, 0.22),
    }
}

/// Watts used when body weight is unknown.
pub fn fallback_watts(mobility: MobilityCategory) -> f64 {
    match mobility {
        MobilityCategory::Independent => 35.0,
        MobilityCategory::Walker => 30.0,
        MobilityCategory::Assisted => 26.0,
        MobilityCategory::Chair => 22.0,
        MobilityCategory::Bedbound => 18.0,
    }
}

/// Starting cadence per mobility category.
pub fn baseline_rpm(mobility: MobilityCategory) -> u32 {
    match mobility {
        MobilityCategory::Independent => 50,
        MobilityCategory::Walker => 45,
        MobilityCategory::Assisted => 40,
        MobilityCategory::Chair => 35,
        MobilityCategory::Bedbound => 30,
    }
}

/// `(minutes per session, sessions per day)` lookup.
pub fn dosing_table(level_of_care: LevelOfCare, mobility: MobilityCategory) -> (u32, u32) {
    use MobilityCategory::*;
    match (level_of_care, mobility) {
        (LevelOfCare::Icu, Independent | Walker) => (15, 2),
        (LevelOfCare::Icu, Assisted) => (12, 2),
        (LevelOfCare::Icu, Chair | Bedbound) => (10, 2),
        (LevelOfCare::Stepdown, Independent) => (20, 2),
        (LevelOfCare::Stepdown, Walker | Assisted) => (15, 2),
        (LevelOfCare::Stepdown, Chair) => (12, 2),
        (LevelOfCare::Stepdown, Bedbound) => (10, 2),
        (LevelOfCare::Ward, Independent | Walker) => (20, 2),
        (LevelOfCare::Ward, Assisted | Chair) => (15, 2),
        (LevelOfCare::Ward, Bedbound) => (12, 2),
    }
}

fn level_of_care_multiplier(level: LevelOfCare) -> f64 {
    match level {
        LevelOfCare::Icu => 0.75,
        LevelOfCare::Stepdown => 0.85,
        LevelOfCare::Ward => 1.0,
    }
}

fn age_multiplier(band: AgeBand) -> f64 {
    match band {
        AgeBand::Age80Plus => 0.80,
        AgeBand::Age65To79 => 0.90,
        AgeBand::Under65 | AgeBand::Unknown => 1.0,
    }
}

fn sex_multiplier(sex: Option<Sex>) -> f64 {
    match sex {
        Some(Sex::Female) => 0.90,
        Some(Sex::Male) | None => 1.0,
    }
}

/// W/kg ceiling for extreme body-mass index.
pub fn bmi_cap(bmi: Option<f64>) -> Option<f64> {
    match bmi {
        Some(b) if b >= 40.0 => Some(0.28),
        Some(b) if b >= 35.0 => Some(0.30),
        Some(b) if b < 18.5 => Some(0.26),
        _ => None,
    }
}

/// Estimates a baseline prescription from patient flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineEstimator;

impl BaselineEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Compute the baseline prescription. Total for any input.
    pub fn estimate(&self, flags: &PatientFeatureFlags) -> PrescriptionBaseline {
        let multiplier = level_of_care_multiplier(flags.level_of_care)
            * age_multiplier(flags.age_band)
            * sex_multiplier(flags.sex);

        let mut rationale = Vec::new();

        let (used_wkg, raw_watts) = match flags.weight_kg {
            Some(weight) => {
                let (low, high) = wkg_band(flags.mobility);
                let mut wkg = (low + high) / 2.0 * multiplier;
                if let Some(cap) = bmi_cap(flags.bmi) {
                    if wkg > cap {
                        rationale.push(format!("BMI-based ceiling of {cap:.2} W/kg applied"));
                        wkg = cap;
                    }
                }
                rationale.push(format!(
                    "Target {:.2} W/kg for {} mobility",
                    wkg, flags.mobility
                ));
                (Some(wkg), wkg * weight)
            }
            None => {
                rationale.push(format!(
                    "Body weight unknown: fixed {} W table for {} mobility",
                    fallback_watts(flags.mobility),
                    flags.mobility
                ));
                (None, fallback_watts(flags.mobility) * multiplier)
            }
        };

        let watts = (raw_watts * SAFETY_MARGIN)
            .clamp(BASELINE_WATT_RANGE.0, BASELINE_WATT_RANGE.1)
            .round();

        let (duration, sessions) = dosing_table(flags.level_of_care, flags.mobility);
        let rpm = baseline_rpm(flags.mobility);
        let resistance = resistance_for(watts, rpm, 1.0, BASELINE_RESISTANCE_RANGE);

        match flags.level_of_care {
            LevelOfCare::Icu => rationale.push("ICU level of care: intensity reduced".to_string()),
            LevelOfCare::Stepdown => {
                rationale.push("Step-down level of care: intensity reduced".to_string())
            }
            LevelOfCare::Ward => {}
        }
        if flags.age_band == AgeBand::Age80Plus {
            rationale.push("Age 80+: intensity reduced".to_string());
        }

        let mut monitoring_params = vec![
            "Heart rate".to_string(),
            "SpO2".to_string(),
            "RPE (Borg)".to_string(),
        ];
        let mut stop_criteria = vec![
            "SpO2 < 88%".to_string(),
            "Heart rate rise > 30 bpm above resting".to_string(),
            "SBP > 180 mmHg or drop > 20 mmHg".to_string(),
            "Chest pain, dizziness or new confusion".to_string(),
        ];
        if flags.level_of_care == LevelOfCare::Icu {
            monitoring_params.push("Mean arterial pressure".to_string());
            stop_criteria.push("MAP < 65 mmHg".to_string());
        }

        let trace = BaselineTrace {
            used_wkg,
            bmi: flags.bmi,
            age: flags.age,
            level_of_care: flags.level_of_care,
            mobility: flags.mobility,
            raw_watts,
        };

        tracing::debug!(
            used_wkg = ?trace.used_wkg,
            bmi = ?trace.bmi,
            age = ?trace.age,
            level_of_care = %trace.level_of_care,
            mobility = %trace.mobility,
            watts,
            "Baseline prescription estimated"
        );

        PrescriptionBaseline {
            watt_goal: watts,
            duration_min_per_session: duration,
            sessions_per_day: sessions,
            resistance_level: resistance,
            rpm,
            total_daily_energy: daily_energy(watts, duration, sessions),
            rationale,
            monitoring_params,
            stop_criteria,
            trace,
        }
    }
}
