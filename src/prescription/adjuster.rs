//! Adaptive prescription adjuster.
//!
//! Redistributes the baseline's daily energy (`watts × minutes × sessions`)
//! across duration, cadence and resistance. The diagnosis pass and the
//! medication pass both back-solve power from the conserved energy, so
//! energy is exact through both passes. The final clamp pass runs last and
//! may move energy for extreme inputs; [`AdjustmentTrace::energy_preserved`]
//! records when that happens.

use super::profiles::{medication_profile, DiagnosisCategory};
use super::types::{
    daily_energy, resistance_for, AdjustedPrescription, AdjustmentTrace, PassSnapshot,
    PrescriptionBaseline, BASELINE_RESISTANCE_RANGE, DURATION_RANGE_MIN, POWER_RANGE_WATTS,
    RESISTANCE_RANGE, RPM_RANGE,
};
use crate::metrics::stats::round_to_step;
use crate::patient::{MedicationClass, PatientFeatureFlags};

/// Medication deltas never push duration below this.
pub const MEDICATION_DURATION_FLOOR_MIN: u32 = 5;
/// Medication deltas never push cadence below this.
pub const MEDICATION_RPM_FLOOR: u32 = 15;

/// Final power is reported to this step.
const POWER_STEP_WATTS: f64 = 0.1;

/// Applies diagnosis and medication adjustments to a baseline prescription.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrescriptionAdjuster;

impl PrescriptionAdjuster {
    pub fn new() -> Self {
        Self
    }

    /// Adjust for a patient, inferring the diagnosis category from the
    /// free-text diagnosis and flags.
    pub fn adjust_for_patient(
        &self,
        baseline: &PrescriptionBaseline,
        flags: &PatientFeatureFlags,
        diagnosis_text: Option<&str>,
    ) -> AdjustedPrescription {
        let category = DiagnosisCategory::infer(flags, diagnosis_text);
        self.adjust(baseline, category, &flags.medication_classes)
    }

    /// Run the diagnosis, medication and clamp passes.
    pub fn adjust(
        &self,
        baseline: &PrescriptionBaseline,
        diagnosis: DiagnosisCategory,
        medications: &[MedicationClass],
    ) -> AdjustedPrescription {
        let sessions = baseline.sessions_per_day.max(1);
        let baseline_energy = daily_energy(
            baseline.watt_goal,
            baseline.duration_min_per_session,
            sessions,
        );
        let energy_per_session = baseline_energy / sessions as f64;

        let diagnosis_profile = diagnosis.profile();
        let mut rationale: Vec<String> = Vec::new();
        let mut monitoring: Vec<String> = Vec::new();
        let mut stop_criteria: Vec<String> = Vec::new();
        extend_unique(&mut rationale, diagnosis_profile.rationale);
        extend_unique(&mut monitoring, diagnosis_profile.monitoring);
        extend_unique(&mut stop_criteria, diagnosis_profile.stop_criteria);

        // Diagnosis pass
        let mut duration = scale_round(
            baseline.duration_min_per_session,
            diagnosis_profile.duration_multiplier,
        );
        let mut rpm = scale_round(baseline.rpm, diagnosis_profile.rpm_multiplier);
        let diagnosis_pass = solve_pass(
            energy_per_session,
            duration,
            rpm,
            sessions,
            diagnosis_profile.resistance_multiplier,
        );

        // Medication pass
        let mut seen = Vec::new();
        for class in medications {
            if seen.contains(class) {
                continue;
            }
            seen.push(*class);

            let profile = medication_profile(*class);
            if profile.duration_delta_min > 0 {
                duration = duration
                    .saturating_sub(profile.duration_delta_min)
                    .max(MEDICATION_DURATION_FLOOR_MIN);
            }
            if profile.rpm_delta > 0 {
                rpm = rpm.saturating_sub(profile.rpm_delta).max(MEDICATION_RPM_FLOOR);
            }
            if profile.resistance_focus {
                rationale.push(format!(
                    "Prefer strength (resistance) over cadence for {}",
                    class
                ));
            }
            extend_unique(&mut rationale, profile.rationale);
            extend_unique(&mut monitoring, profile.monitoring);
            extend_unique(&mut stop_criteria, profile.stop_criteria);
        }
        let medication_pass = solve_pass(
            energy_per_session,
            duration,
            rpm,
            sessions,
            diagnosis_profile.resistance_multiplier,
        );

        // Final clamp pass
        let final_duration = medication_pass
            .duration_min
            .clamp(DURATION_RANGE_MIN.0, DURATION_RANGE_MIN.1);
        let final_rpm = medication_pass.rpm.clamp(RPM_RANGE.0, RPM_RANGE.1);
        let final_watts = round_to_step(medication_pass.watts, POWER_STEP_WATTS)
            .clamp(POWER_RANGE_WATTS.0, POWER_RANGE_WATTS.1);
        let final_resistance = medication_pass
            .resistance_level
            .clamp(RESISTANCE_RANGE.0, RESISTANCE_RANGE.1);
        let total_daily_energy = daily_energy(final_watts, final_duration, sessions);
        // Rounding power to the step may move energy by half a step per minute
        let rounding_slack = POWER_STEP_WATTS / 2.0 * final_duration as f64 * sessions as f64;
        let energy_preserved =
            (total_daily_energy - baseline_energy).abs() <= rounding_slack + 1e-6;

        if !energy_preserved {
            tracing::debug!(
                baseline_energy,
                total_daily_energy,
                diagnosis = %diagnosis,
                "Final clamp moved prescription energy"
            );
        }

        dedup_preserving_order(&mut rationale);

        AdjustedPrescription {
            watt_goal: final_watts,
            duration_min_per_session: final_duration,
            sessions_per_day: sessions,
            resistance_level: final_resistance,
            rpm: final_rpm,
            total_daily_energy,
            diagnosis_category: diagnosis,
            medication_classes: seen,
            rationale,
            monitoring_params: monitoring,
            stop_criteria,
            trace: AdjustmentTrace {
                baseline_energy,
                diagnosis_pass,
                medication_pass,
                energy_preserved,
            },
        }
    }
}

/// Back-solve power from per-session energy and derive resistance.
fn solve_pass(
    energy_per_session: f64,
    duration_min: u32,
    rpm: u32,
    sessions: u32,
    resistance_multiplier: f64,
) -> PassSnapshot {
    let duration_min = duration_min.max(1);
    let watts = energy_per_session / duration_min as f64;
    PassSnapshot {
        watts,
        duration_min,
        rpm,
        resistance_level: resistance_for(
            watts,
            rpm,
            resistance_multiplier,
            BASELINE_RESISTANCE_RANGE,
        ),
        energy: daily_energy(watts, duration_min, sessions),
    }
}

fn scale_round(value: u32, multiplier: f64) -> u32 {
    ((value as f64 * multiplier).round() as u32).max(1)
}

fn extend_unique(target: &mut Vec<String>, items: &[&str]) {
    for item in items {
        if !target.iter().any(|existing| existing == item) {
            target.push((*item).to_string());
        }
    }
}

fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen: Vec<String> = Vec::with_capacity(items.len());
    items.retain(|item| {
        if seen.contains(item) {
            false
        } else {
            seen.push(item.clone());
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::{LevelOfCare, MobilityCategory};
    use crate::prescription::types::BaselineTrace;

    fn baseline(watts: f64, duration: u32, sessions: u32, rpm: u32) -> PrescriptionBaseline {
        PrescriptionBaseline {
            watt_goal: watts,
            duration_min_per_session: duration,
            sessions_per_day: sessions,
            resistance_level: resistance_for(watts, rpm, 1.0, BASELINE_RESISTANCE_RANGE),
            rpm,
            total_daily_energy: daily_energy(watts, duration, sessions),
            rationale: Vec::new(),
            monitoring_params: Vec::new(),
            stop_criteria: Vec::new(),
            trace: BaselineTrace {
                used_wkg: None,
                bmi: None,
                age: None,
                level_of_care: LevelOfCare::Ward,
                mobility: MobilityCategory::Walker,
                raw_watts: watts,
            },
        }
    }

    #[test]
    fn test_orthopedic_energy_conservation() {
        let base = baseline(30.0, 15, 2, 40);
        let adjusted = PrescriptionAdjuster::new().adjust(&base, DiagnosisCategory::Orthopedic, &[]);

        let pass = adjusted.trace.diagnosis_pass;
        assert_eq!(pass.duration_min, 19);
        assert_eq!(pass.rpm, 46);
        assert!((pass.watts * 19.0 * 2.0 - 900.0).abs() < 1e-9);
        assert!((pass.energy - 900.0).abs() < 1e-9);
        assert_eq!(adjusted.trace.baseline_energy, 900.0);
    }

    #[test]
    fn test_general_diagnosis_is_identity() {
        let base = baseline(40.0, 20, 2, 50);
        let adjusted = PrescriptionAdjuster::new().adjust(&base, DiagnosisCategory::General, &[]);

        assert_eq!(adjusted.duration_min_per_session, 20);
        assert_eq!(adjusted.rpm, 50);
        assert!((adjusted.watt_goal - 40.0).abs() < 1e-9);
        assert_eq!(adjusted.resistance_level, 4);
        assert!(adjusted.trace.energy_preserved);
    }

    #[test]
    fn test_medication_pass_conserves_energy() {
        let base = baseline(40.0, 20, 2, 50);
        let adjusted = PrescriptionAdjuster::new().adjust(
            &base,
            DiagnosisCategory::General,
            &[MedicationClass::Sedating, MedicationClass::Diuretic],
        );

        let pass = adjusted.trace.medication_pass;
        // 20 - 3 - 2 = 15 minutes, 50 - 5 = 45 rpm
        assert_eq!(pass.duration_min, 15);
        assert_eq!(pass.rpm, 45);
        assert!((pass.energy - 1600.0).abs() < 1e-9);
        assert!(adjusted
            .monitoring_params
            .iter()
            .any(|m| m == "Orthostatic blood pressure"));
    }

    #[test]
    fn test_medication_floors() {
        let base = baseline(25.0, 6, 2, 16);
        let adjusted = PrescriptionAdjuster::new().adjust(
            &base,
            DiagnosisCategory::General,
            &[MedicationClass::Sedating, MedicationClass::BetaBlocker],
        );

        assert_eq!(adjusted.trace.medication_pass.duration_min, 5);
        assert_eq!(adjusted.trace.medication_pass.rpm, 15);
    }

    #[test]
    fn test_resistance_focus_adds_rationale_note() {
        let base = baseline(40.0, 20, 2, 50);
        let adjusted = PrescriptionAdjuster::new().adjust(
            &base,
            DiagnosisCategory::General,
            &[MedicationClass::Corticosteroid],
        );

        assert!(adjusted
            .rationale
            .iter()
            .any(|r| r.contains("Prefer strength") && r.contains("corticosteroid")));
    }

    #[test]
    fn test_final_clamp_can_break_energy_conservation() {
        // 70 W * 30 min * 2 = 4200; delirium shortens to 24 min -> 87.5 W
        let base = baseline(70.0, 30, 2, 60);
        let adjusted = PrescriptionAdjuster::new().adjust(&base, DiagnosisCategory::Delirium, &[]);

        assert!((adjusted.trace.diagnosis_pass.energy - 4200.0).abs() < 1e-9);
        assert_eq!(adjusted.watt_goal, 70.0);
        assert!(adjusted.total_daily_energy < 4200.0);
        assert!(!adjusted.trace.energy_preserved);
    }

    #[test]
    fn test_output_ranges_for_all_categories() {
        let adjuster = PrescriptionAdjuster::new();
        let bases = [
            baseline(25.0, 10, 2, 30),
            baseline(50.0, 20, 2, 50),
            baseline(70.0, 30, 2, 60),
        ];

        for base in &bases {
            for diagnosis in DiagnosisCategory::ALL {
                let adjusted = adjuster.adjust(base, diagnosis, &MedicationClass::ALL);
                assert!((5..=30).contains(&adjusted.duration_min_per_session));
                assert!((1..=6).contains(&adjusted.resistance_level));
                assert!((15..=60).contains(&adjusted.rpm));
                assert!((20.0..=70.0).contains(&adjusted.watt_goal));
                assert!((1..=9).contains(&adjusted.trace.diagnosis_pass.resistance_level));
            }
        }
    }

    #[test]
    fn test_lists_are_deduplicated() {
        let base = baseline(40.0, 20, 2, 50);
        let adjusted = PrescriptionAdjuster::new().adjust(
            &base,
            DiagnosisCategory::FrailElderly,
            &[MedicationClass::BetaBlocker, MedicationClass::BetaBlocker],
        );

        let rpe_count = adjusted
            .monitoring_params
            .iter()
            .filter(|m| m.as_str() == "RPE (Borg)")
            .count();
        assert_eq!(rpe_count, 1);
        assert_eq!(adjusted.medication_classes, vec![MedicationClass::BetaBlocker]);
    }
}
