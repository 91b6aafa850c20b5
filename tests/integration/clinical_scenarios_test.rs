//! Integration tests for risk scoring and prescription across patients.

use mobility_cds::patient::{
    extract_features, CognitiveCategory, LevelOfCare, MobilityCategory, PatientProfile,
};
use mobility_cds::prescription::{
    BaselineEstimator, BaselineTrace, DiagnosisCategory, PrescriptionAdjuster, PrescriptionBaseline,
};
use mobility_cds::risk::{RiskLevel, RiskModel};
use uuid::Uuid;

fn patient_grid() -> Vec<PatientProfile> {
    let mut patients = Vec::new();
    for mobility in MobilityCategory::ALL {
        for level in [LevelOfCare::Ward, LevelOfCare::Stepdown, LevelOfCare::Icu] {
            for (age, weight) in [(45, Some(95.0)), (72, None), (88, Some(48.0))] {
                let mut profile = PatientProfile::new(Uuid::new_v4());
                profile.age = Some(age);
                profile.weight_kg = weight;
                profile.height_cm = Some(170.0);
                profile.mobility_status = Some(mobility);
                profile.level_of_care = Some(level);
                profile.cognitive_status = Some(CognitiveCategory::MildImpairment);
                profile.days_immobile = Some(age as u32 % 9);
                profile.admission_diagnosis = Some("Hip fracture".to_string());
                profile.medications = vec!["metoprolol".to_string(), "furosemide".to_string()];
                patients.push(profile);
            }
        }
    }
    patients
}

/// Test the ICU bed-bound delirium patient from JSON input.
#[test]
fn test_icu_bedbound_delirium_patient() {
    let json = r#"{
        "id": "7b0c9d2e-4f8a-4c55-9a4e-3f1d2b6a8c10",
        "age": 82,
        "level_of_care": "icu",
        "mobility_status": "bedbound",
        "cognitive_status": "delirium_dementia",
        "days_immobile": 5,
        "on_vte_prophylaxis": false
    }"#;
    let profile: PatientProfile = serde_json::from_str(json).unwrap();

    let assessment = RiskModel::new().assess(&profile);

    assert_eq!(assessment.deconditioning.risk_level, RiskLevel::High);
    assert_eq!(assessment.falls.risk_level, RiskLevel::High);
    for factor in ["mobility:bedbound", "icu", "age_80+", "cog_delirium", "immobile_ge3"] {
        assert!(
            assessment.deconditioning.has_factor(factor) || assessment.falls.has_factor(factor),
            "missing factor {}",
            factor
        );
    }
}

/// Test the orthopedic diagnosis pass conserves 900 units of energy.
#[test]
fn test_orthopedic_energy_scenario() {
    let baseline = PrescriptionBaseline {
        watt_goal: 30.0,
        duration_min_per_session: 15,
        sessions_per_day: 2,
        resistance_level: 4,
        rpm: 40,
        total_daily_energy: 900.0,
        rationale: Vec::new(),
        monitoring_params: Vec::new(),
        stop_criteria: Vec::new(),
        trace: BaselineTrace {
            used_wkg: None,
            bmi: None,
            age: None,
            level_of_care: LevelOfCare::Ward,
            mobility: MobilityCategory::Walker,
            raw_watts: 30.0,
        },
    };

    let adjusted = PrescriptionAdjuster::new().adjust(&baseline, DiagnosisCategory::Orthopedic, &[]);
    let pass = adjusted.trace.diagnosis_pass;

    assert_eq!(pass.duration_min, 19);
    assert!((pass.watts * 19.0 * 2.0 - 900.0).abs() < 1e-6);
}

/// Test probabilities and prescription parameters stay in range.
#[test]
fn test_outputs_stay_in_range() {
    let model = RiskModel::new();

    for profile in patient_grid() {
        let assessment = model.assess(&profile);

        for outcome in assessment.outcomes() {
            assert!((0.0..=0.95).contains(&outcome.probability));
        }

        assert!((1..=9).contains(&assessment.baseline.resistance_level));

        let rx = &assessment.prescription;
        assert!((5..=30).contains(&rx.duration_min_per_session));
        assert!((1..=6).contains(&rx.resistance_level));
        assert!((15..=60).contains(&rx.rpm));
        assert!((20.0..=70.0).contains(&rx.watt_goal));
    }
}

/// Test the diagnosis pass conserves baseline energy for every category.
#[test]
fn test_diagnosis_pass_conserves_energy() {
    let estimator = BaselineEstimator::new();
    let adjuster = PrescriptionAdjuster::new();

    for profile in patient_grid() {
        let flags = extract_features(&profile);
        let baseline = estimator.estimate(&flags);

        for category in DiagnosisCategory::ALL {
            let adjusted = adjuster.adjust(&baseline, category, &flags.medication_classes);
            let energy = adjusted.trace.diagnosis_pass.energy;
            assert!(
                (energy - baseline.energy()).abs() < 1e-6,
                "{:?}: {} vs {}",
                category,
                energy,
                baseline.energy()
            );
        }
    }
}

/// Test impaired mobility never scores below the independent reference.
#[test]
fn test_odds_ratio_at_least_reference() {
    let model = RiskModel::new();

    for profile in patient_grid() {
        let flags = extract_features(&profile);
        if !flags.has_impaired_mobility() {
            continue;
        }
        let assessment = model.assess(&profile);
        for outcome in assessment.outcomes() {
            assert!(outcome.odds_ratio_vs_reference >= 1.0 - 1e-12);
        }
    }
}
