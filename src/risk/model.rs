//! Weighted-logit risk model.
//!
//! Every weight is `ln(RR)` for a hand-authored relative-risk multiplier.
//! An outcome's log-odds is
//!
//! ```text
//! logit(baseline) + w_mobility + Σ common + Σ outcome-specific [+ interaction]
//! ```
//!
//! and the probability is `sigmoid(log_odds)` capped at 0.95. The reference
//! score reruns the same model with mobility forced to independent and the
//! immobility flags cleared, giving an odds ratio for explainability.

use chrono::Utc;
use uuid::Uuid;

use super::types::{OutcomeRisk, RiskAssessment, RiskOutcome, RiskThresholds, MAX_PROBABILITY};
use crate::patient::{
    extract_features, AgeBand, CognitiveCategory, LevelOfCare, MedicationClass, MobilityCategory,
    PatientFeatureFlags, PatientProfile,
};
use crate::prescription::{BaselineEstimator, PrescriptionAdjuster};

/// Outcome-specific binary features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskFactor {
    ImmobileGe7,
    CognitiveDelirium,
    CognitiveMild,
    SedatingMedication,
    DiureticMedication,
    PriorFalls,
    Parkinsons,
    Stroke,
    Neuropathy,
    Incontinence,
    HeartFailure,
    Copd,
    Malnutrition,
    Cancer,
    Steroid,
    Diabetes,
    NoVteProphylaxis,
    Anticoagulated,
    PriorVte,
    RecentSurgery,
    Obese,
    Underweight,
}

impl RiskFactor {
    /// Name reported in `contributing_factors`.
    pub fn name(&self) -> &'static str {
        match self {
            RiskFactor::ImmobileGe7 => "immobile_ge7",
            RiskFactor::CognitiveDelirium => "cog_delirium",
            RiskFactor::CognitiveMild => "cog_mild",
            RiskFactor::SedatingMedication => "sedating_meds",
            RiskFactor::DiureticMedication => "diuretic",
            RiskFactor::PriorFalls => "prior_falls",
            RiskFactor::Parkinsons => "parkinsons",
            RiskFactor::Stroke => "stroke",
            RiskFactor::Neuropathy => "neuropathy",
            RiskFactor::Incontinence => "incontinence",
            RiskFactor::HeartFailure => "heart_failure",
            RiskFactor::Copd => "copd",
            RiskFactor::Malnutrition => "malnutrition",
            RiskFactor::Cancer => "cancer",
            RiskFactor::Steroid => "steroid",
            RiskFactor::Diabetes => "diabetes",
            RiskFactor::NoVteProphylaxis => "no_vte_prophylaxis",
            RiskFactor::Anticoagulated => "anticoagulated",
            RiskFactor::PriorVte => "prior_vte",
            RiskFactor::RecentSurgery => "recent_surgery",
            RiskFactor::Obese => "obesity",
            RiskFactor::Underweight => "underweight",
        }
    }

    pub fn applies(&self, flags: &PatientFeatureFlags) -> bool {
        match self {
            RiskFactor::ImmobileGe7 => flags.immobile_ge7,
            RiskFactor::CognitiveDelirium => flags.cognitive == CognitiveCategory::DeliriumDementia,
            RiskFactor::CognitiveMild => flags.cognitive == CognitiveCategory::MildImpairment,
            RiskFactor::SedatingMedication => flags.sedating_meds,
            RiskFactor::DiureticMedication => {
                flags.medication_classes.contains(&MedicationClass::Diuretic)
            }
            RiskFactor::PriorFalls => flags.prior_falls,
            RiskFactor::Parkinsons => flags.parkinsons,
            RiskFactor::Stroke => flags.stroke,
            RiskFactor::Neuropathy => flags.neuropathy,
            RiskFactor::Incontinence => flags.incontinence,
            RiskFactor::HeartFailure => flags.heart_failure,
            RiskFactor::Copd => flags.copd,
            RiskFactor::Malnutrition => flags.malnutrition,
            RiskFactor::Cancer => flags.cancer,
            RiskFactor::Steroid => flags.steroid,
            RiskFactor::Diabetes => flags.diabetes,
            RiskFactor::NoVteProphylaxis => !flags.on_vte_prophylaxis && !flags.anticoagulant,
            RiskFactor::Anticoagulated => flags.anticoagulant,
            RiskFactor::PriorVte => flags.prior_vte,
            RiskFactor::RecentSurgery => flags.recent_surgery,
            RiskFactor::Obese => flags.obese,
            RiskFactor::Underweight => flags.underweight,
        }
    }
}

/// Relative risks shared by every outcome, with per-outcome magnitudes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommonRelativeRisks {
    pub age_65_79: f64,
    pub age_80_plus: f64,
    pub icu: f64,
    pub stepdown: f64,
    pub immobile_ge3: f64,
}

/// Fixed parameters for one outcome.
#[derive(Debug, Clone, Copy)]
pub struct OutcomeParameters {
    pub outcome: RiskOutcome,
    /// Probability for an independent, low-risk patient
    pub baseline_probability: f64,
    pub thresholds: RiskThresholds,
    /// Relative risk per mobility category, indexed in [`MobilityCategory::ALL`] order
    pub mobility: [f64; 5],
    pub common: CommonRelativeRisks,
    pub specific: &'static [(RiskFactor, f64)],
    /// `(mobility, cognition)` interaction relative risks
    pub interactions: &'static [(MobilityCategory, CognitiveCategory, f64)],
}

const DECONDITIONING: OutcomeParameters = OutcomeParameters {
    outcome: RiskOutcome::Deconditioning,
    baseline_probability: 0.10,
    thresholds: RiskThresholds {
        moderate: 0.20,
        high: 0.40,
    },
    mobility: [1.0, 1.5, 2.0, 2.5, 3.5],
    common: CommonRelativeRisks {
        age_65_79: 1.3,
        age_80_plus: 1.6,
        icu: 2.0,
        stepdown: 1.4,
        immobile_ge3: 1.8,
    },
    specific: &[
        (RiskFactor::ImmobileGe7, 1.4),
        (RiskFactor::CognitiveDelirium, 1.5),
        (RiskFactor::CognitiveMild, 1.2),
        (RiskFactor::HeartFailure, 1.3),
        (RiskFactor::Copd, 1.3),
        (RiskFactor::Malnutrition, 1.5),
        (RiskFactor::Cancer, 1.2),
        (RiskFactor::Steroid, 1.3),
        (RiskFactor::SedatingMedication, 1.2),
    ],
    interactions: &[],
};

const VTE: OutcomeParameters = OutcomeParameters {
    outcome: RiskOutcome::Vte,
    baseline_probability: 0.03,
    thresholds: RiskThresholds {
        moderate: 0.05,
        high: 0.10,
    },
    mobility: [1.0, 1.2, 1.5, 1.8, 2.5],
    common: CommonRelativeRisks {
        age_65_79: 1.3,
        age_80_plus: 1.5,
        icu: 1.8,
        stepdown: 1.3,
        immobile_ge3: 2.0,
    },
    specific: &[
        (RiskFactor::NoVteProphylaxis, 1.5),
        (RiskFactor::Anticoagulated, 0.6),
        (RiskFactor::PriorVte, 2.5),
        (RiskFactor::Cancer, 1.8),
        (RiskFactor::RecentSurgery, 2.0),
        (RiskFactor::Obese, 1.4),
        (RiskFactor::Stroke, 1.5),
        (RiskFactor::HeartFailure, 1.3),
        (RiskFactor::Steroid, 1.2),
    ],
    interactions: &[],
};

const FALLS: OutcomeParameters = OutcomeParameters {
    outcome: RiskOutcome::Falls,
    baseline_probability: 0.05,
    thresholds: RiskThresholds {
        moderate: 0.10,
        high: 0.25,
    },
    // Chair and bed-bound patients stand less often, so their fall risk
    // sits below assisted ambulators.
    mobility: [1.0, 2.0, 2.2, 1.8, 1.2],
    common: CommonRelativeRisks {
        age_65_79: 1.4,
        age_80_plus: 1.8,
        icu: 1.3,
        stepdown: 1.2,
        immobile_ge3: 1.2,
    },
    specific: &[
        (RiskFactor::CognitiveDelirium, 2.5),
        (RiskFactor::CognitiveMild, 1.5),
        (RiskFactor::SedatingMedication, 1.7),
        (RiskFactor::PriorFalls, 2.5),
        (RiskFactor::Parkinsons, 1.8),
        (RiskFactor::Stroke, 1.5),
        (RiskFactor::Neuropathy, 1.4),
        (RiskFactor::Incontinence, 1.3),
        (RiskFactor::DiureticMedication, 1.2),
    ],
    interactions: &[
        (MobilityCategory::Walker, CognitiveCategory::DeliriumDementia, 1.6),
        (MobilityCategory::Assisted, CognitiveCategory::DeliriumDementia, 1.5),
        (MobilityCategory::Chair, CognitiveCategory::DeliriumDementia, 1.4),
        (MobilityCategory::Bedbound, CognitiveCategory::DeliriumDementia, 1.3),
        (MobilityCategory::Walker, CognitiveCategory::MildImpairment, 1.2),
        (MobilityCategory::Assisted, CognitiveCategory::MildImpairment, 1.2),
    ],
};

const PRESSURE_INJURY: OutcomeParameters = OutcomeParameters {
    outcome: RiskOutcome::PressureInjury,
    baseline_probability: 0.04,
    thresholds: RiskThresholds {
        moderate: 0.08,
        high: 0.16,
    },
    mobility: [1.0, 1.2, 1.6, 2.2, 3.0],
    common: CommonRelativeRisks {
        age_65_79: 1.2,
        age_80_plus: 1.5,
        icu: 1.8,
        stepdown: 1.3,
        immobile_ge3: 1.6,
    },
    specific: &[
        (RiskFactor::ImmobileGe7, 1.3),
        (RiskFactor::Diabetes, 1.5),
        (RiskFactor::Malnutrition, 2.0),
        (RiskFactor::Incontinence, 1.9),
        (RiskFactor::Underweight, 1.6),
        (RiskFactor::Obese, 1.2),
        (RiskFactor::Steroid, 1.3),
        (RiskFactor::CognitiveDelirium, 1.4),
        (RiskFactor::HeartFailure, 1.2),
        (RiskFactor::Neuropathy, 1.4),
    ],
    interactions: &[],
};

/// Parameters for an outcome.
pub fn outcome_parameters(outcome: RiskOutcome) -> &'static OutcomeParameters {
    match outcome {
        RiskOutcome::Deconditioning => &DECONDITIONING,
        RiskOutcome::Vte => &VTE,
        RiskOutcome::Falls => &FALLS,
        RiskOutcome::PressureInjury => &PRESSURE_INJURY,
    }
}

/// Log-odds weight for a relative-risk multiplier.
pub fn log_odds_weight(relative_risk: f64) -> f64 {
    relative_risk.ln()
}

pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Flags for the explainability reference: same patient, independent
/// mobility, fewer than three immobile days.
pub fn reference_flags(flags: &PatientFeatureFlags) -> PatientFeatureFlags {
    let mut reference = flags.clone();
    reference.mobility = MobilityCategory::Independent;
    reference.days_immobile = 0;
    reference.immobile_ge3 = false;
    reference.immobile_ge7 = false;
    reference
}

fn mobility_index(mobility: MobilityCategory) -> usize {
    match mobility {
        MobilityCategory::Independent => 0,
        MobilityCategory::Walker => 1,
        MobilityCategory::Assisted => 2,
        MobilityCategory::Chair => 3,
        MobilityCategory::Bedbound => 4,
    }
}

/// Accumulates log-odds terms and the names of the ones that moved the score.
struct ScoreBuilder {
    log_odds: f64,
    factors: Vec<String>,
}

impl ScoreBuilder {
    fn new(intercept: f64) -> Self {
        Self {
            log_odds: intercept,
            factors: Vec::new(),
        }
    }

    fn add(&mut self, name: impl Into<String>, relative_risk: f64) {
        let weight = log_odds_weight(relative_risk);
        if weight != 0.0 {
            self.log_odds += weight;
            self.factors.push(name.into());
        }
    }
}

fn score(params: &OutcomeParameters, flags: &PatientFeatureFlags) -> ScoreBuilder {
    let mut builder = ScoreBuilder::new(logit(params.baseline_probability));

    builder.add(
        format!("mobility:{}", flags.mobility),
        params.mobility[mobility_index(flags.mobility)],
    );

    match flags.age_band {
        AgeBand::Age65To79 => builder.add("age_65_79", params.common.age_65_79),
        AgeBand::Age80Plus => builder.add("age_80+", params.common.age_80_plus),
        AgeBand::Under65 | AgeBand::Unknown => {}
    }

    match flags.level_of_care {
        LevelOfCare::Icu => builder.add("icu", params.common.icu),
        LevelOfCare::Stepdown => builder.add("stepdown", params.common.stepdown),
        LevelOfCare::Ward => {}
    }

    if flags.immobile_ge3 {
        builder.add("immobile_ge3", params.common.immobile_ge3);
    }

    for (factor, relative_risk) in params.specific {
        if factor.applies(flags) {
            builder.add(factor.name(), *relative_risk);
        }
    }

    if let Some((mobility, cognitive, relative_risk)) = params
        .interactions
        .iter()
        .find(|(m, c, _)| *m == flags.mobility && *c == flags.cognitive)
    {
        builder.add(
            format!("interaction:{}×{}", mobility, cognitive_tag(*cognitive)),
            *relative_risk,
        );
    }

    builder
}

fn cognitive_tag(cognitive: CognitiveCategory) -> &'static str {
    match cognitive {
        CognitiveCategory::Normal => "normal",
        CognitiveCategory::MildImpairment => "mild",
        CognitiveCategory::DeliriumDementia => "delirium",
    }
}

/// Score a single outcome from feature flags.
pub fn score_outcome(outcome: RiskOutcome, flags: &PatientFeatureFlags) -> OutcomeRisk {
    let params = outcome_parameters(outcome);
    let actual = score(params, flags);
    let reference = score(params, &reference_flags(flags));

    let probability = sigmoid(actual.log_odds).clamp(0.0, MAX_PROBABILITY);

    OutcomeRisk {
        outcome,
        probability,
        odds_ratio_vs_reference: (actual.log_odds - reference.log_odds).exp(),
        risk_level: params.thresholds.classify(probability),
        contributing_factors: actual.factors,
        log_odds: actual.log_odds,
    }
}

/// Risk model producing full assessments with a prescription snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskModel {
    estimator: BaselineEstimator,
    adjuster: PrescriptionAdjuster,
}

impl RiskModel {
    pub fn new() -> Self {
        Self {
            estimator: BaselineEstimator::new(),
            adjuster: PrescriptionAdjuster::new(),
        }
    }

    /// Score all four outcomes for a patient, with the adjusted prescription.
    pub fn assess(&self, profile: &PatientProfile) -> RiskAssessment {
        let flags = extract_features(profile);
        self.assess_flags(profile.id, &flags, profile.admission_diagnosis.as_deref())
    }

    /// Score from pre-extracted flags.
    pub fn assess_flags(
        &self,
        patient_id: Uuid,
        flags: &PatientFeatureFlags,
        diagnosis_text: Option<&str>,
    ) -> RiskAssessment {
        let baseline = self.estimator.estimate(flags);
        let prescription = self
            .adjuster
            .adjust_for_patient(&baseline, flags, diagnosis_text);

        let assessment = RiskAssessment {
            id: Uuid::new_v4(),
            patient_id,
            assessed_at: Utc::now(),
            deconditioning: score_outcome(RiskOutcome::Deconditioning, flags),
            vte: score_outcome(RiskOutcome::Vte, flags),
            falls: score_outcome(RiskOutcome::Falls, flags),
            pressure_injury: score_outcome(RiskOutcome::PressureInjury, flags),
            baseline,
            prescription,
        };

        tracing::info!(
            patient_id = %patient_id,
            deconditioning = %assessment.deconditioning.risk_level,
            vte = %assessment.vte.risk_level,
            falls = %assessment.falls.risk_level,
            pressure_injury = %assessment.pressure_injury.risk_level,
            "Risk assessment computed"
        );

        assessment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::{CognitiveCategory, LevelOfCare, MobilityCategory, PatientProfile};
    use crate::risk::types::RiskLevel;

    fn icu_delirium_patient() -> PatientProfile {
        let mut profile = PatientProfile::new(Uuid::new_v4());
        profile.age = Some(82);
        profile.level_of_care = Some(LevelOfCare::Icu);
        profile.mobility_status = Some(MobilityCategory::Bedbound);
        profile.cognitive_status = Some(CognitiveCategory::DeliriumDementia);
        profile.days_immobile = Some(5);
        profile.on_vte_prophylaxis = Some(false);
        profile
    }

    #[test]
    fn test_icu_bedbound_delirium_scenario() {
        let assessment = RiskModel::new().assess(&icu_delirium_patient());

        assert_eq!(assessment.deconditioning.risk_level, RiskLevel::High);
        assert_eq!(assessment.falls.risk_level, RiskLevel::High);

        for name in ["mobility:bedbound", "icu", "age_80+", "cog_delirium", "immobile_ge3"] {
            assert!(
                assessment.deconditioning.has_factor(name),
                "deconditioning missing {name}"
            );
        }
        assert!(assessment.falls.has_factor("interaction:bedbound×delirium"));
        assert!(assessment.vte.has_factor("no_vte_prophylaxis"));
    }

    #[test]
    fn test_deconditioning_probability_value() {
        let flags = extract_features(&icu_delirium_patient());
        let risk = score_outcome(RiskOutcome::Deconditioning, &flags);

        // logit(0.1) + ln(3.5 * 1.6 * 2.0 * 1.8 * 1.5)
        let expected = sigmoid(logit(0.10) + (3.5f64 * 1.6 * 2.0 * 1.8 * 1.5).ln());
        assert!((risk.probability - expected).abs() < 1e-12);
        assert!((risk.odds_ratio_vs_reference - 3.5 * 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_independent_patient_has_unit_odds_ratio() {
        let mut profile = PatientProfile::new(Uuid::new_v4());
        profile.age = Some(45);
        profile.mobility_status = Some(MobilityCategory::Independent);

        let assessment = RiskModel::new().assess(&profile);
        for outcome in assessment.outcomes() {
            assert!((outcome.odds_ratio_vs_reference - 1.0).abs() < 1e-12);
            assert!(outcome.contributing_factors.iter().all(|f| !f.starts_with("mobility:")));
        }
    }

    #[test]
    fn test_probability_is_capped() {
        let mut profile = icu_delirium_patient();
        profile.days_immobile = Some(14);
        profile.comorbidities = vec![
            "heart failure".into(),
            "COPD".into(),
            "malnutrition".into(),
            "metastatic cancer".into(),
        ];
        profile.medications = vec!["prednisone".into(), "lorazepam".into()];

        let risk = score_outcome(RiskOutcome::Deconditioning, &extract_features(&profile));
        assert_eq!(risk.probability, MAX_PROBABILITY);
    }

    #[test]
    fn test_odds_ratio_at_least_reference_for_impaired_mobility() {
        for mobility in MobilityCategory::ALL {
            for cognitive in [
                CognitiveCategory::Normal,
                CognitiveCategory::MildImpairment,
                CognitiveCategory::DeliriumDementia,
            ] {
                let mut profile = PatientProfile::new(Uuid::new_v4());
                profile.mobility_status = Some(mobility);
                profile.cognitive_status = Some(cognitive);
                profile.days_immobile = Some(4);
                let flags = extract_features(&profile);

                for outcome in RiskOutcome::ALL {
                    let risk = score_outcome(outcome, &flags);
                    assert!(risk.odds_ratio_vs_reference >= 1.0);
                    assert!((0.0..=MAX_PROBABILITY).contains(&risk.probability));
                }
            }
        }
    }

    #[test]
    fn test_anticoagulation_lowers_vte() {
        let mut profile = PatientProfile::new(Uuid::new_v4());
        profile.mobility_status = Some(MobilityCategory::Chair);
        let without = score_outcome(RiskOutcome::Vte, &extract_features(&profile));

        profile.medications = vec!["Apixaban 5mg".into()];
        let with = score_outcome(RiskOutcome::Vte, &extract_features(&profile));

        assert!(with.probability < without.probability);
        assert!(with.has_factor("anticoagulated"));
        assert!(!with.has_factor("no_vte_prophylaxis"));
    }

    #[test]
    fn test_assessment_carries_prescription_snapshot() {
        let assessment = RiskModel::new().assess(&icu_delirium_patient());
        assert!((1..=6).contains(&assessment.prescription.resistance_level));
        assert_eq!(assessment.baseline.watt_goal, 25.0);
    }
}
