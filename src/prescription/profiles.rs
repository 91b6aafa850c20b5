//! Diagnosis and medication adjustment profiles.
//!
//! Each closed category maps to one immutable profile record; the adjuster
//! dispatches on the category tag and never on free text.

use serde::{Deserialize, Serialize};

use crate::patient::{
    AdmissionCategory, AgeBand, CognitiveCategory, LevelOfCare, MedicationClass, MobilityCategory,
    PatientFeatureFlags,
};

/// How a diagnosis redistributes prescription energy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnosisProfile {
    pub resistance_multiplier: f64,
    pub rpm_multiplier: f64,
    pub duration_multiplier: f64,
    pub rationale: &'static [&'static str],
    pub monitoring: &'static [&'static str],
    pub stop_criteria: &'static [&'static str],
}

/// Fixed diagnosis categories used by the adjuster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisCategory {
    Cardiac,
    Pulmonary,
    Orthopedic,
    Neurological,
    IcuRecovery,
    Delirium,
    FrailElderly,
    General,
}

/// Keyword order for free-text diagnosis matching.
const DIAGNOSIS_KEYWORDS: &[(DiagnosisCategory, &[&str])] = &[
    (
        DiagnosisCategory::IcuRecovery,
        &["icu stay", "post-icu", "critical illness", "ventilat", "intensive care"],
    ),
    (
        DiagnosisCategory::Delirium,
        &["delirium", "encephalopathy", "acute confusion"],
    ),
    (
        DiagnosisCategory::Cardiac,
        &["cardiac", "heart", "myocardial", "chf", "cabg", "arrhythmia", "afib"],
    ),
    (
        DiagnosisCategory::Pulmonary,
        &["pulmonary", "copd", "pneumonia", "respiratory", "lung"],
    ),
    (
        DiagnosisCategory::Orthopedic,
        &[
            "orthopedic",
            "orthopaedic",
            "fracture",
            "arthroplasty",
            "joint replacement",
        ],
    ),
    (
        DiagnosisCategory::Neurological,
        &["neuro", "stroke", "cva", "parkinson", "spinal"],
    ),
    (
        DiagnosisCategory::FrailElderly,
        &["frail", "deconditioning", "failure to thrive"],
    ),
];

impl DiagnosisCategory {
    pub const ALL: [DiagnosisCategory; 8] = [
        DiagnosisCategory::Cardiac,
        DiagnosisCategory::Pulmonary,
        DiagnosisCategory::Orthopedic,
        DiagnosisCategory::Neurological,
        DiagnosisCategory::IcuRecovery,
        DiagnosisCategory::Delirium,
        DiagnosisCategory::FrailElderly,
        DiagnosisCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosisCategory::Cardiac => "cardiac",
            DiagnosisCategory::Pulmonary => "pulmonary",
            DiagnosisCategory::Orthopedic => "orthopedic",
            DiagnosisCategory::Neurological => "neurological",
            DiagnosisCategory::IcuRecovery => "icu_recovery",
            DiagnosisCategory::Delirium => "delirium",
            DiagnosisCategory::FrailElderly => "frail_elderly",
            DiagnosisCategory::General => "general",
        }
    }

    /// Match diagnosis text: exact tag first, then ordered keywords.
    pub fn from_text(text: &str) -> Option<Self> {
        let lower = text.trim().to_lowercase();
        if let Some(exact) = Self::ALL.iter().find(|c| c.as_str() == lower) {
            return Some(*exact);
        }

        DIAGNOSIS_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(category, _)| *category)
    }

    /// Pick a category for a patient: diagnosis text wins, then care
    /// setting, admission category, cognition and frailty, else general.
    pub fn infer(flags: &PatientFeatureFlags, diagnosis_text: Option<&str>) -> Self {
        if let Some(category) = diagnosis_text.and_then(Self::from_text) {
            return category;
        }

        if flags.level_of_care == LevelOfCare::Icu {
            return DiagnosisCategory::IcuRecovery;
        }

        match flags.admission_category {
            AdmissionCategory::Cardiac => return DiagnosisCategory::Cardiac,
            AdmissionCategory::Pulmonary => return DiagnosisCategory::Pulmonary,
            AdmissionCategory::Orthopedic => return DiagnosisCategory::Orthopedic,
            AdmissionCategory::Neurological => return DiagnosisCategory::Neurological,
            _ => {}
        }

        if flags.cognitive == CognitiveCategory::DeliriumDementia {
            return DiagnosisCategory::Delirium;
        }

        if flags.age_band == AgeBand::Age80Plus && flags.mobility >= MobilityCategory::Assisted {
            return DiagnosisCategory::FrailElderly;
        }

        DiagnosisCategory::General
    }

    pub fn profile(&self) -> DiagnosisProfile {
        match self {
            DiagnosisCategory::Cardiac => DiagnosisProfile {
                resistance_multiplier: 0.8,
                rpm_multiplier: 0.9,
                duration_multiplier: 1.1,
                rationale: &["Cardiac: lower cadence and resistance over a longer bout keeps myocardial demand steady"],
                monitoring: &["Heart rate and rhythm", "Blood pressure before and after session"],
                stop_criteria: &["New arrhythmia or chest pain", "SBP drop > 10 mmHg with increasing workload"],
            },
            DiagnosisCategory::Pulmonary => DiagnosisProfile {
                resistance_multiplier: 0.75,
                rpm_multiplier: 0.85,
                duration_multiplier: 1.2,
                rationale: &["Pulmonary: slower cadence and longer duration with rest intervals to limit dyspnea"],
                monitoring: &["Continuous SpO2", "Respiratory rate", "Dyspnea scale"],
                stop_criteria: &["SpO2 < 88%", "Respiratory rate > 35/min"],
            },
            DiagnosisCategory::Orthopedic => DiagnosisProfile {
                resistance_multiplier: 0.7,
                rpm_multiplier: 1.15,
                duration_multiplier: 1.25,
                rationale: &["Orthopedic: low resistance and higher cadence promote range of motion while protecting the repair"],
                monitoring: &["Pain score", "Surgical site"],
                stop_criteria: &["Pain > 7/10", "New joint instability"],
            },
            DiagnosisCategory::Neurological => DiagnosisProfile {
                resistance_multiplier: 0.9,
                rpm_multiplier: 0.9,
                duration_multiplier: 1.1,
                rationale: &["Neurological: moderate cadence with symmetry cueing"],
                monitoring: &["Bilateral force symmetry", "Trunk control"],
                stop_criteria: &["New neurological deficit", "Severe spasticity"],
            },
            DiagnosisCategory::IcuRecovery => DiagnosisProfile {
                resistance_multiplier: 0.6,
                rpm_multiplier: 0.9,
                duration_multiplier: 0.8,
                rationale: &["ICU recovery: shorter bouts at lower resistance"],
                monitoring: &["Mean arterial pressure", "SpO2", "Lines and drains"],
                stop_criteria: &["MAP < 65 or > 110 mmHg", "New vasopressor requirement"],
            },
            DiagnosisCategory::Delirium => DiagnosisProfile {
                resistance_multiplier: 0.8,
                rpm_multiplier: 1.0,
                duration_multiplier: 0.8,
                rationale: &["Delirium: short, simple sessions with consistent cadence cues"],
                monitoring: &["Attention (CAM-ICU)", "Agitation"],
                stop_criteria: &["Escalating agitation", "Attempting to exit the device"],
            },
            DiagnosisCategory::FrailElderly => DiagnosisProfile {
                resistance_multiplier: 0.7,
                rpm_multiplier: 0.9,
                duration_multiplier: 1.0,
                rationale: &["Frail elderly: conservative resistance to limit muscle strain"],
                monitoring: &["RPE (Borg)", "Orthostatic symptoms"],
                stop_criteria: &["RPE > 15", "Dizziness on standing"],
            },
            DiagnosisCategory::General => DiagnosisProfile {
                resistance_multiplier: 1.0,
                rpm_multiplier: 1.0,
                duration_multiplier: 1.0,
                rationale: &["General medical: standard energy distribution"],
                monitoring: &["Heart rate", "RPE (Borg)"],
                stop_criteria: &["RPE > 15"],
            },
        }
    }
}

impl std::fmt::Display for DiagnosisCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a medication class trims the prescription.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MedicationProfile {
    /// Minutes removed from each session
    pub duration_delta_min: u32,
    /// RPM removed from the cadence target
    pub rpm_delta: u32,
    /// Prefer strength (resistance) over cadence
    pub resistance_focus: bool,
    pub rationale: &'static [&'static str],
    pub monitoring: &'static [&'static str],
    pub stop_criteria: &'static [&'static str],
}

/// Adjustment profile for a medication class.
pub fn medication_profile(class: MedicationClass) -> MedicationProfile {
    match class {
        MedicationClass::BetaBlocker => MedicationProfile {
            duration_delta_min: 0,
            rpm_delta: 5,
            resistance_focus: false,
            rationale: &["Beta-blocker: heart-rate response blunted; use RPE rather than HR targets"],
            monitoring: &["RPE (Borg)"],
            stop_criteria: &["RPE > 15 (heart rate unreliable)"],
        },
        MedicationClass::RateControl => MedicationProfile {
            duration_delta_min: 0,
            rpm_delta: 5,
            resistance_focus: false,
            rationale: &["Rate-control agent: cadence limited to avoid rate breakthrough"],
            monitoring: &["Heart rhythm"],
            stop_criteria: &["Irregular rhythm with symptoms"],
        },
        MedicationClass::Diuretic => MedicationProfile {
            duration_delta_min: 2,
            rpm_delta: 0,
            resistance_focus: false,
            rationale: &["Diuretic: shorter sessions to limit orthostatic and volume stress"],
            monitoring: &["Orthostatic blood pressure", "Fluid balance"],
            stop_criteria: &["Dizziness or SBP drop > 20 mmHg"],
        },
        MedicationClass::Sedating => MedicationProfile {
            duration_delta_min: 3,
            rpm_delta: 5,
            resistance_focus: false,
            rationale: &["Sedating medication: reduced duration and cadence for alertness and coordination"],
            monitoring: &["Alertness", "Coordination"],
            stop_criteria: &["Drowsiness", "Unable to follow cues"],
        },
        MedicationClass::Insulin => MedicationProfile {
            duration_delta_min: 2,
            rpm_delta: 0,
            resistance_focus: false,
            rationale: &["Insulin or hypoglycemic agent: shorter sessions with glucose checks"],
            monitoring: &["Blood glucose before and after session"],
            stop_criteria: &["Glucose < 70 mg/dL or hypoglycemia symptoms"],
        },
        MedicationClass::Anticoagulant => MedicationProfile {
            duration_delta_min: 0,
            rpm_delta: 0,
            resistance_focus: false,
            rationale: &["Anticoagulant: avoid trauma at contact points"],
            monitoring: &["Bruising or bleeding at contact points"],
            stop_criteria: &["Any new bleeding"],
        },
        MedicationClass::Antiparkinsonian => MedicationProfile {
            duration_delta_min: 0,
            rpm_delta: 5,
            resistance_focus: true,
            rationale: &["Antiparkinsonian: schedule during the 'on' period with slower cadence"],
            monitoring: &["Medication timing ('on' period)", "Freezing episodes"],
            stop_criteria: &["Freezing or severe dyskinesia"],
        },
        MedicationClass::Corticosteroid => MedicationProfile {
            duration_delta_min: 0,
            rpm_delta: 0,
            resistance_focus: true,
            rationale: &["Corticosteroid: steroid myopathy risk"],
            monitoring: &["Proximal muscle weakness", "Blood glucose"],
            stop_criteria: &["Muscle pain or cramping"],
        },
    }
}
