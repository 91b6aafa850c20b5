//! Feature extraction: raw patient attributes to risk flags.
//!
//! Pure and total. Missing inputs never fail extraction; they fall back to
//! conservative defaults (unknown mobility is treated as needing assistance,
//! unknown level of care as a general ward, unknown cognition as normal).

use serde::{Deserialize, Serialize};

use super::medications::{classify_medications, MedicationClass};
use super::types::{
    AdmissionCategory, CognitiveCategory, LevelOfCare, MobilityCategory, PatientProfile, Sex,
};

/// Ordered keyword table for admission diagnosis text. First hit wins.
const ADMISSION_KEYWORDS: &[(AdmissionCategory, &[&str])] = &[
    (
        AdmissionCategory::Orthopedic,
        &[
            "fracture",
            "arthroplasty",
            "hip replacement",
            "knee replacement",
            "orif",
            "orthopedic",
            "orthopaedic",
            "laminectomy",
        ],
    ),
    (
        AdmissionCategory::Neurological,
        &[
            "stroke",
            "cva",
            "intracranial",
            "subarachnoid",
            "parkinson",
            "seizure",
            "spinal cord",
            "guillain",
        ],
    ),
    (
        AdmissionCategory::Cardiac,
        &[
            "myocardial",
            "stemi",
            "heart failure",
            "chf",
            "cabg",
            "cardiac",
            "arrhythmia",
            "atrial fibrillation",
            "valve",
        ],
    ),
    (
        AdmissionCategory::Sepsis,
        &["sepsis", "septic", "bacteremia"],
    ),
    (
        AdmissionCategory::Pulmonary,
        &[
            "copd",
            "pneumonia",
            "respiratory failure",
            "pulmonary",
            "asthma",
        ],
    ),
    (
        AdmissionCategory::Oncology,
        &[
            "cancer",
            "carcinoma",
            "lymphoma",
            "leukemia",
            "tumor",
            "malignan",
        ],
    ),
    (
        AdmissionCategory::Surgical,
        &[
            "post-op",
            "postop",
            "postoperative",
            "laparotomy",
            "resection",
            "colectomy",
            "surgery",
        ],
    ),
];

const DIABETES_TERMS: &[&str] = &["diabetes", "t2dm", "t1dm", "dm2", "iddm", "niddm"];
const HEART_FAILURE_TERMS: &[&str] = &["heart failure", "chf", "hfref", "hfpef", "cardiomyopathy"];
const COPD_TERMS: &[&str] = &["copd", "emphysema", "chronic bronchitis"];
const CANCER_TERMS: &[&str] = &["cancer", "carcinoma", "malignan", "lymphoma", "leukemia", "metasta"];
const STROKE_TERMS: &[&str] = &["stroke", "cva", "hemiparesis", "hemiplegia"];
const VTE_TERMS: &[&str] = &["dvt", "deep vein", "pulmonary embol", "vte"];
const NEUROPATHY_TERMS: &[&str] = &["neuropathy"];
const INCONTINENCE_TERMS: &[&str] = &["incontinence"];
const MALNUTRITION_TERMS: &[&str] = &["malnutrition", "cachexia"];
const PARKINSON_TERMS: &[&str] = &["parkinson"];
const FALLS_TERMS: &[&str] = &["fall"];

/// Age band used across the risk and prescription models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeBand {
    Under65,
    Age65To79,
    Age80Plus,
    Unknown,
}

impl AgeBand {
    pub fn from_age(age: Option<u32>) -> Self {
        match age {
            Some(a) if a >= 80 => AgeBand::Age80Plus,
            Some(a) if a >= 65 => AgeBand::Age65To79,
            Some(_) => AgeBand::Under65,
            None => AgeBand::Unknown,
        }
    }
}

/// Boolean and categorical flags derived from a patient profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientFeatureFlags {
    pub age: Option<u32>,
    pub age_band: AgeBand,
    pub sex: Option<Sex>,
    pub mobility: MobilityCategory,
    pub cognitive: CognitiveCategory,
    pub level_of_care: LevelOfCare,
    pub admission_category: AdmissionCategory,
    pub weight_kg: Option<f64>,
    pub bmi: Option<f64>,
    pub obese: bool,
    pub underweight: bool,
    pub days_immobile: u32,
    pub immobile_ge3: bool,
    pub immobile_ge7: bool,
    pub on_vte_prophylaxis: bool,
    pub diabetes: bool,
    pub heart_failure: bool,
    pub copd: bool,
    pub cancer: bool,
    pub stroke: bool,
    pub prior_vte: bool,
    pub prior_falls: bool,
    pub neuropathy: bool,
    pub incontinence: bool,
    pub malnutrition: bool,
    pub parkinsons: bool,
    pub recent_surgery: bool,
    pub sedating_meds: bool,
    pub anticoagulant: bool,
    pub steroid: bool,
    pub medication_classes: Vec<MedicationClass>,
}

impl PatientFeatureFlags {
    /// Whether the patient's mobility is worse than fully independent.
    pub fn has_impaired_mobility(&self) -> bool {
        self.mobility != MobilityCategory::Independent
    }
}

/// Derive risk flags from a patient profile.
pub fn extract_features(profile: &PatientProfile) -> PatientFeatureFlags {
    let bmi = profile.bmi();
    let days_immobile = profile.days_immobile.unwrap_or(0);
    let medication_classes = classify_medications(&profile.medications);
    let admission_category = profile
        .admission_category
        .unwrap_or_else(|| infer_admission_category(profile.admission_diagnosis.as_deref()));

    let comorbid = |structured: Option<bool>, terms: &[&str]| -> bool {
        structured.unwrap_or_else(|| any_term(&profile.comorbidities, terms))
    };

    let obese = bmi.map(|b| b >= 30.0).unwrap_or(false)
        || any_term(&profile.comorbidities, &["obesity", "obese"]);

    PatientFeatureFlags {
        age: profile.age,
        age_band: AgeBand::from_age(profile.age),
        sex: profile.sex,
        mobility: profile.mobility_status.unwrap_or(MobilityCategory::Assisted),
        cognitive: profile.cognitive_status.unwrap_or(CognitiveCategory::Normal),
        level_of_care: profile.level_of_care.unwrap_or(LevelOfCare::Ward),
        admission_category,
        weight_kg: profile.weight_kg.filter(|w| *w > 0.0),
        bmi,
        obese,
        underweight: bmi.map(|b| b < 18.5).unwrap_or(false),
        days_immobile,
        immobile_ge3: days_immobile >= 3,
        immobile_ge7: days_immobile >= 7,
        on_vte_prophylaxis: profile.on_vte_prophylaxis.unwrap_or(false),
        diabetes: comorbid(profile.diabetes, DIABETES_TERMS),
        heart_failure: comorbid(profile.heart_failure, HEART_FAILURE_TERMS),
        copd: any_term(&profile.comorbidities, COPD_TERMS),
        cancer: any_term(&profile.comorbidities, CANCER_TERMS)
            || admission_category == AdmissionCategory::Oncology,
        stroke: any_term(&profile.comorbidities, STROKE_TERMS),
        prior_vte: comorbid(profile.prior_vte, VTE_TERMS),
        prior_falls: comorbid(profile.prior_falls, FALLS_TERMS),
        neuropathy: any_term(&profile.comorbidities, NEUROPATHY_TERMS),
        incontinence: comorbid(profile.incontinence, INCONTINENCE_TERMS),
        malnutrition: comorbid(profile.malnutrition, MALNUTRITION_TERMS),
        parkinsons: any_term(&profile.comorbidities, PARKINSON_TERMS),
        recent_surgery: admission_category.is_surgical(),
        sedating_meds: medication_classes.contains(&MedicationClass::Sedating),
        anticoagulant: medication_classes.contains(&MedicationClass::Anticoagulant),
        steroid: medication_classes.contains(&MedicationClass::Corticosteroid),
        medication_classes,
    }
}

/// Map free-text admission diagnosis to a category via ordered keyword lookup.
pub fn infer_admission_category(diagnosis: Option<&str>) -> AdmissionCategory {
    let Some(text) = diagnosis else {
        return AdmissionCategory::Medical;
    };
    let lower = text.to_lowercase();

    ADMISSION_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(AdmissionCategory::Medical)
}

fn any_term(entries: &[String], terms: &[&str]) -> bool {
    entries.iter().any(|entry| {
        let lower = entry.to_lowercase();
        terms.iter().any(|term| lower.contains(term))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_empty_profile_uses_conservative_defaults() {
        let flags = extract_features(&PatientProfile::new(Uuid::new_v4()));

        assert_eq!(flags.age_band, AgeBand::Unknown);
        assert_eq!(flags.mobility, MobilityCategory::Assisted);
        assert_eq!(flags.level_of_care, LevelOfCare::Ward);
        assert_eq!(flags.cognitive, CognitiveCategory::Normal);
        assert!(flags.bmi.is_none());
        assert!(!flags.obese && !flags.underweight);
        assert!(!flags.immobile_ge3);
    }

    #[test]
    fn test_admission_keyword_order() {
        assert_eq!(
            infer_admission_category(Some("Left hip FRACTURE s/p ORIF")),
            AdmissionCategory::Orthopedic
        );
        assert_eq!(
            infer_admission_category(Some("Pneumonia with septic shock")),
            AdmissionCategory::Sepsis
        );
        assert_eq!(
            infer_admission_category(Some("Acute ischemic stroke")),
            AdmissionCategory::Neurological
        );
        assert_eq!(infer_admission_category(Some("dehydration")), AdmissionCategory::Medical);
        assert_eq!(infer_admission_category(None), AdmissionCategory::Medical);
    }

    #[test]
    fn test_structured_fields_take_precedence() {
        let mut profile = PatientProfile::new(Uuid::new_v4());
        profile.admission_diagnosis = Some("hip fracture".into());
        profile.admission_category = Some(AdmissionCategory::Cardiac);
        profile.comorbidities = vec!["Type 2 diabetes".into()];
        profile.diabetes = Some(false);

        let flags = extract_features(&profile);
        assert_eq!(flags.admission_category, AdmissionCategory::Cardiac);
        assert!(!flags.diabetes);
    }

    #[test]
    fn test_medication_flags() {
        let mut profile = PatientProfile::new(Uuid::new_v4());
        profile.medications = vec![
            "Lorazepam 0.5mg".into(),
            "apixaban".into(),
            "Prednisone".into(),
        ];

        let flags = extract_features(&profile);
        assert!(flags.sedating_meds);
        assert!(flags.anticoagulant);
        assert!(flags.steroid);
        assert_eq!(flags.medication_classes.len(), 3);
    }

    #[test]
    fn test_bmi_flags() {
        let mut profile = PatientProfile::new(Uuid::new_v4());
        profile.weight_kg = Some(45.0);
        profile.height_cm = Some(170.0);
        assert!(extract_features(&profile).underweight);

        profile.weight_kg = Some(110.0);
        assert!(extract_features(&profile).obese);
    }

    #[test]
    fn test_immobility_bands() {
        let mut profile = PatientProfile::new(Uuid::new_v4());
        profile.days_immobile = Some(5);
        let flags = extract_features(&profile);
        assert!(flags.immobile_ge3);
        assert!(!flags.immobile_ge7);
    }
}
