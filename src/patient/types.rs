//! Patient profile and clinical category definitions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw patient attributes as read from the hospital record.
///
/// Everything except the id is optional; the feature extractor fills gaps
/// with conservative defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientProfile {
    /// Unique identifier
    pub id: Uuid,
    /// Age in years
    pub age: Option<u32>,
    /// Administrative sex
    pub sex: Option<Sex>,
    /// Body weight in kilograms
    pub weight_kg: Option<f64>,
    /// Height in centimeters
    pub height_cm: Option<f64>,
    /// Free-text comorbidity list
    pub comorbidities: Vec<String>,
    /// Free-text medication names
    pub medications: Vec<String>,
    /// Current mobility status
    pub mobility_status: Option<MobilityCategory>,
    /// Current cognitive status
    pub cognitive_status: Option<CognitiveCategory>,
    /// Level of care
    pub level_of_care: Option<LevelOfCare>,
    /// Free-text admission diagnosis
    pub admission_diagnosis: Option<String>,
    /// Structured admission category (overrides text inference)
    pub admission_category: Option<AdmissionCategory>,
    /// Coded diagnoses (ICD-10)
    pub diagnosis_codes: Vec<String>,
    /// Admission date
    pub admission_date: Option<NaiveDate>,
    /// Consecutive days with minimal mobility
    pub days_immobile: Option<u32>,
    /// Whether pharmacological VTE prophylaxis is ordered
    pub on_vte_prophylaxis: Option<bool>,
    /// Documented falls history
    pub prior_falls: Option<bool>,
    /// Documented VTE history
    pub prior_vte: Option<bool>,
    /// Urinary or fecal incontinence
    pub incontinence: Option<bool>,
    /// Malnutrition risk screen positive
    pub malnutrition: Option<bool>,
    /// Diabetes mellitus
    pub diabetes: Option<bool>,
    /// Heart failure
    pub heart_failure: Option<bool>,
}

impl PatientProfile {
    /// Create an empty profile for a patient.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Body-mass index, when both weight and height are known.
    pub fn bmi(&self) -> Option<f64> {
        match (self.weight_kg, self.height_cm) {
            (Some(weight), Some(height)) if weight > 0.0 && height > 0.0 => {
                let meters = height / 100.0;
                Some(weight / (meters * meters))
            }
            _ => None,
        }
    }
}

/// Administrative sex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    #[serde(alias = "m")]
    Male,
    #[serde(alias = "f")]
    Female,
}

/// Mobility category, ordered from most to least mobile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobilityCategory {
    Independent,
    Walker,
    #[serde(alias = "assist", alias = "one_assist")]
    Assisted,
    #[serde(alias = "chairbound", alias = "wheelchair")]
    Chair,
    #[serde(alias = "bed_bound")]
    Bedbound,
}

impl MobilityCategory {
    /// All categories, most mobile first.
    pub const ALL: [MobilityCategory; 5] = [
        MobilityCategory::Independent,
        MobilityCategory::Walker,
        MobilityCategory::Assisted,
        MobilityCategory::Chair,
        MobilityCategory::Bedbound,
    ];

    /// Stable tag used in factor names and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MobilityCategory::Independent => "independent",
            MobilityCategory::Walker => "walker",
            MobilityCategory::Assisted => "assisted",
            MobilityCategory::Chair => "chair",
            MobilityCategory::Bedbound => "bedbound",
        }
    }

    /// Parse a free-text mobility status.
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.trim().to_lowercase();
        match lower.as_str() {
            "independent" => Some(MobilityCategory::Independent),
            "walker" => Some(MobilityCategory::Walker),
            "assisted" | "assist" | "one_assist" => Some(MobilityCategory::Assisted),
            "chair" | "chairbound" | "wheelchair" => Some(MobilityCategory::Chair),
            "bedbound" | "bed_bound" => Some(MobilityCategory::Bedbound),
            _ => None,
        }
    }
}

impl std::fmt::Display for MobilityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cognitive status category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveCategory {
    Normal,
    #[serde(alias = "mild")]
    MildImpairment,
    #[serde(alias = "delirium", alias = "dementia")]
    DeliriumDementia,
}

impl CognitiveCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CognitiveCategory::Normal => "normal",
            CognitiveCategory::MildImpairment => "mild_impairment",
            CognitiveCategory::DeliriumDementia => "delirium_dementia",
        }
    }
}

impl std::fmt::Display for CognitiveCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Level of care on the current unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelOfCare {
    #[serde(alias = "floor", alias = "med_surg")]
    Ward,
    Stepdown,
    Icu,
}

impl LevelOfCare {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelOfCare::Ward => "ward",
            LevelOfCare::Stepdown => "stepdown",
            LevelOfCare::Icu => "icu",
        }
    }
}

impl std::fmt::Display for LevelOfCare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Admission category inferred from the admitting diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionCategory {
    Orthopedic,
    Neurological,
    Cardiac,
    Sepsis,
    Pulmonary,
    Oncology,
    Surgical,
    Medical,
}

impl AdmissionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionCategory::Orthopedic => "orthopedic",
            AdmissionCategory::Neurological => "neurological",
            AdmissionCategory::Cardiac => "cardiac",
            AdmissionCategory::Sepsis => "sepsis",
            AdmissionCategory::Pulmonary => "pulmonary",
            AdmissionCategory::Oncology => "oncology",
            AdmissionCategory::Surgical => "surgical",
            AdmissionCategory::Medical => "medical",
        }
    }

    /// Whether the admission involved an operation.
    pub fn is_surgical(&self) -> bool {
        matches!(self, AdmissionCategory::Orthopedic | AdmissionCategory::Surgical)
    }
}

impl std::fmt::Display for AdmissionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bmi_requires_weight_and_height() {
        let mut profile = PatientProfile::new(Uuid::new_v4());
        assert!(profile.bmi().is_none());

        profile.weight_kg = Some(80.0);
        assert!(profile.bmi().is_none());

        profile.height_cm = Some(200.0);
        assert_eq!(profile.bmi(), Some(20.0));
    }

    #[test]
    fn test_mobility_parse_aliases() {
        assert_eq!(MobilityCategory::parse("Bed_Bound"), Some(MobilityCategory::Bedbound));
        assert_eq!(MobilityCategory::parse("assist"), Some(MobilityCategory::Assisted));
        assert_eq!(MobilityCategory::parse("skateboard"), None);
    }

    #[test]
    fn test_profile_deserializes_with_aliases() {
        let json = r#"{
            "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "age": 82,
            "level_of_care": "icu",
            "mobility_status": "bedbound",
            "cognitive_status": "delirium_dementia",
            "days_immobile": 5,
            "on_vte_prophylaxis": false
        }"#;
        let profile: PatientProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.mobility_status, Some(MobilityCategory::Bedbound));
        assert_eq!(profile.cognitive_status, Some(CognitiveCategory::DeliriumDementia));
        assert_eq!(profile.level_of_care, Some(LevelOfCare::Icu));
        assert!(profile.medications.is_empty());
    }
}
