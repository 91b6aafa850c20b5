//! Patient attributes and derived clinical flags.
//!
//! - Raw profile and category enums
//! - Medication class recognition
//! - Feature extraction for the risk and prescription models
//! - Learned personalization state

pub mod features;
pub mod medications;
pub mod personalization;
pub mod types;

pub use features::{extract_features, infer_admission_category, AgeBand, PatientFeatureFlags};
pub use medications::{classify_medications, MedicationClass};
pub use personalization::PersonalizationProfile;
pub use types::{
    AdmissionCategory, CognitiveCategory, LevelOfCare, MobilityCategory, PatientProfile, Sex,
};
