//! Exercise prescription: baseline estimate and energy-conserving adjustment.

pub mod adjuster;
pub mod baseline;
pub mod profiles;
pub mod types;

pub use adjuster::PrescriptionAdjuster;
pub use baseline::BaselineEstimator;
pub use profiles::{medication_profile, DiagnosisCategory, DiagnosisProfile, MedicationProfile};
pub use types::{
    daily_energy, resistance_for, AdjustedPrescription, AdjustmentTrace, BaselineTrace,
    PassSnapshot, PrescriptionBaseline,
};
