//! Adverse-outcome risk scoring.
//!
//! Four independent weighted-logit scorers (deconditioning, VTE, falls,
//! pressure injury) over patient feature flags.

pub mod model;
pub mod types;

pub use model::{outcome_parameters, score_outcome, RiskFactor, RiskModel};
pub use types::{OutcomeRisk, RiskAssessment, RiskLevel, RiskOutcome, RiskThresholds};
