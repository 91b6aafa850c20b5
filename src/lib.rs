//! Mobility CDS - clinical decision support for inpatient cycle ergometry
//!
//! Scores adverse-outcome risk, derives an energy-conserving exercise
//! prescription, matches and advances patients through clinical protocols,
//! detects fatigue from live session metrics, and manages progressive
//! overload and setback recovery across session history.

pub mod alerts;
pub mod fatigue;
pub mod goals;
pub mod metrics;
pub mod patient;
pub mod prescription;
pub mod progression;
pub mod protocols;
pub mod risk;
pub mod storage;

// Re-export commonly used types
pub use fatigue::{FatigueDetector, FatigueMonitor};
pub use patient::{extract_features, PatientProfile};
pub use progression::{ProgressionEngine, ProgressionService};
pub use protocols::{ProtocolMatcher, ProtocolService};
pub use risk::RiskModel;
pub use storage::{Database, EngineConfig};
