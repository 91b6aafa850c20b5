//! Clinical protocol matching and phase progression.
//!
//! [`ProtocolMatcher`] scores protocols against a patient.
//! [`AssignmentState`] is the only way an assignment changes status or
//! phase, and [`ProtocolService`] ties both to storage.

pub mod matcher;
pub mod service;
pub mod state;
pub mod types;

pub use matcher::ProtocolMatcher;
pub use service::ProtocolService;
pub use state::{AssignmentState, TransitionError};
pub use types::{
    ClinicalProtocol, MatchContext, PatientProtocolAssignment, PhaseProgressCheck,
    ProtocolCriteria, ProtocolError, ProtocolMatch, ProtocolPhase,
};
