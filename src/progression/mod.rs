//! Progressive overload, setback detection and recovery.
//!
//! [`ProgressionEngine`] holds the pure rules. [`ProgressionService`]
//! applies them to stored history once per completed session.

pub mod engine;
pub mod service;
pub mod types;

pub use engine::ProgressionEngine;
pub use service::ProgressionService;
pub use types::{
    ExerciseSession, PlateauCheck, ProgressionDecision, ProgressionError, ProgressionOutcome,
    ProgressionParameter, RecoveryCheck, SetbackCheck, SetbackSeverity, SetbackType,
};
