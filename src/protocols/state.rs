//! Assignment state machine.
//!
//! ```text
//! (none) --assign--> Active(0) --advance--> Active(1) ... --advance--> Completed
//!                       |                      |
//!                       +------discontinue-----+--> Discontinued
//! ```
//!
//! Transitions are forward-only. There is no automatic regression.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// State of one patient-protocol link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssignmentState {
    Active { phase: usize },
    Discontinued,
    Completed,
}

/// Rejected transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Cannot {action} an assignment that is {from}")]
    NotActive {
        action: &'static str,
        from: &'static str,
    },

    #[error("Protocol has no phases")]
    NoPhases,

    #[error("Phase {phase} is out of range for {phase_count} phases")]
    PhaseOutOfRange { phase: usize, phase_count: usize },
}

impl AssignmentState {
    /// Initial state for a new assignment.
    pub fn start(phase: usize, phase_count: usize) -> Result<Self, TransitionError> {
        if phase_count == 0 {
            return Err(TransitionError::NoPhases);
        }
        if phase >= phase_count {
            return Err(TransitionError::PhaseOutOfRange { phase, phase_count });
        }
        Ok(AssignmentState::Active { phase })
    }

    /// Storage tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentState::Active { .. } => "active",
            AssignmentState::Discontinued => "discontinued",
            AssignmentState::Completed => "completed",
        }
    }

    /// Rebuild from the stored status and phase columns.
    pub fn from_parts(status: &str, phase: Option<usize>) -> Option<Self> {
        match status {
            "active" => phase.map(|phase| AssignmentState::Active { phase }),
            "discontinued" => Some(AssignmentState::Discontinued),
            "completed" => Some(AssignmentState::Completed),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AssignmentState::Active { .. })
    }

    /// Current phase index, while active.
    pub fn phase(&self) -> Option<usize> {
        match self {
            AssignmentState::Active { phase } => Some(*phase),
            _ => None,
        }
    }

    /// Move to the next phase, or to `Completed` after the last one.
    pub fn advance(self, phase_count: usize) -> Result<Self, TransitionError> {
        match self {
            AssignmentState::Active { phase } => {
                if phase_count == 0 {
                    return Err(TransitionError::NoPhases);
                }
                let next = phase + 1;
                if next >= phase_count {
                    Ok(AssignmentState::Completed)
                } else {
                    Ok(AssignmentState::Active { phase: next })
                }
            }
            other => Err(TransitionError::NotActive {
                action: "advance",
                from: other.as_str(),
            }),
        }
    }

    pub fn discontinue(self) -> Result<Self, TransitionError> {
        match self {
            AssignmentState::Active { .. } => Ok(AssignmentState::Discontinued),
            other => Err(TransitionError::NotActive {
                action: "discontinue",
                from: other.as_str(),
            }),
        }
    }

    pub fn complete(self) -> Result<Self, TransitionError> {
        match self {
            AssignmentState::Active { .. } => Ok(AssignmentState::Completed),
            other => Err(TransitionError::NotActive {
                action: "complete",
                from: other.as_str(),
            }),
        }
    }
}

impl std::fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentState::Active { phase } => write!(f, "active@phase_{}", phase),
            other => write!(f, "{}", other.as_str()),
        }
    }
}
